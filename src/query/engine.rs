// Query execution engine

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::citations::{flag_unverified, unverified_citations};
use super::context::{ContextAssembler, QueryContext};
use super::llm::{GenerationError, TextGenerator};
use super::prompt::{
    build_prompt, build_verification_prompt, FEATURE_TEMPLATE, GENERAL_TEMPLATE, IMPACT_TEMPLATE,
    VERIFICATION_TEMPLATE,
};
use crate::config::Config;

/// What kind of answer the caller wants; selects the prompt template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryKind {
    #[default]
    General,
    Feature,
    Impact,
}

impl QueryKind {
    pub fn template_name(&self) -> &'static str {
        match self {
            QueryKind::General => GENERAL_TEMPLATE,
            QueryKind::Feature => FEATURE_TEMPLATE,
            QueryKind::Impact => IMPACT_TEMPLATE,
        }
    }

    /// Split a `feature: ...` or `impact: ...` prefix off interactive input
    pub fn from_prefixed(input: &str) -> (QueryKind, &str) {
        let trimmed = input.trim();
        for (prefix, kind) in [("feature:", QueryKind::Feature), ("impact:", QueryKind::Impact)] {
            let matches = trimmed
                .get(..prefix.len())
                .map_or(false, |head| head.eq_ignore_ascii_case(prefix));
            if matches {
                return (kind, trimmed[prefix.len()..].trim());
            }
        }
        (QueryKind::General, trimmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    ContextBuilt,
    PromptBuilt,
    Answered,
    Verified,
    Delivered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::ContextBuilt => "context built",
            Stage::PromptBuilt => "prompt built",
            Stage::Answered => "answered",
            Stage::Verified => "verified",
            Stage::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub kind: QueryKind,
    pub verify: bool,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            text: text.into(),
            kind,
            verify: true,
        }
    }

    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    /// Cited names absent from the context; flagged in `answer` when verified
    pub unverified: Vec<String>,
    /// Components the context was built from, best first
    pub components: Vec<String>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("failed to assemble context: {0:#}")]
    Context(anyhow::Error),
    #[error("{stage} generation failed after {attempts} attempt(s): {source}")]
    Generation {
        stage: Stage,
        attempts: u32,
        #[source]
        source: GenerationError,
    },
    #[error("query cancelled before stage {0}")]
    Cancelled(Stage),
}

/// Retry contract for generation calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.llm.max_retries,
            delay: config.retry_delay(),
            timeout: config.request_timeout(),
        }
    }
}

pub struct QueryEngine {
    assembler: Arc<ContextAssembler>,
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl QueryEngine {
    pub fn new(
        assembler: Arc<ContextAssembler>,
        generator: Arc<dyn TextGenerator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            assembler,
            generator,
            policy,
        }
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Run one query through every stage; persisted state is never touched
    pub async fn execute(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, QueryError> {
        let query = request.text.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let mut stages = vec![Stage::Received];
        info!(
            "Processing {:?} query with {}: {}",
            request.kind,
            self.generator.model_name(),
            query
        );

        checkpoint(cancel, Stage::ContextBuilt)?;
        let context = self.assembler.assemble(query).map_err(QueryError::Context)?;
        stages.push(Stage::ContextBuilt);
        debug!(
            "Context: {}",
            context
                .components
                .iter()
                .map(|c| format!("{} ({:.3})", c.name, c.score))
                .collect::<Vec<_>>()
                .join(", ")
        );

        checkpoint(cancel, Stage::PromptBuilt)?;
        let prompt = self.prompt_for(request.kind, query, &context);
        stages.push(Stage::PromptBuilt);

        checkpoint(cancel, Stage::Answered)?;
        let first = self.generate_with_retry(Stage::Answered, &prompt).await?;
        stages.push(Stage::Answered);

        let known = context.known_names();
        let (answer, unverified) = if request.verify {
            checkpoint(cancel, Stage::Verified)?;
            let verified = self.verify(&first, &context, &known).await?;
            stages.push(Stage::Verified);
            flag_unverified(&verified, &known)
        } else {
            let unverified = unverified_citations(&first, &known);
            (first, unverified)
        };

        if !unverified.is_empty() {
            warn!("Answer cites components not in context: {}", unverified.join(", "));
        }

        checkpoint(cancel, Stage::Delivered)?;
        stages.push(Stage::Delivered);
        info!("Query delivered ({} chars)", answer.len());

        Ok(QueryResponse {
            answer,
            unverified,
            components: context.components.iter().map(|c| c.name.clone()).collect(),
            stages,
        })
    }

    fn prompt_for(&self, kind: QueryKind, query: &str, context: &QueryContext) -> String {
        let name = kind.template_name();
        let template = self.assembler.prompt_template(name);
        if template.is_none() {
            debug!("Template '{}' not found, using default format", name);
        }
        build_prompt(template.as_deref(), query, context)
    }

    async fn verify(
        &self,
        first: &str,
        context: &QueryContext,
        known: &std::collections::BTreeSet<String>,
    ) -> Result<String, QueryError> {
        info!("Performing self-verification of response");
        let unverified = unverified_citations(first, known);
        let template = self.assembler.prompt_template(VERIFICATION_TEMPLATE);
        let prompt = build_verification_prompt(template.as_deref(), first, context, &unverified);
        self.generate_with_retry(Stage::Verified, &prompt).await
    }

    /// One call plus up to `max_retries` retries of transient failures, fixed delay
    async fn generate_with_retry(&self, stage: Stage, prompt: &str) -> Result<String, QueryError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.policy.timeout, self.generator.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Transient(format!(
                    "no answer within {:?}",
                    self.policy.timeout
                ))),
            };

            match result {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_transient() && attempts <= self.policy.max_retries => {
                    warn!(
                        "{} request failed (attempt {}/{}), retrying: {}",
                        stage,
                        attempts,
                        self.policy.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(source) => {
                    error!("{} generation failed: {}", stage, source);
                    return Err(QueryError::Generation {
                        stage,
                        attempts,
                        source,
                    });
                }
            }
        }
    }
}

fn checkpoint(cancel: &CancellationToken, next: Stage) -> Result<(), QueryError> {
    if cancel.is_cancelled() {
        Err(QueryError::Cancelled(next))
    } else {
        Ok(())
    }
}
