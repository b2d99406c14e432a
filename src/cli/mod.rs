// CLI command implementations

pub mod batch;
pub mod index;
pub mod interactive;
pub mod query;
pub mod references;
pub mod stats;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::query::embedding::HashEmbedder;
use crate::query::engine::{QueryEngine, QueryResponse, RetryPolicy};
use crate::query::llm::OpenAiClient;
use crate::query::summaries::SummaryStore;
use crate::query::{ContextAssembler, StructuralSources};

/// Summary directory: explicit override, else the configured one under the project root
pub fn summary_dir(config: &Config, override_dir: Option<&str>) -> PathBuf {
    match override_dir {
        Some(dir) => PathBuf::from(dir),
        None => config.project_root().join(&config.retrieval.summary_dir),
    }
}

/// Wire summaries, structural data and the generation client together
pub fn build_engine(config: &Config, summary_override: Option<&str>) -> Result<QueryEngine> {
    let api_key = config.require_api_key()?;
    let dir = summary_dir(config, summary_override);

    let summaries = SummaryStore::load(&dir);
    if summaries.is_empty() {
        warn!("No summaries found in {}; answers will lack component context", dir.display());
    }
    let structure = StructuralSources::load(&config.index_db_path(), &summaries)?;

    let assembler = ContextAssembler::new(
        Arc::new(HashEmbedder::new(config.retrieval.embedding_dim)),
        summaries,
        structure,
        config.retrieval.top_n,
    );
    let generator = OpenAiClient::new(&config.llm, api_key)?;

    Ok(QueryEngine::new(
        Arc::new(assembler),
        Arc::new(generator),
        RetryPolicy::from_config(config),
    ))
}

/// Token cancelled on Ctrl+C
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            child.cancel();
        }
    });
    token
}

pub fn print_response(response: &QueryResponse) {
    println!("\n{}", response.answer);
    if !response.unverified.is_empty() {
        println!(
            "\nNote: not found in the analyzed context: {}",
            response.unverified.join(", ")
        );
    }
}
