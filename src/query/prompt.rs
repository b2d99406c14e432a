// Prompt templates and rendering

use super::context::QueryContext;

pub const GENERAL_TEMPLATE: &str = "general_analysis_template";
pub const FEATURE_TEMPLATE: &str = "feature_implementation_template";
pub const IMPACT_TEMPLATE: &str = "code_change_impact_template";
pub const VERIFICATION_TEMPLATE: &str = "self_correction_template";

pub const DEFAULT_ANALYSIS_TEMPLATE: &str = "# Spring Boot Application Analysis

## Application Context
{app_overview}

## Components Relevant to Query
{components}

## API Flows Related to Query
{api_flows}

## Component Relationships
{matrix}

## Question
{query}

## Instructions
1. Analyze the question in relation to the provided Spring Boot application context
2. Provide a detailed technical response addressing the question
3. Cite specific code files and components in your answer using the format [FileName.java]
4. Identify any potential impacts or considerations across components
5. If any information seems missing, note assumptions you're making
";

pub const DEFAULT_VERIFICATION_TEMPLATE: &str = "# Self-Correction Review

## Original Response
{response}

## Application Context
{app_overview}

## Components
{components}

## API Flows
{api_flows}

## Component Relationships
{matrix}

## Citations Not Found in Context
{unverified}

## Instructions
Review the original response and verify:
1. Are all cited files actually mentioned in the application context?
2. Are the described relationships between components consistent with the provided component relationship matrix?
3. Are the described API flows consistent with the provided API flow data?
4. Does the impact analysis consider all dependent components from the relationship matrix?
5. Correct any inconsistencies and explain the corrections.
";

const NONE: &str = "None";

/// Substitute every placeholder in one left-to-right pass.
///
/// Inserted values are never scanned again, so a value containing `{query}`
/// stays literal.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while !rest.is_empty() {
        if rest.starts_with('{') {
            for (placeholder, value) in values {
                if let Some(after) = rest.strip_prefix(placeholder) {
                    out.push_str(value);
                    rest = after;
                    continue 'scan;
                }
            }
        }
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let next = rest[first..].find('{').map_or(rest.len(), |i| i + first);
        out.push_str(&rest[..next]);
        rest = &rest[next..];
    }
    out
}

pub fn render_components(context: &QueryContext) -> String {
    let mut text = String::new();
    for component in &context.components {
        text.push_str(&format!("### {} ({})\n", component.name, component.role));
        if let Some(summary) = &component.summary {
            text.push_str(summary.trim_end());
            text.push('\n');
        }
        text.push('\n');
    }
    text
}

pub fn render_matrix(context: &QueryContext) -> String {
    let list = |items: &std::collections::BTreeSet<String>| {
        if items.is_empty() {
            NONE.to_string()
        } else {
            items.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };

    let mut text = String::new();
    for (component, row) in context.matrix.iter() {
        text.push_str(&format!(
            "- {}:\n  - Depends on: {}\n  - Used by: {}\n\n",
            component,
            list(&row.depends_on),
            list(&row.used_by)
        ));
    }
    text
}

/// Fill an analysis template (named or default) for `query`
pub fn build_prompt(template: Option<&str>, query: &str, context: &QueryContext) -> String {
    let template = template.unwrap_or(DEFAULT_ANALYSIS_TEMPLATE);
    let components = render_components(context);
    let api_flows = context.api_flows.to_json_pretty();
    let matrix = render_matrix(context);

    fill(
        template,
        &[
            ("{insert relevant high-level application summary}", context.overview.as_str()),
            ("{insert summaries of the 3-5 most relevant components}", components.as_str()),
            ("{insert API flow data for endpoints relevant to the query}", api_flows.as_str()),
            ("{insert specific question}", query),
            ("{app_overview}", context.overview.as_str()),
            ("{components}", components.as_str()),
            ("{api_flows}", api_flows.as_str()),
            ("{matrix}", matrix.as_str()),
            ("{query}", query),
        ],
    )
}

/// Fill the self-correction template for a first answer
pub fn build_verification_prompt(
    template: Option<&str>,
    response: &str,
    context: &QueryContext,
    unverified: &[String],
) -> String {
    let template = template.unwrap_or(DEFAULT_VERIFICATION_TEMPLATE);
    let components = render_components(context);
    let api_flows = context.api_flows.to_json_pretty();
    let matrix = render_matrix(context);
    let unverified = if unverified.is_empty() {
        NONE.to_string()
    } else {
        unverified
            .iter()
            .map(|name| format!("- {}", name))
            .collect::<Vec<_>>()
            .join("\n")
    };

    fill(
        template,
        &[
            ("{insert original LLM response}", response),
            ("{insert relevant high-level application summary}", context.overview.as_str()),
            ("{insert relevant portion of component relationship matrix}", matrix.as_str()),
            ("{response}", response),
            ("{app_overview}", context.overview.as_str()),
            ("{components}", components.as_str()),
            ("{api_flows}", api_flows.as_str()),
            ("{matrix}", matrix.as_str()),
            ("{unverified}", unverified.as_str()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MatrixRow, RelationshipMatrix};
    use crate::index::FrameworkRole;
    use crate::query::context::RetrievedComponent;

    fn context() -> QueryContext {
        let matrix: RelationshipMatrix = [(
            "UserController".to_string(),
            MatrixRow {
                depends_on: ["UserService".to_string()].into_iter().collect(),
                used_by: Default::default(),
            },
        )]
        .into_iter()
        .collect();

        QueryContext {
            overview: "User management app.".to_string(),
            components: vec![
                RetrievedComponent {
                    name: "UserController".to_string(),
                    summary: Some("Handles /api/users.".to_string()),
                    role: FrameworkRole::Controller,
                    score: 0.9,
                },
                RetrievedComponent {
                    name: "AuditLog".to_string(),
                    summary: None,
                    role: FrameworkRole::Other,
                    score: 0.4,
                },
            ],
            matrix,
            ..Default::default()
        }
    }

    #[test]
    fn test_fill_is_single_pass() {
        let out = fill("Q: {query} / {matrix} {unknown}", &[("{query}", "why {matrix}?"), ("{matrix}", "M")]);
        assert_eq!(out, "Q: why {matrix}? / M {unknown}");
        assert_eq!(fill("", &[("{query}", "x")]), "");
        assert_eq!(fill("{{query}}", &[("{query}", "x")]), "{x}");
    }

    #[test]
    fn test_default_prompt_sections() {
        let prompt = build_prompt(None, "How are users created?", &context());

        assert!(prompt.starts_with("# Spring Boot Application Analysis"));
        assert!(prompt.contains("## Application Context\nUser management app.\n"));
        assert!(prompt.contains("### UserController (controller)\nHandles /api/users.\n\n"));
        assert!(prompt.contains("### AuditLog (other)\n\n"));
        assert!(prompt.contains("- UserController:\n  - Depends on: UserService\n  - Used by: None\n"));
        assert!(prompt.contains("## Question\nHow are users created?\n"));
        assert!(!prompt.contains("{components}"));
    }

    #[test]
    fn test_long_form_placeholders() {
        let template = "{insert relevant high-level application summary}|{insert specific question}|\
                        {insert API flow data for endpoints relevant to the query}";
        let prompt = build_prompt(Some(template), "Add paging", &context());
        assert_eq!(prompt, "User management app.|Add paging|{}");
    }

    #[test]
    fn test_verification_prompt() {
        let prompt = build_verification_prompt(
            None,
            "Edit [UserController.java] and [Ghost.java].",
            &context(),
            &["Ghost".to_string()],
        );
        assert!(prompt.contains("## Original Response\nEdit [UserController.java] and [Ghost.java].\n"));
        assert!(prompt.contains("## Citations Not Found in Context\n- Ghost\n"));
        assert!(prompt.contains("Depends on: UserService"));

        // Every replacement applies, including the long-form ones
        let custom = "{insert original LLM response} :: {insert relevant high-level application summary}";
        assert_eq!(
            build_verification_prompt(Some(custom), "R", &context(), &[]),
            "R :: User management app."
        );
    }
}
