use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info};

use super::{build_engine, print_response, shutdown_token};
use crate::config::Config;
use crate::query::{QueryError, QueryKind, QueryRequest};

/// Queries run when no batch file is given
pub const DEMO_QUERIES: &[(QueryKind, &str)] = &[
    (QueryKind::General, "What is the overall architecture of this Spring Boot application?"),
    (QueryKind::General, "How does the transaction flow work in this application?"),
    (
        QueryKind::General,
        "What would be the impact of adding a new 'address' field to the User entity?",
    ),
    (QueryKind::General, "How would I implement JWT authentication in this application?"),
    (
        QueryKind::Feature,
        "Add a feature to allow users to set up recurring transfers between accounts",
    ),
    (
        QueryKind::Impact,
        "Change the Transaction entity to include a 'category' field for transaction categorization",
    ),
];

/// One query per non-empty line; `#` starts a comment; `feature:`/`impact:` prefixes apply
pub fn parse_batch(content: &str) -> Vec<(QueryKind, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let (kind, text) = QueryKind::from_prefixed(line);
            (kind, text.to_string())
        })
        .filter(|(_, text)| !text.is_empty())
        .collect()
}

pub async fn run_batch(
    config: &Config,
    file: Option<String>,
    verify: bool,
    summary_dir: Option<String>,
) -> Result<()> {
    let queries = match &file {
        Some(path) => {
            let content = std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("Failed to read batch file {}", path))?;
            parse_batch(&content)
        }
        None => DEMO_QUERIES
            .iter()
            .map(|(kind, text)| (*kind, text.to_string()))
            .collect(),
    };

    let engine = build_engine(config, summary_dir.as_deref())?;
    let cancel = shutdown_token();
    let total = queries.len();
    let mut failed = 0;

    for (i, (kind, text)) in queries.into_iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Batch cancelled after {} of {} queries", i, total);
            break;
        }

        println!("\n{}", "=".repeat(80));
        println!("[{}/{}] {:?}: {}", i + 1, total, kind, text);
        println!("{}", "=".repeat(80));

        let mut request = QueryRequest::new(text, kind);
        if !verify {
            request = request.without_verification();
        }
        match engine.execute(&request, &cancel).await {
            Ok(response) => print_response(&response),
            Err(QueryError::Cancelled(stage)) => {
                info!("Query cancelled before {}", stage);
                break;
            }
            Err(e) => {
                failed += 1;
                error!("Query failed: {}", e);
                println!("Error: {}", e);
            }
        }
    }

    println!("\nBatch finished: {} queries, {} failed", total, failed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch() {
        let content = "# architecture questions\nHow is security configured?\n\n\
                       feature: export statements as PDF\n  impact: rename Account.balance  \nfeature:\n";
        assert_eq!(
            parse_batch(content),
            vec![
                (QueryKind::General, "How is security configured?".to_string()),
                (QueryKind::Feature, "export statements as PDF".to_string()),
                (QueryKind::Impact, "rename Account.balance".to_string()),
            ]
        );
    }

    #[test]
    fn test_demo_queries_cover_every_kind() {
        assert_eq!(DEMO_QUERIES.len(), 6);
        assert!(DEMO_QUERIES.iter().any(|(kind, _)| *kind == QueryKind::Feature));
        assert!(DEMO_QUERIES.iter().any(|(kind, _)| *kind == QueryKind::Impact));
    }
}
