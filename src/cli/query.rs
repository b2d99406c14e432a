use anyhow::Result;

use super::{build_engine, print_response, shutdown_token};
use crate::config::Config;
use crate::query::{QueryKind, QueryRequest};

/// One-shot `query`, `feature` and `impact` commands
pub async fn run_query(
    config: &Config,
    kind: QueryKind,
    text: String,
    verify: bool,
    summary_dir: Option<String>,
) -> Result<()> {
    let engine = build_engine(config, summary_dir.as_deref())?;

    let mut request = QueryRequest::new(text, kind);
    if !verify {
        request = request.without_verification();
    }

    let heading = match kind {
        QueryKind::General => "Query",
        QueryKind::Feature => "Feature",
        QueryKind::Impact => "Impact",
    };
    println!("{}: {}", heading, request.text);

    let response = engine.execute(&request, &shutdown_token()).await?;
    print_response(&response);
    Ok(())
}
