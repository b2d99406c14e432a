use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use super::{build_engine, print_response, shutdown_token};
use crate::config::Config;
use crate::query::{QueryKind, QueryRequest};

/// What a line of interactive input asks for
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Exit,
    /// Re-read summaries and rebuild embeddings
    Reload,
    Skip,
    Ask(QueryKind, &'a str),
}

pub fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
        return Input::Exit;
    }
    if trimmed.eq_ignore_ascii_case("reload") {
        return Input::Reload;
    }
    let (kind, text) = QueryKind::from_prefixed(trimmed);
    if text.is_empty() {
        Input::Skip
    } else {
        Input::Ask(kind, text)
    }
}

pub async fn run_interactive(config: &Config, verify: bool, summary_dir: Option<String>) -> Result<()> {
    let engine = build_engine(config, summary_dir.as_deref())?;
    let cancel = shutdown_token();

    println!("Spring Boot application analyzer");
    println!("{} summaries available for retrieval", engine.assembler().summaries_len());
    println!("Ask a question, prefix with 'feature:' or 'impact:', 'reload' to re-read summaries, 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };

        let (kind, text) = match parse_input(&line) {
            Input::Exit => break,
            Input::Skip => continue,
            Input::Reload => {
                println!("Reloaded {} summaries", engine.assembler().rebuild());
                continue;
            }
            Input::Ask(kind, text) => (kind, text),
        };

        let mut request = QueryRequest::new(text, kind);
        if !verify {
            request = request.without_verification();
        }
        match engine.execute(&request, &cancel).await {
            Ok(response) => print_response(&response),
            Err(e) => {
                error!("Query failed: {}", e);
                println!("Error: {}", e);
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}
