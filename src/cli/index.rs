use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::shutdown_token;
use crate::config::Config;
use crate::indexer::watcher::FileWatcher;
use crate::indexer::{IndexOptions, IndexReport, Indexer};

pub async fn index_project(
    config: &Config,
    watch: bool,
    rebuild: bool,
    prune: bool,
    import: Option<PathBuf>,
) -> Result<()> {
    info!("Indexing project: {}", config.project.root);

    println!("Project: {} ({})", config.project.name, config.project.root);
    println!("Index: {}", config.index_db_path().display());
    println!("Workers: {}", config.worker_count());

    let indexer = Arc::new(Indexer::new(config)?);

    let mut rebuild = rebuild;
    if let Some(dir) = import {
        // Clear before importing so the pass below does not wipe the import
        if rebuild {
            indexer.store().clear()?;
            rebuild = false;
        }
        let count = indexer.import(&dir)?;
        println!("Imported {} records from {}", count, dir.display());
    }

    let report = indexer
        .run(IndexOptions {
            rebuild,
            prune,
            show_progress: true,
        })
        .await?;
    print_report(&report);

    if watch {
        println!("\nWatching for changes. Press Ctrl+C to stop.");
        FileWatcher::new(indexer).watch(shutdown_token()).await?;
    }

    Ok(())
}

fn print_report(report: &IndexReport) {
    println!("\nIndexing complete in {:.2?}", report.elapsed);
    println!("  Scanned: {}", report.scanned);
    println!("  Indexed: {} ({} symbols)", report.indexed, report.symbols);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Excluded as tests: {}", report.excluded);
    if report.unreadable > 0 {
        println!("  Unreadable: {}", report.unreadable);
    }
    if !report.pruned.is_empty() {
        println!("  Pruned: {}", report.pruned.len());
    }
    println!("  Call edges: {} ({} records relinked)", report.call_edges, report.relinked);

    if !report.failures.is_empty() {
        println!("\n{} files failed to parse:", report.failures.len());
        for failure in &report.failures {
            println!("  - {}", failure);
        }
    }
}
