use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::graph::GraphSet;
use crate::index::db::IndexStore;
use crate::index::FrameworkRole;

pub async fn show_stats(config: &Config, verbose: bool) -> Result<()> {
    let db_path = config.index_db_path();
    if !db_path.exists() {
        bail!("No index at {}; run `index` first", db_path.display());
    }

    let store = IndexStore::open(&db_path)?;
    let stats = store.stats()?;

    println!("Project: {}", config.project.name);
    println!("\nIndex Statistics:");
    println!("  Files tracked: {}", stats.total_files);
    println!("  Components: {}", stats.total_components);
    println!("  Symbols: {}", stats.total_symbols);
    println!("  Index size: {:.2} MB", db_size_mb(&db_path)?);

    println!("  Roles:");
    for role in [
        FrameworkRole::Controller,
        FrameworkRole::Service,
        FrameworkRole::Repository,
        FrameworkRole::Model,
        FrameworkRole::Dto,
        FrameworkRole::Utility,
        FrameworkRole::Other,
    ] {
        println!("    {}: {}", role, stats.count_for(role));
    }

    if verbose {
        let graphs = GraphSet::build(&store.get_all()?);
        println!("\nGraphs:");
        println!(
            "  Dependency graph: {} nodes, {} edges",
            graphs.dependencies.node_count(),
            graphs.dependencies.edge_count()
        );
        println!("  Call graph: {} file edges", graphs.calls.edge_count());
        println!("  Endpoint paths: {}", graphs.api_flows.len());
        println!("  Matrix rows: {}", graphs.matrix.len());
    }

    Ok(())
}

fn db_size_mb(db_path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(db_path)?;
    Ok(metadata.len() as f64 / (1024.0 * 1024.0))
}
