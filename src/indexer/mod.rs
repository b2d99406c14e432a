// Code indexing and file watching

pub mod heuristics;
pub mod parser;
pub mod scanner;
pub mod watcher;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::graph::{GraphSet, Snapshot};
use crate::index::artifacts::{export_index, import_index, INDEX_FILE};
use crate::index::db::{now, IndexStore};
use crate::index::{CallEdge, SourceFile};
use parser::{ExtractorSettings, JavaParser, ParseError, ParseOutcome};
use scanner::{PendingFile, Scanner};

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Drop the existing index first
    pub rebuild: bool,
    /// Remove entries whose files no longer exist
    pub prune: bool,
    pub show_progress: bool,
}

/// Summary of one indexing pass
#[derive(Debug, Default)]
pub struct IndexReport {
    pub scanned: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub excluded: usize,
    pub unreadable: usize,
    pub symbols: usize,
    pub failures: Vec<ParseError>,
    pub pruned: Vec<String>,
    /// Records whose call edges changed during resolution
    pub relinked: usize,
    pub call_edges: usize,
    pub elapsed: Duration,
}

impl IndexReport {
    pub fn changed(&self) -> bool {
        self.indexed > 0 || self.excluded > 0 || !self.pruned.is_empty()
    }
}

enum FileOutcome {
    Indexed { symbols: usize },
    Excluded { key: String, reason: String },
    Failed(ParseError),
    Unreadable,
}

/// Parse one queued file and store the result under its key
fn index_one(parser: &JavaParser, store: &IndexStore, file: PendingFile) -> Result<FileOutcome> {
    // Re-read: the file may have changed since the scan
    let bytes = match std::fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read {}: {}", file.path.display(), e);
            return Ok(FileOutcome::Unreadable);
        }
    };
    let content = String::from_utf8_lossy(&bytes);
    let source_file = SourceFile {
        path: file.key.clone(),
        checksum: scanner::checksum(&bytes),
        last_indexed: now(),
    };

    match parser.parse(&file.key, &content) {
        Ok(ParseOutcome::Indexed(record)) => {
            store.upsert(&source_file, &record)?;
            debug!("Indexed {}: {} symbols", file.key, record.symbol_count());
            Ok(FileOutcome::Indexed {
                symbols: record.symbol_count(),
            })
        }
        Ok(ParseOutcome::Excluded { reason }) => {
            store.mark_excluded(&source_file)?;
            Ok(FileOutcome::Excluded { key: file.key, reason })
        }
        Err(e) => Ok(FileOutcome::Failed(e)),
    }
}

/// Name-based call resolution over the whole snapshot.
///
/// An invocation becomes an edge only when some indexed file defines a method
/// or class of that name. Names defined in the calling file resolve locally;
/// otherwise one edge is recorded per defining file. Returns the paths whose
/// edges changed.
pub fn resolve_calls(snapshot: &mut Snapshot) -> Vec<String> {
    let mut definitions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (path, record) in snapshot.iter() {
        let names = record
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .chain(record.class_names());
        for name in names {
            definitions.entry(name.to_string()).or_default().insert(path.clone());
        }
    }

    let mut changed = Vec::new();
    for (path, record) in snapshot.iter_mut() {
        let invoked: BTreeSet<&str> = record.invocations.iter().map(|i| i.name.as_str()).collect();

        let mut edges = Vec::new();
        for name in invoked {
            let Some(files) = definitions.get(name) else {
                continue;
            };
            let targets: Vec<&String> = if files.contains(path) {
                vec![path]
            } else {
                files.iter().collect()
            };
            for target in targets {
                edges.push(CallEdge {
                    caller: path.clone(),
                    callee: name.to_string(),
                    callee_file: target.clone(),
                });
            }
        }
        edges.sort();

        if edges != record.call_graph {
            record.call_graph = edges;
            changed.push(path.clone());
        }
    }

    changed
}

/// Coordinates scanning, parallel parsing, call resolution and artifact output
pub struct Indexer {
    store: IndexStore,
    parser: Arc<JavaParser>,
    scanner: Scanner,
    index_dir: PathBuf,
    workers: usize,
}

impl Indexer {
    pub fn new(config: &Config) -> Result<Self> {
        let store = IndexStore::open(config.index_db_path())?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: &Config, store: IndexStore) -> Self {
        Self {
            store,
            parser: Arc::new(JavaParser::new(ExtractorSettings::from(&config.indexing))),
            scanner: Scanner::new(config.project_root(), &config.indexing),
            index_dir: config.index_dir(),
            workers: config.worker_count(),
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Seed the store from a previous `index.json` export.
    ///
    /// Imported checksums let the next `run` skip files whose content is
    /// unchanged since the export.
    pub fn import(&self, dir: &Path) -> Result<usize> {
        if !dir.join(INDEX_FILE).is_file() {
            anyhow::bail!("No {} in {}", INDEX_FILE, dir.display());
        }
        import_index(&self.store, dir).with_context(|| format!("Failed to import from {}", dir.display()))
    }

    /// Full incremental pass over the project root
    pub async fn run(&self, options: IndexOptions) -> Result<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport::default();

        if options.rebuild {
            info!("Rebuilding index from scratch");
            self.store.clear().context("Failed to clear index")?;
        }
        if options.prune {
            report.pruned = self.store.prune_missing(self.scanner.root())?;
        }

        let known = self.store.checksums()?;
        let scan = self.scanner.scan(&known);
        info!(
            "Scanned {} files: {} changed, {} unchanged",
            scan.total(),
            scan.pending.len(),
            scan.unchanged
        );

        report.scanned = scan.total();
        report.unchanged = scan.unchanged;
        report.unreadable = scan.unreadable;

        self.parse_files(scan.pending, options.show_progress, &mut report)
            .await?;
        self.finish(&mut report)?;

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Re-index specific paths, e.g. from watcher events; unchanged content is skipped
    pub async fn index_paths(&self, paths: &[PathBuf]) -> Result<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport::default();
        let known = self.store.checksums()?;

        let mut pending = Vec::new();
        for path in paths.iter().filter(|p| self.scanner.should_index(p)) {
            let Some(key) = self.scanner.relative_key(path) else {
                continue;
            };
            report.scanned += 1;
            match std::fs::read(path) {
                Ok(bytes) => {
                    let checksum = scanner::checksum(&bytes);
                    if known.get(&key) == Some(&checksum) {
                        report.unchanged += 1;
                    } else {
                        pending.push(PendingFile {
                            key,
                            path: path.clone(),
                            checksum,
                        });
                    }
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    report.unreadable += 1;
                }
            }
        }

        if pending.is_empty() {
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        self.parse_files(pending, false, &mut report).await?;
        self.finish(&mut report)?;

        report.elapsed = started.elapsed();
        Ok(report)
    }

    async fn parse_files(
        &self,
        pending: Vec<PendingFile>,
        show_progress: bool,
        report: &mut IndexReport,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let progress = if show_progress {
            let pb = ProgressBar::new(pending.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            pb.set_message("parsing");
            pb
        } else {
            ProgressBar::hidden()
        };

        info!("Parsing {} files with {} workers", pending.len(), self.workers);

        let mut results = stream::iter(pending.into_iter().map(|file| {
            let parser = Arc::clone(&self.parser);
            let store = self.store.clone();
            tokio::task::spawn_blocking(move || index_one(&parser, &store, file))
        }))
        .buffer_unordered(self.workers);

        while let Some(joined) = results.next().await {
            progress.inc(1);
            let outcome = joined.context("Parse worker panicked")??;
            match outcome {
                FileOutcome::Indexed { symbols } => {
                    report.indexed += 1;
                    report.symbols += symbols;
                }
                FileOutcome::Excluded { key, reason } => {
                    debug!("Excluded {}: {}", key, reason);
                    report.excluded += 1;
                }
                FileOutcome::Failed(e) => {
                    warn!("{}", e);
                    report.failures.push(e);
                }
                FileOutcome::Unreadable => report.unreadable += 1,
            }
        }

        progress.finish_and_clear();
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(())
    }

    /// Resolve calls over the fresh snapshot and rewrite derived artifacts
    fn finish(&self, report: &mut IndexReport) -> Result<()> {
        let mut snapshot = self.store.get_all()?;

        let changed = resolve_calls(&mut snapshot);
        for path in &changed {
            if let Some(record) = snapshot.get(path) {
                self.store.update_record(path, record)?;
            }
        }
        report.relinked = changed.len();
        report.call_edges = snapshot.values().map(|r| r.call_graph.len()).sum();

        if let Err(e) = export_index(&self.store, &self.index_dir) {
            error!("Failed to export index: {:#}", e);
        }
        if let Err(e) = GraphSet::build(&snapshot).write_artifacts(&self.index_dir) {
            error!("Failed to write graph artifacts: {:#}", e);
        }

        info!(
            "Index updated: {} records, {} call edges ({} relinked)",
            snapshot.len(),
            report.call_edges,
            report.relinked
        );
        Ok(())
    }
}
