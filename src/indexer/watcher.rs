// File watcher for incremental updates

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::indexer::Indexer;

/// Quiet period before a batch of changes is re-indexed
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Paths touched by a batch of events, split by what happened to them
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changed: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn record(&mut self, event: &Event) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in &event.paths {
                    self.removed.remove(path);
                    self.changed.insert(path.clone());
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.changed.remove(path);
                    self.removed.insert(path.clone());
                }
            }
            _ => {}
        }
    }
}

/// Re-indexes changed files until cancelled
pub struct FileWatcher {
    indexer: Arc<Indexer>,
    watch_path: PathBuf,
}

impl FileWatcher {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        let watch_path = indexer.scanner().root().to_path_buf();
        Self { indexer, watch_path }
    }

    /// Start watching for file changes
    pub async fn watch(&self, cancel: CancellationToken) -> Result<()> {
        info!("Starting file watcher for: {}", self.watch_path.display());

        let (tx, mut rx) = mpsc::channel::<Event>(256);

        // notify calls back on its own thread, outside the runtime
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(e) = tx.blocking_send(event) {
                        debug!("Watcher channel closed: {}", e);
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&self.watch_path, RecursiveMode::Recursive)?;

        info!("File watcher started. Monitoring for changes...");

        loop {
            let first = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let mut batch = ChangeBatch::default();
            batch.record(&first);

            // Collect follow-up events until things settle
            loop {
                match tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                    Ok(Some(event)) => batch.record(&event),
                    Ok(None) | Err(_) => break,
                }
            }

            self.handle_batch(batch).await;
        }

        info!("File watcher stopped");
        Ok(())
    }

    async fn handle_batch(&self, batch: ChangeBatch) {
        let scanner = self.indexer.scanner();

        for path in batch.removed.iter().filter(|p| scanner.should_index(p)) {
            // Entries are only dropped by an explicit prune
            info!("File removed: {} (run `index --prune` to drop it)", path.display());
        }

        let changed: Vec<PathBuf> = batch
            .changed
            .into_iter()
            .filter(|p| p.is_file() && scanner.should_index(p))
            .collect();
        if changed.is_empty() {
            return;
        }

        debug!("Re-indexing {} changed files", changed.len());
        match self.indexer.index_paths(&changed).await {
            Ok(report) if report.changed() => {
                info!(
                    "Re-indexed {} files ({} unchanged, {} failed)",
                    report.indexed,
                    report.unchanged,
                    report.failures.len()
                );
            }
            Ok(report) => debug!("No content changes in {} files", report.unchanged),
            Err(e) => warn!("Re-indexing failed: {:#}", e),
        }
    }
}
