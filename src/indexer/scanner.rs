// Incremental file scanning

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IndexingConfig;

/// A file whose content differs from the last indexed version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    /// Index key: path relative to the project root with `/` separators
    pub key: String,
    pub path: PathBuf,
    pub checksum: String,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub pending: Vec<PendingFile>,
    pub unchanged: usize,
    pub unreadable: usize,
}

impl ScanResult {
    pub fn total(&self) -> usize {
        self.pending.len() + self.unchanged + self.unreadable
    }
}

/// blake3 digest of file content, hex encoded
pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub struct Scanner {
    root: PathBuf,
    /// Absolute form of `root`; watcher events arrive as absolute paths
    canonical_root: Option<PathBuf>,
    extensions: HashSet<String>,
    skipped_dirs: HashSet<String>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, config: &IndexingConfig) -> Self {
        let skipped_dirs = config
            .ignore_dirs
            .iter()
            .chain(config.test_dirs.iter())
            .cloned()
            .collect();

        let root = root.into();
        let canonical_root = std::fs::canonicalize(&root)
            .ok()
            .filter(|canonical| *canonical != root);

        Self {
            root,
            canonical_root,
            extensions: config.extensions.iter().cloned().collect(),
            skipped_dirs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(ext))
            .unwrap_or(false)
    }

    /// Path below the root, whether `path` is given like the root or in absolute form
    fn strip_root<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok().or_else(|| {
            self.canonical_root
                .as_deref()
                .and_then(|root| path.strip_prefix(root).ok())
        })
    }

    /// Index key for a path under the root
    pub fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = self.strip_root(path)?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Whether a single path (e.g. from a watcher event) belongs in the index
    pub fn should_index(&self, path: &Path) -> bool {
        if !self.matches_extension(path) {
            return false;
        }
        let Some(relative) = self.strip_root(path) else {
            return false;
        };
        let mut dirs = relative.components().collect::<Vec<_>>();
        dirs.pop();
        !dirs
            .iter()
            .any(|c| self.skipped_dirs.contains(c.as_os_str().to_string_lossy().as_ref()))
    }

    /// All candidate files under the root, sorted by key
    pub fn candidates(&self) -> Vec<(String, PathBuf)> {
        let mut files: Vec<(String, PathBuf)> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self
                        .skipped_dirs
                        .contains(entry.file_name().to_string_lossy().as_ref())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.matches_extension(entry.path()))
            .filter_map(|entry| {
                let path = entry.into_path();
                self.relative_key(&path).map(|key| (key, path))
            })
            .collect();

        files.sort();
        files
    }

    /// Compare current content checksums against the persisted map
    pub fn scan(&self, known: &HashMap<String, String>) -> ScanResult {
        let mut result = ScanResult::default();

        for (key, path) in self.candidates() {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    result.unreadable += 1;
                    continue;
                }
            };

            let digest = checksum(&bytes);
            if known.get(&key) == Some(&digest) {
                result.unchanged += 1;
                continue;
            }

            debug!("Queued {} ({})", key, if known.contains_key(&key) { "modified" } else { "new" });
            result.pending.push(PendingFile {
                key,
                path,
                checksum: digest,
            });
        }

        result
    }
}
