use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::schema::{drop_schema, init_schema};
use super::{ComponentRecord, FrameworkRole, SourceFile};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Keyed store of component records, one row per source file.
///
/// Every write touches exactly one key inside one immediate transaction, so
/// parallel workers can upsert different files without coordinating and a
/// reader sees either the old or the new record for a path.
#[derive(Clone)]
pub struct IndexStore {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl IndexStore {
    /// Create or open a store
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening index at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize schema")?;
        }

        Ok(Self { pool, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    /// Insert or replace the record and checksum for one file atomically
    pub fn upsert(&self, file: &SourceFile, record: &ComponentRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize component record")?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR REPLACE INTO components (path, record, role, symbol_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file.path,
                json,
                record.role.as_str(),
                record.symbol_count() as i64,
                file.last_indexed,
            ],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO files (path, checksum, last_indexed)
             VALUES (?1, ?2, ?3)",
            params![file.path, file.checksum, file.last_indexed],
        )?;

        tx.commit()?;
        debug!("Upserted component: {}", file.path);
        Ok(())
    }

    /// Remember the checksum of a file that produced no record
    pub fn mark_excluded(&self, file: &SourceFile) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM components WHERE path = ?1", [&file.path])?;
        tx.execute(
            "INSERT OR REPLACE INTO files (path, checksum, last_indexed)
             VALUES (?1, ?2, ?3)",
            params![file.path, file.checksum, file.last_indexed],
        )?;
        tx.commit()?;
        debug!("Marked excluded: {}", file.path);
        Ok(())
    }

    /// Replace only the record of an already indexed file, keeping its checksum
    pub fn update_record(&self, path: &str, record: &ComponentRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize component record")?;
        let conn = self.get_conn()?;

        let updated = conn.execute(
            "UPDATE components SET record = ?2, role = ?3, symbol_count = ?4 WHERE path = ?1",
            params![path, json, record.role.as_str(), record.symbol_count() as i64],
        )?;
        if updated == 0 {
            anyhow::bail!("No component stored for {}", path);
        }
        Ok(())
    }

    /// Get the record for one file
    pub fn get(&self, path: &str) -> Result<Option<ComponentRecord>> {
        let conn = self.get_conn()?;
        let json: Option<String> = conn
            .query_row("SELECT record FROM components WHERE path = ?1", [path], |row| row.get(0))
            .optional()?;

        json.map(|json| {
            serde_json::from_str(&json).with_context(|| format!("Corrupt component record for {}", path))
        })
        .transpose()
    }

    /// Snapshot of every stored record, ordered by path
    pub fn get_all(&self) -> Result<BTreeMap<String, ComponentRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT path, record FROM components ORDER BY path")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = BTreeMap::new();
        for (path, json) in rows {
            let record: ComponentRecord = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt component record for {}", path))?;
            records.insert(path, record);
        }
        Ok(records)
    }

    /// Last seen checksum per path
    pub fn checksums(&self) -> Result<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT path, checksum FROM files")?;
        let map = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(map)
    }

    pub fn source_files(&self) -> Result<Vec<SourceFile>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT path, checksum, last_indexed FROM files ORDER BY path")?;
        let files = stmt
            .query_map([], |row| {
                Ok(SourceFile {
                    path: row.get(0)?,
                    checksum: row.get(1)?,
                    last_indexed: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Remove one file and its record
    pub fn remove(&self, path: &str) -> Result<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM components WHERE path = ?1", [path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", [path])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Drop entries whose files no longer exist under `root`
    pub fn prune_missing(&self, root: &Path) -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        for file in self.source_files()? {
            if !root.join(&file.path).exists() {
                self.remove(&file.path)?;
                pruned.push(file.path);
            }
        }
        if !pruned.is_empty() {
            info!("Pruned {} stale entries", pruned.len());
        }
        Ok(pruned)
    }

    /// Get index statistics
    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.get_conn()?;

        let total_files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let total_components: i64 =
            conn.query_row("SELECT COUNT(*) FROM components", [], |row| row.get(0))?;
        let total_symbols: i64 = conn.query_row(
            "SELECT COALESCE(SUM(symbol_count), 0) FROM components",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT role, COUNT(*) AS count FROM components GROUP BY role ORDER BY count DESC, role",
        )?;
        let by_role = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(IndexStats {
            total_files: total_files as usize,
            total_components: total_components as usize,
            total_symbols: total_symbols as usize,
            by_role,
        })
    }

    /// Clear all data (for rebuilding)
    pub fn clear(&self) -> Result<()> {
        let conn = self.get_conn()?;
        drop_schema(&conn)?;
        init_schema(&conn)?;
        Ok(())
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_components: usize,
    pub total_symbols: usize,
    pub by_role: Vec<(String, usize)>,
}

impl IndexStats {
    pub fn count_for(&self, role: FrameworkRole) -> usize {
        self.by_role
            .iter()
            .find(|(name, _)| name == role.as_str())
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Get current timestamp in seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ClassSymbol, SymbolKind};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(class: &str, role: FrameworkRole) -> ComponentRecord {
        ComponentRecord {
            package: "com.bank".to_string(),
            role,
            classes: vec![ClassSymbol {
                name: class.to_string(),
                kind: SymbolKind::Class,
                line_number: 3,
                annotations: vec![],
                extends: None,
                implements: vec![],
                role,
            }],
            dependencies: vec!["com.bank.model.User".to_string()],
            ..Default::default()
        }
    }

    fn file(path: &str, checksum: &str) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            checksum: checksum.to_string(),
            last_indexed: now(),
        }
    }

    #[test]
    fn test_create_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("index.db");

        let store = IndexStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.stats().unwrap().total_files, 0);
    }

    #[test]
    fn test_upsert_and_get() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();

        let rec = record("UserController", FrameworkRole::Controller);
        store.upsert(&file("src/UserController.java", "abc"), &rec).unwrap();

        assert_eq!(store.get("src/UserController.java").unwrap(), Some(rec));
        assert_eq!(store.get("src/Missing.java").unwrap(), None);
        assert_eq!(
            store.checksums().unwrap().get("src/UserController.java").map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();

        store
            .upsert(&file("A.java", "v1"), &record("Old", FrameworkRole::Service))
            .unwrap();
        store
            .upsert(&file("A.java", "v2"), &record("New", FrameworkRole::Repository))
            .unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["A.java"].classes[0].name, "New");
        assert_eq!(store.checksums().unwrap()["A.java"], "v2");
        assert_eq!(store.stats().unwrap().count_for(FrameworkRole::Repository), 1);
        assert_eq!(store.stats().unwrap().count_for(FrameworkRole::Service), 0);
    }

    #[test]
    fn test_update_record_keeps_checksum() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();
        store
            .upsert(&file("A.java", "sum"), &record("A", FrameworkRole::Other))
            .unwrap();

        let mut changed = record("A", FrameworkRole::Other);
        changed.package = "com.other".to_string();
        store.update_record("A.java", &changed).unwrap();

        assert_eq!(store.get("A.java").unwrap().unwrap().package, "com.other");
        assert_eq!(store.checksums().unwrap()["A.java"], "sum");
        assert!(store.update_record("B.java", &changed).is_err());
    }

    #[test]
    fn test_mark_excluded_drops_record_keeps_checksum() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();
        store
            .upsert(&file("FooTest.java", "v1"), &record("Foo", FrameworkRole::Other))
            .unwrap();

        store.mark_excluded(&file("FooTest.java", "v2")).unwrap();

        assert_eq!(store.get("FooTest.java").unwrap(), None);
        assert_eq!(store.checksums().unwrap()["FooTest.java"], "v2");
    }

    #[test]
    fn test_concurrent_upserts_of_distinct_keys() {
        let dir = tempdir().unwrap();
        let store = Arc::new(IndexStore::open(dir.path().join("index.db")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let name = format!("C{}_{}", worker, i);
                        let path = format!("src/{}.java", name);
                        store
                            .upsert(&file(&path, &name), &record(&name, FrameworkRole::Service))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 80);
        assert_eq!(all["src/C3_7.java"].classes[0].name, "C3_7");
        assert_eq!(store.checksums().unwrap().len(), 80);
    }

    #[test]
    fn test_reopen_yields_same_state() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        let before = {
            let store = IndexStore::open(&db_path).unwrap();
            store
                .upsert(&file("A.java", "1"), &record("A", FrameworkRole::Model))
                .unwrap();
            store
                .upsert(&file("B.java", "2"), &record("B", FrameworkRole::Dto))
                .unwrap();
            store.get_all().unwrap()
        };

        let reopened = IndexStore::open(&db_path).unwrap();
        assert_eq!(reopened.get_all().unwrap(), before);
    }

    #[test]
    fn test_prune_missing() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();
        std::fs::write(dir.path().join("Kept.java"), "class Kept {}").unwrap();

        store
            .upsert(&file("Kept.java", "1"), &record("Kept", FrameworkRole::Other))
            .unwrap();
        store
            .upsert(&file("Gone.java", "2"), &record("Gone", FrameworkRole::Other))
            .unwrap();

        let pruned = store.prune_missing(dir.path()).unwrap();
        assert_eq!(pruned, vec!["Gone.java".to_string()]);
        assert!(store.get("Gone.java").unwrap().is_none());
        assert!(store.get("Kept.java").unwrap().is_some());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();
        store
            .upsert(&file("A.java", "1"), &record("A", FrameworkRole::Other))
            .unwrap();

        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
        assert!(store.checksums().unwrap().is_empty());
    }
}
