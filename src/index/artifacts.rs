// JSON artifacts written next to the index database

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{error, info, warn};

use super::db::{now, IndexStore};
use super::{ComponentRecord, SourceFile};

pub const INDEX_FILE: &str = "index.json";
pub const CHECKSUM_FILE: &str = "file_checksums.json";
pub const API_FLOW_FILE: &str = "api_flow.json";
pub const MATRIX_FILE: &str = "component_relationship_matrix.md";
pub const DEPENDENCY_GRAPH_FILE: &str = "dependency_graph.dot";

/// Write a value as pretty JSON, creating parent directories
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read a JSON file, falling back to the default value on any failure
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        warn!("Artifact not found: {}", path.display());
        return T::default();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from));

    match parsed {
        Ok(value) => value,
        Err(e) => {
            error!("Error loading {}: {}", path.display(), e);
            T::default()
        }
    }
}

/// Write a text artifact; failures are logged, not propagated
pub fn write_text_logged(path: &Path, content: &str) -> bool {
    let result = path
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| std::fs::write(path, content));
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("Error saving {}: {}", path.display(), e);
            false
        }
    }
}

/// Export the store as `index.json` and `file_checksums.json`
pub fn export_index(store: &IndexStore, dir: &Path) -> Result<()> {
    let records = store.get_all()?;
    let checksums: BTreeMap<String, String> = store.checksums()?.into_iter().collect();

    save_json(&dir.join(INDEX_FILE), &records)?;
    save_json(&dir.join(CHECKSUM_FILE), &checksums)?;

    info!("Exported {} records to {}", records.len(), dir.display());
    Ok(())
}

/// Load `index.json` and `file_checksums.json` into the store.
///
/// Records without a checksum entry are stored with an empty checksum, which
/// makes the next scan treat them as changed.
pub fn import_index(store: &IndexStore, dir: &Path) -> Result<usize> {
    let records: BTreeMap<String, ComponentRecord> = load_json_or_default(&dir.join(INDEX_FILE));
    let checksums: HashMap<String, String> = load_json_or_default(&dir.join(CHECKSUM_FILE));
    let timestamp = now();

    for (path, record) in &records {
        let file = SourceFile {
            path: path.clone(),
            checksum: checksums.get(path).cloned().unwrap_or_default(),
            last_indexed: timestamp,
        };
        store.upsert(&file, record)?;
    }

    info!("Imported {} records from {}", records.len(), dir.display());
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Endpoint, FieldSymbol, FrameworkRole, HttpMethod, ServiceCall};
    use tempfile::tempdir;

    fn sample_record() -> ComponentRecord {
        let mut record = ComponentRecord {
            package: "com.bank.controller".to_string(),
            role: FrameworkRole::Controller,
            dependencies: vec!["com.bank.service.AccountService".to_string()],
            fields: vec![FieldSymbol {
                name: "accountService".to_string(),
                class: "AccountController".to_string(),
                type_name: "AccountService".to_string(),
                line_number: 12,
                annotations: vec![],
            }],
            ..Default::default()
        };
        record.api_flow.endpoints.push(Endpoint {
            method: "list".to_string(),
            path: "/accounts".to_string(),
            class: "AccountController".to_string(),
            line_number: 15,
            http_method: HttpMethod::Get,
        });
        record.api_flow.service_calls.push(ServiceCall {
            class: "AccountController".to_string(),
            service: "AccountService".to_string(),
            field: "accountService".to_string(),
        });
        record
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempdir().unwrap();
        let source = IndexStore::open(dir.path().join("a.db")).unwrap();
        let file = SourceFile {
            path: "src/AccountController.java".to_string(),
            checksum: "deadbeef".to_string(),
            last_indexed: now(),
        };
        source.upsert(&file, &sample_record()).unwrap();

        let out = dir.path().join("out");
        export_index(&source, &out).unwrap();

        let target = IndexStore::open(dir.path().join("b.db")).unwrap();
        assert_eq!(import_index(&target, &out).unwrap(), 1);

        assert_eq!(target.get_all().unwrap(), source.get_all().unwrap());
        assert_eq!(target.checksums().unwrap(), source.checksums().unwrap());
    }

    #[test]
    fn test_missing_or_corrupt_json_yields_default() {
        let dir = tempdir().unwrap();
        let missing: BTreeMap<String, ComponentRecord> =
            load_json_or_default(&dir.path().join("nope.json"));
        assert!(missing.is_empty());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        let value: HashMap<String, String> = load_json_or_default(&corrupt);
        assert!(value.is_empty());
    }

    #[test]
    fn test_checksum_file_is_flat_map() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(dir.path().join("a.db")).unwrap();
        store
            .upsert(
                &SourceFile {
                    path: "A.java".to_string(),
                    checksum: "00ff".to_string(),
                    last_indexed: 0,
                },
                &ComponentRecord::default(),
            )
            .unwrap();
        export_index(&store, dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(CHECKSUM_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["A.java"], "00ff");
    }
}
