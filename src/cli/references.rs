use anyhow::{bail, Result};

use crate::config::Config;
use crate::index::db::IndexStore;
use crate::query::references::ReferenceFinder;

pub async fn show_references(config: &Config, method: String, format: String) -> Result<()> {
    let db_path = config.index_db_path();
    if !db_path.exists() {
        bail!("No index at {}; run `index` first", db_path.display());
    }

    let finder = ReferenceFinder::from_store(&IndexStore::open(&db_path)?)?;
    let definitions = finder.find_definitions(&method);
    let callers = finder.find_callers(&method);

    match format.as_str() {
        "json" => {
            let to_json = |items: &[crate::query::references::Location]| -> Vec<serde_json::Value> {
                items
                    .iter()
                    .map(|l| serde_json::json!({"file": l.file, "line": l.line, "detail": l.detail}))
                    .collect()
            };
            let value = serde_json::json!({
                "method": method,
                "definitions": to_json(&definitions),
                "callers": to_json(&callers),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        "text" => {
            if definitions.is_empty() && callers.is_empty() {
                println!("No definitions or callers found for '{}'", method);
                return Ok(());
            }
            println!("Definitions of '{}': {}", method, definitions.len());
            for def in &definitions {
                println!("  {}:{} - {}", def.file, def.line, def.detail);
                let neighbours = [
                    ("called from", finder.find_calling_files(&def.file)),
                    ("calls into", finder.find_called_files(&def.file)),
                    ("imports", finder.imports_of(&def.file)),
                    ("imported by", finder.importers_of(&def.file)),
                ];
                for (label, names) in neighbours.iter().filter(|(_, names)| !names.is_empty()) {
                    println!("    {}: {}", label, names.join(", "));
                }
            }
            println!("Callers: {}", callers.len());
            for caller in &callers {
                println!("  {}:{} - {}", caller.file, caller.line, caller.detail);
            }
        }
        other => bail!("Unknown format: {}", other),
    }

    Ok(())
}
