// Structural lookups over the index: definitions, callers and neighbouring files

use anyhow::Result;

use std::collections::BTreeSet;

use crate::graph::{CallGraph, DependencyGraph, Snapshot};
use crate::index::db::IndexStore;
use crate::index::MethodSymbol;

/// One place in the indexed sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub detail: String,
}

pub struct ReferenceFinder {
    snapshot: Snapshot,
    calls: CallGraph,
    dependencies: DependencyGraph,
}

impl ReferenceFinder {
    pub fn new(snapshot: Snapshot) -> Self {
        let calls = CallGraph::build(&snapshot);
        let dependencies = DependencyGraph::build(&snapshot);
        Self {
            snapshot,
            calls,
            dependencies,
        }
    }

    pub fn from_store(store: &IndexStore) -> Result<Self> {
        Ok(Self::new(store.get_all()?))
    }

    /// Method declarations with this name
    pub fn find_definitions(&self, method: &str) -> Vec<Location> {
        let mut results = Vec::new();
        for (file, record) in &self.snapshot {
            for symbol in record.methods.iter().filter(|m| m.name == method) {
                results.push(Location {
                    file: file.clone(),
                    line: symbol.line_number,
                    detail: MethodSymbol::signature(symbol),
                });
            }
        }
        results
    }

    /// Invocation sites of `method` in files whose calls resolved to an indexed definition
    pub fn find_callers(&self, method: &str) -> Vec<Location> {
        let mut results = Vec::new();
        for edge in self.calls.references(method) {
            let Some(record) = self.snapshot.get(&edge.caller) else {
                continue;
            };
            for invocation in record.invocations.iter().filter(|i| i.name == method) {
                let location = Location {
                    file: edge.caller.clone(),
                    line: invocation.line_number,
                    detail: format!("calls {} in {}", method, edge.callee_file),
                };
                if !results.contains(&location) {
                    results.push(location);
                }
            }
        }
        results.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        results
    }

    /// Files that call into the given file
    pub fn find_calling_files(&self, file: &str) -> Vec<String> {
        self.calls.callers_of(file).map(str::to_string).collect()
    }

    /// Files the given file calls into
    pub fn find_called_files(&self, file: &str) -> Vec<String> {
        self.calls.callees_of(file).map(str::to_string).collect()
    }

    /// Simple names imported by the classes of a file
    pub fn imports_of(&self, file: &str) -> Vec<String> {
        let mut names = BTreeSet::new();
        for class in self.classes_in(file) {
            names.extend(self.dependencies.dependencies_of(class).map(str::to_string));
        }
        names.into_iter().collect()
    }

    /// Classes elsewhere that import one of the classes of a file
    pub fn importers_of(&self, file: &str) -> Vec<String> {
        let own: BTreeSet<&str> = self.classes_in(file).collect();
        let mut names = BTreeSet::new();
        for class in &own {
            names.extend(
                self.dependencies
                    .dependents_of(class)
                    .filter(|dependent| !own.contains(dependent))
                    .map(str::to_string),
            );
        }
        names.into_iter().collect()
    }

    fn classes_in<'a>(&'a self, file: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.snapshot
            .get(file)
            .into_iter()
            .flat_map(|record| record.class_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::bank_snapshot;
    use crate::index::Invocation;

    fn finder() -> ReferenceFinder {
        let mut snapshot = bank_snapshot();
        snapshot
            .get_mut("controller/AccountController.java")
            .unwrap()
            .invocations = vec![
            Invocation {
                name: "transfer".to_string(),
                line_number: 17,
            },
            Invocation {
                name: "findAll".to_string(),
                line_number: 11,
            },
        ];
        snapshot
            .get_mut("service/AccountServiceImpl.java")
            .unwrap()
            .methods = vec![MethodSymbol {
            name: "transfer".to_string(),
            class: "AccountServiceImpl".to_string(),
            line_number: 21,
            return_type: "void".to_string(),
            parameters: vec!["Long".to_string(), "Long".to_string(), "BigDecimal".to_string()],
            annotations: vec!["Transactional".to_string()],
        }];
        ReferenceFinder::new(snapshot)
    }

    #[test]
    fn test_definitions_and_callers() {
        let finder = finder();

        let defs = finder.find_definitions("transfer");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].file, "service/AccountServiceImpl.java");
        assert_eq!(defs[0].detail, "void AccountServiceImpl.transfer(Long, Long, BigDecimal)");

        let callers = finder.find_callers("transfer");
        assert_eq!(callers.len(), 1);
        assert_eq!(callers[0].file, "controller/AccountController.java");
        assert_eq!(callers[0].line, 17);

        // Unresolved invocations are not references
        assert!(finder.find_callers("findAll").is_empty());
        assert!(finder.find_definitions("missing").is_empty());
    }

    #[test]
    fn test_calling_files() {
        let finder = finder();
        assert_eq!(
            finder.find_calling_files("service/AccountServiceImpl.java"),
            vec!["controller/AccountController.java"]
        );
        assert_eq!(
            finder.find_called_files("controller/AccountController.java"),
            vec!["service/AccountServiceImpl.java"]
        );
        assert!(finder.find_called_files("service/AccountServiceImpl.java").is_empty());
    }

    #[test]
    fn test_imports_and_importers() {
        let finder = finder();
        assert_eq!(
            finder.imports_of("service/AccountServiceImpl.java"),
            vec!["AccountRepository"]
        );
        assert_eq!(
            finder.importers_of("service/AccountService.java"),
            vec!["AccountController"]
        );
        assert!(finder.imports_of("missing/File.java").is_empty());
        assert!(finder.importers_of("missing/File.java").is_empty());
    }
}
