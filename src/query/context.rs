// Query context assembly

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::embedding::{EmbeddingIndex, Embedder};
use super::summaries::SummaryStore;
use crate::graph::{ApiFlowGraph, MatrixRow, RelationshipMatrix, Snapshot};
use crate::index::db::IndexStore;
use crate::index::FrameworkRole;

/// Structural data the context draws on besides summaries
#[derive(Debug, Clone, Default)]
pub struct StructuralSources {
    pub api_flows: ApiFlowGraph,
    pub matrix: RelationshipMatrix,
    /// Role per indexed class name
    pub roles: BTreeMap<String, FrameworkRole>,
}

impl StructuralSources {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let roles = snapshot
            .values()
            .flat_map(|record| record.classes.iter().map(|c| (c.name.clone(), c.role)))
            .collect();
        Self {
            api_flows: ApiFlowGraph::build(snapshot),
            matrix: RelationshipMatrix::build(snapshot),
            roles,
        }
    }

    /// Graph files shipped alongside the summaries; no roles
    pub fn from_summaries(summaries: &SummaryStore) -> Self {
        Self {
            api_flows: summaries.load_api_flows(),
            matrix: summaries.load_matrix(),
            roles: BTreeMap::new(),
        }
    }

    /// Index database when present, otherwise the summary directory's graph files
    pub fn load(db_path: &Path, summaries: &SummaryStore) -> Result<Self> {
        if db_path.exists() {
            let store = IndexStore::open(db_path)?;
            let snapshot = store.get_all().context("Failed to read index snapshot")?;
            if !snapshot.is_empty() {
                info!("Using structural data from index ({} files)", snapshot.len());
                return Ok(Self::from_snapshot(&snapshot));
            }
        }
        info!("No index found, reading graph files from {}", summaries.dir().display());
        Ok(Self::from_summaries(summaries))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedComponent {
    pub name: String,
    pub summary: Option<String>,
    pub role: FrameworkRole,
    pub score: f32,
}

/// Everything a prompt is built from for one query
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub overview: String,
    /// Descending score, at most `top_n`
    pub components: Vec<RetrievedComponent>,
    pub api_flows: ApiFlowGraph,
    pub matrix: RelationshipMatrix,
}

impl QueryContext {
    pub fn component_names(&self) -> BTreeSet<String> {
        self.components.iter().map(|c| c.name.clone()).collect()
    }

    /// Every component name the context mentions anywhere
    pub fn known_names(&self) -> BTreeSet<String> {
        let mut names = self.component_names();
        for (_, flow) in self.api_flows.iter() {
            names.extend(flow.endpoints.iter().map(|e| e.class.clone()));
            for call in &flow.service_calls {
                names.insert(call.class.clone());
                names.insert(call.service.clone());
            }
            for call in &flow.repository_calls {
                names.insert(call.class.clone());
                names.insert(call.repository.clone());
            }
        }
        for (component, row) in self.matrix.iter() {
            names.insert(component.clone());
            names.extend(row.depends_on.iter().cloned());
            names.extend(row.used_by.iter().cloned());
        }
        names.remove("");
        names
    }
}

struct Retrieval {
    summaries: SummaryStore,
    index: EmbeddingIndex,
}

impl Retrieval {
    fn build(embedder: &dyn Embedder, summaries: SummaryStore) -> Self {
        let index = EmbeddingIndex::build(
            embedder,
            summaries
                .summaries()
                .iter()
                .map(|s| (s.name.as_str(), s.text.as_str())),
        );
        Self { summaries, index }
    }
}

/// Owns the summaries, their embeddings and the structural sources
pub struct ContextAssembler {
    embedder: Arc<dyn Embedder>,
    structure: StructuralSources,
    retrieval: RwLock<Retrieval>,
    top_n: usize,
}

impl ContextAssembler {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        summaries: SummaryStore,
        structure: StructuralSources,
        top_n: usize,
    ) -> Self {
        let retrieval = Retrieval::build(embedder.as_ref(), summaries);
        info!("Embedded {} summaries for retrieval", retrieval.index.len());
        Self {
            embedder,
            structure,
            retrieval: RwLock::new(retrieval),
            top_n,
        }
    }

    /// Reload summaries from disk and re-embed them; returns the entry count
    pub fn rebuild(&self) -> usize {
        let dir = self.retrieval.read().summaries.dir().to_path_buf();
        let fresh = Retrieval::build(self.embedder.as_ref(), SummaryStore::load(dir));
        let count = fresh.index.len();
        *self.retrieval.write() = fresh;
        info!("Rebuilt embedding index with {} entries", count);
        count
    }

    pub fn summaries_len(&self) -> usize {
        self.retrieval.read().index.len()
    }

    /// Template text from the summary directory, if present
    pub fn prompt_template(&self, name: &str) -> Option<String> {
        self.retrieval.read().summaries.prompts().get(name).map(str::to_string)
    }

    pub fn assemble(&self, query: &str) -> Result<QueryContext> {
        let query_vector = self.embedder.embed(query).context("Failed to embed query")?;
        let retrieval = self.retrieval.read();

        let components: Vec<RetrievedComponent> = retrieval
            .index
            .search(&query_vector, self.top_n)
            .into_iter()
            .map(|hit| {
                let summary = retrieval.summaries.get(&hit.name);
                let role = self
                    .structure
                    .roles
                    .get(&hit.name)
                    .copied()
                    .or_else(|| summary.map(|s| s.role))
                    .unwrap_or_default();
                RetrievedComponent {
                    summary: summary
                        .map(|s| s.text.clone())
                        .filter(|text| !text.trim().is_empty()),
                    role,
                    score: hit.score,
                    name: hit.name,
                }
            })
            .collect();

        let names: BTreeSet<String> = components.iter().map(|c| c.name.clone()).collect();
        let flow_paths: Vec<&String> = self
            .structure
            .api_flows
            .related_to(&names)
            .map(|(path, _)| path)
            .collect();
        let api_flows = self.structure.api_flows.subset(flow_paths);
        let matrix: RelationshipMatrix = self
            .structure
            .matrix
            .related_to(&names)
            .map(|(component, row): (&String, &MatrixRow)| (component.clone(), row.clone()))
            .collect();

        debug!(
            "Context for query: {} components, {} API flows, {} matrix rows",
            components.len(),
            api_flows.len(),
            matrix.len()
        );

        Ok(QueryContext {
            overview: retrieval.summaries.overview().to_string(),
            components,
            api_flows,
            matrix,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::graph::fixtures::bank_snapshot;
    use crate::query::embedding::HashEmbedder;
    use std::fs;
    use std::path::Path;

    pub fn write_bank_summaries(dir: &Path) {
        let files = dir.join("file_summaries");
        fs::create_dir_all(&files).unwrap();
        fs::write(dir.join("summary_of_summaries.md"), "A banking application with accounts and transfers.").unwrap();
        fs::write(
            files.join("controller_AccountController.java.md"),
            "AccountController exposes REST endpoints to list accounts and transfer money between accounts.",
        )
        .unwrap();
        fs::write(
            files.join("service_AccountServiceImpl.java.md"),
            "AccountServiceImpl implements account transfer logic and balance validation.",
        )
        .unwrap();
        fs::write(
            files.join("repository_AccountRepository.java.md"),
            "AccountRepository persists account entities with Spring Data JPA.",
        )
        .unwrap();
        fs::write(
            files.join("config_SecurityConfig.java.md"),
            "SecurityConfig sets up password encoding and HTTP security filters.",
        )
        .unwrap();
    }

    pub fn bank_assembler(dir: &Path, top_n: usize) -> ContextAssembler {
        write_bank_summaries(dir);
        ContextAssembler::new(
            Arc::new(HashEmbedder::new(256)),
            SummaryStore::load(dir),
            StructuralSources::from_snapshot(&bank_snapshot()),
            top_n,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_context_is_bounded_and_sorted() {
        let dir = tempdir().unwrap();
        let assembler = bank_assembler(dir.path(), 3);

        let context = assembler.assemble("How does a money transfer between accounts work?").unwrap();
        assert_eq!(context.components.len(), 3);
        assert!(context
            .components
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        assert!(context.overview.starts_with("A banking application"));
    }

    #[test]
    fn test_context_is_deterministic() {
        let dir = tempdir().unwrap();
        let assembler = bank_assembler(dir.path(), 4);

        let first = assembler.assemble("account transfer validation").unwrap();
        let second = assembler.assemble("account transfer validation").unwrap();
        assert_eq!(first.components, second.components);
    }

    #[test]
    fn test_related_flows_and_matrix_rows() {
        let dir = tempdir().unwrap();
        let assembler = bank_assembler(dir.path(), 10);

        let context = assembler.assemble("accounts").unwrap();
        let controller = context
            .components
            .iter()
            .find(|c| c.name == "AccountController")
            .unwrap();
        // Index role wins over the summary text
        assert_eq!(controller.role, FrameworkRole::Controller);
        assert!(controller.summary.as_deref().unwrap().contains("REST endpoints"));

        let config = context.components.iter().find(|c| c.name == "SecurityConfig").unwrap();
        assert_eq!(config.role, FrameworkRole::Other);

        assert_eq!(context.api_flows.len(), 2);
        assert!(context.matrix.get("AccountController").is_some());
        assert!(context.matrix.get("AccountRepository").is_some());

        let known = context.known_names();
        assert!(known.contains("AccountService"));
        assert!(known.contains("SecurityConfig"));
        assert!(!known.contains("LedgerService"));
    }

    #[test]
    fn test_rebuild_picks_up_new_summaries() {
        let dir = tempdir().unwrap();
        let assembler = bank_assembler(dir.path(), 10);
        assert_eq!(assembler.summaries_len(), 4);

        fs_write(dir.path(), "file_summaries/model_Loan.java.md", "Loan entity.");
        // Not visible until rebuilt
        assert_eq!(assembler.summaries_len(), 4);
        assert_eq!(assembler.rebuild(), 5);
        assert!(assembler
            .assemble("loan")
            .unwrap()
            .components
            .iter()
            .any(|c| c.name == "Loan"));
    }

    #[test]
    fn test_structural_sources_fall_back_to_summary_dir() {
        let dir = tempdir().unwrap();
        write_bank_summaries(dir.path());
        fs_write(
            dir.path(),
            "component_relationship_matrix.md",
            "| Component | Depends On | Used By |\n|---|---|---|\n| AccountController | AccountService | None |\n",
        );

        let summaries = SummaryStore::load(dir.path());
        let sources = StructuralSources::load(&dir.path().join("missing.db"), &summaries).unwrap();
        assert_eq!(sources.matrix.len(), 1);
        assert!(sources.api_flows.is_empty());
        assert!(sources.roles.is_empty());
    }

    fn fs_write(dir: &std::path::Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
