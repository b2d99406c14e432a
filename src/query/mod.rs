// Retrieval-augmented querying over summaries and the structural index

pub mod citations;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod llm;
pub mod prompt;
pub mod references;
pub mod summaries;

pub use context::{ContextAssembler, StructuralSources};
pub use engine::{QueryError, QueryKind, QueryRequest};
