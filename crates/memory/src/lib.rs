//! Knowledge store for Persona: embedded documents and similarity search.

pub mod knowledge;
pub mod vector;

pub use knowledge::{
    DeleteOutcome, Document, DocumentSummary, DocumentUpdate, KnowledgeStats, KnowledgeStore,
    NewDocument, SearchHit,
};
pub use vector::{cosine_similarity, LinearIndex, VectorIndex};
