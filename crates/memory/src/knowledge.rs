//! In-memory knowledge store with embedding similarity search.
//!
//! Every document's embedding is computed from its current content before the
//! document becomes visible. Embedding calls run outside the index lock, so a
//! failed or slow embedding never leaves a half-written document behind.

use crate::vector::{LinearIndex, VectorIndex};
use chrono::{DateTime, Utc};
use persona_core::embedding::Embedder;
use persona_core::error::KnowledgeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A stored, embedded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Embedding of `content`. Never stale.
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `add_document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDocument {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// A search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub similarity: f32,
}

impl SearchHit {
    pub(crate) fn from_document(doc: &Document, similarity: f32) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            tags: doc.tags.clone(),
            similarity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub content_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_documents: usize,
    pub document_summaries: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub success: bool,
}

/// The knowledge store.
pub struct KnowledgeStore {
    embedder: Arc<dyn Embedder>,
    index: RwLock<Box<dyn VectorIndex>>,
}

impl KnowledgeStore {
    /// Create an empty store backed by a [`LinearIndex`].
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_index(embedder, Box::new(LinearIndex::new()))
    }

    pub fn with_index(embedder: Arc<dyn Embedder>, index: Box<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index: RwLock::new(index),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| KnowledgeError::EmbeddingFailed(e.to_string()))
    }

    /// Embed and insert a document. Re-adding an existing id replaces it
    /// without moving it in the ranking order.
    pub async fn add_document(&self, doc: NewDocument) -> Result<(), KnowledgeError> {
        let embedding = self.embed(&doc.content).await?;
        let now = Utc::now();

        let mut index = self.index.write().await;
        let created_at = index.get(&doc.id).map(|d| d.created_at).unwrap_or(now);
        debug!(id = %doc.id, dims = embedding.len(), "Document indexed");
        index.upsert(Document {
            id: doc.id,
            title: doc.title,
            content: doc.content,
            tags: doc.tags,
            embedding,
            created_at,
            updated_at: now,
        });
        Ok(())
    }

    /// Bulk-load documents. All embeddings are computed first; if any fails
    /// nothing is inserted.
    pub async fn seed(&self, docs: Vec<NewDocument>) -> Result<usize, KnowledgeError> {
        let mut embedded = Vec::with_capacity(docs.len());
        for doc in docs {
            let embedding = self.embed(&doc.content).await?;
            embedded.push((doc, embedding));
        }

        let now = Utc::now();
        let count = embedded.len();
        let mut index = self.index.write().await;
        for (doc, embedding) in embedded {
            let created_at = index.get(&doc.id).map(|d| d.created_at).unwrap_or(now);
            index.upsert(Document {
                id: doc.id,
                title: doc.title,
                content: doc.content,
                tags: doc.tags,
                embedding,
                created_at,
                updated_at: now,
            });
        }
        info!(count, total = index.len(), "Knowledge store seeded");
        Ok(count)
    }

    /// Rank every document against `query` and return the best `limit`.
    /// An empty store or a zero limit returns nothing without embedding.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, KnowledgeError> {
        if limit == 0 || self.index.read().await.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embed(query).await?;
        let hits = self.index.read().await.nearest(&query_embedding, limit);
        debug!(query_len = query.len(), hits = hits.len(), "Knowledge search");
        Ok(hits)
    }

    /// Merge `update` into document `id`. A content change is re-embedded
    /// before the new content is committed.
    pub async fn update_document(&self, id: &str, update: DocumentUpdate) -> Result<(), KnowledgeError> {
        let changed_content = {
            let index = self.index.read().await;
            let current = index
                .get(id)
                .ok_or_else(|| KnowledgeError::NotFound(id.to_string()))?;
            match &update.content {
                Some(content) if *content != current.content => Some(content.clone()),
                _ => None,
            }
        };

        let new_embedding = match changed_content {
            Some(content) => Some((self.embed(&content).await?, content)),
            None => None,
        };

        let mut index = self.index.write().await;
        // may have been deleted while embedding
        let mut doc = index
            .get(id)
            .cloned()
            .ok_or_else(|| KnowledgeError::NotFound(id.to_string()))?;

        if let Some(title) = update.title {
            doc.title = title;
        }
        if let Some(tags) = update.tags {
            doc.tags = tags;
        }
        if let Some((embedding, content)) = new_embedding {
            doc.content = content;
            doc.embedding = embedding;
        }
        doc.updated_at = Utc::now();
        index.upsert(doc);
        Ok(())
    }

    pub async fn delete_document(&self, id: &str) -> DeleteOutcome {
        let removed = self.index.write().await.remove(id).is_some();
        if removed {
            debug!(id, "Document deleted");
        }
        DeleteOutcome { success: removed }
    }

    pub async fn get(&self, id: &str) -> Option<Document> {
        self.index.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn stats(&self) -> KnowledgeStats {
        let index = self.index.read().await;
        KnowledgeStats {
            total_documents: index.len(),
            document_summaries: index
                .documents()
                .into_iter()
                .map(|d| DocumentSummary {
                    id: d.id.clone(),
                    title: d.title.clone(),
                    tags: d.tags.clone(),
                    content_length: d.content.chars().count(),
                })
                .collect(),
        }
    }
}
