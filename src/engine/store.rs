// ── Mnema Engine: External Store & Generator Seams ─────────────────────────
//
// The pipeline consumes its collaborators through narrow async traits:
// the memory store (similarity search + full enumeration for the recall
// fast path) and the LLM generator (invoked by the orchestrator's caller,
// never by the core itself).
//
// `InMemoryStore` is the reference store: an in-process chunk list with
// cosine search over the configured embedding backend. It backs tests,
// demos and embedding-free deployments; production deployments implement
// `MemoryStore` over their own storage engine.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::atoms::error::{MnemaError, MnemaResult};
use crate::atoms::fusion_types::GenerationParams;
use crate::atoms::types::{Chunk, StoreHit};
use crate::engine::embedding::{cosine_similarity, EmbeddingBackend};
use crate::engine::provenance;

// ═══════════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════════

/// The memory graph, seen from the pipeline. Implementations must be safe
/// for concurrent reads; ingestion writes are outside the pipeline.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Similarity search. `similarity` on each hit is cosine in [-1, 1].
    async fn search_memories(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> MnemaResult<Vec<StoreHit>>;

    /// Full enumeration — used only by the conversation-recall fast path.
    async fn all_chunks(&self) -> MnemaResult<Vec<Chunk>>;
}

/// The text generator. Messages are (role, content) pairs.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        messages: &[(String, String)],
        params: GenerationParams,
    ) -> MnemaResult<String>;
}

// ═══════════════════════════════════════════════════════════════════════════
// In-memory reference store
// ═══════════════════════════════════════════════════════════════════════════

pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    embeddings: Arc<dyn EmbeddingBackend>,
}

impl InMemoryStore {
    pub fn new(embeddings: Arc<dyn EmbeddingBackend>) -> Self {
        InMemoryStore {
            chunks: RwLock::new(Vec::new()),
            embeddings,
        }
    }

    /// Ingest one chunk: enforce provenance, embed if the caller did not.
    ///
    /// An embedding failure skips the chunk (it is not stored) and surfaces
    /// the error so the caller can count skips.
    pub async fn add(&self, chunk: Chunk) -> MnemaResult<()> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut chunk = provenance::enforce(chunk, now_ms);
        if chunk.embedding.is_none() {
            let vec = self
                .embeddings
                .generate(&chunk.content)
                .await
                .map_err(|e| MnemaError::EmbeddingFailure(format!("ingest embed: {e}")))?;
            chunk.embedding = Some(vec);
        }
        self.chunks.write().push(chunk);
        Ok(())
    }

    pub async fn add_many(&self, chunks: Vec<Chunk>) -> MnemaResult<usize> {
        let mut stored = 0usize;
        for chunk in chunks {
            if self.add(chunk).await.is_ok() {
                stored += 1;
            }
        }
        Ok(stored)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn search_memories(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> MnemaResult<Vec<StoreHit>> {
        let query_vec = self.embeddings.generate(query).await?;

        let mut hits: Vec<StoreHit> = self
            .chunks
            .read()
            .iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                let similarity = cosine_similarity(&query_vec, embedding);
                (similarity >= threshold).then(|| StoreHit {
                    chunk: chunk.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn all_chunks(&self) -> MnemaResult<Vec<Chunk>> {
        Ok(self.chunks.read().clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
