// Mnema — memory-aware context retrieval and fusion for conversational
// agents.
//
// Given a user query and a store of provenance-enforced memory chunks,
// Mnema selects a small, diverse, temporally-weighted card set, derives
// memory/general-knowledge fusion weights, and post-processes the generated
// answer with a calibrated confidence footer.
//
// Layering:
//   atoms/  — pure data types, constants, errors (no I/O)
//   engine/ — the pipeline itself
//
// Typical use:
//
// ```no_run
// use std::sync::Arc;
// use mnema::engine::{HashEmbedding, InMemoryStore, Orchestrator, RetrieveOptions};
// use mnema::RetrievalConfig;
//
// # async fn demo() -> mnema::MnemaResult<()> {
// let embeddings = Arc::new(HashEmbedding::default());
// let store = Arc::new(InMemoryStore::new(embeddings.clone()));
// let orchestrator =
//     Orchestrator::with_embeddings(store, embeddings, RetrievalConfig::default()).await?;
//
// let outcome = orchestrator
//     .retrieve("what did we decide last week", RetrieveOptions::default())
//     .await;
// // …run the LLM with outcome.envelope.memory_cards…
// let answer = orchestrator.finalize_answer("raw llm text", &outcome.envelope, "query");
// # let _ = answer;
// # Ok(())
// # }
// ```

// ── Mnema Atoms (types, constants, errors) ─────────────────────────────────
pub mod atoms;

// ── Mnema Engine (the pipeline) ────────────────────────────────────────────
pub mod engine;

pub use atoms::error::{MnemaError, MnemaResult};
pub use atoms::fusion_types::{
    ArtifactClassification, ArtifactType, Candidate, ConfidenceLevel, Diagnostics,
    DiversityQuotas, ExpansionConfig, FusionEnvelope, GenerationParams, IntentClassification,
    MemoryCard, ProvenancePenalties, QualityMetrics, QueryHints, QueryIntent, QueryScope,
    RetrievalConfig, RetrievalOutcome, RoutingHint, SalienceStats, StageEvent, TemporalTuning,
};
pub use atoms::types::{
    Chunk, ChunkMetadata, ChunkType, Importance, SourceKind, StoreHit, TimestampSource,
};
pub use engine::{CancelSignal, Orchestrator, RetrieveOptions};
