// ── Mnema Engine ───────────────────────────────────────────────────────────
//
// The retrieval-and-fusion pipeline. Per query:
//
//   intent → retrieve → score → diversity → fuse → (external LLM) → envelope
//
// Provenance enforcement and type classification run at ingest and on-read.
//
// Sub-modules:
//   - provenance: metadata schema enforcement (source ids, event times)
//   - chunk_types: deterministic chunk-type cascade
//   - artifacts: conversation-summary classification
//   - temporal: query hints + bounded decay multiplier
//   - intent: recall-vs-knowledge query classification
//   - store: MemoryStore / LlmBackend seams + in-memory reference store
//   - embedding: EmbeddingBackend seam, HTTP + hash adapters, sanity probe
//   - retriever: stage-1 candidate retrieval (both paths)
//   - expansion: semantic re-query widening
//   - salience: composite scoring + legacy dynamic gate
//   - diversity: stable keys + three-pass source/type enforcement
//   - fusion: memory/general weighting, coverage, GK allowance
//   - envelope: de-hedging + answer footer
//   - quality: NDCG + health warnings over the final card set
//   - orchestrator: the single `retrieve()` entrypoint

pub mod artifacts;
pub mod chunk_types;
pub mod diversity;
pub mod embedding;
pub mod envelope;
pub mod expansion;
pub mod fusion;
pub mod intent;
pub mod orchestrator;
pub mod provenance;
pub mod quality;
pub mod retriever;
pub mod salience;
pub mod store;
pub mod temporal;

// Re-exports for convenience
pub use artifacts::classify_artifact;
pub use chunk_types::classify_chunk;
pub use diversity::{enforce_diversity, stable_key};
pub use embedding::{
    cosine_similarity, normalize, sanity_check, EmbeddingBackend, HashEmbedding,
    HttpEmbeddingClient,
};
pub use envelope::{dehedge, enforce_answer_footer, finalize_answer, infer_confidence};
pub use expansion::key_terms;
pub use fusion::compose;
pub use intent::classify_intent;
pub use orchestrator::{
    CancelSignal, DiagnosticsSink, LogSink, Orchestrator, RetrieveOptions,
};
pub use provenance::enforce;
pub use quality::{assess_quality, build_quality_metrics, compute_ndcg};
pub use salience::{apply_gate, dynamic_gate, score_candidates};
pub use store::{InMemoryStore, LlmBackend, MemoryStore};
pub use temporal::{derive_hints, temporal_multiplier};
