// ── Mnema Atoms: Error Types ───────────────────────────────────────────────
// Single canonical error enum for the pipeline, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by failure domain (store, embedding,
//     sanity, cancellation, backpressure…).
//   • The `#[from]` attribute wires std/external error conversions
//     automatically.
//   • Only `Sanity` is fatal to callers; every other failure degrades to a
//     minimal envelope inside the orchestrator.
//   • No variant carries secret material (API keys, request bodies) in its
//     message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MnemaError {
    /// The memory store could not be reached or returned a failure.
    /// Degrades to an empty envelope with `rationale: "store unavailable"`.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The embeddings backend failed to produce a vector.
    /// On the query path this degrades to an empty envelope; on the ingest
    /// path the caller skips the chunk.
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// Sanity contract violation (zero-norm test embedding, hash-only
    /// backend in pilot mode). Fatal — propagates to the caller.
    #[error("Sanity failure: {0}")]
    Sanity(String),

    /// Internal invariant violation (e.g. a temporal multiplier outside its
    /// bounds). Logged critical and clamped at the violation site; carried
    /// as an error only when recovery is impossible.
    #[error("Bounds violation: {0}")]
    BoundsViolation(String),

    /// The caller's cancellation signal fired mid-pipeline.
    #[error("Cancelled")]
    Cancelled,

    /// Backpressure: too many queries in flight.
    #[error("Overloaded")]
    Overloaded,

    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Pipeline configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

impl MnemaError {
    /// True for the failure kinds that propagate past the orchestrator
    /// instead of degrading to a minimal envelope.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MnemaError::Sanity(_))
    }
}

// ── Migration bridge: String → MnemaError ──────────────────────────────────
// Allows `?` on helpers still returning `Result<T, String>` inside functions
// that return `MnemaResult<T>`.

impl From<String> for MnemaError {
    fn from(s: String) -> Self {
        MnemaError::Other(s)
    }
}

impl From<&str> for MnemaError {
    fn from(s: &str) -> Self {
        MnemaError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All pipeline operations return this type.
pub type MnemaResult<T> = Result<T, MnemaError>;
