// ── Mnema Atoms: Constants ─────────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic numbers,
// makes auditing easier, and keeps every layer's code self-documenting.

// ── Provenance schema ──────────────────────────────────────────────────────
// Monotonic version string stamped on every chunk by the provenance
// enforcer. Bump when the required-metadata contract changes; chunks carrying
// an older version are re-enforced on read and scored with a stale penalty.
pub const CURRENT_PROVENANCE_VERSION: &str = "1.1.0";

// ── Timestamp enforcement windows ──────────────────────────────────────────
// Used by `enforce()` in engine/provenance.rs.
//
// An event timestamp within PLACEHOLDER_WINDOW_MS of the ingest time is
// treated as an ingest-time placeholder and may be replaced by an inferred
// event time that differs by more than the same window. Event timestamps
// more than CLOCK_SKEW_TOLERANCE_MS in the future are rejected as invalid.
pub const PLACEHOLDER_WINDOW_MS: i64 = 60 * 60 * 1000; // 60 minutes
pub const CLOCK_SKEW_TOLERANCE_MS: i64 = 5 * 60 * 1000; // 5 minutes

// ── Similarity contract ────────────────────────────────────────────────────
// Store similarities are cosine values in [-1, 1]. Some backends return
// already-normalized [0, 1] values; anything beyond this epsilon above 1.0
// is flagged as a contract violation before clamping.
pub const SIMILARITY_UPPER_EPSILON: f64 = 1.0001;

// ── Salience gate bounds (legacy fallback path) ────────────────────────────
// The dynamic gate is the 60th percentile of cos01 over the candidate set,
// clamped to this range. Below-gate candidates are discarded unless fewer
// than GATE_MIN_SURVIVORS remain.
pub const GATE_FLOOR: f64 = 0.08;
pub const GATE_CEIL: f64 = 0.22;
pub const GATE_MIN_SURVIVORS: usize = 6;

// ── Temporal multiplier bounds ─────────────────────────────────────────────
// Hard bounds on the temporal weight. A computed value outside this range is
// an internal invariant violation: logged at error level and clamped.
pub const TEMPORAL_MULTIPLIER_MIN: f64 = 0.65;
pub const TEMPORAL_MULTIPLIER_MAX: f64 = 1.15;

// ── Conversation-recall fast path ──────────────────────────────────────────
// Uniform salience assigned to conversation turns on the recall path, which
// bypasses similarity gating entirely.
pub const RECALL_UNIFORM_SALIENCE: f64 = 0.9;

// ── Answer envelope ────────────────────────────────────────────────────────
// Bounds on extracted artifact payload lines (artifact classifier) and on
// the number of payload entries kept per classification.
pub const ARTIFACT_EXTRACT_MAX_CHARS: usize = 200;
pub const ARTIFACT_EXTRACT_MAX_CHARS_DISCUSSION: usize = 150;
pub const ARTIFACT_EXTRACT_MAX_ENTRIES: usize = 3;
