// ── Mnema Atoms: Chunk & Provenance Types ──────────────────────────────────
//
// The persisted unit of memory (`Chunk`) and its enforced metadata schema.
// These are pure data types (no logic beyond small accessors, no I/O).
//
// A chunk arrives from ingestion with any subset of the metadata populated;
// the provenance enforcer (engine/provenance.rs) fills every required field
// before the chunk is exposed to the pipeline. Fields the enforcer fills are
// `Option`s here — `provenance_complete()` is the post-enforcement check.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Source Kinds
// ═══════════════════════════════════════════════════════════════════════════

/// Where a chunk originally came from. Drives source-id derivation and the
/// type-classification cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RepoFile,
    Conversation,
    Web,
    Pdf,
    Email,
    Note,
    Manual,
    #[default]
    Unknown,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::RepoFile => "repo_file",
            SourceKind::Conversation => "conversation",
            SourceKind::Web => "web",
            SourceKind::Pdf => "pdf",
            SourceKind::Email => "email",
            SourceKind::Note => "note",
            SourceKind::Manual => "manual",
            SourceKind::Unknown => "unknown",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Chunk Types
// ═══════════════════════════════════════════════════════════════════════════

/// Semantic chunk type, assigned by the deterministic rule cascade in
/// engine/chunk_types.rs. The `conversation_turn` alias covers legacy rows
/// written before turns and events were unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Readme,
    Documentation,
    Tutorial,
    DecisionRationale,
    ConstraintInvariant,
    ArchitectureDecision,
    #[serde(alias = "conversation_turn")]
    ConversationEvent,
    DiscussionThread,
    CodeImplementation,
    CodeExample,
    ApiReference,
    PaperExcerpt,
    WebArticle,
    ResearchNote,
    GeneralNote,
    #[default]
    Unknown,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Readme => "readme",
            ChunkType::Documentation => "documentation",
            ChunkType::Tutorial => "tutorial",
            ChunkType::DecisionRationale => "decision_rationale",
            ChunkType::ConstraintInvariant => "constraint_invariant",
            ChunkType::ArchitectureDecision => "architecture_decision",
            ChunkType::ConversationEvent => "conversation_event",
            ChunkType::DiscussionThread => "discussion_thread",
            ChunkType::CodeImplementation => "code_implementation",
            ChunkType::CodeExample => "code_example",
            ChunkType::ApiReference => "api_reference",
            ChunkType::PaperExcerpt => "paper_excerpt",
            ChunkType::WebArticle => "web_article",
            ChunkType::ResearchNote => "research_note",
            ChunkType::GeneralNote => "general_note",
            ChunkType::Unknown => "unknown",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Importance
// ═══════════════════════════════════════════════════════════════════════════

/// Caller-assigned importance. High and critical chunks receive an authority
/// boost during salience scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Importance {
    /// True for the levels that earn the authority boost.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Importance::High | Importance::Critical)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Timestamp provenance
// ═══════════════════════════════════════════════════════════════════════════

/// How the enforced event timestamp was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Derived from explicit event hints (event_time, created_at, …).
    InferredEventTime,
    /// The pre-existing timestamp was kept.
    Existing,
    /// No usable signal — stamped with the enforcement wall clock.
    FallbackNow,
    /// Explicit conversation/message time. Never overwritten by inference.
    ConversationEventTime,
}

// ═══════════════════════════════════════════════════════════════════════════
// Chunk Metadata
// ═══════════════════════════════════════════════════════════════════════════

/// Enforced provenance metadata. All timestamps are epoch milliseconds.
///
/// Unknown inbound fields are captured in `extra` — they are preserved
/// through round-trips but never interpreted by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<SourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Event time — when the remembered thing happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Ingestion time — when the chunk entered the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<ChunkType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_version: Option<String>,

    // ── Optional identity fields ───────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    // ── Event-time hints consumed by the enforcer ──────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,

    // ── Enforcement markers ────────────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_source: Option<TimestampSource>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timestamp_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_upgraded_from: Option<String>,

    /// Unknown inbound fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Post-enforcement invariant: every required field present and
    /// non-empty.
    pub fn provenance_complete(&self) -> bool {
        self.source_kind.is_some()
            && self.source_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.timestamp.is_some()
            && self.ingested_at.is_some()
            && self.chunk_type.is_some()
            && self
                .provenance_version
                .as_deref()
                .is_some_and(|v| !v.is_empty())
    }

    pub fn source_kind_or_unknown(&self) -> SourceKind {
        self.source_kind.unwrap_or_default()
    }

    pub fn chunk_type_or_unknown(&self) -> ChunkType {
        self.chunk_type.unwrap_or_default()
    }

    /// The enforced event timestamp, if valid (non-negative).
    pub fn event_ts(&self) -> Option<i64> {
        self.timestamp.filter(|ts| *ts >= 0)
    }

    /// True when an explicit conversation/message time pins the event
    /// timestamp against inference overrides.
    pub fn has_explicit_conversation_time(&self) -> bool {
        self.conversation_ts.is_some() || self.message_ts.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Chunk & Store Hit
// ═══════════════════════════════════════════════════════════════════════════

/// A unit of persisted memory: text, optional embedding, enforced metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// A chunk returned by the store's similarity search, with its raw cosine
/// similarity (nominally in [-1, 1]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHit {
    pub chunk: Chunk,
    pub similarity: f64,
}

/// Age in fractional days between an event timestamp and `now`, floored at
/// zero for future-dated events within skew tolerance.
pub fn age_days(event_ts_ms: i64, now_ms: i64) -> f64 {
    ((now_ms - event_ts_ms) as f64 / 86_400_000.0).max(0.0)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
