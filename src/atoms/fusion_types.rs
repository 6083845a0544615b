// ── Mnema Atoms: Pipeline & Fusion Types ───────────────────────────────────
//
// Per-query data types for the retrieval-and-fusion pipeline: intent
// classification, in-flight candidates, prompt-ready memory cards, the final
// fusion envelope, diagnostics, and the recognized configuration surface.
//
// These are pure data types. All scoring and selection logic lives in
// engine/; the envelope is a closed record — unknown fields are rejected at
// the boundary rather than carried along.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::atoms::types::Chunk;

// ═══════════════════════════════════════════════════════════════════════════
// Intent Classification
// ═══════════════════════════════════════════════════════════════════════════

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// A question answered from knowledge chunks (default).
    KnowledgeQuery,
    /// A request to recall prior dialog — takes the shortcut retrieval path.
    ConversationRecall,
}

/// Whether recall spans one session or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    Session,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: QueryIntent,
    pub scope: QueryScope,
    pub confidence: f64,
}

/// Temporal hints derived from the query text. Feed the temporal weighter
/// and the confidence calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHints {
    /// Query references a specific time ("last week", "3 days ago", …).
    pub temporal: bool,
    /// Query asks for the latest state ("current", "newest", …).
    pub recent: bool,
}

impl QueryHints {
    pub fn any(&self) -> bool {
        self.temporal || self.recent
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Candidates & Cards
// ═══════════════════════════════════════════════════════════════════════════

/// A chunk under consideration for one query, with its score decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk: Chunk,
    /// Cosine similarity shifted into [0, 1].
    pub cos01: f64,
    /// Final composite score: baseline × provenance penalty × temporal weight.
    pub salience: f64,
    /// Score before provenance and temporal adjustments.
    pub baseline_salience: f64,
    pub provenance_penalty: f64,
    pub temporal_multiplier: f64,
    #[serde(default)]
    pub low_confidence: bool,
}

/// A prompt-ready memory excerpt handed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCard {
    pub label: String,
    pub content: String,
    pub tokens: usize,
    pub salience: f64,
    pub source_id: String,
    #[serde(default)]
    pub low_confidence: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Artifact Classification
// ═══════════════════════════════════════════════════════════════════════════

/// Classification of a conversation summary. Precedence when multiple
/// categories fire: constraint > decision > hypothesis > discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Decision,
    Constraint,
    Hypothesis,
    Discussion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactClassification {
    pub artifact_type: ArtifactType,
    pub confidence: f64,
    /// Up to 3 supporting lines, each bounded (200 chars; 150 for
    /// discussion).
    pub extracted: Vec<String>,
    pub tags: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════════════════

/// Where the generator should lean for this answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingHint {
    MemoryFirst,
    GeneralFirst,
    Blend,
}

/// Confidence level written into the answer footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// Salience distribution over the final card set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SalienceStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Retrieval-quality metrics computed over the final ranked card set.
/// Observability only — never alters selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Ranking quality: 1.0 = perfect descending-salience order.
    pub ndcg: f64,
    pub mean_salience: f64,
    pub candidates_considered: usize,
    pub cards_packed: usize,
    pub chars_packed: usize,
}

/// One per-stage diagnostics event, emitted in stage order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: String,
    pub candidates: usize,
    pub duration_ms: u64,
}

/// Per-query observability record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub query_id: String,
    pub stages: Vec<StageEvent>,
    pub source_histogram: HashMap<String, usize>,
    pub type_histogram: HashMap<String, usize>,
    pub salience: SalienceStats,
    /// Blended size/diversity coverage of the final card set.
    pub coverage: f64,
    /// Fraction of candidates whose event timestamp was a fallback.
    pub timestamp_fallback_pct: f64,
    /// Fraction of cards carrying a real (non-fallback) event timestamp.
    pub timestamp_coverage: f64,
    pub temporal_weight_avg: f64,
    pub diversity_swaps: usize,
    pub sessions_represented: usize,
    pub timeline_span_minutes: f64,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetrics>,
}

/// The final structured output of one retrieval: cards, fusion weights,
/// general-knowledge allowance, and routing guidance for the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionEnvelope {
    pub memory_cards: Vec<MemoryCard>,
    pub avg_salience: f64,
    pub memory_weight: f64,
    pub general_weight: f64,
    /// General-knowledge sentences permitted in the answer: 0, 1 or 3.
    pub gk_allowance: u8,
    pub rationale: String,
    pub routing_hint: RoutingHint,
    pub had_candidates: bool,
    /// Gate threshold when the legacy dynamic gate ran; None otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_gate: Option<f64>,
    pub low_confidence_count: usize,
    pub diagnostics: Diagnostics,
}

impl FusionEnvelope {
    /// The degraded envelope shared by the empty-store, cancelled and
    /// overloaded paths: no cards, general-first routing, full GK latitude.
    pub fn minimal(rationale: impl Into<String>) -> Self {
        FusionEnvelope {
            memory_cards: Vec::new(),
            avg_salience: 0.0,
            memory_weight: 0.2,
            general_weight: 0.8,
            gk_allowance: 3,
            rationale: rationale.into(),
            routing_hint: RoutingHint::GeneralFirst,
            had_candidates: false,
            dynamic_gate: None,
            low_confidence_count: 0,
            diagnostics: Diagnostics::default(),
        }
    }
}

/// Everything `retrieve()` hands back: the envelope for the generator plus
/// the wider orchestrator view (capped separately from the card budget).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub envelope: FusionEnvelope,
    pub orchestrator_view: Vec<MemoryCard>,
}

// ═══════════════════════════════════════════════════════════════════════════
// LLM generation parameters
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            max_tokens: 1024,
            temperature: 0.4,
            top_p: 0.95,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Diversity enforcement targets applied by the selection pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiversityQuotas {
    pub max_per_source: usize,
    pub min_unique_types: usize,
    pub min_unique_sources: usize,
}

impl Default for DiversityQuotas {
    fn default() -> Self {
        DiversityQuotas {
            max_per_source: 2,
            min_unique_types: 3,
            min_unique_sources: 5,
        }
    }
}

/// Salience multipliers for chunks with degraded provenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProvenancePenalties {
    /// Provenance entirely missing.
    pub missing: f64,
    /// Provenance present but written under an older schema version.
    pub stale: f64,
}

impl Default for ProvenancePenalties {
    fn default() -> Self {
        ProvenancePenalties {
            missing: 0.8,
            stale: 0.9,
        }
    }
}

/// Tuning for the temporal weighter. Half-lifes in days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TemporalTuning {
    pub half_life_temporal: f64,
    pub half_life_recent: f64,
    pub half_life_default: f64,
    pub floor_temporal: f64,
    pub floor_default: f64,
    pub fresh_boost: f64,
    /// Age in days under which the fresh boost applies.
    pub fresh_boost_max_age_days: f64,
}

impl Default for TemporalTuning {
    fn default() -> Self {
        TemporalTuning {
            half_life_temporal: 14.0,
            half_life_recent: 30.0,
            half_life_default: 90.0,
            floor_temporal: 0.65,
            floor_default: 0.80,
            fresh_boost: 1.10,
            fresh_boost_max_age_days: 2.0,
        }
    }
}

/// Semantic re-query expansion: re-search the store with key-term summaries
/// of the top stage-1 candidates and union the results. No edge traversal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ExpansionConfig {
    pub enabled: bool,
    /// How many top candidates seed a re-query.
    pub top_k: usize,
    /// Key terms per re-query summary.
    pub terms_per_query: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        ExpansionConfig {
            enabled: false,
            top_k: 3,
            terms_per_query: 5,
        }
    }
}

/// The recognized configuration surface of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Stage-1 candidate cap passed to the store.
    pub initial_retrieval_count: usize,
    /// Minimum cosine for candidacy.
    pub similarity_threshold: f64,
    /// Cards returned to the LLM.
    pub final_core_count: usize,
    /// Cards visible to the orchestrator/UI.
    pub orchestrator_view_count: usize,
    /// Total context character budget.
    pub max_context_length: usize,
    /// Per-card character budget.
    pub max_memory_length: usize,
    pub quotas: DiversityQuotas,
    pub provenance_penalty: ProvenancePenalties,
    pub temporal: TemporalTuning,
    pub expansion: ExpansionConfig,
    /// Pattern categories a summary must hit to leave `discussion`.
    pub artifact_min_categories: usize,
    /// Store search budget in seconds.
    pub store_timeout_secs: u64,
    /// Whole-pipeline soft cap in seconds; exceeding logs a warning.
    pub soft_cap_secs: u64,
    /// Queries in flight beyond this fast-fail as overloaded.
    pub max_in_flight: usize,
    /// Strict mode: embedding sanity failures and the hash-only backend are
    /// fatal instead of degraded.
    pub pilot_mode: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            initial_retrieval_count: 500,
            similarity_threshold: 0.01,
            final_core_count: 12,
            orchestrator_view_count: 50,
            max_context_length: 6000,
            max_memory_length: 800,
            quotas: DiversityQuotas::default(),
            provenance_penalty: ProvenancePenalties::default(),
            temporal: TemporalTuning::default(),
            expansion: ExpansionConfig::default(),
            artifact_min_categories: 2,
            store_timeout_secs: 20,
            soft_cap_secs: 30,
            max_in_flight: 32,
            pilot_mode: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_envelope_shape() {
        let env = FusionEnvelope::minimal("cancelled");
        assert!(env.memory_cards.is_empty());
        assert!(!env.had_candidates);
        assert_eq!(env.routing_hint, RoutingHint::GeneralFirst);
        assert_eq!(env.rationale, "cancelled");
        assert!((env.memory_weight + env.general_weight - 1.0).abs() < 1e-9);
        assert!(env.memory_weight <= 0.2);
        assert_eq!(env.gk_allowance, 3);
    }

    #[test]
    fn test_routing_hint_wire_format() {
        let s = serde_json::to_string(&RoutingHint::MemoryFirst).unwrap();
        assert_eq!(s, "\"memory-first\"");
        let s = serde_json::to_string(&RoutingHint::GeneralFirst).unwrap();
        assert_eq!(s, "\"general-first\"");
    }

    #[test]
    fn test_config_defaults_match_contract() {
        let cfg = RetrievalConfig::default();
        assert_eq!(cfg.initial_retrieval_count, 500);
        assert!((cfg.similarity_threshold - 0.01).abs() < 1e-9);
        assert_eq!(cfg.final_core_count, 12);
        assert_eq!(cfg.orchestrator_view_count, 50);
        assert_eq!(cfg.max_context_length, 6000);
        assert_eq!(cfg.max_memory_length, 800);
        assert_eq!(cfg.quotas.max_per_source, 2);
        assert_eq!(cfg.quotas.min_unique_sources, 5);
        assert!((cfg.provenance_penalty.missing - 0.8).abs() < 1e-9);
        assert!((cfg.provenance_penalty.stale - 0.9).abs() < 1e-9);
        assert!(!cfg.pilot_mode);
    }

    #[test]
    fn test_config_partial_deserialization_fills_defaults() {
        let cfg: RetrievalConfig =
            serde_json::from_str(r#"{"final_core_count": 8, "pilot_mode": true}"#).unwrap();
        assert_eq!(cfg.final_core_count, 8);
        assert!(cfg.pilot_mode);
        assert_eq!(cfg.initial_retrieval_count, 500);
        assert_eq!(cfg.quotas, DiversityQuotas::default());
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
    }
}
