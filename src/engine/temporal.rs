// ── Mnema Engine: Temporal Weighting ───────────────────────────────────────
//
// Query-aware bounded exponential decay. Each candidate's event age is
// turned into a multiplier in [0.65, 1.15]:
//
//   w = clamp(floor + (1 - floor) · decay · fresh_boost, 0.65, 1.15)
//   decay = exp(-ln 2 · age_days / half_life)
//
// The half-life tightens for queries that reference time ("last week",
// "3 days ago") and loosens for timeless knowledge lookups, so stale chunks
// fade fast exactly when the user cares about recency. Chunks at most two
// days old get a small fresh boost on time-sensitive queries.

use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::constants::{TEMPORAL_MULTIPLIER_MAX, TEMPORAL_MULTIPLIER_MIN};
use crate::atoms::fusion_types::{QueryHints, TemporalTuning};
use crate::atoms::types::age_days;

// ═══════════════════════════════════════════════════════════════════════════
// Query hint patterns
// ═══════════════════════════════════════════════════════════════════════════

static TEMPORAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(last|yesterday|today|this week|last week|recent|recently)\b",
        r"(?i)\bon (january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}\b",
        r"(?i)\b\d+\s+(day|week|month|year)s?\s+ago\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("temporal hint pattern must compile"))
    .collect()
});

static RECENT_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(latest|current|now|recent|newest)\b")
        .expect("recency hint pattern must compile")
});

/// Derive temporal hints from the raw query text.
pub fn derive_hints(query: &str) -> QueryHints {
    QueryHints {
        temporal: TEMPORAL_PATTERNS.iter().any(|re| re.is_match(query)),
        recent: RECENT_PATTERNS.is_match(query),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Multiplier
// ═══════════════════════════════════════════════════════════════════════════

/// Compute the temporal multiplier for one candidate.
///
/// An absent or invalid (negative) event timestamp is neutral: 1.0.
pub fn temporal_multiplier(
    event_ts_ms: Option<i64>,
    now_ms: i64,
    hints: &QueryHints,
    tuning: &TemporalTuning,
) -> f64 {
    let ts = match event_ts_ms {
        Some(ts) if ts >= 0 => ts,
        _ => return 1.0,
    };

    let age = age_days(ts, now_ms);

    let half_life = if hints.temporal {
        tuning.half_life_temporal
    } else if hints.recent {
        tuning.half_life_recent
    } else {
        tuning.half_life_default
    };

    let floor = if hints.temporal {
        tuning.floor_temporal
    } else {
        tuning.floor_default
    };

    let decay = (-std::f64::consts::LN_2 * age / half_life).exp();

    let fresh_boost = if hints.any() && age <= tuning.fresh_boost_max_age_days {
        tuning.fresh_boost
    } else {
        1.0
    };

    (floor + (1.0 - floor) * decay * fresh_boost)
        .clamp(TEMPORAL_MULTIPLIER_MIN, TEMPORAL_MULTIPLIER_MAX)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
