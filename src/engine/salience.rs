// ── Mnema Engine: Salience Scoring ─────────────────────────────────────────
//
// Turns raw store hits into scored candidates:
//
//   cos01     = (similarity + 1) / 2
//   baseline  = clamp(cos01·0.8 + recency_boost + authority_boost, 0, 1)
//   salience  = baseline · provenance_penalty · temporal_multiplier
//
// The provenance penalty is judged on the chunk *as retrieved* (missing or
// stale schema), then the chunk is re-enforced so every downstream stage
// sees complete metadata. Temporal multipliers outside [0.65, 1.15] are an
// internal invariant violation: logged at error level and clamped.
//
// The dynamic gate at the bottom is the legacy fallback for stores that
// return unranked hits; the orchestrator skips it for pre-ranked results.

use log::{error, warn};

use crate::atoms::constants::{
    GATE_CEIL, GATE_FLOOR, GATE_MIN_SURVIVORS, SIMILARITY_UPPER_EPSILON,
    TEMPORAL_MULTIPLIER_MAX, TEMPORAL_MULTIPLIER_MIN,
};
use crate::atoms::fusion_types::{Candidate, QueryHints, RetrievalConfig};
use crate::atoms::types::{age_days, StoreHit};
use crate::engine::provenance;
use crate::engine::temporal::temporal_multiplier;

// ═══════════════════════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════════════════════

/// Score a batch of store hits. Returns candidates sorted descending by
/// salience plus any contract warnings (e.g. out-of-range similarities).
pub fn score_candidates(
    hits: Vec<StoreHit>,
    now_ms: i64,
    hints: &QueryHints,
    config: &RetrievalConfig,
) -> (Vec<Candidate>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut out_of_range_seen = false;

    let mut candidates: Vec<Candidate> = hits
        .into_iter()
        .map(|hit| {
            let mut similarity = hit.similarity;
            if !(-1.0..=SIMILARITY_UPPER_EPSILON).contains(&similarity) {
                if !out_of_range_seen {
                    let msg = format!(
                        "store similarity {similarity:.4} outside [-1, 1] — clamping"
                    );
                    warn!("[mnema:salience] {msg}");
                    warnings.push(msg);
                    out_of_range_seen = true;
                }
            }
            similarity = similarity.clamp(-1.0, 1.0);

            // Judge provenance on the chunk as retrieved, then re-enforce.
            let provenance_penalty = if !hit.chunk.metadata.provenance_complete() {
                config.provenance_penalty.missing
            } else if provenance::version_stale(&hit.chunk.metadata) {
                config.provenance_penalty.stale
            } else {
                1.0
            };
            let chunk = provenance::enforce(hit.chunk, now_ms);

            let cos01 = (similarity + 1.0) / 2.0;

            let recency_boost = match chunk.metadata.event_ts() {
                Some(ts) => {
                    let age = age_days(ts, now_ms);
                    if age < 7.0 {
                        0.08
                    } else if age < 30.0 {
                        0.04
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };

            let authority_boost = chunk
                .metadata
                .importance
                .map(|imp| if imp.is_authoritative() { 0.06 } else { 0.0 })
                .unwrap_or(0.0);

            let baseline_salience = (cos01 * 0.8 + recency_boost + authority_boost).clamp(0.0, 1.0);

            let mut temporal = temporal_multiplier(
                chunk.metadata.event_ts(),
                now_ms,
                hints,
                &config.temporal,
            );
            if !(TEMPORAL_MULTIPLIER_MIN..=TEMPORAL_MULTIPLIER_MAX).contains(&temporal) {
                error!(
                    "[mnema:salience] temporal multiplier {temporal:.4} outside \
                     [{TEMPORAL_MULTIPLIER_MIN}, {TEMPORAL_MULTIPLIER_MAX}] for chunk {} — clamping",
                    chunk.id
                );
                temporal = temporal.clamp(TEMPORAL_MULTIPLIER_MIN, TEMPORAL_MULTIPLIER_MAX);
            }

            Candidate {
                salience: baseline_salience * provenance_penalty * temporal,
                baseline_salience,
                provenance_penalty,
                temporal_multiplier: temporal,
                cos01,
                low_confidence: false,
                chunk,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    (candidates, warnings)
}

// ═══════════════════════════════════════════════════════════════════════════
// Dynamic gate (legacy fallback)
// ═══════════════════════════════════════════════════════════════════════════

/// The 60th percentile of cos01 over the candidate set, clamped to
/// [0.08, 0.22].
pub fn dynamic_gate(candidates: &[Candidate]) -> f64 {
    if candidates.is_empty() {
        return GATE_FLOOR;
    }
    let mut values: Vec<f64> = candidates.iter().map(|c| c.cos01).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((values.len() - 1) as f64 * 0.6).round() as usize;
    values[idx].clamp(GATE_FLOOR, GATE_CEIL)
}

/// Discard candidates below the gate. If fewer than six survive, the top
/// six by salience are kept instead, with the below-gate ones marked
/// low-confidence.
pub fn apply_gate(mut candidates: Vec<Candidate>, gate: f64) -> Vec<Candidate> {
    let survivors = candidates.iter().filter(|c| c.cos01 >= gate).count();
    if survivors >= GATE_MIN_SURVIVORS {
        candidates.retain(|c| c.cos01 >= gate);
        return candidates;
    }

    candidates.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(GATE_MIN_SURVIVORS);
    for cand in candidates.iter_mut() {
        if cand.cos01 < gate {
            cand.low_confidence = true;
        }
    }
    candidates
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
