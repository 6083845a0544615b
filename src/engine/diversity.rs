// ── Mnema Engine: Diversity Enforcement ────────────────────────────────────
//
// Guarantees the selected card set is not a monoculture. Three passes over
// the salience-ranked candidates:
//
//   Pass 1 (greedy)      — admit best-first while each source stays under
//                          `max_per_source`.
//   Pass 2 (fill)        — if the target count is not reached, admit best
//                          remaining candidates regardless of source quota,
//                          deduplicated by stable key.
//   Pass 3 (enforcement) — while too few unique sources are represented,
//                          swap the weakest admission of the most
//                          overrepresented source for a candidate from an
//                          unrepresented one; append instead when room
//                          remains; stop when no improving swap exists.
//
// The stable key prevents silent merges: source_id, else chunk id, else a
// 16-hex MD5 over (content[:100] | type | timestamp) so even unidentified
// chunks stay distinct.

use log::warn;
use std::collections::{HashMap, HashSet};

use crate::atoms::fusion_types::{Candidate, DiversityQuotas};
use crate::atoms::types::{Chunk, ChunkType};

// ═══════════════════════════════════════════════════════════════════════════
// Stable key
// ═══════════════════════════════════════════════════════════════════════════

/// Deduplication key for a chunk, guaranteed unique across unidentified
/// chunks.
pub fn stable_key(chunk: &Chunk) -> String {
    if let Some(sid) = chunk.metadata.source_id.as_deref() {
        if !sid.is_empty() {
            return sid.to_string();
        }
    }
    if !chunk.id.is_empty() {
        return chunk.id.clone();
    }
    let head: String = chunk.content.chars().take(100).collect();
    let type_str = chunk.metadata.chunk_type_or_unknown().as_str();
    let ts = chunk
        .metadata
        .timestamp
        .map(|t| t.to_string())
        .unwrap_or_default();
    md5_16(&format!("{head}|{type_str}|{ts}"))
}

/// First 16 hex chars of the MD5 of the input.
fn md5_16(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))[..16].to_string()
}

/// The quota-counting source of a candidate: the source id with its
/// `#fragment` stripped, so every message of one conversation (or every
/// page of one pdf) counts against the same source. Chunks without a
/// source id each count as their own source via the stable key.
pub fn source_key(chunk: &Chunk) -> String {
    match chunk.metadata.source_id.as_deref() {
        Some(sid) if !sid.is_empty() => sid.split('#').next().unwrap_or(sid).to_string(),
        _ => stable_key(chunk),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Enforcement
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct DiversityOutcome {
    /// Final selection, descending by salience.
    pub selected: Vec<Candidate>,
    /// Swaps performed by the enforcement pass.
    pub swaps: usize,
    pub warnings: Vec<String>,
}

/// Apply the three-pass diversity policy to salience-ranked candidates.
pub fn enforce_diversity(
    candidates: &[Candidate],
    target: usize,
    quotas: &DiversityQuotas,
) -> DiversityOutcome {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected: Vec<Candidate> = Vec::with_capacity(target);
    let mut per_source: HashMap<String, usize> = HashMap::new();
    let mut admitted_idx: HashSet<usize> = HashSet::new();

    // ── Pass 1: greedy under the per-source cap ──────────────────────────
    for (i, cand) in ranked.iter().enumerate() {
        if selected.len() >= target {
            break;
        }
        let src = source_key(&cand.chunk);
        let count = per_source.entry(src).or_insert(0);
        if *count < quotas.max_per_source {
            *count += 1;
            selected.push((*cand).clone());
            admitted_idx.insert(i);
        }
    }

    // ── Pass 2: fill to target, dedup by stable key ──────────────────────
    if selected.len() < target {
        let mut selected_keys: HashSet<String> =
            selected.iter().map(|c| stable_key(&c.chunk)).collect();
        for (i, cand) in ranked.iter().enumerate() {
            if selected.len() >= target {
                break;
            }
            if admitted_idx.contains(&i) {
                continue;
            }
            let key = stable_key(&cand.chunk);
            if selected_keys.insert(key) {
                *per_source.entry(source_key(&cand.chunk)).or_insert(0) += 1;
                selected.push((*cand).clone());
                admitted_idx.insert(i);
            }
        }
    }

    // ── Pass 3: swap-based source enforcement ────────────────────────────
    let mut swaps = 0usize;
    loop {
        let represented: HashSet<String> = selected.iter().map(|c| source_key(&c.chunk)).collect();
        if represented.len() >= quotas.min_unique_sources {
            break;
        }

        let selected_keys: HashSet<String> =
            selected.iter().map(|c| stable_key(&c.chunk)).collect();

        // Best remaining candidate from a source not yet represented.
        let incoming = ranked.iter().enumerate().find(|(i, cand)| {
            !admitted_idx.contains(i)
                && !represented.contains(&source_key(&cand.chunk))
                && !selected_keys.contains(&stable_key(&cand.chunk))
        });
        let Some((incoming_i, incoming)) = incoming else {
            break; // candidate pool exhausted
        };

        // Most overrepresented source (>1 admission), if any.
        let overrepresented = selected
            .iter()
            .map(|c| source_key(&c.chunk))
            .fold(HashMap::<String, usize>::new(), |mut acc, s| {
                *acc.entry(s).or_insert(0) += 1;
                acc
            })
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .max_by_key(|(_, n)| *n)
            .map(|(s, _)| s);

        match overrepresented {
            Some(src) => {
                // Swap out that source's lowest-salience admission.
                let victim = selected
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| source_key(&c.chunk) == src)
                    .min_by(|(_, a), (_, b)| {
                        a.salience
                            .partial_cmp(&b.salience)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(i, _)| i);
                let Some(victim_i) = victim else { break };
                selected[victim_i] = (*incoming).clone();
                admitted_idx.insert(incoming_i);
                swaps += 1;
            }
            None if selected.len() < target => {
                selected.push((*incoming).clone());
                admitted_idx.insert(incoming_i);
            }
            None => break, // no improving swap exists
        }
    }

    selected.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // ── Post-conditions ──────────────────────────────────────────────────
    let unique_sources: HashSet<String> = selected.iter().map(|c| source_key(&c.chunk)).collect();
    let unique_types: HashSet<ChunkType> = selected
        .iter()
        .map(|c| c.chunk.metadata.chunk_type_or_unknown())
        .collect();

    let mut warnings = Vec::new();
    if unique_sources.len() < quotas.min_unique_sources && !selected.is_empty() {
        let msg = format!(
            "diversity: {} unique sources selected, below target {}",
            unique_sources.len(),
            quotas.min_unique_sources
        );
        warn!("[mnema:diversity] {msg}");
        warnings.push(msg);
    }
    if unique_types.len() < quotas.min_unique_types && !selected.is_empty() {
        let msg = format!(
            "diversity: {} unique chunk types selected, below target {}",
            unique_types.len(),
            quotas.min_unique_types
        );
        warn!("[mnema:diversity] {msg}");
        warnings.push(msg);
    }

    DiversityOutcome {
        selected,
        swaps,
        warnings,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::ChunkMetadata;

    fn candidate(id: &str, source_id: &str, salience: f64) -> Candidate {
        Candidate {
            chunk: Chunk {
                id: id.into(),
                content: format!("content of {id}"),
                embedding: None,
                metadata: ChunkMetadata {
                    source_id: (!source_id.is_empty()).then(|| source_id.to_string()),
                    ..Default::default()
                },
            },
            cos01: salience,
            salience,
            baseline_salience: salience,
            provenance_penalty: 1.0,
            temporal_multiplier: 1.0,
            low_confidence: false,
        }
    }

    fn quotas(max: usize, types: usize, sources: usize) -> DiversityQuotas {
        DiversityQuotas {
            max_per_source: max,
            min_unique_types: types,
            min_unique_sources: sources,
        }
    }

    #[test]
    fn test_stable_key_prefers_source_id_then_id() {
        let c = candidate("c1", "repo:x/y.md", 0.5);
        assert_eq!(stable_key(&c.chunk), "repo:x/y.md");
        let c = candidate("c1", "", 0.5);
        assert_eq!(stable_key(&c.chunk), "c1");
    }

    #[test]
    fn test_stable_key_hash_fallback_is_16_hex_and_unique() {
        let mut a = candidate("", "", 0.5);
        a.chunk.content = "first body".into();
        let mut b = candidate("", "", 0.5);
        b.chunk.content = "second body".into();
        let (ka, kb) = (stable_key(&a.chunk), stable_key(&b.chunk));
        assert_eq!(ka.len(), 16);
        assert!(ka.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(ka, kb, "unidentified chunks must not silently merge");
    }

    #[test]
    fn test_greedy_respects_per_source_cap() {
        let candidates: Vec<Candidate> = (0..6)
            .map(|i| candidate(&format!("a{i}"), "src:a", 0.9 - i as f64 * 0.01))
            .chain((0..6).map(|i| candidate(&format!("b{i}"), "src:b", 0.5 - i as f64 * 0.01)))
            .collect();
        let out = enforce_diversity(&candidates, 4, &quotas(2, 1, 1));
        assert_eq!(out.selected.len(), 4);
        let a_count = out
            .selected
            .iter()
            .filter(|c| source_key(&c.chunk) == "src:a")
            .count();
        assert_eq!(a_count, 2);
    }

    #[test]
    fn test_single_dominant_source_scenario() {
        // 12 candidates from one source, 5 singletons from others.
        let mut candidates: Vec<Candidate> = (0..12)
            .map(|i| {
                let mut c = candidate(&format!("a{i}"), "repo:A/x.md", 0.0);
                let sim = 0.9 - i as f64 * 0.01;
                c.cos01 = (sim + 1.0) / 2.0;
                c.salience = c.cos01 * 0.8;
                c.baseline_salience = c.salience;
                c
            })
            .collect();
        for (i, s) in ["B", "C", "D", "E", "F"].iter().enumerate() {
            let mut c = candidate(&format!("s{i}"), &format!("repo:{s}/x.md"), 0.0);
            c.cos01 = (0.5 + 1.0) / 2.0;
            c.salience = c.cos01 * 0.8;
            c.baseline_salience = c.salience;
            candidates.push(c);
        }

        let out = enforce_diversity(&candidates, 12, &quotas(2, 1, 5));
        let sources: HashSet<String> = out.selected.iter().map(|c| source_key(&c.chunk)).collect();
        assert_eq!(sources.len(), 6, "expected all six sources represented");

        let mut per_source: HashMap<String, usize> = HashMap::new();
        for c in &out.selected {
            *per_source.entry(source_key(&c.chunk)).or_insert(0) += 1;
        }
        assert!(per_source.values().all(|&n| n <= 2), "per-source cap violated: {per_source:?}");
        for s in ["B", "C", "D", "E", "F"] {
            assert!(
                sources.contains(&format!("repo:{s}/x.md")),
                "source {s} missing from selection"
            );
        }
    }

    #[test]
    fn test_fill_pass_dedups_by_stable_key() {
        // Only one source; greedy admits 2, fill cannot re-admit the same
        // key, so the selection stays at 2 despite a target of 5.
        let candidates: Vec<Candidate> = (0..8)
            .map(|i| candidate(&format!("a{i}"), "src:a", 0.9 - i as f64 * 0.01))
            .collect();
        let out = enforce_diversity(&candidates, 5, &quotas(2, 1, 1));
        assert_eq!(out.selected.len(), 2);
    }

    #[test]
    fn test_fill_pass_exceeds_source_quota_to_reach_target() {
        // One conversation with four messages (distinct stable keys, same
        // source) plus two singletons. Cap 1: greedy admits one message and
        // the singletons; the fill pass breaches the cap with the remaining
        // key-distinct messages to reach the target.
        let mut candidates: Vec<Candidate> = (0..4)
            .map(|i| {
                candidate(
                    &format!("m{i}"),
                    &format!("conversation:conv-a#m{i}"),
                    0.9 - i as f64 * 0.01,
                )
            })
            .collect();
        candidates.push(candidate("b0", "conversation:conv-b#m0", 0.8));
        candidates.push(candidate("c0", "conversation:conv-c#m0", 0.79));

        let out = enforce_diversity(&candidates, 5, &quotas(1, 1, 3));
        assert_eq!(out.selected.len(), 5);
        let sources: HashSet<String> = out.selected.iter().map(|c| source_key(&c.chunk)).collect();
        assert_eq!(sources.len(), 3);
        let conv_a = out
            .selected
            .iter()
            .filter(|c| source_key(&c.chunk) == "conversation:conv-a")
            .count();
        assert_eq!(conv_a, 3, "fill pass should have breached the per-source cap");
    }

    #[test]
    fn test_swap_pass_counts_swaps() {
        // Target 4, cap 4: greedy fills entirely from the dominant source,
        // enforcement must swap singletons in to reach 3 unique sources.
        let mut candidates: Vec<Candidate> = (0..4)
            .map(|i| candidate(&format!("a{i}"), "src:a", 0.9 - i as f64 * 0.01))
            .collect();
        candidates.push(candidate("b0", "src:b", 0.4));
        candidates.push(candidate("c0", "src:c", 0.3));

        let out = enforce_diversity(&candidates, 4, &quotas(4, 1, 3));
        let sources: HashSet<String> = out.selected.iter().map(|c| source_key(&c.chunk)).collect();
        assert_eq!(sources.len(), 3);
        assert_eq!(out.swaps, 2);
        assert_eq!(out.selected.len(), 4, "swaps must not change selection size");
        // The dominant source keeps its strongest admissions.
        assert!(out.selected.iter().any(|c| c.chunk.id == "a0"));
        assert!(out.selected.iter().any(|c| c.chunk.id == "a1"));
    }

    #[test]
    fn test_warns_when_not_enough_sources_exist() {
        let candidates = vec![
            candidate("a0", "src:a", 0.9),
            candidate("a1", "src:a", 0.8),
        ];
        let out = enforce_diversity(&candidates, 4, &quotas(2, 1, 5));
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("unique sources")), "expected a source-diversity warning");
    }

    #[test]
    fn test_output_sorted_by_salience() {
        let candidates = vec![
            candidate("x", "src:x", 0.2),
            candidate("y", "src:y", 0.9),
            candidate("z", "src:z", 0.5),
        ];
        let out = enforce_diversity(&candidates, 3, &quotas(2, 1, 1));
        let saliences: Vec<f64> = out.selected.iter().map(|c| c.salience).collect();
        assert!(saliences.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_empty_input() {
        let out = enforce_diversity(&[], 12, &quotas(2, 3, 5));
        assert!(out.selected.is_empty());
        assert_eq!(out.swaps, 0);
        assert!(out.warnings.is_empty());
    }
}
