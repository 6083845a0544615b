// ── Mnema Engine: Fusion Composition ───────────────────────────────────────
//
// Decides how much the answer should lean on memory versus general
// knowledge. From the final card set it derives:
//
//   memory_weight   — lerp(0.15, 0.85) over the mean salience of the top 8
//                     cards, capped at 0.35 when most cards are
//                     low-confidence
//   coverage        — blended size/diversity score, discounted when one
//                     source dominates the selection
//   gk_allowance    — general-knowledge sentences permitted: 3 below 0.35
//                     coverage, 1 below 0.70, else 0
//   routing_hint    — memory-first / general-first / blend
//
// Pure computation over the cards; the orchestrator folds the result into
// the envelope.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::atoms::fusion_types::{MemoryCard, RoutingHint};

/// Cards contributing to the salience average.
const AVG_TOP_N: usize = 8;

/// Salience band mapped onto the memory-weight range.
const SALIENCE_LO: f64 = 0.06;
const SALIENCE_HI: f64 = 0.22;
const MEMORY_WEIGHT_MIN: f64 = 0.15;
const MEMORY_WEIGHT_MAX: f64 = 0.85;

/// Cap applied when more than half the cards are low-confidence.
const LOW_CONFIDENCE_CAP: f64 = 0.35;

/// Per-card character contribution cap and the size band for coverage.
const CARD_CHAR_CAP: usize = 600;
const SIZE_LO: f64 = 600.0;
const SIZE_HI: f64 = 4000.0;

static TOPIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z][a-z0-9]+(?:\s+[A-Z][a-z0-9]+)*").expect("topic pattern must compile")
});

// ═══════════════════════════════════════════════════════════════════════════
// Output
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FusionComposition {
    pub avg_salience: f64,
    pub memory_weight: f64,
    pub general_weight: f64,
    pub gk_allowance: u8,
    pub routing_hint: RoutingHint,
    pub coverage: f64,
    pub homogeneity: f64,
    pub unique_sources: usize,
    pub unique_topics: usize,
    pub low_confidence_count: usize,
    pub rationale: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Composition
// ═══════════════════════════════════════════════════════════════════════════

/// Compose fusion weights from the final card set (descending salience).
pub fn compose(cards: &[MemoryCard]) -> FusionComposition {
    if cards.is_empty() {
        return FusionComposition {
            avg_salience: 0.0,
            memory_weight: 0.2,
            general_weight: 0.8,
            gk_allowance: 3,
            routing_hint: RoutingHint::GeneralFirst,
            coverage: 0.0,
            homogeneity: 0.0,
            unique_sources: 0,
            unique_topics: 0,
            low_confidence_count: 0,
            rationale: "no memory candidates".into(),
        };
    }

    let top_n = cards.len().min(AVG_TOP_N);
    let avg_salience = cards[..top_n].iter().map(|c| c.salience).sum::<f64>() / top_n as f64;

    let mut memory_weight = lerp(
        MEMORY_WEIGHT_MIN,
        MEMORY_WEIGHT_MAX,
        normalize(avg_salience, SALIENCE_LO, SALIENCE_HI),
    );

    let low_confidence_count = cards.iter().filter(|c| c.low_confidence).count();
    let low_conf_share = low_confidence_count as f64 / cards.len() as f64;
    if low_conf_share > 0.5 {
        memory_weight = memory_weight.min(LOW_CONFIDENCE_CAP);
    }
    let general_weight = 1.0 - memory_weight;

    // ── Coverage & homogeneity ───────────────────────────────────────────
    let total_chars: usize = cards
        .iter()
        .map(|c| c.content.chars().count().min(CARD_CHAR_CAP))
        .sum();
    let size_score = normalize(total_chars as f64, SIZE_LO, SIZE_HI);

    let mut source_counts: HashMap<&str, usize> = HashMap::new();
    for card in cards {
        let root = card.source_id.split('#').next().unwrap_or(&card.source_id);
        *source_counts.entry(root).or_insert(0) += 1;
    }
    let unique_sources = source_counts.len();

    let unique_topics = cards
        .iter()
        .map(|c| topic_of(&c.content))
        .collect::<std::collections::HashSet<String>>()
        .len();

    let diversity_score = 0.6 * normalize(unique_sources as f64, 1.0, 6.0)
        + 0.4 * normalize(unique_topics as f64, 1.0, 6.0);

    let homogeneity =
        source_counts.values().copied().max().unwrap_or(0) as f64 / cards.len() as f64;
    let homo_penalty = ((homogeneity - 0.7) / 0.3).max(0.0);

    let coverage =
        ((0.6 * size_score + 0.4 * diversity_score) * (1.0 - 0.6 * homo_penalty)).clamp(0.0, 1.0);

    let gk_allowance = if coverage < 0.35 {
        3
    } else if coverage < 0.70 {
        1
    } else {
        0
    };

    let routing_hint = if memory_weight > 0.6 {
        RoutingHint::MemoryFirst
    } else if memory_weight < 0.3 {
        RoutingHint::GeneralFirst
    } else {
        RoutingHint::Blend
    };

    let rationale = format!(
        "{} cards from {} sources, avg salience {:.2}, coverage {:.2}",
        cards.len(),
        unique_sources,
        avg_salience,
        coverage
    );

    FusionComposition {
        avg_salience,
        memory_weight,
        general_weight,
        gk_allowance,
        routing_hint,
        coverage,
        homogeneity,
        unique_sources,
        unique_topics,
        low_confidence_count,
        rationale,
    }
}

/// First ProperCase sequence in the card, or "misc".
pub fn topic_of(content: &str) -> String {
    TOPIC_PATTERN
        .find(content)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "misc".to_string())
}

fn normalize(x: f64, lo: f64, hi: f64) -> f64 {
    ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
}

fn lerp(lo: f64, hi: f64, t: f64) -> f64 {
    lo + (hi - lo) * t
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
