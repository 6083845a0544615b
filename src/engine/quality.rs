// ── Mnema Engine: Retrieval Quality Metrics ────────────────────────────────
//
// NDCG and mean salience over the final ranked card set, plus a small set
// of human-readable health warnings. Observability only: feeds
// `Diagnostics.quality` and the log stream, never the selection itself.

use crate::atoms::fusion_types::{MemoryCard, QualityMetrics};

const LOW_SALIENCE_THRESHOLD: f64 = 0.3;
const LOW_NDCG_THRESHOLD: f64 = 0.4;

// ═══════════════════════════════════════════════════════════════════════════
// NDCG
// ═══════════════════════════════════════════════════════════════════════════

/// NDCG over the card ordering, using salience as the relevance grade.
/// 1.0 means the cards are in perfect descending-salience order; 0.0 means
/// an empty set.
pub fn compute_ndcg(cards: &[MemoryCard]) -> f64 {
    if cards.is_empty() {
        return 0.0;
    }

    // rank + 2 because rank is 0-indexed and log2(1) = 0.
    let dcg: f64 = cards
        .iter()
        .enumerate()
        .map(|(i, c)| c.salience / (i as f64 + 2.0).log2())
        .sum();

    let mut ideal: Vec<f64> = cards.iter().map(|c| c.salience).collect();
    ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let idcg: f64 = ideal
        .iter()
        .enumerate()
        .map(|(i, s)| s / (i as f64 + 2.0).log2())
        .sum();

    if idcg == 0.0 {
        0.0
    } else {
        (dcg / idcg).clamp(0.0, 1.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics & health
// ═══════════════════════════════════════════════════════════════════════════

/// Build the quality record for one query's final card set.
pub fn build_quality_metrics(cards: &[MemoryCard], candidates_considered: usize) -> QualityMetrics {
    let mean_salience = if cards.is_empty() {
        0.0
    } else {
        cards.iter().map(|c| c.salience).sum::<f64>() / cards.len() as f64
    };

    QualityMetrics {
        ndcg: compute_ndcg(cards),
        mean_salience,
        candidates_considered,
        cards_packed: cards.len(),
        chars_packed: cards.iter().map(|c| c.content.chars().count()).sum(),
    }
}

/// Health warnings for degraded retrieval. Empty means healthy.
pub fn assess_quality(metrics: &QualityMetrics) -> Vec<String> {
    let mut warnings = Vec::new();

    if metrics.cards_packed == 0 {
        if metrics.candidates_considered > 0 {
            warnings.push(
                "candidates found but none packed — selection or budget too tight".to_string(),
            );
        } else {
            warnings.push("no memories matched the query".to_string());
        }
        return warnings;
    }

    if metrics.mean_salience < LOW_SALIENCE_THRESHOLD {
        warnings.push(format!(
            "low mean salience ({:.2}) — packed memories may not be relevant",
            metrics.mean_salience
        ));
    }

    if metrics.ndcg < LOW_NDCG_THRESHOLD && metrics.cards_packed > 1 {
        warnings.push(format!(
            "low NDCG ({:.2}) — card ordering may be suboptimal",
            metrics.ndcg
        ));
    }

    warnings
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn card(salience: f64) -> MemoryCard {
        MemoryCard {
            label: "M".into(),
            content: "body".into(),
            tokens: 1,
            salience,
            source_id: "note:x".into(),
            low_confidence: false,
        }
    }

    #[test]
    fn test_ndcg_empty_and_single() {
        assert_eq!(compute_ndcg(&[]), 0.0);
        let ndcg = compute_ndcg(&[card(0.9)]);
        assert!((ndcg - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ndcg_perfect_order_is_one() {
        let cards = vec![card(0.9), card(0.7), card(0.5)];
        assert!((compute_ndcg(&cards) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ndcg_reversed_order_below_one() {
        let cards = vec![card(0.3), card(0.6), card(0.9)];
        let ndcg = compute_ndcg(&cards);
        assert!(ndcg < 1.0);
        assert!(ndcg > 0.0);
    }

    #[test]
    fn test_metrics_accumulate() {
        let cards = vec![card(0.8), card(0.4)];
        let m = build_quality_metrics(&cards, 20);
        assert_eq!(m.cards_packed, 2);
        assert_eq!(m.candidates_considered, 20);
        assert!((m.mean_salience - 0.6).abs() < 1e-9);
        assert_eq!(m.chars_packed, 8);
    }

    #[test]
    fn test_assess_flags_empty_and_low_salience() {
        let empty = build_quality_metrics(&[], 0);
        assert!(assess_quality(&empty)
            .iter()
            .any(|w| w.contains("no memories matched")));

        let starved = build_quality_metrics(&[], 15);
        assert!(assess_quality(&starved)
            .iter()
            .any(|w| w.contains("none packed")));

        let weak = build_quality_metrics(&[card(0.1), card(0.1)], 5);
        assert!(assess_quality(&weak)
            .iter()
            .any(|w| w.contains("low mean salience")));

        let healthy = build_quality_metrics(&[card(0.8), card(0.6)], 5);
        assert!(assess_quality(&healthy).is_empty());
    }
}
