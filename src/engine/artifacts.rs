// ── Mnema Engine: Conversation Artifact Classification ─────────────────────
//
// Classifies a conversation summary into {constraint, decision, hypothesis,
// discussion}. Each non-discussion type is backed by several pattern
// *categories*; a summary must hit at least `min_categories` of them
// (default 2) to leave the `discussion` bucket — one stray "must" in a
// casual recap is not a constraint.
//
// Precedence when multiple types qualify: constraint > decision >
// hypothesis. The decision path additionally disqualifies itself when the
// summary hedges with weak-commitment phrasing ("maybe", "leaning towards").
//
// Extracted payload lines are bounded: ≤3 entries, ≤200 chars each
// (≤150 for discussion).

use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::constants::{
    ARTIFACT_EXTRACT_MAX_CHARS, ARTIFACT_EXTRACT_MAX_CHARS_DISCUSSION,
    ARTIFACT_EXTRACT_MAX_ENTRIES,
};
use crate::atoms::fusion_types::{ArtifactClassification, ArtifactType};

// ═══════════════════════════════════════════════════════════════════════════
// Pattern categories
// ═══════════════════════════════════════════════════════════════════════════

struct Category {
    name: &'static str,
    pattern: Regex,
}

fn category(name: &'static str, pattern: &str) -> Category {
    Category {
        name,
        pattern: Regex::new(pattern).expect("artifact pattern must compile"),
    }
}

static CONSTRAINT_CATEGORIES: LazyLock<Vec<Category>> = LazyLock::new(|| {
    vec![
        category(
            "obligation",
            r"(?i)\b(must( not| never)?|cannot|can't|shall|required to|have to|is not allowed)\b",
        ),
        category(
            "limits",
            r"(?i)\b(at most|at least|no more than|no fewer than|within \d|up to \d|capped at|limited? to)\b",
        ),
        category(
            "invariant",
            r"(?i)\b(invariant|constraint|non-negotiable|hard requirement|always holds)\b",
        ),
    ]
});

static DECISION_CATEGORIES: LazyLock<Vec<Category>> = LazyLock::new(|| {
    vec![
        category(
            "commitment",
            r"(?i)\b(we (decided|chose|agreed|settled on|picked|went with)|decision (is|was|:))",
        ),
        category(
            "finality",
            r"(?i)\b(final(ized)?|approved|signed off|locked in|confirmed)\b",
        ),
        category(
            "selection",
            r"(?i)\b(instead of|rather than|in favor of|over the alternative)\b",
        ),
    ]
});

static HYPOTHESIS_CATEGORIES: LazyLock<Vec<Category>> = LazyLock::new(|| {
    vec![
        category(
            "conjecture",
            r"(?i)\b(i (think|suspect|believe|guess)|hypothesis|assum(e|ption)|presumably|in theory|my guess)\b",
        ),
        category(
            "testable",
            r"(?i)\b(needs? (testing|validation)|to verify|should test|unverified|would (likely|probably))\b",
        ),
        category(
            "uncertainty",
            r"(?i)\b(probably|possibly|may be|might be|unclear whether)\b",
        ),
    ]
});

/// Phrases that disqualify the decision path: something merely being leaned
/// towards is not a decision.
static WEAK_COMMITMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(might|maybe|perhaps|leaning towards?|considering|thinking about|not sure|tentatively)\b")
        .expect("weak-commitment pattern must compile")
});

// ═══════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════

/// Classify a conversation summary.
///
/// `min_categories` is the number of distinct pattern categories a type
/// needs before it beats `discussion` (the tunable ≥2 heuristic).
pub fn classify_artifact(summary: &str, min_categories: usize) -> ArtifactClassification {
    let constraint_hits = matched_categories(&CONSTRAINT_CATEGORIES, summary);
    let decision_hits = matched_categories(&DECISION_CATEGORIES, summary);
    let hypothesis_hits = matched_categories(&HYPOTHESIS_CATEGORIES, summary);

    let weakly_committed = WEAK_COMMITMENT.is_match(summary);

    // Precedence: constraint > decision > hypothesis > discussion.
    let (artifact_type, hits): (ArtifactType, &[&'static str]) =
        if constraint_hits.len() >= min_categories {
            (ArtifactType::Constraint, &constraint_hits)
        } else if decision_hits.len() >= min_categories && !weakly_committed {
            (ArtifactType::Decision, &decision_hits)
        } else if hypothesis_hits.len() >= min_categories {
            (ArtifactType::Hypothesis, &hypothesis_hits)
        } else {
            (ArtifactType::Discussion, &[])
        };

    let max_chars = if artifact_type == ArtifactType::Discussion {
        ARTIFACT_EXTRACT_MAX_CHARS_DISCUSSION
    } else {
        ARTIFACT_EXTRACT_MAX_CHARS
    };

    let extracted = extract_supporting_lines(summary, artifact_type, max_chars);

    let confidence = match artifact_type {
        ArtifactType::Discussion => 0.4,
        _ => (0.55 + 0.15 * hits.len() as f64).min(0.95),
    };

    let mut tags: Vec<String> = Vec::with_capacity(1 + hits.len());
    tags.push(type_tag(artifact_type).to_string());
    tags.extend(hits.iter().map(|h| h.to_string()));

    ArtifactClassification {
        artifact_type,
        confidence,
        extracted,
        tags,
    }
}

fn type_tag(t: ArtifactType) -> &'static str {
    match t {
        ArtifactType::Decision => "decision",
        ArtifactType::Constraint => "constraint",
        ArtifactType::Hypothesis => "hypothesis",
        ArtifactType::Discussion => "discussion",
    }
}

fn matched_categories(categories: &[Category], summary: &str) -> Vec<&'static str> {
    categories
        .iter()
        .filter(|c| c.pattern.is_match(summary))
        .map(|c| c.name)
        .collect()
}

/// Pull the sentences that carry the classification's signal, bounded in
/// count and length. Discussion falls back to the leading sentences.
fn extract_supporting_lines(
    summary: &str,
    artifact_type: ArtifactType,
    max_chars: usize,
) -> Vec<String> {
    let categories: &[Category] = match artifact_type {
        ArtifactType::Constraint => &CONSTRAINT_CATEGORIES,
        ArtifactType::Decision => &DECISION_CATEGORIES,
        ArtifactType::Hypothesis => &HYPOTHESIS_CATEGORIES,
        ArtifactType::Discussion => &[],
    };

    let mut lines: Vec<String> = Vec::new();
    for sentence in split_sentences(summary) {
        let keep = if categories.is_empty() {
            true
        } else {
            categories.iter().any(|c| c.pattern.is_match(sentence))
        };
        if keep {
            lines.push(truncate_chars(sentence.trim(), max_chars));
        }
        if lines.len() >= ARTIFACT_EXTRACT_MAX_ENTRIES {
            break;
        }
    }
    lines
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(|s| s.trim_matches(['.', '!', '?', '\n', ' ']))
        .filter(|s| !s.is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_two_categories() {
        let c = classify_artifact(
            "The cache must never exceed 512MB; that is a hard requirement from ops.",
            2,
        );
        assert_eq!(c.artifact_type, ArtifactType::Constraint);
        assert!(c.confidence > 0.6);
        assert!(c.tags.contains(&"constraint".to_string()));
    }

    #[test]
    fn test_single_category_stays_discussion() {
        // One lone "must" is not enough signal.
        let c = classify_artifact("We must get lunch sometime and chat about the offsite.", 2);
        assert_eq!(c.artifact_type, ArtifactType::Discussion);
        assert!((c.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_decision_detected() {
        let c = classify_artifact(
            "We decided to go with Postgres instead of DynamoDB; the choice is final.",
            2,
        );
        assert_eq!(c.artifact_type, ArtifactType::Decision);
    }

    #[test]
    fn test_weak_commitment_blocks_decision() {
        let c = classify_artifact(
            "We're maybe leaning towards Postgres instead of DynamoDB; decision was discussed as final.",
            2,
        );
        assert_ne!(c.artifact_type, ArtifactType::Decision);
    }

    #[test]
    fn test_constraint_beats_decision() {
        let c = classify_artifact(
            "We decided and confirmed the limit: requests must never exceed the cap, capped at 100 rps; that invariant is non-negotiable.",
            2,
        );
        assert_eq!(c.artifact_type, ArtifactType::Constraint);
    }

    #[test]
    fn test_hypothesis_detected() {
        let c = classify_artifact(
            "I suspect the latency spike comes from GC pauses; this needs testing before we act.",
            2,
        );
        assert_eq!(c.artifact_type, ArtifactType::Hypothesis);
    }

    #[test]
    fn test_extracted_bounds() {
        let long_sentence = format!("The service must never {}", "x".repeat(400));
        let summary = format!(
            "{long_sentence}. Deploys are capped at 2 per day. The invariant always holds. Also the cap is a hard requirement."
        );
        let c = classify_artifact(&summary, 2);
        assert!(c.extracted.len() <= 3);
        for line in &c.extracted {
            assert!(line.chars().count() <= 200, "line exceeds bound: {}", line.len());
        }
    }

    #[test]
    fn test_discussion_extract_is_shorter_bound() {
        let summary = format!("{} and then we moved on.", "a".repeat(300));
        let c = classify_artifact(&summary, 2);
        assert_eq!(c.artifact_type, ArtifactType::Discussion);
        for line in &c.extracted {
            assert!(line.chars().count() <= 150);
        }
    }

    #[test]
    fn test_threshold_tunable() {
        let summary = "Requests must stay under the limit.";
        // Obligation + limits … only "obligation" and "limits"? "under the
        // limit" does not match the limits category, so exactly one hit.
        let strict = classify_artifact(summary, 2);
        assert_eq!(strict.artifact_type, ArtifactType::Discussion);
        let lax = classify_artifact(summary, 1);
        assert_eq!(lax.artifact_type, ArtifactType::Constraint);
    }
}
