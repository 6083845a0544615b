// ── Mnema Engine: Answer Envelope ──────────────────────────────────────────
//
// Post-processes raw generator text into the final answer:
//
//   1. De-hedge — strip apology lines, "I don't have…" disclaimers,
//      "Unfortunately…" openers, numbered rhetorical-question lists and
//      stray "Confidence bracket" lines, then normalize whitespace.
//   2. Footer — append `CONFIDENCE: <low|medium|high>` (base level from
//      coverage, capped by source diversity and temporal staleness) and a
//      `NEXT_RETRIEVALS:` line naming what to fetch next.
//
// The hedge-pattern list is owned here, in one place, and the footer pass
// is idempotent: text already carrying both footer lines is returned
// unchanged.

use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::fusion_types::{ConfidenceLevel, MemoryCard, QueryHints};
use crate::engine::expansion::key_terms;

// ═══════════════════════════════════════════════════════════════════════════
// Hedge patterns
// ═══════════════════════════════════════════════════════════════════════════

/// Whole lines dropped during de-hedging. Centralized so tests and
/// deployments can audit exactly what gets removed.
pub static HEDGE_LINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Apologies.
        r"(?i)^\s*(i[' ]?a?m sorry|i apologize|apologies)\b.*$",
        // Capability disclaimers.
        r"(?i)^.*\bi (do ?n[o']t|don't|cannot|can't) (have|access|recall|find)\b.*$",
        // "Unfortunately…" openers.
        r"(?i)^\s*unfortunately\b.*$",
        // Numbered rhetorical question lists ("1. Did you mean…?").
        r"^\s*\d+[.)]\s+.*\?\s*$",
        // Self-reported confidence brackets.
        r"(?i)^\s*confidence bracket.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hedge pattern must compile"))
    .collect()
});

/// Remove hedge lines and normalize whitespace. Idempotent.
pub fn dehedge(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !HEDGE_LINE_PATTERNS.iter().any(|re| re.is_match(line)))
        .map(|line| line.trim_end())
        .collect();

    // Collapse runs of blank lines left behind by removals.
    let mut out: Vec<&str> = Vec::with_capacity(kept.len());
    let mut blank_run = 0usize;
    for line in kept {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    out.join("\n").trim().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
// Confidence calibration
// ═══════════════════════════════════════════════════════════════════════════

/// Base confidence from coverage, then capped by diversity:
/// fewer than 2 sources → low, fewer than 3 → at most medium, and a
/// temporal query over mostly-undated cards → low.
pub fn infer_confidence(
    coverage: f64,
    unique_sources: usize,
    hints: &QueryHints,
    timestamp_coverage: f64,
) -> ConfidenceLevel {
    let mut level = if coverage >= 0.70 {
        ConfidenceLevel::High
    } else if coverage >= 0.35 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    if unique_sources < 2 {
        level = ConfidenceLevel::Low;
    } else if unique_sources < 3 {
        level = level.min(ConfidenceLevel::Medium);
    }

    if hints.temporal && timestamp_coverage < 0.3 {
        level = ConfidenceLevel::Low;
    }

    level
}

// ═══════════════════════════════════════════════════════════════════════════
// Footer
// ═══════════════════════════════════════════════════════════════════════════

/// Follow-up retrieval hints: the top card source-path suffixes plus the
/// query's key terms. Always returns at least two entries.
pub fn next_retrieval_hints(cards: &[MemoryCard], query: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();

    for card in cards {
        let suffix = source_suffix(&card.source_id);
        if !suffix.is_empty() && !hints.contains(&suffix) {
            hints.push(suffix);
        }
        if hints.len() >= 2 {
            break;
        }
    }

    let terms = key_terms(query, 3).join(" ");
    if !terms.is_empty() && !hints.contains(&terms) {
        hints.push(terms);
    }
    if hints.len() < 2 {
        hints.push("recent conversation summaries".to_string());
    }

    hints.truncate(2);
    hints
}

/// Last two path components of a source id, scheme prefix stripped.
fn source_suffix(source_id: &str) -> String {
    let body = source_id
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(source_id);
    let body = body.split('#').next().unwrap_or(body);
    let parts: Vec<&str> = body.rsplit('/').take(2).collect();
    parts.into_iter().rev().collect::<Vec<_>>().join("/")
}

/// Append the footer lines that are missing. Text already containing both
/// `CONFIDENCE:` and `NEXT_RETRIEVALS:` is returned unchanged.
pub fn enforce_answer_footer(
    text: &str,
    confidence: ConfidenceLevel,
    hints: &[String],
) -> String {
    let has_confidence = text.contains("CONFIDENCE:");
    let has_retrievals = text.contains("NEXT_RETRIEVALS:");
    if has_confidence && has_retrievals {
        return text.to_string();
    }

    let mut out = text.trim_end().to_string();
    if !has_confidence {
        out.push_str(&format!("\n\nCONFIDENCE: {}", confidence.as_str()));
    }
    if !has_retrievals {
        let formatted: Vec<String> = hints
            .iter()
            .enumerate()
            .map(|(i, h)| format!("({}) {}", (b'a' + i as u8) as char, h))
            .collect();
        out.push_str(&format!("\nNEXT_RETRIEVALS: {}", formatted.join(" ")));
    }
    out
}

/// Full answer post-processing: de-hedge, then enforce the footer.
pub fn finalize_answer(
    raw: &str,
    cards: &[MemoryCard],
    query: &str,
    coverage: f64,
    unique_sources: usize,
    hints: &QueryHints,
    timestamp_coverage: f64,
) -> String {
    let cleaned = dehedge(raw);
    let confidence = infer_confidence(coverage, unique_sources, hints, timestamp_coverage);
    let retrieval_hints = next_retrieval_hints(cards, query);
    enforce_answer_footer(&cleaned, confidence, &retrieval_hints)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
