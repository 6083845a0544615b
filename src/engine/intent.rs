// ── Mnema Engine: Query Intent Classification ──────────────────────────────
//
// Deterministic pattern precedence deciding which retrieval path a query
// takes:
//
//   global-recall patterns  → conversation_recall, global scope
//   session-recall patterns → conversation_recall, session scope
//   everything else         → knowledge_query, session scope
//
// No ML model — fast, deterministic, and easy to audit. Recall
// classifications get a fixed 0.85 confidence, knowledge queries 0.6.

use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::fusion_types::{IntentClassification, QueryIntent, QueryScope};

const RECALL_CONFIDENCE: f64 = 0.85;
const KNOWLEDGE_CONFIDENCE: f64 = 0.6;

// ═══════════════════════════════════════════════════════════════════════════
// Pattern tables
// ═══════════════════════════════════════════════════════════════════════════

static GLOBAL_RECALL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(have|did) we ever\b",
        r"(?i)\bacross (all )?(our )?(sessions|conversations|chats)\b",
        r"(?i)\bin any (previous|past|earlier|other) (session|conversation|chat)\b",
        r"(?i)\ball (of )?our (conversations|sessions|discussions|chats)\b",
        r"(?i)\beverything we('ve| have)? (discussed|talked about|covered)\b",
        r"(?i)\bat any point\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("global recall pattern must compile"))
    .collect()
});

static SESSION_RECALL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bwhat did (we|you|i) (say|discuss|decide|agree|talk about|cover)\b",
        r"(?i)\bwhat (were|was) (we|i) (talking|discussing|saying)\b",
        r"(?i)\bremind me (what|about|of)\b",
        r"(?i)\brecap\b",
        r"(?i)\bsummar(y|ize) (of )?(our|this|the) (conversation|session|discussion|chat)\b",
        r"(?i)\bearlier (today|in this (session|conversation|chat))\b",
        r"(?i)\b(last|previous) (conversation|session|time we (spoke|talked))\b",
        r"(?i)\bdid (we|you|i) (discuss|decide|mention|agree|talk about)\b",
        r"(?i)\bwhat (have|did) we (been working on|worked on)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("session recall pattern must compile"))
    .collect()
});

// ═══════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════

/// Classify a query into intent and scope.
pub fn classify_intent(query: &str) -> IntentClassification {
    if GLOBAL_RECALL.iter().any(|re| re.is_match(query)) {
        return IntentClassification {
            intent: QueryIntent::ConversationRecall,
            scope: QueryScope::Global,
            confidence: RECALL_CONFIDENCE,
        };
    }

    if SESSION_RECALL.iter().any(|re| re.is_match(query)) {
        return IntentClassification {
            intent: QueryIntent::ConversationRecall,
            scope: QueryScope::Session,
            confidence: RECALL_CONFIDENCE,
        };
    }

    IntentClassification {
        intent: QueryIntent::KnowledgeQuery,
        scope: QueryScope::Session,
        confidence: KNOWLEDGE_CONFIDENCE,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_recall() {
        let c = classify_intent("what did we decide last week");
        assert_eq!(c.intent, QueryIntent::ConversationRecall);
        assert_eq!(c.scope, QueryScope::Session);
        assert!((c.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_global_recall_precedence() {
        // Matches both a session phrase ("did we discuss") and a global one;
        // global wins.
        let c = classify_intent("did we ever discuss sharding across all our sessions?");
        assert_eq!(c.intent, QueryIntent::ConversationRecall);
        assert_eq!(c.scope, QueryScope::Global);
    }

    #[test]
    fn test_knowledge_query_default() {
        let c = classify_intent("how does exponential backoff work?");
        assert_eq!(c.intent, QueryIntent::KnowledgeQuery);
        assert_eq!(c.scope, QueryScope::Session);
        assert!((c.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_recap_is_session_recall() {
        let c = classify_intent("give me a recap please");
        assert_eq!(c.intent, QueryIntent::ConversationRecall);
        assert_eq!(c.scope, QueryScope::Session);
    }

    #[test]
    fn test_have_we_ever_is_global() {
        let c = classify_intent("have we ever talked about kubernetes?");
        assert_eq!(c.scope, QueryScope::Global);
    }

    #[test]
    fn test_deterministic() {
        let a = classify_intent("remind me what the plan was");
        let b = classify_intent("remind me what the plan was");
        assert_eq!(a, b);
    }
}
