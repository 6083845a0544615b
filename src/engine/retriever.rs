// ── Mnema Engine: Candidate Retrieval ──────────────────────────────────────
//
// Stage one of the per-query pipeline. Two paths:
//
//   Conversation recall — the user is asking about prior dialog. Enumerate
//   conversation chunks (optionally filtered to the current session), skip
//   similarity gating entirely, and pass them through at uniform high
//   salience in chronological order.
//
//   Knowledge query — similarity search against the store, optionally
//   widened by semantic re-query expansion.
//
// Store failures never propagate: the pipeline degrades to an empty set
// with `had_candidates = false` and a warning the orchestrator surfaces in
// the envelope rationale.

use log::{info, warn};
use std::collections::HashSet;

use crate::atoms::constants::RECALL_UNIFORM_SALIENCE;
use crate::atoms::fusion_types::{
    Candidate, IntentClassification, QueryIntent, QueryScope, RetrievalConfig,
};
use crate::atoms::types::{ChunkType, SourceKind, StoreHit};
use crate::engine::expansion;
use crate::engine::provenance;
use crate::engine::store::MemoryStore;

/// Which path produced the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    ConversationRecall,
    Knowledge,
}

/// Stage-1 output: raw hits for the knowledge path, or pre-scored recall
/// candidates for the conversation path.
#[derive(Debug)]
pub struct RetrievedSet {
    pub path: RetrievalPath,
    pub hits: Vec<StoreHit>,
    pub recall: Vec<Candidate>,
    pub had_candidates: bool,
    pub sessions_represented: usize,
    pub timeline_span_minutes: f64,
    pub expansion_added: usize,
    pub warnings: Vec<String>,
}

impl RetrievedSet {
    fn empty(path: RetrievalPath, warning: Option<String>) -> Self {
        RetrievedSet {
            path,
            hits: Vec::new(),
            recall: Vec::new(),
            had_candidates: false,
            sessions_represented: 0,
            timeline_span_minutes: 0.0,
            expansion_added: 0,
            warnings: warning.into_iter().collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════════════════════════

/// Retrieve stage-1 candidates for a classified query. Never errors.
pub async fn retrieve_candidates(
    store: &dyn MemoryStore,
    query: &str,
    intent: &IntentClassification,
    session_id: Option<&str>,
    now_ms: i64,
    config: &RetrievalConfig,
) -> RetrievedSet {
    match intent.intent {
        QueryIntent::ConversationRecall => {
            recall_path(store, intent.scope, session_id, now_ms, config).await
        }
        QueryIntent::KnowledgeQuery => knowledge_path(store, query, config).await,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Conversation-recall fast path
// ═══════════════════════════════════════════════════════════════════════════

async fn recall_path(
    store: &dyn MemoryStore,
    scope: QueryScope,
    session_id: Option<&str>,
    now_ms: i64,
    config: &RetrievalConfig,
) -> RetrievedSet {
    let chunks = match store.all_chunks().await {
        Ok(chunks) => chunks,
        Err(e) => {
            warn!("[mnema:retriever] recall enumeration failed: {e}");
            return RetrievedSet::empty(
                RetrievalPath::ConversationRecall,
                Some("store unavailable".into()),
            );
        }
    };

    let mut turns: Vec<Candidate> = chunks
        .into_iter()
        .map(|c| {
            if provenance::needs_enforcement(&c.metadata) {
                provenance::enforce(c, now_ms)
            } else {
                c
            }
        })
        .filter(|c| {
            c.metadata.source_kind_or_unknown() == SourceKind::Conversation
                || c.metadata.chunk_type_or_unknown() == ChunkType::ConversationEvent
        })
        .filter(|c| match (scope, session_id) {
            (QueryScope::Session, Some(sid)) => c.metadata.session_id.as_deref() == Some(sid),
            // Session scope without a session handle cannot filter; fall
            // through to all conversation chunks rather than none.
            _ => true,
        })
        .map(|chunk| Candidate {
            chunk,
            cos01: RECALL_UNIFORM_SALIENCE,
            salience: RECALL_UNIFORM_SALIENCE,
            baseline_salience: RECALL_UNIFORM_SALIENCE,
            provenance_penalty: 1.0,
            temporal_multiplier: 1.0,
            low_confidence: false,
        })
        .collect();

    // Most recent turns win the card budget, presented chronologically.
    turns.sort_by_key(|c| std::cmp::Reverse(c.chunk.metadata.timestamp.unwrap_or(0)));
    turns.truncate(config.final_core_count);
    turns.sort_by_key(|c| c.chunk.metadata.timestamp.unwrap_or(0));

    let sessions: HashSet<&str> = turns
        .iter()
        .filter_map(|c| c.chunk.metadata.session_id.as_deref())
        .collect();
    let timestamps: Vec<i64> = turns
        .iter()
        .filter_map(|c| c.chunk.metadata.timestamp)
        .collect();
    let span_minutes = match (timestamps.iter().min(), timestamps.iter().max()) {
        (Some(min), Some(max)) => (max - min) as f64 / 60_000.0,
        _ => 0.0,
    };

    info!(
        "[mnema:retriever] recall path: {} turns, {} sessions, {:.1} min span",
        turns.len(),
        sessions.len(),
        span_minutes
    );

    RetrievedSet {
        path: RetrievalPath::ConversationRecall,
        hits: Vec::new(),
        had_candidates: !turns.is_empty(),
        sessions_represented: sessions.len(),
        timeline_span_minutes: span_minutes,
        expansion_added: 0,
        warnings: Vec::new(),
        recall: turns,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Knowledge-query path
// ═══════════════════════════════════════════════════════════════════════════

async fn knowledge_path(
    store: &dyn MemoryStore,
    query: &str,
    config: &RetrievalConfig,
) -> RetrievedSet {
    let limit = config.initial_retrieval_count.max(500);

    let hits = match store
        .search_memories(query, limit, config.similarity_threshold)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            warn!("[mnema:retriever] search failed: {e}");
            return RetrievedSet::empty(RetrievalPath::Knowledge, Some("store unavailable".into()));
        }
    };

    let (hits, expansion_added) = expansion::expand(store, hits, config).await;

    RetrievedSet {
        path: RetrievalPath::Knowledge,
        had_candidates: !hits.is_empty(),
        sessions_represented: 0,
        timeline_span_minutes: 0.0,
        expansion_added,
        warnings: Vec::new(),
        recall: Vec::new(),
        hits,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
