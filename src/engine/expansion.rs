// ── Mnema Engine: Semantic Re-Query Expansion ──────────────────────────────
//
// Widens stage-1 retrieval without any graph-edge traversal: the top K
// candidates each contribute a key-term summary, the store is re-queried
// once per summary, and the union (deduplicated by stable key) replaces the
// original candidate list, capped at the stage-1 limit.
//
// A failed re-query never degrades the pipeline — the original hits stand.

use log::{debug, warn};
use std::collections::HashSet;

use crate::atoms::fusion_types::RetrievalConfig;
use crate::atoms::types::StoreHit;
use crate::engine::diversity::stable_key;
use crate::engine::store::MemoryStore;

/// Words carrying no retrieval signal, skipped when summarizing a candidate.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "this", "that", "with", "from", "they", "will", "would", "there",
    "their", "what", "about", "which", "when", "were", "been", "more", "some", "into", "than",
    "then", "them", "these", "also", "its", "over", "only", "your", "because", "very", "just",
    "how", "where", "why", "who", "does", "did", "should", "could",
];

// ═══════════════════════════════════════════════════════════════════════════
// Key terms
// ═══════════════════════════════════════════════════════════════════════════

/// Top `k` content terms by frequency, stopwords removed, ties broken by
/// first occurrence.
pub fn key_terms(content: &str, k: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for raw in content.split(|c: char| !c.is_alphanumeric()) {
        let word = raw.to_lowercase();
        if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !counts.contains_key(&word) {
            order.push(word.clone());
        }
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = order
        .into_iter()
        .enumerate()
        .map(|(first_seen, word)| {
            let count = counts[&word];
            (word, count, first_seen)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked.into_iter().take(k).map(|(word, _, _)| word).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Expansion
// ═══════════════════════════════════════════════════════════════════════════

/// Re-query the store with key-term summaries of the top candidates and
/// union the results. Returns the expanded hit list (capped at the stage-1
/// limit) and the number of hits the expansion added.
pub async fn expand(
    store: &dyn MemoryStore,
    hits: Vec<StoreHit>,
    config: &RetrievalConfig,
) -> (Vec<StoreHit>, usize) {
    if !config.expansion.enabled || hits.is_empty() {
        return (hits, 0);
    }

    let seeds: Vec<String> = hits
        .iter()
        .take(config.expansion.top_k)
        .map(|h| key_terms(&h.chunk.content, config.expansion.terms_per_query).join(" "))
        .filter(|summary| !summary.is_empty())
        .collect();

    let mut seen: HashSet<String> = hits.iter().map(|h| stable_key(&h.chunk)).collect();
    let mut merged = hits;
    let mut added = 0usize;

    for summary in seeds {
        let extra = match store
            .search_memories(
                &summary,
                config.initial_retrieval_count,
                config.similarity_threshold,
            )
            .await
        {
            Ok(extra) => extra,
            Err(e) => {
                warn!("[mnema:expansion] re-query failed, keeping original hits: {e}");
                continue;
            }
        };
        for hit in extra {
            if seen.insert(stable_key(&hit.chunk)) {
                merged.push(hit);
                added += 1;
            }
        }
    }

    merged.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(config.initial_retrieval_count);

    debug!(
        "[mnema:expansion] union added {added} hits ({} total after cap)",
        merged.len()
    );
    (merged, added)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::error::{MnemaError, MnemaResult};
    use crate::atoms::types::{Chunk, ChunkMetadata};
    use async_trait::async_trait;

    fn hit(id: &str, content: &str, similarity: f64) -> StoreHit {
        StoreHit {
            chunk: Chunk {
                id: id.into(),
                content: content.into(),
                embedding: None,
                metadata: ChunkMetadata {
                    source_id: Some(format!("note:{id}")),
                    ..Default::default()
                },
            },
            similarity,
        }
    }

    struct ScriptedStore {
        results: Vec<StoreHit>,
        fail: bool,
    }

    #[async_trait]
    impl MemoryStore for ScriptedStore {
        async fn search_memories(
            &self,
            _query: &str,
            _limit: usize,
            _threshold: f64,
        ) -> MnemaResult<Vec<StoreHit>> {
            if self.fail {
                Err(MnemaError::StoreUnavailable("scripted failure".into()))
            } else {
                Ok(self.results.clone())
            }
        }

        async fn all_chunks(&self) -> MnemaResult<Vec<Chunk>> {
            Ok(Vec::new())
        }
    }

    fn expansion_config() -> RetrievalConfig {
        let mut cfg = RetrievalConfig::default();
        cfg.expansion.enabled = true;
        cfg
    }

    #[test]
    fn test_key_terms_filters_stopwords_and_ranks_by_frequency() {
        let terms = key_terms(
            "the cache writes to the cache index and the index is compacted",
            3,
        );
        assert_eq!(terms[0], "cache");
        assert_eq!(terms[1], "index");
        assert!(!terms.contains(&"the".to_string()));
        assert!(!terms.contains(&"and".to_string()));
    }

    #[test]
    fn test_key_terms_tie_broken_by_first_occurrence() {
        let terms = key_terms("alpha beta gamma", 3);
        assert_eq!(terms, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_expand_unions_and_dedups() {
        let original = vec![hit("a", "postgres index tuning notes", 0.9)];
        let store = ScriptedStore {
            results: vec![
                hit("a", "postgres index tuning notes", 0.9), // duplicate
                hit("b", "vacuum schedule for postgres", 0.6),
            ],
            fail: false,
        };
        let (merged, added) = expand(&store, original, &expansion_config()).await;
        assert_eq!(added, 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].chunk.id, "a", "union stays similarity-ranked");
    }

    #[tokio::test]
    async fn test_expand_survives_store_failure() {
        let original = vec![hit("a", "postgres index tuning notes", 0.9)];
        let store = ScriptedStore {
            results: vec![],
            fail: true,
        };
        let (merged, added) = expand(&store, original.clone(), &expansion_config()).await;
        assert_eq!(added, 0);
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test]
    async fn test_expand_disabled_is_identity() {
        let original = vec![hit("a", "postgres index tuning notes", 0.9)];
        let store = ScriptedStore {
            results: vec![hit("b", "other", 0.5)],
            fail: false,
        };
        let (merged, added) = expand(&store, original, &RetrievalConfig::default()).await;
        assert_eq!(added, 0);
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test]
    async fn test_expand_caps_union() {
        let original: Vec<StoreHit> = (0..3)
            .map(|i| hit(&format!("o{i}"), "seed content words", 0.9))
            .collect();
        let extra: Vec<StoreHit> = (0..600)
            .map(|i| hit(&format!("x{i}"), "expanded", 0.4))
            .collect();
        let store = ScriptedStore {
            results: extra,
            fail: false,
        };
        let cfg = expansion_config();
        let (merged, _) = expand(&store, original, &cfg).await;
        assert!(merged.len() <= cfg.initial_retrieval_count);
    }
}
