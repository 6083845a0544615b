// ── Mnema Engine: Pipeline Orchestration ───────────────────────────────────
//
// The single entrypoint. `retrieve()` sequences intent classification,
// candidate retrieval, scoring, diversity enforcement and fusion
// composition into a `FusionEnvelope`, emitting per-stage diagnostics along
// the way. `finalize_answer()` is the post-generation half: the caller runs
// the LLM between the two.
//
// Failure policy: nothing non-fatal escapes. Store errors, timeouts,
// cancellation and backpressure all degrade to a minimal envelope with a
// rationale; only embedding sanity failures (at construction, in pilot
// mode) propagate as errors.
//
// Concurrency: one cooperative task per query. The only await points are
// the store calls. Cancellation is checked before retrieval, after
// retrieval, and before fusion.

use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::atoms::error::MnemaResult;
use crate::atoms::fusion_types::{
    Candidate, Diagnostics, FusionEnvelope, MemoryCard, RetrievalConfig, RetrievalOutcome,
    SalienceStats, StageEvent,
};
use crate::atoms::types::TimestampSource;
use crate::engine::diversity::{self, source_key, stable_key};
use crate::engine::embedding::{sanity_check, EmbeddingBackend};
use crate::engine::envelope;
use crate::engine::fusion;
use crate::engine::intent::classify_intent;
use crate::engine::quality;
use crate::engine::retriever::{self, RetrievalPath};
use crate::engine::salience;
use crate::engine::store::MemoryStore;
use crate::engine::temporal::derive_hints;

// ═══════════════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════════════

/// Cloneable cancellation handle. The caller keeps one clone and cancels;
/// the pipeline checks its copy at the three designated points.
#[derive(Clone)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Diagnostics sink
// ═══════════════════════════════════════════════════════════════════════════

/// Narrow sink for streamed per-stage diagnostics. Events arrive in stage
/// order for each query; there is no cross-query ordering.
pub trait DiagnosticsSink: Send + Sync {
    fn stage(&self, query_id: &str, event: &StageEvent);
}

/// Default sink: the log stream.
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn stage(&self, query_id: &str, event: &StageEvent) {
        info!(
            "[mnema:{}] query {query_id}: {} candidates in {}ms",
            event.stage, event.candidates, event.duration_ms
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-call options
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct RetrieveOptions {
    /// Session handle for session-scoped conversation recall.
    pub session_id: Option<String>,
    pub cancel: Option<CancelSignal>,
    /// Clock override for tests; defaults to wall time.
    pub now_ms: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════════

pub struct Orchestrator {
    store: Arc<dyn MemoryStore>,
    config: RetrievalConfig,
    sink: Arc<dyn DiagnosticsSink>,
    in_flight: AtomicUsize,
    /// Snapshot of the most recent envelope, for observability surfaces.
    last_envelope: Mutex<Option<FusionEnvelope>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl Orchestrator {
    pub fn new(store: Arc<dyn MemoryStore>, config: RetrievalConfig) -> Self {
        Orchestrator {
            store,
            config,
            sink: Arc::new(LogSink),
            in_flight: AtomicUsize::new(0),
            last_envelope: Mutex::new(None),
        }
    }

    /// Construct with an embeddings backend, running the sanity contract.
    /// In pilot mode a zero-norm probe or hash-only backend is fatal.
    pub async fn with_embeddings(
        store: Arc<dyn MemoryStore>,
        embeddings: Arc<dyn EmbeddingBackend>,
        config: RetrievalConfig,
    ) -> MnemaResult<Self> {
        sanity_check(embeddings.as_ref(), config.pilot_mode).await?;
        Ok(Self::new(store, config))
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The most recent envelope, if any query has completed.
    pub fn last_envelope(&self) -> Option<FusionEnvelope> {
        self.last_envelope.lock().clone()
    }

    // ───────────────────────────────────────────────────────────────────
    // retrieve
    // ───────────────────────────────────────────────────────────────────

    /// Run the retrieval pipeline for one query.
    pub async fn retrieve(&self, query: &str, opts: RetrieveOptions) -> RetrievalOutcome {
        let started = Instant::now();
        let mut diag = Diagnostics {
            query_id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        };

        // ── Backpressure ────────────────────────────────────────────────
        if self.in_flight.fetch_add(1, Ordering::SeqCst) >= self.config.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!("[mnema:orchestrator] overloaded — rejecting query");
            return self.finish(FusionEnvelope::minimal("overloaded"), diag, Vec::new());
        }
        let _guard = InFlightGuard(&self.in_flight);

        let now_ms = opts
            .now_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let hints = derive_hints(query);
        let cancelled = || opts.cancel.as_ref().is_some_and(|c| c.is_cancelled());

        // ── C5: intent ──────────────────────────────────────────────────
        let stage_start = Instant::now();
        let intent = classify_intent(query);
        self.emit(&mut diag, "intent", 0, stage_start);

        if cancelled() {
            return self.finish(FusionEnvelope::minimal("cancelled"), diag, Vec::new());
        }

        // ── C6: retrieval (bounded) ─────────────────────────────────────
        let stage_start = Instant::now();
        let budget = Duration::from_secs(self.config.store_timeout_secs);
        let retrieved = tokio::time::timeout(
            budget,
            retriever::retrieve_candidates(
                self.store.as_ref(),
                query,
                &intent,
                opts.session_id.as_deref(),
                now_ms,
                &self.config,
            ),
        )
        .await;

        let set = match retrieved {
            Ok(set) => set,
            Err(_) => {
                warn!(
                    "[mnema:orchestrator] store search exceeded {}s budget",
                    self.config.store_timeout_secs
                );
                diag.warnings.push(format!(
                    "store search exceeded {}s budget",
                    self.config.store_timeout_secs
                ));
                return self.finish(
                    FusionEnvelope::minimal("store unavailable"),
                    diag,
                    Vec::new(),
                );
            }
        };
        let retrieved_count = set.hits.len().max(set.recall.len());
        self.emit(&mut diag, "retrieve", retrieved_count, stage_start);

        diag.warnings.extend(set.warnings.iter().cloned());
        diag.sessions_represented = set.sessions_represented;
        diag.timeline_span_minutes = set.timeline_span_minutes;

        if cancelled() {
            return self.finish(FusionEnvelope::minimal("cancelled"), diag, Vec::new());
        }

        // ── C7 + C8 (knowledge path only) ───────────────────────────────
        let mut dynamic_gate = None;
        let had_candidates = set.had_candidates;
        let store_degraded = !set.warnings.is_empty();
        let (selected, view_pool, candidates_considered) = match set.path {
            RetrievalPath::ConversationRecall => {
                let pool = set.recall.clone();
                let n = pool.len();
                (set.recall, pool, n)
            }
            RetrievalPath::Knowledge => {
                let stage_start = Instant::now();
                // Hits with no ranking signal (all-equal similarity) go
                // through the legacy dynamic gate instead.
                let unranked = set.hits.len() > 1
                    && set
                        .hits
                        .windows(2)
                        .all(|w| (w[0].similarity - w[1].similarity).abs() < f64::EPSILON);

                let (mut scored, warnings) =
                    salience::score_candidates(set.hits, now_ms, &hints, &self.config);
                diag.warnings.extend(warnings);

                if unranked {
                    let gate = salience::dynamic_gate(&scored);
                    scored = salience::apply_gate(scored, gate);
                    dynamic_gate = Some(gate);
                }
                let considered = scored.len();
                self.emit(&mut diag, "score", considered, stage_start);

                let stage_start = Instant::now();
                let outcome = diversity::enforce_diversity(
                    &scored,
                    self.config.final_core_count,
                    &self.config.quotas,
                );
                diag.diversity_swaps = outcome.swaps;
                diag.warnings.extend(outcome.warnings);
                self.emit(&mut diag, "diversity", outcome.selected.len(), stage_start);

                (outcome.selected, scored, considered)
            }
        };

        if cancelled() {
            return self.finish(FusionEnvelope::minimal("cancelled"), diag, Vec::new());
        }

        // ── Candidate statistics ────────────────────────────────────────
        self.fill_candidate_stats(&mut diag, &selected);

        // ── Cards + context budget ──────────────────────────────────────
        let cards = self.build_cards(&selected);
        let orchestrator_view: Vec<MemoryCard> = self.label_cards(
            view_pool
                .iter()
                .take(self.config.orchestrator_view_count)
                .map(|c| self.card_body(c))
                .collect(),
        );

        // ── C9: fusion ──────────────────────────────────────────────────
        let stage_start = Instant::now();
        let composition = fusion::compose(&cards);
        self.emit(&mut diag, "fuse", cards.len(), stage_start);

        diag.coverage = composition.coverage;

        // ── S2: quality ─────────────────────────────────────────────────
        let metrics = quality::build_quality_metrics(&cards, candidates_considered);
        diag.warnings.extend(quality::assess_quality(&metrics));
        diag.quality = Some(metrics);

        if started.elapsed().as_secs() > self.config.soft_cap_secs {
            let msg = format!(
                "pipeline exceeded {}s soft cap ({}ms)",
                self.config.soft_cap_secs,
                started.elapsed().as_millis()
            );
            warn!("[mnema:orchestrator] {msg}");
            diag.warnings.push(msg);
        }

        // ── Envelope ────────────────────────────────────────────────────
        let envelope = if cards.is_empty() {
            let rationale = if store_degraded {
                "store unavailable"
            } else {
                "no memory candidates"
            };
            FusionEnvelope::minimal(rationale)
        } else {
            FusionEnvelope {
                memory_cards: cards,
                avg_salience: composition.avg_salience,
                memory_weight: composition.memory_weight,
                general_weight: composition.general_weight,
                gk_allowance: composition.gk_allowance,
                rationale: composition.rationale,
                routing_hint: composition.routing_hint,
                had_candidates,
                dynamic_gate,
                low_confidence_count: composition.low_confidence_count,
                diagnostics: Diagnostics::default(), // attached in finish()
            }
        };

        self.finish(envelope, diag, orchestrator_view)
    }

    /// Post-generation half: de-hedge the raw LLM text and enforce the
    /// confidence/next-retrievals footer, calibrated by this envelope.
    pub fn finalize_answer(&self, raw: &str, envelope: &FusionEnvelope, query: &str) -> String {
        let hints = derive_hints(query);
        envelope::finalize_answer(
            raw,
            &envelope.memory_cards,
            query,
            envelope.diagnostics.coverage,
            envelope.diagnostics.source_histogram.len(),
            &hints,
            envelope.diagnostics.timestamp_coverage,
        )
    }

    // ───────────────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────────────

    fn emit(&self, diag: &mut Diagnostics, stage: &str, candidates: usize, started: Instant) {
        let event = StageEvent {
            stage: stage.to_string(),
            candidates,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.sink.stage(&diag.query_id, &event);
        diag.stages.push(event);
    }

    fn fill_candidate_stats(&self, diag: &mut Diagnostics, selected: &[Candidate]) {
        if selected.is_empty() {
            return;
        }

        let mut source_histogram: HashMap<String, usize> = HashMap::new();
        let mut type_histogram: HashMap<String, usize> = HashMap::new();
        let mut fallbacks = 0usize;
        let mut temporal_sum = 0.0f64;
        let (mut min, mut max, mut sum) = (f64::MAX, f64::MIN, 0.0f64);

        for cand in selected {
            *source_histogram.entry(source_key(&cand.chunk)).or_insert(0) += 1;
            *type_histogram
                .entry(
                    cand.chunk
                        .metadata
                        .chunk_type_or_unknown()
                        .as_str()
                        .to_string(),
                )
                .or_insert(0) += 1;
            if cand.chunk.metadata.timestamp_source == Some(TimestampSource::FallbackNow) {
                fallbacks += 1;
            }
            temporal_sum += cand.temporal_multiplier;
            min = min.min(cand.salience);
            max = max.max(cand.salience);
            sum += cand.salience;
        }

        let n = selected.len() as f64;
        diag.source_histogram = source_histogram;
        diag.type_histogram = type_histogram;
        diag.salience = SalienceStats {
            min,
            mean: sum / n,
            max,
        };
        diag.timestamp_fallback_pct = fallbacks as f64 / n;
        diag.timestamp_coverage = 1.0 - fallbacks as f64 / n;
        diag.temporal_weight_avg = temporal_sum / n;
    }

    fn card_body(&self, cand: &Candidate) -> MemoryCard {
        let content: String = cand
            .chunk
            .content
            .chars()
            .take(self.config.max_memory_length)
            .collect();
        MemoryCard {
            label: String::new(),
            tokens: content.chars().count() / 4,
            content,
            salience: cand.salience,
            source_id: cand
                .chunk
                .metadata
                .source_id
                .clone()
                .unwrap_or_else(|| stable_key(&cand.chunk)),
            low_confidence: cand.low_confidence,
        }
    }

    /// Build the final card set: per-card truncation, then whole-card drops
    /// (lowest salience first) until the total context budget holds.
    fn build_cards(&self, selected: &[Candidate]) -> Vec<MemoryCard> {
        let mut cards: Vec<MemoryCard> = selected
            .iter()
            .take(self.config.final_core_count)
            .map(|c| self.card_body(c))
            .collect();

        let mut total: usize = cards.iter().map(|c| c.content.chars().count()).sum();
        while total > self.config.max_context_length {
            // Cards are salience-ordered; the last one is the weakest.
            match cards.pop() {
                Some(dropped) => total -= dropped.content.chars().count(),
                None => break,
            }
        }

        self.label_cards(cards)
    }

    fn label_cards(&self, mut cards: Vec<MemoryCard>) -> Vec<MemoryCard> {
        for (i, card) in cards.iter_mut().enumerate() {
            card.label = format!("M{}", i + 1);
        }
        cards
    }

    fn finish(
        &self,
        mut envelope: FusionEnvelope,
        diag: Diagnostics,
        orchestrator_view: Vec<MemoryCard>,
    ) -> RetrievalOutcome {
        envelope.diagnostics = diag;
        *self.last_envelope.lock() = Some(envelope.clone());
        RetrievalOutcome {
            envelope,
            orchestrator_view,
        }
    }
}

/// Decrements the in-flight counter when a query completes or unwinds.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
