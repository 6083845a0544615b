// Criterion benches over the synchronous hot path of the pipeline:
// salience scoring, diversity enforcement and fusion composition at
// realistic candidate volumes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mnema::engine::{compose, enforce_diversity, score_candidates};
use mnema::{Chunk, ChunkMetadata, ChunkType, QueryHints, RetrievalConfig, SourceKind, StoreHit};

const NOW: i64 = 1_750_000_000_000;
const DAY: i64 = 86_400_000;

fn synthetic_hits(n: usize) -> Vec<StoreHit> {
    (0..n)
        .map(|i| StoreHit {
            chunk: Chunk {
                id: format!("chunk-{i}"),
                content: format!(
                    "Fact {i}: a remembered engineering detail, long enough to resemble a \
                     real retrieved memory chunk with a couple of sentences of body text."
                ),
                embedding: None,
                metadata: ChunkMetadata {
                    source_kind: Some(SourceKind::RepoFile),
                    source_id: Some(format!("repo:project-{}/doc-{i}.md", i % 40)),
                    timestamp: Some(NOW - (i as i64 % 400) * DAY),
                    ingested_at: Some(NOW - (i as i64 % 400) * DAY),
                    chunk_type: Some(ChunkType::Documentation),
                    provenance_version: Some("1.1.0".into()),
                    ..Default::default()
                },
            },
            similarity: 0.95 - (i as f64 * 0.0015),
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let config = RetrievalConfig::default();
    let hints = QueryHints::default();
    let hits = synthetic_hits(500);

    c.bench_function("score_500_candidates", |b| {
        b.iter(|| {
            let (cands, _) =
                score_candidates(black_box(hits.clone()), NOW, &hints, &config);
            black_box(cands)
        })
    });
}

fn bench_diversity(c: &mut Criterion) {
    let config = RetrievalConfig::default();
    let hints = QueryHints::default();
    let (candidates, _) = score_candidates(synthetic_hits(500), NOW, &hints, &config);

    c.bench_function("diversity_500_to_12", |b| {
        b.iter(|| {
            let out = enforce_diversity(black_box(&candidates), 12, &config.quotas);
            black_box(out.selected)
        })
    });
}

fn bench_fusion(c: &mut Criterion) {
    let config = RetrievalConfig::default();
    let hints = QueryHints::default();
    let (candidates, _) = score_candidates(synthetic_hits(500), NOW, &hints, &config);
    let out = enforce_diversity(&candidates, 12, &config.quotas);
    let cards: Vec<mnema::MemoryCard> = out
        .selected
        .iter()
        .enumerate()
        .map(|(i, c)| mnema::MemoryCard {
            label: format!("M{}", i + 1),
            content: c.chunk.content.clone(),
            tokens: c.chunk.content.len() / 4,
            salience: c.salience,
            source_id: c.chunk.metadata.source_id.clone().unwrap_or_default(),
            low_confidence: false,
        })
        .collect();

    c.bench_function("fusion_compose_12_cards", |b| {
        b.iter(|| black_box(compose(black_box(&cards))))
    });
}

criterion_group!(benches, bench_scoring, bench_diversity, bench_fusion);
criterion_main!(benches);
