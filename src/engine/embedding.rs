// ── Mnema Engine: Embedding Backend ────────────────────────────────────────
//
// The embeddings seam of the pipeline. The core never owns a model; it
// consumes a backend through `EmbeddingBackend` and ships two adapters:
//
//   - `HttpEmbeddingClient` — Ollama-style endpoints first (`/api/embed`,
//     legacy `/api/embeddings`), then OpenAI-compatible `/v1/embeddings`.
//   - `HashEmbedding` — deterministic hash-seeded vectors for degraded or
//     offline operation. Selecting it in pilot mode is a fatal sanity error.
//
// Sanity contract on init: a probe embedding must have nonzero norm.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::atoms::error::{MnemaError, MnemaResult};

// ═══════════════════════════════════════════════════════════════════════════
// Trait & vector math
// ═══════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed one text into a fixed-dimension vector.
    async fn generate(&self, text: &str) -> MnemaResult<Vec<f32>>;

    fn name(&self) -> &str;

    /// True for fallback backends that do not produce semantic vectors.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// Cosine similarity in [-1, 1]. Zero-norm inputs yield 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        na += (*x as f64) * (*x as f64);
        nb += (*y as f64) * (*y as f64);
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
}

/// Scale a vector to unit norm. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f64 = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| (*x as f64 / norm) as f32).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Sanity contract
// ═══════════════════════════════════════════════════════════════════════════

/// Probe the backend once at startup. In pilot mode a zero-norm probe or a
/// degraded (hash-only) backend is fatal; otherwise it is logged and
/// tolerated.
pub async fn sanity_check(backend: &dyn EmbeddingBackend, pilot_mode: bool) -> MnemaResult<()> {
    if backend.is_degraded() {
        if pilot_mode {
            return Err(MnemaError::Sanity(format!(
                "embedding backend '{}' is hash-only; refusing to run in pilot mode",
                backend.name()
            )));
        }
        warn!(
            "[mnema:embedding] running on degraded backend '{}' — similarity quality will be poor",
            backend.name()
        );
    }

    let probe = backend.generate("mnema embedding sanity probe").await?;
    let norm: f64 = probe.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        let msg = format!(
            "embedding backend '{}' produced a zero-norm probe vector",
            backend.name()
        );
        if pilot_mode {
            return Err(MnemaError::Sanity(msg));
        }
        warn!("[mnema:embedding] {msg}");
    } else {
        info!(
            "[mnema:embedding] backend '{}' sane — dim {}, probe norm {:.3}",
            backend.name(),
            probe.len(),
            norm
        );
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP client (Ollama → OpenAI-compatible fallback)
// ═══════════════════════════════════════════════════════════════════════════

pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        HttpEmbeddingClient {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Ollama current API: POST /api/embed { model, input } →
    /// { embeddings: [[f32…]] }. Falls back to the legacy
    /// /api/embeddings { model, prompt } → { embedding: [f32…] }.
    async fn embed_ollama(&self, text: &str) -> MnemaResult<Vec<f32>> {
        let resp = self
            .client
            .post(self.endpoint("/api/embed"))
            .json(&json!({ "model": self.model, "input": text }))
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await;

        if let Ok(resp) = resp {
            if resp.status().is_success() {
                if let Ok(v) = resp.json::<Value>().await {
                    if let Some(vec) = parse_vector(v["embeddings"][0].as_array()) {
                        return Ok(vec);
                    }
                    if let Some(vec) = parse_vector(v["embedding"].as_array()) {
                        return Ok(vec);
                    }
                }
            }
        }

        let resp = self
            .client
            .post(self.endpoint("/api/embeddings"))
            .json(&json!({ "model": self.model, "prompt": text }))
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| MnemaError::EmbeddingFailure(format!("ollama unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(MnemaError::EmbeddingFailure(format!(
                "ollama embed returned {}",
                resp.status()
            )));
        }

        let v: Value = resp.json().await?;
        parse_vector(v["embedding"].as_array())
            .ok_or_else(|| MnemaError::EmbeddingFailure("empty ollama embedding".into()))
    }

    /// OpenAI-compatible format: POST /v1/embeddings { model, input }.
    async fn embed_openai(&self, text: &str) -> MnemaResult<Vec<f32>> {
        let resp = self
            .client
            .post(self.endpoint("/v1/embeddings"))
            .json(&json!({ "model": self.model, "input": text }))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(MnemaError::EmbeddingFailure(format!(
                "openai embed returned {}",
                resp.status()
            )));
        }

        let v: Value = resp.json().await?;
        parse_vector(v["data"][0]["embedding"].as_array())
            .ok_or_else(|| MnemaError::EmbeddingFailure("empty openai embedding".into()))
    }
}

fn parse_vector(arr: Option<&Vec<Value>>) -> Option<Vec<f32>> {
    let vec: Vec<f32> = arr?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();
    (!vec.is_empty()).then_some(vec)
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn generate(&self, text: &str) -> MnemaResult<Vec<f32>> {
        match self.embed_ollama(text).await {
            Ok(vec) => Ok(vec),
            Err(ollama_err) => match self.embed_openai(text).await {
                Ok(vec) => Ok(vec),
                Err(openai_err) => Err(MnemaError::EmbeddingFailure(format!(
                    "ollama: {ollama_err} | openai: {openai_err}"
                ))),
            },
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Hash fallback
// ═══════════════════════════════════════════════════════════════════════════

/// Deterministic pseudo-embedding: SHA-256 chained over the text seeds a
/// fixed-dimension unit vector. Identical texts collide exactly, related
/// texts do not — good enough to keep the pipeline shape alive offline,
/// useless for semantics. `is_degraded()` is true.
pub struct HashEmbedding {
    dim: usize,
}

impl HashEmbedding {
    pub fn new(dim: usize) -> Self {
        HashEmbedding { dim: dim.max(8) }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut out: Vec<f32> = Vec::with_capacity(self.dim);
        let mut block = Sha256::digest(text.as_bytes());
        'outer: loop {
            for byte in block.iter() {
                out.push((*byte as f32 - 127.5) / 127.5);
                if out.len() == self.dim {
                    break 'outer;
                }
            }
            block = Sha256::digest(&block);
        }
        normalize(&out)
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        HashEmbedding::new(256)
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbedding {
    async fn generate(&self, text: &str) -> MnemaResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn name(&self) -> &str {
        "hash"
    }

    fn is_degraded(&self) -> bool {
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identity_and_opposite() {
        let a = vec![1.0f32, 0.0, 0.0];
        let b = vec![-1.0f32, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_and_mismatched() {
        let a = vec![1.0f32, 2.0];
        let z = vec![0.0f32, 0.0];
        assert_eq!(cosine_similarity(&a, &z), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_normalize_unit_norm() {
        let v = normalize(&[3.0, 4.0]);
        let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hash_embedding_deterministic_and_unit() {
        let h = HashEmbedding::new(64);
        let a = h.embed_sync("hello world");
        let b = h.embed_sync("hello world");
        let c = h.embed_sync("something else");
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_sanity_rejects_hash_backend_in_pilot_mode() {
        let backend = HashEmbedding::default();
        let err = sanity_check(&backend, true).await.unwrap_err();
        assert!(matches!(err, MnemaError::Sanity(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_sanity_tolerates_hash_backend_otherwise() {
        let backend = HashEmbedding::default();
        assert!(sanity_check(&backend, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_sanity_rejects_zero_vectors_in_pilot_mode() {
        struct ZeroBackend;
        #[async_trait]
        impl EmbeddingBackend for ZeroBackend {
            async fn generate(&self, _text: &str) -> MnemaResult<Vec<f32>> {
                Ok(vec![0.0; 16])
            }
            fn name(&self) -> &str {
                "zero"
            }
        }
        let err = sanity_check(&ZeroBackend, true).await.unwrap_err();
        assert!(matches!(err, MnemaError::Sanity(_)));
        assert!(sanity_check(&ZeroBackend, false).await.is_ok());
    }
}
