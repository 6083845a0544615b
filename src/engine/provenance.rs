// ── Mnema Engine: Provenance Enforcement ───────────────────────────────────
//
// Normalizes every chunk's metadata so the pipeline can rely on it:
// source kind, canonical source id, event + ingest timestamps, chunk type
// and schema version. Runs at ingest and again on read whenever a chunk
// arrives incomplete or under an older schema version.
//
// Enforcement never fails. Inference ambiguity is recorded in the metadata
// itself (`timestamp_source`, `timestamp_fallback`) instead of surfacing as
// an error, and `enforce(enforce(c)) == enforce(c)` — callers may re-enforce
// freely.
//
// `now_ms` is an explicit argument: no hidden clock reads inside the rules.

use log::debug;
use sha2::{Digest, Sha256};

use crate::atoms::constants::{
    CLOCK_SKEW_TOLERANCE_MS, CURRENT_PROVENANCE_VERSION, PLACEHOLDER_WINDOW_MS,
};
use crate::atoms::types::{Chunk, ChunkMetadata, SourceKind, TimestampSource};
use crate::engine::chunk_types::classify_chunk;

// ═══════════════════════════════════════════════════════════════════════════
// Entry points
// ═══════════════════════════════════════════════════════════════════════════

/// Enforce the provenance schema on one chunk.
pub fn enforce(mut chunk: Chunk, now_ms: i64) -> Chunk {
    // Rule order matters: kind → id → ingest time → event time → type →
    // version. Each rule only fills or corrects; none erases caller data.
    infer_source_kind(&mut chunk);
    derive_source_id(&mut chunk);

    if chunk.metadata.ingested_at.is_none() {
        chunk.metadata.ingested_at = Some(now_ms);
    }

    enforce_event_timestamp(&mut chunk.metadata, now_ms);

    if chunk.metadata.chunk_type.is_none() {
        let kind = chunk.metadata.source_kind_or_unknown();
        chunk.metadata.chunk_type = Some(classify_chunk(
            kind,
            chunk.metadata.path.as_deref(),
            &chunk.content,
        ));
    }

    upgrade_version(&mut chunk.metadata);

    debug_assert!(chunk.metadata.provenance_complete());
    chunk
}

/// True when a chunk read from the store must pass through `enforce` again:
/// required fields missing, or written under an older schema version.
pub fn needs_enforcement(meta: &ChunkMetadata) -> bool {
    if !meta.provenance_complete() {
        return true;
    }
    meta.provenance_version
        .as_deref()
        .map(|v| version_lt(v, CURRENT_PROVENANCE_VERSION))
        .unwrap_or(true)
}

/// True when the chunk was written under an older provenance schema
/// version. Used by the salience scorer to apply the stale penalty before
/// the chunk is re-enforced.
pub fn version_stale(meta: &ChunkMetadata) -> bool {
    match meta.provenance_version.as_deref() {
        Some(v) => version_lt(v, CURRENT_PROVENANCE_VERSION),
        None => false,
    }
}

/// First 16 hex chars of the SHA-256 of the input.
pub fn sha256_16(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
// Rule 2: source-kind inference
// ═══════════════════════════════════════════════════════════════════════════

fn infer_source_kind(chunk: &mut Chunk) {
    if chunk.metadata.source_kind.is_some() {
        return;
    }
    let meta = &chunk.metadata;

    let kind = if meta.conversation_id.is_some()
        || meta.message_id.is_some()
        || meta.session_id.is_some()
    {
        SourceKind::Conversation
    } else if let Some(url) = meta.url.as_deref() {
        if url.to_lowercase().ends_with(".pdf") {
            SourceKind::Pdf
        } else {
            SourceKind::Web
        }
    } else if let Some(path) = meta.path.as_deref() {
        if path.to_lowercase().ends_with(".pdf") {
            SourceKind::Pdf
        } else {
            SourceKind::RepoFile
        }
    } else if meta.repository.is_some() {
        SourceKind::RepoFile
    } else if meta.extra.contains_key("email_id") {
        SourceKind::Email
    } else {
        SourceKind::Unknown
    };

    chunk.metadata.source_kind = Some(kind);
}

// ═══════════════════════════════════════════════════════════════════════════
// Rule 3: canonical source-id derivation
// ═══════════════════════════════════════════════════════════════════════════

fn derive_source_id(chunk: &mut Chunk) {
    if chunk
        .metadata
        .source_id
        .as_deref()
        .is_some_and(|s| !s.is_empty())
    {
        return;
    }

    let meta = &chunk.metadata;
    let derived = match meta.source_kind_or_unknown() {
        SourceKind::RepoFile => meta.path.as_deref().map(|path| {
            let repo = meta.repository.as_deref().unwrap_or("local");
            match meta.extra.get("commit").and_then(|v| v.as_str()) {
                Some(commit) => format!("repo:{repo}/{path}#{commit}"),
                None => format!("repo:{repo}/{path}"),
            }
        }),
        SourceKind::Conversation => meta
            .conversation_id
            .as_deref()
            .or(meta.session_id.as_deref())
            .map(|conv| match meta.message_id.as_deref() {
                Some(msg) => format!("conversation:{conv}#{msg}"),
                None => format!("conversation:{conv}"),
            }),
        SourceKind::Web => meta.url.as_deref().map(|url| format!("url:{url}")),
        SourceKind::Pdf => {
            let file = meta
                .path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .or_else(|| meta.url.as_deref().and_then(|u| u.rsplit('/').next()));
            file.map(|f| match meta.page {
                Some(n) => format!("pdf:{f}#page{n}"),
                None => format!("pdf:{f}"),
            })
        }
        SourceKind::Email => meta
            .extra
            .get("email_id")
            .and_then(|v| v.as_str())
            .or(meta.message_id.as_deref())
            .map(|id| format!("email:{id}")),
        SourceKind::Note => Some(if chunk.id.is_empty() {
            format!("note:{}", sha256_16(&chunk.content))
        } else {
            format!("note:{}", chunk.id)
        }),
        SourceKind::Manual => Some(if chunk.id.is_empty() {
            format!("manual:{}", sha256_16(&chunk.content))
        } else {
            format!("manual:{}", chunk.id)
        }),
        SourceKind::Unknown => None,
    };

    // Last resort for any kind whose identifying fields are absent: a
    // deterministic content hash so nothing ever collapses to one id.
    let derived = derived.unwrap_or_else(|| {
        let type_str = meta
            .chunk_type
            .map(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        let ts = meta.timestamp.map(|t| t.to_string()).unwrap_or_default();
        format!(
            "unknown:{}",
            sha256_16(&format!("{}|{}|{}|{}", chunk.content, chunk.id, type_str, ts))
        )
    });

    chunk.metadata.source_id = Some(derived);
}

// ═══════════════════════════════════════════════════════════════════════════
// Rules 5–6: event-timestamp inference & override policy
// ═══════════════════════════════════════════════════════════════════════════

/// Explicit event-time hints, in precedence order. The legacy `timestamp`
/// field is the final fallback for inference but is not itself a hint for
/// the override policy.
fn explicit_event_hint(meta: &ChunkMetadata) -> Option<i64> {
    meta.event_time
        .or(meta.created_at)
        .or(meta.commit_time)
        .or(meta.file_created_at)
        .or(meta.conversation_ts)
        .or(meta.message_ts)
        .or(meta.updated_at)
}

fn enforce_event_timestamp(meta: &mut ChunkMetadata, now_ms: i64) {
    let hint = explicit_event_hint(meta);
    let inferred = hint.or(meta.timestamp);

    // Conversation chunks with explicit conversation/message times are
    // pinned: the event time is authoritative and inference never wins.
    let conversation_pinned = meta.timestamp_source == Some(TimestampSource::ConversationEventTime)
        || (meta.source_kind == Some(SourceKind::Conversation)
            && meta.has_explicit_conversation_time());

    if conversation_pinned {
        let conv_ts = meta.conversation_ts.or(meta.message_ts);
        if meta.timestamp.is_none() {
            meta.timestamp = conv_ts.or(Some(now_ms));
        }
        if meta.timestamp_source.is_none() {
            meta.timestamp_source = Some(TimestampSource::ConversationEventTime);
        }
        return;
    }

    match meta.timestamp {
        None => apply_inferred(meta, inferred, now_ms),
        Some(existing) => {
            // Invariant 2: event time is non-negative and not in the future
            // beyond clock skew.
            if existing < 0 || existing > now_ms + CLOCK_SKEW_TOLERANCE_MS {
                debug!(
                    "[mnema:provenance] invalid event timestamp {existing} — re-inferring"
                );
                meta.timestamp = None;
                apply_inferred(meta, hint, now_ms);
                return;
            }

            // The stored value survives unless an explicit hint contradicts
            // it by more than the placeholder window. This covers both the
            // ingest-time-placeholder case (stored ≈ ingested_at, hint far
            // away) and direct hint disagreement.
            let hint_disagrees = hint
                .map(|h| (existing - h).abs() > PLACEHOLDER_WINDOW_MS)
                .unwrap_or(false);

            if hint_disagrees {
                meta.timestamp = hint;
                meta.timestamp_source = Some(TimestampSource::InferredEventTime);
                meta.timestamp_fallback = false;
            } else if meta.timestamp_source.is_none() {
                meta.timestamp_source = Some(TimestampSource::Existing);
            }
        }
    }
}

fn apply_inferred(meta: &mut ChunkMetadata, inferred: Option<i64>, now_ms: i64) {
    match inferred.filter(|ts| *ts >= 0 && *ts <= now_ms + CLOCK_SKEW_TOLERANCE_MS) {
        Some(ts) => {
            meta.timestamp = Some(ts);
            meta.timestamp_source = Some(TimestampSource::InferredEventTime);
            meta.timestamp_fallback = false;
        }
        None => {
            meta.timestamp = Some(now_ms);
            meta.timestamp_source = Some(TimestampSource::FallbackNow);
            meta.timestamp_fallback = true;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Rule 8: schema version upgrades
// ═══════════════════════════════════════════════════════════════════════════

fn upgrade_version(meta: &mut ChunkMetadata) {
    match meta.provenance_version.as_deref() {
        Some(v) if !version_lt(v, CURRENT_PROVENANCE_VERSION) => {}
        Some(old) => {
            meta.provenance_upgraded_from = Some(old.to_string());
            meta.provenance_version = Some(CURRENT_PROVENANCE_VERSION.to_string());
        }
        None => {
            meta.provenance_version = Some(CURRENT_PROVENANCE_VERSION.to_string());
        }
    }
}

/// Dotted numeric version comparison ("1.0.0" < "1.1.0"). Non-numeric
/// segments compare as zero.
fn version_lt(a: &str, b: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|seg| seg.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (va, vb) = (parse(a), parse(b));
    let len = va.len().max(vb.len());
    for i in 0..len {
        let x = va.get(i).copied().unwrap_or(0);
        let y = vb.get(i).copied().unwrap_or(0);
        if x != y {
            return x < y;
        }
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::ChunkType;

    const NOW: i64 = 1_750_000_000_000;
    const HOUR: i64 = 60 * 60 * 1000;

    fn bare_chunk(content: &str) -> Chunk {
        Chunk {
            id: "c1".into(),
            content: content.into(),
            embedding: None,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_enforce_fills_every_required_field() {
        let out = enforce(bare_chunk("a stray fact with no provenance"), NOW);
        assert!(out.metadata.provenance_complete());
        assert_eq!(out.metadata.ingested_at, Some(NOW));
        assert_eq!(
            out.metadata.provenance_version.as_deref(),
            Some(CURRENT_PROVENANCE_VERSION)
        );
        assert!(out.metadata.timestamp_fallback);
        assert_eq!(
            out.metadata.timestamp_source,
            Some(TimestampSource::FallbackNow)
        );
    }

    #[test]
    fn test_enforce_is_idempotent() {
        let mut chunk = bare_chunk("note body");
        chunk.metadata.created_at = Some(NOW - 3 * HOUR);
        let once = enforce(chunk, NOW);
        let twice = enforce(once.clone(), NOW + 5_000);
        assert_eq!(once, twice, "Second enforcement must be a no-op");
    }

    #[test]
    fn test_repo_source_id_format() {
        let mut chunk = bare_chunk("fn main() {}");
        chunk.metadata.repository = Some("mnema".into());
        chunk.metadata.path = Some("src/lib.rs".into());
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.source_id.as_deref(), Some("repo:mnema/src/lib.rs"));
        assert_eq!(out.metadata.source_kind, Some(SourceKind::RepoFile));
    }

    #[test]
    fn test_repo_source_id_includes_commit() {
        let mut chunk = bare_chunk("fn main() {}");
        chunk.metadata.repository = Some("mnema".into());
        chunk.metadata.path = Some("src/lib.rs".into());
        chunk
            .metadata
            .extra
            .insert("commit".into(), serde_json::json!("abc123"));
        let out = enforce(chunk, NOW);
        assert_eq!(
            out.metadata.source_id.as_deref(),
            Some("repo:mnema/src/lib.rs#abc123")
        );
    }

    #[test]
    fn test_conversation_source_id_and_kind() {
        let mut chunk = bare_chunk("we talked about rollout");
        chunk.metadata.conversation_id = Some("conv9".into());
        chunk.metadata.message_id = Some("m4".into());
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.source_kind, Some(SourceKind::Conversation));
        assert_eq!(
            out.metadata.source_id.as_deref(),
            Some("conversation:conv9#m4")
        );
    }

    #[test]
    fn test_pdf_source_id_with_page() {
        let mut chunk = bare_chunk("excerpt");
        chunk.metadata.source_kind = Some(SourceKind::Pdf);
        chunk.metadata.path = Some("papers/attention.pdf".into());
        chunk.metadata.page = Some(3);
        let out = enforce(chunk, NOW);
        assert_eq!(
            out.metadata.source_id.as_deref(),
            Some("pdf:attention.pdf#page3")
        );
    }

    #[test]
    fn test_unknown_hash_id_is_deterministic() {
        let a = enforce(bare_chunk("same content"), NOW);
        let b = enforce(bare_chunk("same content"), NOW);
        assert_eq!(a.metadata.source_id, b.metadata.source_id);
        let id = a.metadata.source_id.unwrap();
        assert!(id.starts_with("unknown:"));
        assert_eq!(id.len(), "unknown:".len() + 16);
    }

    #[test]
    fn test_distinct_content_distinct_hash_ids() {
        let a = enforce(bare_chunk("content alpha"), NOW);
        let b = enforce(bare_chunk("content beta"), NOW);
        assert_ne!(a.metadata.source_id, b.metadata.source_id);
    }

    #[test]
    fn test_placeholder_timestamp_overridden_by_hint() {
        let mut chunk = bare_chunk("committed long ago");
        chunk.metadata.ingested_at = Some(NOW);
        chunk.metadata.timestamp = Some(NOW - 10 * 60 * 1000); // 10 min before ingest
        chunk.metadata.commit_time = Some(NOW - 90 * 24 * HOUR);
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.timestamp, Some(NOW - 90 * 24 * HOUR));
        assert_eq!(
            out.metadata.timestamp_source,
            Some(TimestampSource::InferredEventTime)
        );
        assert!(!out.metadata.timestamp_fallback);
    }

    #[test]
    fn test_existing_timestamp_kept_without_hints() {
        let event = NOW - 40 * 24 * HOUR;
        let mut chunk = bare_chunk("old note");
        chunk.metadata.timestamp = Some(event);
        chunk.metadata.ingested_at = Some(NOW);
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.timestamp, Some(event));
        assert_eq!(out.metadata.timestamp_source, Some(TimestampSource::Existing));
    }

    #[test]
    fn test_conversation_event_time_never_overridden() {
        let conv_time = NOW - 5 * 24 * HOUR;
        let mut chunk = bare_chunk("what the user said");
        chunk.metadata.source_kind = Some(SourceKind::Conversation);
        chunk.metadata.conversation_id = Some("conv1".into());
        chunk.metadata.timestamp = Some(conv_time);
        chunk.metadata.conversation_ts = Some(conv_time);
        // A contradicting hint that would normally win.
        chunk.metadata.created_at = Some(NOW - 200 * 24 * HOUR);
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.timestamp, Some(conv_time));
        assert_eq!(
            out.metadata.timestamp_source,
            Some(TimestampSource::ConversationEventTime)
        );
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut chunk = bare_chunk("from the future");
        chunk.metadata.timestamp = Some(NOW + 48 * HOUR);
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.timestamp, Some(NOW));
        assert!(out.metadata.timestamp_fallback);
    }

    #[test]
    fn test_version_upgrade_recorded() {
        let mut chunk = bare_chunk("aged");
        chunk.metadata.provenance_version = Some("1.0.0".into());
        let out = enforce(chunk, NOW);
        assert_eq!(
            out.metadata.provenance_version.as_deref(),
            Some(CURRENT_PROVENANCE_VERSION)
        );
        assert_eq!(out.metadata.provenance_upgraded_from.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_current_version_untouched() {
        let mut chunk = bare_chunk("fresh");
        chunk.metadata.provenance_version = Some(CURRENT_PROVENANCE_VERSION.into());
        let out = enforce(chunk, NOW);
        assert!(out.metadata.provenance_upgraded_from.is_none());
    }

    #[test]
    fn test_chunk_type_filled_when_missing() {
        let mut chunk = bare_chunk("# My Project");
        chunk.metadata.repository = Some("r".into());
        chunk.metadata.path = Some("README.md".into());
        let out = enforce(chunk, NOW);
        assert_eq!(out.metadata.chunk_type, Some(ChunkType::Readme));
    }

    #[test]
    fn test_needs_enforcement_on_stale_version() {
        let mut out = enforce(bare_chunk("x"), NOW);
        assert!(!needs_enforcement(&out.metadata));
        out.metadata.provenance_version = Some("1.0.0".into());
        assert!(needs_enforcement(&out.metadata));
        out.metadata.provenance_version = None;
        assert!(needs_enforcement(&out.metadata));
    }

    #[test]
    fn test_version_compare() {
        assert!(version_lt("1.0.0", "1.1.0"));
        assert!(version_lt("0.9.9", "1.0.0"));
        assert!(!version_lt("1.1.0", "1.1.0"));
        assert!(!version_lt("2.0", "1.9.9"));
    }
}
