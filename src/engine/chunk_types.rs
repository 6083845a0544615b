// ── Mnema Engine: Chunk Type Classification ────────────────────────────────
//
// Deterministic, ordered rule cascade mapping (source_kind, path, content)
// to one of the 16 semantic chunk types. First matching rule wins; the
// cascade runs most-specific → most-generic so that a README inside a repo
// is `readme`, not `documentation`, and a decision note is
// `decision_rationale`, not `general_note`.
//
// Pure function — no I/O, no clock, no configuration. Runs at ingest and
// whenever the provenance enforcer finds a chunk without a type.

use crate::atoms::types::{ChunkType, SourceKind};

/// File extensions treated as code implementations.
const CODE_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".ts", ".tsx", ".js", ".jsx", ".go", ".java", ".kt", ".swift", ".c", ".cc",
    ".cpp", ".h", ".hpp", ".cs", ".rb", ".php", ".ex", ".exs", ".hs", ".zig", ".lua", ".scala",
    ".sh", ".sql",
];

/// Documentation-ish extensions for repo files that are not code.
const DOC_EXTENSIONS: &[&str] = &[".md", ".mdx", ".rst", ".adoc", ".txt"];

/// Classify a chunk into its semantic type.
pub fn classify_chunk(kind: SourceKind, path: Option<&str>, content: &str) -> ChunkType {
    let path_lower = path.map(|p| p.to_lowercase()).unwrap_or_default();
    let content_lower = content.to_lowercase();

    // ── Rule 1: README files ─────────────────────────────────────────────
    if file_name(&path_lower)
        .map(|f| f == "readme" || f.starts_with("readme."))
        .unwrap_or(false)
    {
        return ChunkType::Readme;
    }

    // ── Rule 2: conversations ────────────────────────────────────────────
    // Multi-speaker transcripts become discussion threads; single turns and
    // event summaries stay conversation events.
    if kind == SourceKind::Conversation {
        return if speaker_line_count(content) >= 3 {
            ChunkType::DiscussionThread
        } else {
            ChunkType::ConversationEvent
        };
    }

    // ── Rule 3: architecture decision records ────────────────────────────
    if path_lower.contains("/adr/")
        || path_lower.contains("/adrs/")
        || content_lower.contains("architecture decision record")
        || content_lower.starts_with("# adr")
    {
        return ChunkType::ArchitectureDecision;
    }

    // ── Rule 4: code files by extension ──────────────────────────────────
    if CODE_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
        return ChunkType::CodeImplementation;
    }

    // ── Rule 5: code examples embedded in prose ──────────────────────────
    // A fenced block surrounded by explanation is an example, not an
    // implementation.
    if content.contains("```") && !is_mostly_code(content) {
        return ChunkType::CodeExample;
    }
    if content.contains("```") {
        return ChunkType::CodeImplementation;
    }

    // ── Rule 6: decision rationale ───────────────────────────────────────
    if contains_any(
        &content_lower,
        &[
            "we decided",
            "decision:",
            "we chose",
            "settled on",
            "we're going with",
            "rationale:",
        ],
    ) {
        return ChunkType::DecisionRationale;
    }

    // ── Rule 7: constraints & invariants ─────────────────────────────────
    if contains_any(
        &content_lower,
        &[
            "invariant",
            "constraint:",
            "must never",
            "must not",
            "must always",
            "hard requirement",
        ],
    ) {
        return ChunkType::ConstraintInvariant;
    }

    // ── Rule 8: tutorials ────────────────────────────────────────────────
    if path_lower.contains("tutorial")
        || content_lower.contains("tutorial")
        || (content_lower.contains("step 1") && content_lower.contains("step 2"))
    {
        return ChunkType::Tutorial;
    }

    // ── Rule 9: API references ───────────────────────────────────────────
    if content_lower.contains("api reference")
        || content.contains("GET /")
        || content.contains("POST /")
        || content_lower.contains("## parameters")
    {
        return ChunkType::ApiReference;
    }

    // ── Rule 10: repo documentation ──────────────────────────────────────
    if kind == SourceKind::RepoFile
        && (path_lower.contains("/docs/")
            || path_lower.starts_with("docs/")
            || DOC_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)))
    {
        return ChunkType::Documentation;
    }

    // ── Rules 11–15: kind-derived fallbacks ──────────────────────────────
    match kind {
        SourceKind::Pdf => ChunkType::PaperExcerpt,
        SourceKind::Web => ChunkType::WebArticle,
        SourceKind::Email => ChunkType::DiscussionThread,
        SourceKind::Manual => ChunkType::Documentation,
        SourceKind::Note => {
            if content.contains("http://") || content.contains("https://") {
                ChunkType::ResearchNote
            } else {
                ChunkType::GeneralNote
            }
        }
        // ── Rule 16: last resort ─────────────────────────────────────────
        _ => ChunkType::Unknown,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn file_name(path_lower: &str) -> Option<&str> {
    if path_lower.is_empty() {
        return None;
    }
    path_lower.rsplit('/').next()
}

/// Count lines that look like "Speaker: text" transcript turns.
fn speaker_line_count(content: &str) -> usize {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            match trimmed.split_once(':') {
                Some((speaker, rest)) => {
                    !speaker.is_empty()
                        && speaker.len() <= 32
                        && speaker.chars().all(|c| c.is_alphanumeric() || c == ' ' || c == '_')
                        && !rest.is_empty()
                }
                None => false,
            }
        })
        .count()
}

/// True when more than half the lines sit inside fenced code blocks.
fn is_mostly_code(content: &str) -> bool {
    let mut in_fence = false;
    let mut code_lines = 0usize;
    let mut total_lines = 0usize;
    for line in content.lines() {
        total_lines += 1;
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            code_lines += 1;
        } else if in_fence {
            code_lines += 1;
        }
    }
    total_lines > 0 && code_lines * 2 > total_lines
}

fn contains_any(s: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| s.contains(t))
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
