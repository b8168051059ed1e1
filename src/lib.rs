//! Chapter analysis engine: concept extraction, pedagogical-pattern
//! detection, learning-science principle evaluation, and weighted score
//! aggregation over educational prose.

pub mod concepts;
pub mod config;
pub mod engine;
pub mod evaluators;
pub mod patterns;
pub mod types;

pub use config::{AnalysisConfig, PrincipleWeights, Tuning};
pub use engine::analyze;
pub use types::{
    AnalysisError, Chapter, ChapterAnalysis, Concept, ConceptGraph, PatternKind, PatternMatch,
    Principle, PrincipleEvaluation, Section,
};

// ---------------------------------------------------------------------------
// Shared text helpers
// ---------------------------------------------------------------------------

pub(crate) fn context_around(text: &str, start: usize, end: usize, width: usize) -> String {
    let mid = (start + end) / 2;
    let half = width / 2;
    let ctx_start = mid.saturating_sub(half);
    let ctx_end = std::cmp::min(text.len(), mid + half);

    // Don't slice in the middle of a multi-byte char
    let ctx_start = snap_to_char_boundary(text, ctx_start, false);
    let ctx_end = snap_to_char_boundary(text, ctx_end, true);

    let snippet = text[ctx_start..ctx_end].replace('\n', " ");
    let prefix = if ctx_start > 0 { "..." } else { "" };
    let suffix = if ctx_end < text.len() { "..." } else { "" };
    format!("{prefix}{snippet}{suffix}")
}

/// Snap a byte offset to a valid char boundary.
/// If `forward` is true, snap forward; otherwise snap backward.
pub(crate) fn snap_to_char_boundary(text: &str, pos: usize, forward: bool) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    if text.is_char_boundary(pos) {
        return pos;
    }
    if forward {
        let mut p = pos;
        while p < text.len() && !text.is_char_boundary(p) {
            p += 1;
        }
        p
    } else {
        let mut p = pos;
        while p > 0 && !text.is_char_boundary(p) {
            p -= 1;
        }
        p
    }
}

pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub(crate) fn per_kword(count: f64, words: usize) -> f64 {
    if words == 0 {
        0.0
    } else {
        count / (words as f64 / 1000.0)
    }
}

/// Quality band label for a 0-100 score, used verbatim in findings.
pub fn band_label(score: u8) -> &'static str {
    if score >= 80 {
        "excellent"
    } else if score >= 60 {
        "good"
    } else if score >= 40 {
        "adequate"
    } else {
        "needs work"
    }
}
