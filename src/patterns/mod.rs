//! Pedagogical pattern detectors. Each detector is a pure function over the
//! raw text; domain sets are composed with the universal set by union.

pub mod chemistry;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Tuning;
use crate::types::{PatternKind, PatternMatch};
use crate::{context_around, snap_to_char_boundary};

pub type Detector = fn(&str, &Tuning) -> Vec<PatternMatch>;

// ---------------------------------------------------------------------------
// Compiled triggers
// ---------------------------------------------------------------------------

static PROBLEM_TRIGGER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:worked example|sample problem|example|problem|exercise|question|practice",
        r"|quiz|try (?:it|this)|test yourself|check your understanding)\b\s*\d*\s*[:.)]?",
    ))
    .unwrap()
});

static ANSWER_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:answer|solution|solve[ds]?|thus|therefore|we get|step \d|first,|finally)\b")
        .unwrap()
});

static TITLED_TRIGGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:worked example|sample problem|example|problem|exercise|question)\s*\d*$").unwrap());

static EXAMPLE_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:for example|for instance|such as|e\.g\.|consider the case|example\s*[:\d])").unwrap()
});

static EQUATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"[0-9A-Za-z(][0-9A-Za-z()\u{2080}-\u{2089}\u{00B2}\u{00B3}]*",
        r"(?:\s*\+\s*[0-9A-Za-z(][0-9A-Za-z()\u{2080}-\u{2089}\u{00B2}\u{00B3}]*)*",
        r"\s*(?:\u{2192}|\u{21CC}|->|<->|=)\s*",
        r"[0-9A-Za-z(][0-9A-Za-z()\u{2080}-\u{2089}\u{00B2}\u{00B3}]*",
        r"(?:\s*\+\s*[0-9A-Za-z(][0-9A-Za-z()\u{2080}-\u{2089}\u{00B2}\u{00B3}]*)*",
    ))
    .unwrap()
});

static ARROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\u{2192}|\u{21CC}|->|<->").unwrap());

static STEP_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:step\s+)?\d+\s*[.):]\s+\S").unwrap());

static COMPARISON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:compared (?:to|with)|in contrast(?: to)?|whereas|unlike|on the other hand",
        r"|versus|differs? from|similarly|by comparison|the difference between)\b",
    ))
    .unwrap()
});

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bounded look-ahead window after a trigger: capped at the tuning limit and
/// clipped at the next paragraph break.
fn lookahead_window<'a>(text: &'a str, from: usize, tuning: &Tuning) -> &'a str {
    let hard_end = snap_to_char_boundary(
        text,
        std::cmp::min(text.len(), from + tuning.pattern_lookahead_chars),
        true,
    );
    let window = &text[from..hard_end];
    match window.find("\n\n") {
        Some(brk) => &window[..brk],
        None => window,
    }
}

fn pattern(
    text: &str,
    kind: PatternKind,
    confidence: f64,
    start: usize,
    end: usize,
    tuning: &Tuning,
) -> PatternMatch {
    PatternMatch {
        kind,
        confidence,
        start,
        end,
        context: context_around(text, start, end, tuning.context_window_chars),
        title: None,
        metadata: BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Universal detectors
// ---------------------------------------------------------------------------

/// Worked examples vs. practice problems: a problem cue followed by an
/// answer/solution cue within the look-ahead window is a worked example,
/// otherwise a practice problem.
pub fn detect_problems(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    let mut out = Vec::new();
    for m in PROBLEM_TRIGGER_RE.find_iter(text) {
        let window = lookahead_window(text, m.end(), tuning);
        let span_end = m.end() + window.len();
        let (kind, confidence) = if ANSWER_CUE_RE.is_match(window) {
            (PatternKind::WorkedExample, tuning.worked_example_confidence)
        } else {
            (
                PatternKind::PracticeProblem,
                tuning.practice_problem_confidence,
            )
        };
        let mut pm = pattern(text, kind, confidence, m.start(), span_end, tuning);
        let trigger = m
            .as_str()
            .trim_end_matches(|c: char| matches!(c, ':' | '.' | ')' | ' '));
        if TITLED_TRIGGER_RE.is_match(trigger) {
            pm.title = Some(trigger.to_string());
        }
        out.push(pm);
    }
    out
}

/// Concrete-instance phrasing attached to an idea being defined or explained.
pub fn detect_definition_examples(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    let mut out = Vec::new();
    for m in EXAMPLE_CUE_RE.find_iter(text) {
        let window = lookahead_window(text, m.end(), tuning);
        let clipped = std::cmp::min(window.len(), tuning.example_cue_window_chars);
        let end = m.end() + snap_to_char_boundary(window, clipped, false);
        out.push(pattern(
            text,
            PatternKind::DefinitionExample,
            tuning.definition_example_confidence,
            m.start(),
            end,
            tuning,
        ));
    }
    out
}

/// Equation-like spans: terms joined by `+` on either side of an arrow or
/// equals sign. Plain `=` spans must carry a digit to count.
pub fn detect_formulas(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    let mut out = Vec::new();
    for m in EQUATION_RE.find_iter(text) {
        let span = m.as_str();
        let has_arrow = ARROW_RE.is_match(span);
        if !has_arrow && !span.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }
        let confidence = if has_arrow {
            tuning.formula_arrow_confidence
        } else {
            tuning.formula_equals_confidence
        };
        out.push(pattern(
            text,
            PatternKind::Formula,
            confidence,
            m.start(),
            m.end(),
            tuning,
        ));
    }
    out
}

/// Runs of numbered-step lines.
pub fn detect_procedures(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    let mut run_start = 0usize;
    let mut run_end = 0usize;
    let mut run_len = 0usize;

    let flush = |run_len: usize, run_start: usize, run_end: usize, out: &mut Vec<PatternMatch>| {
        if run_len >= tuning.procedure_min_steps {
            let mut pm = pattern(
                text,
                PatternKind::Procedure,
                tuning.procedure_confidence,
                run_start,
                run_end,
                tuning,
            );
            pm.metadata
                .insert("steps".to_string(), run_len.to_string());
            out.push(pm);
        }
    };

    for line in text.split('\n') {
        let line_end = offset + line.len();
        if STEP_LINE_RE.is_match(line) {
            if run_len == 0 {
                run_start = offset;
            }
            run_end = line_end;
            run_len += 1;
        } else if !line.trim().is_empty() {
            flush(run_len, run_start, run_end, &mut out);
            run_len = 0;
        }
        offset = line_end + 1;
    }
    flush(run_len, run_start, run_end, &mut out);
    out
}

/// Explicit comparison language.
pub fn detect_comparisons(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    COMPARISON_RE
        .find_iter(text)
        .map(|m| {
            pattern(
                text,
                PatternKind::Comparison,
                tuning.comparison_confidence,
                m.start(),
                m.end(),
                tuning,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Registry and composition
// ---------------------------------------------------------------------------

pub fn universal_detectors() -> Vec<Detector> {
    vec![
        detect_problems,
        detect_definition_examples,
        detect_formulas,
        detect_procedures,
        detect_comparisons,
    ]
}

/// Detector set for a domain key. Unknown or absent keys resolve to the
/// universal set only, never an error.
pub fn detectors_for(domain: Option<&str>) -> Vec<Detector> {
    let mut set = universal_detectors();
    match domain.map(|d| d.to_ascii_lowercase()) {
        Some(ref d) if d == "chemistry" => set.extend(chemistry::detectors()),
        Some(ref d) => {
            tracing::debug!(domain = %d, "no detector set registered for domain, using universal patterns");
        }
        None => {}
    }
    set
}

/// Run the detector set registered for a domain over the text.
pub fn detect_all(text: &str, domain: Option<&str>, tuning: &Tuning) -> Vec<PatternMatch> {
    run_detectors(text, &detectors_for(domain), tuning)
}

/// Run an explicit detector set over the text. A panicking detector
/// contributes an empty set instead of aborting the run.
pub fn run_detectors(text: &str, detectors: &[Detector], tuning: &Tuning) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    for detector in detectors {
        match catch_unwind(AssertUnwindSafe(|| detector(text, tuning))) {
            Ok(found) => matches.extend(found),
            Err(_) => {
                tracing::warn!("pattern detector panicked, contributing no matches");
            }
        }
    }
    dedup_matches(matches, tuning.dedup_offset_slack)
}

/// Overlapping matches of the same kind at near-identical offsets collapse
/// to the highest-confidence instance.
pub fn dedup_matches(mut matches: Vec<PatternMatch>, slack: usize) -> Vec<PatternMatch> {
    matches.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut kept: Vec<PatternMatch> = Vec::with_capacity(matches.len());
    for candidate in matches {
        let duplicate_of = kept.iter().position(|k| {
            k.kind == candidate.kind
                && candidate.start.abs_diff(k.start) <= slack
                && candidate.start < k.end.max(k.start + slack)
        });
        match duplicate_of {
            Some(i) => {
                if candidate.confidence > kept[i].confidence {
                    kept[i] = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }
    kept
}
