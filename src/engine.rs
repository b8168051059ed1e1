//! Orchestrator: input validation, the parallel extraction/detection stage,
//! the parallel evaluation stage, structure metrics, weighted aggregation,
//! recommendations, and the visualization data block.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::Utc;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::concepts;
use crate::config::AnalysisConfig;
use crate::evaluators;
use crate::patterns;
use crate::types::{
    AnalysisError, Chapter, ChapterAnalysis, ConceptGraph, ConceptSummary, Pacing, PatternKind,
    PatternMatch, Principle, PrincipleEvaluation, Priority, Recommendation, ConceptFrequency,
    RadarPoint, SectionLoad, StructureSummary, VisualizationData,
};
use crate::{per_kword, snap_to_char_boundary, word_count};

static INTRO_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:intro|introduction|overview|getting started|preface|welcome)\b").unwrap());

static INTRO_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:in this chapter|in this section|we will|you will learn|by the end of)\b")
        .unwrap()
});

static SUMMARY_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:summary|conclusion|recap|review|key (?:points|takeaways)|wrap[- ]?up)\b")
        .unwrap()
});

static SUMMARY_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:in summary|to summarize|we (?:have )?learned|in conclusion|to recap)\b")
        .unwrap()
});

static SENTENCE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]["'\u{201D}\u{2019})\]]*(?:\s|$)"#).unwrap());

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(chapter: &Chapter, config: &AnalysisConfig) -> Result<(), AnalysisError> {
    let t = config.concept_extraction_threshold;
    if !(t > 0.0 && t <= 1.0) {
        return Err(AnalysisError::InvalidThreshold(t));
    }
    if chapter.sections.is_empty() && !chapter.content.trim().is_empty() {
        return Err(AnalysisError::MissingSections);
    }
    let len = chapter.content.len();
    let mut prev_end = 0usize;
    for section in &chapter.sections {
        if section.start > section.end || section.end > len {
            return Err(AnalysisError::SectionOutOfBounds {
                title: section.title.clone(),
                start: section.start,
                end: section.end,
                len,
            });
        }
        if section.start < prev_end {
            return Err(AnalysisError::SectionOutOfOrder {
                title: section.title.clone(),
            });
        }
        prev_end = section.end;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Structure metrics
// ---------------------------------------------------------------------------

fn structure_summary(chapter: &Chapter, config: &AnalysisConfig) -> StructureSummary {
    let tuning = &config.tuning;
    let section_count = chapter.sections.len();
    let avg_section_words = if section_count == 0 {
        0.0
    } else {
        chapter
            .sections
            .iter()
            .map(|s| word_count(&s.text) as f64)
            .sum::<f64>()
            / section_count as f64
    };
    let pacing = if avg_section_words <= tuning.pacing_rushed_max_words {
        Pacing::Rushed
    } else if avg_section_words <= tuning.pacing_balanced_max_words {
        Pacing::Balanced
    } else {
        Pacing::Stretched
    };

    let probe = tuning.scaffold_probe_chars;
    let head_end = snap_to_char_boundary(&chapter.content, probe.min(chapter.content.len()), false);
    let head = &chapter.content[..head_end];
    let tail_start = snap_to_char_boundary(
        &chapter.content,
        chapter.content.len().saturating_sub(probe),
        true,
    );
    let tail = &chapter.content[tail_start..];

    let has_introduction = chapter
        .sections
        .first()
        .map(|s| INTRO_TITLE_RE.is_match(&s.title))
        .unwrap_or(false)
        || INTRO_BODY_RE.is_match(head);
    let has_summary = chapter
        .sections
        .last()
        .map(|s| SUMMARY_TITLE_RE.is_match(&s.title))
        .unwrap_or(false)
        || SUMMARY_BODY_RE.is_match(tail);

    // Progression: enough sections to form an arc, with a sane heading
    // outline (no level jumps deeper than one step).
    let sane_outline = chapter.sections.windows(2).all(|w| {
        w[1].heading_level <= w[0].heading_level || w[1].heading_level - w[0].heading_level <= 1
    });
    let has_progression = section_count >= 3 && sane_outline;

    StructureSummary {
        section_count,
        avg_section_words,
        pacing,
        has_introduction,
        has_progression,
        has_summary,
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn overall_score(evaluations: &[PrincipleEvaluation]) -> u8 {
    let weight_sum: f64 = evaluations.iter().map(|e| e.weight).sum();
    if weight_sum <= 0.0 {
        return 0;
    }
    let weighted: f64 = evaluations
        .iter()
        .map(|e| e.score as f64 * e.weight)
        .sum();
    (weighted / weight_sum).round().clamp(0.0, 100.0) as u8
}

fn recommendations(
    evaluations: &[PrincipleEvaluation],
    config: &AnalysisConfig,
) -> Vec<Recommendation> {
    let mut ranked: Vec<&PrincipleEvaluation> = evaluations.iter().collect();
    ranked.sort_by(|a, b| a.score.cmp(&b.score));

    let mut out = Vec::new();
    for eval in ranked {
        if eval.score >= 90 {
            continue;
        }
        let priority = if eval.score < 50 {
            Priority::High
        } else if eval.score < 80 {
            Priority::Medium
        } else {
            Priority::Low
        };
        let mut actions: Vec<String> = eval.suggestions.iter().map(|s| s.text.clone()).collect();
        actions.dedup();
        if actions.is_empty() {
            actions.push(format!(
                "Review the chapter with {} in mind; its score is {}.",
                eval.principle.label(),
                eval.score
            ));
        }
        actions.truncate(3);
        out.push(Recommendation {
            principle: eval.principle,
            priority,
            title: format!("Strengthen {}", eval.principle.label()),
            actions,
        });
    }
    if !config.detailed_report {
        out.truncate(config.tuning.recommendation_cap);
    }
    out
}

// ---------------------------------------------------------------------------
// Visualization block
// ---------------------------------------------------------------------------

/// Purely a data transform over already-computed results; no new analysis.
fn visualization(
    chapter: &Chapter,
    graph: &ConceptGraph,
    patterns: &[PatternMatch],
    evaluations: &[PrincipleEvaluation],
    config: &AnalysisConfig,
) -> VisualizationData {
    let radar = evaluations
        .iter()
        .map(|e| RadarPoint {
            principle: e.principle,
            score: e.score,
        })
        .collect();

    let mut by_mentions: Vec<&crate::types::Concept> = graph.concepts.iter().collect();
    by_mentions.sort_by(|a, b| {
        b.mentions
            .len()
            .cmp(&a.mentions.len())
            .then(a.id.cmp(&b.id))
    });
    let concept_frequency = by_mentions
        .iter()
        .take(config.tuning.viz_top_concepts)
        .map(|c| ConceptFrequency {
            name: c.name.clone(),
            mentions: c.mentions.len(),
        })
        .collect();

    let load_curve = chapter
        .sections
        .iter()
        .map(|s| {
            let span_end = s.end.max(s.start);
            let words = word_count(&s.text).max(1) as f64;
            let new_concepts = graph
                .concepts
                .iter()
                .filter(|c| {
                    let first = c.first_mention_offset();
                    first >= s.start && first < span_end.max(s.start + 1)
                })
                .count() as f64;
            let formulas = patterns
                .iter()
                .filter(|p| p.kind == PatternKind::Formula && p.start >= s.start && p.start < span_end.max(s.start + 1))
                .count() as f64;
            let sentences = SENTENCE_SPLIT_RE
                .split(&s.text)
                .filter(|x| !x.trim().is_empty())
                .count()
                .max(1) as f64;
            let avg_sentence_len = words / sentences;

            let load = 0.3 * (new_concepts / 5.0).min(1.0)
                + 0.3 * (formulas / (words / 100.0).max(1.0) / 2.0).min(1.0)
                + 0.4 * (avg_sentence_len / 30.0).min(1.0);
            SectionLoad {
                section: s.title.clone(),
                load: (load * 1000.0).round() / 1000.0,
            }
        })
        .collect();

    VisualizationData {
        radar,
        concept_frequency,
        load_curve,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the full pipeline. Deterministic modulo the timestamp; degenerate
/// content yields a valid low-signal result rather than an error.
pub fn analyze(chapter: &Chapter, config: &AnalysisConfig) -> Result<ChapterAnalysis, AnalysisError> {
    validate(chapter, config)?;
    tracing::debug!(chapter = %chapter.id, words = chapter.word_count, "starting analysis");

    let domain = config
        .domain
        .as_deref()
        .or(chapter.domain.as_deref());

    // Extraction and detection are independent of each other.
    let (graph, detected) = rayon::join(
        || {
            concepts::extract(
                chapter,
                config.concept_extraction_threshold,
                &config.tuning,
            )
        },
        || patterns::detect_all(&chapter.content, domain, &config.tuning),
    );
    tracing::debug!(
        concepts = graph.concepts.len(),
        patterns = detected.len(),
        "extraction and detection complete"
    );

    // All ten evaluators are pure given their inputs; a panicking unit
    // degrades to a neutral score instead of suppressing the other nine.
    let evaluations: Vec<PrincipleEvaluation> = Principle::ALL
        .par_iter()
        .map(|&principle| {
            catch_unwind(AssertUnwindSafe(|| {
                evaluators::evaluate(principle, chapter, &graph, &detected, &config.weights)
            }))
            .unwrap_or_else(|_| {
                tracing::warn!(principle = principle.label(), "evaluator panicked, degrading");
                evaluators::degraded(principle, &config.weights)
            })
        })
        .collect();

    let structure = structure_summary(chapter, config);
    let overall = overall_score(&evaluations);
    let recs = recommendations(&evaluations, config);
    let viz = config
        .enable_visualization
        .then(|| visualization(chapter, &graph, &detected, &evaluations, config));

    let concepts_summary = ConceptSummary {
        total_concepts: graph.concepts.len(),
        core_concepts: graph.core_concepts().count(),
        density_per_kword: per_kword(graph.concepts.len() as f64, chapter.word_count),
        hierarchy_balance: graph.stats.hierarchy_balance,
        orphans: graph.stats.orphans.clone(),
    };

    Ok(ChapterAnalysis {
        chapter_id: chapter.id.clone(),
        generated_at: Utc::now(),
        overall_score: overall,
        evaluations,
        concepts: concepts_summary,
        structure,
        recommendations: recs,
        visualization: viz,
    })
}
