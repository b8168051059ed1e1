//! The ten principle evaluators. Each is a pure function from the chapter,
//! the concept graph, and the detected patterns to a scored evaluation, with
//! fixed breakpoints rather than learned mappings. All of them tolerate
//! empty inputs and return a low-but-defined score.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::PrincipleWeights;
use crate::types::{
    Chapter, ConceptGraph, Evidence, Finding, PatternKind, PatternMatch, Principle,
    PrincipleEvaluation, RelationshipKind, Severity, Suggestion,
};
use crate::{band_label, per_kword};

// ---------------------------------------------------------------------------
// Cue lexicons
// ---------------------------------------------------------------------------

static REASONING_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:because|since|therefore|thus|as a result|this means|which explains",
        r"|the reason|leads to|causes|due to|consequently|in order to|results in)\b",
    ))
    .unwrap()
});

static VISUAL_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:figure|diagram|graph|chart|table|image|illustration|picture|map",
        r"|visualize|drawing|photo|plot|timeline)\b",
    ))
    .unwrap()
});

static GENERATIVE_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:predict|imagine|what would happen|create|design|come up with",
        r"|your own|try to explain|sketch|brainstorm|invent|make up)\b",
    ))
    .unwrap()
});

static MIXED_REVIEW_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:mixed (?:practice|review)|cumulative review|from earlier chapters?",
        r"|previous sections?|combine(?:s|d)? (?:these|both)|revisit)\b",
    ))
    .unwrap()
});

static METACOGNITIVE_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:in your own words|ask yourself|reflect on|why do you think",
        r"|explain why|check your understanding|self[- ]test|pause and",
        r"|consider whether|think about|how confident|what do you already know)\b",
    ))
    .unwrap()
});

static ELABORATION_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:in other words|this is like|analog(?:y|ous)|similar to|just as",
        r"|relates to|as we saw|recall that|everyday|real[- ]world|familiar|think of it as)\b",
    ))
    .unwrap()
});

// ---------------------------------------------------------------------------
// Score helpers
// ---------------------------------------------------------------------------

/// Linear ramp from `floor` at zero signal to 100 at `full_at`, clamped.
fn ramp(value: f64, full_at: f64, floor: f64) -> f64 {
    if full_at <= 0.0 {
        return floor;
    }
    floor + (100.0 - floor) * (value / full_at).clamp(0.0, 1.0)
}

fn to_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn count_kind(patterns: &[PatternMatch], kind: &PatternKind) -> usize {
    patterns.iter().filter(|p| p.kind == *kind).count()
}

struct Parts {
    findings: Vec<Finding>,
    suggestions: Vec<Suggestion>,
    evidence: Vec<Evidence>,
}

impl Parts {
    fn new() -> Self {
        Self {
            findings: Vec::new(),
            suggestions: Vec::new(),
            evidence: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn evaluate(
    principle: Principle,
    chapter: &Chapter,
    graph: &ConceptGraph,
    patterns: &[PatternMatch],
    weights: &PrincipleWeights,
) -> PrincipleEvaluation {
    let (score, parts) = match principle {
        Principle::DeepProcessing => deep_processing(chapter, graph),
        Principle::RetrievalPractice => retrieval_practice(chapter, patterns),
        Principle::SchemaBuilding => schema_building(graph),
        Principle::DualCoding => dual_coding(chapter, patterns),
        Principle::GenerativeLearning => generative_learning(chapter, patterns),
        Principle::SpacedRepetition => spaced_repetition(chapter, graph),
        Principle::Interleaving => interleaving(chapter, graph),
        Principle::WorkedExamples => worked_examples(chapter, patterns),
        Principle::SelfExplanation => self_explanation(chapter),
        Principle::Elaboration => elaboration(chapter, graph),
    };
    PrincipleEvaluation {
        principle,
        score,
        weight: weights.get(principle),
        findings: parts.findings,
        suggestions: parts.suggestions,
        evidence: parts.evidence,
    }
}

/// Neutral fallback used when an evaluator panics: the other nine must not
/// be suppressed by one unit's fault.
pub fn degraded(principle: Principle, weights: &PrincipleWeights) -> PrincipleEvaluation {
    PrincipleEvaluation {
        principle,
        score: 50,
        weight: weights.get(principle),
        findings: vec![Finding::with_severity(
            format!(
                "The {} evaluator failed on this chapter; a neutral score was substituted.",
                principle.label()
            ),
            Severity::Warning,
        )],
        suggestions: Vec::new(),
        evidence: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Evaluators
// ---------------------------------------------------------------------------

fn deep_processing(chapter: &Chapter, graph: &ConceptGraph) -> (u8, Parts) {
    let mut parts = Parts::new();
    let cues = REASONING_CUES.find_iter(&chapter.content).count();
    let cues_per_kword = per_kword(cues as f64, chapter.word_count);
    let defined_ratio = if graph.concepts.is_empty() {
        0.0
    } else {
        graph.concepts.iter().filter(|c| c.definition.is_some()).count() as f64
            / graph.concepts.len() as f64
    };

    let score = to_score(0.6 * ramp(cues_per_kword, 8.0, 5.0) + 0.4 * ramp(defined_ratio, 0.6, 5.0));
    parts.findings.push(Finding::new(format!(
        "Deep processing is {}: {cues_per_kword:.1} reasoning connectives per 1,000 words.",
        band_label(score)
    )));
    if defined_ratio < 0.3 && !graph.concepts.is_empty() {
        parts.suggestions.push(Suggestion::new(
            "Define more concepts explicitly where they first appear, and explain why each one matters.",
        ));
    }
    if cues == 0 {
        parts.suggestions.push(Suggestion::new(
            "Add causal language (because, therefore, this means) so readers process relationships, not just facts.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("reasoningCuesPerKword", cues_per_kword));
    parts
        .evidence
        .push(Evidence::new("definedConceptRatio", defined_ratio));
    (score, parts)
}

fn retrieval_practice(chapter: &Chapter, patterns: &[PatternMatch]) -> (u8, Parts) {
    let mut parts = Parts::new();
    let practice = count_kind(patterns, &PatternKind::PracticeProblem)
        + count_kind(patterns, &PatternKind::WorkedExample);
    let questions = chapter.content.matches('?').count();
    let rate = per_kword(practice as f64 + 0.5 * questions as f64, chapter.word_count);

    let score = to_score(ramp(rate, 2.5, 8.0));
    parts.findings.push(Finding::new(format!(
        "Retrieval practice is {}: {rate:.1} practice opportunities per 1,000 words.",
        band_label(score)
    )));
    if practice == 0 && questions == 0 {
        parts.findings.push(Finding::with_severity(
            "No questions or practice prompts were found anywhere in the chapter.",
            Severity::Warning,
        ));
        parts.suggestions.push(Suggestion::new(
            "Insert short recall questions at the end of each section so readers retrieve, not reread.",
        ));
    } else if score < 60 {
        parts.suggestions.push(Suggestion::new(
            "Increase the frequency of practice prompts; aim for one every few hundred words.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("practicePatterns", practice as f64));
    parts
        .evidence
        .push(Evidence::new("questionMarks", questions as f64));
    parts
        .evidence
        .push(Evidence::new("practicePerKword", rate));
    (score, parts)
}

fn schema_building(graph: &ConceptGraph) -> (u8, Parts) {
    let mut parts = Parts::new();
    let concepts = graph.concepts.len();
    let rel_per_concept = if concepts == 0 {
        0.0
    } else {
        graph.relationships.len() as f64 / concepts as f64
    };
    let orphan_ratio = if concepts == 0 {
        1.0
    } else {
        graph.stats.orphans.len() as f64 / concepts as f64
    };
    let prereq_edges = graph
        .relationships_of_kind(RelationshipKind::Prerequisite)
        .count();

    let score = to_score(
        0.4 * ramp(rel_per_concept, 1.5, 5.0)
            + 0.3 * ramp(1.0 - orphan_ratio, 1.0, 5.0)
            + 0.3 * ramp(graph.stats.hierarchy_balance, 1.0, 5.0),
    );
    parts.findings.push(Finding::new(format!(
        "Schema building is {}: {rel_per_concept:.1} relationships per concept, {} orphan concepts.",
        band_label(score),
        graph.stats.orphans.len()
    )));
    if prereq_edges == 0 && concepts > 1 {
        parts.suggestions.push(Suggestion::new(
            "Sequence concepts explicitly: introduce building blocks first and refer back to them when composing new ideas.",
        ));
    }
    if orphan_ratio > 0.4 && concepts > 2 {
        parts.suggestions.push(Suggestion::new(
            "Connect isolated concepts to the chapter's main structure with comparisons or examples.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("relationshipsPerConcept", rel_per_concept));
    parts.evidence.push(Evidence::new("orphanRatio", orphan_ratio));
    parts
        .evidence
        .push(Evidence::new("hierarchyBalance", graph.stats.hierarchy_balance));
    (score, parts)
}

fn dual_coding(chapter: &Chapter, patterns: &[PatternMatch]) -> (u8, Parts) {
    let mut parts = Parts::new();
    let visual_cues = VISUAL_CUES.find_iter(&chapter.content).count();
    let formulas = count_kind(patterns, &PatternKind::Formula);
    let rate = per_kword((visual_cues + formulas) as f64, chapter.word_count);

    let score = to_score(ramp(rate, 3.0, 10.0));
    parts.findings.push(Finding::new(format!(
        "Dual coding is {}: {visual_cues} visual references and {formulas} formulas give readers a second encoding channel.",
        band_label(score)
    )));
    if formulas > 0 {
        parts.findings.push(Finding::new(format!(
            "{formulas} formula span(s) present concrete symbolic form alongside the prose.",
        )));
    }
    if score < 60 {
        parts.suggestions.push(Suggestion::new(
            "Pair key explanations with a figure, diagram, or table so the idea is encoded verbally and visually.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("visualCues", visual_cues as f64));
    parts.evidence.push(Evidence::new("formulaPatterns", formulas as f64));
    parts.evidence.push(Evidence::new("visualPerKword", rate));
    (score, parts)
}

fn generative_learning(chapter: &Chapter, patterns: &[PatternMatch]) -> (u8, Parts) {
    let mut parts = Parts::new();
    let cues = GENERATIVE_CUES.find_iter(&chapter.content).count();
    let examples = count_kind(patterns, &PatternKind::DefinitionExample)
        + count_kind(patterns, &PatternKind::WorkedExample);
    let cues_rate = per_kword(cues as f64, chapter.word_count);
    let example_rate = per_kword(examples as f64, chapter.word_count);

    let score = to_score(0.5 * ramp(cues_rate, 2.0, 8.0) + 0.5 * ramp(example_rate, 2.0, 8.0));
    parts.findings.push(Finding::new(format!(
        "Generative learning is {}: {cues} generation prompts and {examples} example passages.",
        band_label(score)
    )));
    if examples > 0 {
        parts.findings.push(Finding::new(format!(
            "Concrete examples anchor the abstractions: {examples} example passage(s) detected.",
        )));
    } else {
        parts.suggestions.push(Suggestion::new(
            "Add at least one concrete example per core concept, then ask readers to produce their own.",
        ));
    }
    if cues == 0 {
        parts.suggestions.push(Suggestion::new(
            "Prompt readers to predict, sketch, or invent before revealing the answer.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("generativeCues", cues as f64));
    parts
        .evidence
        .push(Evidence::new("examplePatterns", examples as f64));
    (score, parts)
}

fn spaced_repetition(chapter: &Chapter, graph: &ConceptGraph) -> (u8, Parts) {
    let mut parts = Parts::new();
    let total_sections = chapter.sections.len();

    // For each concept revisited at least twice, how widely its mentions
    // spread across section boundaries rather than clustering in one.
    let mut spreads: Vec<f64> = Vec::new();
    for concept in &graph.concepts {
        if concept.mentions.len() < 2 {
            continue;
        }
        let distinct = chapter
            .sections
            .iter()
            .filter(|s| {
                concept
                    .mentions
                    .iter()
                    .any(|m| m.offset >= s.start && m.offset < s.end.max(s.start + 1))
            })
            .count();
        let spread = if total_sections <= 1 {
            0.0
        } else {
            (distinct.saturating_sub(1)) as f64 / (total_sections - 1) as f64
        };
        spreads.push(spread);
    }
    let avg_spread = if spreads.is_empty() {
        0.0
    } else {
        spreads.iter().sum::<f64>() / spreads.len() as f64
    };

    let score = to_score(ramp(avg_spread, 0.8, 10.0));
    if spreads.is_empty() {
        parts.findings.push(Finding::new(
            "No concept is revisited, so there is nothing to space across the chapter.",
        ));
        parts.suggestions.push(Suggestion::new(
            "Reintroduce each core concept in at least one later section instead of treating it once.",
        ));
    } else {
        parts.findings.push(Finding::new(format!(
            "Spaced repetition is {}: revisited concepts reach {:.0}% of the possible section spread.",
            band_label(score),
            avg_spread * 100.0
        )));
        if score < 60 {
            parts.suggestions.push(Suggestion::new(
                "Spread re-mentions of core concepts across later sections rather than clustering them in one.",
            ));
        }
    }
    parts.evidence.push(Evidence::new("avgSectionSpread", avg_spread));
    parts
        .evidence
        .push(Evidence::new("revisitedConcepts", spreads.len() as f64));
    (score, parts)
}

fn interleaving(chapter: &Chapter, graph: &ConceptGraph) -> (u8, Parts) {
    let mut parts = Parts::new();

    // Dominant concept per section; a switch between adjacent sections is an
    // interleaving signal.
    let dominant: Vec<Option<&str>> = chapter
        .sections
        .iter()
        .map(|s| {
            graph
                .concepts
                .iter()
                .map(|c| {
                    let hits = c
                        .mentions
                        .iter()
                        .filter(|m| m.offset >= s.start && m.offset < s.end.max(s.start + 1))
                        .count();
                    (c.id.as_str(), hits)
                })
                .filter(|(_, hits)| *hits > 0)
                .max_by_key(|(_, hits)| *hits)
                .map(|(id, _)| id)
        })
        .collect();
    let switches = dominant
        .windows(2)
        .filter(|w| w[0].is_some() && w[1].is_some() && w[0] != w[1])
        .count();
    let switch_ratio = if chapter.sections.len() <= 1 {
        0.0
    } else {
        switches as f64 / (chapter.sections.len() - 1) as f64
    };
    let review_cues = MIXED_REVIEW_CUES.find_iter(&chapter.content).count();
    let cue_rate = per_kword(review_cues as f64, chapter.word_count);

    let score = to_score(0.7 * ramp(switch_ratio, 0.6, 10.0) + 0.3 * ramp(cue_rate, 1.0, 10.0));
    parts.findings.push(Finding::new(format!(
        "Interleaving is {}: {switches} topic switches across {} sections and {review_cues} mixed-review cues.",
        band_label(score),
        chapter.sections.len()
    )));
    if score < 60 {
        parts.suggestions.push(Suggestion::new(
            "Alternate between related topics and add cumulative review items that mix earlier material with new.",
        ));
    }
    parts.evidence.push(Evidence::new("topicSwitchRatio", switch_ratio));
    parts
        .evidence
        .push(Evidence::new("mixedReviewCues", review_cues as f64));
    (score, parts)
}

fn worked_examples(chapter: &Chapter, patterns: &[PatternMatch]) -> (u8, Parts) {
    let mut parts = Parts::new();
    let worked = count_kind(patterns, &PatternKind::WorkedExample);
    let practice = count_kind(patterns, &PatternKind::PracticeProblem);
    let worked_rate = per_kword(worked as f64, chapter.word_count);

    // Fading: a healthy chapter balances demonstrated solutions with
    // independent practice.
    let balance = if worked + practice == 0 {
        0.0
    } else {
        let ratio = worked as f64 / (worked + practice) as f64;
        (1.0 - (ratio - 0.5).abs() * 2.0).max(0.0)
    };

    let score = to_score(0.7 * ramp(worked_rate, 1.5, 8.0) + 0.3 * ramp(balance, 1.0, 8.0));
    parts.findings.push(Finding::new(format!(
        "Worked examples are {}: {worked} fully worked, {practice} left as practice.",
        band_label(score)
    )));
    if worked == 0 {
        let location = patterns
            .iter()
            .find(|p| p.kind == PatternKind::PracticeProblem)
            .map(|p| p.start);
        let suggestion =
            "Walk through at least one complete solution step by step before asking readers to solve on their own.";
        parts.suggestions.push(match location {
            Some(offset) => Suggestion::at(suggestion, offset),
            None => Suggestion::new(suggestion),
        });
    }
    parts
        .evidence
        .push(Evidence::new("workedExamples", worked as f64));
    parts
        .evidence
        .push(Evidence::new("practiceProblems", practice as f64));
    parts
        .evidence
        .push(Evidence::new("workedPracticeBalance", balance));
    (score, parts)
}

fn self_explanation(chapter: &Chapter) -> (u8, Parts) {
    let mut parts = Parts::new();
    let cues = METACOGNITIVE_CUES.find_iter(&chapter.content).count();
    let rate = per_kword(cues as f64, chapter.word_count);

    let score = to_score(ramp(rate, 1.5, 8.0));
    parts.findings.push(Finding::new(format!(
        "Self-explanation support is {}: {cues} metacognitive prompts.",
        band_label(score)
    )));
    if cues == 0 {
        parts.suggestions.push(Suggestion::new(
            "Ask readers to explain ideas in their own words or to check their understanding before moving on.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("metacognitiveCues", cues as f64));
    parts
        .evidence
        .push(Evidence::new("metacognitivePerKword", rate));
    (score, parts)
}

fn elaboration(chapter: &Chapter, graph: &ConceptGraph) -> (u8, Parts) {
    let mut parts = Parts::new();
    let cues = ELABORATION_CUES.find_iter(&chapter.content).count();
    let cue_rate = per_kword(cues as f64, chapter.word_count);
    let related = graph
        .relationships_of_kind(RelationshipKind::Related)
        .count();
    let related_per_concept = if graph.concepts.is_empty() {
        0.0
    } else {
        related as f64 / graph.concepts.len() as f64
    };

    let score = to_score(0.6 * ramp(cue_rate, 3.0, 8.0) + 0.4 * ramp(related_per_concept, 1.0, 8.0));
    parts.findings.push(Finding::new(format!(
        "Elaboration is {}: {cues} analogy/connection cues and {related} related-concept links.",
        band_label(score)
    )));
    if score < 60 {
        parts.suggestions.push(Suggestion::new(
            "Connect new material to familiar, real-world knowledge with analogies and \"this is like\" bridges.",
        ));
    }
    parts
        .evidence
        .push(Evidence::new("elaborationCues", cues as f64));
    parts
        .evidence
        .push(Evidence::new("relatedPerConcept", related_per_concept));
    (score, parts)
}
