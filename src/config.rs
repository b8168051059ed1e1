use serde::{Deserialize, Serialize};

use crate::types::Principle;

// ---------------------------------------------------------------------------
// Principle weights
// ---------------------------------------------------------------------------

/// Static per-principle weights for the overall weighted average.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrincipleWeights {
    pub deep_processing: f64,
    pub retrieval_practice: f64,
    pub schema_building: f64,
    pub dual_coding: f64,
    pub generative_learning: f64,
    pub spaced_repetition: f64,
    pub interleaving: f64,
    pub worked_examples: f64,
    pub self_explanation: f64,
    pub elaboration: f64,
}

impl Default for PrincipleWeights {
    fn default() -> Self {
        Self {
            deep_processing: 0.95,
            retrieval_practice: 0.90,
            schema_building: 0.90,
            dual_coding: 0.85,
            generative_learning: 0.85,
            spaced_repetition: 0.80,
            interleaving: 0.75,
            worked_examples: 0.70,
            self_explanation: 0.65,
            elaboration: 0.60,
        }
    }
}

impl PrincipleWeights {
    pub fn get(&self, principle: Principle) -> f64 {
        match principle {
            Principle::DeepProcessing => self.deep_processing,
            Principle::RetrievalPractice => self.retrieval_practice,
            Principle::SchemaBuilding => self.schema_building,
            Principle::DualCoding => self.dual_coding,
            Principle::GenerativeLearning => self.generative_learning,
            Principle::SpacedRepetition => self.spaced_repetition,
            Principle::Interleaving => self.interleaving,
            Principle::WorkedExamples => self.worked_examples,
            Principle::SelfExplanation => self.self_explanation,
            Principle::Elaboration => self.elaboration,
        }
    }
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// Fixed thresholds and breakpoints for detectors, extraction, and scoring.
/// An explicit immutable value carried in the config rather than hidden
/// module-level state. None of these are learned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tuning {
    /// Width of context snippets recorded with matches and mentions.
    pub context_window_chars: usize,
    /// Maximum look-ahead when classifying the span after a trigger hit.
    pub pattern_lookahead_chars: usize,
    /// Same-kind matches whose starts differ by at most this are duplicates.
    pub dedup_offset_slack: usize,
    /// Minimum consecutive numbered-step lines that form a procedure.
    pub procedure_min_steps: usize,

    // Per-trigger confidences.
    pub worked_example_confidence: f64,
    pub practice_problem_confidence: f64,
    pub definition_example_confidence: f64,
    pub formula_arrow_confidence: f64,
    pub formula_equals_confidence: f64,
    pub procedure_confidence: f64,
    pub comparison_confidence: f64,
    pub chem_equation_confidence: f64,
    pub chem_procedure_confidence: f64,
    pub chem_drill_confidence: f64,

    // Concept extraction.
    pub candidate_min_term_len: usize,
    pub candidate_min_frequency: usize,
    pub candidate_score_scale: f64,
    pub heading_bonus: f64,
    pub definition_bonus: f64,
    pub core_mentions_per_kword: f64,
    pub supporting_mentions_per_kword: f64,
    pub cooccurrence_window_chars: usize,
    pub example_cue_window_chars: usize,

    // Structure metrics.
    pub pacing_rushed_max_words: f64,
    pub pacing_balanced_max_words: f64,
    pub scaffold_probe_chars: usize,

    // Reporting.
    pub recommendation_cap: usize,
    pub viz_top_concepts: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            context_window_chars: 80,
            pattern_lookahead_chars: 1200,
            dedup_offset_slack: 24,
            procedure_min_steps: 3,

            worked_example_confidence: 0.85,
            practice_problem_confidence: 0.70,
            definition_example_confidence: 0.70,
            formula_arrow_confidence: 0.80,
            formula_equals_confidence: 0.60,
            procedure_confidence: 0.75,
            comparison_confidence: 0.65,
            chem_equation_confidence: 0.90,
            chem_procedure_confidence: 0.75,
            chem_drill_confidence: 0.80,

            candidate_min_term_len: 4,
            candidate_min_frequency: 3,
            candidate_score_scale: 8.0,
            heading_bonus: 0.30,
            definition_bonus: 0.25,
            core_mentions_per_kword: 2.0,
            supporting_mentions_per_kword: 0.8,
            cooccurrence_window_chars: 300,
            example_cue_window_chars: 200,

            pacing_rushed_max_words: 120.0,
            pacing_balanced_max_words: 600.0,
            scaffold_probe_chars: 400,

            recommendation_cap: 5,
            viz_top_concepts: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Domain key for pattern-detector registration. Unknown keys resolve
    /// to universal patterns only, never an error.
    pub domain: Option<String>,
    pub reading_level: Option<String>,
    pub enable_visualization: bool,
    /// Candidate-score cutoff in (0, 1]. Lowering it never yields fewer
    /// concepts.
    pub concept_extraction_threshold: f64,
    pub detailed_report: bool,
    pub weights: PrincipleWeights,
    #[serde(skip)]
    pub tuning: Tuning,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            domain: None,
            reading_level: None,
            enable_visualization: true,
            concept_extraction_threshold: 0.3,
            detailed_report: false,
            weights: PrincipleWeights::default(),
            tuning: Tuning::default(),
        }
    }
}
