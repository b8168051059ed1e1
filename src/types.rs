use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One section of a chapter. `start`/`end` are byte offsets into the
/// chapter's `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub heading_level: u8,
    pub title: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ChapterWire")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    pub sections: Vec<Section>,
    pub domain: Option<String>,
    pub reading_level: Option<String>,
}

/// Wire shape for deserialization: `wordCount` is derived from the content
/// rather than trusted from the input.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterWire {
    id: String,
    title: String,
    content: String,
    sections: Vec<Section>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    reading_level: Option<String>,
}

impl From<ChapterWire> for Chapter {
    fn from(wire: ChapterWire) -> Self {
        let mut chapter = Chapter::new(wire.id, wire.title, wire.content, wire.sections);
        chapter.domain = wire.domain;
        chapter.reading_level = wire.reading_level;
        chapter
    }
}

impl Chapter {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        sections: Vec<Section>,
    ) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count();
        Self {
            id: id.into(),
            title: title.into(),
            content,
            word_count,
            sections,
            domain: None,
            reading_level: None,
        }
    }

    /// Convenience constructor for callers holding plain text: the whole
    /// content becomes a single section. The engine never splits sections
    /// itself; markdown-aware splitting lives in the CLI.
    pub fn from_text(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let title = title.into();
        let content = content.into();
        let section = Section {
            heading_level: 1,
            title: title.clone(),
            start: 0,
            end: content.len(),
            text: content.clone(),
        };
        Chapter::new(id, title, content, vec![section])
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Concepts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Core,
    Supporting,
    Detail,
}

/// One occurrence of a concept in the chapter text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub offset: usize,
    pub context: String,
    /// Estimated depth of treatment around this mention, 0..1.
    pub depth: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    /// Stable id derived from the normalized name.
    pub id: String,
    pub name: String,
    pub definition: Option<String>,
    pub importance: Importance,
    pub mentions: Vec<Mention>,
    pub prerequisites: Vec<String>,
    pub related: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

impl Concept {
    pub fn first_mention_offset(&self) -> usize {
        self.mentions.first().map(|m| m.offset).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Prerequisite,
    Related,
    Example,
    Contrasts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRelationship {
    pub source: String,
    pub target: String,
    pub kind: RelationshipKind,
    pub strength: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub density_per_kword: f64,
    /// 0..1, how evenly core/supporting/detail concepts are distributed.
    pub hierarchy_balance: f64,
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptGraph {
    pub concepts: Vec<Concept>,
    pub relationships: Vec<ConceptRelationship>,
    pub stats: GraphStats,
}

impl ConceptGraph {
    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }

    pub fn core_concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts
            .iter()
            .filter(|c| c.importance == Importance::Core)
    }

    pub fn relationships_of_kind(
        &self,
        kind: RelationshipKind,
    ) -> impl Iterator<Item = &ConceptRelationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Pedagogical pattern kinds. The closed universal set plus free-form
/// domain-registered kinds (serialized as their bare string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternKind {
    WorkedExample,
    PracticeProblem,
    DefinitionExample,
    Formula,
    Procedure,
    Comparison,
    #[serde(untagged)]
    Domain(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub confidence: f64,
    pub start: usize,
    pub end: usize,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Principles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Principle {
    DeepProcessing,
    RetrievalPractice,
    SchemaBuilding,
    DualCoding,
    GenerativeLearning,
    SpacedRepetition,
    Interleaving,
    WorkedExamples,
    SelfExplanation,
    Elaboration,
}

impl Principle {
    pub const ALL: [Principle; 10] = [
        Principle::DeepProcessing,
        Principle::RetrievalPractice,
        Principle::SchemaBuilding,
        Principle::DualCoding,
        Principle::GenerativeLearning,
        Principle::SpacedRepetition,
        Principle::Interleaving,
        Principle::WorkedExamples,
        Principle::SelfExplanation,
        Principle::Elaboration,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Principle::DeepProcessing => "deep processing",
            Principle::RetrievalPractice => "retrieval practice",
            Principle::SchemaBuilding => "schema building",
            Principle::DualCoding => "dual coding",
            Principle::GenerativeLearning => "generative learning",
            Principle::SpacedRepetition => "spaced repetition",
            Principle::Interleaving => "interleaving",
            Principle::WorkedExamples => "worked examples",
            Principle::SelfExplanation => "self-explanation",
            Principle::Elaboration => "elaboration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Finding {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: None,
        }
    }

    pub fn with_severity(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity: Some(severity),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub text: String,
    /// Byte offset into the chapter content, when the advice has a target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<usize>,
}

impl Suggestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }

    pub fn at(text: impl Into<String>, location: usize) -> Self {
        Self {
            text: text.into(),
            location: Some(location),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub metric: String,
    pub value: f64,
}

impl Evidence {
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value: (value * 1000.0).round() / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipleEvaluation {
    pub principle: Principle,
    pub score: u8,
    pub weight: f64,
    pub findings: Vec<Finding>,
    pub suggestions: Vec<Suggestion>,
    pub evidence: Vec<Evidence>,
}

// ---------------------------------------------------------------------------
// Analysis result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub principle: Principle,
    pub priority: Priority,
    pub title: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    Rushed,
    Balanced,
    Stretched,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureSummary {
    pub section_count: usize,
    pub avg_section_words: f64,
    pub pacing: Pacing,
    pub has_introduction: bool,
    pub has_progression: bool,
    pub has_summary: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSummary {
    pub total_concepts: usize,
    pub core_concepts: usize,
    pub density_per_kword: f64,
    pub hierarchy_balance: f64,
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarPoint {
    pub principle: Principle,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptFrequency {
    pub name: String,
    pub mentions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionLoad {
    pub section: String,
    /// Estimated cognitive load for this section, 0..1.
    pub load: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationData {
    pub radar: Vec<RadarPoint>,
    pub concept_frequency: Vec<ConceptFrequency>,
    pub load_curve: Vec<SectionLoad>,
}

/// The engine's sole output. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterAnalysis {
    pub chapter_id: String,
    pub generated_at: DateTime<Utc>,
    pub overall_score: u8,
    pub evaluations: Vec<PrincipleEvaluation>,
    pub concepts: ConceptSummary,
    pub structure: StructureSummary,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationData>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Input errors: analysis is not attempted. Degenerate content (too short,
/// no patterns) is not an error and flows through as a low-signal result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("conceptExtractionThreshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("section `{title}` spans {start}..{end}, outside content of {len} bytes")]
    SectionOutOfBounds {
        title: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("section `{title}` starts before the preceding section ends")]
    SectionOutOfOrder { title: String },
    #[error("chapter has content but no sections; supply at least one section spanning the text")]
    MissingSections,
}
