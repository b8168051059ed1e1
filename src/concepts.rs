//! Concept extraction: candidate identification, TF-IDF-style scoring,
//! mention tracking, importance classification, relationship establishment,
//! and graph statistics.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Tuning;
use crate::types::{
    Chapter, Concept, ConceptGraph, ConceptRelationship, GraphStats, Importance, Mention,
    RelationshipKind,
};
use crate::{context_around, per_kword};

static SENTENCE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]["'\u{201D}\u{2019})\]]*(?:\s|$)"#).unwrap());

static DEFINITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:the |a |an )?([a-z][a-z\u{2080}-\u{2089}-]*(?:\s+[a-z][a-z-]*){0,3})\s+",
        r"(?:is|are)\s+(?:a|an|the)\s+(.{3,80})$",
    ))
    .unwrap()
});

static DEFINITION_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:the |a |an )?([a-z][a-z\u{2080}-\u{2089}-]*(?:\s+[a-z][a-z-]*){0,3})\s+",
        r"(?:refers to|is defined as|is called|means)\s+(.{3,80})$",
    ))
    .unwrap()
});

static CAPITALIZED_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap());

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z\u{2080}-\u{2089}-]*").unwrap());

static EXAMPLE_CUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:for example|for instance|such as|e\.g\.|example\s*:)").unwrap());

static CONTRAST_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:unlike|whereas|in contrast to|compared (?:to|with)|differs? from|versus)\b")
        .unwrap()
});

static EXPLANATORY_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:because|means|defined|therefore|consists of|is made of|in other words|that is)\b")
        .unwrap()
});

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "is", "it",
        "that", "this", "with", "as", "by", "from", "was", "were", "are", "be", "been", "has",
        "have", "had", "not", "no", "do", "does", "did", "will", "would", "could", "should",
        "can", "may", "might", "if", "then", "than", "so", "up", "out", "about", "into", "over",
        "after", "before", "between", "through", "just", "also", "very", "more", "most", "some",
        "any", "each", "every", "all", "both", "few", "other", "such", "only", "own", "same",
        "too", "how", "what", "which", "who", "when", "where", "why", "there", "these", "those",
        "they", "them", "their", "its", "his", "her", "you", "your", "we", "our",
    ]
    .into_iter()
    .collect()
});

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Candidate {
    display: String,
    definition: Option<String>,
    in_heading: bool,
}

/// Case- and pluralization-insensitive normal form. Naive singularization:
/// strip a trailing `s` unless the word ends in `ss` or is very short.
fn normalize(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let words: Vec<String> = lowered
        .split_whitespace()
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w.to_string()
            }
        })
        .collect();
    words.join(" ")
}

fn slug(normalized: &str) -> String {
    normalized
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

fn is_viable_term(normalized: &str, tuning: &Tuning) -> bool {
    if normalized.len() < tuning.candidate_min_term_len {
        return false;
    }
    !normalized
        .split_whitespace()
        .all(|w| STOPWORDS.contains(w))
}

fn add_candidate(
    candidates: &mut BTreeMap<String, Candidate>,
    name: &str,
    definition: Option<String>,
    in_heading: bool,
    tuning: &Tuning,
) {
    let normalized = normalize(name);
    if !is_viable_term(&normalized, tuning) {
        return;
    }
    // First-seen surface casing wins for the display name.
    let entry = candidates.entry(normalized).or_insert_with(|| Candidate {
        display: name.trim().to_string(),
        ..Candidate::default()
    });
    if entry.definition.is_none() {
        entry.definition = definition;
    }
    entry.in_heading |= in_heading;
}

fn collect_candidates(chapter: &Chapter, tuning: &Tuning) -> BTreeMap<String, Candidate> {
    let mut candidates = BTreeMap::new();
    let text = &chapter.content;

    // Headings are strong concept signals.
    for section in &chapter.sections {
        add_candidate(&mut candidates, &section.title, None, true, tuning);
    }

    // Definitional sentence patterns: "X is a Y", "X refers to Y", ...
    for sentence in SENTENCE_SPLIT_RE.split(text) {
        let sentence = sentence.trim();
        for re in [&*DEFINITION_RE, &*DEFINITION_VERB_RE] {
            if let Some(caps) = re.captures(sentence) {
                let subject = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let object = caps.get(2).map(|m| m.as_str().trim().to_string());
                add_candidate(&mut candidates, subject, object, false, tuning);
            }
        }
    }

    // Capitalized multi-word spans.
    for m in CAPITALIZED_SPAN_RE.find_iter(text) {
        add_candidate(&mut candidates, m.as_str(), None, false, tuning);
    }

    // Frequent content terms.
    let mut term_freq: BTreeMap<String, usize> = BTreeMap::new();
    for m in TOKEN_RE.find_iter(text) {
        let token = normalize(m.as_str());
        if token.len() >= tuning.candidate_min_term_len && !STOPWORDS.contains(token.as_str()) {
            *term_freq.entry(token).or_insert(0) += 1;
        }
    }
    for (token, freq) in term_freq {
        if freq >= tuning.candidate_min_frequency {
            add_candidate(&mut candidates, &token, None, false, tuning);
        }
    }

    candidates
}

// ---------------------------------------------------------------------------
// Scoring and mention tracking
// ---------------------------------------------------------------------------

fn mention_regex(normalized: &str) -> Regex {
    // Match singular or plural surface forms of each word.
    let words: Vec<String> = normalized
        .split_whitespace()
        .map(|w| format!("{}(?:s|es)?", regex::escape(w)))
        .collect();
    let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
    Regex::new(&pattern).unwrap_or_else(|_| Regex::new(r"\b\B").unwrap())
}

fn mention_offsets(text: &str, normalized: &str) -> Vec<(usize, usize)> {
    mention_regex(normalized)
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

fn sections_containing(chapter: &Chapter, offsets: &[(usize, usize)]) -> usize {
    chapter
        .sections
        .iter()
        .filter(|s| offsets.iter().any(|(o, _)| *o >= s.start && *o < s.end.max(s.start + 1)))
        .count()
}

/// Frequency-weighted-by-rarity score squashed into (0, 1], plus structural
/// bonuses for heading placement and an explicit definition.
fn candidate_score(
    chapter: &Chapter,
    candidate: &Candidate,
    offsets: &[(usize, usize)],
    tuning: &Tuning,
) -> f64 {
    if offsets.is_empty() || chapter.word_count == 0 {
        return 0.0;
    }
    let tf_per_kword = per_kword(offsets.len() as f64, chapter.word_count);
    let total_sections = chapter.sections.len().max(1) as f64;
    let with_term = sections_containing(chapter, offsets).max(1) as f64;
    let idf = (1.0 + total_sections / with_term).ln();
    let raw = tf_per_kword * (0.5 + idf);
    let mut score = 1.0 - (-raw / tuning.candidate_score_scale).exp();
    if candidate.in_heading {
        score += tuning.heading_bonus;
    }
    if candidate.definition.is_some() {
        score += tuning.definition_bonus;
    }
    score.min(1.0)
}

fn estimate_depth(context: &str) -> f64 {
    let words = context.split_whitespace().count() as f64;
    let cues = EXPLANATORY_CUE_RE.find_iter(context).count() as f64;
    (words / 60.0 + cues * 0.2).min(1.0)
}

fn classify_importance(
    chapter: &Chapter,
    in_heading: bool,
    mention_count: usize,
    tuning: &Tuning,
) -> Importance {
    if in_heading {
        return Importance::Core;
    }
    let rate = per_kword(mention_count as f64, chapter.word_count);
    if mention_count >= 2 && rate >= tuning.core_mentions_per_kword {
        Importance::Core
    } else if rate >= tuning.supporting_mentions_per_kword {
        Importance::Supporting
    } else {
        Importance::Detail
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

fn first_offset(offsets: &[(usize, usize)]) -> usize {
    offsets.first().map(|(o, _)| *o).unwrap_or(usize::MAX)
}

fn cooccurrences(a: &[(usize, usize)], b: &[(usize, usize)], window: usize) -> usize {
    let mut count = 0;
    for (oa, _) in a {
        if b.iter().any(|(ob, _)| oa.abs_diff(*ob) <= window) {
            count += 1;
        }
    }
    count
}

fn establish_relationships(
    text: &str,
    ids: &[String],
    offsets_by_id: &BTreeMap<String, Vec<(usize, usize)>>,
    tuning: &Tuning,
) -> Vec<ConceptRelationship> {
    let mut edges: BTreeMap<(String, String, RelationshipKind), f64> = BTreeMap::new();
    let mut add = |source: &str, target: &str, kind: RelationshipKind, strength: f64| {
        if source == target {
            return;
        }
        let key = (source.to_string(), target.to_string(), kind);
        let entry = edges.entry(key).or_insert(0.0);
        if strength > *entry {
            *entry = strength;
        }
    };

    let window = tuning.cooccurrence_window_chars;
    for (i, a) in ids.iter().enumerate() {
        let a_offsets = &offsets_by_id[a];
        for b in ids.iter().skip(i + 1) {
            let b_offsets = &offsets_by_id[b];
            let shared = cooccurrences(a_offsets, b_offsets, window);
            if shared == 0 {
                continue;
            }

            // Ordered by first mention: the earlier concept is the source.
            let (src, dst, src_offsets, dst_offsets) =
                if first_offset(a_offsets) <= first_offset(b_offsets) {
                    (a, b, a_offsets, b_offsets)
                } else {
                    (b, a, b_offsets, a_offsets)
                };
            add(src, dst, RelationshipKind::Related, (shared as f64 / 4.0).min(1.0));

            // Prerequisite: the earlier concept co-occurs with the later
            // concept's introduction, i.e. it is used as a building block.
            let dst_first = first_offset(dst_offsets);
            let used_at_introduction = src_offsets
                .iter()
                .any(|(o, _)| *o < dst_first && dst_first - o <= window);
            if used_at_introduction {
                let strength = (0.4 + 0.1 * shared as f64).min(0.9);
                add(src, dst, RelationshipKind::Prerequisite, strength);
            }
        }
    }

    // Example edges: a concept mentioned shortly before an example cue is
    // illustrated by concepts mentioned inside the cue window.
    for cue in EXAMPLE_CUE_RE.find_iter(text) {
        let before_start = cue.start().saturating_sub(window);
        let after_end = cue.end() + tuning.example_cue_window_chars;
        for a in ids {
            let subject_near = offsets_by_id[a]
                .iter()
                .any(|(o, _)| *o >= before_start && *o < cue.start());
            if !subject_near {
                continue;
            }
            for b in ids {
                if a == b {
                    continue;
                }
                let instance_inside = offsets_by_id[b]
                    .iter()
                    .any(|(o, _)| *o >= cue.end() && *o < after_end);
                if instance_inside {
                    add(a, b, RelationshipKind::Example, 0.6);
                }
            }
        }
    }

    // Contrast edges: both concepts near explicit comparison language.
    for cue in CONTRAST_CUE_RE.find_iter(text) {
        let lo = cue.start().saturating_sub(window);
        let hi = cue.end() + window;
        let nearby: Vec<&String> = ids
            .iter()
            .filter(|id| offsets_by_id[*id].iter().any(|(o, _)| *o >= lo && *o < hi))
            .collect();
        for (i, a) in nearby.iter().enumerate() {
            for b in nearby.iter().skip(i + 1) {
                add(a.as_str(), b.as_str(), RelationshipKind::Contrasts, 0.6);
            }
        }
    }

    edges
        .into_iter()
        .map(|((source, target, kind), strength)| ConceptRelationship {
            source,
            target,
            kind,
            strength,
        })
        .collect()
}

/// Drop the lowest-strength edge of any directed cycle in the prerequisite
/// subgraph until it is a DAG. Prerequisite edges are already directed by
/// first-mention order, so this is a safety net rather than the common path.
pub fn break_prerequisite_cycles(relationships: &mut Vec<ConceptRelationship>) {
    loop {
        let prereqs: Vec<(usize, &ConceptRelationship)> = relationships
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == RelationshipKind::Prerequisite)
            .collect();
        let Some(cycle) = find_cycle(&prereqs) else {
            break;
        };
        let Some(weakest) = cycle.into_iter().min_by(|a, b| {
            relationships[*a]
                .strength
                .partial_cmp(&relationships[*b].strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            break;
        };
        tracing::warn!(
            source = %relationships[weakest].source,
            target = %relationships[weakest].target,
            "dropping lowest-confidence prerequisite edge to break a cycle"
        );
        relationships.remove(weakest);
    }
}

/// Returns the edge indices of one directed cycle, if any.
fn find_cycle(prereqs: &[(usize, &ConceptRelationship)]) -> Option<Vec<usize>> {
    let mut adjacency: BTreeMap<&str, Vec<(usize, &str)>> = BTreeMap::new();
    for (idx, r) in prereqs {
        adjacency
            .entry(r.source.as_str())
            .or_default()
            .push((*idx, r.target.as_str()));
    }

    let mut visited: HashSet<&str> = HashSet::new();
    for start in adjacency.keys().copied().collect::<Vec<_>>() {
        if visited.contains(start) {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        let mut path_nodes: Vec<&str> = vec![start];
        let mut path_edges: Vec<usize> = Vec::new();
        while let Some((node, next_child)) = stack.last().copied() {
            let children = adjacency.get(node).cloned().unwrap_or_default();
            if next_child < children.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let (edge_idx, child) = children[next_child];
                if let Some(pos) = path_nodes.iter().position(|n| *n == child) {
                    let mut cycle = path_edges[pos..].to_vec();
                    cycle.push(edge_idx);
                    return Some(cycle);
                }
                if !visited.contains(child) {
                    stack.push((child, 0));
                    path_nodes.push(child);
                    path_edges.push(edge_idx);
                }
            } else {
                visited.insert(node);
                stack.pop();
                path_nodes.pop();
                path_edges.pop();
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Graph statistics
// ---------------------------------------------------------------------------

fn hierarchy_balance(concepts: &[Concept]) -> f64 {
    if concepts.is_empty() {
        return 0.0;
    }
    let total = concepts.len() as f64;
    let count = |imp: Importance| concepts.iter().filter(|c| c.importance == imp).count() as f64;
    // Target core/supporting/detail proportions for a well-layered chapter.
    let targets = [
        (count(Importance::Core) / total, 0.25),
        (count(Importance::Supporting) / total, 0.35),
        (count(Importance::Detail) / total, 0.40),
    ];
    let deviation: f64 = targets.iter().map(|(p, t)| (p - t).abs()).sum();
    (1.0 - deviation / 2.0).clamp(0.0, 1.0)
}

fn compute_stats(chapter: &Chapter, concepts: &[Concept], relationships: &[ConceptRelationship]) -> GraphStats {
    let connected: HashSet<&str> = relationships
        .iter()
        .flat_map(|r| [r.source.as_str(), r.target.as_str()])
        .collect();
    let orphans: Vec<String> = concepts
        .iter()
        .filter(|c| !connected.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect();
    GraphStats {
        density_per_kword: per_kword(concepts.len() as f64, chapter.word_count),
        hierarchy_balance: hierarchy_balance(concepts),
        orphans,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Extract the concept graph for a chapter. Deterministic for a given input
/// and threshold; a chapter too short to surface qualifying candidates
/// yields an empty but valid graph.
pub fn extract(chapter: &Chapter, threshold: f64, tuning: &Tuning) -> ConceptGraph {
    let text = &chapter.content;
    if text.trim().is_empty() {
        return ConceptGraph::default();
    }

    let candidates = collect_candidates(chapter, tuning);

    // Resolve mentions for every candidate up front.
    let mut scored: Vec<(String, Candidate, Vec<(usize, usize)>)> = Vec::new();
    for (normalized, candidate) in candidates {
        let offsets = mention_offsets(text, &normalized);
        if offsets.is_empty() {
            continue;
        }
        scored.push((normalized, candidate, offsets));
    }

    // Prefer the longer phrase when a shorter term only ever occurs inside
    // it. This runs over the full candidate set, before the threshold
    // filter, so which terms are suppressed never depends on the threshold
    // and the surviving set can only grow as the threshold drops.
    let phrase_counts: Vec<(String, usize)> = scored
        .iter()
        .map(|(n, _, o)| (n.clone(), o.len()))
        .collect();
    scored.retain(|(normalized, _, offsets)| {
        !phrase_counts.iter().any(|(other, count)| {
            other != normalized
                && other.contains(normalized.as_str())
                && *count == offsets.len()
        })
    });

    let mut kept: Vec<(String, Candidate, Vec<(usize, usize)>)> = Vec::new();
    for (normalized, candidate, offsets) in scored {
        let score = candidate_score(chapter, &candidate, &offsets, tuning);
        if score >= threshold {
            kept.push((normalized, candidate, offsets));
        }
    }

    let mut concepts: Vec<Concept> = Vec::new();
    let mut offsets_by_id: BTreeMap<String, Vec<(usize, usize)>> = BTreeMap::new();
    for (normalized, candidate, offsets) in kept {
        let id = slug(&normalized);
        let mentions: Vec<Mention> = offsets
            .iter()
            .map(|(start, end)| {
                let context = context_around(text, *start, *end, tuning.context_window_chars * 2);
                let depth = estimate_depth(&context);
                Mention {
                    offset: *start,
                    context,
                    depth,
                }
            })
            .collect();
        let importance = classify_importance(chapter, candidate.in_heading, mentions.len(), tuning);
        offsets_by_id.insert(id.clone(), offsets);
        concepts.push(Concept {
            id,
            name: candidate.display,
            definition: candidate.definition,
            importance,
            mentions,
            prerequisites: Vec::new(),
            related: Vec::new(),
            tags: Vec::new(),
        });
    }

    // Hierarchy ordering: core first, then by first appearance.
    concepts.sort_by(|a, b| {
        a.importance
            .cmp(&b.importance)
            .then(a.first_mention_offset().cmp(&b.first_mention_offset()))
            .then(a.id.cmp(&b.id))
    });

    let ids: Vec<String> = concepts.iter().map(|c| c.id.clone()).collect();
    let mut relationships = establish_relationships(text, &ids, &offsets_by_id, tuning);
    break_prerequisite_cycles(&mut relationships);
    relationships.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then(a.target.cmp(&b.target))
            .then(a.kind.cmp(&b.kind))
    });

    // Mirror the edges onto each concept.
    for concept in &mut concepts {
        concept.prerequisites = relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Prerequisite && r.target == concept.id)
            .map(|r| r.source.clone())
            .collect();
        concept.related = relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Related && (r.source == concept.id || r.target == concept.id))
            .map(|r| {
                if r.source == concept.id {
                    r.target.clone()
                } else {
                    r.source.clone()
                }
            })
            .collect();
    }

    let stats = compute_stats(chapter, &concepts, &relationships);
    ConceptGraph {
        concepts,
        relationships,
        stats,
    }
}
