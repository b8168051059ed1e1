//! Chemistry detector set: chemical equations with balance checking, lab
//! procedures, and balancing drills. Registered under the `chemistry`
//! domain key and composed with the universal set by union.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Tuning;
use crate::context_around;
use crate::types::{PatternKind, PatternMatch};

use super::Detector;

static CHEM_EQUATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?:\d+\s*)?[A-Z][a-z]?[A-Za-z0-9()\u{2080}-\u{2089}]*",
        r"(?:\s*\+\s*(?:\d+\s*)?[A-Z][a-z]?[A-Za-z0-9()\u{2080}-\u{2089}]*)*",
        r"\s*(?:\u{2192}|\u{21CC}|->|<->)\s*",
        r"(?:\d+\s*)?[A-Z][a-z]?[A-Za-z0-9()\u{2080}-\u{2089}]*",
        r"(?:\s*\+\s*(?:\d+\s*)?[A-Z][a-z]?[A-Za-z0-9()\u{2080}-\u{2089}]*)*",
    ))
    .unwrap()
});

static CHEM_ARROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\u{2192}|\u{21CC}|->|<->").unwrap());

static LAB_PROCEDURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:titrat\w+|add \d+\s*m[lL]|heat the (?:solution|mixture|beaker)",
        r"|stir (?:until|gently|the)|measure \d+|pour the|rinse the|wear (?:goggles|gloves)",
        r"|bunsen burner|pipette|fume hood)\b",
    ))
    .unwrap()
});

static BALANCING_DRILL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbalance (?:the|each|this|the following) (?:chemical )?equations?\b").unwrap()
});

static ELEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z][a-z]?)(\d+|[\u{2080}-\u{2089}]+)?").unwrap());

pub fn detectors() -> Vec<Detector> {
    vec![
        detect_chemical_equations,
        detect_lab_procedures,
        detect_balancing_drills,
    ]
}

fn subscript_to_u64(s: &str) -> Option<u64> {
    let mut value = 0u64;
    for c in s.chars() {
        let digit = match c {
            '0'..='9' => c as u64 - '0' as u64,
            '\u{2080}'..='\u{2089}' => c as u64 - 0x2080,
            _ => return None,
        };
        value = value.checked_mul(10)?.checked_add(digit)?;
    }
    Some(value)
}

/// Atom counts for one side of an equation, or None when the side cannot be
/// parsed as chemical terms. Parenthesized groups are treated as opaque and
/// reported as unparseable.
fn parse_side(side: &str) -> Option<BTreeMap<String, u64>> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for term in side.split('+') {
        let term = term.trim();
        if term.is_empty() || term.contains('(') || term.contains(')') {
            return None;
        }
        // Leading stoichiometric coefficient.
        let digits: String = term.chars().take_while(|c| c.is_ascii_digit()).collect();
        let coefficient = if digits.is_empty() {
            1
        } else {
            digits.parse::<u64>().ok()?
        };
        let formula = term[digits.len()..].trim();
        if formula.is_empty() {
            return None;
        }

        let mut consumed = 0usize;
        for caps in ELEMENT_RE.captures_iter(formula) {
            let whole = caps.get(0).unwrap();
            if whole.start() != consumed {
                return None;
            }
            consumed = whole.end();
            let element = caps.get(1).unwrap().as_str().to_string();
            let count = match caps.get(2) {
                Some(sub) => subscript_to_u64(sub.as_str())?,
                None => 1,
            };
            *counts.entry(element).or_insert(0) += coefficient * count;
        }
        if consumed != formula.len() {
            return None;
        }
    }
    Some(counts)
}

/// Chemical reaction equations. Unparseable equations are flagged
/// `malformed`, unbalanced ones `isBalanced=false`; neither is dropped.
pub fn detect_chemical_equations(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    let mut out = Vec::new();
    for m in CHEM_EQUATION_RE.find_iter(text) {
        let span = m.as_str();
        let Some(arrow) = CHEM_ARROW_RE.find(span) else {
            continue;
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("category".to_string(), "chemicalEquation".to_string());

        let lhs = parse_side(&span[..arrow.start()]);
        let rhs = parse_side(&span[arrow.end()..]);
        match (lhs, rhs) {
            (Some(l), Some(r)) => {
                metadata.insert("isBalanced".to_string(), (l == r).to_string());
            }
            _ => {
                metadata.insert("malformed".to_string(), "true".to_string());
            }
        }

        out.push(PatternMatch {
            kind: PatternKind::Formula,
            confidence: tuning.chem_equation_confidence,
            start: m.start(),
            end: m.end(),
            context: context_around(text, m.start(), m.end(), tuning.context_window_chars),
            title: None,
            metadata,
        });
    }
    out
}

pub fn detect_lab_procedures(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    LAB_PROCEDURE_RE
        .find_iter(text)
        .map(|m| {
            let mut metadata = BTreeMap::new();
            metadata.insert("category".to_string(), "labProcedure".to_string());
            PatternMatch {
                kind: PatternKind::Domain("labProcedure".to_string()),
                confidence: tuning.chem_procedure_confidence,
                start: m.start(),
                end: m.end(),
                context: context_around(text, m.start(), m.end(), tuning.context_window_chars),
                title: None,
                metadata,
            }
        })
        .collect()
}

pub fn detect_balancing_drills(text: &str, tuning: &Tuning) -> Vec<PatternMatch> {
    BALANCING_DRILL_RE
        .find_iter(text)
        .map(|m| {
            let mut metadata = BTreeMap::new();
            metadata.insert("category".to_string(), "balancingDrill".to_string());
            metadata.insert("hasAnswer".to_string(), "false".to_string());
            PatternMatch {
                kind: PatternKind::PracticeProblem,
                confidence: tuning.chem_drill_confidence,
                start: m.start(),
                end: m.end(),
                context: context_around(text, m.start(), m.end(), tuning.context_window_chars),
                title: None,
                metadata,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_water_synthesis() {
        let lhs = parse_side("2H\u{2082} + O\u{2082}").unwrap();
        let rhs = parse_side("2H\u{2082}O").unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn unbalanced_side_detected() {
        let lhs = parse_side("H\u{2082} + O\u{2082}").unwrap();
        let rhs = parse_side("2H\u{2082}O").unwrap();
        assert_ne!(lhs, rhs);
    }

    #[test]
    fn parenthesized_term_is_unparseable() {
        assert!(parse_side("Ca(OH)\u{2082}").is_none());
    }
}
