//! Candidates and their ranking.

use crate::grammar::RuleKind;
use platypus_formula::Query;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    Entity,
    Relation,
    Literal,
}

/// What a question span was resolved to in one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotChoice {
    pub surface: String,
    pub kind: ChoiceKind,
    /// Knowledge-base id, or the literal value.
    pub chosen: String,
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub rule: RuleKind,
    pub priority: u8,
    pub choices: Vec<SlotChoice>,
}

/// One interpretation of a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Canonical form: the answer variable is `?x`.
    pub query: Query,
    /// In `[0, 1]`, higher is better.
    pub confidence: f64,
    pub provenance: Provenance,
}

impl Candidate {
    pub fn rule(&self) -> RuleKind {
        self.provenance.rule
    }

    /// The entity chosen for `surface`, if that span was an entity slot.
    pub fn choice_for(&self, surface: &str) -> Option<&SlotChoice> {
        self.provenance.choices.iter().find(|c| c.surface == surface)
    }
}

/// Total order of candidates: confidence, then rule priority, then fewer
/// formula nodes, then the formula text.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.provenance.priority.cmp(&b.provenance.priority))
        .then_with(|| a.query.node_count().cmp(&b.query.node_count()))
        .then_with(|| a.query.to_string().cmp(&b.query.to_string()))
}

/// Merge candidates with equal canonical queries, keeping the best one of
/// each, then sort and keep the first `max`.
pub fn rank(candidates: Vec<Candidate>, max: usize) -> Vec<Candidate> {
    let mut best: HashMap<Query, Candidate> = HashMap::new();
    for candidate in candidates {
        let key = candidate.query.canonical();
        match best.get_mut(&key) {
            Some(existing) => {
                if compare_candidates(&candidate, existing) == Ordering::Less {
                    *existing = candidate;
                }
            }
            None => {
                best.insert(key, candidate);
            }
        }
    }
    let mut ranked: Vec<Candidate> = best.into_values().collect();
    ranked.sort_by(compare_candidates);
    ranked.truncate(max);
    ranked
}
