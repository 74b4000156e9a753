//! Disambiguation planning.
//!
//! Candidates of one question often differ only by what a span was
//! resolved to ("Paris" the city or "Paris, Texas"). [`plan`] turns a
//! ranked candidate list into a tree of "which X did you mean?" questions:
//! each step asks about the surface string with the most distinct
//! resolutions, and each answer leads to the candidates consistent with it.

use crate::candidate::Candidate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisambiguationPlan {
    /// Nothing left to ask.
    Candidates(Vec<Candidate>),
    Step(DisambiguationStep),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisambiguationStep {
    /// The span to ask about.
    pub surface: String,
    /// One entry per resolution of `surface`, in candidate rank order.
    pub options: Vec<DisambiguationOption>,
    /// Candidates that do not mention `surface`.
    pub others: Box<DisambiguationPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisambiguationOption {
    pub chosen: String,
    pub label: String,
    pub then: DisambiguationPlan,
}

impl DisambiguationPlan {
    /// Whether a question has to be asked.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, DisambiguationPlan::Step(_))
    }

    /// Depth of the deepest chain of questions.
    pub fn depth(&self) -> usize {
        match self {
            DisambiguationPlan::Candidates(_) => 0,
            DisambiguationPlan::Step(step) => {
                let deepest = step
                    .options
                    .iter()
                    .map(|o| o.then.depth())
                    .chain(std::iter::once(step.others.depth()))
                    .max()
                    .unwrap_or(0);
                1 + deepest
            }
        }
    }
}

/// Surface string → (chosen id, label) still undecided for one candidate.
type Trace = BTreeMap<String, (String, String)>;

/// Build the question tree for `candidates`, which should be ranked.
pub fn plan(candidates: &[Candidate]) -> DisambiguationPlan {
    let traced = candidates
        .iter()
        .map(|c| {
            let trace: Trace = c
                .provenance
                .choices
                .iter()
                .map(|choice| {
                    (
                        choice.surface.clone(),
                        (choice.chosen.clone(), choice.label.clone()),
                    )
                })
                .collect();
            (c.clone(), trace)
        })
        .collect();
    build(traced)
}

fn build(traced: Vec<(Candidate, Trace)>) -> DisambiguationPlan {
    // distinct resolutions per surface string, in first-appearance order
    let mut resolutions: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (_, trace) in &traced {
        for (surface, (chosen, _)) in trace {
            let seen = resolutions.entry(surface.as_str()).or_default();
            if !seen.contains(&chosen.as_str()) {
                seen.push(chosen.as_str());
            }
        }
    }
    // most resolutions wins, ties go to the first surface in order
    let discriminative = resolutions
        .iter()
        .filter(|(_, chosen)| chosen.len() >= 2)
        .fold(None::<(&str, usize)>, |best, (surface, chosen)| match best {
            Some((_, n)) if n >= chosen.len() => best,
            _ => Some((*surface, chosen.len())),
        })
        .map(|(surface, _)| surface.to_string());

    let Some(surface) = discriminative else {
        return DisambiguationPlan::Candidates(traced.into_iter().map(|(c, _)| c).collect());
    };

    let mut groups: Vec<(String, String, Vec<(Candidate, Trace)>)> = Vec::new();
    let mut others = Vec::new();
    for (candidate, mut trace) in traced {
        match trace.remove(&surface) {
            Some((chosen, label)) => match groups.iter_mut().find(|(c, _, _)| *c == chosen) {
                Some((_, _, members)) => members.push((candidate, trace)),
                None => groups.push((chosen, label, vec![(candidate, trace)])),
            },
            None => others.push((candidate, trace)),
        }
    }

    DisambiguationPlan::Step(DisambiguationStep {
        surface,
        options: groups
            .into_iter()
            .map(|(chosen, label, members)| DisambiguationOption {
                chosen,
                label,
                then: build(members),
            })
            .collect(),
        others: Box::new(build(others)),
    })
}
