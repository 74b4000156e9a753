//! Slot resolution.
//!
//! Every distinct lookup of an analysis runs once, concurrently with the
//! others up to the configured fan-out, and each one is bounded by the
//! request deadline:
//!
//! ```text
//!   slots ──► distinct LookupKeys ──► JoinSet (Semaphore permits)
//!                                        │  timeout_at(deadline)
//!                                        ▼
//!   per-slot alternatives ◄── merge keys, best first, capped
//! ```
//!
//! A slot fails when any of its lookups failed; an empty result is a
//! successful "no match".

use crate::policy::AnalyzerPolicy;
use crate::template::{LookupKey, LookupKind, SlotId, SlotKind, SlotTable};
use platypus_formula::{Literal, Relation, ValueType};
use platypus_kb::{Deadline, EntityCandidate, KnowledgeConnector, LookupError, RelationCandidate};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Confidence decay between successive readings of one literal span.
const LITERAL_DECAY: f64 = 0.9;

/// One possible value of a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Alternative {
    Entity(EntityCandidate),
    Relation(RelationCandidate),
    Literal { value: Literal, confidence: f64 },
}

impl Alternative {
    pub fn confidence(&self) -> f64 {
        match self {
            Alternative::Entity(e) => e.confidence,
            Alternative::Relation(r) => r.confidence,
            Alternative::Literal { confidence, .. } => *confidence,
        }
    }

    /// Knowledge-base id, or lexical form for literals.
    pub fn id(&self) -> String {
        match self {
            Alternative::Entity(e) => e.id.to_string(),
            Alternative::Relation(r) => r.relation.id.to_string(),
            Alternative::Literal { value, .. } => value.to_string(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Alternative::Entity(e) => e.label.clone(),
            Alternative::Relation(r) => r.relation.label.clone(),
            Alternative::Literal { value, .. } => value.lexical(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Alternative::Entity(e) => e.value_type,
            Alternative::Relation(_) => ValueType::top(),
            Alternative::Literal { value, .. } => value.value_type(),
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Alternative::Relation(r) => Some(&r.relation),
            _ => None,
        }
    }
}

/// Outcome of resolving the slots of one analysis.
#[derive(Debug, Clone, Default)]
pub struct Resolutions {
    slots: HashMap<SlotId, Result<Vec<Alternative>, LookupError>>,
}

impl Resolutions {
    pub fn get(&self, id: SlotId) -> Option<&Result<Vec<Alternative>, LookupError>> {
        self.slots.get(&id)
    }

    pub fn insert(&mut self, id: SlotId, result: Result<Vec<Alternative>, LookupError>) {
        self.slots.insert(id, result);
    }

    pub fn failures(&self) -> impl Iterator<Item = (SlotId, &LookupError)> {
        self.slots
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (*id, e)))
    }
}

fn by_confidence(a: &Alternative, b: &Alternative) -> Ordering {
    b.confidence()
        .total_cmp(&a.confidence())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Resolve the slots `ids` of `slots`.
pub async fn resolve_slots(
    connector: &Arc<dyn KnowledgeConnector>,
    slots: &SlotTable,
    ids: &BTreeSet<SlotId>,
    language: &str,
    policy: &AnalyzerPolicy,
    deadline: Deadline,
) -> Resolutions {
    let lookups = slots.lookups(ids.iter().copied());
    let results = run_lookups(connector, lookups, language, policy.lookup_fan_out, deadline).await;

    let mut resolutions = Resolutions::default();
    for &id in ids {
        let Some(slot) = slots.get(id) else {
            continue;
        };
        let resolved = match &slot.kind {
            SlotKind::Literal(values) => Ok(values
                .iter()
                .zip(std::iter::successors(Some(1.0), |c| Some(c * LITERAL_DECAY)))
                .map(|(value, confidence)| Alternative::Literal {
                    value: value.clone(),
                    confidence,
                })
                .collect()),
            SlotKind::Entity { .. } | SlotKind::Relation { .. } => {
                merge_keys(&slot.lookup_keys(), &results)
            }
        };
        let resolved = resolved.map(|mut alternatives| {
            alternatives.sort_by(by_confidence);
            alternatives.truncate(policy.max_alternatives_per_slot);
            alternatives
        });
        if let Err(error) = &resolved {
            tracing::warn!(slot = %slot.surface, %error, "slot resolution failed");
        }
        resolutions.insert(id, resolved);
    }
    resolutions
}

/// Union the results of several keys, keeping the best confidence per id.
fn merge_keys(
    keys: &[LookupKey],
    results: &HashMap<LookupKey, Result<Vec<Alternative>, LookupError>>,
) -> Result<Vec<Alternative>, LookupError> {
    let mut merged: Vec<Alternative> = Vec::new();
    for key in keys {
        let found = match results.get(key) {
            Some(Ok(found)) => found,
            Some(Err(error)) => return Err(error.clone()),
            None => return Err(LookupError::Unavailable("lookup did not complete".into())),
        };
        for alternative in found {
            match merged.iter_mut().find(|m| m.id() == alternative.id()) {
                Some(existing) if existing.confidence() < alternative.confidence() => {
                    *existing = alternative.clone();
                }
                Some(_) => {}
                None => merged.push(alternative.clone()),
            }
        }
    }
    Ok(merged)
}

async fn run_lookups(
    connector: &Arc<dyn KnowledgeConnector>,
    lookups: BTreeSet<LookupKey>,
    language: &str,
    fan_out: usize,
    deadline: Deadline,
) -> HashMap<LookupKey, Result<Vec<Alternative>, LookupError>> {
    let permits = Arc::new(Semaphore::new(fan_out.max(1)));
    let mut tasks = JoinSet::new();
    for key in lookups {
        let connector = Arc::clone(connector);
        let permits = Arc::clone(&permits);
        let language = language.to_string();
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let lookup = lookup(connector.as_ref(), &key, &language);
                    match tokio::time::timeout_at(deadline.instant(), lookup).await {
                        Ok(result) => result,
                        Err(_) => Err(LookupError::Timeout),
                    }
                }
                Err(_) => Err(LookupError::Unavailable("lookup pool closed".into())),
            };
            (key, result)
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((key, result)) => {
                tracing::debug!(
                    kind = ?key.kind,
                    text = %key.text,
                    found = result.as_ref().map(Vec::len).unwrap_or(0),
                    failed = result.is_err(),
                    "lookup finished"
                );
                results.insert(key, result);
            }
            Err(error) => tracing::warn!(%error, "lookup task aborted"),
        }
    }
    results
}

async fn lookup(
    connector: &dyn KnowledgeConnector,
    key: &LookupKey,
    language: &str,
) -> Result<Vec<Alternative>, LookupError> {
    match key.kind {
        LookupKind::Entity { expected } => Ok(connector
            .resolve_entities(&key.text, language, expected)
            .await?
            .into_iter()
            .map(Alternative::Entity)
            .collect()),
        LookupKind::Relation { subject, object } => Ok(connector
            .resolve_relations(&key.text, language, subject, object)
            .await?
            .into_iter()
            .map(Alternative::Relation)
            .collect()),
    }
}
