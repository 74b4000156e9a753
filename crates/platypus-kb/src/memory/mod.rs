//! In-memory knowledge base loaded from a JSON snapshot.
//!
//! ```json
//! {
//!   "entities":  [{ "id": "Q142", "label": "France", "aliases": ["French Republic"] }],
//!   "relations": [{ "id": "P36", "label": "capital", "domain": ["entity"], "range": ["entity"] }],
//!   "facts":     [{ "relation": "P36", "args": [{ "entity": "Q142" }, { "entity": "Q90" }] }],
//!   "type_relations": ["P31"]
//! }
//! ```
//!
//! Labels are matched case-insensitively: an exact label scores 1.0 and an
//! alias 0.8, both scaled by the entity's `prior`. Fault injection hooks
//! (unavailable labels, slow or failing relations) make degraded backends
//! reproducible in tests and demos.

mod eval;

use crate::connector::{
    AnswerBinding, Deadline, EntityCandidate, ExecutionError, KnowledgeConnector, LookupError,
    RelationCandidate, Value,
};
use async_trait::async_trait;
use eval::{EvalError, Evaluator, Goal};
use parking_lot::Mutex;
use platypus_formula::{
    AggregateOp, EntityId, Literal, Query, Relation, RelationId, ValueType, Variable,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

const LABEL_CONFIDENCE: f64 = 1.0;
const ALIAS_CONFIDENCE: f64 = 0.8;

// ============================================================================
// Snapshot format
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbSnapshot {
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
    #[serde(default)]
    pub facts: Vec<Fact>,
    /// Relations linking an entity to its classes.
    #[serde(default)]
    pub type_relations: Vec<RelationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Popularity prior in `(0, 1]` used to rank homonyms.
    #[serde(default = "default_prior")]
    pub prior: f64,
}

fn default_prior() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationRecord {
    #[serde(flatten)]
    pub relation: Relation,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub relation: RelationId,
    pub args: Vec<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum KbError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown type relation {0}")]
    UnknownTypeRelation(RelationId),
    #[error("fact {index} uses unknown relation {relation}")]
    UnknownRelation { index: usize, relation: RelationId },
    #[error("fact {index} has {found} arguments, {relation} expects {expected}")]
    FactArity {
        index: usize,
        relation: RelationId,
        expected: usize,
        found: usize,
    },
}

/// Call counters, for observing cache behaviour and load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KbStats {
    pub entity_lookups: usize,
    pub relation_lookups: usize,
    pub executions: usize,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable_labels: HashSet<String>,
    slow_relations: HashMap<RelationId, Duration>,
    failing_relations: HashSet<RelationId>,
}

// ============================================================================
// Knowledge base
// ============================================================================

pub struct InMemoryKnowledgeBase {
    entities: HashMap<EntityId, EntityRecord>,
    entity_labels: HashMap<String, Vec<(EntityId, f64)>>,
    relations: HashMap<RelationId, Relation>,
    relation_labels: HashMap<String, Vec<(RelationId, String, f64)>>,
    facts: HashMap<RelationId, Vec<Fact>>,
    type_relations: Vec<RelationId>,
    faults: Faults,
    stats: Mutex<KbStats>,
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl InMemoryKnowledgeBase {
    pub fn from_snapshot(snapshot: KbSnapshot) -> Result<Self, KbError> {
        let mut kb = Self {
            entities: HashMap::new(),
            entity_labels: HashMap::new(),
            relations: HashMap::new(),
            relation_labels: HashMap::new(),
            facts: HashMap::new(),
            type_relations: Vec::new(),
            faults: Faults::default(),
            stats: Mutex::new(KbStats::default()),
        };

        for record in snapshot.entities {
            let mut index = |text: &str, confidence: f64| {
                let slot = kb.entity_labels.entry(normalize(text)).or_default();
                if !slot.iter().any(|(id, _)| *id == record.id) {
                    slot.push((record.id.clone(), confidence * record.prior));
                }
            };
            index(&record.label, LABEL_CONFIDENCE);
            for alias in &record.aliases {
                index(alias, ALIAS_CONFIDENCE);
            }
            kb.entities.insert(record.id.clone(), record);
        }

        for record in snapshot.relations {
            let relation = record.relation;
            let mut index = |text: &str, confidence: f64| {
                let slot = kb.relation_labels.entry(normalize(text)).or_default();
                if !slot.iter().any(|(id, _, _)| *id == relation.id) {
                    slot.push((relation.id.clone(), text.to_string(), confidence));
                }
            };
            index(&relation.label, LABEL_CONFIDENCE);
            for alias in &record.aliases {
                index(alias, ALIAS_CONFIDENCE);
            }
            kb.relations.insert(relation.id.clone(), relation);
        }

        for (index, fact) in snapshot.facts.into_iter().enumerate() {
            let Some(relation) = kb.relations.get(&fact.relation) else {
                return Err(KbError::UnknownRelation {
                    index,
                    relation: fact.relation,
                });
            };
            if relation.arity != fact.args.len() {
                return Err(KbError::FactArity {
                    index,
                    relation: fact.relation.clone(),
                    expected: relation.arity,
                    found: fact.args.len(),
                });
            }
            kb.facts.entry(fact.relation.clone()).or_default().push(fact);
        }

        for id in snapshot.type_relations {
            if !kb.relations.contains_key(&id) {
                return Err(KbError::UnknownTypeRelation(id));
            }
            if !kb.type_relations.contains(&id) {
                kb.type_relations.push(id);
            }
        }

        tracing::debug!(
            entities = kb.entities.len(),
            relations = kb.relations.len(),
            facts = kb.facts.values().map(Vec::len).sum::<usize>(),
            "loaded in-memory knowledge base"
        );
        Ok(kb)
    }

    pub fn from_json_str(json: &str) -> Result<Self, KbError> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, KbError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Lookups for this label fail with `LookupError::Unavailable`.
    pub fn with_unavailable_label(mut self, label: &str) -> Self {
        self.faults.unavailable_labels.insert(normalize(label));
        self
    }

    /// Queries mentioning `relation` take `delay` before evaluating.
    pub fn with_slow_relation(mut self, relation: impl Into<RelationId>, delay: Duration) -> Self {
        self.faults.slow_relations.insert(relation.into(), delay);
        self
    }

    /// Queries mentioning `relation` fail with `ExecutionError::Unavailable`.
    pub fn with_failing_relation(mut self, relation: impl Into<RelationId>) -> Self {
        self.faults.failing_relations.insert(relation.into());
        self
    }

    pub fn stats(&self) -> KbStats {
        *self.stats.lock()
    }

    pub fn relation(&self, id: &RelationId) -> Option<&Relation> {
        self.relations.get(id)
    }

    pub fn entity_label(&self, id: &EntityId) -> Option<&str> {
        self.entities.get(id).map(|e| e.label.as_str())
    }

    fn binding(&self, variable: &Variable, value: Value) -> AnswerBinding {
        let label = value
            .as_entity()
            .and_then(|id| self.entity_label(id))
            .map(str::to_string);
        AnswerBinding {
            variable: variable.clone(),
            value,
            label,
        }
    }

    fn check_label(&self, label: &str) -> Result<String, LookupError> {
        let key = normalize(label);
        if self.faults.unavailable_labels.contains(&key) {
            tracing::warn!(label, "injected lookup failure");
            return Err(LookupError::Unavailable(format!(
                "lookup of {label:?} failed"
            )));
        }
        Ok(key)
    }

    fn evaluate(
        &self,
        query: &Query,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<AnswerBinding>, ExecutionError> {
        let answer = query.answer();
        let mut evaluator = Evaluator {
            facts: &self.facts,
            deadline,
            goal: None,
            steps: 0,
        };

        if let Some((op, body)) = query.top_aggregate() {
            let envs = match evaluator.eval_all(body) {
                Ok(envs) => envs,
                Err(EvalError::Interrupted(_)) => {
                    return Err(ExecutionError::Timeout {
                        partial: Vec::new(),
                    })
                }
                Err(EvalError::Unsupported(why)) => return Err(ExecutionError::Unsupported(why)),
            };
            let mut seen: HashSet<&Value> = HashSet::new();
            let values: Vec<Value> = envs
                .iter()
                .filter_map(|env| env.get(answer))
                .filter(|v| seen.insert(*v))
                .cloned()
                .collect();
            return Ok(aggregate(op, &values)?
                .map(|v| vec![self.binding(answer, v)])
                .unwrap_or_default());
        }

        evaluator.goal = Some(Goal {
            answer: answer.clone(),
            limit,
        });
        let (envs, interrupted) = match evaluator.eval_query(query.body()) {
            Ok(envs) => (envs, false),
            Err(EvalError::Interrupted(partial)) => (partial, true),
            Err(EvalError::Unsupported(why)) => return Err(ExecutionError::Unsupported(why)),
        };

        let mut seen: Vec<Value> = Vec::new();
        let mut distinct: HashSet<Value> = HashSet::new();
        for env in envs {
            if seen.len() >= limit {
                break;
            }
            let Some(value) = env.get(answer) else {
                return Err(ExecutionError::Unsupported(format!(
                    "answer variable {answer} is never bound"
                )));
            };
            if distinct.insert(value.clone()) {
                seen.push(value.clone());
            }
        }
        let bindings = seen
            .into_iter()
            .map(|v| self.binding(answer, v))
            .collect();
        if interrupted {
            return Err(ExecutionError::Timeout { partial: bindings });
        }
        Ok(bindings)
    }
}

fn aggregate(op: AggregateOp, values: &[Value]) -> Result<Option<Value>, ExecutionError> {
    let literals_of = |values: &[Value]| -> Result<Vec<Literal>, ExecutionError> {
        values
            .iter()
            .map(|v| {
                v.as_literal().cloned().ok_or_else(|| {
                    ExecutionError::Unsupported(format!("{} over entities", op.name()))
                })
            })
            .collect()
    };
    match op {
        AggregateOp::Count => Ok(Some(Value::Literal(Literal::Integer(values.len() as i64)))),
        _ if values.is_empty() => Ok(None),
        AggregateOp::Min | AggregateOp::Max => {
            let literals = literals_of(values)?;
            let mut best = &literals[0];
            for candidate in &literals[1..] {
                let better = match candidate.semantic_cmp(best) {
                    Some(std::cmp::Ordering::Less) => op == AggregateOp::Min,
                    Some(std::cmp::Ordering::Greater) => op == AggregateOp::Max,
                    _ => false,
                };
                if better {
                    best = candidate;
                }
            }
            Ok(Some(Value::Literal(best.clone())))
        }
        AggregateOp::Sum | AggregateOp::Avg => {
            let literals = literals_of(values)?;
            let Some(numbers) = literals.iter().map(Literal::as_f64).collect::<Option<Vec<_>>>()
            else {
                return Err(ExecutionError::Unsupported(format!(
                    "{} over non-numeric values",
                    op.name()
                )));
            };
            let sum: f64 = numbers.iter().sum();
            let all_integers = literals.iter().all(|l| matches!(l, Literal::Integer(_)));
            Ok(Some(Value::Literal(match op {
                AggregateOp::Sum if all_integers => Literal::Integer(sum as i64),
                AggregateOp::Sum => Literal::Decimal(sum),
                _ => Literal::Decimal(sum / numbers.len() as f64),
            })))
        }
    }
}

#[async_trait]
impl KnowledgeConnector for InMemoryKnowledgeBase {
    async fn resolve_entities(
        &self,
        span: &str,
        _language: &str,
        expected: Option<ValueType>,
    ) -> Result<Vec<EntityCandidate>, LookupError> {
        self.stats.lock().entity_lookups += 1;
        let key = self.check_label(span)?;
        if expected.is_some_and(|t| !t.is_compatible(ValueType::entity())) {
            return Ok(Vec::new());
        }
        let mut out: Vec<EntityCandidate> = self
            .entity_labels
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|(id, confidence)| {
                let record = self.entities.get(id)?;
                Some(EntityCandidate {
                    id: id.clone(),
                    label: record.label.clone(),
                    description: record.description.clone(),
                    value_type: ValueType::entity(),
                    confidence: *confidence,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn resolve_relations(
        &self,
        label: &str,
        _language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
    ) -> Result<Vec<RelationCandidate>, LookupError> {
        self.stats.lock().relation_lookups += 1;
        let key = self.check_label(label)?;
        let mut out: Vec<RelationCandidate> = self
            .relation_labels
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|(id, matched, confidence)| {
                let relation = self.relations.get(id)?;
                if subject.is_some_and(|t| !t.is_compatible(relation.domain))
                    || object.is_some_and(|t| !t.is_compatible(relation.range))
                {
                    return None;
                }
                Some(RelationCandidate {
                    relation: relation.clone(),
                    matched_label: matched.clone(),
                    confidence: *confidence,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.relation.id.cmp(&b.relation.id))
        });
        Ok(out)
    }

    async fn execute(
        &self,
        query: &Query,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<AnswerBinding>, ExecutionError> {
        self.stats.lock().executions += 1;
        let relations = query.body().relations();

        if let Some(failing) = relations
            .iter()
            .find(|r| self.faults.failing_relations.contains(*r))
        {
            return Err(ExecutionError::Unavailable(format!(
                "relation {failing} is unavailable"
            )));
        }

        let delay = relations
            .iter()
            .filter_map(|r| self.faults.slow_relations.get(r))
            .max()
            .copied()
            .unwrap_or_default();
        if !delay.is_zero() {
            let remaining = deadline.remaining();
            tokio::time::sleep(delay.min(remaining)).await;
            if delay >= remaining {
                return Err(ExecutionError::Timeout {
                    partial: Vec::new(),
                });
            }
        }
        if deadline.is_expired() {
            return Err(ExecutionError::Timeout {
                partial: Vec::new(),
            });
        }

        self.evaluate(query, limit, deadline)
    }

    fn type_relations(&self) -> Vec<Relation> {
        self.type_relations
            .iter()
            .filter_map(|id| self.relations.get(id))
            .cloned()
            .collect()
    }

    fn case_insensitive_labels(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}
