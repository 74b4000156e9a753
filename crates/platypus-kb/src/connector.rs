//! The knowledge connector seam.
//!
//! Every backend answers three questions: which entities does a surface
//! string denote, which relations does a label denote, and which values
//! satisfy a query. All three are pure reads, safe to call concurrently.
//! An empty result means "no match"; an `Err` means the backend could not
//! answer.

use async_trait::async_trait;
use platypus_formula::{EntityId, Literal, Query, Relation, ValueType, Variable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Deadlines
// ============================================================================

/// An absolute point in time by which work must finish.
///
/// Built on the tokio clock so paused-time tests control it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// A deadline `fraction` of the remaining budget from now.
    pub fn slice(&self, fraction: f64) -> Deadline {
        let fraction = fraction.clamp(0.0, 1.0);
        Deadline::after(self.remaining().mul_f64(fraction))
    }

    pub fn min(self, other: Deadline) -> Deadline {
        if self.at <= other.at {
            self
        } else {
            other
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A value returned by a knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Entity(EntityId),
    Literal(Literal),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Entity(_) => ValueType::entity(),
            Value::Literal(l) => l.value_type(),
        }
    }

    pub fn as_entity(&self) -> Option<&EntityId> {
        match self {
            Value::Entity(id) => Some(id),
            Value::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Value::Literal(l) => Some(l),
            Value::Entity(_) => None,
        }
    }

    /// Same value, allowing literals of different precision to match
    /// (`1879-03-14` is not `1879`, but `"1879"^^gYear` equals `1879`).
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Literal(a), Value::Literal(b)) => {
                a == b || a.semantic_cmp(b) == Some(std::cmp::Ordering::Equal)
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Entity(id) => write!(f, "{id}"),
            Value::Literal(l) => f.write_str(&l.lexical()),
        }
    }
}

/// One value of the answer variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerBinding {
    pub variable: Variable,
    pub value: Value,
    /// Human-readable label, when the backend knows one.
    pub label: Option<String>,
}

impl AnswerBinding {
    pub fn new(variable: Variable, value: Value) -> Self {
        Self {
            variable,
            value,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub id: EntityId,
    pub label: String,
    pub description: Option<String>,
    pub value_type: ValueType,
    /// In `[0, 1]`, higher is better.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationCandidate {
    pub relation: Relation,
    /// The label or alias that matched.
    pub matched_label: String,
    /// In `[0, 1]`, higher is better.
    pub confidence: f64,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),
    #[error("lookup timed out")]
    Timeout,
    #[error("invalid response from knowledge base: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// The deadline passed. `partial` holds answers found before it did;
    /// they are correct but possibly incomplete.
    #[error("execution timed out after {} partial answers", partial.len())]
    Timeout { partial: Vec<AnswerBinding> },
    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),
    #[error("query not supported by this backend: {0}")]
    Unsupported(String),
    #[error("invalid response from knowledge base: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Connector Interface
// ============================================================================

#[async_trait]
pub trait KnowledgeConnector: Send + Sync {
    /// Ranked entities whose label matches `span`. `expected` restricts
    /// the result type when the grammar already knows it.
    async fn resolve_entities(
        &self,
        span: &str,
        language: &str,
        expected: Option<ValueType>,
    ) -> Result<Vec<EntityCandidate>, LookupError>;

    /// Ranked relations whose label matches `label`, optionally filtered
    /// by the types of their subject and object.
    async fn resolve_relations(
        &self,
        label: &str,
        language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
    ) -> Result<Vec<RelationCandidate>, LookupError>;

    /// Values of the answer variable of `query`, at most `limit` of them.
    /// Must return `ExecutionError::Timeout` rather than run past
    /// `deadline`.
    async fn execute(
        &self,
        query: &Query,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<AnswerBinding>, ExecutionError>;

    /// Relations linking a thing to one of its classes ("instance of",
    /// "occupation"). Adjectives naming a class restrict through them.
    fn type_relations(&self) -> Vec<Relation> {
        Vec::new()
    }

    /// Whether label lookups ignore letter case.
    fn case_insensitive_labels(&self) -> bool {
        false
    }

    /// Short name used in logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: KnowledgeConnector + ?Sized> KnowledgeConnector for Arc<T> {
    async fn resolve_entities(
        &self,
        span: &str,
        language: &str,
        expected: Option<ValueType>,
    ) -> Result<Vec<EntityCandidate>, LookupError> {
        (**self).resolve_entities(span, language, expected).await
    }

    async fn resolve_relations(
        &self,
        label: &str,
        language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
    ) -> Result<Vec<RelationCandidate>, LookupError> {
        (**self)
            .resolve_relations(label, language, subject, object)
            .await
    }

    async fn execute(
        &self,
        query: &Query,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<AnswerBinding>, ExecutionError> {
        (**self).execute(query, limit, deadline).await
    }

    fn type_relations(&self) -> Vec<Relation> {
        (**self).type_relations()
    }

    fn case_insensitive_labels(&self) -> bool {
        (**self).case_insensitive_labels()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
