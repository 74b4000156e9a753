//! Platypus Formula Model
//!
//! Typed logical formulas produced by the grammatical analyzer and consumed
//! by knowledge-base connectors:
//!
//! ```text
//!   "What is the capital of France?"
//!                 │
//!                 ▼
//!       λ?x. P36(Q142, ?x)          Query = answer variable + body
//!                 │
//!                 ▼
//!   SELECT DISTINCT ?x WHERE { wd:Q142 wdt:P36 ?x . }
//! ```
//!
//! ## Cases
//!
//! - terms: `Variable`, `EntityConstant`, `LiteralConstant`
//! - atoms: `Predicate(relation, args)`, `Compare(op, lhs, rhs)`
//! - connectives: `And`, `Or`, `Not`
//! - binders: `Exists(var, body)`, `Aggregate(op, var, body)`
//!
//! Formulas are only built through validated constructors and are kept in a
//! normal form, so structural `Eq`/`Hash` identify formulas that differ only
//! by operand order. [`Query::canonical`] additionally erases variable names.

pub mod formula;
pub mod query;
pub mod sparql;
pub mod types;

#[cfg(test)]
mod tests;

pub use formula::{AggregateOp, CompareOp, Formula, FormulaKind};
pub use query::{Query, CANONICAL_ANSWER};
pub use sparql::{aggregate_result_name, render_sparql, SparqlOptions};
pub use types::{EntityId, Literal, Relation, RelationId, ValueKind, ValueType, Variable};

/// Errors raised when building or rendering formulas.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("relation {relation} expects {expected} arguments, got {found}")]
    ArityMismatch {
        relation: RelationId,
        expected: usize,
        found: usize,
    },
    #[error("argument {position} of {relation} has type {found}, expected {expected}")]
    ArgumentType {
        relation: RelationId,
        position: usize,
        expected: ValueType,
        found: ValueType,
    },
    #[error("cannot compare {lhs} with {rhs} using `{op}`")]
    IncompatibleComparison {
        op: &'static str,
        lhs: ValueType,
        rhs: ValueType,
    },
    #[error("empty `{0}` connective")]
    EmptyConnective(&'static str),
    #[error("`{0}` is not a term")]
    NotATerm(String),
    #[error("variable {0} is free but is not the answer variable")]
    UnboundVariable(Variable),
    #[error("aggregate variable {0} does not occur in its body")]
    UnusedAggregateVariable(Variable),
    #[error("cannot render as SPARQL: {0}")]
    UnsupportedSparql(String),
}
