use crate::formula::{AggregateOp, Formula, FormulaKind};
use crate::types::Variable;
use crate::FormulaError;
use serde::Serialize;
use std::fmt;

/// Name the answer variable takes in canonical form.
pub const CANONICAL_ANSWER: &str = "x";

/// A formula together with its designated answer variable.
///
/// Every free variable of `body` is the answer variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Query {
    answer: Variable,
    body: Formula,
}

impl Query {
    pub fn new(answer: impl Into<Variable>, body: Formula) -> Result<Self, FormulaError> {
        let answer = answer.into();
        if let Some(stray) = body.free_variables().into_iter().find(|v| *v != answer) {
            return Err(FormulaError::UnboundVariable(stray));
        }
        Ok(Self { answer, body })
    }

    pub fn answer(&self) -> &Variable {
        &self.answer
    }

    pub fn body(&self) -> &Formula {
        &self.body
    }

    /// The aggregation wrapping the whole query, when the answer is an
    /// aggregate of the answer variable (`count ?x. φ(?x)`).
    pub fn top_aggregate(&self) -> Option<(AggregateOp, &Formula)> {
        match self.body.kind() {
            FormulaKind::Aggregate { op, var, body } if *var == self.answer => Some((*op, body)),
            _ => None,
        }
    }

    /// Canonical representative: the answer variable becomes `?x`, bound
    /// variables are named after their binding depth and connectives are
    /// re-normalized. Queries equal up to variable naming and operand
    /// order have equal canonical forms.
    pub fn canonical(&self) -> Query {
        let answer = self.answer.clone();
        let mut mapping = |v: &Variable, _depth: usize| {
            (*v == answer).then(|| Variable::new(CANONICAL_ANSWER))
        };
        // a top-level aggregate keeps binding the answer variable
        let body = match self.top_aggregate() {
            Some((op, inner)) => Formula::from_kind(FormulaKind::Aggregate {
                op,
                var: Variable::new(CANONICAL_ANSWER),
                body: inner.rename_variables(&mut mapping, 0, &mut Vec::new()),
            }),
            None => self.body.rename_variables(&mut mapping, 0, &mut Vec::new()),
        };
        Query {
            answer: Variable::new(CANONICAL_ANSWER),
            body,
        }
    }

    pub fn node_count(&self) -> usize {
        self.body.node_count()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "λ{}.{}", self.answer, self.body)
    }
}
