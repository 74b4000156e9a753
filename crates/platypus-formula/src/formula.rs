//! The formula tree and its validated constructors.
//!
//! A [`Formula`] is immutable once built. The only way to obtain one is
//! through the constructors below, which check arity and type constraints
//! and keep connectives in a normal form (flattened, sorted, without
//! duplicates). Two formulas built along different paths therefore compare
//! equal whenever they are the same up to commutativity of `∧`/`∨`.

use crate::types::{EntityId, Literal, Relation, RelationId, ValueType, Variable};
use crate::FormulaError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Comparison operators usable in [`FormulaKind::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    /// Evaluate the operator on an ordering result.
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
        }
    }
}

/// Aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateOp {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregateOp {
    pub fn name(self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
        }
    }
}

/// A validated formula. See [`FormulaKind`] for the cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Formula(Box<FormulaKind>);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    Variable(Variable),
    EntityConstant(EntityId),
    LiteralConstant(Literal),
    Predicate {
        relation: RelationId,
        args: Vec<Formula>,
    },
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Not(Formula),
    Exists {
        var: Variable,
        body: Formula,
    },
    Compare {
        op: CompareOp,
        lhs: Formula,
        rhs: Formula,
    },
    Aggregate {
        op: AggregateOp,
        var: Variable,
        body: Formula,
    },
}

#[derive(Clone, Copy)]
enum Connective {
    And,
    Or,
}

impl Connective {
    fn name(self) -> &'static str {
        match self {
            Connective::And => "and",
            Connective::Or => "or",
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Formula {
    pub(crate) fn from_kind(kind: FormulaKind) -> Self {
        Self(Box::new(kind))
    }

    pub fn kind(&self) -> &FormulaKind {
        &self.0
    }

    pub fn variable(var: impl Into<Variable>) -> Self {
        Self::from_kind(FormulaKind::Variable(var.into()))
    }

    pub fn entity(id: impl Into<EntityId>) -> Self {
        Self::from_kind(FormulaKind::EntityConstant(id.into()))
    }

    pub fn literal(value: Literal) -> Self {
        Self::from_kind(FormulaKind::LiteralConstant(value))
    }

    /// `relation(args...)`. Checks arity, that every argument is a term and
    /// that constant arguments fit the relation's domain/range.
    pub fn predicate(relation: &Relation, args: Vec<Formula>) -> Result<Self, FormulaError> {
        if args.len() != relation.arity {
            return Err(FormulaError::ArityMismatch {
                relation: relation.id.clone(),
                expected: relation.arity,
                found: args.len(),
            });
        }
        for (position, arg) in args.iter().enumerate() {
            let found = arg.term_type()?;
            let expected = relation.argument_type(position);
            if !found.is_compatible(expected) {
                return Err(FormulaError::ArgumentType {
                    relation: relation.id.clone(),
                    position,
                    expected,
                    found,
                });
            }
        }
        Ok(Self::from_kind(FormulaKind::Predicate {
            relation: relation.id.clone(),
            args,
        }))
    }

    /// Conjunction. Nested conjunctions are flattened, operands sorted and
    /// deduplicated; a single operand is returned as is.
    pub fn and(parts: Vec<Formula>) -> Result<Self, FormulaError> {
        Self::connective(Connective::And, parts)
    }

    /// Disjunction, normalized like [`Formula::and`].
    pub fn or(parts: Vec<Formula>) -> Result<Self, FormulaError> {
        Self::connective(Connective::Or, parts)
    }

    fn connective(kind: Connective, parts: Vec<Formula>) -> Result<Self, FormulaError> {
        let flat = Self::flatten(kind, parts);
        if flat.is_empty() {
            return Err(FormulaError::EmptyConnective(kind.name()));
        }
        Ok(Self::assemble(kind, flat))
    }

    fn flatten(kind: Connective, parts: Vec<Formula>) -> Vec<Formula> {
        let mut flat = BTreeSet::new();
        for part in parts {
            match (kind, *part.0) {
                (Connective::And, FormulaKind::And(inner))
                | (Connective::Or, FormulaKind::Or(inner)) => flat.extend(inner),
                (_, other) => {
                    flat.insert(Self::from_kind(other));
                }
            }
        }
        flat.into_iter().collect()
    }

    fn assemble(kind: Connective, mut flat: Vec<Formula>) -> Self {
        if flat.len() == 1 {
            return flat.remove(0);
        }
        Self::from_kind(match kind {
            Connective::And => FormulaKind::And(flat),
            Connective::Or => FormulaKind::Or(flat),
        })
    }

    /// Negation. Double negations cancel.
    pub fn not(inner: Formula) -> Self {
        match *inner.0 {
            FormulaKind::Not(f) => f,
            other => Self::from_kind(FormulaKind::Not(Self::from_kind(other))),
        }
    }

    /// Existential quantification. Quantifying a variable that does not
    /// occur free in `body` returns `body` unchanged.
    pub fn exists(var: impl Into<Variable>, body: Formula) -> Self {
        let var = var.into();
        if !body.free_variables().contains(&var) {
            return body;
        }
        Self::from_kind(FormulaKind::Exists { var, body })
    }

    /// `lhs op rhs` on terms of compatible types. Ordering operators further
    /// require an orderable type.
    pub fn compare(op: CompareOp, lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        let lhs_type = lhs.term_type()?;
        let rhs_type = rhs.term_type()?;
        let mut common = lhs_type.intersection(rhs_type);
        if op.is_ordering() {
            common = common.intersection(ValueType::orderable());
        }
        if common.is_bottom() {
            return Err(FormulaError::IncompatibleComparison {
                op: op.symbol(),
                lhs: lhs_type,
                rhs: rhs_type,
            });
        }
        Ok(Self::from_kind(FormulaKind::Compare { op, lhs, rhs }))
    }

    /// Aggregate the values of `var` satisfying `body`.
    pub fn aggregate(
        op: AggregateOp,
        var: impl Into<Variable>,
        body: Formula,
    ) -> Result<Self, FormulaError> {
        let var = var.into();
        if !body.free_variables().contains(&var) {
            return Err(FormulaError::UnusedAggregateVariable(var));
        }
        Ok(Self::from_kind(FormulaKind::Aggregate { op, var, body }))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn is_term(&self) -> bool {
        matches!(
            self.kind(),
            FormulaKind::Variable(_) | FormulaKind::EntityConstant(_) | FormulaKind::LiteralConstant(_)
        )
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self.kind() {
            FormulaKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Static type of a term. Variables are untyped (`top`).
    pub fn term_type(&self) -> Result<ValueType, FormulaError> {
        match self.kind() {
            FormulaKind::Variable(_) => Ok(ValueType::top()),
            FormulaKind::EntityConstant(_) => Ok(ValueType::entity()),
            FormulaKind::LiteralConstant(l) => Ok(l.value_type()),
            _ => Err(FormulaError::NotATerm(self.to_string())),
        }
    }

    pub fn free_variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free<'a>(&'a self, bound: &mut Vec<&'a Variable>, out: &mut BTreeSet<Variable>) {
        match self.kind() {
            FormulaKind::Variable(v) => {
                if !bound.contains(&v) {
                    out.insert(v.clone());
                }
            }
            FormulaKind::EntityConstant(_) | FormulaKind::LiteralConstant(_) => {}
            FormulaKind::Predicate { args, .. } => {
                for arg in args {
                    arg.collect_free(bound, out);
                }
            }
            FormulaKind::And(parts) | FormulaKind::Or(parts) => {
                for part in parts {
                    part.collect_free(bound, out);
                }
            }
            FormulaKind::Not(inner) => inner.collect_free(bound, out),
            FormulaKind::Exists { var, body } | FormulaKind::Aggregate { var, body, .. } => {
                bound.push(var);
                body.collect_free(bound, out);
                bound.pop();
            }
            FormulaKind::Compare { lhs, rhs, .. } => {
                lhs.collect_free(bound, out);
                rhs.collect_free(bound, out);
            }
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + match self.kind() {
            FormulaKind::Variable(_)
            | FormulaKind::EntityConstant(_)
            | FormulaKind::LiteralConstant(_) => 0,
            FormulaKind::Predicate { args, .. } => args.iter().map(Formula::node_count).sum(),
            FormulaKind::And(parts) | FormulaKind::Or(parts) => {
                parts.iter().map(Formula::node_count).sum()
            }
            FormulaKind::Not(inner) => inner.node_count(),
            FormulaKind::Exists { body, .. } | FormulaKind::Aggregate { body, .. } => {
                1 + body.node_count()
            }
            FormulaKind::Compare { lhs, rhs, .. } => lhs.node_count() + rhs.node_count(),
        }
    }

    /// Relation ids mentioned anywhere in the formula.
    pub fn relations(&self) -> BTreeSet<RelationId> {
        let mut out = BTreeSet::new();
        self.visit(&mut |f| {
            if let FormulaKind::Predicate { relation, .. } = f.kind() {
                out.insert(relation.clone());
            }
        });
        out
    }

    /// Entity ids mentioned anywhere in the formula.
    pub fn entities(&self) -> BTreeSet<EntityId> {
        let mut out = BTreeSet::new();
        self.visit(&mut |f| {
            if let FormulaKind::EntityConstant(id) = f.kind() {
                out.insert(id.clone());
            }
        });
        out
    }

    /// Pre-order traversal.
    pub fn visit(&self, f: &mut impl FnMut(&Formula)) {
        f(self);
        match self.kind() {
            FormulaKind::Variable(_)
            | FormulaKind::EntityConstant(_)
            | FormulaKind::LiteralConstant(_) => {}
            FormulaKind::Predicate { args: parts, .. }
            | FormulaKind::And(parts)
            | FormulaKind::Or(parts) => {
                for part in parts {
                    part.visit(f);
                }
            }
            FormulaKind::Not(inner) => inner.visit(f),
            FormulaKind::Exists { body, .. } | FormulaKind::Aggregate { body, .. } => body.visit(f),
            FormulaKind::Compare { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
        }
    }

    // ========================================================================
    // Substitution
    // ========================================================================

    /// Replace the free occurrences of `var` by the term `replacement`.
    ///
    /// Returns a structural copy; `self` is untouched. Quantifiers binding
    /// `var` shadow it. A binder that would capture a variable of
    /// `replacement` is renamed first.
    pub fn substitute(&self, var: &Variable, replacement: &Formula) -> Result<Self, FormulaError> {
        replacement.term_type()?;
        Ok(self.substitute_term(var, replacement))
    }

    fn substitute_term(&self, var: &Variable, replacement: &Formula) -> Self {
        match self.kind() {
            FormulaKind::Variable(v) if v == var => replacement.clone(),
            FormulaKind::Variable(_)
            | FormulaKind::EntityConstant(_)
            | FormulaKind::LiteralConstant(_) => self.clone(),
            FormulaKind::Predicate { relation, args } => Self::from_kind(FormulaKind::Predicate {
                relation: relation.clone(),
                args: args
                    .iter()
                    .map(|a| a.substitute_term(var, replacement))
                    .collect(),
            }),
            FormulaKind::And(parts) => Self::rebuild(
                Connective::And,
                parts
                    .iter()
                    .map(|p| p.substitute_term(var, replacement))
                    .collect(),
            ),
            FormulaKind::Or(parts) => Self::rebuild(
                Connective::Or,
                parts
                    .iter()
                    .map(|p| p.substitute_term(var, replacement))
                    .collect(),
            ),
            FormulaKind::Not(inner) => Self::from_kind(FormulaKind::Not(
                inner.substitute_term(var, replacement),
            )),
            FormulaKind::Compare { op, lhs, rhs } => Self::from_kind(FormulaKind::Compare {
                op: *op,
                lhs: lhs.substitute_term(var, replacement),
                rhs: rhs.substitute_term(var, replacement),
            }),
            FormulaKind::Exists { var: bound, body } => {
                let (bound, body) = Self::substitute_under_binder(bound, body, var, replacement);
                Self::from_kind(FormulaKind::Exists { var: bound, body })
            }
            FormulaKind::Aggregate {
                op,
                var: bound,
                body,
            } => {
                let (bound, body) = Self::substitute_under_binder(bound, body, var, replacement);
                Self::from_kind(FormulaKind::Aggregate {
                    op: *op,
                    var: bound,
                    body,
                })
            }
        }
    }

    fn substitute_under_binder(
        bound: &Variable,
        body: &Formula,
        var: &Variable,
        replacement: &Formula,
    ) -> (Variable, Formula) {
        if bound == var {
            return (bound.clone(), body.clone());
        }
        let captured = replacement.as_variable() == Some(bound);
        if captured && body.free_variables().contains(var) {
            let fresh = fresh_variable(bound, &body.free_variables(), replacement);
            let renamed = body.substitute_term(bound, &Formula::variable(fresh.clone()));
            return (fresh, renamed.substitute_term(var, replacement));
        }
        (bound.clone(), body.substitute_term(var, replacement))
    }

    /// Rename every variable through `mapping` and rebuild connectives in
    /// normal form. Variables without a mapping are kept.
    pub(crate) fn rename_variables(
        &self,
        mapping: &mut dyn FnMut(&Variable, usize) -> Option<Variable>,
        depth: usize,
        scope: &mut Vec<(Variable, Variable)>,
    ) -> Self {
        match self.kind() {
            FormulaKind::Variable(v) => {
                let renamed = scope
                    .iter()
                    .rev()
                    .find(|(from, _)| from == v)
                    .map(|(_, to)| to.clone())
                    .or_else(|| mapping(v, depth))
                    .unwrap_or_else(|| v.clone());
                Self::variable(renamed)
            }
            FormulaKind::EntityConstant(_) | FormulaKind::LiteralConstant(_) => self.clone(),
            FormulaKind::Predicate { relation, args } => Self::from_kind(FormulaKind::Predicate {
                relation: relation.clone(),
                args: args
                    .iter()
                    .map(|a| a.rename_variables(mapping, depth, scope))
                    .collect(),
            }),
            FormulaKind::And(parts) => {
                let renamed: Vec<_> = parts
                    .iter()
                    .map(|p| p.rename_variables(mapping, depth, scope))
                    .collect();
                Self::rebuild(Connective::And, renamed)
            }
            FormulaKind::Or(parts) => {
                let renamed: Vec<_> = parts
                    .iter()
                    .map(|p| p.rename_variables(mapping, depth, scope))
                    .collect();
                Self::rebuild(Connective::Or, renamed)
            }
            FormulaKind::Not(inner) => Self::from_kind(FormulaKind::Not(
                inner.rename_variables(mapping, depth, scope),
            )),
            FormulaKind::Compare { op, lhs, rhs } => Self::from_kind(FormulaKind::Compare {
                op: *op,
                lhs: lhs.rename_variables(mapping, depth, scope),
                rhs: rhs.rename_variables(mapping, depth, scope),
            }),
            FormulaKind::Exists { var, body } => {
                let bound = Variable::new(format!("v{}", depth + 1));
                scope.push((var.clone(), bound.clone()));
                let body = body.rename_variables(mapping, depth + 1, scope);
                scope.pop();
                Self::from_kind(FormulaKind::Exists { var: bound, body })
            }
            FormulaKind::Aggregate { op, var, body } => {
                let bound = Variable::new(format!("v{}", depth + 1));
                scope.push((var.clone(), bound.clone()));
                let body = body.rename_variables(mapping, depth + 1, scope);
                scope.pop();
                Self::from_kind(FormulaKind::Aggregate {
                    op: *op,
                    var: bound,
                    body,
                })
            }
        }
    }

    /// Re-normalize a connective whose operands were rewritten.
    fn rebuild(kind: Connective, parts: Vec<Formula>) -> Self {
        Self::assemble(kind, Self::flatten(kind, parts))
    }
}

fn fresh_variable(base: &Variable, taken: &BTreeSet<Variable>, replacement: &Formula) -> Variable {
    let mut n = 1usize;
    loop {
        let candidate = Variable::new(format!("{}_{}", base.as_str(), n));
        if !taken.contains(&candidate) && replacement.as_variable() != Some(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            FormulaKind::Variable(v) => write!(f, "{v}"),
            FormulaKind::EntityConstant(id) => write!(f, "{id}"),
            FormulaKind::LiteralConstant(l) => write!(f, "{l}"),
            FormulaKind::Predicate { relation, args } => {
                write!(f, "{relation}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            FormulaKind::And(parts) => write_joined(f, parts, " ∧ "),
            FormulaKind::Or(parts) => write_joined(f, parts, " ∨ "),
            FormulaKind::Not(inner) => write!(f, "¬{inner}"),
            FormulaKind::Exists { var, body } => write!(f, "∃{var}.{body}"),
            FormulaKind::Compare { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.symbol()),
            FormulaKind::Aggregate { op, var, body } => write!(f, "{}{var}.{body}", op.name()),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Formula], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{part}")?;
    }
    f.write_str(")")
}
