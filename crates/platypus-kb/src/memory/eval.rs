//! Naive evaluation of formulas over an in-memory fact table.
//!
//! Evaluation threads a list of variable environments through the formula:
//! predicates join against matching facts, conjunctions run their binding
//! operands before their filters, disjunctions take the union. The
//! deadline is checked in every loop whose length grows with the data; on
//! expiry the answers that are already certain are handed back as partial
//! results.
//!
//! Environments that reach the top of the query are final answers. There,
//! enumeration stops as soon as [`Goal::limit`] distinct answer values are
//! known.

use super::Fact;
use crate::connector::{Deadline, Value};
use platypus_formula::{CompareOp, Formula, FormulaKind, RelationId, Variable};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub(crate) type Env = BTreeMap<Variable, Value>;

const DEADLINE_CHECK_INTERVAL: usize = 128;

#[derive(Debug)]
pub(crate) enum EvalError {
    /// Out of time. The environments are sound answers found so far.
    Interrupted(Vec<Env>),
    Unsupported(String),
}

/// Stop enumerating final answers once `limit` distinct values of `answer`
/// are known.
#[derive(Debug, Clone)]
pub(crate) struct Goal {
    pub answer: Variable,
    pub limit: usize,
}

pub(crate) struct Evaluator<'a> {
    pub facts: &'a HashMap<RelationId, Vec<Fact>>,
    pub deadline: Deadline,
    pub goal: Option<Goal>,
    pub steps: usize,
}

/// Deduplicated environments in insertion order.
struct Output<'g> {
    envs: Vec<Env>,
    seen: HashSet<Env>,
    goal: Option<&'g Goal>,
    answers: HashSet<Value>,
}

impl<'g> Output<'g> {
    fn new(goal: Option<&'g Goal>) -> Self {
        Self {
            envs: Vec::new(),
            seen: HashSet::new(),
            goal,
            answers: HashSet::new(),
        }
    }

    fn push(&mut self, env: Env) {
        if self.seen.contains(&env) {
            return;
        }
        if let Some(value) = self.goal.and_then(|g| env.get(&g.answer)) {
            self.answers.insert(value.clone());
        }
        self.seen.insert(env.clone());
        self.envs.push(env);
    }

    fn is_full(&self) -> bool {
        self.goal.is_some_and(|g| self.answers.len() >= g.limit)
    }

    fn into_envs(self) -> Vec<Env> {
        self.envs
    }
}

impl Evaluator<'_> {
    /// Evaluate the query body; its environments are the final answers.
    pub fn eval_query(&mut self, body: &Formula) -> Result<Vec<Env>, EvalError> {
        self.eval(body, vec![Env::new()], true)
    }

    /// Evaluate without a goal, for aggregates that need every value.
    pub fn eval_all(&mut self, body: &Formula) -> Result<Vec<Env>, EvalError> {
        self.eval(body, vec![Env::new()], false)
    }

    fn eval(&mut self, f: &Formula, input: Vec<Env>, top: bool) -> Result<Vec<Env>, EvalError> {
        match f.kind() {
            FormulaKind::Predicate { relation, args } => {
                self.predicate(relation, args, input, top)
            }
            FormulaKind::And(parts) => self.conjunction(parts, input, top),
            FormulaKind::Or(parts) => {
                let goal = self.goal.clone();
                let mut out = Output::new(goal.as_ref().filter(|_| top));
                for part in parts {
                    match self.eval(part, input.clone(), top) {
                        Ok(envs) => {
                            for env in envs {
                                self.tick(&out.envs)?;
                                out.push(env);
                            }
                        }
                        Err(EvalError::Interrupted(partial)) => {
                            for env in partial {
                                out.push(env);
                            }
                            return Err(EvalError::Interrupted(out.into_envs()));
                        }
                        Err(e) => return Err(e),
                    }
                    if out.is_full() {
                        break;
                    }
                }
                Ok(out.into_envs())
            }
            FormulaKind::Not(inner) => {
                let goal = self.goal.clone();
                let mut out = Output::new(goal.as_ref().filter(|_| top));
                for env in input {
                    self.tick(&out.envs)?;
                    match self.eval(inner, vec![env.clone()], false) {
                        Ok(found) if found.is_empty() => out.push(env),
                        Ok(_) => {}
                        Err(EvalError::Interrupted(_)) => {
                            return Err(EvalError::Interrupted(out.into_envs()))
                        }
                        Err(e) => return Err(e),
                    }
                    if out.is_full() {
                        break;
                    }
                }
                Ok(out.into_envs())
            }
            FormulaKind::Exists { var, body } => self.exists(var, body, input, top),
            FormulaKind::Compare { op, lhs, rhs } => self.compare(*op, lhs, rhs, input, top),
            FormulaKind::Aggregate { .. } => Err(EvalError::Unsupported(
                "aggregate below the top of the query".to_string(),
            )),
            FormulaKind::Variable(_)
            | FormulaKind::EntityConstant(_)
            | FormulaKind::LiteralConstant(_) => {
                Err(EvalError::Unsupported(format!("bare term {f}")))
            }
        }
    }

    fn tick(&mut self, found: &[Env]) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 && self.deadline.is_expired() {
            return Err(EvalError::Interrupted(found.to_vec()));
        }
        Ok(())
    }

    fn predicate(
        &mut self,
        relation: &RelationId,
        args: &[Formula],
        input: Vec<Env>,
        top: bool,
    ) -> Result<Vec<Env>, EvalError> {
        let Some(facts) = self.facts.get(relation) else {
            return Ok(Vec::new());
        };
        let goal = self.goal.clone();
        let mut out = Output::new(goal.as_ref().filter(|_| top));
        for env in &input {
            for fact in facts {
                self.tick(&out.envs)?;
                if fact.args.len() != args.len() {
                    continue;
                }
                if let Some(extended) = unify(env, args, &fact.args) {
                    out.push(extended);
                    if out.is_full() {
                        return Ok(out.into_envs());
                    }
                }
            }
        }
        Ok(out.into_envs())
    }

    fn exists(
        &mut self,
        var: &Variable,
        body: &Formula,
        input: Vec<Env>,
        top: bool,
    ) -> Result<Vec<Env>, EvalError> {
        // binding the answer variable hides it from the goal
        let top = top && self.goal.as_ref().is_some_and(|g| g.answer != *var);
        let goal = self.goal.clone();
        let mut out = Output::new(goal.as_ref().filter(|_| top));
        for env in input {
            let outer = env.get(var).cloned();
            let mut inner_env = env;
            inner_env.remove(var);
            let project = |mut e: Env| {
                e.remove(var);
                if let Some(v) = &outer {
                    e.insert(var.clone(), v.clone());
                }
                e
            };
            match self.eval(body, vec![inner_env], top) {
                Ok(envs) => {
                    for env in envs {
                        self.tick(&out.envs)?;
                        out.push(project(env));
                        if out.is_full() {
                            return Ok(out.into_envs());
                        }
                    }
                }
                Err(EvalError::Interrupted(partial)) => {
                    for env in partial {
                        out.push(project(env));
                    }
                    return Err(EvalError::Interrupted(out.into_envs()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out.into_envs())
    }

    fn conjunction(
        &mut self,
        parts: &[Formula],
        input: Vec<Env>,
        top: bool,
    ) -> Result<Vec<Env>, EvalError> {
        let mut bound: BTreeSet<Variable> = input
            .first()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        let mut pending: Vec<&Formula> = parts.iter().collect();
        let mut envs = input;

        while !pending.is_empty() {
            if envs.is_empty() {
                return Ok(envs);
            }
            let next = pending
                .iter()
                .position(|p| is_ready(p, &bound))
                .unwrap_or(0);
            let part = pending.remove(next);
            let last = pending.is_empty();
            envs = match self.eval(part, envs, top && last) {
                Ok(envs) => envs,
                // the last operand produces answers; earlier ones do not
                Err(EvalError::Interrupted(partial)) if last => {
                    return Err(EvalError::Interrupted(partial))
                }
                Err(EvalError::Interrupted(_)) => return Err(EvalError::Interrupted(Vec::new())),
                Err(e) => return Err(e),
            };
            bound.extend(part.free_variables());
        }
        Ok(envs)
    }

    fn compare(
        &mut self,
        op: CompareOp,
        lhs: &Formula,
        rhs: &Formula,
        input: Vec<Env>,
        top: bool,
    ) -> Result<Vec<Env>, EvalError> {
        let goal = self.goal.clone();
        let mut out = Output::new(goal.as_ref().filter(|_| top));
        for mut env in input {
            self.tick(&out.envs)?;
            match (resolve(lhs, &env), resolve(rhs, &env)) {
                (Some(a), Some(b)) => {
                    if compare_values(op, &a, &b) {
                        out.push(env);
                    }
                }
                (None, Some(value)) if op == CompareOp::Eq => {
                    if let Some(var) = lhs.as_variable() {
                        env.insert(var.clone(), value);
                        out.push(env);
                    }
                }
                (Some(value), None) if op == CompareOp::Eq => {
                    if let Some(var) = rhs.as_variable() {
                        env.insert(var.clone(), value);
                        out.push(env);
                    }
                }
                _ => {
                    return Err(EvalError::Unsupported(format!(
                        "comparison {lhs} {} {rhs} over unbound variables",
                        op.symbol()
                    )))
                }
            }
            if out.is_full() {
                break;
            }
        }
        Ok(out.into_envs())
    }
}

/// Binding operands first; filters once their variables are bound.
fn is_ready(f: &Formula, bound: &BTreeSet<Variable>) -> bool {
    match f.kind() {
        FormulaKind::Compare { op, lhs, rhs } => {
            let unbound = f
                .free_variables()
                .into_iter()
                .filter(|v| !bound.contains(v))
                .count();
            unbound == 0
                || (*op == CompareOp::Eq
                    && unbound == 1
                    && (lhs.as_variable().is_some() != rhs.as_variable().is_some()))
        }
        FormulaKind::Not(_) => f.free_variables().is_subset(bound),
        _ => true,
    }
}

fn resolve(term: &Formula, env: &Env) -> Option<Value> {
    match term.kind() {
        FormulaKind::Variable(v) => env.get(v).cloned(),
        FormulaKind::EntityConstant(id) => Some(Value::Entity(id.clone())),
        FormulaKind::LiteralConstant(l) => Some(Value::Literal(l.clone())),
        _ => None,
    }
}

fn unify(env: &Env, pattern: &[Formula], values: &[Value]) -> Option<Env> {
    let mut out = env.clone();
    for (term, value) in pattern.iter().zip(values) {
        match term.kind() {
            FormulaKind::Variable(v) => match out.get(v) {
                Some(existing) if !existing.same_as(value) => return None,
                Some(_) => {}
                None => {
                    out.insert(v.clone(), value.clone());
                }
            },
            _ => {
                let constant = resolve(term, env)?;
                if !constant.same_as(value) {
                    return None;
                }
            }
        }
    }
    Some(out)
}

pub(crate) fn compare_values(op: CompareOp, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Literal(x), Value::Literal(y)) => match x.semantic_cmp(y) {
            Some(ordering) => op.holds(ordering),
            None => op == CompareOp::Ne && x != y,
        },
        _ => match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => false,
        },
    }
}
