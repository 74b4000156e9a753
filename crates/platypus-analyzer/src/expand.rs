//! Expansion: templates × slot alternatives → scored candidates.
//!
//! Alternatives are combined with a bounded odometer (last slot varies
//! fastest). Each combination is instantiated through the validated
//! formula constructors; combinations they reject, or whose variables get
//! contradictory types from the relations around them, are dropped.

use crate::candidate::{Candidate, ChoiceKind, Provenance, SlotChoice};
use crate::policy::AnalyzerPolicy;
use crate::resolve::{Alternative, Resolutions};
use crate::template::{Orientation, Shape, SlotId, SlotTable, Template};
use platypus_formula::{
    AggregateOp, CompareOp, Formula, FormulaError, Query, Relation, ValueType, Variable,
};
use platypus_kb::LookupError;
use std::collections::{BTreeMap, HashMap};

const ANSWER: &str = "x";

/// Expand one template. Fails when one of its slots failed to resolve.
///
/// `type_relations` are the knowledge base's links from a thing to its
/// classes; class restrictions are dropped when there are none.
pub fn expand_template(
    template: &Template,
    slots: &SlotTable,
    resolutions: &Resolutions,
    type_relations: &[Relation],
    policy: &AnalyzerPolicy,
) -> Result<Vec<Candidate>, LookupError> {
    let ids = template.shape.slots();
    let mut options: Vec<&[Alternative]> = Vec::with_capacity(ids.len());
    for id in &ids {
        match resolutions.get(*id) {
            Some(Ok(alternatives)) => options.push(alternatives),
            Some(Err(error)) => return Err(error.clone()),
            None => return Err(LookupError::Unavailable(format!("slot {id} was not resolved"))),
        }
    }
    if options.iter().any(|o| o.is_empty()) {
        return Ok(Vec::new());
    }

    let weight = policy.scoring.rule_weight(template.rule);
    let mut candidates = Vec::new();
    let mut odometer = vec![0usize; ids.len()];
    for _ in 0..policy.max_expansions {
        let choice: HashMap<SlotId, &Alternative> = ids
            .iter()
            .zip(&odometer)
            .zip(&options)
            .map(|((id, i), alternatives)| (*id, &alternatives[*i]))
            .collect();

        match Instantiation::new(&choice, type_relations).run(template) {
            Ok(Some((query, wellformed))) => {
                let slot_confidence: f64 = ids
                    .iter()
                    .filter_map(|id| choice.get(id))
                    .map(|a| a.confidence())
                    .product();
                let bonus = if wellformed {
                    1.0 + policy.scoring.wellformed_bonus
                } else {
                    1.0
                };
                let confidence =
                    (weight * slot_confidence * bonus * template.penalty).clamp(0.0, 1.0);
                candidates.push(Candidate {
                    query: query.canonical(),
                    confidence,
                    provenance: Provenance {
                        rule: template.rule,
                        priority: template.rule.priority(),
                        choices: ids
                            .iter()
                            .filter_map(|id| Some(slot_choice(slots, *id, choice.get(id)?)))
                            .collect(),
                    },
                });
            }
            Ok(None) => {}
            Err(rejection) => {
                tracing::trace!(rule = %template.rule, %rejection, "combination rejected");
            }
        }

        if !advance(&mut odometer, &options) {
            break;
        }
    }
    Ok(candidates)
}

/// Step to the next combination; false once all were visited.
fn advance(odometer: &mut [usize], options: &[&[Alternative]]) -> bool {
    for position in (0..odometer.len()).rev() {
        odometer[position] += 1;
        if odometer[position] < options[position].len() {
            return true;
        }
        odometer[position] = 0;
    }
    false
}

fn slot_choice(slots: &SlotTable, id: SlotId, alternative: &Alternative) -> SlotChoice {
    SlotChoice {
        surface: slots.get(id).map(|s| s.surface.clone()).unwrap_or_default(),
        kind: match alternative {
            Alternative::Entity(_) => ChoiceKind::Entity,
            Alternative::Relation(_) => ChoiceKind::Relation,
            Alternative::Literal { .. } => ChoiceKind::Literal,
        },
        chosen: alternative.id(),
        label: alternative.label(),
        confidence: alternative.confidence(),
    }
}

// ============================================================================
// Instantiation
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("slot {0} has no usable alternative")]
    Slot(SlotId),
    #[error("comparison with a non-constant")]
    NonConstantComparison,
    #[error("count below the top of the question")]
    NestedCount,
    #[error("variable {0} has contradictory types")]
    IllTyped(Variable),
    #[error("class restriction without a type relation")]
    NoTypeRelation,
}

/// Builds one query from one combination of alternatives, tracking the
/// types each variable is constrained to.
struct Instantiation<'c> {
    choice: &'c HashMap<SlotId, &'c Alternative>,
    type_relations: &'c [Relation],
    fresh: usize,
    constraints: BTreeMap<Variable, Vec<ValueType>>,
}

impl<'c> Instantiation<'c> {
    fn new(choice: &'c HashMap<SlotId, &'c Alternative>, type_relations: &'c [Relation]) -> Self {
        Self {
            choice,
            type_relations,
            fresh: 0,
            constraints: BTreeMap::new(),
        }
    }

    /// The query and whether every typed position agrees. `None` when the
    /// property wrapper is redundant for this combination.
    fn run(mut self, template: &Template) -> Result<Option<(Query, bool)>, Rejection> {
        let answer = Variable::new(ANSWER);
        let subject = Formula::variable(answer.clone());

        let (body, answer_type) = match &template.shape {
            Shape::Count(inner) => {
                let body = self.formula(inner, &subject)?;
                (
                    Formula::aggregate(AggregateOp::Count, answer.clone(), body)?,
                    ValueType::number(),
                )
            }
            Shape::Property { property, inner } if template.expected.is_some() => {
                let expected = template.expected.map(ValueType::of).unwrap_or_default();
                let (body, thing) = self.property(*property, inner, &subject)?;
                let thing_type = self.type_of(&thing);
                if !thing_type.is_top() && thing_type.is_subtype_of(expected) {
                    return Ok(None);
                }
                (body, self.type_of(&answer))
            }
            shape => {
                let body = self.formula(shape, &subject)?;
                (body, self.type_of(&answer))
            }
        };

        let mut wellformed = true;
        for (var, types) in &self.constraints {
            let combined = types
                .iter()
                .fold(ValueType::top(), |acc, t| acc.intersection(*t));
            if combined.is_bottom() {
                return Err(Rejection::IllTyped(var.clone()));
            }
            let typed: Vec<&ValueType> = types.iter().filter(|t| !t.is_top()).collect();
            if typed.windows(2).any(|w| w[0] != w[1]) {
                wellformed = false;
            }
        }
        if answer_type.is_top() {
            wellformed = false;
        }
        if let Some(kind) = template.expected {
            wellformed &= answer_type.is_subtype_of(ValueType::of(kind));
        }

        let query = Query::new(answer, body)?;
        Ok(Some((query, wellformed)))
    }

    fn next_variable(&mut self, prefix: &str) -> Variable {
        self.fresh += 1;
        Variable::new(format!("{prefix}{}", self.fresh))
    }

    fn type_of(&self, var: &Variable) -> ValueType {
        self.constraints
            .get(var)
            .into_iter()
            .flatten()
            .fold(ValueType::top(), |acc, t| acc.intersection(*t))
    }

    fn constrain(&mut self, term: &Formula, value_type: ValueType) {
        if let Some(var) = term.as_variable() {
            self.constraints
                .entry(var.clone())
                .or_default()
                .push(value_type);
        }
    }

    fn alternative(&self, id: SlotId) -> Result<&'c Alternative, Rejection> {
        self.choice.get(&id).copied().ok_or(Rejection::Slot(id))
    }

    fn relation(&self, id: SlotId) -> Result<&'c Relation, Rejection> {
        self.alternative(id)?.as_relation().ok_or(Rejection::Slot(id))
    }

    fn constant(&self, shape: &Shape) -> Result<Formula, Rejection> {
        match shape {
            Shape::Entity(id) => match self.alternative(*id)? {
                Alternative::Entity(e) => Ok(Formula::entity(e.id.clone())),
                _ => Err(Rejection::Slot(*id)),
            },
            Shape::Literal(id) => match self.alternative(*id)? {
                Alternative::Literal { value, .. } => Ok(Formula::literal(value.clone())),
                _ => Err(Rejection::Slot(*id)),
            },
            _ => Err(Rejection::NonConstantComparison),
        }
    }

    fn predicate(&mut self, relation: &Relation, args: Vec<Formula>) -> Result<Formula, Rejection> {
        for (position, arg) in args.iter().enumerate() {
            self.constrain(arg, relation.argument_type(position));
        }
        Ok(Formula::predicate(relation, args)?)
    }

    /// The formula saying `subject` is described by `shape`.
    fn formula(&mut self, shape: &Shape, subject: &Formula) -> Result<Formula, Rejection> {
        match shape {
            Shape::Entity(_) | Shape::Literal(_) => {
                let constant = self.constant(shape)?;
                self.constrain(subject, constant.term_type()?);
                Ok(Formula::compare(CompareOp::Eq, subject.clone(), constant)?)
            }
            Shape::Relation {
                relation,
                orientation,
                argument,
            } => {
                let relation = self.relation(*relation)?;
                let (term, bound) = if argument.is_constant() {
                    (self.constant(argument)?, None)
                } else {
                    let var = self.next_variable("a");
                    (Formula::variable(var.clone()), Some(var))
                };
                let args = match orientation {
                    Orientation::Subject => vec![term.clone(), subject.clone()],
                    Orientation::Object => vec![subject.clone(), term.clone()],
                };
                let atom = self.predicate(relation, args)?;
                match bound {
                    None => Ok(atom),
                    Some(var) => {
                        let inner = self.formula(argument, &term)?;
                        Ok(Formula::exists(var, Formula::and(vec![atom, inner])?))
                    }
                }
            }
            Shape::Compare {
                relation,
                op,
                argument,
            } => {
                let relation = self.relation(*relation)?;
                let constant = self.constant(argument)?;
                let var = self.next_variable("v");
                let value = Formula::variable(var.clone());
                let atom = self.predicate(relation, vec![subject.clone(), value.clone()])?;
                let mut value_type = constant.term_type()?;
                if op.is_ordering() {
                    value_type = value_type.intersection(ValueType::orderable());
                }
                self.constrain(&value, value_type);
                let comparison = Formula::compare(*op, value, constant)?;
                Ok(Formula::exists(var, Formula::and(vec![atom, comparison])?))
            }
            Shape::And(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| self.formula(part, subject))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Formula::and(parts)?)
            }
            Shape::Typed(class) => {
                let class = self.constant(&Shape::Entity(*class))?;
                let type_relations = self.type_relations;
                let mut restrictions = Vec::with_capacity(type_relations.len());
                for relation in type_relations {
                    restrictions.push(self.predicate(relation, vec![subject.clone(), class.clone()])?);
                }
                if restrictions.is_empty() {
                    return Err(Rejection::NoTypeRelation);
                }
                Ok(Formula::or(restrictions)?)
            }
            Shape::Property { property, inner } => {
                Ok(self.property(*property, inner, subject)?.0)
            }
            Shape::Count(_) => Err(Rejection::NestedCount),
        }
    }

    /// `∃t. property(t, subject) ∧ inner(t)`, and the variable `t`.
    fn property(
        &mut self,
        property: SlotId,
        inner: &Shape,
        subject: &Formula,
    ) -> Result<(Formula, Variable), Rejection> {
        let relation = self.relation(property)?;
        let var = self.next_variable("t");
        let thing = Formula::variable(var.clone());
        let atom = self.predicate(relation, vec![thing.clone(), subject.clone()])?;
        let inner = self.formula(inner, &thing)?;
        Ok((Formula::exists(var.clone(), Formula::and(vec![atom, inner])?), var))
    }
}
