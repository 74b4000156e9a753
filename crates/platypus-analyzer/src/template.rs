//! Templates: formulas with unresolved slots.
//!
//! A [`Shape`] describes a set of things, the way `λx. φ(x)` does, with
//! the entities, relations and literals still given as question spans:
//!
//! ```text
//! "capital of France"
//!     Relation { relation: #0 "capital", Subject, argument: Entity(#1 "France") }
//!                  │ resolve #0 → P36, #1 → Q142
//!                  ▼
//!     λ?x. P36(Q142, ?x)
//! ```
//!
//! Slots live in a per-analysis [`SlotTable`]; equal slots are shared so a
//! span is looked up once however many templates mention it.

use crate::grammar::RuleKind;
use platypus_formula::{CompareOp, Literal, ValueKind, ValueType};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;

pub type SlotId = usize;

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// An entity, of type `expected` when the grammar knows it.
    Entity { expected: Option<ValueType> },
    /// A relation whose subject and object accept the given types.
    Relation {
        subject: Option<ValueType>,
        object: Option<ValueType>,
    },
    /// Parsed locally, no lookup needed.
    Literal(Vec<Literal>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub kind: SlotKind,
    /// The question text the slot stands for.
    pub surface: String,
    /// Strings looked up for this slot. Results of all keys are merged.
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Entity {
        expected: Option<ValueType>,
    },
    Relation {
        subject: Option<ValueType>,
        object: Option<ValueType>,
    },
}

/// One distinct knowledge-base lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LookupKey {
    pub kind: LookupKind,
    pub text: String,
}

impl Slot {
    pub fn lookup_keys(&self) -> Vec<LookupKey> {
        let kind = match self.kind {
            SlotKind::Entity { expected } => LookupKind::Entity { expected },
            SlotKind::Relation { subject, object } => LookupKind::Relation { subject, object },
            SlotKind::Literal(_) => return Vec::new(),
        };
        self.keys
            .iter()
            .map(|text| LookupKey {
                kind,
                text: text.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&mut self, surface: &str) -> SlotId {
        self.intern(Slot {
            kind: SlotKind::Entity { expected: None },
            surface: surface.to_string(),
            keys: vec![surface.to_string()],
        })
    }

    /// An entity naming a class ("city" in "which city").
    pub fn class(&mut self, surface: &str) -> SlotId {
        self.intern(Slot {
            kind: SlotKind::Entity {
                expected: Some(ValueType::entity()),
            },
            surface: surface.to_string(),
            keys: vec![surface.to_string()],
        })
    }

    /// A relation slot looked up under every key. Keys are deduplicated,
    /// first occurrence wins.
    pub fn relation(&mut self, surface: &str, keys: impl IntoIterator<Item = String>) -> SlotId {
        let mut unique = Vec::new();
        for key in keys {
            if !key.is_empty() && !unique.contains(&key) {
                unique.push(key);
            }
        }
        self.intern(Slot {
            kind: SlotKind::Relation {
                subject: None,
                object: None,
            },
            surface: surface.to_string(),
            keys: unique,
        })
    }

    pub fn literal(&mut self, surface: &str, values: Vec<Literal>) -> SlotId {
        self.intern(Slot {
            kind: SlotKind::Literal(values),
            surface: surface.to_string(),
            keys: Vec::new(),
        })
    }

    /// The slot `id` with its kind narrowed by `narrow`, interned as a
    /// slot of its own.
    fn narrowed(&mut self, id: SlotId, narrow: impl FnOnce(&mut SlotKind)) -> SlotId {
        let Some(mut slot) = self.get(id).cloned() else {
            return id;
        };
        narrow(&mut slot.kind);
        self.intern(slot)
    }

    /// `shape` with the slots that describe the thing itself restricted
    /// to `answer`: the entity it is, the end of the relation it fills.
    /// Nested arguments are left alone.
    pub fn expect_answer(&mut self, shape: Shape, answer: ValueType) -> Shape {
        let object_is = |kind: &mut SlotKind| {
            if let SlotKind::Relation { object, .. } = kind {
                *object = Some(answer);
            }
        };
        let subject_is = |kind: &mut SlotKind| {
            if let SlotKind::Relation { subject, .. } = kind {
                *subject = Some(answer);
            }
        };
        match shape {
            Shape::Entity(id) => Shape::Entity(self.narrowed(id, |kind| {
                if let SlotKind::Entity { expected } = kind {
                    *expected = Some(answer);
                }
            })),
            Shape::Relation {
                relation,
                orientation,
                argument,
            } => {
                let relation = match orientation {
                    Orientation::Subject => self.narrowed(relation, object_is),
                    Orientation::Object => self.narrowed(relation, subject_is),
                };
                Shape::Relation {
                    relation,
                    orientation,
                    argument,
                }
            }
            Shape::Compare {
                relation,
                op,
                argument,
            } => Shape::Compare {
                relation: self.narrowed(relation, subject_is),
                op,
                argument,
            },
            Shape::Property { property, inner } => Shape::Property {
                property: self.narrowed(property, object_is),
                inner,
            },
            Shape::And(parts) => Shape::And(
                parts
                    .into_iter()
                    .map(|part| self.expect_answer(part, answer))
                    .collect(),
            ),
            shape @ (Shape::Literal(_) | Shape::Typed(_) | Shape::Count(_)) => shape,
        }
    }

    fn intern(&mut self, slot: Slot) -> SlotId {
        if let Some(id) = self.slots.iter().position(|s| *s == slot) {
            return id;
        }
        self.slots.push(slot);
        self.slots.len() - 1
    }

    pub fn get(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Slot)> {
        self.slots.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every distinct lookup needed by the given slots.
    pub fn lookups(&self, ids: impl IntoIterator<Item = SlotId>) -> BTreeSet<LookupKey> {
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .flat_map(Slot::lookup_keys)
            .collect()
    }

    fn surface(&self, id: SlotId) -> &str {
        self.get(id).map_or("?", |s| s.surface.as_str())
    }
}

// ============================================================================
// Shapes
// ============================================================================

/// Which end of a binary relation the argument fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// `rel(arg, x)`
    Subject,
    /// `rel(x, arg)`
    Object,
}

/// A description of the things a question span denotes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// The thing is this entity.
    Entity(SlotId),
    /// The thing is this literal.
    Literal(SlotId),
    /// The thing is related to something described by `argument`.
    Relation {
        relation: SlotId,
        orientation: Orientation,
        argument: Box<Shape>,
    },
    /// The thing has a `relation` value comparing with `argument`.
    Compare {
        relation: SlotId,
        op: CompareOp,
        argument: Box<Shape>,
    },
    And(Vec<Shape>),
    /// The thing is an instance of the class named by the slot, through
    /// any type relation of the knowledge base ("current" in "the current
    /// capital").
    Typed(SlotId),
    /// The thing is the `property` of something described by `inner`
    /// ("where" → the location of).
    Property { property: SlotId, inner: Box<Shape> },
    /// The number of things described by `inner`. Only valid at the top.
    Count(Box<Shape>),
}

impl Shape {
    pub fn relation(relation: SlotId, orientation: Orientation, argument: Shape) -> Self {
        Shape::Relation {
            relation,
            orientation,
            argument: Box::new(argument),
        }
    }

    pub fn compare(relation: SlotId, op: CompareOp, argument: Shape) -> Self {
        Shape::Compare {
            relation,
            op,
            argument: Box::new(argument),
        }
    }

    pub fn property(property: SlotId, inner: Shape) -> Self {
        Shape::Property {
            property,
            inner: Box::new(inner),
        }
    }

    pub fn count(inner: Shape) -> Self {
        Shape::Count(Box::new(inner))
    }

    /// Conjunction, flattening nested ones. A single part is returned as is.
    pub fn all(parts: Vec<Shape>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Shape::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Shape::And(flat)
        }
    }

    /// Whether the shape is a single constant usable in argument position.
    pub fn is_constant(&self) -> bool {
        matches!(self, Shape::Entity(_) | Shape::Literal(_))
    }

    /// Slots mentioned, in first-occurrence order.
    pub fn slots(&self) -> Vec<SlotId> {
        let mut out = Vec::new();
        self.collect_slots(&mut out);
        out
    }

    fn collect_slots(&self, out: &mut Vec<SlotId>) {
        let push = |id: SlotId, out: &mut Vec<SlotId>| {
            if !out.contains(&id) {
                out.push(id);
            }
        };
        match self {
            Shape::Entity(s) | Shape::Literal(s) | Shape::Typed(s) => push(*s, out),
            Shape::Relation {
                relation, argument, ..
            }
            | Shape::Compare {
                relation, argument, ..
            } => {
                push(*relation, out);
                argument.collect_slots(out);
            }
            Shape::And(parts) => parts.iter().for_each(|p| p.collect_slots(out)),
            Shape::Property { property, inner } => {
                push(*property, out);
                inner.collect_slots(out);
            }
            Shape::Count(inner) => inner.collect_slots(out),
        }
    }

    /// Readable form with slot surfaces, for logs and the CLI.
    pub fn describe(&self, slots: &SlotTable) -> String {
        let mut out = String::new();
        self.write_to(slots, "x", &mut 0, &mut out);
        out
    }

    fn write_to(&self, slots: &SlotTable, subject: &str, fresh: &mut usize, out: &mut String) {
        match self {
            Shape::Entity(s) | Shape::Literal(s) => {
                let _ = write!(out, "{subject} = «{}»", slots.surface(*s));
            }
            Shape::Typed(s) => {
                let _ = write!(out, "type({subject}, «{}»)", slots.surface(*s));
            }
            Shape::Relation {
                relation,
                orientation,
                argument,
            } => {
                let arg = if argument.is_constant() {
                    argument.slots().first().map_or("?".to_string(), |s| {
                        format!("«{}»", slots.surface(*s))
                    })
                } else {
                    *fresh += 1;
                    format!("a{fresh}")
                };
                let label = slots.surface(*relation);
                let _ = match orientation {
                    Orientation::Subject => write!(out, "⟨{label}⟩({arg}, {subject})"),
                    Orientation::Object => write!(out, "⟨{label}⟩({subject}, {arg})"),
                };
                if !argument.is_constant() {
                    out.push_str(" ∧ ");
                    argument.write_to(slots, &arg, fresh, out);
                }
            }
            Shape::Compare {
                relation,
                op,
                argument,
            } => {
                let value = argument
                    .slots()
                    .first()
                    .map_or("?", |s| slots.surface(*s));
                let _ = write!(
                    out,
                    "⟨{}⟩({subject}, v) ∧ v {} «{value}»",
                    slots.surface(*relation),
                    op.symbol()
                );
            }
            Shape::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" ∧ ");
                    }
                    part.write_to(slots, subject, fresh, out);
                }
            }
            Shape::Property { property, inner } => {
                *fresh += 1;
                let t = format!("t{fresh}");
                let _ = write!(out, "⟨{}⟩({t}, {subject}) ∧ ", slots.surface(*property));
                inner.write_to(slots, &t, fresh, out);
            }
            Shape::Count(inner) => {
                out.push_str("count ");
                inner.write_to(slots, subject, fresh, out);
            }
        }
    }
}

/// A shape produced by a grammar rule, ready for resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub rule: RuleKind,
    pub shape: Shape,
    /// Answer kind implied by the question word.
    pub expected: Option<ValueKind>,
    /// Multiplier applied to templates built from re-attached parses.
    pub penalty: f64,
}

impl Template {
    pub fn new(rule: RuleKind, shape: Shape) -> Self {
        Self {
            rule,
            shape,
            expected: None,
            penalty: 1.0,
        }
    }

    pub fn with_expected(mut self, expected: Option<ValueKind>) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }
}
