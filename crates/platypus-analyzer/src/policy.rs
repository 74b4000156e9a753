//! Analyzer limits and scoring weights.

use crate::grammar::RuleKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerPolicy {
    /// Candidates returned at most (K).
    pub max_candidates: usize,
    /// Slot combinations tried per template.
    pub max_expansions: usize,
    /// Resolved alternatives kept per slot, best first.
    pub max_alternatives_per_slot: usize,
    /// Knowledge-base lookups in flight at once.
    pub lookup_fan_out: usize,
    /// Re-attached parse variants analysed besides the parser's tree.
    pub max_reattachments: usize,
    /// Shapes kept per parse node.
    pub max_shapes_per_node: usize,
    pub scoring: ScoringPolicy,
}

impl Default for AnalyzerPolicy {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            max_expansions: 64,
            max_alternatives_per_slot: 5,
            lookup_fan_out: 8,
            max_reattachments: 4,
            max_shapes_per_node: 32,
            scoring: ScoringPolicy::default(),
        }
    }
}

/// `confidence = rule_weight × Π slot confidences × (1 + bonus) × penalty`,
/// clamped to `[0, 1]`. The bonus applies when every typed position agrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub attribute_of: f64,
    pub verb_object: f64,
    pub question_property: f64,
    pub count: f64,
    pub entity_definition: f64,
    pub wellformed_bonus: f64,
    /// Per moved modifier, for re-attached parses.
    pub reattachment_penalty: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            attribute_of: 1.0,
            verb_object: 0.95,
            question_property: 0.9,
            count: 0.9,
            entity_definition: 0.6,
            wellformed_bonus: 0.1,
            reattachment_penalty: 0.9,
        }
    }
}

impl ScoringPolicy {
    pub fn rule_weight(&self, rule: RuleKind) -> f64 {
        match rule {
            RuleKind::AttributeOf => self.attribute_of,
            RuleKind::VerbObject => self.verb_object,
            RuleKind::QuestionProperty => self.question_property,
            RuleKind::Count => self.count,
            RuleKind::EntityDefinition => self.entity_definition,
        }
    }
}

/// Invalid policy values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("wellformed_bonus must be non-negative, got {0}")]
    NegativeBonus(f64),
}

impl AnalyzerPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (field, value) in [
            ("max_candidates", self.max_candidates),
            ("max_expansions", self.max_expansions),
            ("max_alternatives_per_slot", self.max_alternatives_per_slot),
            ("lookup_fan_out", self.lookup_fan_out),
            ("max_shapes_per_node", self.max_shapes_per_node),
        ] {
            if value == 0 {
                return Err(PolicyError::Zero { field });
            }
        }
        let s = &self.scoring;
        for (field, value) in [
            ("attribute_of", s.attribute_of),
            ("verb_object", s.verb_object),
            ("question_property", s.question_property),
            ("count", s.count),
            ("entity_definition", s.entity_definition),
            ("reattachment_penalty", s.reattachment_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::OutOfRange { field, value });
            }
        }
        if s.wellformed_bonus.is_nan() || s.wellformed_bonus < 0.0 {
            return Err(PolicyError::NegativeBonus(s.wellformed_bonus));
        }
        Ok(())
    }
}
