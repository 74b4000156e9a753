//! Platypus Grammatical Analyzer
//!
//! Maps a dependency parse of a question into ranked candidate queries:
//!
//! ```text
//!   ParseTree
//!      │  grammar rules (attribute-of, verb-object, question-property,
//!      │  count, entity-definition) over the tree and its re-attachments
//!      ▼
//!   Templates ─── slots: entity / relation / literal spans
//!      │
//!      │  resolve: distinct lookups, concurrent, deadline-bounded
//!      ▼
//!   Alternatives per slot
//!      │
//!      │  expand: bounded cartesian product, typed instantiation, scoring
//!      ▼
//!   Candidates ─── dedup by canonical query, rank, cap at K
//! ```
//!
//! Template building and expansion are pure; the only suspension points are
//! the knowledge-base lookups of [`resolve`].

pub mod analyzer;
pub mod candidate;
pub mod disambiguation;
pub mod expand;
pub mod grammar;
pub mod lexicon;
pub mod literal;
pub mod policy;
pub mod resolve;
pub mod template;

#[cfg(test)]
mod tests;

pub use analyzer::GrammaticalAnalyzer;
pub use candidate::{compare_candidates, rank, Candidate, ChoiceKind, Provenance, SlotChoice};
pub use disambiguation::{plan, DisambiguationOption, DisambiguationPlan, DisambiguationStep};
pub use grammar::{locate_focus, reattachments, Focus, GrammarRule, RuleKind};
pub use lexicon::{guess_language, CaseTerm, Lexicon, QuestionWord};
pub use literal::parse_literal;
pub use policy::{AnalyzerPolicy, PolicyError, ScoringPolicy};
pub use template::{Shape, SlotTable, Template};

use platypus_kb::LookupError;

/// Errors of [`GrammaticalAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    /// Every interpretation depended on a lookup that failed.
    #[error("lookup failed: {0}")]
    Lookup(#[source] LookupError),
}
