//! Platypus Knowledge Bases
//!
//! The [`KnowledgeConnector`] trait and its implementations:
//!
//! ```text
//!                ┌──────────────────────┐
//!   analyzer ───►│  CachedConnector<C>  │──► ResolutionCache (moka, TTL)
//!   executor ───►│                      │
//!                └──────────┬───────────┘
//!                           │
//!            ┌──────────────┴──────────────┐
//!            ▼                             ▼
//!   InMemoryKnowledgeBase           SparqlConnector
//!   (JSON snapshot, evaluator)      (search API + SPARQL endpoint,
//!                                    feature "http")
//! ```
//!
//! Every connector call carries an explicit [`Deadline`]; connectors return
//! a timeout error with whatever partial results they have instead of
//! running past it.

pub mod cache;
pub mod connector;
pub mod memory;
pub mod sparql;


pub use cache::{CacheConfig, CachedConnector, ResolutionCache};
pub use connector::{
    AnswerBinding, Deadline, EntityCandidate, ExecutionError, KnowledgeConnector, LookupError,
    RelationCandidate, Value,
};
pub use memory::{InMemoryKnowledgeBase, KbError, KbSnapshot, KbStats};

#[cfg(feature = "http")]
pub use sparql::{SparqlConnector, SparqlConnectorConfig};
