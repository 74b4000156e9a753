//! Platypus Question Answering Service
//!
//! Ties the parser, the grammatical analyzer and a knowledge connector
//! together:
//!
//! ```text
//!   question ──▶ NlpParser ──▶ GrammaticalAnalyzer ──▶ QueryExecutor ──▶ QaResponse
//!                                     │                      │
//!                                     └──── KnowledgeConnector ┘
//! ```
//!
//! - [`service`]: per-request orchestration, deadlines, response shape
//! - [`executor`]: candidate execution in waves, answer merging
//! - [`config`]: file and environment configuration
//! - [`request_log`]: JSON-lines request log

pub mod config;
pub mod executor;
pub mod request_log;
pub mod service;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, QaConfig};
pub use executor::{
    Answer, AttemptOutcome, AttemptRecord, ExecutionPolicy, ExecutionReport, FailureKind,
    QueryExecutor, StopReason,
};
pub use request_log::{JsonLinesRequestLog, RequestLogError, RequestRecord};
pub use service::{ErrorKind, NoAnswerReason, Outcome, QaResponse, QaService, Stage};
