//! The request orchestrator.
//!
//! ```text
//!   Parsing ──▶ Analyzing ──▶ Executing ──▶ Formatting ──▶ Done
//!      │            │             │              ▲
//!      │            └─────────────┴──────────────┘  (no answer)
//!      └────────────┴─────────────┴──▶ Errored
//! ```
//!
//! One global deadline is created per request and handed to every stage.

use crate::config::QaConfig;
use crate::executor::{Answer, AttemptRecord, QueryExecutor};
use crate::request_log::{JsonLinesRequestLog, RequestRecord};
use platypus_analyzer::{guess_language, rank, AnalyzeError, Candidate, GrammaticalAnalyzer};
use platypus_kb::{Deadline, KnowledgeConnector, LookupError};
use platypus_nlp::{NlpParser, ParseError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

// ============================================================================
// Responses
// ============================================================================

/// Coarse error kinds shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseUnavailable,
    LookupUnavailable,
    KnowledgeBaseUnavailable,
    GlobalTimeout,
    UnsupportedLanguage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseUnavailable => "parse_unavailable",
            ErrorKind::LookupUnavailable => "lookup_unavailable",
            ErrorKind::KnowledgeBaseUnavailable => "knowledge_base_unavailable",
            ErrorKind::GlobalTimeout => "global_timeout",
            ErrorKind::UnsupportedLanguage => "unsupported_language",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoAnswerReason {
    /// No grammar rule produced a query the knowledge base understands.
    NoInterpretation,
    /// Queries ran but matched nothing.
    NoResults,
    /// Time ran out during execution.
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Answers {
        answers: Vec<Answer>,
        /// Answers come from interrupted executions and may be incomplete.
        partial: bool,
    },
    NoAnswer {
        reason: NoAnswerReason,
    },
    Error {
        kind: ErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaResponse {
    pub request_id: Uuid,
    pub language: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl QaResponse {
    /// Ranked answers; empty unless the outcome is `Answers`.
    pub fn answers(&self) -> &[Answer] {
        match &self.outcome {
            Outcome::Answers { answers, .. } => answers,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match self.outcome {
            Outcome::Error { kind } => Some(kind),
            _ => None,
        }
    }

    pub fn no_answer(&self) -> Option<NoAnswerReason> {
        match self.outcome {
            Outcome::NoAnswer { reason } => Some(reason),
            _ => None,
        }
    }
}

// ============================================================================
// Request State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Analyzing,
    Executing,
    Formatting,
    Done,
    Errored,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Errored)
    }

    /// Legal transitions. Requests without an answer skip straight to
    /// formatting.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Parsing, Analyzing) | (Analyzing, Executing) | (Executing, Formatting) => true,
            (Parsing | Analyzing, Formatting) => true,
            (Formatting, Done) => true,
            (from, Errored) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Per-request bookkeeping, also the material of the request log.
struct RequestRun {
    stages: Vec<Stage>,
    language: Option<String>,
    candidates: Vec<String>,
    attempts: Vec<AttemptRecord>,
}

impl RequestRun {
    fn new() -> Self {
        Self {
            stages: vec![Stage::Parsing],
            language: None,
            candidates: Vec::new(),
            attempts: Vec::new(),
        }
    }

    fn stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Parsing)
    }

    fn advance(&mut self, next: Stage) {
        let from = self.stage();
        if !from.can_advance_to(next) {
            tracing::error!(?from, to = ?next, "illegal stage transition");
        }
        tracing::debug!(?from, to = ?next, "stage");
        self.stages.push(next);
    }

    fn fail(&mut self, kind: ErrorKind) -> Outcome {
        tracing::warn!(stage = ?self.stage(), error = %kind, "request failed");
        self.advance(Stage::Errored);
        Outcome::Error { kind }
    }

    fn no_answer(&mut self, reason: NoAnswerReason) -> Outcome {
        self.advance(Stage::Formatting);
        Outcome::NoAnswer { reason }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Answers questions end to end. Holds no per-request state; share it
/// behind an `Arc` between concurrent requests.
pub struct QaService {
    parser: Arc<dyn NlpParser>,
    analyzer: GrammaticalAnalyzer,
    executor: QueryExecutor,
    config: QaConfig,
    request_log: Option<JsonLinesRequestLog>,
}

impl QaService {
    pub fn new(
        parser: Arc<dyn NlpParser>,
        connector: Arc<dyn KnowledgeConnector>,
        config: QaConfig,
    ) -> Self {
        let analyzer =
            GrammaticalAnalyzer::new(connector.clone()).with_policy(config.analyzer_policy());
        let executor = QueryExecutor::new(connector)
            .with_policy(config.execution.clone())
            .with_confidence_threshold(config.confidence_threshold);
        Self {
            parser,
            analyzer,
            executor,
            config,
            request_log: None,
        }
    }

    pub fn with_request_log(mut self, log: JsonLinesRequestLog) -> Self {
        self.request_log = Some(log);
        self
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &GrammaticalAnalyzer {
        &self.analyzer
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// The language a question is analyzed in: the hint's primary subtag,
    /// else the guess from its question words, else the default.
    pub fn language_for(&self, question: &str, hint: Option<&str>) -> Result<String, ErrorKind> {
        if let Some(hint) = hint {
            let primary = hint
                .trim()
                .split(['-', '_'])
                .next()
                .unwrap_or_default()
                .to_lowercase();
            return if self.config.supports(&primary) {
                Ok(primary)
            } else {
                Err(ErrorKind::UnsupportedLanguage)
            };
        }
        Ok(guess_language(question)
            .filter(|l| self.config.supports(l))
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_language.clone()))
    }

    /// Answer one question.
    pub async fn answer(&self, question: &str, language_hint: Option<&str>) -> QaResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("qa_request", %request_id);
        let started = Instant::now();
        let deadline = Deadline::after(self.config.global_timeout());

        let mut run = RequestRun::new();
        let outcome = self
            .run(&mut run, question, language_hint, deadline)
            .instrument(span.clone())
            .await;
        if run.stage() == Stage::Formatting {
            run.advance(Stage::Done);
        }

        let elapsed = started.elapsed();
        let answered = match &outcome {
            Outcome::Answers { answers, .. } => answers.len(),
            _ => 0,
        };
        span.in_scope(|| {
            tracing::info!(
                stage = ?run.stage(),
                answers = answered,
                elapsed_ms = elapsed.as_millis() as u64,
                "request finished"
            );
        });

        if let Some(log) = &self.request_log {
            let record = RequestRecord {
                request_id,
                timestamp: chrono::Utc::now(),
                question: question.to_string(),
                language: run.language.clone(),
                stages: run.stages.clone(),
                candidates: run.candidates.clone(),
                attempts: run.attempts.clone(),
                outcome: outcome.clone(),
                elapsed_ms: elapsed.as_millis() as u64,
            };
            if let Err(error) = log.append(&record) {
                tracing::warn!(%request_id, path = %log.path().display(), %error, "request log append failed");
            }
        }

        QaResponse {
            request_id,
            language: run.language,
            outcome,
        }
    }

    async fn run(
        &self,
        run: &mut RequestRun,
        question: &str,
        language_hint: Option<&str>,
        deadline: Deadline,
    ) -> Outcome {
        let language = match self.language_for(question, language_hint) {
            Ok(language) => language,
            Err(kind) => return run.fail(kind),
        };
        run.language = Some(language.clone());
        tracing::debug!(%language, question, "parsing");

        let parsed =
            tokio::time::timeout_at(deadline.instant(), self.parser.parse(question, &language))
                .await;
        let trees = match parsed {
            Err(_) => return run.fail(ErrorKind::GlobalTimeout),
            Ok(Err(ParseError::EmptyInput)) => {
                return run.no_answer(NoAnswerReason::NoInterpretation)
            }
            Ok(Err(error)) => {
                tracing::warn!(parser = self.parser.name(), %error, "parser failed");
                return run.fail(ErrorKind::ParseUnavailable);
            }
            Ok(Ok(trees)) if trees.is_empty() => {
                return run.no_answer(NoAnswerReason::NoInterpretation)
            }
            Ok(Ok(trees)) => trees,
        };

        run.advance(Stage::Analyzing);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut first_error = None;
        let mut analyzed = 0usize;
        for tree in &trees {
            match self.analyzer.analyze(tree, &language, deadline).await {
                Ok(found) => {
                    analyzed += 1;
                    candidates.extend(found);
                }
                Err(error) => {
                    tracing::debug!(%error, sentence = %tree.text(), "analysis failed");
                    first_error.get_or_insert(error);
                }
            }
        }
        if analyzed == 0 {
            if let Some(error) = first_error {
                let kind = match error {
                    AnalyzeError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
                    AnalyzeError::Lookup(_) if deadline.is_expired() => ErrorKind::GlobalTimeout,
                    AnalyzeError::Lookup(LookupError::Timeout) => ErrorKind::GlobalTimeout,
                    AnalyzeError::Lookup(_) => ErrorKind::LookupUnavailable,
                };
                return run.fail(kind);
            }
        }
        let candidates = rank(candidates, self.config.max_candidates);
        run.candidates = candidates.iter().map(|c| c.query.to_string()).collect();
        if candidates.is_empty() {
            tracing::info!("question not understood");
            return run.no_answer(NoAnswerReason::NoInterpretation);
        }

        run.advance(Stage::Executing);
        let report = self.executor.execute(&candidates, deadline).await;
        run.attempts = report.attempts.clone();

        if report.answers.is_empty() {
            if report.only_failures() {
                return run.fail(ErrorKind::KnowledgeBaseUnavailable);
            }
            return run.no_answer(if report.out_of_time() {
                NoAnswerReason::Timeout
            } else {
                NoAnswerReason::NoResults
            });
        }
        run.advance(Stage::Formatting);
        Outcome::Answers {
            answers: report.answers,
            partial: report.partial,
        }
    }
}
