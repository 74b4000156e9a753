//! Candidate execution and answer ranking.
//!
//! ```text
//!   ranked candidates
//!        │  waves of `fan_out`; each execution gets a slice of the
//!        │  remaining budget and is dropped once slice + grace elapses
//!        ▼
//!   one AttemptRecord per candidate tried
//!        │  stop on: confident answer │ global deadline │ max attempts
//!        ▼
//!   merged answers ─── dedup by value, noisy-or confidence, ranked
//! ```
//!
//! Timeouts and backend errors of single candidates are recorded and
//! skipped; they never fail the whole execution.

use platypus_analyzer::Candidate;
use platypus_formula::ValueType;
use platypus_kb::{AnswerBinding, Deadline, ExecutionError, KnowledgeConnector, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// Candidates executed at most per request.
    pub max_attempts: usize,
    /// Executions in flight at once.
    pub fan_out: usize,
    /// Share of the remaining global budget given to each execution.
    pub per_candidate_fraction: f64,
    /// How long past its deadline an execution may run before it is dropped.
    pub grace_ms: u64,
    /// Bindings requested per execution, and answers kept after merging.
    pub result_limit: usize,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            fan_out: 2,
            per_candidate_fraction: 0.5,
            grace_ms: 100,
            result_limit: 50,
        }
    }
}

impl ExecutionPolicy {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

// ============================================================================
// Answers and Attempts
// ============================================================================

/// One ranked answer of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub value: Value,
    pub label: Option<String>,
    pub value_type: ValueType,
    /// Noisy-or of the confidences of every candidate that returned it.
    pub confidence: f64,
}

impl Answer {
    pub fn display(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unavailable,
    Unsupported,
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Answered { bindings: usize },
    Empty,
    /// Ran out of time, either reported by the backend or cut off after the
    /// grace period. `partial` counts the answers it still delivered.
    TimedOut { partial: usize },
    Failed { kind: FailureKind, message: String },
}

/// What happened to one executed candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Position of the candidate in the ranked list, from 0.
    pub rank: usize,
    pub query: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

impl AttemptRecord {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed { .. })
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::TimedOut { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// A candidate above the confidence threshold returned answers.
    Confident { rank: usize },
    /// Every candidate was tried.
    Exhausted,
    Deadline,
    MaxAttempts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub answers: Vec<Answer>,
    pub attempts: Vec<AttemptRecord>,
    pub stop: StopReason,
    /// The answers come from interrupted executions only.
    pub partial: bool,
}

impl ExecutionReport {
    /// Every candidate tried failed with a backend error.
    pub fn only_failures(&self) -> bool {
        !self.attempts.is_empty() && self.attempts.iter().all(AttemptRecord::is_failure)
    }

    /// Nothing was answered because time ran out.
    pub fn out_of_time(&self) -> bool {
        self.stop == StopReason::Deadline
            || (!self.attempts.is_empty() && self.attempts.iter().all(AttemptRecord::timed_out))
    }
}

// ============================================================================
// Merging
// ============================================================================

struct Merged {
    value: Value,
    label: Option<String>,
    /// Π (1 - confidence) over contributing candidates.
    miss: f64,
}

/// Accumulates bindings of several candidates in rank order.
#[derive(Default)]
struct AnswerMerger {
    entries: Vec<Merged>,
}

impl AnswerMerger {
    fn add(&mut self, bindings: &[AnswerBinding], confidence: f64) {
        let confidence = confidence.clamp(0.0, 1.0);
        let mut counted: Vec<usize> = Vec::new();
        for binding in bindings {
            match self
                .entries
                .iter()
                .position(|e| e.value.same_as(&binding.value))
            {
                Some(i) => {
                    if counted.contains(&i) {
                        continue;
                    }
                    let entry = &mut self.entries[i];
                    entry.miss *= 1.0 - confidence;
                    if entry.label.is_none() {
                        entry.label = binding.label.clone();
                    }
                    counted.push(i);
                }
                None => {
                    counted.push(self.entries.len());
                    self.entries.push(Merged {
                        value: binding.value.clone(),
                        label: binding.label.clone(),
                        miss: 1.0 - confidence,
                    });
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest confidence first; the sort is stable, so ties keep the order
    /// of first appearance.
    fn finish(self, limit: usize) -> Vec<Answer> {
        let mut answers: Vec<Answer> = self
            .entries
            .into_iter()
            .map(|e| Answer {
                value_type: e.value.value_type(),
                value: e.value,
                label: e.label,
                confidence: 1.0 - e.miss,
            })
            .collect();
        answers.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        answers.truncate(limit);
        answers
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Result of one spawned execution. `None` when it was cut off.
struct Finished {
    result: Option<Result<Vec<AnswerBinding>, ExecutionError>>,
    elapsed: Duration,
}

/// Runs ranked candidates against a knowledge connector.
#[derive(Clone)]
pub struct QueryExecutor {
    connector: Arc<dyn KnowledgeConnector>,
    policy: ExecutionPolicy,
    confidence_threshold: f64,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("connector", &self.connector.name())
            .field("policy", &self.policy)
            .field("confidence_threshold", &self.confidence_threshold)
            .finish()
    }
}

impl QueryExecutor {
    pub fn new(connector: Arc<dyn KnowledgeConnector>) -> Self {
        Self {
            connector,
            policy: ExecutionPolicy::default(),
            confidence_threshold: 0.5,
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Execute `candidates`, which must be ranked best first.
    pub async fn execute(&self, candidates: &[Candidate], deadline: Deadline) -> ExecutionReport {
        let budget = self.policy.max_attempts.min(candidates.len());
        let fan_out = self.policy.fan_out.max(1);

        let mut attempts = Vec::with_capacity(budget);
        let mut merged = AnswerMerger::default();
        let mut partial = AnswerMerger::default();
        let mut stop = None;
        let mut next = 0;

        while next < budget && stop.is_none() {
            if deadline.is_expired() {
                tracing::debug!(tried = next, "global deadline reached before next wave");
                stop = Some(StopReason::Deadline);
                break;
            }
            let end = (next + fan_out).min(budget);
            let wave = &candidates[next..end];
            let finished = self.run_wave(wave, deadline).await;

            for (offset, (candidate, finished)) in wave.iter().zip(finished).enumerate() {
                let rank = next + offset;
                let contributes = stop.is_none();
                let outcome = match finished.result {
                    Some(Ok(bindings)) if bindings.is_empty() => AttemptOutcome::Empty,
                    Some(Ok(bindings)) => {
                        if contributes {
                            merged.add(&bindings, candidate.confidence);
                            if candidate.confidence >= self.confidence_threshold {
                                stop = Some(StopReason::Confident { rank });
                            }
                        }
                        AttemptOutcome::Answered {
                            bindings: bindings.len(),
                        }
                    }
                    Some(Err(ExecutionError::Timeout { partial: found })) => {
                        if contributes {
                            partial.add(&found, candidate.confidence);
                        }
                        AttemptOutcome::TimedOut {
                            partial: found.len(),
                        }
                    }
                    Some(Err(error)) => {
                        let kind = match &error {
                            ExecutionError::Unsupported(_) => FailureKind::Unsupported,
                            ExecutionError::InvalidResponse(_) => FailureKind::InvalidResponse,
                            _ => FailureKind::Unavailable,
                        };
                        tracing::warn!(rank, query = %candidate.query, %error, "execution failed");
                        AttemptOutcome::Failed {
                            kind,
                            message: error.to_string(),
                        }
                    }
                    None => {
                        tracing::warn!(rank, query = %candidate.query, "execution cut off after grace period");
                        AttemptOutcome::TimedOut { partial: 0 }
                    }
                };
                tracing::debug!(rank, query = %candidate.query, ?outcome, "candidate executed");
                attempts.push(AttemptRecord {
                    rank,
                    query: candidate.query.to_string(),
                    confidence: candidate.confidence,
                    outcome,
                    elapsed_ms: finished.elapsed.as_millis() as u64,
                });
            }
            next = end;
        }

        let stop = stop.unwrap_or(if budget < candidates.len() {
            StopReason::MaxAttempts
        } else {
            StopReason::Exhausted
        });
        let from_partial = merged.is_empty() && !partial.is_empty();
        let answers = if from_partial {
            partial.finish(self.policy.result_limit)
        } else {
            merged.finish(self.policy.result_limit)
        };
        tracing::debug!(
            answers = answers.len(),
            attempts = attempts.len(),
            ?stop,
            partial = from_partial,
            "execution finished"
        );
        ExecutionReport {
            answers,
            attempts,
            stop,
            partial: from_partial,
        }
    }

    /// Run one wave concurrently; results come back in wave order.
    async fn run_wave(&self, wave: &[Candidate], deadline: Deadline) -> Vec<Finished> {
        let slice = deadline.slice(self.policy.per_candidate_fraction);
        let cutoff = slice.instant() + self.policy.grace();
        let limit = self.policy.result_limit;
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (offset, candidate) in wave.iter().enumerate() {
            let connector = self.connector.clone();
            let query = candidate.query.clone();
            tasks.spawn(async move {
                let began = Instant::now();
                let result =
                    tokio::time::timeout_at(cutoff, connector.execute(&query, limit, slice))
                        .await
                        .ok();
                (offset, result, began.elapsed())
            });
        }

        let mut finished: Vec<Option<Finished>> = (0..wave.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((offset, result, elapsed)) => {
                    finished[offset] = Some(Finished { result, elapsed });
                }
                Err(error) => tracing::error!(%error, "execution task aborted"),
            }
        }
        finished
            .into_iter()
            .map(|f| {
                f.unwrap_or_else(|| Finished {
                    result: Some(Err(ExecutionError::Unavailable(
                        "execution task aborted".to_string(),
                    ))),
                    elapsed: started.elapsed(),
                })
            })
            .collect()
    }
}
