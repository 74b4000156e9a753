//! End-to-end requests over the demo parses and knowledge base.

use approx::assert_relative_eq;
use async_trait::async_trait;
use platypus_analyzer::{Candidate, Provenance, RuleKind};
use platypus_formula::{EntityId, Formula, Literal, Query, RelationId, ValueType};
use platypus_kb::{
    AnswerBinding, Deadline, EntityCandidate, ExecutionError, InMemoryKnowledgeBase,
    KnowledgeConnector, LookupError, RelationCandidate, Value,
};
use platypus_nlp::StaticParser;
use platypus_qa::{
    AttemptOutcome, ErrorKind, ExecutionPolicy, JsonLinesRequestLog, NoAnswerReason, QaConfig,
    QaService, QueryExecutor, StopReason,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DEMO_KB: &str = include_str!("../../../demos/kb.json");
const DEMO_PARSES: &str = include_str!("../../../demos/parses.conllu");

fn kb() -> InMemoryKnowledgeBase {
    InMemoryKnowledgeBase::from_json_str(DEMO_KB).unwrap()
}

fn parser() -> Arc<StaticParser> {
    Arc::new(StaticParser::from_conllu_document(DEMO_PARSES).unwrap())
}

fn service_over(connector: Arc<dyn KnowledgeConnector>, config: QaConfig) -> QaService {
    QaService::new(parser(), connector, config)
}

fn service() -> QaService {
    service_over(Arc::new(kb()), QaConfig::default())
}

/// Resolves through the demo knowledge base; execution is replaced.
struct ExecutionFault {
    kb: InMemoryKnowledgeBase,
    stall: bool,
}

#[async_trait]
impl KnowledgeConnector for ExecutionFault {
    async fn resolve_entities(
        &self,
        span: &str,
        language: &str,
        expected: Option<ValueType>,
    ) -> Result<Vec<EntityCandidate>, LookupError> {
        self.kb.resolve_entities(span, language, expected).await
    }

    async fn resolve_relations(
        &self,
        label: &str,
        language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
    ) -> Result<Vec<RelationCandidate>, LookupError> {
        self.kb
            .resolve_relations(label, language, subject, object)
            .await
    }

    async fn execute(
        &self,
        _query: &Query,
        _limit: usize,
        _deadline: Deadline,
    ) -> Result<Vec<AnswerBinding>, ExecutionError> {
        if self.stall {
            // ignores its deadline
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Err(ExecutionError::Unavailable("backend down".to_string()))
    }

    fn name(&self) -> &str {
        "fault"
    }
}

// ============================================================================
// Answers
// ============================================================================

#[tokio::test]
async fn capital_of_france_is_paris() {
    let response = service().answer("What is the capital of France?", None).await;
    assert_eq!(response.language.as_deref(), Some("en"));
    let answers = response.answers();
    assert_eq!(answers[0].value, Value::Entity(EntityId::new("Q90")));
    assert_eq!(answers[0].display(), "Paris");
    assert!(answers[0].confidence >= QaConfig::default().confidence_threshold);
}

#[tokio::test]
async fn counting_question() {
    let response = service()
        .answer("How many children does Barack Obama have?", None)
        .await;
    assert_eq!(
        response.answers()[0].value,
        Value::Literal(Literal::Integer(2))
    );
    assert_eq!(response.answers()[0].display(), "2");
}

#[tokio::test]
async fn comparison_question() {
    let response = service().answer("Who was born before 1950?", None).await;
    let mut labels: Vec<_> = response.answers().iter().map(|a| a.display()).collect();
    labels.sort();
    assert_eq!(labels, vec!["Bob Marley", "Victor Hugo"]);
}

#[tokio::test]
async fn french_is_guessed_from_the_question_word() {
    let response = service()
        .answer("Quelle est la capitale de la France ?", None)
        .await;
    assert_eq!(response.language.as_deref(), Some("fr"));
    assert_eq!(response.answers()[0].display(), "Paris");
}

#[tokio::test]
async fn regional_hint_uses_primary_language() {
    let response = service()
        .answer("What is the capital of France?", Some("en-GB"))
        .await;
    assert_eq!(response.language.as_deref(), Some("en"));
    assert_eq!(response.answers()[0].display(), "Paris");
}

// ============================================================================
// No answer and errors
// ============================================================================

#[tokio::test]
async fn unknown_entity_is_no_answer() {
    let response = service()
        .answer("What is the capital of Blorptown?", None)
        .await;
    assert_eq!(response.no_answer(), Some(NoAnswerReason::NoInterpretation));
    assert_eq!(response.error(), None);
}

#[tokio::test]
async fn unsupported_language_hint() {
    let response = service()
        .answer("What is the capital of France?", Some("it"))
        .await;
    assert_eq!(response.error(), Some(ErrorKind::UnsupportedLanguage));
}

#[tokio::test]
async fn parser_without_a_parse_is_unavailable() {
    let response = service().answer("Is it raining in Paris?", None).await;
    assert_eq!(response.error(), Some(ErrorKind::ParseUnavailable));
}

#[tokio::test]
async fn empty_question() {
    let response = service().answer("   ", None).await;
    assert_eq!(response.no_answer(), Some(NoAnswerReason::NoInterpretation));
}

#[tokio::test]
async fn failed_lookups_everywhere() {
    let service = service_over(
        Arc::new(kb().with_unavailable_label("Barack Obama")),
        QaConfig::default(),
    );
    let response = service.answer("Who is Barack Obama?", None).await;
    assert_eq!(response.error(), Some(ErrorKind::LookupUnavailable));
}

#[tokio::test]
async fn failing_backend() {
    let service = service_over(
        Arc::new(ExecutionFault {
            kb: kb(),
            stall: false,
        }),
        QaConfig::default(),
    );
    let response = service.answer("What is the capital of France?", None).await;
    assert_eq!(response.error(), Some(ErrorKind::KnowledgeBaseUnavailable));
}

#[tokio::test(start_paused = true)]
async fn stalled_backend_is_contained_by_the_global_deadline() {
    let config = QaConfig {
        global_timeout_ms: 1000,
        ..QaConfig::default()
    };
    let grace = config.execution.grace();
    let service = service_over(
        Arc::new(ExecutionFault {
            kb: kb(),
            stall: true,
        }),
        config,
    );
    let started = Instant::now();
    let response = service.answer("What is the capital of France?", None).await;
    assert!(started.elapsed() <= Duration::from_millis(1000) + grace);
    assert_eq!(response.no_answer(), Some(NoAnswerReason::Timeout));
}

// ============================================================================
// Executor scenarios
// ============================================================================

fn candidate(relation: &str, subject: &str, confidence: f64) -> Candidate {
    let relation = kb().relation(&RelationId::new(relation)).unwrap().clone();
    let body = Formula::predicate(
        &relation,
        vec![Formula::entity(subject), Formula::variable("x")],
    )
    .unwrap();
    Candidate {
        query: Query::new("x", body).unwrap().canonical(),
        confidence,
        provenance: Provenance {
            rule: RuleKind::AttributeOf,
            priority: 0,
            choices: Vec::new(),
        },
    }
}

#[tokio::test(start_paused = true)]
async fn two_timeouts_then_an_answer() {
    let slow = kb()
        .with_slow_relation("P1082", Duration::from_secs(60))
        .with_slow_relation("P40", Duration::from_secs(60));
    let candidates = vec![
        candidate("P1082", "Q142", 0.9),
        candidate("P40", "Q76", 0.8),
        candidate("P36", "Q142", 0.7),
    ];
    let policy = ExecutionPolicy::default();
    let grace = policy.grace();
    let executor = QueryExecutor::new(Arc::new(slow)).with_policy(policy);

    let started = Instant::now();
    let report = executor
        .execute(&candidates, Deadline::after(Duration::from_secs(4)))
        .await;
    assert!(started.elapsed() <= Duration::from_secs(4) + grace);

    assert_eq!(report.attempts.len(), 3);
    assert!(report.attempts[0].timed_out());
    assert!(report.attempts[1].timed_out());
    assert_eq!(report.stop, StopReason::Confident { rank: 2 });
    assert_eq!(report.answers.len(), 1);
    assert_eq!(report.answers[0].display(), "Paris");
    assert_relative_eq!(report.answers[0].confidence, 0.7);
    assert!(!report.partial);
}

#[tokio::test(start_paused = true)]
async fn executions_are_dropped_after_the_grace_period() {
    let candidates = vec![
        candidate("P36", "Q142", 0.9),
        candidate("P36", "Q183", 0.8),
    ];
    let executor = QueryExecutor::new(Arc::new(ExecutionFault {
        kb: kb(),
        stall: true,
    }))
    .with_policy(ExecutionPolicy {
        fan_out: 2,
        per_candidate_fraction: 0.5,
        grace_ms: 100,
        ..ExecutionPolicy::default()
    });

    let started = Instant::now();
    let report = executor
        .execute(&candidates, Deadline::after(Duration::from_secs(1)))
        .await;
    assert!(started.elapsed() <= Duration::from_millis(600));
    assert_eq!(report.attempts.len(), 2);
    for attempt in &report.attempts {
        assert_eq!(attempt.outcome, AttemptOutcome::TimedOut { partial: 0 });
        assert!(attempt.elapsed_ms >= 500);
    }
    assert!(report.answers.is_empty());
    assert!(report.out_of_time());
}

// ============================================================================
// Request log and response shape
// ============================================================================

#[tokio::test]
async fn requests_are_logged_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("requests.jsonl");
    let service = service().with_request_log(JsonLinesRequestLog::open(&path).unwrap());

    let answered = service.answer("What is the capital of France?", None).await;
    let failed = service.answer("What is the capital of France?", Some("it")).await;

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["request_id"], answered.request_id.to_string());
    assert_eq!(lines[0]["outcome"]["status"], "answers");
    assert_eq!(
        lines[0]["stages"],
        serde_json::json!(["parsing", "analyzing", "executing", "formatting", "done"])
    );
    assert!(!lines[0]["candidates"].as_array().unwrap().is_empty());
    assert_eq!(lines[0]["attempts"][0]["outcome"], "answered");

    assert_eq!(lines[1]["request_id"], failed.request_id.to_string());
    assert_eq!(lines[1]["stages"], serde_json::json!(["parsing", "errored"]));
    assert_eq!(lines[1]["outcome"]["kind"], "unsupported_language");
}

#[tokio::test]
async fn responses_serialize_without_internals() {
    let service = service();
    let answered = serde_json::to_value(
        service.answer("What is the capital of France?", None).await,
    )
    .unwrap();
    assert_eq!(answered["status"], "answers");
    assert_eq!(answered["answers"][0]["label"], "Paris");
    assert_eq!(answered["answers"][0]["value"], serde_json::json!({ "entity": "Q90" }));

    let none = serde_json::to_value(
        service.answer("What is the capital of Blorptown?", None).await,
    )
    .unwrap();
    assert_eq!(none["status"], "no_answer");
    assert_eq!(none["reason"], "no_interpretation");

    let error = serde_json::to_value(service.answer("Is it raining in Paris?", None).await).unwrap();
    assert_eq!(error["status"], "error");
    assert_eq!(error["kind"], "parse_unavailable");
    assert!(error.get("message").is_none());
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let service = Arc::new(service());
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let service = service.clone();
        let question = if i % 2 == 0 {
            "What is the capital of France?"
        } else {
            "Where was Bob Marley born?"
        };
        tasks.spawn(async move { (i, service.answer(question, None).await) });
    }
    while let Some(joined) = tasks.join_next().await {
        let (i, response) = joined.unwrap();
        let expected = if i % 2 == 0 { "Paris" } else { "Nine Mile" };
        assert_eq!(response.answers()[0].display(), expected);
    }
}
