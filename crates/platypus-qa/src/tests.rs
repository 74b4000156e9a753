use crate::config::{ConfigError, QaConfig, ENV_CONFIDENCE_THRESHOLD, ENV_GLOBAL_TIMEOUT_MS, ENV_LANGUAGE, ENV_MAX_CANDIDATES};
use crate::executor::{AttemptOutcome, ExecutionPolicy, FailureKind, QueryExecutor, StopReason};
use crate::service::Stage;
use approx::assert_relative_eq;
use platypus_analyzer::{Candidate, Provenance, RuleKind};
use platypus_formula::{CompareOp, EntityId, Formula, Query, RelationId};
use platypus_kb::{Deadline, InMemoryKnowledgeBase, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEMO_KB: &str = include_str!("../../../demos/kb.json");

fn kb() -> InMemoryKnowledgeBase {
    InMemoryKnowledgeBase::from_json_str(DEMO_KB).unwrap()
}

fn fact(relation: &str, subject: &str) -> Formula {
    let kb = kb();
    let relation = kb.relation(&RelationId::new(relation)).unwrap().clone();
    Formula::predicate(&relation, vec![Formula::entity(subject), Formula::variable("x")]).unwrap()
}

fn candidate(body: Formula, confidence: f64) -> Candidate {
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

fn executor(kb: InMemoryKnowledgeBase, policy: ExecutionPolicy) -> QueryExecutor {
    QueryExecutor::new(Arc::new(kb)).with_policy(policy)
}

fn far() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

fn entity(id: &str) -> Value {
    Value::Entity(EntityId::new(id))
}

// ============================================================================
// Executor
// ============================================================================

#[tokio::test]
async fn confidences_combine_by_noisy_or() {
    let is_paris = Formula::compare(CompareOp::Eq, Formula::variable("x"), Formula::entity("Q90")).unwrap();
    let candidates = vec![candidate(fact("P36", "Q142"), 0.45), candidate(is_paris, 0.4)];

    let report = executor(kb(), ExecutionPolicy::default())
        .execute(&candidates, far())
        .await;

    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.answers.len(), 1);
    assert_eq!(report.answers[0].value, entity("Q90"));
    assert_eq!(report.answers[0].label.as_deref(), Some("Paris"));
    assert_relative_eq!(report.answers[0].confidence, 1.0 - 0.55 * 0.6, epsilon = 1e-12);
}

#[tokio::test]
async fn confident_candidate_stops_execution() {
    let candidates = vec![
        candidate(fact("P36", "Q142"), 0.9),
        candidate(fact("P36", "Q183"), 0.8),
        candidate(fact("P36", "Q30"), 0.7),
    ];

    // same wave: the second one runs but is not merged
    let report = executor(kb(), ExecutionPolicy::default())
        .execute(&candidates, far())
        .await;
    assert_eq!(report.stop, StopReason::Confident { rank: 0 });
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[1].outcome, AttemptOutcome::Answered { bindings: 1 });
    let values: Vec<_> = report.answers.iter().map(|a| a.value.clone()).collect();
    assert_eq!(values, vec![entity("Q90")]);

    let sequential = ExecutionPolicy {
        fan_out: 1,
        ..ExecutionPolicy::default()
    };
    let report = executor(kb(), sequential).execute(&candidates, far()).await;
    assert_eq!(report.attempts.len(), 1);
}

#[tokio::test]
async fn low_confidence_answers_do_not_stop() {
    let candidates = vec![
        candidate(fact("P36", "Q142"), 0.3),
        candidate(fact("P36", "Q183"), 0.2),
    ];
    let report = executor(kb(), ExecutionPolicy::default())
        .with_confidence_threshold(0.5)
        .execute(&candidates, far())
        .await;
    assert_eq!(report.stop, StopReason::Exhausted);
    let labels: Vec<_> = report.answers.iter().map(|a| a.display()).collect();
    assert_eq!(labels, vec!["Paris", "Berlin"]);
}

#[tokio::test]
async fn attempts_are_capped() {
    // cities have no capital
    let candidates: Vec<_> = ["Q90", "Q64", "Q61"]
        .iter()
        .map(|city| candidate(fact("P36", city), 0.9))
        .collect();
    let policy = ExecutionPolicy {
        max_attempts: 2,
        ..ExecutionPolicy::default()
    };
    let report = executor(kb(), policy).execute(&candidates, far()).await;
    assert_eq!(report.stop, StopReason::MaxAttempts);
    assert_eq!(report.attempts.len(), 2);
    assert!(report.attempts.iter().all(|a| a.outcome == AttemptOutcome::Empty));
    assert!(report.answers.is_empty());
    assert!(!report.only_failures());
}

#[tokio::test]
async fn backend_failures_are_skipped() {
    let candidates = vec![
        candidate(fact("P36", "Q142"), 0.9),
        candidate(fact("P40", "Q76"), 0.7),
    ];
    let report = executor(kb().with_failing_relation("P36"), ExecutionPolicy::default())
        .execute(&candidates, far())
        .await;
    assert!(matches!(
        report.attempts[0].outcome,
        AttemptOutcome::Failed {
            kind: FailureKind::Unavailable,
            ..
        }
    ));
    let labels: Vec<_> = report.answers.iter().map(|a| a.display()).collect();
    assert_eq!(labels, vec!["Malia Obama", "Sasha Obama"]);
    assert!(!report.only_failures());

    let report = executor(kb().with_failing_relation("P36"), ExecutionPolicy::default())
        .execute(&candidates[..1], far())
        .await;
    assert!(report.only_failures());
}

#[tokio::test]
async fn expired_deadline_runs_nothing() {
    let candidates = vec![candidate(fact("P36", "Q142"), 0.9)];
    let report = executor(kb(), ExecutionPolicy::default())
        .execute(&candidates, Deadline::after(Duration::ZERO))
        .await;
    assert_eq!(report.stop, StopReason::Deadline);
    assert!(report.attempts.is_empty());
    assert!(report.out_of_time());
}

#[tokio::test]
async fn no_candidates_no_attempts() {
    let report = executor(kb(), ExecutionPolicy::default()).execute(&[], far()).await;
    assert_eq!(report.stop, StopReason::Exhausted);
    assert!(report.answers.is_empty());
    assert!(!report.only_failures());
}

#[tokio::test]
async fn merged_answers_respect_the_result_limit() {
    let candidates = vec![candidate(fact("P40", "Q76"), 0.9)];
    let policy = ExecutionPolicy {
        result_limit: 1,
        ..ExecutionPolicy::default()
    };
    let report = executor(kb(), policy).execute(&candidates, far()).await;
    assert_eq!(report.answers.len(), 1);
}

// ============================================================================
// Request stages
// ============================================================================

#[test]
fn stage_transitions() {
    use Stage::*;
    assert!(Parsing.can_advance_to(Analyzing));
    assert!(Analyzing.can_advance_to(Executing));
    assert!(Executing.can_advance_to(Formatting));
    assert!(Formatting.can_advance_to(Done));
    assert!(Analyzing.can_advance_to(Formatting));
    for stage in [Parsing, Analyzing, Executing, Formatting] {
        assert!(stage.can_advance_to(Errored), "{stage:?}");
    }
    assert!(!Done.can_advance_to(Errored));
    assert!(!Errored.can_advance_to(Done));
    assert!(!Executing.can_advance_to(Analyzing));
    assert!(!Parsing.can_advance_to(Done));
}

// ============================================================================
// Configuration
// ============================================================================

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let config = QaConfig::default();
    config.validate().unwrap();
    assert_eq!(config.default_language, "en");
    assert!(config.supports("fr"));
    assert_relative_eq!(config.confidence_threshold, 0.5);
    assert_eq!(config.analyzer_policy().max_candidates, config.max_candidates);
}

#[test]
fn overrides_apply() {
    let config = QaConfig::default()
        .with_overrides(vars(&[
            (ENV_LANGUAGE, "FR"),
            (ENV_MAX_CANDIDATES, "3"),
            (ENV_GLOBAL_TIMEOUT_MS, " 2500 "),
            (ENV_CONFIDENCE_THRESHOLD, "0.7"),
        ]))
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(config.default_language, "fr");
    assert_eq!(config.max_candidates, 3);
    assert_eq!(config.global_timeout(), Duration::from_millis(2500));
    assert_relative_eq!(config.confidence_threshold, 0.7);
}

#[test]
fn malformed_override_is_reported() {
    let err = QaConfig::default()
        .with_overrides(vars(&[(ENV_MAX_CANDIDATES, "many")]))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Env { var: ENV_MAX_CANDIDATES, ref value } if value == "many"
    ));
}

#[test]
fn invalid_settings_are_rejected() {
    let cases: Vec<(&str, QaConfig)> = vec![
        ("no languages", QaConfig { supported_languages: vec![], ..QaConfig::default() }),
        ("unknown default", QaConfig { default_language: "it".into(), ..QaConfig::default() }),
        ("zero candidates", QaConfig { max_candidates: 0, ..QaConfig::default() }),
        ("zero timeout", QaConfig { global_timeout_ms: 0, ..QaConfig::default() }),
        ("threshold", QaConfig { confidence_threshold: 1.5, ..QaConfig::default() }),
        (
            "fraction",
            QaConfig {
                execution: ExecutionPolicy { per_candidate_fraction: 0.0, ..ExecutionPolicy::default() },
                ..QaConfig::default()
            },
        ),
        (
            "fan-out",
            QaConfig {
                execution: ExecutionPolicy { fan_out: 0, ..ExecutionPolicy::default() },
                ..QaConfig::default()
            },
        ),
    ];
    for (name, config) in cases {
        assert!(config.validate().is_err(), "{name} accepted");
    }

    let unknown = QaConfig {
        supported_languages: vec!["en".into(), "tlh".into()],
        ..QaConfig::default()
    };
    assert!(matches!(unknown.validate(), Err(ConfigError::UnsupportedLanguage(l)) if l == "tlh"));
}

#[test]
fn config_file_fields_are_optional() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("platypus.json");
    std::fs::write(
        &path,
        r#"{ "max_candidates": 4, "execution": { "fan_out": 3 }, "cache": { "ttl_secs": 60 } }"#,
    )
    .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let config: QaConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(config.max_candidates, 4);
    assert_eq!(config.execution.fan_out, 3);
    assert_eq!(config.execution.max_attempts, ExecutionPolicy::default().max_attempts);
    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.default_language, "en");
    config.validate().unwrap();
}

#[test]
fn missing_or_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = QaConfig::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(missing, ConfigError::Read { .. }));

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ max_candidates: ").unwrap();
    assert!(matches!(QaConfig::load(&path), Err(ConfigError::Malformed(_))));
}
