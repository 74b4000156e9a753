//! Integration tests for the complete Platypus pipeline
//!
//! These tests run questions across crates:
//! - CoNLL-U → ParseTree → candidate queries → SPARQL text
//! - Service → cached connector → in-memory knowledge base
//! - Config file → service → JSON-lines request log
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use platypus_analyzer::GrammaticalAnalyzer;
use platypus_formula::{render_sparql, SparqlOptions};
use platypus_kb::{
    CacheConfig, CachedConnector, Deadline, InMemoryKnowledgeBase, KnowledgeConnector,
    ResolutionCache,
};
use platypus_nlp::{NlpParser, StaticParser};
use platypus_qa::{NoAnswerReason, Outcome, QaConfig, QaService};

const DEMO_KB: &str = include_str!("../demos/kb.json");
const DEMO_PARSES: &str = include_str!("../demos/parses.conllu");

fn kb() -> InMemoryKnowledgeBase {
    InMemoryKnowledgeBase::from_json_str(DEMO_KB).unwrap()
}

fn parser() -> Arc<StaticParser> {
    Arc::new(StaticParser::from_conllu_document(DEMO_PARSES).unwrap())
}

fn demo_questions() -> Vec<String> {
    platypus_nlp::parse_conllu(DEMO_PARSES)
        .unwrap()
        .iter()
        .map(|t| t.text())
        .collect()
}

// ============================================================================
// Parse → Analyze → SPARQL → Execute
// ============================================================================

#[tokio::test]
async fn test_capital_of_france_through_every_stage() {
    let connector: Arc<dyn KnowledgeConnector> = Arc::new(kb());
    let trees = parser()
        .parse("What is the capital of France?", "en")
        .await
        .unwrap();
    assert_eq!(trees.len(), 1);

    let deadline = Deadline::after(Duration::from_secs(10));
    let candidates = GrammaticalAnalyzer::new(connector.clone())
        .analyze(&trees[0], "en", deadline)
        .await
        .unwrap();
    let top = &candidates[0];
    assert_eq!(top.query.to_string(), "λ?x.P36(Q142, ?x)");

    let sparql = render_sparql(&top.query, &SparqlOptions::default()).unwrap();
    assert!(sparql.contains("wd:Q142"), "{sparql}");
    assert!(sparql.contains("wdt:P36"), "{sparql}");

    let bindings = connector.execute(&top.query, 10, deadline).await.unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].display(), "Paris");
}

#[tokio::test]
async fn test_every_demo_question_gets_a_response() {
    let service = QaService::new(parser(), Arc::new(kb()), QaConfig::default());
    for question in demo_questions() {
        let response = service.answer(&question, None).await;
        match &response.outcome {
            Outcome::Answers { answers, .. } => {
                assert!(!answers.is_empty(), "{question}");
                for pair in answers.windows(2) {
                    assert!(pair[0].confidence >= pair[1].confidence, "{question}");
                }
                for (i, a) in answers.iter().enumerate() {
                    assert!(
                        answers[i + 1..].iter().all(|b| !a.value.same_as(&b.value)),
                        "{question}: duplicate answer {}",
                        a.value
                    );
                }
            }
            Outcome::NoAnswer { reason } => {
                assert!(question.contains("Blorptown"), "{question}: {reason:?}");
                assert_eq!(*reason, NoAnswerReason::NoInterpretation);
            }
            Outcome::Error { kind } => panic!("{question}: {kind}"),
        }
    }
}

#[tokio::test]
async fn test_answers_are_deterministic() {
    let service = QaService::new(parser(), Arc::new(kb()), QaConfig::default());
    let question = "What is the population of the capital of France?";
    let first = service.answer(question, None).await;
    assert_eq!(first.answers()[0].display(), "2100000");
    for _ in 0..5 {
        let again = service.answer(question, None).await;
        assert_ne!(again.request_id, first.request_id);
        assert_eq!(again.outcome, first.outcome);
    }
}

// ============================================================================
// Resolution cache
// ============================================================================

#[tokio::test]
async fn test_resolution_cache_spares_repeated_lookups() {
    let backend = Arc::new(kb());
    let cache = ResolutionCache::new(&CacheConfig::default());
    let connector = Arc::new(CachedConnector::new(backend.clone(), cache.clone()));
    let service = QaService::new(parser(), connector, QaConfig::default());

    let question = "Where was Bob Marley born?";
    let first = service.answer(question, None).await;
    let after_first = backend.stats();
    assert!(after_first.entity_lookups > 0);
    assert!(cache.entry_count() > 0);

    let second = service.answer(question, None).await;
    let after_second = backend.stats();
    assert_eq!(after_second.entity_lookups, after_first.entity_lookups);
    assert_eq!(after_second.relation_lookups, after_first.relation_lookups);
    assert!(after_second.executions > after_first.executions);
    assert_eq!(first.outcome, second.outcome);
}

// ============================================================================
// Configuration and request log
// ============================================================================

#[tokio::test]
async fn test_config_file_and_request_log() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("requests.jsonl");
    let config_path = dir.path().join("platypus.json");
    let config = serde_json::json!({
        "max_candidates": 1,
        "global_timeout_ms": 5000,
        "execution": { "fan_out": 1 },
        "request_log": log_path,
    });
    std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let config = QaConfig::load(&config_path).unwrap();
    assert_eq!(config.max_candidates, 1);
    let log = platypus_qa::JsonLinesRequestLog::open(config.request_log.as_ref().unwrap()).unwrap();
    let service = QaService::new(parser(), Arc::new(kb()), config).with_request_log(log);

    for question in ["Who wrote Le Petit Prince?", "What is the capital of Blorptown?"] {
        service.answer(question, None).await;
    }

    let records: Vec<serde_json::Value> = std::fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["question"], "Who wrote Le Petit Prince?");
    assert_eq!(records[0]["candidates"].as_array().unwrap().len(), 1);
    assert_eq!(records[0]["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(records[0]["outcome"]["answers"][0]["label"], "Antoine de Saint-Exupéry");
    assert_eq!(records[1]["outcome"]["status"], "no_answer");
    assert!(records[1]["attempts"].as_array().unwrap().is_empty());
}
