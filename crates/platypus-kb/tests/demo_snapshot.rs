//! The bundled demo snapshot through the connector interface.

use platypus_formula::{EntityId, Formula, Query, RelationId, ValueType};
use platypus_kb::{Deadline, InMemoryKnowledgeBase, KbSnapshot, KnowledgeConnector};
use std::time::Duration;

const DEMO_KB: &str = include_str!("../../../demos/kb.json");

fn kb() -> InMemoryKnowledgeBase {
    InMemoryKnowledgeBase::from_json_str(DEMO_KB).unwrap()
}

#[tokio::test]
async fn every_entity_resolves_by_its_label() {
    let snapshot: KbSnapshot = serde_json::from_str(DEMO_KB).unwrap();
    let kb = kb();
    for entity in &snapshot.entities {
        let found = kb.resolve_entities(&entity.label, "en", None).await.unwrap();
        assert!(
            found.iter().any(|c| c.id == entity.id),
            "{} not found by {:?}",
            entity.id,
            entity.label
        );
    }
}

#[tokio::test]
async fn every_relation_resolves_by_its_label_and_aliases() {
    let snapshot: KbSnapshot = serde_json::from_str(DEMO_KB).unwrap();
    let kb = kb();
    for record in &snapshot.relations {
        let id = &record.relation.id;
        for label in std::iter::once(&record.relation.label).chain(&record.aliases) {
            let found = kb.resolve_relations(label, "en", None, None).await.unwrap();
            assert!(
                found.iter().any(|c| c.relation.id == *id),
                "{id} not found by {label:?}"
            );
        }
    }
}

#[tokio::test]
async fn inverse_lookup_of_a_work() {
    let kb = kb();
    let author = kb.relation(&RelationId::new("P50")).unwrap().clone();
    let body = Formula::predicate(
        &author,
        vec![Formula::entity("Q25338"), Formula::variable("x")],
    )
    .unwrap();
    let query = Query::new("x", body).unwrap();
    let bindings = kb
        .execute(&query, 10, Deadline::after(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].value.as_entity(), Some(&EntityId::new("Q2908")));
    assert_eq!(bindings[0].value.value_type(), ValueType::entity());
    assert_eq!(kb.entity_label(&EntityId::new("Q2908")), Some("Antoine de Saint-Exupéry"));
}
