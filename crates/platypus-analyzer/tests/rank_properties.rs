//! Property tests for candidate ranking
//!
//! 1. The output never exceeds the cap
//! 2. Structurally equal queries appear once, with the best confidence
//! 3. The output is sorted and independent of input order

use platypus_analyzer::{compare_candidates, rank, Candidate, Provenance, RuleKind};
use platypus_formula::{Formula, Query, Relation, ValueType};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

// ============================================================================
// Strategies
// ============================================================================

fn capital() -> Relation {
    Relation::binary("P36", "capital")
        .with_domain(ValueType::entity())
        .with_range(ValueType::entity())
}

fn candidate(country: u8, confidence: f64, rule: RuleKind) -> Candidate {
    let body = Formula::predicate(
        &capital(),
        vec![Formula::entity(format!("Q{country}")), Formula::variable("x")],
    )
    .expect("well typed");
    Candidate {
        query: Query::new("x", body).expect("closed").canonical(),
        confidence,
        provenance: Provenance {
            rule,
            priority: rule.priority(),
            choices: Vec::new(),
        },
    }
}

/// Few distinct countries so that equal queries are frequent.
fn candidate_strategy() -> impl Strategy<Value = Candidate> {
    (0u8..6, 0.0f64..=1.0, prop::sample::select(RuleKind::ALL.to_vec()))
        .prop_map(|(country, confidence, rule)| candidate(country, confidence, rule))
}

fn candidates_strategy() -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::vec(candidate_strategy(), 0..40)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn ranked_output_respects_the_cap(candidates in candidates_strategy(), max in 1usize..8) {
        let ranked = rank(candidates, max);
        prop_assert!(ranked.len() <= max);
    }

    #[test]
    fn equal_queries_keep_the_best_confidence(candidates in candidates_strategy()) {
        let mut best: HashMap<String, f64> = HashMap::new();
        for c in &candidates {
            let entry = best.entry(c.query.to_string()).or_insert(f64::MIN);
            *entry = entry.max(c.confidence);
        }

        let ranked = rank(candidates, usize::MAX);
        prop_assert_eq!(ranked.len(), best.len());
        for c in &ranked {
            prop_assert_eq!(Some(&c.confidence), best.get(&c.query.to_string()));
        }
    }

    #[test]
    fn ranking_is_sorted_and_order_independent(candidates in candidates_strategy(), max in 1usize..8) {
        let forward = rank(candidates.clone(), max);
        for pair in forward.windows(2) {
            prop_assert_ne!(compare_candidates(&pair[0], &pair[1]), Ordering::Greater);
        }

        let mut reversed = candidates;
        reversed.reverse();
        prop_assert_eq!(rank(reversed, max), forward);
    }
}
