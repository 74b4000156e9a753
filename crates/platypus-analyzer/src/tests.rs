use super::*;
use crate::grammar::build_templates;
use crate::template::{LookupKind, SlotKind};
use approx::assert_relative_eq;
use platypus_formula::{Formula, Literal, Query, Relation, ValueKind, ValueType};
use platypus_nlp::{parse_conllu, ParseTree, UdPos};

const CAPITAL: &str = "# text = What is the capital of France?
1 What what PRON _ _ 4 nsubj _ _
2 is be AUX _ _ 4 cop _ _
3 the the DET _ _ 4 det _ _
4 capital capital NOUN _ _ 0 root _ _
5 of of ADP _ _ 6 case _ _
6 France France PROPN _ _ 4 nmod _ _
7 ? ? PUNCT _ _ 4 punct _ _
";

// older annotation style: the question word heads the sentence
const CAPITAL_WH_ROOT: &str = "1 What what PRON _ _ 0 root _ _
2 is be AUX _ _ 1 cop _ _
3 the the DET _ _ 4 det _ _
4 capital capital NOUN _ _ 1 nsubj _ _
5 of of ADP _ _ 6 case _ _
6 France France PROPN _ _ 4 nmod _ _
7 ? ? PUNCT _ _ 1 punct _ _
";

const WHERE_BORN: &str = "1 Where where ADV _ _ 5 advmod _ _
2 was be AUX _ _ 5 aux:pass _ _
3 Bob Bob PROPN _ _ 5 nsubj:pass _ _
4 Marley Marley PROPN _ _ 3 flat _ _
5 born bear VERB _ _ 0 root _ _
6 ? ? PUNCT _ _ 5 punct _ _
";

const HOW_MANY: &str = "1 How how ADV _ _ 2 advmod _ _
2 many many ADJ _ _ 3 amod _ _
3 children child NOUN _ _ 7 obj _ _
4 does do AUX _ _ 7 aux _ _
5 Barack Barack PROPN _ _ 7 nsubj _ _
6 Obama Obama PROPN _ _ 5 flat _ _
7 have have VERB _ _ 0 root _ _
8 ? ? PUNCT _ _ 7 punct _ _
";

const LIST_CHILDREN: &str = "1 List list VERB _ _ 0 root _ _
2 the the DET _ _ 3 det _ _
3 children child NOUN _ _ 1 obj _ _
4 of of ADP _ _ 5 case _ _
5 Barack Barack PROPN _ _ 3 nmod _ _
6 Obama Obama PROPN _ _ 5 flat _ _
";

const BORN_BEFORE: &str = "1 Who who PRON _ _ 3 nsubj:pass _ _
2 was be AUX _ _ 3 aux:pass _ _
3 born bear VERB _ _ 0 root _ _
4 before before ADP _ _ 5 case _ _
5 1950 1950 NUM _ _ 3 obl _ _
6 ? ? PUNCT _ _ 3 punct _ _
";

const POPULATION: &str = "1 What what PRON _ _ 4 nsubj _ _
2 is be AUX _ _ 4 cop _ _
3 the the DET _ _ 4 det _ _
4 population population NOUN _ _ 0 root _ _
5 of of ADP _ _ 7 case _ _
6 the the DET _ _ 7 det _ _
7 capital capital NOUN _ _ 4 nmod _ _
8 of of ADP _ _ 9 case _ _
9 France France PROPN _ _ 7 nmod _ _
10 ? ? PUNCT _ _ 4 punct _ _
";

const CURRENT_CAPITAL: &str = "1 What what PRON _ _ 5 nsubj _ _
2 is be AUX _ _ 5 cop _ _
3 the the DET _ _ 5 det _ _
4 current current ADJ _ _ 5 amod _ _
5 capital capital NOUN _ _ 0 root _ _
6 of of ADP _ _ 7 case _ _
7 France France PROPN _ _ 5 nmod _ _
8 ? ? PUNCT _ _ 5 punct _ _
";

fn tree(conllu: &str) -> ParseTree {
    parse_conllu(conllu).expect("fixture parses").remove(0)
}

fn english() -> &'static Lexicon {
    Lexicon::for_language("en").expect("english lexicon")
}

fn templates_of(conllu: &str) -> (Vec<Template>, SlotTable) {
    let mut slots = SlotTable::new();
    let templates = build_templates(
        &tree(conllu),
        english(),
        &GrammarRule::default_rules(),
        &AnalyzerPolicy::default(),
        &mut slots,
    );
    (templates, slots)
}

fn described(templates: &[Template], slots: &SlotTable, rule: RuleKind) -> Vec<String> {
    templates
        .iter()
        .filter(|t| t.rule == rule)
        .map(|t| t.shape.describe(slots))
        .collect()
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn years_read_as_year_then_integer() {
    assert_eq!(
        parse_literal("1950", None),
        vec![Literal::Year(1950), Literal::Integer(1950)]
    );
    assert_eq!(
        parse_literal("in 1789", Some(ValueType::temporal())),
        vec![Literal::Year(1789)]
    );
}

#[test]
fn dates_in_several_languages() {
    let expected = Literal::Date(chrono::NaiveDate::from_ymd_opt(1945, 2, 6).expect("valid date"));
    assert_eq!(parse_literal("February 6, 1945", None), vec![expected.clone()]);
    assert_eq!(parse_literal("6 février 1945", None), vec![expected.clone()]);
    assert_eq!(parse_literal("1945-02-06", None), vec![expected]);
    assert_eq!(
        parse_literal("March 1945", None),
        vec![Literal::YearMonth {
            year: 1945,
            month: 3
        }]
    );
}

#[test]
fn numbers_filtered_by_expected_type() {
    assert_eq!(parse_literal("3,5", None), vec![Literal::Decimal(3.5)]);
    assert!(parse_literal("42", Some(ValueType::entity())).is_empty());
    assert!(parse_literal("France", None).is_empty());
    assert!(parse_literal("  ", None).is_empty());
}

// ============================================================================
// Lexicon
// ============================================================================

#[test]
fn language_guessed_from_question_words() {
    assert_eq!(guess_language("Where was Bob Marley born?"), Some("en"));
    assert_eq!(guess_language("Quelle est la capitale de la France ?"), Some("fr"));
    assert_eq!(guess_language("¿Dónde nació Bob Marley?"), Some("es"));
    assert_eq!(guess_language("Wann wurde Bob Marley geboren?"), Some("de"));
    assert_eq!(guess_language("Paris"), None);
}

#[test]
fn question_words_carry_expected_properties() {
    let when = english().question_word("When").expect("when");
    assert_eq!(when.expected_kind, Some(ValueKind::Temporal));
    assert!(when.property_modifiers.contains(&"{} date"));
    let how_many = english().question_word("how  many").expect("how many");
    assert!(how_many.has_properties());
    assert!(!english().question_word("who").expect("who").has_properties());
    assert_eq!(english().nominalization("Born"), Some("birth"));
    assert!(english().is_meaningless_root("List"));
    assert!(Lexicon::for_language("it").is_none());
}

// ============================================================================
// Focus
// ============================================================================

#[test]
fn focus_skips_the_question_word() {
    let tree = tree(CAPITAL);
    let focus = locate_focus(&tree, english());
    assert_eq!(tree.token(focus.node).map(|t| t.form.as_str()), Some("capital"));
    assert_eq!(focus.question_word.map(|q| q.words), Some("what"));
    // "is the" trims away, so it joins the question word phrase
    assert!(focus.left.is_empty());
}

#[test]
fn focus_descends_from_meaningless_roots() {
    let wh_root = tree(CAPITAL_WH_ROOT);
    let focus = locate_focus(&wh_root, english());
    assert_eq!(wh_root.token(focus.node).map(|t| t.form.as_str()), Some("capital"));
    assert_eq!(focus.question_word.map(|q| q.words), Some("what"));

    let list = tree(LIST_CHILDREN);
    let focus = locate_focus(&list, english());
    assert_eq!(list.token(focus.node).map(|t| t.form.as_str()), Some("children"));
    assert_eq!(focus.question_word.map(|q| q.words), Some("list"));
}

#[test]
fn focus_consumes_auxiliaries_after_the_question_word() {
    let tree = tree(WHERE_BORN);
    let focus = locate_focus(&tree, english());
    assert_eq!(tree.token(focus.node).map(|t| t.pos), Some(UdPos::Verb));
    assert_eq!(focus.question_word.map(|q| q.words), Some("where"));
    assert_eq!(focus.left, vec![3]);
}

// ============================================================================
// Templates
// ============================================================================

#[test]
fn attribute_of_reads_both_orientations() {
    let (templates, slots) = templates_of(CAPITAL);
    let shapes = described(&templates, &slots, RuleKind::AttributeOf);
    assert!(shapes.contains(&"⟨capital⟩(«France», x)".to_string()), "{shapes:?}");
    assert!(shapes.contains(&"⟨capital of⟩(x, «France»)".to_string()), "{shapes:?}");
    assert!(described(&templates, &slots, RuleKind::VerbObject).is_empty());
    assert!(described(&templates, &slots, RuleKind::Count).is_empty());
}

#[test]
fn relation_slots_collect_lookup_keys() {
    let (_, slots) = templates_of(WHERE_BORN);
    let keys: Vec<String> = slots
        .iter()
        .filter_map(|(_, slot)| match slot.kind {
            SlotKind::Relation { .. } => Some(slot.lookup_keys()),
            _ => None,
        })
        .flatten()
        .map(|k| k.text)
        .collect();
    assert!(keys.contains(&"birth place".to_string()), "{keys:?}");
    assert!(keys.contains(&"bear place".to_string()), "{keys:?}");
    assert!(keys.contains(&"place".to_string()), "{keys:?}");
}

#[test]
fn question_property_nounifies_the_predicate() {
    let (templates, slots) = templates_of(WHERE_BORN);
    let shapes = described(&templates, &slots, RuleKind::QuestionProperty);
    assert!(shapes.contains(&"⟨born place⟩(«Bob Marley», x)".to_string()), "{shapes:?}");
    assert!(
        shapes.iter().any(|s| s.starts_with("⟨where⟩(t")),
        "property-wrapped readings expected: {shapes:?}"
    );
}

#[test]
fn count_uses_the_counted_noun_as_relation() {
    let (templates, slots) = templates_of(HOW_MANY);
    let shapes = described(&templates, &slots, RuleKind::Count);
    assert!(
        shapes.contains(&"count ⟨children⟩(«Barack Obama», x)".to_string()),
        "{shapes:?}"
    );
}

#[test]
fn comparison_case_words_build_compare_shapes() {
    let (templates, slots) = templates_of(BORN_BEFORE);
    let shapes = described(&templates, &slots, RuleKind::VerbObject);
    assert!(
        shapes.contains(&"⟨born in⟩(x, v) ∧ v < «1950»".to_string()),
        "{shapes:?}"
    );
    assert!(
        slots
            .iter()
            .any(|(_, s)| matches!(&s.kind, SlotKind::Literal(values) if values[0] == Literal::Year(1950))),
        "1950 should be a literal slot"
    );
}

#[test]
fn adjectives_add_class_restrictions_without_replacing_the_reading() {
    let (templates, slots) = templates_of(CURRENT_CAPITAL);
    let shapes = described(&templates, &slots, RuleKind::AttributeOf);
    assert!(shapes.contains(&"⟨capital⟩(«France», x)".to_string()), "{shapes:?}");
    assert!(
        shapes.contains(&"⟨capital⟩(«France», x) ∧ type(x, «current»)".to_string()),
        "{shapes:?}"
    );
    // the adjective can also be part of the label
    assert!(shapes.contains(&"⟨current capital⟩(«France», x)".to_string()), "{shapes:?}");

    let class = slots
        .iter()
        .find(|(_, s)| s.surface == "current")
        .map(|(_, s)| s.kind.clone());
    assert_eq!(
        class,
        Some(SlotKind::Entity {
            expected: Some(ValueType::entity())
        })
    );
}

#[test]
fn answer_type_narrows_only_the_slots_naming_the_answer() {
    let mut slots = SlotTable::new();
    let birth = slots.relation("born", ["born".to_string()]);
    let marley = slots.entity("Bob Marley");
    let shape = Shape::relation(birth, template::Orientation::Subject, Shape::Entity(marley));

    let narrowed = slots.expect_answer(shape.clone(), ValueType::temporal());
    let Shape::Relation {
        relation, argument, ..
    } = &narrowed
    else {
        panic!("relation expected, got {narrowed:?}");
    };
    assert_ne!(*relation, birth);
    assert_eq!(
        slots.get(*relation).map(|s| s.kind.clone()),
        Some(SlotKind::Relation {
            subject: None,
            object: Some(ValueType::temporal())
        })
    );
    assert_eq!(**argument, Shape::Entity(marley));
    assert_eq!(slots.expect_answer(shape, ValueType::temporal()), narrowed);

    let keys = slots.lookups([*relation]);
    assert!(keys.iter().all(|k| k.kind
        == LookupKind::Relation {
            subject: None,
            object: Some(ValueType::temporal())
        }));

    let entity = slots.expect_answer(Shape::Entity(marley), ValueType::entity());
    let Shape::Entity(id) = entity else {
        panic!("entity expected");
    };
    assert_eq!(
        slots.get(id).map(|s| s.kind.clone()),
        Some(SlotKind::Entity {
            expected: Some(ValueType::entity())
        })
    );
}

#[test]
fn equal_spans_share_a_slot() {
    let mut slots = SlotTable::new();
    let a = slots.entity("France");
    let b = slots.entity("France");
    let c = slots.relation("capital", ["capital".to_string(), String::new()]);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(slots.len(), 2);
    assert_eq!(slots.get(c).map(|s| s.lookup_keys().len()), Some(1));
}

#[test]
fn shape_slots_are_in_first_occurrence_order() {
    let shape = Shape::count(Shape::relation(
        3,
        template::Orientation::Subject,
        Shape::all(vec![Shape::Entity(1), Shape::Entity(3), Shape::Entity(0)]),
    ));
    assert_eq!(shape.slots(), vec![3, 1, 0]);
}

// ============================================================================
// Re-attachment
// ============================================================================

#[test]
fn chained_modifiers_are_reattached() {
    let original = tree(POPULATION);
    let variants = reattachments(&original, 4);
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0], (original.clone(), 0));
    let (moved, moves) = &variants[1];
    assert_eq!(*moves, 1);
    assert_eq!(moved.head_of(9).map(|t| t.id), Some(4));
    assert_eq!(original.head_of(9).map(|t| t.id), Some(7));
}

#[test]
fn reattachment_respects_the_variant_cap() {
    assert_eq!(reattachments(&tree(POPULATION), 0).len(), 1);
    assert_eq!(reattachments(&tree(CAPITAL), 4).len(), 1);
}

#[test]
fn reattached_templates_carry_a_penalty() {
    let (templates, _) = templates_of(POPULATION);
    let penalty = AnalyzerPolicy::default().scoring.reattachment_penalty;
    assert!(templates.iter().any(|t| t.penalty == 1.0));
    assert!(templates.iter().any(|t| (t.penalty - penalty).abs() < 1e-12));
}

// ============================================================================
// Ranking
// ============================================================================

fn capital() -> Relation {
    Relation::binary("P36", "capital")
        .with_domain(ValueType::entity())
        .with_range(ValueType::entity())
}

fn candidate(country: &str, confidence: f64, rule: RuleKind, surface: &str) -> Candidate {
    let body = Formula::predicate(
        &capital(),
        vec![Formula::entity(country), Formula::variable("x")],
    )
    .expect("well typed");
    Candidate {
        query: Query::new("x", body).expect("closed").canonical(),
        confidence,
        provenance: Provenance {
            rule,
            priority: rule.priority(),
            choices: vec![SlotChoice {
                surface: surface.to_string(),
                kind: ChoiceKind::Entity,
                chosen: country.to_string(),
                label: country.to_string(),
                confidence,
            }],
        },
    }
}

#[test]
fn rank_keeps_the_best_of_equal_queries() {
    let ranked = rank(
        vec![
            candidate("Q142", 0.4, RuleKind::VerbObject, "France"),
            candidate("Q183", 0.5, RuleKind::AttributeOf, "Germany"),
            candidate("Q142", 0.9, RuleKind::AttributeOf, "France"),
        ],
        10,
    );
    assert_eq!(ranked.len(), 2);
    assert_relative_eq!(ranked[0].confidence, 0.9);
    assert_eq!(ranked[0].rule(), RuleKind::AttributeOf);
    assert_eq!(ranked[1].choice_for("Germany").map(|c| c.chosen.as_str()), Some("Q183"));
}

#[test]
fn rank_caps_and_breaks_ties_by_priority() {
    let ranked = rank(
        vec![
            candidate("Q1", 0.5, RuleKind::EntityDefinition, "a"),
            candidate("Q2", 0.5, RuleKind::AttributeOf, "b"),
            candidate("Q3", 0.5, RuleKind::Count, "c"),
        ],
        2,
    );
    let rules: Vec<RuleKind> = ranked.iter().map(Candidate::rule).collect();
    assert_eq!(rules, vec![RuleKind::AttributeOf, RuleKind::Count]);
}

#[test]
fn equal_confidence_and_priority_fall_back_to_text() {
    let a = candidate("Q1", 0.5, RuleKind::AttributeOf, "a");
    let b = candidate("Q2", 0.5, RuleKind::AttributeOf, "b");
    assert_eq!(compare_candidates(&a, &b), std::cmp::Ordering::Less);
    assert_eq!(compare_candidates(&b, &a), std::cmp::Ordering::Greater);
    assert_eq!(compare_candidates(&a, &a), std::cmp::Ordering::Equal);
}

// ============================================================================
// Disambiguation
// ============================================================================

#[test]
fn single_reading_needs_no_question() {
    let plan = plan(&[candidate("Q142", 0.9, RuleKind::AttributeOf, "France")]);
    assert!(!plan.is_ambiguous());
    assert_eq!(plan.depth(), 0);
}

#[test]
fn homonyms_become_a_question() {
    let candidates = vec![
        candidate("Q90", 0.9, RuleKind::AttributeOf, "Paris"),
        candidate("Q830149", 0.3, RuleKind::AttributeOf, "Paris"),
        candidate("Q64", 0.2, RuleKind::AttributeOf, "Berlin"),
    ];
    let DisambiguationPlan::Step(step) = plan(&candidates) else {
        panic!("expected a question");
    };
    assert_eq!(step.surface, "Paris");
    let chosen: Vec<&str> = step.options.iter().map(|o| o.chosen.as_str()).collect();
    assert_eq!(chosen, vec!["Q90", "Q830149"]);
    assert!(matches!(&*step.others, DisambiguationPlan::Candidates(c) if c.len() == 1));
    assert_eq!(DisambiguationPlan::Step(step).depth(), 1);
}

// ============================================================================
// Policy
// ============================================================================

#[test]
fn default_policy_is_valid() {
    assert_eq!(AnalyzerPolicy::default().validate(), Ok(()));
    let scoring = ScoringPolicy::default();
    assert!(RuleKind::ALL
        .windows(2)
        .all(|w| scoring.rule_weight(w[0]) >= scoring.rule_weight(w[1])));
}

#[test]
fn policy_rejects_zero_limits_and_bad_weights() {
    let zero = AnalyzerPolicy {
        max_candidates: 0,
        ..AnalyzerPolicy::default()
    };
    assert_eq!(
        zero.validate(),
        Err(PolicyError::Zero {
            field: "max_candidates"
        })
    );

    let mut heavy = AnalyzerPolicy::default();
    heavy.scoring.count = 1.5;
    assert!(matches!(
        heavy.validate(),
        Err(PolicyError::OutOfRange { field: "count", .. })
    ));

    let mut negative = AnalyzerPolicy::default();
    negative.scoring.wellformed_bonus = -0.1;
    assert!(matches!(negative.validate(), Err(PolicyError::NegativeBonus(_))));
}

#[test]
fn policy_reads_partial_json() {
    let policy: AnalyzerPolicy =
        serde_json::from_str(r#"{ "max_candidates": 3, "scoring": { "count": 0.5 } }"#)
            .expect("valid policy");
    assert_eq!(policy.max_candidates, 3);
    assert_relative_eq!(policy.scoring.count, 0.5);
    assert_relative_eq!(policy.scoring.attribute_of, 1.0);
    assert_eq!(policy.max_expansions, AnalyzerPolicy::default().max_expansions);
}

#[test]
fn rule_names_are_kebab_case() {
    assert_eq!(
        serde_json::to_string(&RuleKind::QuestionProperty).expect("serializes"),
        "\"question-property\""
    );
    assert_eq!(RuleKind::EntityDefinition.to_string(), "entity-definition");
}
