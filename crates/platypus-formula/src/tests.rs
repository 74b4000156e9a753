use super::*;

fn capital() -> Relation {
    Relation::binary("P36", "capital")
        .with_domain(ValueType::entity())
        .with_range(ValueType::entity())
}

fn birth_date() -> Relation {
    Relation::binary("P569", "date of birth")
        .with_domain(ValueType::entity())
        .with_range(ValueType::temporal())
}

fn capital_of_france() -> Formula {
    Formula::predicate(
        &capital(),
        vec![Formula::entity("Q142"), Formula::variable("x")],
    )
    .expect("well typed")
}

// ============================================================================
// Constructors
// ============================================================================

#[test]
fn predicate_checks_arity() {
    let err = Formula::predicate(&capital(), vec![Formula::entity("Q142")]).unwrap_err();
    assert_eq!(
        err,
        FormulaError::ArityMismatch {
            relation: RelationId::from("P36"),
            expected: 2,
            found: 1
        }
    );
}

#[test]
fn predicate_rejects_ill_typed_constant() {
    let err = Formula::predicate(
        &birth_date(),
        vec![Formula::variable("x"), Formula::entity("Q90")],
    )
    .unwrap_err();
    assert!(matches!(err, FormulaError::ArgumentType { position: 1, .. }));
}

#[test]
fn predicate_rejects_non_term_argument() {
    let err = Formula::predicate(
        &capital(),
        vec![capital_of_france(), Formula::variable("x")],
    )
    .unwrap_err();
    assert!(matches!(err, FormulaError::NotATerm(_)));
}

#[test]
fn compare_requires_orderable_types() {
    let err = Formula::compare(
        CompareOp::Lt,
        Formula::entity("Q1"),
        Formula::entity("Q2"),
    )
    .unwrap_err();
    assert!(matches!(err, FormulaError::IncompatibleComparison { .. }));

    assert!(Formula::compare(
        CompareOp::Lt,
        Formula::variable("d"),
        Formula::literal(Literal::Year(1900)),
    )
    .is_ok());
}

#[test]
fn connectives_are_flattened_sorted_and_deduplicated() {
    let a = capital_of_france();
    let b = Formula::compare(
        CompareOp::Eq,
        Formula::variable("x"),
        Formula::entity("Q90"),
    )
    .expect("compare");

    let left = Formula::and(vec![a.clone(), Formula::and(vec![b.clone(), a.clone()]).unwrap()]).unwrap();
    let right = Formula::and(vec![b.clone(), a.clone()]).unwrap();
    assert_eq!(left, right);
    match left.kind() {
        FormulaKind::And(parts) => assert_eq!(parts.len(), 2),
        other => panic!("expected a conjunction, got {other:?}"),
    }

    assert_eq!(Formula::or(vec![a.clone(), a.clone()]).unwrap(), a);
    assert_eq!(
        Formula::and(vec![]).unwrap_err(),
        FormulaError::EmptyConnective("and")
    );
}

#[test]
fn double_negation_cancels() {
    let a = capital_of_france();
    assert_eq!(Formula::not(Formula::not(a.clone())), a);
}

#[test]
fn vacuous_exists_is_dropped() {
    let a = capital_of_france();
    assert_eq!(Formula::exists("y", a.clone()), a);
}

#[test]
fn aggregate_requires_its_variable() {
    let err = Formula::aggregate(AggregateOp::Count, "y", capital_of_france()).unwrap_err();
    assert_eq!(err, FormulaError::UnusedAggregateVariable(Variable::from("y")));
}

// ============================================================================
// Variables and substitution
// ============================================================================

#[test]
fn free_variables_skip_bound_ones() {
    let body = Formula::and(vec![
        Formula::predicate(&capital(), vec![Formula::variable("c"), Formula::variable("x")]).unwrap(),
        Formula::predicate(&capital(), vec![Formula::variable("c"), Formula::variable("y")]).unwrap(),
    ])
    .unwrap();
    let f = Formula::exists("c", body);
    let free: Vec<_> = f.free_variables().into_iter().map(|v| v.0).collect();
    assert_eq!(free, vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn substitute_replaces_free_occurrences_only() {
    let inner = Formula::predicate(&capital(), vec![Formula::variable("x"), Formula::variable("y")]).unwrap();
    let shadowed = Formula::exists("x", inner.clone());
    let f = Formula::and(vec![inner, shadowed.clone()]).unwrap();

    let out = f
        .substitute(&Variable::from("x"), &Formula::entity("Q142"))
        .expect("term replacement");
    let expected = Formula::and(vec![
        Formula::predicate(&capital(), vec![Formula::entity("Q142"), Formula::variable("y")]).unwrap(),
        shadowed,
    ])
    .unwrap();
    assert_eq!(out, expected);
}

#[test]
fn substitute_avoids_capture() {
    // ∃y. P36(x, y)  with x := ?y  must not become ∃y. P36(y, y)
    let f = Formula::exists(
        "y",
        Formula::predicate(&capital(), vec![Formula::variable("x"), Formula::variable("y")]).unwrap(),
    );
    let out = f
        .substitute(&Variable::from("x"), &Formula::variable("y"))
        .unwrap();
    assert_eq!(out.free_variables().len(), 1);
    assert!(out.free_variables().contains(&Variable::from("y")));
    assert_ne!(out.to_string(), "∃?y.P36(?y, ?y)");
}

#[test]
fn substitute_rejects_non_terms() {
    let f = capital_of_france();
    let err = f
        .substitute(&Variable::from("x"), &capital_of_france())
        .unwrap_err();
    assert!(matches!(err, FormulaError::NotATerm(_)));
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn query_rejects_stray_free_variables() {
    let body = Formula::predicate(&capital(), vec![Formula::variable("y"), Formula::variable("x")]).unwrap();
    assert_eq!(
        Query::new("x", body).unwrap_err(),
        FormulaError::UnboundVariable(Variable::from("y"))
    );
}

#[test]
fn canonical_form_ignores_variable_names() {
    let a = Query::new(
        "result1",
        Formula::exists(
            "arg7",
            Formula::and(vec![
                Formula::predicate(&capital(), vec![Formula::variable("arg7"), Formula::variable("result1")]).unwrap(),
                Formula::compare(CompareOp::Eq, Formula::variable("arg7"), Formula::entity("Q142")).unwrap(),
            ])
            .unwrap(),
        ),
    )
    .unwrap();
    let b = Query::new(
        "answer",
        Formula::exists(
            "z",
            Formula::and(vec![
                Formula::compare(CompareOp::Eq, Formula::variable("z"), Formula::entity("Q142")).unwrap(),
                Formula::predicate(&capital(), vec![Formula::variable("z"), Formula::variable("answer")]).unwrap(),
            ])
            .unwrap(),
        ),
    )
    .unwrap();
    assert_ne!(a, b);
    assert_eq!(a.canonical(), b.canonical());
    assert_eq!(a.canonical().answer().as_str(), CANONICAL_ANSWER);
}

#[test]
fn display_is_readable() {
    let q = Query::new("x", capital_of_france()).unwrap();
    assert_eq!(q.to_string(), "λ?x.P36(Q142, ?x)");
}

// ============================================================================
// Literals and types
// ============================================================================

#[test]
fn temporal_literals_compare_as_intervals() {
    let born = Literal::Date(chrono::NaiveDate::from_ymd_opt(1879, 3, 14).unwrap());
    assert_eq!(
        born.semantic_cmp(&Literal::Year(1900)),
        Some(std::cmp::Ordering::Less)
    );
    assert_eq!(born.semantic_cmp(&Literal::Year(1879)), None);
    assert_eq!(
        Literal::Integer(3).semantic_cmp(&Literal::Decimal(2.5)),
        Some(std::cmp::Ordering::Greater)
    );
}

#[test]
fn value_type_serializes_as_kind_list() {
    let t = ValueType::entity().union(ValueType::temporal());
    let json = serde_json::to_string(&t).unwrap();
    assert_eq!(json, r#"["entity","temporal"]"#);
    let back: ValueType = serde_json::from_str(&json).unwrap();
    assert_eq!(back, t);
    assert!(ValueType::top().is_compatible(t));
    assert!(!ValueType::number().is_compatible(t));
}

// ============================================================================
// SPARQL
// ============================================================================

#[test]
fn sparql_renders_simple_triple() {
    let q = Query::new("x", capital_of_france()).unwrap();
    let sparql = render_sparql(&q, &SparqlOptions::default()).unwrap();
    assert!(sparql.contains("SELECT DISTINCT ?x WHERE {"));
    assert!(sparql.contains("  wd:Q142 wdt:P36 ?x ."));
    assert!(sparql.ends_with("LIMIT 100"));
}

#[test]
fn sparql_renders_union_negation_and_filters() {
    let born = Formula::predicate(&birth_date(), vec![Formula::variable("x"), Formula::variable("d")]).unwrap();
    let before = Formula::compare(
        CompareOp::Lt,
        Formula::variable("d"),
        Formula::literal(Literal::Year(1900)),
    )
    .unwrap();
    let body = Formula::or(vec![
        Formula::exists("d", Formula::and(vec![born, before]).unwrap()),
        Formula::not(capital_of_france()),
    ])
    .unwrap();
    // Not alone in a union branch is unusual but renders
    let q = Query::new("x", body).unwrap();
    let sparql = render_sparql(&q, &SparqlOptions::default().limit(None)).unwrap();
    assert!(sparql.contains("UNION"));
    assert!(sparql.contains("FILTER NOT EXISTS {"));
    assert!(sparql.contains("FILTER(?d_1 < \"1900\"^^xsd:gYear)"));
    assert!(!sparql.contains("LIMIT"));

    let filter = sparql.find("FILTER(").unwrap();
    let triple = sparql.find("wdt:P569").unwrap();
    assert!(triple < filter, "filters come after the triple patterns");
}

#[test]
fn sparql_renders_top_level_count() {
    let body = Formula::aggregate(AggregateOp::Count, "x", capital_of_france()).unwrap();
    let q = Query::new("x", body).unwrap();
    let sparql = render_sparql(&q, &SparqlOptions::default()).unwrap();
    assert!(sparql.contains("SELECT DISTINCT (COUNT(DISTINCT ?x) AS ?count) WHERE {"));
    assert_eq!(sparql::aggregate_result_name(&q).as_deref(), Some("count"));
}

#[test]
fn sparql_rejects_nested_aggregates_and_nary_predicates() {
    let triple = Relation::binary("P1", "between").with_arity(3);
    let f = Formula::predicate(
        &triple,
        vec![Formula::variable("x"), Formula::entity("Q1"), Formula::entity("Q2")],
    )
    .unwrap();
    let q = Query::new("x", f).unwrap();
    assert!(matches!(
        render_sparql(&q, &SparqlOptions::default()),
        Err(FormulaError::UnsupportedSparql(_))
    ));
}
