//! Wikidata-style backend: a JSON-LD label search service for resolution
//! and a SPARQL endpoint for execution.
//!
//! ```text
//!   resolve_entities("France") ──► GET {search}/search/simple?q=France&lang=en
//!                                   member[].result { "@id": "wd:Q142", ... }
//!
//!   execute(λ?x. P36(Q142, ?x)) ──► GET {sparql}?query=SELECT ...
//!                                   results.bindings[].x { type, value, ... }
//! ```
//!
//! Response parsing lives outside the `http` feature so it can be tested
//! without a network stack.

use crate::connector::{AnswerBinding, EntityCandidate, RelationCandidate, Value};
use chrono::{NaiveDate, TimeZone, Utc};
use platypus_formula::{EntityId, Literal, Relation, RelationId, ValueKind, ValueType, Variable};
use serde_json::Value as Json;

const ENTITY_IRI: &str = "http://www.wikidata.org/entity/";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// Confidence decays geometrically with the search rank.
const RANK_DECAY: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ResponseError(pub String);

fn invalid(what: impl Into<String>) -> ResponseError {
    ResponseError(what.into())
}

// ============================================================================
// Search responses
// ============================================================================

fn search_members(body: &Json) -> Result<&Vec<Json>, ResponseError> {
    body.get("member")
        .and_then(Json::as_array)
        .ok_or_else(|| invalid("search response has no `member` array"))
}

fn result_types(result: &Json) -> Vec<&str> {
    match result.get("@type") {
        Some(Json::String(t)) => vec![t.as_str()],
        Some(Json::Array(ts)) => ts.iter().filter_map(Json::as_str).collect(),
        _ => Vec::new(),
    }
}

fn rank_confidence(rank: usize) -> f64 {
    RANK_DECAY.powi(rank as i32)
}

/// Entities out of a search response, in the service's order.
pub fn parse_entity_search(body: &Json, span: &str) -> Result<Vec<EntityCandidate>, ResponseError> {
    let mut out = Vec::new();
    for member in search_members(body)? {
        let Some(result) = member.get("result") else {
            continue;
        };
        let Some(id) = result.get("@id").and_then(Json::as_str) else {
            return Err(invalid("search result without `@id`"));
        };
        let Some(local) = id.strip_prefix("wd:") else {
            continue;
        };
        let label = result
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or(span)
            .to_string();
        out.push(EntityCandidate {
            id: EntityId::new(local),
            label,
            description: result
                .get("description")
                .and_then(Json::as_str)
                .map(str::to_string),
            value_type: ValueType::entity(),
            confidence: rank_confidence(out.len()),
        });
    }
    Ok(out)
}

/// Maps a search-service `range` to the value type of the property's object.
pub fn range_type(range: &str) -> Option<ValueType> {
    let kind = match range {
        "NamedIndividual" | "Property" => ValueKind::Entity,
        "xsd:dateTime" | "xsd:date" | "xsd:gYear" | "xsd:gYearMonth" | "xsd:duration" => {
            ValueKind::Temporal
        }
        "xsd:decimal" | "xsd:double" | "xsd:float" | "xsd:integer" => ValueKind::Number,
        "xsd:boolean" => ValueKind::Boolean,
        "xsd:string" | "rdf:langString" | "xsd:anyURI" | "geo:wktLiteral" => ValueKind::String,
        _ => return None,
    };
    Some(ValueType::of(kind))
}

/// Properties out of a search response. Results that are neither object
/// nor datatype properties, or have an unknown range, are skipped.
pub fn parse_property_search(
    body: &Json,
    label: &str,
) -> Result<Vec<RelationCandidate>, ResponseError> {
    let mut out = Vec::new();
    for member in search_members(body)? {
        let Some(result) = member.get("result") else {
            continue;
        };
        let Some(local) = result
            .get("@id")
            .and_then(Json::as_str)
            .and_then(|id| id.strip_prefix("wdt:"))
        else {
            continue;
        };
        let types = result_types(result);
        if !types.contains(&"ObjectProperty") && !types.contains(&"DatatypeProperty") {
            tracing::debug!(id = local, "skipping search result that is not a property");
            continue;
        }
        let Some(range) = result
            .get("range")
            .and_then(Json::as_str)
            .and_then(range_type)
        else {
            tracing::debug!(id = local, "skipping property with unknown range");
            continue;
        };
        let name = result
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or(label)
            .to_string();
        out.push(RelationCandidate {
            relation: Relation::binary(RelationId::new(local), name)
                .with_domain(ValueType::entity())
                .with_range(range),
            matched_label: label.to_string(),
            confidence: rank_confidence(out.len()),
        });
    }
    Ok(out)
}

/// Wikidata properties linking an item to a class it belongs to.
const WIKIDATA_TYPE_PROPERTIES: &[(&str, &str)] = &[
    ("P21", "sex or gender"),
    ("P27", "country of citizenship"),
    ("P31", "instance of"),
    ("P105", "taxon rank"),
    ("P106", "occupation"),
    ("P136", "genre"),
];

pub fn wikidata_type_relations() -> Vec<Relation> {
    WIKIDATA_TYPE_PROPERTIES
        .iter()
        .map(|(id, label)| {
            Relation::binary(RelationId::new(*id), *label)
                .with_domain(ValueType::entity())
                .with_range(ValueType::entity())
        })
        .collect()
}

// ============================================================================
// SPARQL JSON results
// ============================================================================

/// Reduces a WDQS timestamp to the coarsest literal that loses nothing:
/// `1879-03-14T00:00:00Z` is a date, `1879-03-00T00:00:00Z` a year-month.
pub fn parse_wdqs_time(value: &str) -> Option<Literal> {
    let (date, time) = value.trim_end_matches('Z').split_once('T')?;
    let (sign, digits) = match date.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, date.strip_prefix('+').unwrap_or(date)),
    };
    let mut parts = digits.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year = sign * year;

    let mut clock = time.splitn(3, ':').map(|p| p.parse::<u32>().ok());
    let (hour, minute, second) = (clock.next()??, clock.next()??, clock.next()??);

    if hour != 0 || minute != 0 || second != 0 {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let naive = date.and_hms_opt(hour, minute, second)?;
        return Some(Literal::DateTime(Utc.from_utc_datetime(&naive)));
    }
    if month == 0 {
        return Some(Literal::Year(year));
    }
    if day == 0 {
        return Some(Literal::YearMonth { year, month });
    }
    NaiveDate::from_ymd_opt(year, month, day).map(Literal::Date)
}

fn typed_literal(value: &str, datatype: &str) -> Option<Literal> {
    let Some(local) = datatype.strip_prefix(XSD) else {
        return Some(Literal::String(value.to_string()));
    };
    match local {
        "dateTime" => parse_wdqs_time(value),
        "date" => NaiveDate::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%d")
            .ok()
            .map(Literal::Date),
        "gYear" => value.parse().ok().map(Literal::Year),
        "integer" | "int" | "long" | "nonNegativeInteger" => {
            value.parse().ok().map(Literal::Integer)
        }
        "decimal" | "double" | "float" => value.parse().ok().map(Literal::Decimal),
        "boolean" => match value {
            "true" | "1" => Some(Literal::Boolean(true)),
            "false" | "0" => Some(Literal::Boolean(false)),
            _ => None,
        },
        _ => Some(Literal::String(value.to_string())),
    }
}

/// Converts one RDF term of a SPARQL JSON result. Blank nodes yield `None`.
pub fn parse_term(term: &Json) -> Result<Option<Value>, ResponseError> {
    let kind = term
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(format!("term without type: {term}")))?;
    let value = term
        .get("value")
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(format!("term without value: {term}")))?;
    match kind {
        "uri" => Ok(Some(match value.strip_prefix(ENTITY_IRI) {
            Some(local) => Value::Entity(EntityId::new(local)),
            None => Value::Literal(Literal::String(value.to_string())),
        })),
        "literal" | "typed-literal" => {
            if let Some(language) = term.get("xml:lang").and_then(Json::as_str) {
                return Ok(Some(Value::Literal(Literal::LangString {
                    value: value.to_string(),
                    language: language.to_string(),
                })));
            }
            match term.get("datatype").and_then(Json::as_str) {
                Some(RDF_LANG_STRING) | None => {
                    Ok(Some(Value::Literal(Literal::String(value.to_string()))))
                }
                Some(datatype) => typed_literal(value, datatype)
                    .map(|l| Some(Value::Literal(l)))
                    .ok_or_else(|| invalid(format!("bad {datatype} literal {value:?}"))),
            }
        }
        "bnode" => Ok(None),
        other => Err(invalid(format!("unsupported term type {other}"))),
    }
}

/// Values of `variable` in a SPARQL JSON result set, first appearance
/// order, duplicates removed, at most `limit`.
pub fn parse_sparql_results(
    body: &Json,
    variable: &str,
    answer: &Variable,
    limit: usize,
) -> Result<Vec<AnswerBinding>, ResponseError> {
    if let Some(boolean) = body.get("boolean").and_then(Json::as_bool) {
        return Ok(vec![AnswerBinding::new(
            answer.clone(),
            Value::Literal(Literal::Boolean(boolean)),
        )]);
    }
    let rows = body
        .get("results")
        .and_then(|r| r.get("bindings"))
        .and_then(Json::as_array)
        .ok_or_else(|| invalid("SPARQL response has no results.bindings"))?;

    let mut out: Vec<AnswerBinding> = Vec::new();
    for row in rows {
        let Some(term) = row.get(variable) else {
            continue;
        };
        let Some(value) = parse_term(term)? else {
            continue;
        };
        if out.iter().any(|b| b.value == value) {
            continue;
        }
        let mut binding = AnswerBinding::new(answer.clone(), value);
        if let Some(label) = row
            .get(format!("{variable}Label"))
            .and_then(|t| t.get("value"))
            .and_then(Json::as_str)
        {
            binding = binding.with_label(label);
        }
        out.push(binding);
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

// ============================================================================
// HTTP connector
// ============================================================================

#[cfg(feature = "http")]
pub use client::{SparqlConnector, SparqlConnectorConfig};

#[cfg(feature = "http")]
mod client {
    use super::*;
    use crate::connector::{Deadline, ExecutionError, KnowledgeConnector, LookupError};
    use async_trait::async_trait;
    use platypus_formula::{aggregate_result_name, render_sparql, Query, SparqlOptions};
    use std::time::Duration;
    use url::Url;

    #[derive(Debug, Clone)]
    pub struct SparqlConnectorConfig {
        /// Base URL of the label search service (`/search/simple` is appended).
        pub search_url: Url,
        pub sparql_url: Url,
        /// Maximum search results requested per lookup.
        pub search_limit: usize,
        pub lookup_timeout_ms: u64,
    }

    impl SparqlConnectorConfig {
        pub fn new(search_url: Url, sparql_url: Url) -> Self {
            Self {
                search_url,
                sparql_url,
                search_limit: 50,
                lookup_timeout_ms: 2_000,
            }
        }
    }

    pub struct SparqlConnector {
        client: reqwest::Client,
        config: SparqlConnectorConfig,
        options: SparqlOptions,
    }

    impl SparqlConnector {
        pub fn new(config: SparqlConnectorConfig) -> Self {
            Self {
                client: reqwest::Client::new(),
                config,
                options: SparqlOptions::default(),
            }
        }

        async fn search(
            &self,
            label: &str,
            language: &str,
            kind: Option<&str>,
        ) -> Result<Json, LookupError> {
            let mut url = self
                .config
                .search_url
                .join("search/simple")
                .map_err(|e| LookupError::Unavailable(e.to_string()))?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("q", label)
                    .append_pair("lang", language)
                    .append_pair("limit", &self.config.search_limit.to_string());
                if let Some(kind) = kind {
                    query.append_pair("type", kind);
                }
            }
            let response = self
                .client
                .get(url)
                .timeout(Duration::from_millis(self.config.lookup_timeout_ms))
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        LookupError::Timeout
                    } else {
                        LookupError::Unavailable(err.to_string())
                    }
                })?;
            if !response.status().is_success() {
                return Err(LookupError::Unavailable(format!(
                    "search service answered {}",
                    response.status()
                )));
            }
            response
                .json()
                .await
                .map_err(|e| LookupError::InvalidResponse(e.to_string()))
        }
    }

    #[async_trait]
    impl KnowledgeConnector for SparqlConnector {
        async fn resolve_entities(
            &self,
            span: &str,
            language: &str,
            expected: Option<ValueType>,
        ) -> Result<Vec<EntityCandidate>, LookupError> {
            if expected.is_some_and(|t| !t.is_compatible(ValueType::entity())) {
                return Ok(Vec::new());
            }
            let body = self.search(span, language, None).await?;
            parse_entity_search(&body, span).map_err(|e| LookupError::InvalidResponse(e.0))
        }

        async fn resolve_relations(
            &self,
            label: &str,
            language: &str,
            subject: Option<ValueType>,
            object: Option<ValueType>,
        ) -> Result<Vec<RelationCandidate>, LookupError> {
            let body = self.search(label, language, Some("Property")).await?;
            let found =
                parse_property_search(&body, label).map_err(|e| LookupError::InvalidResponse(e.0))?;
            Ok(found
                .into_iter()
                .filter(|c| {
                    subject.map_or(true, |t| t.is_compatible(c.relation.domain))
                        && object.map_or(true, |t| t.is_compatible(c.relation.range))
                })
                .collect())
        }

        async fn execute(
            &self,
            query: &Query,
            limit: usize,
            deadline: Deadline,
        ) -> Result<Vec<AnswerBinding>, ExecutionError> {
            let options = self.options.clone().limit(Some(limit));
            let sparql = render_sparql(query, &options)
                .map_err(|e| ExecutionError::Unsupported(e.to_string()))?;
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                return Err(ExecutionError::Timeout {
                    partial: Vec::new(),
                });
            }
            tracing::debug!(%sparql, "executing SPARQL query");

            let response = self
                .client
                .get(self.config.sparql_url.clone())
                .query(&[("query", sparql.as_str())])
                .header(reqwest::header::ACCEPT, "application/sparql-results+json")
                .timeout(remaining)
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        ExecutionError::Timeout {
                            partial: Vec::new(),
                        }
                    } else {
                        ExecutionError::Unavailable(err.to_string())
                    }
                })?;
            if !response.status().is_success() {
                return Err(ExecutionError::Unavailable(format!(
                    "SPARQL endpoint answered {}",
                    response.status()
                )));
            }
            let body: Json = response
                .json()
                .await
                .map_err(|e| ExecutionError::InvalidResponse(e.to_string()))?;
            let variable = aggregate_result_name(query)
                .unwrap_or_else(|| query.answer().as_str().to_string());
            parse_sparql_results(&body, &variable, query.answer(), limit)
                .map_err(|e| ExecutionError::InvalidResponse(e.0))
        }

        fn type_relations(&self) -> Vec<Relation> {
            wikidata_type_relations()
        }

        fn name(&self) -> &str {
            "sparql"
        }
    }
}
