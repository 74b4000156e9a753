//! Rendering of queries as SPARQL `SELECT` queries.
//!
//! ```text
//! λ?x.P36(Q142, ?x)
//!   ──►  SELECT DISTINCT ?x WHERE { wd:Q142 wdt:P36 ?x . }
//! ```
//!
//! Entity ids are compacted with the entity prefix, relation ids with the
//! relation prefix. Ids that are already absolute IRIs are written as
//! `<...>`. Only binary predicates can be rendered as triple patterns.

use crate::formula::{CompareOp, Formula, FormulaKind};
use crate::query::Query;
use crate::types::{EntityId, Literal, RelationId, Variable};
use crate::FormulaError;
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct SparqlOptions {
    /// `(prefix, namespace IRI)` used for entity constants.
    pub entity_prefix: (String, String),
    /// `(prefix, namespace IRI)` used for relation ids.
    pub relation_prefix: (String, String),
    pub limit: Option<usize>,
}

impl Default for SparqlOptions {
    fn default() -> Self {
        Self {
            entity_prefix: (
                "wd".to_string(),
                "http://www.wikidata.org/entity/".to_string(),
            ),
            relation_prefix: (
                "wdt".to_string(),
                "http://www.wikidata.org/prop/direct/".to_string(),
            ),
            limit: Some(100),
        }
    }
}

impl SparqlOptions {
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Name of the projected variable holding an aggregate result.
pub fn aggregate_result_name(query: &Query) -> Option<String> {
    query
        .top_aggregate()
        .map(|(op, _)| op.name().to_string())
}

/// Render `query` as a SPARQL `SELECT` query.
pub fn render_sparql(query: &Query, options: &SparqlOptions) -> Result<String, FormulaError> {
    let mut renderer = Renderer {
        options,
        names: HashMap::new(),
        counter: 0,
    };
    renderer
        .names
        .insert(query.answer().clone(), query.answer().as_str().to_string());

    let (projection, pattern_source) = match query.top_aggregate() {
        Some((op, body)) => (
            format!(
                "({}(DISTINCT ?{}) AS ?{})",
                op.name().to_uppercase(),
                query.answer().as_str(),
                op.name()
            ),
            body,
        ),
        None => (format!("?{}", query.answer().as_str()), query.body()),
    };

    let mut body = String::new();
    renderer.pattern(pattern_source, 1, &mut body)?;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "PREFIX {}: <{}>",
        options.entity_prefix.0, options.entity_prefix.1
    );
    let _ = writeln!(
        out,
        "PREFIX {}: <{}>",
        options.relation_prefix.0, options.relation_prefix.1
    );
    let _ = writeln!(out, "PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>");
    let _ = writeln!(out, "SELECT DISTINCT {projection} WHERE {{");
    out.push_str(&body);
    out.push('}');
    if let Some(limit) = options.limit {
        let _ = write!(out, "\nLIMIT {limit}");
    }
    Ok(out)
}

struct Renderer<'a> {
    options: &'a SparqlOptions,
    /// SPARQL names of the variables currently in scope.
    names: HashMap<Variable, String>,
    counter: usize,
}

impl Renderer<'_> {
    fn pattern(&mut self, f: &Formula, indent: usize, out: &mut String) -> Result<(), FormulaError> {
        let pad = "  ".repeat(indent);
        match f.kind() {
            FormulaKind::Predicate { relation, args } => {
                if args.len() != 2 {
                    return Err(FormulaError::UnsupportedSparql(format!(
                        "{}-ary predicate {relation}",
                        args.len()
                    )));
                }
                let s = self.term(&args[0])?;
                let o = self.term(&args[1])?;
                let p = self.relation(relation);
                let _ = writeln!(out, "{pad}{s} {p} {o} .");
            }
            FormulaKind::And(parts) => {
                // filters after the patterns binding their variables
                let (filters, patterns): (Vec<&Formula>, Vec<&Formula>) = parts
                    .iter()
                    .partition(|p| matches!(p.kind(), FormulaKind::Not(_)) || self.is_filter(p));
                for part in patterns.into_iter().chain(filters) {
                    self.pattern(part, indent, out)?;
                }
            }
            FormulaKind::Or(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        let _ = writeln!(out, "{pad}UNION");
                    }
                    let _ = writeln!(out, "{pad}{{");
                    self.pattern(part, indent + 1, out)?;
                    let _ = writeln!(out, "{pad}}}");
                }
            }
            FormulaKind::Not(inner) => {
                let _ = writeln!(out, "{pad}FILTER NOT EXISTS {{");
                self.pattern(inner, indent + 1, out)?;
                let _ = writeln!(out, "{pad}}}");
            }
            FormulaKind::Exists { var, body } => {
                self.counter += 1;
                let fresh = format!("{}_{}", var.as_str(), self.counter);
                let previous = self.names.insert(var.clone(), fresh);
                let result = self.pattern(body, indent, out);
                match previous {
                    Some(name) => self.names.insert(var.clone(), name),
                    None => self.names.remove(var),
                };
                result?;
            }
            FormulaKind::Compare { op, lhs, rhs } => {
                let l = self.term(lhs)?;
                let r = self.term(rhs)?;
                match (op, lhs.kind(), rhs.kind()) {
                    (
                        CompareOp::Eq,
                        FormulaKind::Variable(_),
                        FormulaKind::EntityConstant(_) | FormulaKind::LiteralConstant(_),
                    ) => {
                        let _ = writeln!(out, "{pad}VALUES {l} {{ {r} }}");
                    }
                    (
                        CompareOp::Eq,
                        FormulaKind::EntityConstant(_) | FormulaKind::LiteralConstant(_),
                        FormulaKind::Variable(_),
                    ) => {
                        let _ = writeln!(out, "{pad}VALUES {r} {{ {l} }}");
                    }
                    _ => {
                        let _ = writeln!(out, "{pad}FILTER({l} {} {r})", op.symbol());
                    }
                }
            }
            FormulaKind::Aggregate { .. } => {
                return Err(FormulaError::UnsupportedSparql(
                    "aggregate below the top of the query".to_string(),
                ));
            }
            FormulaKind::Variable(_)
            | FormulaKind::EntityConstant(_)
            | FormulaKind::LiteralConstant(_) => {
                return Err(FormulaError::UnsupportedSparql(format!(
                    "bare term {f} used as a pattern"
                )));
            }
        }
        Ok(())
    }

    fn is_filter(&self, f: &Formula) -> bool {
        match f.kind() {
            FormulaKind::Compare { op, lhs, rhs } => {
                *op != CompareOp::Eq || lhs.as_variable().is_some() == rhs.as_variable().is_some()
            }
            _ => false,
        }
    }

    fn term(&self, f: &Formula) -> Result<String, FormulaError> {
        match f.kind() {
            FormulaKind::Variable(v) => Ok(format!(
                "?{}",
                self.names.get(v).map(String::as_str).unwrap_or(v.as_str())
            )),
            FormulaKind::EntityConstant(id) => Ok(self.entity(id)),
            FormulaKind::LiteralConstant(l) => Ok(literal(l)),
            _ => Err(FormulaError::NotATerm(f.to_string())),
        }
    }

    fn entity(&self, id: &EntityId) -> String {
        compact(id.as_str(), &self.options.entity_prefix.0)
    }

    fn relation(&self, id: &RelationId) -> String {
        compact(id.as_str(), &self.options.relation_prefix.0)
    }
}

fn compact(id: &str, prefix: &str) -> String {
    let mut chars = id.chars();
    let local = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if local {
        format!("{prefix}:{id}")
    } else {
        format!("<{id}>")
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn literal(l: &Literal) -> String {
    match l {
        Literal::String(s) => format!("\"{}\"", escape(s)),
        Literal::LangString { value, language } => format!("\"{}\"@{language}", escape(value)),
        Literal::Integer(i) => i.to_string(),
        Literal::Decimal(d) => format!("\"{d}\"^^xsd:decimal"),
        Literal::Boolean(b) => b.to_string(),
        Literal::Date(_) => format!("\"{}\"^^xsd:date", l.lexical()),
        Literal::DateTime(_) => format!("\"{}\"^^xsd:dateTime", l.lexical()),
        Literal::Year(_) => format!("\"{}\"^^xsd:gYear", l.lexical()),
        Literal::YearMonth { .. } => format!("\"{}\"^^xsd:gYearMonth", l.lexical()),
    }
}
