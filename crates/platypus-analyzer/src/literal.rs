//! Local parsing of literal spans: numbers, years, dates.
//!
//! ```text
//! "1945"              → gYear 1945, integer 1945
//! "February 6, 1945"  → date 1945-02-06
//! "6 février 1945"    → date 1945-02-06
//! "March 1945"        → gYearMonth 1945-03
//! "3.5"               → decimal 3.5
//! ```
//!
//! Only literals compatible with the expected type are returned, most
//! specific reading first.

use chrono::NaiveDate;
use platypus_formula::{Literal, ValueType};
use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    year: Option<Regex>,
    iso_date: Option<Regex>,
    year_month: Option<Regex>,
    day_month_year: Option<Regex>,
    month_day_year: Option<Regex>,
    month_year: Option<Regex>,
    integer: Option<Regex>,
    decimal: Option<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        year: Regex::new(r"^(?:in |en |en el año |im jahr )?(-?\d{3,4})$").ok(),
        iso_date: Regex::new(r"^(-?\d{4})-(\d{2})-(\d{2})$").ok(),
        year_month: Regex::new(r"^(-?\d{4})-(\d{2})$").ok(),
        day_month_year: Regex::new(r"^(\d{1,2})(?:er|st|nd|rd|th)?\.? (?:de )?(\p{L}+)\.?,? (?:de )?(-?\d{1,4})$").ok(),
        month_day_year: Regex::new(r"^(\p{L}+)\.? (\d{1,2})(?:st|nd|rd|th)?,? (-?\d{1,4})$").ok(),
        month_year: Regex::new(r"^(\p{L}+)\.? (?:de |of )?(-?\d{1,4})$").ok(),
        integer: Regex::new(r"^[-+]?\d+$").ok(),
        decimal: Regex::new(r"^[-+]?\d*[.,]\d+$").ok(),
    })
}

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("jan", 1),
    ("janvier", 1),
    ("enero", 1),
    ("januar", 1),
    ("february", 2),
    ("feb", 2),
    ("février", 2),
    ("fevrier", 2),
    ("febrero", 2),
    ("februar", 2),
    ("march", 3),
    ("mar", 3),
    ("mars", 3),
    ("marzo", 3),
    ("märz", 3),
    ("april", 4),
    ("apr", 4),
    ("avril", 4),
    ("abril", 4),
    ("may", 5),
    ("mai", 5),
    ("mayo", 5),
    ("june", 6),
    ("jun", 6),
    ("juin", 6),
    ("junio", 6),
    ("juni", 6),
    ("july", 7),
    ("jul", 7),
    ("juillet", 7),
    ("julio", 7),
    ("juli", 7),
    ("august", 8),
    ("aug", 8),
    ("août", 8),
    ("aout", 8),
    ("agosto", 8),
    ("september", 9),
    ("sep", 9),
    ("sept", 9),
    ("septembre", 9),
    ("septiembre", 9),
    ("october", 10),
    ("oct", 10),
    ("octobre", 10),
    ("octubre", 10),
    ("oktober", 10),
    ("november", 11),
    ("nov", 11),
    ("novembre", 11),
    ("noviembre", 11),
    ("december", 12),
    ("dec", 12),
    ("décembre", 12),
    ("decembre", 12),
    ("diciembre", 12),
    ("dezember", 12),
];

fn month(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    MONTHS.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
}

fn captures<'t>(re: &Option<Regex>, text: &'t str) -> Option<regex::Captures<'t>> {
    re.as_ref()?.captures(text)
}

fn number<T: std::str::FromStr>(caps: &regex::Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

/// Temporal readings of `text`, most precise first.
fn temporal(text: &str) -> Vec<Literal> {
    let p = patterns();
    let date = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).map(Literal::Date);

    if let Some(c) = captures(&p.iso_date, text) {
        return date(number(&c, 1).unwrap_or(0), number(&c, 2).unwrap_or(0), number(&c, 3).unwrap_or(0))
            .into_iter()
            .collect();
    }
    if let Some(c) = captures(&p.year_month, text) {
        let (year, month): (Option<i32>, Option<u32>) = (number(&c, 1), number(&c, 2));
        return match (year, month) {
            (Some(year), Some(month)) if (1..=12).contains(&month) => {
                vec![Literal::YearMonth { year, month }]
            }
            _ => Vec::new(),
        };
    }
    if let Some(c) = captures(&p.day_month_year, text) {
        if let (Some(d), Some(m), Some(y)) = (number(&c, 1), c.get(2).and_then(|m| month(m.as_str())), number(&c, 3)) {
            return date(y, m, d).into_iter().collect();
        }
    }
    if let Some(c) = captures(&p.month_day_year, text) {
        if let (Some(m), Some(d), Some(y)) = (c.get(1).and_then(|m| month(m.as_str())), number(&c, 2), number(&c, 3)) {
            return date(y, m, d).into_iter().collect();
        }
    }
    if let Some(c) = captures(&p.month_year, text) {
        if let (Some(month), Some(year)) = (c.get(1).and_then(|m| month(m.as_str())), number(&c, 2)) {
            return vec![Literal::YearMonth { year, month }];
        }
    }
    if let Some(c) = captures(&p.year, text) {
        if let Some(year) = number(&c, 1) {
            return vec![Literal::Year(year)];
        }
    }
    Vec::new()
}

fn numeric(text: &str) -> Vec<Literal> {
    let p = patterns();
    if p.integer.as_ref().is_some_and(|re| re.is_match(text)) {
        return text
            .trim_start_matches('+')
            .parse()
            .map(Literal::Integer)
            .into_iter()
            .collect();
    }
    if p.decimal.as_ref().is_some_and(|re| re.is_match(text)) {
        return text
            .replace(',', ".")
            .parse()
            .map(Literal::Decimal)
            .into_iter()
            .collect();
    }
    Vec::new()
}

/// Literal readings of `text` compatible with `expected` (`None` accepts
/// every type). Plain strings are never produced: a span that is not a
/// number or a date is left to entity resolution.
pub fn parse_literal(text: &str, expected: Option<ValueType>) -> Vec<Literal> {
    let text = text.trim().to_lowercase();
    let text = text.trim_end_matches(['?', '.', '!']).trim();
    if text.is_empty() {
        return Vec::new();
    }
    let accepts = |l: &Literal| expected.map_or(true, |t| t.is_compatible(l.value_type()));
    temporal(text)
        .into_iter()
        .chain(numeric(text))
        .filter(accepts)
        .collect()
}
