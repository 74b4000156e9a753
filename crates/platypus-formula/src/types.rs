//! Identifiers, literal values and the value-type lattice.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// Identifiers
// ============================================================================

/// Knowledge-base identifier of an entity (e.g. `Q142`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

/// Knowledge-base identifier of a relation (e.g. `P36`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub String);

/// A logical variable. Displayed with a leading `?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(EntityId);
string_id!(RelationId);
string_id!(Variable);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

// ============================================================================
// Value types
// ============================================================================

/// The basic kinds of values a knowledge base can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Entity,
    String,
    Number,
    Temporal,
    Boolean,
}

impl ValueKind {
    pub const ALL: [ValueKind; 5] = [
        ValueKind::Entity,
        ValueKind::String,
        ValueKind::Number,
        ValueKind::Temporal,
        ValueKind::Boolean,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Entity => "entity",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Temporal => "temporal",
            ValueKind::Boolean => "boolean",
        }
    }
}

/// A set of [`ValueKind`]s, ordered by inclusion.
///
/// `top()` means "anything" (unknown type), `bottom()` means "nothing" (a
/// type error). Serialized as the list of member kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<ValueKind>", into = "Vec<ValueKind>")]
pub struct ValueType {
    bits: u8,
}

impl ValueType {
    const ALL_BITS: u8 = 0b1_1111;

    pub const fn top() -> Self {
        Self {
            bits: Self::ALL_BITS,
        }
    }

    pub const fn bottom() -> Self {
        Self { bits: 0 }
    }

    pub fn of(kind: ValueKind) -> Self {
        Self { bits: kind.bit() }
    }

    pub fn entity() -> Self {
        Self::of(ValueKind::Entity)
    }

    pub fn temporal() -> Self {
        Self::of(ValueKind::Temporal)
    }

    pub fn number() -> Self {
        Self::of(ValueKind::Number)
    }

    /// Kinds supporting `<`, `>`, `<=`, `>=`.
    pub fn orderable() -> Self {
        Self::of(ValueKind::Number)
            .union(Self::of(ValueKind::Temporal))
            .union(Self::of(ValueKind::String))
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    pub fn intersection(self, other: Self) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    pub fn is_top(self) -> bool {
        self.bits == Self::ALL_BITS
    }

    pub fn is_bottom(self) -> bool {
        self.bits == 0
    }

    pub fn contains(self, kind: ValueKind) -> bool {
        self.bits & kind.bit() != 0
    }

    /// True when some value could belong to both types.
    pub fn is_compatible(self, other: Self) -> bool {
        !self.intersection(other).is_bottom()
    }

    pub fn is_subtype_of(self, other: Self) -> bool {
        self.bits & !other.bits == 0
    }

    pub fn kinds(self) -> impl Iterator<Item = ValueKind> {
        ValueKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl Default for ValueType {
    fn default() -> Self {
        Self::top()
    }
}

impl From<ValueKind> for ValueType {
    fn from(kind: ValueKind) -> Self {
        Self::of(kind)
    }
}

impl From<Vec<ValueKind>> for ValueType {
    fn from(kinds: Vec<ValueKind>) -> Self {
        kinds
            .into_iter()
            .fold(Self::bottom(), |acc, k| acc.union(Self::of(k)))
    }
}

impl From<ValueType> for Vec<ValueKind> {
    fn from(value: ValueType) -> Self {
        value.kinds().collect()
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({self})")
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_top() {
            return f.write_str("⊤");
        }
        if self.is_bottom() {
            return f.write_str("⊥");
        }
        let names: Vec<&str> = self.kinds().map(ValueKind::name).collect();
        f.write_str(&names.join("|"))
    }
}

// ============================================================================
// Relations
// ============================================================================

/// Schema of a knowledge-base relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub label: String,
    #[serde(default = "default_arity")]
    pub arity: usize,
    /// Type of the first argument.
    #[serde(default)]
    pub domain: ValueType,
    /// Type of the last argument.
    #[serde(default)]
    pub range: ValueType,
}

fn default_arity() -> usize {
    2
}

impl Relation {
    pub fn binary(id: impl Into<RelationId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            arity: 2,
            domain: ValueType::top(),
            range: ValueType::top(),
        }
    }

    pub fn with_domain(mut self, domain: ValueType) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_range(mut self, range: ValueType) -> Self {
        self.range = range;
        self
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = arity;
        self
    }

    /// Expected type of the argument at `position`.
    pub fn argument_type(&self, position: usize) -> ValueType {
        if position == 0 {
            self.domain
        } else if position + 1 == self.arity {
            self.range
        } else {
            ValueType::top()
        }
    }
}

// ============================================================================
// Literals
// ============================================================================

/// A typed literal value.
///
/// Equality, ordering and hashing are structural (decimals use their total
/// order), so literals can live inside hashed and sorted formulas. Use
/// [`Literal::semantic_cmp`] for value comparisons across representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    String(String),
    LangString { value: String, language: String },
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Year(i32),
    YearMonth { year: i32, month: u32 },
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        ValueType::of(match self {
            Literal::String(_) | Literal::LangString { .. } => ValueKind::String,
            Literal::Integer(_) | Literal::Decimal(_) => ValueKind::Number,
            Literal::Boolean(_) => ValueKind::Boolean,
            Literal::Date(_)
            | Literal::DateTime(_)
            | Literal::Year(_)
            | Literal::YearMonth { .. } => ValueKind::Temporal,
        })
    }

    /// Plain lexical form, without datatype decoration.
    pub fn lexical(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::LangString { value, .. } => value.clone(),
            Literal::Integer(i) => i.to_string(),
            Literal::Decimal(d) => d.to_string(),
            Literal::Boolean(b) => b.to_string(),
            Literal::Date(d) => d.format("%Y-%m-%d").to_string(),
            Literal::DateTime(dt) => dt.to_rfc3339(),
            Literal::Year(y) => format!("{y:04}"),
            Literal::YearMonth { year, month } => format!("{year:04}-{month:02}"),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Integer(i) => Some(*i as f64),
            Literal::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// The closed day interval a temporal literal covers.
    pub fn temporal_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            Literal::Date(d) => Some((*d, *d)),
            Literal::DateTime(dt) => {
                let d = dt.date_naive();
                Some((d, d))
            }
            Literal::Year(y) => Some((
                NaiveDate::from_ymd_opt(*y, 1, 1)?,
                NaiveDate::from_ymd_opt(*y, 12, 31)?,
            )),
            Literal::YearMonth { year, month } => {
                let start = NaiveDate::from_ymd_opt(*year, *month, 1)?;
                let (ny, nm) = if *month == 12 {
                    (year + 1, 1)
                } else {
                    (*year, month + 1)
                };
                let end = NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?;
                Some((start, end))
            }
            _ => None,
        }
    }

    /// Compare two literals by value.
    ///
    /// Numbers compare numerically, strings lexically, temporals as day
    /// intervals: `a < b` when `a` ends before `b` starts. Overlapping
    /// intervals of different precision are incomparable.
    pub fn semantic_cmp(&self, other: &Literal) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        if let (Some((a_start, a_end)), Some((b_start, b_end))) =
            (self.temporal_bounds(), other.temporal_bounds())
        {
            if a_end < b_start {
                return Some(Ordering::Less);
            }
            if a_start > b_end {
                return Some(Ordering::Greater);
            }
            if a_start == b_start && a_end == b_end {
                return Some(Ordering::Equal);
            }
            return None;
        }
        match (self, other) {
            (Literal::Boolean(a), Literal::Boolean(b)) => Some(a.cmp(b)),
            _ if self.value_type() == ValueType::of(ValueKind::String)
                && other.value_type() == ValueType::of(ValueKind::String) =>
            {
                Some(self.lexical().cmp(&other.lexical()))
            }
            _ => None,
        }
    }

    /// Year of a temporal literal, if any.
    pub fn year(&self) -> Option<i32> {
        match self {
            Literal::Date(d) => Some(d.year()),
            Literal::DateTime(dt) => Some(dt.year()),
            Literal::Year(y) => Some(*y),
            Literal::YearMonth { year, .. } => Some(*year),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Literal::String(_) => 0,
            Literal::LangString { .. } => 1,
            Literal::Integer(_) => 2,
            Literal::Decimal(_) => 3,
            Literal::Boolean(_) => 4,
            Literal::Date(_) => 5,
            Literal::DateTime(_) => 6,
            Literal::Year(_) => 7,
            Literal::YearMonth { .. } => 8,
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Literal {}

impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Literal {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Literal::String(a), Literal::String(b)) => a.cmp(b),
            (
                Literal::LangString {
                    value: a,
                    language: la,
                },
                Literal::LangString {
                    value: b,
                    language: lb,
                },
            ) => a.cmp(b).then_with(|| la.cmp(lb)),
            (Literal::Integer(a), Literal::Integer(b)) => a.cmp(b),
            (Literal::Decimal(a), Literal::Decimal(b)) => a.total_cmp(b),
            (Literal::Boolean(a), Literal::Boolean(b)) => a.cmp(b),
            (Literal::Date(a), Literal::Date(b)) => a.cmp(b),
            (Literal::DateTime(a), Literal::DateTime(b)) => a.cmp(b),
            (Literal::Year(a), Literal::Year(b)) => a.cmp(b),
            (
                Literal::YearMonth {
                    year: ya,
                    month: ma,
                },
                Literal::YearMonth {
                    year: yb,
                    month: mb,
                },
            ) => ya.cmp(yb).then_with(|| ma.cmp(mb)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Literal::String(s) => s.hash(state),
            Literal::LangString { value, language } => {
                value.hash(state);
                language.hash(state);
            }
            Literal::Integer(i) => i.hash(state),
            // total_cmp equality coincides with bit equality
            Literal::Decimal(d) => d.to_bits().hash(state),
            Literal::Boolean(b) => b.hash(state),
            Literal::Date(d) => d.hash(state),
            Literal::DateTime(dt) => dt.hash(state),
            Literal::Year(y) => y.hash(state),
            Literal::YearMonth { year, month } => {
                year.hash(state);
                month.hash(state);
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::LangString { value, language } => write!(f, "{value:?}@{language}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Decimal(d) => write!(f, "{d:?}"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Date(_) => write!(f, "\"{}\"^^xsd:date", self.lexical()),
            Literal::DateTime(_) => write!(f, "\"{}\"^^xsd:dateTime", self.lexical()),
            Literal::Year(_) => write!(f, "\"{}\"^^xsd:gYear", self.lexical()),
            Literal::YearMonth { .. } => write!(f, "\"{}\"^^xsd:gYearMonth", self.lexical()),
        }
    }
}
