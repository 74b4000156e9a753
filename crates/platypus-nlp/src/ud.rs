//! Universal Dependencies tag sets (v2, with v1 labels mapped on read).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Universal part-of-speech tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UdPos {
    Adj,
    Adp,
    Adv,
    Aux,
    Cconj,
    Det,
    Intj,
    Noun,
    Num,
    Part,
    Pron,
    Propn,
    Punct,
    Sconj,
    Sym,
    Verb,
    X,
}

impl UdPos {
    pub fn as_str(self) -> &'static str {
        match self {
            UdPos::Adj => "ADJ",
            UdPos::Adp => "ADP",
            UdPos::Adv => "ADV",
            UdPos::Aux => "AUX",
            UdPos::Cconj => "CCONJ",
            UdPos::Det => "DET",
            UdPos::Intj => "INTJ",
            UdPos::Noun => "NOUN",
            UdPos::Num => "NUM",
            UdPos::Part => "PART",
            UdPos::Pron => "PRON",
            UdPos::Propn => "PROPN",
            UdPos::Punct => "PUNCT",
            UdPos::Sconj => "SCONJ",
            UdPos::Sym => "SYM",
            UdPos::Verb => "VERB",
            UdPos::X => "X",
        }
    }

    pub fn is_nominal(self) -> bool {
        matches!(self, UdPos::Noun | UdPos::Propn | UdPos::Pron)
    }
}

impl FromStr for UdPos {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "ADJ" => UdPos::Adj,
            "ADP" => UdPos::Adp,
            "ADV" => UdPos::Adv,
            "AUX" => UdPos::Aux,
            // UD v1 name
            "CCONJ" | "CONJ" => UdPos::Cconj,
            "DET" => UdPos::Det,
            "INTJ" => UdPos::Intj,
            "NOUN" => UdPos::Noun,
            "NUM" => UdPos::Num,
            "PART" => UdPos::Part,
            "PRON" => UdPos::Pron,
            "PROPN" => UdPos::Propn,
            "PUNCT" => UdPos::Punct,
            "SCONJ" => UdPos::Sconj,
            "SYM" => UdPos::Sym,
            "VERB" => UdPos::Verb,
            "X" | "_" => UdPos::X,
            other => return Err(format!("unknown UPOS tag {other}")),
        })
    }
}

impl fmt::Display for UdPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! ud_relations {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Universal dependency relations (without subtypes).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum UdRelation {
            $($variant),*
        }

        impl UdRelation {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(UdRelation::$variant => $name),*
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(UdRelation::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

ud_relations! {
    Acl => "acl",
    Advcl => "advcl",
    Advmod => "advmod",
    Amod => "amod",
    Appos => "appos",
    Aux => "aux",
    Case => "case",
    Cc => "cc",
    Ccomp => "ccomp",
    Clf => "clf",
    Compound => "compound",
    Conj => "conj",
    Cop => "cop",
    Csubj => "csubj",
    Dep => "dep",
    Det => "det",
    Discourse => "discourse",
    Dislocated => "dislocated",
    Expl => "expl",
    Fixed => "fixed",
    Flat => "flat",
    Goeswith => "goeswith",
    Iobj => "iobj",
    List => "list",
    Mark => "mark",
    Nmod => "nmod",
    Nsubj => "nsubj",
    Nummod => "nummod",
    Obj => "obj",
    Obl => "obl",
    Orphan => "orphan",
    Parataxis => "parataxis",
    Punct => "punct",
    Reparandum => "reparandum",
    Root => "root",
    Vocative => "vocative",
    Xcomp => "xcomp",
}

/// A dependency label: a universal relation plus an optional
/// language-specific subtype (`nmod:poss`, `nsubj:pass`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UdDependency {
    pub relation: UdRelation,
    pub subtype: Option<String>,
}

impl UdDependency {
    pub fn new(relation: UdRelation) -> Self {
        Self {
            relation,
            subtype: None,
        }
    }

    pub fn with_subtype(relation: UdRelation, subtype: impl Into<String>) -> Self {
        Self {
            relation,
            subtype: Some(subtype.into()),
        }
    }

    /// `self` is `other` or one of its subtypes: `nmod:poss` is an `nmod`,
    /// but `nmod` is not an `nmod:poss`.
    pub fn is_a(&self, other: &UdDependency) -> bool {
        self.relation == other.relation
            && match &other.subtype {
                None => true,
                Some(sub) => self.subtype.as_deref() == Some(sub.as_str()),
            }
    }

    pub fn is(&self, relation: UdRelation) -> bool {
        self.relation == relation
    }

    /// Parse a DEPREL value. UD v1 labels are mapped to their v2
    /// equivalents; unknown labels become `dep`.
    pub fn parse(label: &str) -> Self {
        let lower = label.trim().to_ascii_lowercase();
        match lower.as_str() {
            "dobj" => return Self::new(UdRelation::Obj),
            "nsubjpass" => return Self::with_subtype(UdRelation::Nsubj, "pass"),
            "csubjpass" => return Self::with_subtype(UdRelation::Csubj, "pass"),
            "auxpass" => return Self::with_subtype(UdRelation::Aux, "pass"),
            "neg" => return Self::new(UdRelation::Advmod),
            "mwe" => return Self::new(UdRelation::Fixed),
            "name" => return Self::new(UdRelation::Flat),
            "foreign" => return Self::with_subtype(UdRelation::Flat, "foreign"),
            "remnant" => return Self::new(UdRelation::Orphan),
            _ => {}
        }
        let (base, subtype) = match lower.split_once(':') {
            Some((base, sub)) => (base, Some(sub.to_string())),
            None => (lower.as_str(), None),
        };
        match UdRelation::from_name(base) {
            Some(relation) => Self { relation, subtype },
            None => Self::new(UdRelation::Dep),
        }
    }
}

impl From<UdRelation> for UdDependency {
    fn from(relation: UdRelation) -> Self {
        Self::new(relation)
    }
}

impl fmt::Display for UdDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtype {
            Some(sub) => write!(f, "{}:{sub}", self.relation.as_str()),
            None => f.write_str(self.relation.as_str()),
        }
    }
}
