//! Platypus NLP Model
//!
//! Everything the analyzer needs to know about syntax:
//!
//! - [`ud`]: Universal Dependencies part-of-speech tags and relations
//! - [`tree`]: immutable dependency trees with navigation helpers
//! - [`conllu`]: CoNLL-U reader
//! - [`pattern`]: declarative matching over tree fragments
//! - [`parser`]: the [`NlpParser`] collaborator interface and a static
//!   implementation backed by pre-computed parses
//!
//! With the `http` feature, [`http::ConlluHttpParser`] talks to a parser
//! service that answers in CoNLL-U.

pub mod conllu;
pub mod parser;
pub mod pattern;
pub mod tree;
pub mod ud;

#[cfg(feature = "http")]
pub mod http;


pub use conllu::{parse_conllu, ConlluError};
pub use parser::{NlpParser, ParseError, StaticParser};
pub use pattern::TreePattern;
pub use tree::{join_forms, ParseTree, Token, TokenId, TreeError};
pub use ud::{UdDependency, UdPos, UdRelation};
