//! Parser collaborator interface.

use crate::conllu::{parse_conllu, ConlluError};
use crate::tree::ParseTree;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

// ============================================================================
// Parser Interface
// ============================================================================

/// Produces dependency parses for question text.
#[async_trait]
pub trait NlpParser: Send + Sync {
    /// Parse `text` written in `language` (ISO 639-1 code) into sentences.
    async fn parse(&self, text: &str, language: &str) -> Result<Vec<ParseTree>, ParseError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("parser unavailable: {0}")]
    Unavailable(String),
    #[error("parser timed out")]
    Timeout,
    #[error("parser returned malformed CoNLL-U: {0}")]
    Malformed(#[from] ConlluError),
    #[error("nothing to parse")]
    EmptyInput,
}

// ============================================================================
// Static Parser
// ============================================================================

/// Serves pre-computed parses, keyed by normalized sentence text.
///
/// Used for tests, demos and offline evaluation where parses were produced
/// ahead of time.
#[derive(Default)]
pub struct StaticParser {
    parses: RwLock<HashMap<String, Vec<ParseTree>>>,
}

impl StaticParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every sentence of a CoNLL-U document by its `# text` comment.
    /// Sentences without one are indexed by their joined token forms.
    pub fn from_conllu_document(document: &str) -> Result<Self, ConlluError> {
        let parser = Self::new();
        for tree in parse_conllu(document)? {
            let key = normalize(&tree.text());
            parser.parses.write().entry(key).or_default().push(tree);
        }
        Ok(parser)
    }

    /// Register the parse of `text` given as CoNLL-U.
    pub fn insert_conllu(&self, text: &str, conllu: &str) -> Result<(), ConlluError> {
        let trees = parse_conllu(conllu)?
            .into_iter()
            .map(|t| t.with_text(text))
            .collect();
        self.parses.write().insert(normalize(text), trees);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parses.read().is_empty()
    }
}

#[async_trait]
impl NlpParser for StaticParser {
    async fn parse(&self, text: &str, _language: &str) -> Result<Vec<ParseTree>, ParseError> {
        let key = normalize(text);
        if key.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let found = self.parses.read().get(&key).cloned();
        found.ok_or_else(|| {
            tracing::debug!(text, "no pre-computed parse");
            ParseError::Unavailable(format!("no parse known for {text:?}"))
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Lowercase, collapse whitespace, drop final punctuation.
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!') || c.is_whitespace())
        .to_string()
}
