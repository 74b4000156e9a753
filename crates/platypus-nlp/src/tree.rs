//! Dependency parse trees.
//!
//! Tokens are stored in sentence order in an arena and addressed by their
//! 1-based CoNLL-U id. Head `0` designates the root.

use crate::ud::{UdDependency, UdPos, UdRelation};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TokenId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub form: String,
    pub lemma: String,
    pub pos: UdPos,
    /// Id of the governing token, `0` for the root.
    pub head: TokenId,
    pub dependency: UdDependency,
}

impl Token {
    pub fn new(
        id: TokenId,
        form: impl Into<String>,
        lemma: impl Into<String>,
        pos: UdPos,
        head: TokenId,
        dependency: UdDependency,
    ) -> Self {
        Self {
            id,
            form: form.into(),
            lemma: lemma.into(),
            pos,
            head,
            dependency,
        }
    }

    pub fn lower(&self) -> String {
        self.form.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("empty sentence")]
    Empty,
    #[error("token ids must be 1..=n in order, found {found} at position {position}")]
    NonSequentialId { position: usize, found: TokenId },
    #[error("token {token} has head {head} outside the sentence")]
    HeadOutOfRange { token: TokenId, head: TokenId },
    #[error("expected exactly one root, found {0}")]
    RootCount(usize),
    #[error("token {0} is part of a dependency cycle")]
    Cycle(TokenId),
}

/// An immutable dependency tree over one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParseTree {
    tokens: Vec<Token>,
    /// Children ids per token, in sentence order. Index 0 holds the root.
    #[serde(skip)]
    children: Vec<Vec<TokenId>>,
    root: TokenId,
    text: Option<String>,
}

impl ParseTree {
    pub fn new(tokens: Vec<Token>) -> Result<Self, TreeError> {
        if tokens.is_empty() {
            return Err(TreeError::Empty);
        }
        let n = tokens.len();
        let mut children = vec![Vec::new(); n + 1];
        for (position, token) in tokens.iter().enumerate() {
            if token.id != position + 1 {
                return Err(TreeError::NonSequentialId {
                    position,
                    found: token.id,
                });
            }
            if token.head > n {
                return Err(TreeError::HeadOutOfRange {
                    token: token.id,
                    head: token.head,
                });
            }
            children[token.head].push(token.id);
        }
        if children[0].len() != 1 {
            return Err(TreeError::RootCount(children[0].len()));
        }
        let root = children[0][0];

        // every token must reach the root within n steps
        for token in &tokens {
            let mut current = token.head;
            let mut steps = 0;
            while current != 0 {
                current = tokens[current - 1].head;
                steps += 1;
                if steps > n {
                    return Err(TreeError::Cycle(token.id));
                }
            }
        }

        Ok(Self {
            tokens,
            children,
            root,
            text: None,
        })
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Original sentence text when known, else the tokens joined.
    pub fn text(&self) -> String {
        match &self.text {
            Some(t) => t.clone(),
            None => join_forms(self.tokens.iter()),
        }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn root(&self) -> &Token {
        &self.tokens[self.root - 1]
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        id.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    pub fn head_of(&self, id: TokenId) -> Option<&Token> {
        self.token(id).and_then(|t| self.token(t.head))
    }

    pub fn children(&self, id: TokenId) -> impl Iterator<Item = &Token> + '_ {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(move |c| self.token(*c))
    }

    pub fn left_children(&self, id: TokenId) -> impl Iterator<Item = &Token> + '_ {
        self.children(id).filter(move |c| c.id < id)
    }

    pub fn right_children(&self, id: TokenId) -> impl Iterator<Item = &Token> + '_ {
        self.children(id).filter(move |c| c.id > id)
    }

    pub fn children_with(&self, id: TokenId, relation: UdRelation) -> impl Iterator<Item = &Token> + '_ {
        self.children(id).filter(move |c| c.dependency.is(relation))
    }

    pub fn prev(&self, id: TokenId) -> Option<&Token> {
        self.token(id.checked_sub(1)?)
    }

    pub fn next(&self, id: TokenId) -> Option<&Token> {
        self.token(id + 1)
    }

    /// The token and all its descendants, in sentence order.
    pub fn subtree(&self, id: TokenId) -> Vec<&Token> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.token(current).is_none() {
                continue;
            }
            ids.push(current);
            stack.extend(self.children.get(current).into_iter().flatten().copied());
        }
        ids.sort_unstable();
        ids.into_iter().filter_map(|i| self.token(i)).collect()
    }

    /// Whether `ancestor` governs `id`, directly or transitively.
    pub fn dominates(&self, ancestor: TokenId, id: TokenId) -> bool {
        let mut current = self.token(id).map(|t| t.head);
        while let Some(head) = current {
            if head == ancestor {
                return true;
            }
            if head == 0 {
                return false;
            }
            current = self.token(head).map(|t| t.head);
        }
        false
    }

    /// A copy of the tree where `id` hangs from `new_head` instead.
    pub fn reattach(&self, id: TokenId, new_head: TokenId) -> Result<ParseTree, TreeError> {
        let mut tokens = self.tokens.clone();
        if let Some(token) = id.checked_sub(1).and_then(|i| tokens.get_mut(i)) {
            token.head = new_head;
        }
        let mut tree = ParseTree::new(tokens)?;
        tree.text = self.text.clone();
        Ok(tree)
    }
}

/// Join token forms into readable text, undoing tokenizer spacing around
/// punctuation and elisions.
pub fn join_forms<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> String {
    let joined = tokens
        .into_iter()
        .map(|t| t.form.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    joined
        .replace(" -", "-")
        .replace("' ", "'")
        .replace("’ ", "’")
        .replace(" ,", ",")
        .replace(" .", ".")
        .replace(" ?", "?")
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn node(tree: &ParseTree, id: TokenId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let Some(token) = tree.token(id) else {
                return Ok(());
            };
            write!(f, "{}/{}", token.form, token.dependency)?;
            let kids: Vec<TokenId> = tree.children(id).map(|c| c.id).collect();
            if !kids.is_empty() {
                f.write_str("(")?;
                for (i, kid) in kids.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    node(tree, kid, f)?;
                }
                f.write_str(")")?;
            }
            Ok(())
        }
        node(self, self.root, f)
    }
}
