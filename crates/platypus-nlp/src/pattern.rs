//! Declarative matching over parse-tree fragments.
//!
//! Patterns combine token tests with structural constraints:
//!
//! ```text
//! TreePattern::word("many").governs(TreePattern::word("how"))
//!     matches the `many` of "how many", whatever its head is
//! ```

use crate::tree::{ParseTree, Token, TokenId};
use crate::ud::{UdDependency, UdPos};

#[derive(Debug, Clone, PartialEq)]
pub enum TreePattern {
    Any,
    /// Case-insensitive surface form, one of the listed words.
    Word(Vec<String>),
    Lemma(Vec<String>),
    Pos(Vec<UdPos>),
    /// The token's dependency is the given one or a subtype of it.
    Dependency(UdDependency),
    All(Vec<TreePattern>),
    OneOf(Vec<TreePattern>),
    Not(Box<TreePattern>),
    /// Some child matches.
    Governs(Box<TreePattern>),
    /// The head matches.
    ChildOf(Box<TreePattern>),
    /// The next token in sentence order matches.
    FollowedBy(Box<TreePattern>),
}

impl TreePattern {
    pub fn word(word: &str) -> Self {
        TreePattern::Word(vec![word.to_lowercase()])
    }

    pub fn words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        TreePattern::Word(words.into_iter().map(str::to_lowercase).collect())
    }

    pub fn lemma(lemma: &str) -> Self {
        TreePattern::Lemma(vec![lemma.to_lowercase()])
    }

    pub fn pos(pos: UdPos) -> Self {
        TreePattern::Pos(vec![pos])
    }

    pub fn any_pos(pos: impl IntoIterator<Item = UdPos>) -> Self {
        TreePattern::Pos(pos.into_iter().collect())
    }

    pub fn dependency(dep: impl Into<UdDependency>) -> Self {
        TreePattern::Dependency(dep.into())
    }

    pub fn and(self, other: TreePattern) -> Self {
        match self {
            TreePattern::All(mut parts) => {
                parts.push(other);
                TreePattern::All(parts)
            }
            first => TreePattern::All(vec![first, other]),
        }
    }

    pub fn or(self, other: TreePattern) -> Self {
        match self {
            TreePattern::OneOf(mut parts) => {
                parts.push(other);
                TreePattern::OneOf(parts)
            }
            first => TreePattern::OneOf(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        TreePattern::Not(Box::new(self))
    }

    pub fn governs(self, child: TreePattern) -> Self {
        self.and(TreePattern::Governs(Box::new(child)))
    }

    pub fn child_of(self, head: TreePattern) -> Self {
        self.and(TreePattern::ChildOf(Box::new(head)))
    }

    pub fn followed_by(self, next: TreePattern) -> Self {
        self.and(TreePattern::FollowedBy(Box::new(next)))
    }

    /// Whether the token `id` of `tree` matches.
    pub fn matches(&self, tree: &ParseTree, id: TokenId) -> bool {
        let Some(token) = tree.token(id) else {
            return false;
        };
        self.matches_token(tree, token)
    }

    fn matches_token(&self, tree: &ParseTree, token: &Token) -> bool {
        match self {
            TreePattern::Any => true,
            TreePattern::Word(words) => {
                let lower = token.lower();
                words.iter().any(|w| *w == lower)
            }
            TreePattern::Lemma(lemmas) => {
                let lower = token.lemma.to_lowercase();
                lemmas.iter().any(|l| *l == lower)
            }
            TreePattern::Pos(tags) => tags.contains(&token.pos),
            TreePattern::Dependency(dep) => token.dependency.is_a(dep),
            TreePattern::All(parts) => parts.iter().all(|p| p.matches_token(tree, token)),
            TreePattern::OneOf(parts) => parts.iter().any(|p| p.matches_token(tree, token)),
            TreePattern::Not(inner) => !inner.matches_token(tree, token),
            TreePattern::Governs(child) => tree
                .children(token.id)
                .any(|c| child.matches_token(tree, c)),
            TreePattern::ChildOf(head) => tree
                .token(token.head)
                .is_some_and(|h| head.matches_token(tree, h)),
            TreePattern::FollowedBy(next) => tree
                .next(token.id)
                .is_some_and(|n| next.matches_token(tree, n)),
        }
    }

    /// Ids of all matching tokens, in sentence order.
    pub fn find_all(&self, tree: &ParseTree) -> Vec<TokenId> {
        tree.tokens()
            .iter()
            .filter(|t| self.matches_token(tree, t))
            .map(|t| t.id)
            .collect()
    }

    /// Children of `id` that match, in sentence order.
    pub fn matching_children(&self, tree: &ParseTree, id: TokenId) -> Vec<TokenId> {
        tree.children(id)
            .filter(|c| self.matches_token(tree, c))
            .map(|c| c.id)
            .collect()
    }
}
