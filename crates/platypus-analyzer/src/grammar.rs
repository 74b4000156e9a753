//! Grammar rules: from a parse tree to templates.
//!
//! Analysis starts at the root and walks down to the *focus*, the token
//! that carries the question once question words ("what", "how many") and
//! meaningless wrappers ("give me", "list") are set aside:
//!
//! ```text
//!   What is the capital of France ?
//!   └─nsubj─┐  cop det  ┌──nmod──┘
//!           capital ◄── focus, question word "what"
//!                       predicate "capital" + argument "France" via "of"
//! ```
//!
//! Every rule whose [`TreePattern`] matches the focus contributes
//! templates; rules never exclude each other. Parse re-attachment
//! ("a of x of y" read as both `a (of x (of y))` and `a (of x) (of y)`)
//! runs the whole grammar again on each variant tree.

use crate::lexicon::{CaseTerm, Lexicon, QuestionWord};
use crate::literal::parse_literal;
use crate::policy::AnalyzerPolicy;
use crate::template::{Orientation, Shape, SlotTable, Template};
use platypus_formula::{CompareOp, ValueType};
use platypus_nlp::{join_forms, ParseTree, Token, TokenId, TreePattern, UdDependency, UdPos, UdRelation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// "capital of France", "France's capital".
    AttributeOf,
    /// "Who wrote Le Petit Prince?"
    VerbObject,
    /// "Where was Bob Marley born?": the question word names a property.
    QuestionProperty,
    /// "How many children does Barack Obama have?"
    Count,
    /// "Who is Barack Obama?"
    EntityDefinition,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::AttributeOf,
        RuleKind::VerbObject,
        RuleKind::QuestionProperty,
        RuleKind::Count,
        RuleKind::EntityDefinition,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::AttributeOf => "attribute-of",
            RuleKind::VerbObject => "verb-object",
            RuleKind::QuestionProperty => "question-property",
            RuleKind::Count => "count",
            RuleKind::EntityDefinition => "entity-definition",
        }
    }

    /// Lower is preferred when confidences tie.
    pub fn priority(self) -> u8 {
        match self {
            RuleKind::AttributeOf => 0,
            RuleKind::VerbObject => 1,
            RuleKind::QuestionProperty => 2,
            RuleKind::Count => 3,
            RuleKind::EntityDefinition => 4,
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A rule: a pattern tested at the focus token, and the builder it selects.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarRule {
    pub kind: RuleKind,
    pub pattern: TreePattern,
}

impl GrammarRule {
    pub fn new(kind: RuleKind, pattern: TreePattern) -> Self {
        Self { kind, pattern }
    }

    /// The built-in rules, in priority order.
    pub fn default_rules() -> Vec<GrammarRule> {
        let count_marker = count_marker();
        vec![
            GrammarRule::new(RuleKind::AttributeOf, TreePattern::pos(UdPos::Verb).negate()),
            GrammarRule::new(RuleKind::VerbObject, TreePattern::pos(UdPos::Verb)),
            GrammarRule::new(RuleKind::QuestionProperty, TreePattern::Any),
            GrammarRule::new(
                RuleKind::Count,
                TreePattern::Any
                    .governs(count_marker.clone())
                    .or(TreePattern::Any.governs(TreePattern::Any.governs(count_marker))),
            ),
            GrammarRule::new(RuleKind::EntityDefinition, TreePattern::Any),
        ]
    }
}

/// The "many" of "how many" and its equivalents.
fn count_marker() -> TreePattern {
    TreePattern::words(["many", "much"])
        .governs(TreePattern::word("how"))
        .or(TreePattern::words(["combien", "cuántos", "cuántas", "cuantos", "cuantas"]))
        .or(TreePattern::word("viele").governs(TreePattern::word("wie")))
}

// ============================================================================
// Token classes
// ============================================================================

/// Dependencies that never carry an argument of the predicate.
const IGNORED: &[UdRelation] = &[
    UdRelation::Aux,
    UdRelation::Case,
    UdRelation::Conj,
    UdRelation::Cop,
    UdRelation::Det,
    UdRelation::Discourse,
    UdRelation::Parataxis,
    UdRelation::Punct,
    UdRelation::Reparandum,
];

/// Dependencies gluing words of one name together.
const SAME_ENTITY: &[UdRelation] = &[UdRelation::Compound, UdRelation::Flat, UdRelation::Fixed];

/// Stripped from both ends of a span before lookup.
const TRIMMED_DEPENDENCIES: &[UdRelation] = &[
    UdRelation::Aux,
    UdRelation::Case,
    UdRelation::Cop,
    UdRelation::Det,
    UdRelation::Discourse,
    UdRelation::Parataxis,
    UdRelation::Punct,
    UdRelation::Reparandum,
];
const TRIMMED_POS: &[UdPos] = &[
    UdPos::Adp,
    UdPos::Aux,
    UdPos::Cconj,
    UdPos::Det,
    UdPos::Intj,
    UdPos::Punct,
    UdPos::Sconj,
];

fn is_main(token: &Token) -> bool {
    !IGNORED.contains(&token.dependency.relation) && !is_same_entity(token)
}

fn is_same_entity(token: &Token) -> bool {
    SAME_ENTITY.contains(&token.dependency.relation)
}

fn is_trimmed(token: &Token) -> bool {
    TRIMMED_POS.contains(&token.pos) || TRIMMED_DEPENDENCIES.contains(&token.dependency.relation)
}

fn trim<'t>(tokens: &[&'t Token]) -> Vec<&'t Token> {
    let start = tokens.iter().position(|t| !is_trimmed(t));
    let end = tokens.iter().rposition(|t| !is_trimmed(t));
    match (start, end) {
        (Some(start), Some(end)) => tokens[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

fn is_nominal_modifier(dependency: &UdDependency) -> bool {
    dependency.is(UdRelation::Nmod) || dependency.is(UdRelation::Obl)
}

// ============================================================================
// Focus
// ============================================================================

/// Where the question is asked.
#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub node: TokenId,
    pub question_word: Option<&'static QuestionWord>,
    /// Left children of the focus not consumed by the question word.
    pub left: Vec<TokenId>,
}

/// Find the focus: strip the question word phrase from the left children
/// of the current token, and descend while the token is a meaningless
/// root with a single main child.
pub fn locate_focus(tree: &ParseTree, lexicon: &'static Lexicon) -> Focus {
    let mut node = tree.root().id;
    let mut inherited: Option<&'static QuestionWord> = None;
    loop {
        let left: Vec<TokenId> = tree.left_children(node).map(|t| t.id).collect();
        let mut question_word = None;
        let mut remaining = left.clone();
        let mut phrase: Vec<&Token> = Vec::new();
        for (i, child) in left.iter().enumerate() {
            phrase.extend(tree.subtree(*child));
            let trimmed = trim(&phrase);
            let words = if trimmed.is_empty() {
                join_forms(phrase.iter().copied())
            } else {
                join_forms(trimmed)
            };
            if let Some(found) = lexicon.question_word(&words) {
                question_word = Some(found);
                remaining = left[i + 1..].to_vec();
            }
        }
        let Some(token) = tree.token(node) else {
            break Focus {
                node,
                question_word: question_word.or(inherited),
                left: remaining,
            };
        };
        if remaining.is_empty() {
            if let Some(found) = lexicon.question_word(&token.form) {
                question_word = Some(found);
            }
        }
        let question_word = question_word.or(inherited);

        let children: Vec<TokenId> = remaining
            .iter()
            .filter_map(|id| tree.token(*id))
            .chain(tree.right_children(node))
            .filter(|t| is_main(t))
            .map(|t| t.id)
            .collect();
        if children.len() == 1 && lexicon.is_meaningless_root(&token.form) {
            tracing::trace!(word = %token.form, "skipping meaningless root");
            inherited = question_word;
            node = children[0];
            continue;
        }
        break Focus {
            node,
            question_word,
            left: remaining,
        };
    }
}

// ============================================================================
// Template building
// ============================================================================

/// Build the templates of every rule matching `tree` and its re-attached
/// variants. Slots are interned into `slots`.
pub fn build_templates(
    tree: &ParseTree,
    lexicon: &'static Lexicon,
    rules: &[GrammarRule],
    policy: &AnalyzerPolicy,
    slots: &mut SlotTable,
) -> Vec<Template> {
    let mut templates: Vec<Template> = Vec::new();
    for (variant, moves) in reattachments(tree, policy.max_reattachments) {
        let penalty = policy.scoring.reattachment_penalty.powi(moves as i32);
        let focus = locate_focus(&variant, lexicon);
        let mut builder = Builder {
            tree: &variant,
            lexicon,
            slots: &mut *slots,
            max_shapes: policy.max_shapes_per_node.max(1),
            arguments: HashMap::new(),
        };
        for template in builder.apply(rules, &focus) {
            let template = template.with_penalty(penalty);
            let known = templates
                .iter()
                .any(|t| t.rule == template.rule && t.shape == template.shape);
            if !known {
                templates.push(template);
            }
        }
    }
    templates
}

struct Builder<'a> {
    tree: &'a ParseTree,
    lexicon: &'static Lexicon,
    slots: &'a mut SlotTable,
    max_shapes: usize,
    /// Argument readings per token; slots are interned so they are stable.
    arguments: HashMap<TokenId, Vec<Shape>>,
}

impl<'a> Builder<'a> {
    fn apply(&mut self, rules: &[GrammarRule], focus: &Focus) -> Vec<Template> {
        let expected = focus.question_word.and_then(|q| q.expected_kind);
        let mut templates = Vec::new();
        for rule in rules {
            if !rule.pattern.matches(self.tree, focus.node) {
                continue;
            }
            let shapes = match rule.kind {
                RuleKind::AttributeOf | RuleKind::VerbObject => {
                    self.predicate_shapes(focus.node, &focus.left, &[], None)
                }
                RuleKind::EntityDefinition => self.focus_entity(focus).into_iter().collect(),
                RuleKind::QuestionProperty => match focus.question_word {
                    Some(q) if q.has_properties() => self.question_property(focus, q),
                    _ => Vec::new(),
                },
                RuleKind::Count => self.count(focus),
            };
            tracing::trace!(rule = %rule.kind, shapes = shapes.len(), "rule applied");
            for shape in shapes {
                // a count's answer is the number, not the counted things
                let shape = match expected {
                    Some(kind) if rule.kind != RuleKind::Count => {
                        self.slots.expect_answer(shape, ValueType::of(kind))
                    }
                    _ => shape,
                };
                templates.push(Template::new(rule.kind, shape).with_expected(expected));
            }
        }
        templates
    }

    fn token(&self, id: TokenId) -> Option<&'a Token> {
        self.tree.token(id)
    }

    fn main_of(&self, ids: impl IntoIterator<Item = TokenId>, exclude: &[TokenId]) -> Vec<TokenId> {
        ids.into_iter()
            .filter(|id| !exclude.contains(id))
            .filter(|id| self.token(*id).is_some_and(is_main))
            .collect()
    }

    fn push_capped(&self, shapes: &mut Vec<Shape>, new: impl IntoIterator<Item = Shape>) {
        for shape in new {
            if shapes.len() >= self.max_shapes {
                return;
            }
            if !shapes.contains(&shape) {
                shapes.push(shape);
            }
        }
    }

    /// The whole focus phrase as one entity ("Barack Obama").
    fn focus_entity(&mut self, focus: &Focus) -> Option<Shape> {
        let mut tokens: Vec<&Token> = focus
            .left
            .iter()
            .flat_map(|id| self.tree.subtree(*id))
            .collect();
        tokens.extend(self.token(focus.node));
        tokens.extend(
            self.tree
                .right_children(focus.node)
                .flat_map(|c| self.tree.subtree(c.id)),
        );
        let text = join_forms(trim(&tokens));
        if text.is_empty() {
            return None;
        }
        Some(Shape::Entity(self.slots.entity(&text)))
    }

    /// Property-wrapped readings, plus predicates whose label is turned
    /// into a property name by the question word ("born" → "birth place").
    fn question_property(&mut self, focus: &Focus, question: &'static QuestionWord) -> Vec<Shape> {
        let property = self.slots.relation(
            question.words,
            question.expected_properties.iter().map(|p| p.to_string()),
        );
        let mut base = self.predicate_shapes(focus.node, &focus.left, &[], None);
        base.extend(self.focus_entity(focus));
        let mut shapes = Vec::new();
        self.push_capped(
            &mut shapes,
            base.into_iter().map(|inner| Shape::property(property, inner)),
        );
        if !question.property_modifiers.is_empty() {
            let nounified = self.predicate_shapes(
                focus.node,
                &focus.left,
                &[],
                Some(question.property_modifiers),
            );
            self.push_capped(&mut shapes, nounified);
        }
        shapes
    }

    fn count(&mut self, focus: &Focus) -> Vec<Shape> {
        let marker = count_marker();
        let counted: Vec<TokenId> = std::iter::once(focus.node)
            .chain(self.tree.children(focus.node).map(|c| c.id))
            .filter(|id| !marker.matching_children(self.tree, *id).is_empty())
            .collect();

        let mut shapes = Vec::new();
        for noun in counted {
            let markers = marker.matching_children(self.tree, noun);
            if noun == focus.node {
                let inner = self.predicate_shapes(noun, &focus.left, &markers, None);
                self.push_capped(&mut shapes, inner.into_iter().map(Shape::count));
                continue;
            }
            // the counted noun names the relation: "how many children does X have"
            let label = self.label_tokens(noun, None, None);
            let others = self.main_of(
                focus
                    .left
                    .iter()
                    .copied()
                    .chain(self.tree.right_children(focus.node).map(|c| c.id)),
                &[noun],
            );
            if !others.is_empty() {
                let by_noun = self.build_with_children(&others, &label, None);
                self.push_capped(&mut shapes, by_noun.into_iter().map(Shape::count));
            }
            let by_verb = self.predicate_shapes(focus.node, &focus.left, &[noun], None);
            self.push_capped(&mut shapes, by_verb.into_iter().map(Shape::count));
        }
        shapes
    }

    /// Readings of `node` as a predicate applied to its arguments: for
    /// each split `[left_child … node … right_child]` the span is the
    /// predicate label and the children outside it are its arguments.
    fn predicate_shapes(
        &mut self,
        node: TokenId,
        left: &[TokenId],
        exclude: &[TokenId],
        modifiers: Option<&[&str]>,
    ) -> Vec<Shape> {
        let left_main = self.main_of(left.iter().copied(), exclude);
        let right_ids: Vec<TokenId> = self.tree.right_children(node).map(|t| t.id).collect();
        let right_main = self.main_of(right_ids, exclude);

        let mut shapes = Vec::new();
        for left_child in left_main.iter().copied().map(Some).chain([None]) {
            for right_child in right_main.iter().copied().map(Some).chain([None]) {
                let label = self.label_tokens(node, left_child, right_child);
                let mut children: Vec<TokenId> = left_main
                    .iter()
                    .copied()
                    .take_while(|c| Some(*c) != left_child)
                    .collect();
                children.extend(
                    right_main
                        .iter()
                        .rev()
                        .copied()
                        .take_while(|c| Some(*c) != right_child),
                );
                if children.is_empty() {
                    continue;
                }
                let built = self.build_with_children(&children, &label, modifiers);
                self.push_capped(&mut shapes, built);
            }
        }
        shapes
    }

    /// Tokens naming the predicate: `node`, extended to the left up to
    /// `start` and to the right up to `end`, or further through
    /// compounds and flat names.
    fn label_tokens(
        &self,
        node: TokenId,
        start: Option<TokenId>,
        end: Option<TokenId>,
    ) -> Vec<TokenId> {
        let left: Vec<&Token> = self.tree.left_children(node).collect();
        let right: Vec<&Token> = self.tree.right_children(node).collect();
        let from = left
            .iter()
            .position(|c| is_same_entity(c) || Some(c.id) == start);
        let to = right
            .iter()
            .rposition(|c| is_same_entity(c) || Some(c.id) == end);

        let mut tokens: Vec<&Token> = Vec::new();
        if let Some(from) = from {
            tokens.extend(left[from..].iter().flat_map(|c| self.tree.subtree(c.id)));
        }
        tokens.extend(self.token(node));
        if let Some(to) = to {
            tokens.extend(right[..=to].iter().flat_map(|c| self.tree.subtree(c.id)));
        }
        trim(&tokens).into_iter().map(|t| t.id).collect()
    }

    /// Lookup keys of a relation label under label patterns: the surface
    /// form, the lemmas, and the nominalization of a single participle.
    fn relation_slot(&mut self, label: &[TokenId], patterns: &[String]) -> Option<usize> {
        let tokens: Vec<&Token> = label.iter().filter_map(|id| self.tree.token(*id)).collect();
        if tokens.is_empty() || patterns.is_empty() {
            return None;
        }
        let forms = join_forms(tokens.iter().copied()).to_lowercase();
        let lemmas = tokens
            .iter()
            .map(|t| t.lemma.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let mut variants = vec![forms.clone(), lemmas];
        if let [single] = tokens.as_slice() {
            variants.extend(self.lexicon.nominalization(&single.form).map(str::to_string));
        }
        let keys: Vec<String> = patterns
            .iter()
            .flat_map(|p| variants.iter().map(move |v| p.replace("{}", v)))
            .collect();
        let surface = patterns[0].replace("{}", &forms);
        Some(self.slots.relation(&surface, keys))
    }

    fn build_with_children(
        &mut self,
        children: &[TokenId],
        label: &[TokenId],
        modifiers: Option<&[&str]>,
    ) -> Vec<Shape> {
        let mut components: Vec<Vec<Shape>> = Vec::new();
        let mut restrictions: Vec<Shape> = Vec::new();
        for &child in children {
            let Some(dependency) = self.token(child).map(|t| t.dependency.clone()) else {
                continue;
            };
            let component = if dependency.is(UdRelation::Nsubj) || dependency.is(UdRelation::Appos) {
                self.related(label, &["{}"], modifiers, Orientation::Subject, child)
            } else if dependency.is(UdRelation::Obj) {
                self.related(label, &["{}"], modifiers, Orientation::Object, child)
            } else if dependency.is_a(&UdDependency::with_subtype(UdRelation::Nmod, "poss")) {
                self.related(label, &["{}"], modifiers, Orientation::Subject, child)
            } else if is_nominal_modifier(&dependency) {
                self.nominal_modifier(label, modifiers, child)
            } else if dependency.is(UdRelation::Amod) {
                restrictions.extend(self.restriction(child));
                continue;
            } else {
                tracing::debug!(%dependency, child, "unsupported dependency in predicate");
                return Vec::new();
            };
            components.push(component);
        }
        if components.is_empty() {
            return Vec::new();
        }

        let mut combined: Vec<Vec<Shape>> = vec![Vec::new()];
        for component in components {
            let mut next = Vec::new();
            'outer: for prefix in &combined {
                for shape in &component {
                    if next.len() >= self.max_shapes {
                        break 'outer;
                    }
                    let mut parts = prefix.clone();
                    parts.push(shape.clone());
                    next.push(parts);
                }
            }
            combined = next;
        }

        // every reading also without its adjectives
        let mut shapes = Vec::new();
        for parts in combined {
            let mut restricted = parts.clone();
            restricted.extend(restrictions.iter().cloned());
            let plain = Shape::all(parts);
            if restrictions.is_empty() {
                self.push_capped(&mut shapes, [plain]);
            } else {
                self.push_capped(&mut shapes, [plain, Shape::all(restricted)]);
            }
        }
        shapes
    }

    /// "current" in "the current capital": the described thing is an
    /// instance of the class the adjective names.
    fn restriction(&mut self, adjective: TokenId) -> Option<Shape> {
        let text = join_forms(trim(&self.tree.subtree(adjective)));
        if text.is_empty() {
            return None;
        }
        Some(Shape::Typed(self.slots.class(&text)))
    }

    /// Arguments introduced by a preposition: the case word selects the
    /// label patterns and the orientation.
    fn nominal_modifier(
        &mut self,
        label: &[TokenId],
        modifiers: Option<&[&str]>,
        child: TokenId,
    ) -> Vec<Shape> {
        let cases: Vec<String> = self
            .tree
            .children_with(child, UdRelation::Case)
            .map(|c| join_forms(self.tree.subtree(c.id)))
            .collect();
        match cases.as_slice() {
            [] => self.related(label, &["{}"], modifiers, Orientation::Subject, child),
            [case] => {
                let Some(case_word) = self.lexicon.case_word(case) else {
                    tracing::debug!(case = %case, "unsupported case word");
                    return Vec::new();
                };
                let mut shapes = Vec::new();
                for &(pattern, term) in case_word.terms {
                    let built = match term {
                        CaseTerm::Subject => {
                            self.related(label, &[pattern], modifiers, Orientation::Subject, child)
                        }
                        CaseTerm::Object => {
                            self.related(label, &[pattern], modifiers, Orientation::Object, child)
                        }
                        CaseTerm::Compare(op) => self.compared(label, pattern, modifiers, op, child),
                    };
                    self.push_capped(&mut shapes, built);
                }
                shapes
            }
            _ => {
                tracing::debug!(cases = ?cases, child, "several case words");
                Vec::new()
            }
        }
    }

    fn patterns(base: &[&str], modifiers: Option<&[&str]>) -> Vec<String> {
        match modifiers {
            None => base.iter().map(|p| p.to_string()).collect(),
            Some(modifiers) => modifiers
                .iter()
                .flat_map(|m| base.iter().map(move |p| m.replace("{}", p)))
                .collect(),
        }
    }

    fn related(
        &mut self,
        label: &[TokenId],
        base: &[&str],
        modifiers: Option<&[&str]>,
        orientation: Orientation,
        argument: TokenId,
    ) -> Vec<Shape> {
        let patterns = Self::patterns(base, modifiers);
        let Some(relation) = self.relation_slot(label, &patterns) else {
            return Vec::new();
        };
        self.argument_shapes(argument)
            .into_iter()
            .map(|arg| Shape::relation(relation, orientation, arg))
            .collect()
    }

    fn compared(
        &mut self,
        label: &[TokenId],
        base: &str,
        modifiers: Option<&[&str]>,
        op: CompareOp,
        argument: TokenId,
    ) -> Vec<Shape> {
        let patterns = Self::patterns(&[base], modifiers);
        let Some(relation) = self.relation_slot(label, &patterns) else {
            return Vec::new();
        };
        self.argument_shapes(argument)
            .into_iter()
            .filter(Shape::is_constant)
            .map(|arg| Shape::compare(relation, op, arg))
            .collect()
    }

    /// Readings of an argument subtree: a literal or an entity named by
    /// the whole span, and nested predicates ("the capital of France").
    fn argument_shapes(&mut self, argument: TokenId) -> Vec<Shape> {
        if let Some(known) = self.arguments.get(&argument) {
            return known.clone();
        }
        let subtree = self.tree.subtree(argument);
        let text = join_forms(trim(&subtree));
        let mut shapes = Vec::new();
        if !text.is_empty() {
            let literals = parse_literal(&text, None);
            shapes.push(if literals.is_empty() {
                Shape::Entity(self.slots.entity(&text))
            } else {
                Shape::Literal(self.slots.literal(&text, literals))
            });
        }
        let left: Vec<TokenId> = self.tree.left_children(argument).map(|t| t.id).collect();
        let nested = self.predicate_shapes(argument, &left, &[], None);
        self.push_capped(&mut shapes, nested);
        self.arguments.insert(argument, shapes.clone());
        shapes
    }
}

// ============================================================================
// Re-attachment
// ============================================================================

/// The tree and its variants where nominal modifiers of a nominal modifier
/// are moved up to its head, with the number of moves each took. The
/// original tree comes first; at most `max_variants` variants follow.
pub fn reattachments(tree: &ParseTree, max_variants: usize) -> Vec<(ParseTree, usize)> {
    let mut out = vec![(tree.clone(), 0)];
    let mut next = 0;
    while next < out.len() && out.len() <= max_variants {
        let (current, moves) = out[next].clone();
        for token in current.tokens() {
            if out.len() > max_variants {
                break;
            }
            let Some(variant) = move_up(&current, token.id) else {
                continue;
            };
            if !out.iter().any(|(t, _)| *t == variant) {
                out.push((variant, moves + 1));
            }
        }
        next += 1;
    }
    out
}

/// Move the rightmost nominal modifier of the first nominal modifier of
/// `head` up to `head`.
fn move_up(tree: &ParseTree, head: TokenId) -> Option<ParseTree> {
    let first = tree
        .right_children(head)
        .find(|c| is_nominal_modifier(&c.dependency))?;
    let grandchild = tree
        .right_children(first.id)
        .filter(|c| is_nominal_modifier(&c.dependency))
        .last()?;
    tree.reattach(grandchild.id, head).ok()
}
