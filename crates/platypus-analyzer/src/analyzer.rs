//! The analyzer façade: templates, resolution, expansion, ranking.

use crate::candidate::{rank, Candidate};
use crate::expand::expand_template;
use crate::grammar::{build_templates, GrammarRule};
use crate::lexicon::Lexicon;
use crate::policy::AnalyzerPolicy;
use crate::resolve::resolve_slots;
use crate::template::{SlotTable, Template};
use crate::AnalyzeError;
use platypus_kb::{Deadline, KnowledgeConnector, LookupError};
use platypus_nlp::ParseTree;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Turns parse trees into ranked candidate queries.
///
/// Holds no per-request state; one analyzer serves concurrent requests.
#[derive(Clone)]
pub struct GrammaticalAnalyzer {
    connector: Arc<dyn KnowledgeConnector>,
    policy: AnalyzerPolicy,
    rules: Vec<GrammarRule>,
}

impl std::fmt::Debug for GrammaticalAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammaticalAnalyzer")
            .field("connector", &self.connector.name())
            .field("policy", &self.policy)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl GrammaticalAnalyzer {
    pub fn new(connector: Arc<dyn KnowledgeConnector>) -> Self {
        Self {
            connector,
            policy: AnalyzerPolicy::default(),
            rules: GrammarRule::default_rules(),
        }
    }

    pub fn with_policy(mut self, policy: AnalyzerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the rule set (rules keep their own order).
    pub fn with_rules(mut self, rules: Vec<GrammarRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn policy(&self) -> &AnalyzerPolicy {
        &self.policy
    }

    /// The templates `tree` yields, with their slot table. No lookups.
    pub fn templates(
        &self,
        tree: &ParseTree,
        language: &str,
    ) -> Result<(Vec<Template>, SlotTable), AnalyzeError> {
        let lexicon = Lexicon::for_language(language)
            .ok_or_else(|| AnalyzeError::UnsupportedLanguage(language.to_string()))?;
        let mut slots = SlotTable::new();
        let templates = build_templates(tree, lexicon, &self.rules, &self.policy, &mut slots);
        Ok((templates, slots))
    }

    /// Analyze one parse tree.
    ///
    /// An empty result means the question was not understood. Lookup
    /// failures drop the templates depending on them; only when every
    /// template was dropped that way is the failure returned.
    pub async fn analyze(
        &self,
        tree: &ParseTree,
        language: &str,
        deadline: Deadline,
    ) -> Result<Vec<Candidate>, AnalyzeError> {
        let (templates, slots) = self.templates(tree, language)?;
        tracing::debug!(
            templates = templates.len(),
            slots = slots.len(),
            question = %tree.text(),
            "templates built"
        );
        if templates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: BTreeSet<_> = templates.iter().flat_map(|t| t.shape.slots()).collect();
        let resolutions = resolve_slots(
            &self.connector,
            &slots,
            &ids,
            language,
            &self.policy,
            deadline,
        )
        .await;

        let type_relations = self.connector.type_relations();
        let mut candidates = Vec::new();
        let mut first_failure: Option<LookupError> = None;
        let mut failed = 0usize;
        for template in &templates {
            match expand_template(
                template,
                &slots,
                &resolutions,
                &type_relations,
                &self.policy,
            ) {
                Ok(expanded) => {
                    tracing::trace!(
                        rule = %template.rule,
                        shape = %template.shape.describe(&slots),
                        candidates = expanded.len(),
                        "template expanded"
                    );
                    candidates.extend(expanded);
                }
                Err(error) => {
                    tracing::debug!(
                        rule = %template.rule,
                        %error,
                        "template dropped after lookup failure"
                    );
                    failed += 1;
                    first_failure.get_or_insert(error);
                }
            }
        }

        if failed == templates.len() {
            if let Some(error) = first_failure {
                tracing::warn!(%error, "every interpretation depends on a failed lookup");
                return Err(AnalyzeError::Lookup(error));
            }
        }

        let ranked = rank(candidates, self.policy.max_candidates);
        tracing::debug!(candidates = ranked.len(), "analysis finished");
        Ok(ranked)
    }
}
