//! Cross-request resolution cache.
//!
//! The cache is an explicit object owned by whoever assembles the service
//! and injected where it is needed. Entries are bounded in number and expire
//! after a time-to-live. Only successful lookups are cached, including
//! empty ones; failures always go back to the backend.

use crate::connector::{
    AnswerBinding, Deadline, EntityCandidate, ExecutionError, KnowledgeConnector, LookupError,
    RelationCandidate,
};
use async_trait::async_trait;
use moka::sync::Cache;
use platypus_formula::{Query, Relation, ValueType};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries per lookup kind.
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntityKey {
    text: String,
    language: String,
    expected: Option<ValueType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RelationKey {
    label: String,
    language: String,
    subject: Option<ValueType>,
    object: Option<ValueType>,
}

/// Collapse whitespace. Case is kept: backends may tell "Paris" from
/// "paris".
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bounded, TTL-expiring memo of entity and relation lookups.
#[derive(Clone)]
pub struct ResolutionCache {
    entities: Cache<EntityKey, Arc<Vec<EntityCandidate>>>,
    relations: Cache<RelationKey, Arc<Vec<RelationCandidate>>>,
}

impl ResolutionCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entities: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl())
                .build(),
            relations: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl())
                .build(),
        }
    }

    pub fn entities(
        &self,
        text: &str,
        language: &str,
        expected: Option<ValueType>,
    ) -> Option<Arc<Vec<EntityCandidate>>> {
        self.entities.get(&EntityKey {
            text: normalize(text),
            language: language.to_string(),
            expected,
        })
    }

    pub fn store_entities(
        &self,
        text: &str,
        language: &str,
        expected: Option<ValueType>,
        candidates: Vec<EntityCandidate>,
    ) -> Arc<Vec<EntityCandidate>> {
        let value = Arc::new(candidates);
        self.entities.insert(
            EntityKey {
                text: normalize(text),
                language: language.to_string(),
                expected,
            },
            value.clone(),
        );
        value
    }

    pub fn relations(
        &self,
        label: &str,
        language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
    ) -> Option<Arc<Vec<RelationCandidate>>> {
        self.relations.get(&RelationKey {
            label: normalize(label),
            language: language.to_string(),
            subject,
            object,
        })
    }

    pub fn store_relations(
        &self,
        label: &str,
        language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
        candidates: Vec<RelationCandidate>,
    ) -> Arc<Vec<RelationCandidate>> {
        let value = Arc::new(candidates);
        self.relations.insert(
            RelationKey {
                label: normalize(label),
                language: language.to_string(),
                subject,
                object,
            },
            value.clone(),
        );
        value
    }

    /// Approximate number of live entries, both kinds together.
    pub fn entry_count(&self) -> u64 {
        self.entities.run_pending_tasks();
        self.relations.run_pending_tasks();
        self.entities.entry_count() + self.relations.entry_count()
    }

    pub fn clear(&self) {
        self.entities.invalidate_all();
        self.relations.invalidate_all();
    }
}

/// Read-through caching in front of any connector. Query execution is
/// passed through uncached.
pub struct CachedConnector<C> {
    inner: C,
    cache: ResolutionCache,
}

impl<C: KnowledgeConnector> CachedConnector<C> {
    pub fn new(inner: C, cache: ResolutionCache) -> Self {
        Self { inner, cache }
    }

    /// The cache key text for `text`, case-folded only when the backend
    /// ignores case itself.
    fn key<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.inner.case_insensitive_labels() {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }
}

#[async_trait]
impl<C: KnowledgeConnector> KnowledgeConnector for CachedConnector<C> {
    async fn resolve_entities(
        &self,
        span: &str,
        language: &str,
        expected: Option<ValueType>,
    ) -> Result<Vec<EntityCandidate>, LookupError> {
        let key = self.key(span);
        if let Some(hit) = self.cache.entities(&key, language, expected) {
            tracing::trace!(span, "entity cache hit");
            return Ok(hit.as_ref().clone());
        }
        let fresh = self.inner.resolve_entities(span, language, expected).await?;
        Ok(self
            .cache
            .store_entities(&key, language, expected, fresh)
            .as_ref()
            .clone())
    }

    async fn resolve_relations(
        &self,
        label: &str,
        language: &str,
        subject: Option<ValueType>,
        object: Option<ValueType>,
    ) -> Result<Vec<RelationCandidate>, LookupError> {
        let key = self.key(label);
        if let Some(hit) = self.cache.relations(&key, language, subject, object) {
            tracing::trace!(label, "relation cache hit");
            return Ok(hit.as_ref().clone());
        }
        let fresh = self
            .inner
            .resolve_relations(label, language, subject, object)
            .await?;
        Ok(self
            .cache
            .store_relations(&key, language, subject, object, fresh)
            .as_ref()
            .clone())
    }

    async fn execute(
        &self,
        query: &Query,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<AnswerBinding>, ExecutionError> {
        self.inner.execute(query, limit, deadline).await
    }

    fn type_relations(&self) -> Vec<Relation> {
        self.inner.type_relations()
    }

    fn case_insensitive_labels(&self) -> bool {
        self.inner.case_insensitive_labels()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
