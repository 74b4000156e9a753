//! Service configuration.
//!
//! Loaded from a JSON file (every field optional), then overridden from
//! `PLATYPUS_*` environment variables, then validated.

use crate::executor::ExecutionPolicy;
use platypus_analyzer::{AnalyzerPolicy, Lexicon, PolicyError};
use platypus_kb::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_LANGUAGE: &str = "PLATYPUS_LANGUAGE";
pub const ENV_MAX_CANDIDATES: &str = "PLATYPUS_MAX_CANDIDATES";
pub const ENV_GLOBAL_TIMEOUT_MS: &str = "PLATYPUS_GLOBAL_TIMEOUT_MS";
pub const ENV_CONFIDENCE_THRESHOLD: &str = "PLATYPUS_CONFIDENCE_THRESHOLD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{var} is not valid: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("no grammar for language {0:?}")]
    UnsupportedLanguage(String),
    #[error("invalid analyzer policy: {0}")]
    Policy(#[from] PolicyError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Used when no hint is given and the language cannot be guessed.
    pub default_language: String,
    pub supported_languages: Vec<String>,
    /// Candidates kept after analysis (K). Overrides `analyzer.max_candidates`.
    pub max_candidates: usize,
    pub global_timeout_ms: u64,
    /// A candidate at or above this confidence that returns answers ends
    /// execution.
    pub confidence_threshold: f64,
    pub analyzer: AnalyzerPolicy,
    pub execution: ExecutionPolicy,
    pub cache: CacheConfig,
    /// JSON-lines file every request is appended to.
    pub request_log: Option<PathBuf>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            supported_languages: Lexicon::languages().map(str::to_string).collect(),
            max_candidates: 10,
            global_timeout_ms: 10_000,
            confidence_threshold: 0.5,
            analyzer: AnalyzerPolicy::default(),
            execution: ExecutionPolicy::default(),
            cache: CacheConfig::default(),
            request_log: None,
        }
    }
}

impl QaConfig {
    /// Read `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: QaConfig = serde_json::from_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration file read");
        config.with_env_overrides()?.validated()
    }

    /// Defaults with environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()?.validated()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides looked up by variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(language) = lookup(ENV_LANGUAGE) {
            self.default_language = language.trim().to_lowercase();
        }
        if let Some(value) = lookup(ENV_MAX_CANDIDATES) {
            self.max_candidates = parse_var(ENV_MAX_CANDIDATES, &value)?;
        }
        if let Some(value) = lookup(ENV_GLOBAL_TIMEOUT_MS) {
            self.global_timeout_ms = parse_var(ENV_GLOBAL_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_CONFIDENCE_THRESHOLD) {
            self.confidence_threshold = parse_var(ENV_CONFIDENCE_THRESHOLD, &value)?;
        }
        Ok(self)
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_languages.is_empty() {
            return Err(ConfigError::Invalid(
                "supported_languages is empty".to_string(),
            ));
        }
        if let Some(language) = self
            .supported_languages
            .iter()
            .find(|l| Lexicon::for_language(l).is_none())
        {
            return Err(ConfigError::UnsupportedLanguage(language.clone()));
        }
        if !self.supports(&self.default_language) {
            return Err(ConfigError::Invalid(format!(
                "default_language {:?} is not among supported_languages",
                self.default_language
            )));
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::Invalid("max_candidates must be at least 1".to_string()));
        }
        if self.global_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "global_timeout_ms must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        self.analyzer.validate()?;

        let e = &self.execution;
        if e.max_attempts == 0 || e.fan_out == 0 || e.result_limit == 0 {
            return Err(ConfigError::Invalid(
                "execution max_attempts, fan_out and result_limit must be at least 1".to_string(),
            ));
        }
        if !(e.per_candidate_fraction > 0.0 && e.per_candidate_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "per_candidate_fraction must be within (0, 1], got {}",
                e.per_candidate_fraction
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn supports(&self, language: &str) -> bool {
        self.supported_languages.iter().any(|l| l == language)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }

    /// The analyzer policy with the configured candidate cap.
    pub fn analyzer_policy(&self) -> AnalyzerPolicy {
        AnalyzerPolicy {
            max_candidates: self.max_candidates,
            ..self.analyzer.clone()
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
