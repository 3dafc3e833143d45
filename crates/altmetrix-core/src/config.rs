//! Application and provider configuration.
//!
//! Both files are JSON. The application file lists provider definitions;
//! each definition points at a provider config file that is located with
//! [`resolve_config_path`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::MetricDefinition;
use crate::error::ConfigError;
use crate::http_client::DEFAULT_USER_AGENT;
use crate::retry::{ErrorPolicies, ErrorPolicy};
use crate::throttling::RateLimitConfig;

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Last directory searched for relative provider config paths.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default)]
    pub providers: Vec<ProviderDefinition>,
}

fn default_user_agent() -> String {
    String::from(DEFAULT_USER_AGENT)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            base_dir: None,
            providers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }
}

/// Which provider class to build and where its config lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    pub class: String,
    pub config: PathBuf,
}

impl ProviderDefinition {
    pub fn new(class: impl Into<String>, config: impl Into<PathBuf>) -> Self {
        Self {
            class: class.into(),
            config: config.into(),
        }
    }
}

/// The `metrics` section: endpoint settings plus one entry per metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSection {
    /// URL template for the metrics endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(flatten)]
    pub definitions: BTreeMap<String, MetricDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached response stays valid; zero disables caching.
    #[serde(default = "default_max_cache_duration")]
    pub max_cache_duration: f64,
}

fn default_max_cache_duration() -> f64 {
    3600.0
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_duration: default_max_cache_duration(),
        }
    }
}

/// Per-provider configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name used as the prefix of its metric names.
    pub name: String,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub errors: ErrorPolicies,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: MetricsSection::default(),
            errors: ErrorPolicies::new(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn with_metric(mut self, metric: impl Into<String>, definition: MetricDefinition) -> Self {
        self.metrics.definitions.insert(metric.into(), definition);
        self
    }

    pub fn with_error_policy(mut self, kind: impl Into<String>, policy: ErrorPolicy) -> Self {
        self.errors.insert(kind.into(), policy);
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        seconds(self.cache.max_cache_duration)
    }

    pub fn metrics_timeout(&self) -> Option<Duration> {
        self.metrics.timeout.map(seconds)
    }

    /// `"<provider>:<metric>"` for every declared metric.
    pub fn full_metric_names(&self) -> Vec<String> {
        self.metrics
            .definitions
            .keys()
            .map(|metric| format!("{}:{metric}", self.name))
            .collect()
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Every configured metric across the active providers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRegistry {
    definitions: BTreeMap<String, MetricDefinition>,
}

impl MetricRegistry {
    pub fn from_configs<'a>(configs: impl IntoIterator<Item = &'a ProviderConfig>) -> Self {
        let mut definitions = BTreeMap::new();
        for config in configs {
            for (metric, definition) in &config.metrics.definitions {
                definitions.insert(format!("{}:{metric}", config.name), definition.clone());
            }
        }
        Self { definitions }
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn definition(&self, full_name: &str) -> Option<&MetricDefinition> {
        self.definitions.get(full_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricDefinition)> {
        self.definitions
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Candidate locations for a provider config path, in search order.
///
/// Absolute paths are used as given. Relative paths are tried beneath the
/// working directory, beneath its `config/` subdirectory, then beneath
/// `base_dir`.
pub fn config_candidates(path: &Path, working_dir: &Path, base_dir: Option<&Path>) -> Vec<PathBuf> {
    if path.is_absolute() {
        return vec![path.to_path_buf()];
    }

    let mut candidates = vec![
        working_dir.join(path),
        working_dir.join("config").join(path),
    ];
    if let Some(base_dir) = base_dir {
        candidates.push(base_dir.join(path));
    }
    candidates
}

/// First existing candidate for `path`.
pub fn resolve_config_path(
    path: &Path,
    working_dir: &Path,
    base_dir: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let candidates = config_candidates(path, working_dir, base_dir);
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            path: path.to_path_buf(),
            searched: candidates,
        })
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
