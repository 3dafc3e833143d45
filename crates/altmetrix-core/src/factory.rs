//! Provider construction from configuration.

use std::collections::BTreeMap;
use std::env;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::adapters::{GithubProvider, WikipediaProvider};
use crate::cache::CacheStore;
use crate::config::{resolve_config_path, AppConfig, MetricRegistry, ProviderConfig, ProviderDefinition};
use crate::error::{ConfigError, ProviderError};
use crate::fetch::Fetcher;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::provider::ProviderHandle;
use crate::shutdown::ShutdownSignal;
use crate::throttling::RateLimitState;

/// Everything a constructor needs to build one provider.
#[derive(Clone)]
pub struct ProviderContext {
    pub config: ProviderConfig,
    pub http_client: Arc<dyn HttpClient>,
    pub cache: CacheStore,
    pub user_agent: String,
    pub shutdown: Option<ShutdownSignal>,
}

impl ProviderContext {
    /// A fetcher wired to this provider's cache lifetime and quota.
    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(self.config.name.clone(), Arc::clone(&self.http_client), self.cache.clone())
            .with_cache_ttl(Some(self.config.cache_ttl()))
            .with_user_agent(self.user_agent.clone())
            .with_rate_limit(RateLimitState::from_config(&self.config.rate_limit))
            .with_shutdown(self.shutdown.clone())
    }
}

pub type ProviderConstructor =
    Arc<dyn Fn(ProviderContext) -> Result<ProviderHandle, ProviderError> + Send + Sync>;

/// Builds providers from the application's provider definitions.
///
/// Every provider shares one cache, one HTTP client and the application
/// user agent. A definition that cannot be resolved is fatal only for that
/// provider.
pub struct ProviderFactory {
    app: AppConfig,
    working_dir: PathBuf,
    http_client: Arc<dyn HttpClient>,
    cache: CacheStore,
    shutdown: Option<ShutdownSignal>,
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl Debug for ProviderFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("app", &self.app)
            .field("working_dir", &self.working_dir)
            .field("classes", &self.constructors.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ProviderFactory {
    pub fn new(app: AppConfig) -> Self {
        Self {
            app,
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            http_client: Arc::new(ReqwestHttpClient::new()),
            cache: CacheStore::default(),
            shutdown: None,
            constructors: BTreeMap::new(),
        }
    }

    /// Register the reference adapters under their class names.
    pub fn with_builtin_adapters(mut self) -> Self {
        self.register(GithubProvider::CLASS, |context| {
            Ok(Arc::new(GithubProvider::new(context)) as ProviderHandle)
        });
        self.register(WikipediaProvider::CLASS, |context| {
            Ok(Arc::new(WikipediaProvider::new(context)) as ProviderHandle)
        });
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Option<ShutdownSignal>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn register<F>(&mut self, class: impl Into<String>, constructor: F)
    where
        F: Fn(ProviderContext) -> Result<ProviderHandle, ProviderError> + Send + Sync + 'static,
    {
        self.constructors.insert(class.into(), Arc::new(constructor));
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Locate and parse the config file named by `definition`.
    pub fn load_config(&self, definition: &ProviderDefinition) -> Result<ProviderConfig, ConfigError> {
        let path = resolve_config_path(
            &definition.config,
            &self.working_dir,
            self.app.base_dir.as_deref(),
        )?;
        debug!(class = %definition.class, path = %path.display(), "loading provider config");
        ProviderConfig::load(&path)
    }

    /// Fully qualified class names fall back to their last segment.
    fn constructor(&self, class: &str) -> Result<&ProviderConstructor, ConfigError> {
        self.constructors
            .get(class)
            .or_else(|| {
                class
                    .rsplit('.')
                    .next()
                    .and_then(|short| self.constructors.get(short))
            })
            .ok_or_else(|| ConfigError::UnknownClass {
                class: class.to_owned(),
            })
    }

    pub fn get_provider(&self, definition: &ProviderDefinition) -> Result<ProviderHandle, ProviderError> {
        let constructor = self.constructor(&definition.class)?;
        let config = self.load_config(definition)?;
        constructor(ProviderContext {
            config,
            http_client: Arc::clone(&self.http_client),
            cache: self.cache.clone(),
            user_agent: self.app.user_agent.clone(),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Every provider that could be built; failures are logged and skipped.
    pub fn get_providers(&self) -> Vec<ProviderHandle> {
        self.app
            .providers
            .iter()
            .filter_map(|definition| match self.get_provider(definition) {
                Ok(provider) => Some(provider),
                Err(err) => {
                    error!(class = %definition.class, config = %definition.config.display(), error = %err, "skipping provider");
                    None
                }
            })
            .collect()
    }

    /// Configs of every resolvable provider, in definition order.
    pub fn load_configs(&self) -> Vec<ProviderConfig> {
        self.app
            .providers
            .iter()
            .filter_map(|definition| match self.load_config(definition) {
                Ok(config) => Some(config),
                Err(err) => {
                    error!(class = %definition.class, error = %err, "skipping provider config");
                    None
                }
            })
            .collect()
    }

    pub fn metric_registry(&self) -> MetricRegistry {
        MetricRegistry::from_configs(&self.load_configs())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
