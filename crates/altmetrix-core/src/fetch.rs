//! Shared fetch primitive used by every provider.
//!
//! [`Fetcher::fetch`] serves from the cache when it can, otherwise waits out
//! the pacing delay left by the previous call, performs the GET and caches
//! whatever response came back. [`Fetcher::http_get`] wraps it with the
//! provider's per-kind retry policies.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::ProviderError;
use crate::http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, TransportErrorKind,
    DEFAULT_USER_AGENT,
};
use crate::retry::ErrorPolicies;
use crate::shutdown::{pause, ShutdownSignal};
use crate::throttling::RateLimitState;

#[derive(Debug)]
struct Pacing {
    state: RateLimitState,
    /// Delay owed before the next network call.
    owed: Duration,
}

/// Per-provider HTTP access: cache, pacing, transport and retries.
pub struct Fetcher {
    provider: String,
    http_client: Arc<dyn HttpClient>,
    cache: CacheStore,
    cache_ttl: Option<Duration>,
    user_agent: String,
    auth: HttpAuth,
    pacing: Mutex<Pacing>,
    shutdown: Option<ShutdownSignal>,
}

impl Fetcher {
    pub fn new(provider: impl Into<String>, http_client: Arc<dyn HttpClient>, cache: CacheStore) -> Self {
        Self {
            provider: provider.into(),
            http_client,
            cache,
            cache_ttl: None,
            user_agent: String::from(DEFAULT_USER_AGENT),
            auth: HttpAuth::None,
            pacing: Mutex::new(Pacing {
                state: RateLimitState::default(),
                owed: Duration::ZERO,
            }),
            shutdown: None,
        }
    }

    /// Cache lifetime for this provider's responses; `None` uses the cache default.
    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_rate_limit(self, state: RateLimitState) -> Self {
        self.pacing
            .lock()
            .expect("fetcher pacing mutex poisoned")
            .state = state;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Option<ShutdownSignal>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Snapshot of the pacing state.
    pub fn rate_limit_state(&self) -> RateLimitState {
        self.pacing
            .lock()
            .expect("fetcher pacing mutex poisoned")
            .state
            .clone()
    }

    /// Count a request made outside this fetcher against the quota.
    pub fn register_unthrottled_hit(&self) {
        self.pacing
            .lock()
            .expect("fetcher pacing mutex poisoned")
            .state
            .register_unthrottled_hit();
    }

    /// One GET, cache first. Transport failures become `Timeout` or `Http`.
    pub async fn fetch(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, ProviderError> {
        if let Some(cached) = self.cache.get(url).await {
            debug!(provider = %self.provider, url, "cache hit");
            return Ok(cached);
        }

        let owed = std::mem::take(
            &mut self
                .pacing
                .lock()
                .expect("fetcher pacing mutex poisoned")
                .owed,
        );
        if !owed.is_zero() {
            debug!(provider = %self.provider, wait_ms = owed.as_millis() as u64, "pacing before request");
        }
        pause(owed, self.shutdown.as_ref()).await?;

        let request = HttpRequest::get(url)
            .with_headers(headers)
            .with_auth(&self.auth)
            .with_header("user-agent", self.user_agent.as_str())
            .with_timeout(timeout);
        let result = self.http_client.execute(request).await;

        {
            let mut pacing = self.pacing.lock().expect("fetcher pacing mutex poisoned");
            pacing.owed = pacing.state.sleep_time();
        }

        match result {
            Ok(response) => {
                self.cache
                    .put(url, response.clone(), self.cache_ttl)
                    .await;
                Ok(response)
            }
            Err(error) => {
                info!(provider = %self.provider, url, error = %error, "transport failure");
                Err(transport_error(&error))
            }
        }
    }

    /// [`fetch`](Self::fetch) with retries for `Timeout` and `Http` failures,
    /// as configured in `policies`. Other errors are returned untouched.
    pub async fn http_get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        timeout: Option<Duration>,
        policies: &ErrorPolicies,
    ) -> Result<HttpResponse, ProviderError> {
        let mut retries_done = 0_u32;
        loop {
            let error = match self.fetch(url, headers, timeout).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            let Some(policy) = error
                .kind()
                .policy_key()
                .and_then(|key| policies.get(key))
            else {
                return Err(error);
            };
            if !policy.allows_retry(retries_done) {
                return Err(error);
            }

            retries_done = retries_done.saturating_add(1);
            let delay = policy.delay_for_attempt(retries_done);
            warn!(
                provider = %self.provider,
                url,
                attempt = retries_done,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying request"
            );
            pause(delay, self.shutdown.as_ref()).await?;
        }
    }
}

fn transport_error(error: &HttpError) -> ProviderError {
    match error.kind() {
        TransportErrorKind::Timeout => ProviderError::timeout(error.message()),
        TransportErrorKind::Connect | TransportErrorKind::Other => ProviderError::http(error.message()),
    }
}
