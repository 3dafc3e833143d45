//! Provider capability contract.
//!
//! Every external data source implements [`Provider`]. Capabilities are
//! declared up front through [`CapabilitySet`]; calling an operation the
//! provider does not declare yields a `NotSupported` error.
//!
//! | Operation | Input | Output |
//! |-----------|-------|--------|
//! | [`member_items`](Provider::member_items) | query and query type | aliases of matching artifacts |
//! | [`aliases`](Provider::aliases) | known aliases | further aliases |
//! | [`metrics`](Provider::metrics) | known aliases | `"<provider>:<metric>"` readings |
//! | [`biblio`](Provider::biblio) | known aliases | bibliographic fields |
//!
//! An empty result means the provider found nothing. A `ContentMalformed`
//! error means a response arrived that could not be parsed; the two must
//! never be conflated.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Alias, MetricReading};
use crate::error::ProviderError;
use crate::http_client::HttpResponse;

/// Operation kinds a provider may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Members,
    Aliases,
    Metrics,
    Biblio,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Members => "members",
            Self::Aliases => "aliases",
            Self::Metrics => "metrics",
            Self::Biblio => "biblio",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a provider implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub members: bool,
    pub aliases: bool,
    pub metrics: bool,
    pub biblio: bool,
}

impl CapabilitySet {
    pub const fn new(members: bool, aliases: bool, metrics: bool, biblio: bool) -> Self {
        Self {
            members,
            aliases,
            metrics,
            biblio,
        }
    }

    pub const fn full() -> Self {
        Self::new(true, true, true, true)
    }

    pub const fn metrics_only() -> Self {
        Self::new(false, false, true, false)
    }

    pub const fn supports(self, capability: Capability) -> bool {
        match capability {
            Capability::Members => self.members,
            Capability::Aliases => self.aliases,
            Capability::Metrics => self.metrics,
            Capability::Biblio => self.biblio,
        }
    }

    pub fn supported(self) -> Vec<Capability> {
        [
            Capability::Members,
            Capability::Aliases,
            Capability::Metrics,
            Capability::Biblio,
        ]
        .into_iter()
        .filter(|capability| self.supports(*capability))
        .collect()
    }
}

/// Metric name (`"<provider>:<metric>"`) to reading.
pub type MetricReadings = BTreeMap<String, MetricReading>;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Shared handle to a constructed provider.
pub type ProviderHandle = Arc<dyn Provider>;

fn unsupported<'a, T: Send + 'a>(provider: &str, capability: Capability) -> ProviderFuture<'a, T> {
    let error = ProviderError::not_supported(provider, capability);
    Box::pin(std::future::ready(Err(error)))
}

/// Contract implemented by every external data source.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// task collecting from that source.
pub trait Provider: Send + Sync {
    /// Provider name; also the prefix of its metric names.
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Whether this provider can act on `alias`. Must not perform I/O.
    fn is_relevant_alias(&self, alias: &Alias) -> bool;

    /// Aliases of the artifacts matching `query`, e.g. every repository
    /// owned by a user.
    fn member_items<'a>(&'a self, query: &'a str, query_type: &'a str) -> ProviderFuture<'a, Vec<Alias>> {
        let _ = (query, query_type);
        unsupported(self.name(), Capability::Members)
    }

    fn aliases<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, Vec<Alias>> {
        let _ = aliases;
        unsupported(self.name(), Capability::Aliases)
    }

    fn metrics<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, MetricReadings> {
        let _ = aliases;
        unsupported(self.name(), Capability::Metrics)
    }

    fn biblio<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, Map<String, Value>> {
        let _ = aliases;
        unsupported(self.name(), Capability::Biblio)
    }

    /// Where a human can see the value of `metric` for these aliases.
    fn provenance_url(&self, metric: &str, aliases: &[Alias]) -> Option<String> {
        let _ = (metric, aliases);
        None
    }
}

/// Parse a response body as JSON.
pub fn load_json(body: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(body)
        .map_err(|error| ProviderError::content_malformed(format!("invalid JSON response: {error}")))
}

/// Map a non-2xx response to a provider error.
pub fn error_for_status(response: &HttpResponse) -> Result<(), ProviderError> {
    let status = response.status;
    match status {
        200..=299 => Ok(()),
        400..=499 => Err(ProviderError::client(status, format!("upstream rejected request with {status}"))),
        500..=599 => Err(ProviderError::server(status, format!("upstream failed with {status}"))),
        _ => Err(ProviderError::content_malformed(format!("unexpected response status {status}"))),
    }
}

/// Substitute the URL-encoded `id` into a `{id}` or `%s` placeholder.
pub fn templated_url(template: &str, id: &str) -> String {
    let encoded = urlencoding::encode(id);
    if template.contains("{id}") {
        template.replace("{id}", &encoded)
    } else {
        template.replacen("%s", &encoded, 1)
    }
}
