//! Drive a set of providers over one item.
//!
//! Providers run in order. A provider is skipped when it lacks the
//! capability or none of the item's aliases are relevant to it. A failing
//! provider becomes an [`ErrorRecord`] and the rest still run; only a
//! shutdown request stops the batch early.

use std::sync::Arc;

use altmetrix_warehouse::DocumentStore;
use tracing::{debug, error, info};

use crate::domain::{Alias, ErrorRecord, Item};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::persistence::Saveable;
use crate::provider::{Capability, Provider, ProviderHandle};
use crate::timestamp::now_epoch;

/// Outcome of one collection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectReport {
    /// Providers that answered, in call order.
    pub succeeded: Vec<String>,
    /// Providers not called for this item.
    pub skipped: Vec<String>,
    pub errors: Vec<ErrorRecord>,
    /// Set when a shutdown request cut the pass short.
    pub interrupted: bool,
}

impl CollectReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.interrupted
    }

    fn absorb(&mut self, other: CollectReport) {
        self.succeeded.extend(other.succeeded);
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
        self.interrupted |= other.interrupted;
    }
}

pub struct Collector {
    providers: Vec<ProviderHandle>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl Collector {
    pub fn new(providers: Vec<ProviderHandle>) -> Self {
        Self {
            providers,
            store: None,
        }
    }

    /// Persist error records to `store` as they happen.
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn providers(&self) -> &[ProviderHandle] {
        &self.providers
    }

    /// Aliases of `item` that `provider` should be called with, or `None`
    /// when the provider must be skipped.
    fn eligible_aliases(
        provider: &dyn Provider,
        capability: Capability,
        item: &Item,
        report: &mut CollectReport,
    ) -> Option<Vec<Alias>> {
        if !provider.capabilities().supports(capability) {
            report.skipped.push(provider.name().to_owned());
            return None;
        }

        let relevant: Vec<Alias> = item
            .aliases
            .get_aliases_list(None)
            .into_iter()
            .filter(|alias| provider.is_relevant_alias(alias))
            .collect();
        if relevant.is_empty() {
            debug!(provider = provider.name(), item = %item.id, %capability, "no relevant aliases");
            report.skipped.push(provider.name().to_owned());
            return None;
        }
        Some(relevant)
    }

    /// Record a failure; returns `true` when the pass must stop.
    ///
    /// The store write runs on the blocking pool.
    async fn record_failure(
        &self,
        provider: &str,
        item: &Item,
        failure: &ProviderError,
        report: &mut CollectReport,
    ) -> bool {
        let record = ErrorRecord::from_provider_error(provider, Some(&item.id), failure);
        if failure.kind() == ProviderErrorKind::Interrupted {
            info!(provider, item = %item.id, "collection interrupted by shutdown");
            report.interrupted = true;
            return true;
        }

        error!(provider, item = %item.id, error = %failure, "provider call failed");
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let pending = record.clone();
            match tokio::task::spawn_blocking(move || pending.save(store.as_ref())).await {
                Ok(Ok(_)) => {}
                Ok(Err(save_error)) => error!(provider, error = %save_error, "failed to save error record"),
                Err(join_error) => error!(provider, error = %join_error, "error record save task failed"),
            }
        }
        report.errors.push(record);
        false
    }

    /// Ask every alias provider for further aliases, feeding each one the
    /// aliases found so far.
    pub async fn collect_aliases(&self, item: &mut Item) -> CollectReport {
        let mut report = CollectReport::default();
        for provider in &self.providers {
            let Some(aliases) = Self::eligible_aliases(provider.as_ref(), Capability::Aliases, item, &mut report)
            else {
                continue;
            };

            match provider.aliases(&aliases).await {
                Ok(found) => {
                    debug!(provider = provider.name(), item = %item.id, count = found.len(), "aliases found");
                    item.aliases.add_unique(&found);
                    report.succeeded.push(provider.name().to_owned());
                }
                Err(failure) => {
                    if self.record_failure(provider.name(), item, &failure, &mut report).await {
                        return report;
                    }
                }
            }
        }
        item.aliases.mark_completed();
        report
    }

    pub async fn collect_metrics(&self, item: &mut Item) -> CollectReport {
        let mut report = CollectReport::default();
        for provider in &self.providers {
            let Some(aliases) = Self::eligible_aliases(provider.as_ref(), Capability::Metrics, item, &mut report)
            else {
                continue;
            };

            match provider.metrics(&aliases).await {
                Ok(readings) => {
                    debug!(provider = provider.name(), item = %item.id, count = readings.len(), "metrics collected");
                    item.record_metrics(&readings, now_epoch());
                    report.succeeded.push(provider.name().to_owned());
                }
                Err(failure) => {
                    if self.record_failure(provider.name(), item, &failure, &mut report).await {
                        return report;
                    }
                }
            }
        }
        report
    }

    pub async fn collect_biblio(&self, item: &mut Item) -> CollectReport {
        let mut report = CollectReport::default();
        for provider in &self.providers {
            let Some(aliases) = Self::eligible_aliases(provider.as_ref(), Capability::Biblio, item, &mut report)
            else {
                continue;
            };

            match provider.biblio(&aliases).await {
                Ok(biblio) => {
                    item.record_biblio(biblio);
                    report.succeeded.push(provider.name().to_owned());
                }
                Err(failure) => {
                    if self.record_failure(provider.name(), item, &failure, &mut report).await {
                        return report;
                    }
                }
            }
        }
        report
    }

    /// Aliases, then bibliographic data, then metrics.
    pub async fn update_item(&self, item: &mut Item) -> CollectReport {
        let mut report = self.collect_aliases(item).await;
        if report.interrupted {
            return report;
        }
        report.absorb(self.collect_biblio(item).await);
        if report.interrupted {
            return report;
        }
        report.absorb(self.collect_metrics(item).await);
        report
    }
}

#[cfg(test)]
mod tests {
    use altmetrix_warehouse::MemoryStore;
    use serde_json::{Map, Value};

    use super::*;
    use crate::config::MetricRegistry;
    use crate::domain::{ItemFactory, MetricReading, MetricValue};
    use crate::provider::{CapabilitySet, MetricReadings, ProviderFuture};

    /// Answers from fixed data; fails with `failure` when set.
    struct StubProvider {
        name: &'static str,
        namespace: &'static str,
        capabilities: CapabilitySet,
        failure: Option<ProviderError>,
        found_alias: Option<Alias>,
    }

    impl StubProvider {
        fn new(name: &'static str, namespace: &'static str) -> Self {
            Self {
                name,
                namespace,
                capabilities: CapabilitySet::full(),
                failure: None,
                found_alias: None,
            }
        }

        fn result<T>(&self, value: T) -> Result<T, ProviderError> {
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(value),
            }
        }
    }

    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> CapabilitySet {
            self.capabilities
        }

        fn is_relevant_alias(&self, alias: &Alias) -> bool {
            alias.namespace == self.namespace
        }

        fn aliases<'a>(&'a self, _aliases: &'a [Alias]) -> ProviderFuture<'a, Vec<Alias>> {
            let found = self.found_alias.clone().into_iter().collect();
            Box::pin(std::future::ready(self.result(found)))
        }

        fn metrics<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, MetricReadings> {
            let readings = MetricReadings::from([(
                format!("{}:count", self.name),
                MetricReading::new(i64::try_from(aliases.len()).unwrap_or_default()),
            )]);
            Box::pin(std::future::ready(self.result(readings)))
        }

        fn biblio<'a>(&'a self, _aliases: &'a [Alias]) -> ProviderFuture<'a, Map<String, Value>> {
            let biblio = Map::from_iter([(String::from("title"), Value::from(self.name))]);
            Box::pin(std::future::ready(self.result(biblio)))
        }
    }

    fn handles(providers: Vec<StubProvider>) -> Vec<ProviderHandle> {
        providers
            .into_iter()
            .map(|provider| Arc::new(provider) as ProviderHandle)
            .collect()
    }

    fn item_with_doi() -> Item {
        let mut item = ItemFactory::new(MetricRegistry::default()).make();
        item.aliases.add_alias("doi", "10.1/x");
        item
    }

    #[tokio::test]
    async fn failing_provider_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::new());
        let broken = StubProvider {
            failure: Some(ProviderError::server(500, "boom")),
            ..StubProvider::new("broken", "doi")
        };
        let healthy = StubProvider::new("healthy", "doi");
        let collector = Collector::new(handles(vec![broken, healthy])).with_store(store.clone());

        let mut item = item_with_doi();
        let report = collector.collect_metrics(&mut item).await;

        assert_eq!(report.succeeded, vec!["healthy"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].provider, "broken");
        assert_eq!(report.errors[0].error_type, "provider.server_error");
        assert!(!report.is_clean());

        let latest = item.metric("healthy:count").and_then(|snapshot| snapshot.latest());
        assert_eq!(latest, Some(&MetricValue::Integer(1)));
        assert!(item.metric("broken:count").is_none());

        let saved = store.get(&report.errors[0].id).expect("get").expect("error saved");
        assert_eq!(saved.body["item_id"], Value::from(item.id.clone()));
    }

    #[tokio::test]
    async fn providers_without_capability_or_relevant_aliases_are_skipped() {
        let metrics_only = StubProvider {
            capabilities: CapabilitySet::metrics_only(),
            ..StubProvider::new("metrics_only", "doi")
        };
        let wrong_namespace = StubProvider::new("github_like", "github");
        let collector = Collector::new(handles(vec![metrics_only, wrong_namespace]));

        let mut item = item_with_doi();
        let report = collector.collect_biblio(&mut item).await;
        assert!(report.succeeded.is_empty());
        assert_eq!(report.skipped, vec!["metrics_only", "github_like"]);
        assert!(report.is_clean());
        assert!(item.biblio.is_empty());
    }

    #[tokio::test]
    async fn alias_providers_see_earlier_results() {
        let resolver = StubProvider {
            found_alias: Some(Alias::new("url", "https://github.com/egonw/cdk")),
            ..StubProvider::new("resolver", "doi")
        };
        let follower = StubProvider {
            found_alias: Some(Alias::new("title", "cdk")),
            ..StubProvider::new("follower", "url")
        };
        let collector = Collector::new(handles(vec![resolver, follower]));

        let mut item = item_with_doi();
        let report = collector.collect_aliases(&mut item).await;
        assert_eq!(report.succeeded, vec!["resolver", "follower"]);
        assert_eq!(item.aliases.get("title"), ["cdk"]);
        assert!(item.aliases.last_completed.is_some());
    }

    #[tokio::test]
    async fn shutdown_stops_the_pass() {
        let interrupted = StubProvider {
            failure: Some(ProviderError::interrupted()),
            ..StubProvider::new("slow", "doi")
        };
        let never_called = StubProvider::new("after", "doi");
        let collector = Collector::new(handles(vec![interrupted, never_called]));

        let mut item = item_with_doi();
        let report = collector.update_item(&mut item).await;
        assert!(report.interrupted);
        assert!(report.errors.is_empty());
        assert!(report.succeeded.is_empty());
        assert!(item.aliases.last_completed.is_none());
    }

    #[tokio::test]
    async fn update_item_runs_every_stage() {
        let collector = Collector::new(handles(vec![StubProvider::new("full", "doi")]));
        let mut item = item_with_doi();
        let report = collector.update_item(&mut item).await;

        assert_eq!(report.succeeded, vec!["full", "full", "full"]);
        assert_eq!(item.biblio["title"], "full");
        assert!(item.metric("full:count").is_some());
    }
}
