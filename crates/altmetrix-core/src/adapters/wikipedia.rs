use std::collections::BTreeMap;

use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{debug, warn};

use super::decode_json;
use crate::config::ProviderConfig;
use crate::domain::{Alias, MetricReading};
use crate::error::ProviderError;
use crate::factory::ProviderContext;
use crate::fetch::Fetcher;
use crate::provider::{templated_url, CapabilitySet, MetricReadings, Provider, ProviderFuture};

const DEFAULT_SEARCH_URL: &str =
    "https://en.wikipedia.org/w/api.php?action=query&list=search&srsearch=%22{id}%22&srlimit=500&format=json";
const SEARCH_PAGE: &str = "https://en.wikipedia.org/wiki/Special:Search?search=";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<IgnoredAny>,
    searchinfo: Option<SearchInfo>,
}

#[derive(Debug, Deserialize)]
struct SearchInfo {
    totalhits: i64,
}

/// Counts Wikipedia articles mentioning a DOI, via the search API.
pub struct WikipediaProvider {
    config: ProviderConfig,
    fetcher: Fetcher,
}

impl WikipediaProvider {
    pub const CLASS: &'static str = "Wikipedia";

    pub fn new(context: ProviderContext) -> Self {
        let fetcher = context.fetcher();
        Self {
            config: context.config,
            fetcher,
        }
    }

    fn mentions_metric(&self) -> String {
        format!("{}:mentions", self.config.name)
    }

    fn search_url(&self, doi: &str) -> String {
        let template = self.config.metrics.url.as_deref().unwrap_or(DEFAULT_SEARCH_URL);
        templated_url(template, doi)
    }

    async fn mentions(&self, doi: &str) -> Result<Option<i64>, ProviderError> {
        let url = self.search_url(doi);
        debug!(provider = %self.config.name, url, "searching for mentions");

        let response = self
            .fetcher
            .http_get(&url, &BTreeMap::new(), self.config.metrics_timeout(), &self.config.errors)
            .await?;
        let Some(payload) = decode_json::<SearchResponse>(&self.config.name, &response)? else {
            return Ok(None);
        };

        // A body without `query` is an API error page, not an empty search.
        let query = payload
            .query
            .ok_or_else(|| ProviderError::content_malformed("search response has no query section"))?;
        let hits = match query.searchinfo {
            Some(info) => info.totalhits,
            None => i64::try_from(query.search.len()).unwrap_or(i64::MAX),
        };
        if hits < 0 {
            return Err(ProviderError::validation_failed(format!("negative hit count {hits}")));
        }
        Ok(Some(hits))
    }
}

impl Provider for WikipediaProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::metrics_only()
    }

    fn is_relevant_alias(&self, alias: &Alias) -> bool {
        alias.namespace == "doi" && !alias.id.is_empty()
    }

    fn metrics<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, MetricReadings> {
        Box::pin(async move {
            let dois: Vec<&Alias> = aliases.iter().filter(|alias| self.is_relevant_alias(alias)).collect();
            let Some(first) = dois.first() else {
                return Ok(MetricReadings::new());
            };
            if dois.len() > 1 {
                warn!(provider = %self.config.name, count = dois.len(), "several DOIs given, using the first");
            }

            let Some(hits) = self.mentions(&first.id).await? else {
                return Ok(MetricReadings::new());
            };
            let metric = self.mentions_metric();
            let reading = match self.provenance_url(&metric, aliases) {
                Some(url) => MetricReading::with_provenance(hits, url),
                None => MetricReading::new(hits),
            };
            Ok(MetricReadings::from([(metric, reading)]))
        })
    }

    fn provenance_url(&self, metric: &str, aliases: &[Alias]) -> Option<String> {
        if metric != self.mentions_metric() {
            return None;
        }
        let doi = aliases.iter().find(|alias| self.is_relevant_alias(alias))?;
        Some(format!(
            "{SEARCH_PAGE}{}",
            urlencoding::encode(&format!("\"{}\"", doi.id))
        ))
    }
}
