use std::collections::BTreeMap;
use std::env;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::decode_json;
use crate::config::ProviderConfig;
use crate::domain::{Alias, MetricReading};
use crate::error::ProviderError;
use crate::factory::ProviderContext;
use crate::fetch::Fetcher;
use crate::http_client::HttpAuth;
use crate::provider::{CapabilitySet, MetricReadings, Provider, ProviderFuture};

const API_BASE: &str = "https://api.github.com";
const WEB_BASE: &str = "https://github.com";

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    html_url: String,
    owner: Owner,
    stargazers_count: Option<i64>,
    forks_count: Option<i64>,
    created_at: Option<String>,
    pushed_at: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositorySummary {
    html_url: String,
}

/// `(owner, repo)` for a `github` alias (`"owner,repo"`) or a repository URL.
fn repository_slug(alias: &Alias) -> Option<(&str, &str)> {
    let (owner, repo) = match alias.namespace.as_str() {
        "github" => alias.id.split_once(',')?,
        "url" => {
            let path = ["https://github.com/", "http://github.com/", "https://www.github.com/"]
                .iter()
                .find_map(|prefix| alias.id.strip_prefix(prefix))?;
            let mut segments = path.split('/');
            (segments.next()?, segments.next()?)
        }
        _ => return None,
    };

    let repo = repo.trim_end_matches(".git");
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

/// GitHub repositories: membership by user, stars and forks, and
/// repository metadata.
///
/// Requests are authenticated when `ALTMETRIX_GITHUB_TOKEN` is set.
pub struct GithubProvider {
    config: ProviderConfig,
    fetcher: Fetcher,
    headers: BTreeMap<String, String>,
}

impl GithubProvider {
    pub const CLASS: &'static str = "Github";
    pub const TOKEN_ENV: &'static str = "ALTMETRIX_GITHUB_TOKEN";

    pub fn new(context: ProviderContext) -> Self {
        let auth = env::var(Self::TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .map_or(HttpAuth::None, HttpAuth::BearerToken);
        let fetcher = context.fetcher().with_auth(auth);

        Self {
            config: context.config,
            fetcher,
            headers: BTreeMap::from([(
                String::from("accept"),
                String::from("application/vnd.github+json"),
            )]),
        }
    }

    /// API root; `metrics.url` overrides it, e.g. for GitHub Enterprise.
    fn api_base(&self) -> &str {
        self.config
            .metrics
            .url
            .as_deref()
            .unwrap_or(API_BASE)
            .trim_end_matches('/')
    }

    fn metric_name(&self, metric: &str) -> String {
        format!("{}:{metric}", self.config.name)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ProviderError> {
        let response = self
            .fetcher
            .http_get(url, &self.headers, self.config.metrics_timeout(), &self.config.errors)
            .await?;
        decode_json(&self.config.name, &response)
    }

    async fn repository(&self, aliases: &[Alias]) -> Result<Option<Repository>, ProviderError> {
        let Some((owner, repo)) = aliases.iter().find_map(repository_slug) else {
            return Ok(None);
        };
        let url = format!(
            "{}/repos/{}/{}",
            self.api_base(),
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );
        debug!(provider = %self.config.name, url, "fetching repository");
        self.get_json(&url).await
    }
}

fn count(value: Option<i64>, field: &str) -> Result<i64, ProviderError> {
    let value = value.ok_or_else(|| ProviderError::content_malformed(format!("repository payload lacks {field}")))?;
    if value < 0 {
        return Err(ProviderError::validation_failed(format!("{field} is negative: {value}")));
    }
    Ok(value)
}

impl Provider for GithubProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn is_relevant_alias(&self, alias: &Alias) -> bool {
        repository_slug(alias).is_some()
    }

    fn member_items<'a>(&'a self, query: &'a str, query_type: &'a str) -> ProviderFuture<'a, Vec<Alias>> {
        Box::pin(async move {
            if query_type != "github_user" {
                return Err(ProviderError::validation_failed(format!(
                    "unsupported member query type '{query_type}'"
                )));
            }

            let url = format!(
                "{}/users/{}/repos?per_page=100",
                self.api_base(),
                urlencoding::encode(query)
            );
            let repositories: Vec<RepositorySummary> = self.get_json(&url).await?.unwrap_or_default();
            Ok(repositories
                .into_iter()
                .map(|repository| Alias::new("url", repository.html_url))
                .collect())
        })
    }

    fn aliases<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, Vec<Alias>> {
        Box::pin(async move {
            let Some(repository) = self.repository(aliases).await? else {
                return Ok(Vec::new());
            };
            Ok(vec![
                Alias::new("url", repository.html_url),
                Alias::new("title", repository.name),
            ])
        })
    }

    fn metrics<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, MetricReadings> {
        Box::pin(async move {
            let Some(repository) = self.repository(aliases).await? else {
                return Ok(MetricReadings::new());
            };

            let stars = count(repository.stargazers_count, "stargazers_count")?;
            let forks = count(repository.forks_count, "forks_count")?;
            let html_url = repository.html_url.trim_end_matches('/');

            Ok(MetricReadings::from([
                (
                    self.metric_name("stars"),
                    MetricReading::with_provenance(stars, format!("{html_url}/stargazers")),
                ),
                (
                    self.metric_name("forks"),
                    MetricReading::with_provenance(forks, format!("{html_url}/network/members")),
                ),
            ]))
        })
    }

    fn biblio<'a>(&'a self, aliases: &'a [Alias]) -> ProviderFuture<'a, Map<String, Value>> {
        Box::pin(async move {
            let Some(repository) = self.repository(aliases).await? else {
                return Ok(Map::new());
            };

            let mut biblio = Map::new();
            biblio.insert(String::from("title"), Value::from(repository.name));
            biblio.insert(String::from("owner"), Value::from(repository.owner.login));
            biblio.insert(String::from("url"), Value::from(repository.html_url));
            if let Some(description) = repository.description {
                biblio.insert(String::from("description"), Value::from(description));
            }
            if let Some(created_at) = repository.created_at {
                if let Some(year) = created_at.get(..4) {
                    biblio.insert(String::from("year"), Value::from(year));
                }
                biblio.insert(String::from("create_date"), Value::from(created_at));
            }
            if let Some(pushed_at) = repository.pushed_at {
                biblio.insert(String::from("last_push_date"), Value::from(pushed_at));
            }
            Ok(biblio)
        })
    }

    fn provenance_url(&self, metric: &str, aliases: &[Alias]) -> Option<String> {
        let (owner, repo) = aliases.iter().find_map(repository_slug)?;
        let suffix = match metric.strip_prefix(&format!("{}:", self.config.name))? {
            "stars" => "stargazers",
            "forks" => "network/members",
            _ => return None,
        };
        Some(format!("{WEB_BASE}/{owner}/{repo}/{suffix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{context, CannedHttpClient};
    use crate::domain::MetricValue;
    use crate::error::ProviderErrorKind;
    use crate::http_client::HttpResponse;

    const CDK_REPO: &str = r#"{
        "name": "cdk",
        "html_url": "https://github.com/egonw/cdk",
        "owner": {"login": "egonw"},
        "stargazers_count": 33,
        "forks_count": 20,
        "created_at": "2012-01-18T10:49:04Z",
        "pushed_at": "2013-01-08T06:09:29Z",
        "description": "The Chemistry Development Kit"
    }"#;

    fn provider(routes: &[(&str, HttpResponse)]) -> (GithubProvider, std::sync::Arc<CannedHttpClient>) {
        let client = CannedHttpClient::new(routes);
        let provider = GithubProvider::new(context(ProviderConfig::new("github"), client.clone()));
        (provider, client)
    }

    fn cdk_url() -> Vec<Alias> {
        vec![Alias::new("url", "https://github.com/egonw/cdk")]
    }

    #[test]
    fn relevance_requires_a_repository() {
        let (provider, _) = provider(&[]);
        assert!(provider.is_relevant_alias(&Alias::new("url", "https://github.com/egonw/cdk")));
        assert!(provider.is_relevant_alias(&Alias::new("github", "egonw,cdk")));
        assert!(!provider.is_relevant_alias(&Alias::new("url", "https://github.com/egonw")));
        assert!(!provider.is_relevant_alias(&Alias::new("url", "https://example.org/egonw/cdk")));
        assert!(!provider.is_relevant_alias(&Alias::new("doi", "NOT A GITHUB ID")));
    }

    #[tokio::test]
    async fn metrics_report_stars_and_forks_with_provenance() {
        let (provider, client) = provider(&[(
            "https://api.github.com/repos/egonw/cdk",
            HttpResponse::ok(CDK_REPO),
        )]);

        let readings = provider.metrics(&cdk_url()).await.expect("metrics");
        assert_eq!(
            readings["github:stars"],
            MetricReading::with_provenance(33, "https://github.com/egonw/cdk/stargazers")
        );
        assert_eq!(readings["github:forks"].value, MetricValue::Integer(20));
        assert_eq!(
            readings["github:forks"].provenance_url.as_deref(),
            Some("https://github.com/egonw/cdk/network/members")
        );

        let requested = client.requested.lock().expect("requested");
        assert_eq!(requested[0].header("accept"), Some("application/vnd.github+json"));
        assert_eq!(requested[0].header("user-agent"), Some("altmetrix-test"));
    }

    #[tokio::test]
    async fn legacy_github_namespace_is_accepted() {
        let (provider, client) = provider(&[(
            "https://api.github.com/repos/egonw/cdk",
            HttpResponse::ok(CDK_REPO),
        )]);

        let readings = provider
            .metrics(&[Alias::new("github", "egonw,cdk")])
            .await
            .expect("metrics");
        assert_eq!(readings.len(), 2);
        assert_eq!(client.requested_urls(), vec!["https://api.github.com/repos/egonw/cdk"]);
    }

    #[tokio::test]
    async fn unknown_repository_is_no_data() {
        let (provider, _) = provider(&[(
            "https://api.github.com/repos/",
            HttpResponse::new(404, r#"{"message": "Not Found"}"#),
        )]);
        let readings = provider.metrics(&cdk_url()).await.expect("no data");
        assert!(readings.is_empty());
    }

    #[tokio::test]
    async fn missing_counts_are_malformed_not_zero() {
        let (provider, _) = provider(&[(
            "https://api.github.com/repos/",
            HttpResponse::ok(r#"{"name": "cdk", "html_url": "https://github.com/egonw/cdk", "owner": {"login": "egonw"}}"#),
        )]);
        let error = provider.metrics(&cdk_url()).await.expect_err("malformed");
        assert_eq!(error.kind(), ProviderErrorKind::ContentMalformed);
    }

    #[tokio::test]
    async fn server_errors_surface_with_status() {
        let (provider, _) = provider(&[("https://api.github.com/repos/", HttpResponse::new(503, ""))]);
        let error = provider.metrics(&cdk_url()).await.expect_err("server error");
        assert_eq!(error.kind(), ProviderErrorKind::Server);
        assert_eq!(error.status(), Some(503));
    }

    #[tokio::test]
    async fn biblio_describes_the_repository() {
        let (provider, _) = provider(&[(
            "https://api.github.com/repos/egonw/cdk",
            HttpResponse::ok(CDK_REPO),
        )]);

        let biblio = provider.biblio(&cdk_url()).await.expect("biblio");
        assert_eq!(biblio["title"], "cdk");
        assert_eq!(biblio["owner"], "egonw");
        assert_eq!(biblio["year"], "2012");
        assert_eq!(biblio["create_date"], "2012-01-18T10:49:04Z");
        assert_eq!(biblio["last_push_date"], "2013-01-08T06:09:29Z");
    }

    #[tokio::test]
    async fn aliases_add_url_and_title() {
        let (provider, _) = provider(&[(
            "https://api.github.com/repos/egonw/cdk",
            HttpResponse::ok(CDK_REPO),
        )]);

        let aliases = provider
            .aliases(&[Alias::new("github", "egonw,cdk")])
            .await
            .expect("aliases");
        assert_eq!(
            aliases,
            vec![
                Alias::new("url", "https://github.com/egonw/cdk"),
                Alias::new("title", "cdk"),
            ]
        );
    }

    #[tokio::test]
    async fn member_items_lists_user_repositories() {
        let (provider, client) = provider(&[(
            "https://api.github.com/users/egonw/repos",
            HttpResponse::ok(
                r#"[{"html_url": "https://github.com/egonw/cdk"}, {"html_url": "https://github.com/egonw/jmol"}]"#,
            ),
        )]);

        let members = provider.member_items("egonw", "github_user").await.expect("members");
        assert_eq!(members.len(), 2);
        assert_eq!(members[1], Alias::new("url", "https://github.com/egonw/jmol"));
        assert_eq!(
            client.requested_urls(),
            vec!["https://api.github.com/users/egonw/repos?per_page=100"]
        );

        let error = provider.member_items("egonw", "orcid").await.expect_err("bad type");
        assert_eq!(error.kind(), ProviderErrorKind::ValidationFailed);
    }

    #[test]
    fn provenance_urls_point_at_github_pages() {
        let (provider, _) = provider(&[]);
        assert_eq!(
            provider.provenance_url("github:forks", &cdk_url()).as_deref(),
            Some("https://github.com/egonw/cdk/network/members")
        );
        assert_eq!(
            provider.provenance_url("github:stars", &cdk_url()).as_deref(),
            Some("https://github.com/egonw/cdk/stargazers")
        );
        assert_eq!(provider.provenance_url("github:watchers", &cdk_url()), None);
    }
}
