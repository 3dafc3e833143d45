//! Behavior-driven tests for error handling
//!
//! These tests verify HOW provider failures are contained: a broken provider
//! or config never stops the others, and every failure leaves a record.

mod support;

use std::sync::Arc;

use altmetrix_core::{
    Alias, AppConfig, Capability, Collector, DocumentStore, DuckDbStore, DuckDbStoreConfig,
    HttpResponse, ItemFactory, MemoryStore, MetricValue, ProviderDefinition, ProviderErrorKind,
    ProviderFactory, Saveable,
};
use support::{write_config, ScriptedHttpClient};
use tempfile::tempdir;

const CDK_REPO: &str = r#"{
    "name": "cdk",
    "html_url": "https://github.com/egonw/cdk",
    "owner": {"login": "egonw"},
    "stargazers_count": 33,
    "forks_count": 20
}"#;

const WIKIPEDIA_HITS: &str = r#"{"query": {"searchinfo": {"totalhits": 4}, "search": []}}"#;

/// Factory over a temp config dir holding GitHub and Wikipedia configs.
fn factory(dir: &std::path::Path, client: &Arc<ScriptedHttpClient>) -> ProviderFactory {
    write_config(dir, "github.json", r#"{"name": "github", "metrics": {"stars": {}, "forks": {}}}"#);
    write_config(dir, "wikipedia.json", r#"{"name": "wikipedia", "metrics": {"mentions": {}}}"#);
    ProviderFactory::new(AppConfig {
        providers: vec![
            ProviderDefinition::new("Github", "github.json"),
            ProviderDefinition::new("Wikipedia", "wikipedia.json"),
        ],
        ..AppConfig::default()
    })
    .with_builtin_adapters()
    .with_http_client(client.clone())
    .with_working_dir(dir)
}

// =============================================================================
// Error Handling: Provider Failures
// =============================================================================

#[tokio::test]
async fn when_one_provider_fails_the_others_results_are_still_saved() {
    // Given: GitHub is down while Wikipedia answers
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new()
        .route("https://api.github.com/", vec![Ok(HttpResponse::new(502, "bad gateway"))])
        .route("https://en.wikipedia.org/", vec![Ok(HttpResponse::ok(WIKIPEDIA_HITS))]);
    let factory = factory(dir.path(), &client);
    let store = Arc::new(MemoryStore::new());
    let collector = Collector::new(factory.get_providers()).with_store(store.clone());

    let mut item = ItemFactory::new(factory.metric_registry()).make();
    item.aliases.add_alias("github", "egonw,cdk");
    item.aliases.add_alias("doi", "10.1/cdk");

    // When: Metrics are collected and the item saved
    let report = collector.collect_metrics(&mut item).await;
    item.save(store.as_ref()).expect("save item");

    // Then: Wikipedia's reading is stored and GitHub's failure is recorded
    assert_eq!(report.succeeded, vec!["wikipedia"]);
    assert_eq!(report.errors.len(), 1);
    let record = &report.errors[0];
    assert_eq!(record.provider, "github");
    assert_eq!(record.error_type, "provider.server_error");
    assert_eq!(record.item_id.as_deref(), Some(item.id.as_str()));

    let stored_item = store.get(&item.id).expect("get").expect("item stored");
    let mentions = stored_item.body["metrics"]["wikipedia:mentions"]["values"]
        .as_object()
        .expect("values");
    assert_eq!(mentions.len(), 1);
    assert!(stored_item.body["metrics"]["github:stars"]["values"]
        .as_object()
        .expect("values")
        .is_empty());

    let stored_error = store.get(&record.id).expect("get").expect("error stored");
    assert_eq!(stored_error.body["type"], "error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn when_failures_are_recorded_to_a_file_store_every_record_lands() {
    // Given: Both providers failing and a DuckDB-backed collector
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new()
        .route("https://api.github.com/", vec![Ok(HttpResponse::new(500, "boom"))])
        .route("https://en.wikipedia.org/", vec![Ok(HttpResponse::new(500, "boom"))]);
    let factory = factory(dir.path(), &client);
    let store = Arc::new(
        DuckDbStore::open(DuckDbStoreConfig::new(dir.path().join("errors.duckdb"))).expect("open duckdb"),
    );
    let collector = Collector::new(factory.get_providers()).with_store(store.clone());
    let mut item = ItemFactory::new(factory.metric_registry()).make();
    item.aliases.add_alias("github", "egonw,cdk");
    item.aliases.add_alias("doi", "10.1/cdk");

    // When: Metrics are collected
    let report = collector.collect_metrics(&mut item).await;

    // Then: Each failure was written before the pass returned
    assert_eq!(report.errors.len(), 2);
    for record in &report.errors {
        let stored = store.get(&record.id).expect("get").expect("error stored");
        assert_eq!(stored.body["provider"], record.provider.as_str());
    }
}

#[tokio::test]
async fn when_item_has_no_alias_a_provider_understands_that_provider_is_not_called() {
    // Given: An item known only by its DOI
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new()
        .route("https://en.wikipedia.org/", vec![Ok(HttpResponse::ok(WIKIPEDIA_HITS))]);
    let factory = factory(dir.path(), &client);
    let collector = Collector::new(factory.get_providers());
    let mut item = ItemFactory::new(factory.metric_registry()).make();
    item.aliases.add_alias("doi", "10.1/cdk");

    // When: Metrics are collected
    let report = collector.collect_metrics(&mut item).await;

    // Then: GitHub is skipped without an error and no GitHub URL was requested
    assert!(report.is_clean());
    assert_eq!(report.skipped, vec!["github"]);
    assert!(client
        .requests()
        .iter()
        .all(|request| !request.url.starts_with("https://api.github.com/")));
    assert_eq!(
        item.metric("wikipedia:mentions").and_then(|snapshot| snapshot.latest()),
        Some(&MetricValue::Integer(4))
    );
}

#[tokio::test]
async fn when_repository_is_unknown_upstream_metrics_are_empty_not_an_error() {
    // Given: GitHub answers 404 for the repository
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new()
        .route("https://api.github.com/", vec![Ok(HttpResponse::new(404, r#"{"message": "Not Found"}"#))]);
    let providers = factory(dir.path(), &client).get_providers();

    // When: GitHub metrics are requested
    let readings = providers[0]
        .metrics(&[Alias::new("url", "https://github.com/egonw/gone")])
        .await
        .expect("404 is no data");

    // Then: Nothing is reported
    assert!(readings.is_empty());
}

#[tokio::test]
async fn when_upstream_rejects_the_request_the_status_is_kept() {
    // Given: GitHub rejects the request
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new()
        .route("https://api.github.com/", vec![Ok(HttpResponse::new(403, "rate limited"))]);
    let providers = factory(dir.path(), &client).get_providers();

    // When: GitHub biblio is requested
    let error = providers[0]
        .biblio(&[Alias::new("github", "egonw,cdk")])
        .await
        .expect_err("forbidden");

    // Then: The client error carries its status and is not retryable
    assert_eq!(error.kind(), ProviderErrorKind::Client);
    assert_eq!(error.status(), Some(403));
    assert!(!error.retryable());
}

#[tokio::test]
async fn when_capability_is_missing_the_call_is_rejected() {
    // Given: The metrics-only Wikipedia provider
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new();
    let providers = factory(dir.path(), &client).get_providers();
    let wikipedia = &providers[1];

    // When: Aliases are requested from it
    assert!(!wikipedia.capabilities().supports(Capability::Aliases));
    let error = wikipedia
        .aliases(&[Alias::new("doi", "10.1/cdk")])
        .await
        .expect_err("not supported");

    // Then: The caller is told, and no request went out
    assert_eq!(error.kind(), ProviderErrorKind::NotSupported);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn when_github_succeeds_readings_carry_provenance() {
    let dir = tempdir().expect("tempdir");
    let client = ScriptedHttpClient::new()
        .route("https://api.github.com/repos/egonw/cdk", vec![Ok(HttpResponse::ok(CDK_REPO))]);
    let providers = factory(dir.path(), &client).get_providers();

    let readings = providers[0]
        .metrics(&[Alias::new("github", "egonw,cdk")])
        .await
        .expect("metrics");
    assert_eq!(readings["github:stars"].value, MetricValue::Integer(33));
    assert_eq!(
        readings["github:stars"].provenance_url.as_deref(),
        Some("https://github.com/egonw/cdk/stargazers")
    );
}

// =============================================================================
// Error Handling: Configuration
// =============================================================================

#[test]
fn when_a_provider_config_is_missing_only_that_provider_is_skipped() {
    // Given: An application naming three providers, one without a config file
    let dir = tempdir().expect("tempdir");
    write_config(dir.path(), "wikipedia.json", r#"{"name": "wikipedia"}"#);
    write_config(dir.path(), "github.json", r#"{"name": "github"}"#);
    let factory = ProviderFactory::new(AppConfig {
        providers: vec![
            ProviderDefinition::new("Github", "github.json"),
            ProviderDefinition::new("Wikipedia", "missing.json"),
            ProviderDefinition::new("Wikipedia", "wikipedia.json"),
        ],
        ..AppConfig::default()
    })
    .with_builtin_adapters()
    .with_working_dir(dir.path());

    // When: Providers are built
    let providers = factory.get_providers();

    // Then: The two resolvable providers are returned in order
    let names: Vec<&str> = providers.iter().map(|provider| provider.name()).collect();
    assert_eq!(names, vec!["github", "wikipedia"]);
}

#[test]
fn when_a_provider_class_is_unknown_the_rest_still_load() {
    let dir = tempdir().expect("tempdir");
    write_config(dir.path(), "wikipedia.json", r#"{"name": "wikipedia"}"#);
    let factory = ProviderFactory::new(AppConfig {
        providers: vec![
            ProviderDefinition::new("Mendeley", "wikipedia.json"),
            ProviderDefinition::new("Wikipedia", "wikipedia.json"),
        ],
        ..AppConfig::default()
    })
    .with_builtin_adapters()
    .with_working_dir(dir.path());

    let providers = factory.get_providers();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].name(), "wikipedia");
}

#[test]
fn when_app_config_is_loaded_defaults_fill_the_gaps() {
    let dir = tempdir().expect("tempdir");
    write_config(
        dir.path(),
        "altmetrix.json",
        r#"{"providers": [{"class": "Wikipedia", "config": "wikipedia.json"}]}"#,
    );

    let app = AppConfig::load(&dir.path().join("altmetrix.json")).expect("app config");
    assert!(app.user_agent.starts_with("altmetrix/"));
    assert_eq!(app.providers, vec![ProviderDefinition::new("Wikipedia", "wikipedia.json")]);
    assert!(app.base_dir.is_none());
}
