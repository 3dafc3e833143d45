//! # Altmetrix Core
//!
//! Resilient access to research-impact metric providers.
//!
//! ## Overview
//!
//! This crate provides the pieces every provider adapter and the collector
//! are built from:
//!
//! - **Provider contract** with explicit capability flags
//! - **HTTP cache** shared by all providers, keyed by URL
//! - **Rate limiting** per provider, with pacing between requests
//! - **Retry with backoff** for transport failures, configured per provider
//! - **Provider factory** that builds providers from config files
//! - **Optimistic merge-on-save** for items, collections and error records
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Reference providers (GitHub, Wikipedia) |
//! | [`cache`] | Shared URL-keyed response cache |
//! | [`collector`] | Runs providers over an item and records failures |
//! | [`config`] | Application and provider configuration files |
//! | [`domain`] | Items, aliases, metrics, collections, error records |
//! | [`error`] | Provider, config and entity errors |
//! | [`factory`] | Provider construction from configuration |
//! | [`fetch`] | Cached, paced and retried HTTP GETs |
//! | [`http_client`] | HTTP client abstraction |
//! | [`persistence`] | Merge-on-save against a document store |
//! | [`provider`] | Provider trait and capability flags |
//! | [`retry`] | Error policies and backoff delays |
//! | [`shutdown`] | Interruptible pauses |
//! | [`throttling`] | Rate-limit window accounting |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use altmetrix_core::{AppConfig, Collector, ItemFactory, ProviderFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     altmetrix_core::logging::init("altmetrix_core=info");
//!
//!     let app = AppConfig::load(std::path::Path::new("altmetrix.json"))?;
//!     let factory = ProviderFactory::new(app).with_builtin_adapters();
//!
//!     let mut item = ItemFactory::new(factory.metric_registry()).make();
//!     item.aliases.add_alias("doi", "10.1371/journal.pmed.0020124");
//!
//!     let report = Collector::new(factory.get_providers()).update_item(&mut item).await;
//!     println!("{} providers answered", report.succeeded.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Collector      │────▶│ Document Store   │
//! └────────┬────────┘     │ (merge-on-save)  │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider        │────▶│ Fetcher          │
//! │ (Adapter Trait) │     │ cache/pace/retry │
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ HTTP Client      │
//!                         └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Provider calls return a structured [`ProviderError`]. Only transport
//! failures are retried, and only inside [`Fetcher::http_get`]:
//!
//! ```rust
//! use altmetrix_core::{ProviderError, ProviderErrorKind};
//!
//! fn handle_error(error: ProviderError) {
//!     match error.kind() {
//!         ProviderErrorKind::Timeout | ProviderErrorKind::Http => {
//!             // Retries were exhausted
//!         }
//!         ProviderErrorKind::ContentMalformed => {
//!             // Upstream changed its payload
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API tokens are read from environment variables only (never logged)
//! - Every request carries the configured user agent

pub mod adapters;
pub mod cache;
pub mod collector;
pub mod config;
pub mod domain;
pub mod error;
pub mod factory;
pub mod fetch;
pub mod http_client;
pub mod logging;
pub mod persistence;
pub mod provider;
pub mod retry;
pub mod shutdown;
pub mod throttling;
pub mod timestamp;

// Adapter implementations
pub use adapters::{GithubProvider, WikipediaProvider};

// Caching
pub use cache::CacheStore;

// Collection
pub use collector::{CollectReport, Collector};

// Configuration
pub use config::{AppConfig, MetricRegistry, ProviderConfig, ProviderDefinition};

// Domain entities
pub use domain::{
    Alias, Aliases, Collection, CollectionFactory, ErrorRecord, Item, ItemFactory,
    MetricDefinition, MetricReading, MetricSnapshot, MetricValue, StaticMeta,
};

// Error types
pub use error::{ConfigError, CoreError, ProviderError, ProviderErrorKind};

// Provider construction and fetching
pub use factory::{ProviderContext, ProviderFactory};
pub use fetch::Fetcher;

// HTTP client types
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Persistence
pub use persistence::{merge_documents, save_document, Saveable};

// Provider contract
pub use provider::{Capability, CapabilitySet, MetricReadings, Provider, ProviderFuture, ProviderHandle};

// Retry and rate limiting
pub use retry::{ErrorPolicies, ErrorPolicy, RetryType};
pub use throttling::{RateLimitConfig, RateLimitState};

// Shutdown
pub use shutdown::{ShutdownHandle, ShutdownSignal};

// Warehouse (re-exported from altmetrix-warehouse)
pub use altmetrix_warehouse::{
    DocumentStore, DuckDbStore, DuckDbStoreConfig, MemoryStore, Revision, StoreError, StoredDocument,
};
