//! Error types for provider access, configuration and persistence.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use altmetrix_warehouse::StoreError;
use thiserror::Error;

use crate::provider::Capability;

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The provider could not be configured and is unusable.
    Configuration,
    /// Connect or read timeout on the transport.
    Timeout,
    /// Any other transport failure (DNS, refused connection, broken body).
    Http,
    /// The upstream answered with a 4xx status.
    Client,
    /// The upstream answered with a 5xx status.
    Server,
    /// A response arrived but its payload could not be parsed.
    ContentMalformed,
    /// A value was extracted but failed a sanity check.
    ValidationFailed,
    /// The provider does not implement the requested capability.
    NotSupported,
    /// A pause was cut short by a shutdown request.
    Interrupted,
}

impl ProviderErrorKind {
    /// Key used to look up the retry policy for this kind, if it has one.
    pub const fn policy_key(self) -> Option<&'static str> {
        match self {
            Self::Timeout => Some("timeout"),
            Self::Http => Some("http_error"),
            _ => None,
        }
    }
}

/// Structured provider error.
///
/// Only [`ProviderErrorKind::Timeout`] and [`ProviderErrorKind::Http`] are
/// retryable; everything else must reach the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    status: Option<u16>,
}

impl ProviderError {
    fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Configuration, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Http, message)
    }

    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ProviderErrorKind::Client, message)
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(ProviderErrorKind::Server, message)
        }
    }

    pub fn content_malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ContentMalformed, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ValidationFailed, message)
    }

    pub fn not_supported(provider: &str, capability: Capability) -> Self {
        Self::new(
            ProviderErrorKind::NotSupported,
            format!("provider '{provider}' does not support {capability}"),
        )
    }

    pub fn interrupted() -> Self {
        Self::new(ProviderErrorKind::Interrupted, "pause interrupted by shutdown")
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Timeout | ProviderErrorKind::Http
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Configuration => "provider.configuration",
            ProviderErrorKind::Timeout => "provider.timeout",
            ProviderErrorKind::Http => "provider.http_error",
            ProviderErrorKind::Client => "provider.client_error",
            ProviderErrorKind::Server => "provider.server_error",
            ProviderErrorKind::ContentMalformed => "provider.content_malformed",
            ProviderErrorKind::ValidationFailed => "provider.validation_failed",
            ProviderErrorKind::NotSupported => "provider.not_supported",
            ProviderErrorKind::Interrupted => "provider.interrupted",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} [status {status}] ({})", self.message, self.code()),
            None => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors raised while locating or reading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file '{path}' not found (searched: {searched:?})")]
    NotFound {
        path: PathBuf,
        searched: Vec<PathBuf>,
    },

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no provider registered for class '{class}'")]
    UnknownClass { class: String },
}

impl From<ConfigError> for ProviderError {
    fn from(error: ConfigError) -> Self {
        ProviderError::configuration(error.to_string())
    }
}

/// Top-level error type for entity operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// True when the underlying store reported a missing id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_not_found())
    }
}
