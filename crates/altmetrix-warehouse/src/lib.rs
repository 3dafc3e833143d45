//! # Altmetrix Warehouse
//!
//! Revisioned document storage for altmetrix entities.
//!
//! ## Overview
//!
//! Every persisted entity (items, collections, error records) is a JSON body
//! stored under a string id together with a store-assigned revision token.
//! Writes are optimistic: a caller must present the revision it last read,
//! and the store rejects the write with [`StoreError::Conflict`] if another
//! writer got there first. The store never offers multi-document
//! transactions.
//!
//! ## Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStore`] | Hash map behind a mutex, for tests and short-lived workers |
//! | [`DuckDbStore`] | Single `documents` table in a `DuckDB` file |
//!
//! ## Quick Start
//!
//! ```rust
//! use altmetrix_warehouse::{DocumentStore, MemoryStore};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let rev = store.put("abc", &json!({"doi": ["10.1/x"]}), None)?;
//! let stored = store.get("abc")?.expect("document exists");
//! assert_eq!(stored.rev, rev);
//! # Ok::<(), altmetrix_warehouse::StoreError>(())
//! ```

pub mod duckdb;
pub mod memory;
pub mod migrations;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use duckdb::{DuckDbStore, DuckDbStoreConfig};
pub use memory::MemoryStore;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document exists for the requested id.
    #[error("document '{id}' not found")]
    NotFound { id: String },

    /// The presented revision does not match the stored one.
    #[error("revision conflict on '{id}': expected {expected:?}, found {actual:?}")]
    Conflict {
        id: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Document body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Opaque token identifying one stored version of a document.
///
/// Rendered as `<generation>-<uuid4 hex>`; the generation counts writes to
/// the id and makes tokens readable in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint the revision that follows `previous` (or the first one).
    pub fn next(previous: Option<&Revision>) -> Self {
        let generation = previous.map_or(0, Revision::generation) + 1;
        Self(format!("{generation}-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as currently held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub rev: Revision,
    pub body: Value,
}

/// Storage contract for revisioned JSON documents.
///
/// Implementations must be `Send + Sync`; every method is a single atomic
/// operation on one document.
pub trait DocumentStore: Send + Sync {
    /// Fetch the current version of a document, if any.
    fn get(&self, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Write a new version of a document.
    ///
    /// `expected` must equal the stored revision, or be `None` when the
    /// document does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `expected` is stale.
    fn put(&self, id: &str, body: &Value, expected: Option<&Revision>)
        -> Result<Revision, StoreError>;

    /// Remove a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing is stored under `id`.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Shared revision check used by every backend.
pub(crate) fn check_revision(
    id: &str,
    expected: Option<&Revision>,
    actual: Option<&Revision>,
) -> Result<(), StoreError> {
    if expected == actual {
        return Ok(());
    }
    Err(StoreError::Conflict {
        id: id.to_owned(),
        expected: expected.map(|rev| rev.as_str().to_owned()),
        actual: actual.map(|rev| rev.as_str().to_owned()),
    })
}
