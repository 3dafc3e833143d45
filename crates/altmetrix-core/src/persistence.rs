//! Optimistic merge/save protocol.
//!
//! Every entity write runs read-merge-write under one process-wide lock:
//! fetch the stored document, fold its keys into the in-memory document,
//! then commit against the stored revision. Workers that loaded the same
//! entity at different times therefore never clobber each other's keys and
//! never see a revision conflict from one another.

use std::sync::{Mutex, PoisonError};

use altmetrix_warehouse::{DocumentStore, Revision};
use serde_json::Value;
use tracing::debug;

use crate::error::CoreError;

static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Merge `stored` into `in_memory`.
///
/// Keys only present in `stored` are copied across; keys present in
/// `in_memory` keep their in-memory value, recursing when both sides are
/// objects. Arrays and scalars are replaced wholesale.
pub fn merge_documents(in_memory: Value, stored: &Value) -> Value {
    match (in_memory, stored) {
        (Value::Object(mut fresh), Value::Object(previous)) => {
            for (key, stored_value) in previous {
                match fresh.get_mut(key) {
                    Some(current) => {
                        let taken = current.take();
                        *current = merge_documents(taken, stored_value);
                    }
                    None => {
                        fresh.insert(key.clone(), stored_value.clone());
                    }
                }
            }
            Value::Object(fresh)
        }
        (fresh, _) => fresh,
    }
}

/// Merge `document` with whatever is stored under `id` and commit it.
pub fn save_document(
    store: &dyn DocumentStore,
    id: &str,
    document: Value,
) -> Result<Revision, CoreError> {
    // Store commits are atomic per document, so a poisoned lock guards nothing.
    let _guard = WRITE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let (merged, expected) = match store.get(id)? {
        Some(stored) => (merge_documents(document, &stored.body), Some(stored.rev)),
        None => (document, None),
    };

    let revision = store.put(id, &merged, expected.as_ref())?;
    debug!(id, revision = %revision, "saved document");
    Ok(revision)
}

/// An entity persisted as one JSON document.
pub trait Saveable {
    fn id(&self) -> &str;

    /// The document body written to the store.
    fn to_document(&self) -> Result<Value, serde_json::Error>;

    fn save(&self, store: &dyn DocumentStore) -> Result<Revision, CoreError> {
        save_document(store, self.id(), self.to_document()?)
    }

    fn delete(&self, store: &dyn DocumentStore) -> Result<(), CoreError> {
        store.delete(self.id())?;
        debug!(id = self.id(), "deleted document");
        Ok(())
    }
}
