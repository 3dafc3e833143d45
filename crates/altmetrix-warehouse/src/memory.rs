//! In-memory document store.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::{check_revision, DocumentStore, Revision, StoreError, StoredDocument};

#[derive(Debug, Clone)]
struct Entry {
    rev: Revision,
    body: Value,
}

/// Thread-safe in-memory [`DocumentStore`].
///
/// Enforces the same optimistic revision check as the persistent backend, so
/// it is a faithful stand-in for concurrency tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .expect("memory store mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let documents = self.documents.lock().expect("memory store mutex poisoned");
        Ok(documents.get(id).map(|entry| StoredDocument {
            id: id.to_owned(),
            rev: entry.rev.clone(),
            body: entry.body.clone(),
        }))
    }

    fn put(
        &self,
        id: &str,
        body: &Value,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let mut documents = self.documents.lock().expect("memory store mutex poisoned");
        let current = documents.get(id).map(|entry| &entry.rev);
        check_revision(id, expected, current)?;

        let rev = Revision::next(current);
        documents.insert(
            id.to_owned(),
            Entry {
                rev: rev.clone(),
                body: body.clone(),
            },
        );
        Ok(rev)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("memory store mutex poisoned");
        documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(id))
    }
}
