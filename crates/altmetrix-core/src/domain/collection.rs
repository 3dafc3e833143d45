use altmetrix_warehouse::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::persistence::Saveable;
use crate::timestamp::now_epoch;

pub const COLLECTION_TYPE: &str = "collection";

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 6;

/// A short random id of lowercase letters and digits.
pub fn make_collection_id() -> String {
    (0..ID_LENGTH)
        .map(|_| char::from(ID_ALPHABET[fastrand::usize(..ID_ALPHABET.len())]))
        .collect()
}

/// A named, ordered group of item ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default = "now_epoch")]
    pub created: f64,
    #[serde(default = "now_epoch")]
    pub last_modified: f64,
    #[serde(default)]
    pub item_ids: Vec<String>,
}

impl Collection {
    /// Add `item_id` unless it is already a member.
    pub fn add_item(&mut self, item_id: &str) {
        if self.contains(item_id) {
            return;
        }
        self.item_ids.push(item_id.to_owned());
        self.last_modified = now_epoch();
    }

    pub fn add_items<'a>(&mut self, item_ids: impl IntoIterator<Item = &'a str>) {
        for item_id in item_ids {
            self.add_item(item_id);
        }
    }

    /// Returns whether the item was a member.
    pub fn remove_item(&mut self, item_id: &str) -> bool {
        let before = self.item_ids.len();
        self.item_ids.retain(|member| member != item_id);
        let removed = self.item_ids.len() != before;
        if removed {
            self.last_modified = now_epoch();
        }
        removed
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.item_ids.iter().any(|member| member == item_id)
    }
}

impl Saveable for Collection {
    fn id(&self) -> &str {
        &self.id
    }

    fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut document = serde_json::to_value(self)?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert(String::from("type"), Value::from(COLLECTION_TYPE));
        }
        Ok(document)
    }
}

pub struct CollectionFactory;

impl CollectionFactory {
    pub fn make(collection_name: Option<&str>, owner: Option<&str>) -> Collection {
        let now = now_epoch();
        Collection {
            id: make_collection_id(),
            collection_name: collection_name.map(str::to_owned),
            owner: owner.map(str::to_owned),
            created: now,
            last_modified: now,
            item_ids: Vec::new(),
        }
    }

    pub fn get(store: &dyn DocumentStore, id: &str) -> Result<Collection, CoreError> {
        let stored = store.get(id)?.ok_or_else(|| StoreError::not_found(id))?;
        let mut collection: Collection = serde_json::from_value(stored.body)?;
        collection.id = stored.id;
        Ok(collection)
    }
}
