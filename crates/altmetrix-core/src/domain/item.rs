use std::collections::BTreeMap;

use altmetrix_warehouse::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::aliases::Aliases;
use super::metric::{MetricReading, MetricSnapshot};
use crate::config::MetricRegistry;
use crate::error::CoreError;
use crate::persistence::Saveable;
use crate::timestamp::{now_epoch, value_key};

pub const ITEM_TYPE: &str = "item";

/// A research artifact tracked across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub aliases: Aliases,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSnapshot>,
    #[serde(default)]
    pub biblio: Map<String, Value>,
    #[serde(default = "now_epoch")]
    pub created: f64,
    #[serde(default = "now_epoch")]
    pub last_modified: f64,
    #[serde(default = "now_epoch")]
    pub last_requested: f64,
}

impl Item {
    pub fn metric(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    /// Append provider readings observed at `at`.
    pub fn record_metrics(&mut self, readings: &BTreeMap<String, MetricReading>, at: f64) {
        if readings.is_empty() {
            return;
        }

        let key = value_key(at);
        for (name, reading) in readings {
            let snapshot = self.metrics.entry(name.clone()).or_default();
            snapshot.values.insert(key.clone(), reading.value.clone());
            if let Some(url) = &reading.provenance_url {
                snapshot.static_meta.get_or_insert_with(Default::default).provenance_url = Some(url.clone());
            }
        }
        self.last_modified = at;
    }

    /// Overlay bibliographic fields, keeping fields the provider did not return.
    pub fn record_biblio(&mut self, biblio: Map<String, Value>) {
        if biblio.is_empty() {
            return;
        }
        self.biblio.extend(biblio);
        self.last_modified = now_epoch();
    }
}

impl Saveable for Item {
    fn id(&self) -> &str {
        &self.id
    }

    /// Static metadata is rebuilt from configuration on load and is not stored.
    fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut document = serde_json::to_value(self)?;
        if let Some(metrics) = document.get_mut("metrics").and_then(Value::as_object_mut) {
            for snapshot in metrics.values_mut().filter_map(Value::as_object_mut) {
                snapshot.remove("static_meta");
            }
        }
        if let Some(fields) = document.as_object_mut() {
            fields.insert(String::from("type"), Value::from(ITEM_TYPE));
        }
        Ok(document)
    }
}

/// Builds new items and loads stored ones against the active metric set.
#[derive(Debug, Clone, Default)]
pub struct ItemFactory {
    registry: MetricRegistry,
}

impl ItemFactory {
    pub fn new(registry: MetricRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// A fresh item with an empty snapshot for every configured metric.
    pub fn make(&self) -> Item {
        let now = now_epoch();
        Item {
            id: Uuid::new_v4().simple().to_string(),
            aliases: Aliases::new(),
            metrics: self
                .registry
                .metric_names()
                .map(|name| (name.to_owned(), MetricSnapshot::default()))
                .collect(),
            biblio: Map::new(),
            created: now,
            last_modified: now,
            last_requested: now,
        }
    }

    /// Load a stored item, backfilling configured metrics and refreshing
    /// their static metadata. A missing id is `StoreError::NotFound`.
    pub fn get(&self, store: &dyn DocumentStore, id: &str) -> Result<Item, CoreError> {
        let stored = store.get(id)?.ok_or_else(|| StoreError::not_found(id))?;
        let mut item: Item = serde_json::from_value(without_type(stored.body))?;
        item.id = stored.id;
        item.last_requested = now_epoch();

        for (name, definition) in self.registry.iter() {
            let snapshot = item.metrics.entry(name.to_owned()).or_default();
            snapshot.static_meta = Some(definition.static_meta_for(&item.aliases));
        }
        Ok(item)
    }
}

fn without_type(mut body: Value) -> Value {
    if let Some(fields) = body.as_object_mut() {
        fields.remove("type");
    }
    body
}
