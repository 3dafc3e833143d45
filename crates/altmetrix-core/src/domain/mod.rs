//! Persisted entities: items, their aliases and metric history, collections,
//! and error records.

pub mod aliases;
pub mod collection;
pub mod error_record;
pub mod item;
pub mod metric;

pub use aliases::{Alias, Aliases};
pub use collection::{make_collection_id, Collection, CollectionFactory};
pub use error_record::ErrorRecord;
pub use item::{Item, ItemFactory};
pub use metric::{
    render_provenance_url, MetricDefinition, MetricReading, MetricSnapshot, MetricValue,
    StaticMeta,
};
