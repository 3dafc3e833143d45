use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::aliases::Aliases;

/// Display metadata attached to a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMeta {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Computed per item; never part of configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_url: Option<String>,
}

/// One metric entry from a provider's `metrics` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    #[serde(default)]
    pub static_meta: StaticMeta,
    /// Template with at most one `<namespace>` token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_url: Option<String>,
}

impl MetricDefinition {
    /// Static metadata with the provenance URL resolved against `aliases`.
    pub fn static_meta_for(&self, aliases: &Aliases) -> StaticMeta {
        StaticMeta {
            provenance_url: self
                .provenance_url
                .as_deref()
                .and_then(|template| render_provenance_url(template, aliases)),
            ..self.static_meta.clone()
        }
    }
}

/// Replace a `<namespace>` token with the first alias in that namespace.
///
/// Templates without a token are returned verbatim; a token whose namespace
/// has no alias yields `None`.
pub fn render_provenance_url(template: &str, aliases: &Aliases) -> Option<String> {
    let Some(start) = template.find('<') else {
        return Some(template.to_owned());
    };
    let Some(length) = template[start + 1..].find('>') else {
        return Some(template.to_owned());
    };

    let namespace = &template[start + 1..start + 1 + length];
    let id = aliases.get(namespace).first()?;
    Some(format!(
        "{}{}{}",
        &template[..start],
        id,
        &template[start + length + 2..]
    ))
}

/// A single observed metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Display for MetricValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for MetricValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A value returned by a provider, optionally with a link to where it was
/// observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: MetricValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_url: Option<String>,
}

impl MetricReading {
    pub fn new(value: impl Into<MetricValue>) -> Self {
        Self {
            value: value.into(),
            provenance_url: None,
        }
    }

    pub fn with_provenance(value: impl Into<MetricValue>, provenance_url: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            provenance_url: Some(provenance_url.into()),
        }
    }
}

/// History of one metric on one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Timestamp key (see [`crate::timestamp::value_key`]) to value.
    #[serde(default)]
    pub values: BTreeMap<String, MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_meta: Option<StaticMeta>,
}

impl MetricSnapshot {
    /// Most recent value, by timestamp key.
    pub fn latest(&self) -> Option<&MetricValue> {
        self.values
            .iter()
            .max_by(|(left, _), (right, _)| {
                let left = left.parse::<f64>().unwrap_or(f64::MIN);
                let right = right.parse::<f64>().unwrap_or(f64::MIN);
                left.total_cmp(&right)
            })
            .map(|(_, value)| value)
    }
}
