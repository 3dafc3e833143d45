use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::timestamp::now_epoch;

/// A `(namespace, identifier)` pair naming an artifact in one external system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Alias {
    pub namespace: String,
    pub id: String,
}

impl Alias {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl Display for Alias {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

const CREATED: &str = "created";
const LAST_MODIFIED: &str = "last_modified";
const LAST_COMPLETED: &str = "last_completed";

/// Names that hold bookkeeping timestamps and can never be namespaces.
pub const RESERVED_KEYS: [&str; 3] = [CREATED, LAST_MODIFIED, LAST_COMPLETED];

/// Every identifier known for one artifact, grouped by namespace.
///
/// Namespaces are open-ended; each maps to an ordered list of ids, never a
/// bare scalar. Serialized as a flat object: one key per namespace plus the
/// bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Aliases {
    namespaces: BTreeMap<String, Vec<String>>,
    pub created: f64,
    pub last_modified: f64,
    /// Set once alias resolution for the item has finished.
    pub last_completed: Option<f64>,
}

impl Default for Aliases {
    fn default() -> Self {
        Self::new()
    }
}

impl Aliases {
    pub fn new() -> Self {
        let now = now_epoch();
        Self {
            namespaces: BTreeMap::new(),
            created: now,
            last_modified: now,
            last_completed: None,
        }
    }

    /// Append `id` to `namespace`, creating the namespace if needed.
    pub fn add_alias(&mut self, namespace: &str, id: impl Into<String>) {
        if RESERVED_KEYS.contains(&namespace) {
            warn!(namespace, "ignoring alias in reserved namespace");
            return;
        }
        self.namespaces
            .entry(namespace.to_owned())
            .or_default()
            .push(id.into());
        self.last_modified = now_epoch();
    }

    /// Add every alias whose id is not already present in its namespace.
    pub fn add_unique<'a>(&mut self, aliases: impl IntoIterator<Item = &'a Alias>) {
        for alias in aliases {
            if !self.contains(alias) {
                self.add_alias(&alias.namespace, alias.id.clone());
            }
        }
        self.last_modified = now_epoch();
    }

    pub fn contains(&self, alias: &Alias) -> bool {
        self.get(&alias.namespace).contains(&alias.id)
    }

    /// Ids in one namespace; empty when the namespace is unknown.
    pub fn get(&self, namespace: &str) -> &[String] {
        self.namespaces
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `(namespace, id)` pairs for the given namespaces, or for all of them.
    pub fn get_aliases_list(&self, namespaces: Option<&[&str]>) -> Vec<Alias> {
        let selected: Vec<&str> = match namespaces {
            Some(namespaces) => namespaces.to_vec(),
            None => self.namespaces().collect(),
        };

        selected
            .into_iter()
            .flat_map(|namespace| {
                self.get(namespace)
                    .iter()
                    .map(move |id| Alias::new(namespace, id.clone()))
            })
            .collect()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(Vec::is_empty)
    }

    /// Drop every namespace.
    pub fn clear_aliases(&mut self) {
        self.namespaces.clear();
        self.last_modified = now_epoch();
    }

    pub fn mark_completed(&mut self) {
        self.last_completed = Some(now_epoch());
    }
}

impl Serialize for Aliases {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.namespaces.len() + 3))?;
        for (namespace, ids) in &self.namespaces {
            map.serialize_entry(namespace, ids)?;
        }
        map.serialize_entry(CREATED, &self.created)?;
        map.serialize_entry(LAST_MODIFIED, &self.last_modified)?;
        map.serialize_entry(LAST_COMPLETED, &self.last_completed)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Aliases {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut aliases = Aliases {
            namespaces: BTreeMap::new(),
            created: 0.0,
            last_modified: 0.0,
            last_completed: None,
        };
        let mut created = None;
        let mut last_modified = None;

        for (key, value) in raw {
            match key.as_str() {
                CREATED => created = value.as_f64(),
                LAST_MODIFIED => last_modified = value.as_f64(),
                LAST_COMPLETED => aliases.last_completed = value.as_f64(),
                _ => {
                    let ids = ids_from_value(value)
                        .map_err(|kind| D::Error::custom(format!("alias namespace '{key}': {kind}")))?;
                    if !ids.is_empty() {
                        aliases.namespaces.insert(key, ids);
                    }
                }
            }
        }

        aliases.created = created.unwrap_or_else(now_epoch);
        aliases.last_modified = last_modified.unwrap_or(aliases.created);
        Ok(aliases)
    }
}

/// Normalise a stored namespace value into a list of ids.
fn ids_from_value(value: Value) -> Result<Vec<String>, &'static str> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(scalar_id).collect(),
        scalar => Ok(vec![scalar_id(scalar)?]),
    }
}

fn scalar_id(value: Value) -> Result<String, &'static str> {
    match value {
        Value::String(id) => Ok(id),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err("ids must be strings or numbers"),
    }
}
