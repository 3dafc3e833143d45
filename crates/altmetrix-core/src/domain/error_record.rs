use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::persistence::Saveable;
use crate::timestamp::now_epoch;

pub const ERROR_TYPE: &str = "error";

/// A provider failure captured for later inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    /// Stable error code, e.g. `provider.timeout`.
    pub error_type: String,
    pub message: String,
    pub provider: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub trace: String,
    pub created: f64,
}

impl ErrorRecord {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        provider: impl Into<String>,
        item_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            error_type: error_type.into(),
            message: message.into(),
            provider: provider.into(),
            item_id: item_id.map(str::to_owned),
            trace: String::new(),
            created: now_epoch(),
        }
    }

    pub fn from_provider_error(provider: &str, item_id: Option<&str>, error: &ProviderError) -> Self {
        Self {
            trace: format!("{error:?}"),
            ..Self::new(error.code(), error.message(), provider, item_id)
        }
    }
}

impl Saveable for ErrorRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut document = serde_json::to_value(self)?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert(String::from("type"), Value::from(ERROR_TYPE));
        }
        Ok(document)
    }
}
