//! Reference provider adapters.

mod github;
mod wikipedia;

pub use github::GithubProvider;
pub use wikipedia::WikipediaProvider;

use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::http_client::HttpResponse;
use crate::provider::error_for_status;

/// Decode a JSON response body. A 404 means the artifact is unknown
/// upstream and yields `None`; other non-2xx statuses are errors.
pub(crate) fn decode_json<T: DeserializeOwned>(
    provider: &str,
    response: &HttpResponse,
) -> Result<Option<T>, ProviderError> {
    if response.status == 404 {
        return Ok(None);
    }
    error_for_status(response)?;

    serde_json::from_str(&response.body).map(Some).map_err(|error| {
        ProviderError::content_malformed(format!("{provider} returned an unexpected payload: {error}"))
    })
}
