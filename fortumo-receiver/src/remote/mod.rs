//! Remote service configuration.
//!
//! The provider publishes each service's settings (countries, prices,
//! keywords) as an XML document. It is fetched once per call: no caching and
//! no retries.

pub mod xml;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

pub use xml::{ATTRIBUTE_KEY, TEXT_KEY};

/// Config fetch errors.
#[derive(Debug, Error)]
pub enum ConfigFetchError {
    #[error("no config URL configured")]
    NotConfigured,

    #[error("Statuscode {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid XML: {0}")]
    Xml(String),
}

/// Parsed service configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RemoteConfigDocument(Value);

impl RemoteConfigDocument {
    /// Parse an XML document.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigFetchError> {
        xml::parse(xml).map(Self).map_err(ConfigFetchError::Xml)
    }

    pub fn root(&self) -> &Value {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Attributes of the root element.
    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.0.get(ATTRIBUTE_KEY).and_then(Value::as_object)
    }
}

/// GET `url`, decode the body with `charset` and parse it.
///
/// `charset` applies when the response does not declare its own.
pub async fn fetch_config(
    client: &Client,
    url: &str,
    charset: &str,
) -> Result<RemoteConfigDocument, ConfigFetchError> {
    let response = client.get(url).send().await.map_err(|e| {
        warn!(url = %url, error = %e, "config_fetch_failed");
        ConfigFetchError::Transport(e)
    })?;

    let status = response.status();
    if status != StatusCode::OK {
        warn!(url = %url, status = status.as_u16(), "config_fetch_failed");
        return Err(ConfigFetchError::Status(status.as_u16()));
    }

    let body = response.text_with_charset(charset).await?;
    let document = RemoteConfigDocument::from_xml(&body).map_err(|e| {
        warn!(url = %url, error = %e, "config_parse_failed");
        e
    })?;

    info!(url = %url, body_length = body.len(), "config_fetched");

    Ok(document)
}
