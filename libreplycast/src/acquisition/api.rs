//! Primary structured-data API client
//!
//! One GET per attempt against the status endpoint, authenticated with the
//! rotating credential's bearer token. HTTP statuses map directly onto the
//! per-credential outcome taxonomy; body parsing failures are transient.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::{ConfigError, FetchError, Result};
use crate::types::Credential;

use super::{StatusFetcher, StatusPayload};

pub struct HttpStatusFetcher {
    client: reqwest::Client,
    api_base: String,
}

impl HttpStatusFetcher {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_base: network.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch_status(
        &self,
        credential: &Credential,
        item_id: &str,
    ) -> std::result::Result<StatusPayload, FetchError> {
        let url = format!("{}/2/statuses/{}", self.api_base, item_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.bearer)
            .query(&[("fields", "text,note")])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        match response.status().as_u16() {
            429 => Err(FetchError::RateLimited),
            401 => Err(FetchError::Unauthorized),
            403 => Err(FetchError::Forbidden),
            404 => Err(FetchError::NotFound),
            status if !(200..300).contains(&status) => Err(FetchError::Transient(format!(
                "unexpected status {}",
                status
            ))),
            _ => {
                let body: StatusResponse = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Transient(format!("malformed body: {}", e)))?;
                Ok(body.into_payload())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: Option<StatusData>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    note: Option<NoteData>,
}

#[derive(Debug, Deserialize)]
struct NoteData {
    #[serde(default)]
    text: Option<String>,
}

impl StatusResponse {
    // A present-but-empty data object becomes an empty payload, which the
    // engine records as "empty response" and rotates past.
    fn into_payload(self) -> StatusPayload {
        match self.data {
            None => StatusPayload::default(),
            Some(data) => StatusPayload {
                text: data.text.unwrap_or_default(),
                note_text: data.note.and_then(|n| n.text).filter(|t| !t.is_empty()),
            },
        }
    }
}
