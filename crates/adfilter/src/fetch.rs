use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::EngineError;

/// Fetches playlist text. Seam for tests and alternative transports.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch_text(&self, url: &Url) -> Result<String, EngineError>;
}

/// reqwest-backed fetcher with a per-request timeout.
pub struct HttpManifestFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpManifestFetcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, EngineError> {
        debug!(url = %url, "fetching manifest");
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EngineError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| EngineError::fetch_failed(url.as_str(), format!("not valid UTF-8: {e}")))
    }
}
