use std::time::Duration;

use clock_proto::{FetchFailure, RemoteReading};
use reqwest::{Client, Url};
use tracing::{debug, instrument};

use super::config::RemoteConfig;

/// HTTP client for the remote time endpoint
#[derive(Debug, Clone)]
pub struct RemoteSource {
    client: Client,
    url: Url,
    timeout: Duration,
    cache_bust: bool,
}

impl RemoteSource {
    pub fn new(config: &RemoteConfig) -> Result<Self, FetchFailure> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchFailure::Unreachable(e.to_string()))?;

        Ok(RemoteSource {
            client,
            url: config.url.clone(),
            timeout: config.timeout(),
            cache_bust: config.cache_bust,
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        if self.cache_bust {
            url.query_pairs_mut()
                .append_pair("t", &chrono::Utc::now().timestamp_millis().to_string());
        }
        url
    }

    /// Fetch one reading. Every way the request can go wrong is mapped onto a
    /// [`FetchFailure`], the caller then falls back to local time.
    #[instrument(level = "trace", skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<RemoteReading, FetchFailure> {
        let response = self
            .client
            .get(self.request_url())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let reading: RemoteReading = serde_json::from_slice(&body)
            .map_err(|e| FetchFailure::Malformed(e.to_string()))?;

        debug!(?reading, "remote reading received");
        Ok(reading)
    }

    fn classify(&self, error: reqwest::Error) -> FetchFailure {
        if error.is_timeout() {
            debug!(timeout = ?self.timeout, "remote request timed out");
            FetchFailure::Timeout
        } else if error.is_decode() || error.is_body() {
            FetchFailure::Malformed(error.to_string())
        } else {
            FetchFailure::Unreachable(error.to_string())
        }
    }
}
