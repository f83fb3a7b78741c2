use std::time::{Duration, Instant};

use async_trait::async_trait;
use joulebar_core::{MetricsPayload, Snapshot};
use reqwest::{Client, Url};

use crate::error::FetchError;
use crate::source::MeasurementSource;

/// Path of the metrics endpoint, relative to the server's base URL.
pub const METRICS_PATH: &str = "api/energy-metrics/v1";

/// Port the standalone measurement probe listens on.
pub const DEFAULT_PROBE_PORT: u16 = 35396;

/// A JSON endpoint serving energy snapshots.
#[derive(Debug, Clone)]
pub struct HttpSource {
    name: String,
    client: Client,
    url: Url,
}

impl HttpSource {
    pub fn new(name: impl Into<String>, url: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.into(),
            client,
            url,
        })
    }

    /// The server's metrics endpoint under `base`.
    pub fn metrics_endpoint(base: &Url, timeout: Duration) -> Result<Self, FetchError> {
        let url = base
            .join(METRICS_PATH)
            .map_err(|err| FetchError::InvalidUrl(format!("{base} + {METRICS_PATH}: {err}")))?;
        Self::new("internal", url, timeout)
    }

    /// The external probe on `localhost:port`.
    pub fn probe(port: u16, timeout: Duration) -> Result<Self, FetchError> {
        let raw = format!("http://localhost:{port}/");
        let url = Url::parse(&raw).map_err(|err| FetchError::InvalidUrl(format!("{raw}: {err}")))?;
        Self::new("external", url, timeout)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl MeasurementSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: self.url.to_string(),
            source,
        };

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.to_string(),
                status,
            });
        }
        let body = response.bytes().await.map_err(transport)?;
        let received = Instant::now();

        let payload = MetricsPayload::from_slice(&body).map_err(|source| FetchError::Malformed {
            url: self.url.to_string(),
            source,
        })?;
        let snapshot = payload.into_snapshot(received);
        tracing::trace!(source = %self.name, sources = snapshot.sources.len(), "snapshot received");
        Ok(snapshot)
    }
}
