use std::time::Duration;

use relaydelay_config::Config;
use reqwest::header::CONTENT_TYPE;

use crate::{MetricsError, MetricsRegistry};

/// Content type of the Prometheus text exposition format.
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// An error pushing metrics to the push gateway.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The HTTP client could not be created.
    #[error("failed to create push gateway client")]
    Client(#[source] reqwest::Error),
    /// The registry could not be rendered.
    #[error("failed to encode metrics")]
    Encode(#[from] MetricsError),
    /// The request did not complete.
    #[error("failed to send metrics to the push gateway")]
    Send(#[source] reqwest::Error),
    /// The push gateway rejected the metrics.
    #[error("push gateway responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// Pushes the registry to a Prometheus push gateway.
///
/// Every push replaces all metrics in the group identified by the job name and the `instance`
/// grouping key, which is usually the hostname.
#[derive(Debug)]
pub struct PushClient {
    client: reqwest::Client,
    url: String,
}

impl PushClient {
    /// Creates a client for the gateway at `addr`.
    pub fn new(
        addr: &str,
        job: &str,
        instance: &str,
        timeout: Duration,
    ) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ExportError::Client)?;

        let url = format!(
            "{}/metrics/job/{job}/instance/{instance}",
            addr.trim_end_matches('/')
        );

        Ok(Self { client, url })
    }

    /// Creates a client from the `metrics.push_gateway` section of the configuration.
    pub fn from_config(config: &Config, instance: &str) -> Result<Self, ExportError> {
        let push_gateway = config.push_gateway();
        Self::new(
            &push_gateway.addr,
            &push_gateway.job,
            instance,
            config.push_timeout(),
        )
    }

    /// Returns the URL metrics are pushed to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends the current state of the registry.
    pub async fn push(&self, registry: &MetricsRegistry) -> Result<(), ExportError> {
        let body = registry.encode_text()?;

        let response = self
            .client
            .put(&self.url)
            .header(CONTENT_TYPE, TEXT_FORMAT)
            .body(body)
            .send()
            .await
            .map_err(ExportError::Send)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status));
        }

        relaydelay_log::trace!(url = %self.url, "pushed metrics");
        Ok(())
    }
}
