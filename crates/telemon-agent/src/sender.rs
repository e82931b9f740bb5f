//! Delivery of single metrics to the server.
//!
//! [`Transport`] is one delivery attempt over the network; [`RetrySender`]
//! wraps any transport with the fixed retry policy the agent uses.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use std::io::Write;
use std::time::Duration;
use telemon_common::format_value;
use telemon_common::types::{MetricKind, MetricPayload};

/// Errors raised by a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport: request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport: server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport: failed to encode request body: {0}")]
    Encode(String),

    #[error("Transport: {0}")]
    Other(String),
}

/// Terminal failure for one metric after the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Sender: giving up on '{name}' after {attempts} attempts: {last}")]
    RetriesExhausted {
        name: String,
        attempts: u32,
        #[source]
        last: TransportError,
    },
}

/// How a metric is framed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Gzip-compressed JSON body posted to `/update/`.
    #[default]
    Json,
    /// Kind, name and value as path segments of `/update/{type}/{name}/{value}`.
    Path,
}

/// One delivery attempt of one metric.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, payload: &MetricPayload) -> Result<(), TransportError>;
}

/// Sends a metric to the server, retrying as configured.
#[async_trait]
pub trait MetricSender: Send + Sync {
    async fn send_metric(&self, kind: MetricKind, name: &str, value: f64) -> Result<(), SendError>;
}

/// Fixed retry budget: up to `attempts` tries with `delay` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(300),
        }
    }
}

pub struct RetrySender<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetrySender<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: Transport> MetricSender for RetrySender<T> {
    async fn send_metric(&self, kind: MetricKind, name: &str, value: f64) -> Result<(), SendError> {
        let payload = MetricPayload::new(kind, name, value);
        let attempts = self.policy.attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.transport.deliver(&payload).await {
                Ok(()) => {
                    tracing::debug!(metric = %name, kind = %kind, value, attempt, "Metric sent");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        metric = %name,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Metric delivery failed"
                    );
                    last_err = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(SendError::RetriesExhausted {
            name: name.to_string(),
            attempts,
            last: last_err
                .unwrap_or_else(|| TransportError::Other("no delivery attempted".to_string())),
        })
    }
}

/// HTTP delivery to a telemon server.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    format: WireFormat,
}

impl HttpTransport {
    pub fn new(
        base_url: impl AsRef<str>,
        format: WireFormat,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|e| TransportError::Other(format!("invalid server URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Other(format!(
                "server URL cannot carry a path: {base_url}"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            format,
        })
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    pub fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, payload: &MetricPayload) -> Result<reqwest::RequestBuilder, TransportError> {
        match self.format {
            WireFormat::Json => {
                let body = encode_json_body(payload)?;
                Ok(self
                    .client
                    .post(self.endpoint(["update", ""]))
                    .header(CONTENT_TYPE, "application/json")
                    .header(CONTENT_ENCODING, "gzip")
                    .body(body))
            }
            WireFormat::Path => {
                let amount = payload
                    .amount()
                    .map_err(|e| TransportError::Encode(e.to_string()))?;
                let value = format_value(amount);
                let url = self.endpoint(["update", payload.kind.as_str(), &payload.id, &value]);
                Ok(self.client.post(url))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, payload: &MetricPayload) -> Result<(), TransportError> {
        let resp = self.request(payload)?.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("[failed to read response body: {e}]"));
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Serializes `payload` as JSON and gzips it.
pub fn encode_json_body(payload: &MetricPayload) -> Result<Vec<u8>, TransportError> {
    let raw = serde_json::to_vec(payload).map_err(|e| TransportError::Encode(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| TransportError::Encode(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| TransportError::Encode(e.to_string()))
}
