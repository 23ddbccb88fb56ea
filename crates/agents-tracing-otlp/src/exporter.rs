//! OTLP/JSON over HTTP exporter with bounded retry.
//!
//! A batch is mapped, serialised once, and POSTed to the collector. Server
//! errors and transport failures are retried with exponential backoff and
//! jitter; client errors are dropped immediately. Every network wait races
//! the caller's cancellation token.

use crate::config::{Compression, ExporterConfig};
use crate::mapping;
use crate::otlp::{ExportTraceRequest, KeyValue, Resource};
use crate::processor::TracingExporter;
use crate::span::TraceItem;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const JITTER_FACTOR: f64 = 0.1;

/// Outcome of one export call.
///
/// Informational only: the exporter has already logged it.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The collector accepted the batch.
    Delivered,
    /// The collector rejected the batch with a client error; not retried.
    Rejected,
    /// Every attempt failed with a transient error.
    Exhausted,
    /// The cancellation token fired before delivery.
    Cancelled,
}

/// Error during export.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// HTTP request failed.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned an error status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code returned by server.
        status: u16,
        /// Response body from server.
        body: String,
    },

    /// A configured header has an invalid name or value.
    #[error("invalid header: {name}")]
    InvalidHeader {
        /// Name of the offending header.
        name: String,
    },

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint: {endpoint}")]
    InvalidEndpoint {
        /// The configured endpoint.
        endpoint: String,
    },

    /// Encoding failed.
    #[error("failed to encode request")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExportError {
    pub(crate) fn encode<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Encode(Box::new(error))
    }

    pub(crate) fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

/// Classification of one failed attempt.
#[derive(Debug)]
enum AttemptError {
    /// Client error; retrying cannot help.
    Permanent(ExportError),
    /// Server or transport error; worth another attempt.
    Transient(ExportError),
    /// The token fired while the request was in flight.
    Cancelled,
}

/// OTLP/JSON exporter for agent traces.
pub struct OtlpHttpExporter {
    config: ExporterConfig,
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
    resource: Option<Resource>,
}

impl OtlpHttpExporter {
    /// Creates a new exporter with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a URL, a configured header
    /// is invalid, or the HTTP client cannot be created.
    pub fn new(config: ExporterConfig) -> Result<Self, ExportError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|_| ExportError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
        })?;
        let headers = build_headers(&config)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ExportError::Http)?;
        let resource = build_resource(&config);

        Ok(Self {
            config,
            client,
            endpoint,
            headers,
            resource,
        })
    }

    /// Creates a new exporter with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self, ExportError> {
        Self::new(ExporterConfig::default())
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Returns the exporter configuration.
    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Exports a batch of trace items.
    ///
    /// Trace records are ignored; only spans are sent. A batch without spans
    /// still posts an envelope with an empty span list. Never fails: the
    /// returned outcome has already been logged.
    pub async fn export(&self, items: &[TraceItem], cancel: &CancellationToken) -> ExportOutcome {
        let spans = mapping::to_otlp_spans(items);
        let span_count = spans.len();
        let request = ExportTraceRequest::from_spans(self.resource.clone(), spans);
        let body = match self.encode_request(&request) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, spans = span_count, "Failed to encode export request");
                return ExportOutcome::Rejected;
            }
        };

        self.deliver(body, span_count, cancel).await
    }

    async fn deliver(
        &self,
        body: Bytes,
        span_count: usize,
        cancel: &CancellationToken,
    ) -> ExportOutcome {
        let max_retries = self.config.max_retries;
        let mut attempts = 0;
        let mut delay = self.config.base_delay;

        while attempts < max_retries {
            match self.try_export(body.clone(), cancel).await {
                Ok(()) => {
                    tracing::debug!(
                        spans = span_count,
                        attempt = attempts + 1,
                        "Exported spans"
                    );
                    return ExportOutcome::Delivered;
                }
                Err(AttemptError::Permanent(e)) => {
                    tracing::error!(error = %e, spans = span_count, "Collector rejected export, not retrying");
                    return ExportOutcome::Rejected;
                }
                Err(AttemptError::Transient(e @ ExportError::Status { .. })) => {
                    tracing::warn!(
                        attempt = attempts + 1,
                        max_retries,
                        error = %e,
                        "Export attempt failed"
                    );
                }
                Err(AttemptError::Transient(e)) => {
                    tracing::error!(
                        attempt = attempts + 1,
                        max_retries,
                        error = %e,
                        "Export attempt failed"
                    );
                }
                Err(AttemptError::Cancelled) => {}
            }

            if cancel.is_cancelled() {
                tracing::warn!(attempt = attempts + 1, "Export cancelled");
                return ExportOutcome::Cancelled;
            }

            attempts += 1;
            if attempts < max_retries {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::warn!(attempt = attempts, "Export cancelled during backoff");
                        return ExportOutcome::Cancelled;
                    }
                    _ = tokio::time::sleep(jittered(delay)) => {}
                }
                delay = next_delay(delay, self.config.max_delay);
            }
        }

        tracing::error!(
            attempts,
            spans = span_count,
            "Export failed after all retries, dropping batch"
        );
        ExportOutcome::Exhausted
    }

    async fn try_export(&self, body: Bytes, cancel: &CancellationToken) -> Result<(), AttemptError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            result = self.send(body) => result,
        }
    }

    async fn send(&self, body: Bytes) -> Result<(), AttemptError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(ExportError::Http(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let err = ExportError::status(status.as_u16(), body);
        if status.is_client_error() {
            Err(AttemptError::Permanent(err))
        } else {
            Err(AttemptError::Transient(err))
        }
    }

    fn encode_request(&self, request: &ExportTraceRequest) -> Result<Bytes, ExportError> {
        let json = serde_json::to_vec(request).map_err(ExportError::encode)?;

        if self.config.compression == Compression::Gzip {
            use flate2::Compression as GzCompression;
            use flate2::write::GzEncoder;

            let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
            encoder.write_all(&json).map_err(ExportError::encode)?;
            encoder.finish().map(Bytes::from).map_err(ExportError::encode)
        } else {
            Ok(Bytes::from(json))
        }
    }
}

#[async_trait]
impl TracingExporter for OtlpHttpExporter {
    async fn export(&self, items: Vec<TraceItem>, cancel: &CancellationToken) {
        OtlpHttpExporter::export(self, &items, cancel).await;
    }
}

fn build_headers(config: &ExporterConfig) -> Result<HeaderMap, ExportError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in &config.headers {
        let invalid = || ExportError::InvalidHeader { name: name.clone() };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(header_name, header_value);
    }

    if config.compression == Compression::Gzip {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }

    Ok(headers)
}

fn build_resource(config: &ExporterConfig) -> Option<Resource> {
    if config.resource_attributes.is_empty() {
        return None;
    }

    let mut attributes: Vec<KeyValue> = config
        .resource_attributes
        .iter()
        .map(|(key, value)| KeyValue::new(key.as_str(), value.as_str()))
        .collect();
    attributes.sort_by(|a, b| a.key.cmp(&b.key));

    Some(Resource { attributes })
}

/// Adds up to ten percent of random jitter to a backoff delay.
fn jittered(delay: Duration) -> Duration {
    delay + delay.mul_f64(rand::random::<f64>() * JITTER_FACTOR)
}

fn next_delay(delay: Duration, max_delay: Duration) -> Duration {
    delay.saturating_mul(2).min(max_delay)
}
