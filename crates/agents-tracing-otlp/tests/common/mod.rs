//! Shared test utilities for agents-tracing-otlp integration tests.
//!
//! Provides a scripted OTLP/HTTP collector. Each request is answered with
//! the next status code from the script (200 once the script runs out) and
//! recorded with its headers, decoded JSON body and arrival time.

#![allow(dead_code)]

use agents_tracing_otlp::{
    ExporterConfig, FunctionSpanData, GenerationSpanData, SpanData, SpanRecord, TraceItem,
};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A request received by the mock collector.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: serde_json::Value,
    pub received_at: Instant,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn spans(&self) -> &[serde_json::Value] {
        self.body["resourceSpans"][0]["scopeSpans"][0]["spans"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

struct CollectorState {
    script: Mutex<VecDeque<u16>>,
    response_delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Scripted OTLP/HTTP collector bound to an ephemeral port.
pub struct MockCollector {
    addr: SocketAddr,
    state: Arc<CollectorState>,
    cancel: CancellationToken,
}

impl MockCollector {
    /// Starts a collector answering with `statuses` in order, then 200.
    pub async fn start(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::start_inner(statuses, None).await
    }

    /// Starts a collector that records each request, then stalls for
    /// `delay` before answering.
    pub async fn start_stalling(delay: Duration) -> Self {
        Self::start_inner([], Some(delay)).await
    }

    async fn start_inner(
        statuses: impl IntoIterator<Item = u16>,
        response_delay: Option<Duration>,
    ) -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind mock collector");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let state = Arc::new(CollectorState {
            script: Mutex::new(statuses.into_iter().collect()),
            response_delay,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/traces", post(handle_traces))
            .with_state(state.clone());

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
        });

        Self {
            addr,
            state,
            cancel,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/v1/traces", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    /// Gaps between consecutive request arrivals.
    pub fn gaps(&self) -> Vec<Duration> {
        self.requests()
            .windows(2)
            .map(|pair| pair[1].received_at.duration_since(pair[0].received_at))
            .collect()
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn handle_traces(
    State(state): State<Arc<CollectorState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let is_gzip = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let raw = if is_gzip {
        let mut decoded = Vec::new();
        GzDecoder::new(body.as_ref())
            .read_to_end(&mut decoded)
            .expect("Failed to gunzip request body");
        decoded
    } else {
        body.to_vec()
    };

    state.requests.lock().push(RecordedRequest {
        headers,
        body: serde_json::from_slice(&raw).unwrap_or(serde_json::Value::Null),
        received_at: Instant::now(),
    });

    if let Some(delay) = state.response_delay {
        tokio::time::sleep(delay).await;
    }

    let status = state.script.lock().pop_front().unwrap_or(200);
    (
        StatusCode::from_u16(status).expect("Invalid scripted status"),
        "scripted",
    )
}

/// Returns an endpoint nothing is listening on.
pub async fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read local addr");
    drop(listener);
    format!("http://{}/v1/traces", addr)
}

/// Exporter config pointing at `endpoint` with short, test-friendly delays.
pub fn fast_config(endpoint: String) -> ExporterConfig {
    ExporterConfig {
        endpoint,
        max_retries: 3,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

pub fn generation_span(id: &str) -> TraceItem {
    SpanRecord::new(
        id,
        "trace_1",
        SpanData::Generation(GenerationSpanData {
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        }),
    )
    .with_times("2024-05-01T10:00:00.000Z", "2024-05-01T10:00:01.500Z")
    .into()
}

pub fn tool_span(id: &str, parent: &str) -> TraceItem {
    SpanRecord::new(
        id,
        "trace_1",
        SpanData::Function(FunctionSpanData {
            name: Some("search".to_string()),
            call_id: Some("call_1".to_string()),
            ..Default::default()
        }),
    )
    .with_parent(parent)
    .into()
}
