//! Integration tests for the OTLP exporter against a scripted collector.

mod common;

use agents_tracing_otlp::{
    Compression, ExportOutcome, OtlpHttpExporter, TraceItem, TraceRecord,
};
use common::{MockCollector, fast_config, generation_span, tool_span, unreachable_endpoint};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn batch() -> Vec<TraceItem> {
    vec![
        TraceRecord::new("trace_1").into(),
        generation_span("span_gen"),
        tool_span("span_tool", "span_gen"),
    ]
}

#[tokio::test]
async fn test_export_delivered_on_first_attempt() {
    let collector = MockCollector::start([200]).await;
    let exporter = OtlpHttpExporter::new(fast_config(collector.endpoint())).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Delivered);
    assert_eq!(collector.request_count(), 1);

    let request = &collector.requests()[0];
    assert_eq!(request.header("content-type"), Some("application/json"));

    let spans = request.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0]["spanId"], "span_gen");
    assert_eq!(spans[0]["traceId"], "trace_1");
    assert_eq!(spans[0]["name"], "generate_content gpt-4o");
    assert_eq!(spans[0]["startTimeUnixNano"], 1_714_557_600_000_000_000u64);
    assert_eq!(spans[0]["endTimeUnixNano"], 1_714_557_601_500_000_000u64);
    assert_eq!(spans[0]["status"]["code"], 1);
    assert_eq!(spans[1]["parentSpanId"], "span_gen");
    assert_eq!(spans[1]["name"], "execute_tool search");
}

#[tokio::test]
async fn test_export_retries_server_error_then_delivers() {
    let collector = MockCollector::start([500, 200]).await;
    let config = fast_config(collector.endpoint());
    let base_delay = config.base_delay;
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Delivered);
    assert_eq!(collector.request_count(), 2);
    assert!(collector.gaps()[0] >= base_delay);
}

#[tokio::test]
async fn test_export_client_error_not_retried() {
    let collector = MockCollector::start([400]).await;
    let exporter = OtlpHttpExporter::new(fast_config(collector.endpoint())).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Rejected);
    assert_eq!(collector.request_count(), 1);
}

#[tokio::test]
async fn test_export_client_error_after_server_error_stops() {
    let collector = MockCollector::start([503, 404, 200]).await;
    let exporter = OtlpHttpExporter::new(fast_config(collector.endpoint())).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Rejected);
    assert_eq!(collector.request_count(), 2);
}

#[tokio::test]
async fn test_export_exhausts_after_max_retries() {
    let collector = MockCollector::start([500, 502, 503, 200]).await;
    let exporter = OtlpHttpExporter::new(fast_config(collector.endpoint())).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Exhausted);
    assert_eq!(collector.request_count(), 3);
}

#[tokio::test]
async fn test_export_backoff_doubles_up_to_cap() {
    let collector = MockCollector::start([500, 500, 500, 500]).await;
    let mut config = fast_config(collector.endpoint());
    config.max_retries = 4;
    config.base_delay = Duration::from_millis(40);
    config.max_delay = Duration::from_millis(100);
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Exhausted);
    let gaps = collector.gaps();
    assert_eq!(gaps.len(), 3);
    assert!(gaps[0] >= Duration::from_millis(40));
    assert!(gaps[1] >= Duration::from_millis(80));
    assert!(gaps[2] >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_export_zero_retries_sends_nothing() {
    let collector = MockCollector::start([]).await;
    let mut config = fast_config(collector.endpoint());
    config.max_retries = 0;
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Exhausted);
    assert_eq!(collector.request_count(), 0);
}

#[tokio::test]
async fn test_export_cancelled_during_backoff() {
    let collector = MockCollector::start([500, 500, 500]).await;
    let mut config = fast_config(collector.endpoint());
    config.base_delay = Duration::from_secs(30);
    config.max_delay = Duration::from_secs(30);
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = exporter.export(&batch(), &cancel).await;

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(collector.request_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_export_cancelled_while_request_in_flight() {
    let collector = MockCollector::start_stalling(Duration::from_secs(30)).await;
    let mut config = fast_config(collector.endpoint());
    config.timeout = Duration::from_secs(60);
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = exporter.export(&batch(), &cancel).await;

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(collector.request_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_export_sends_configured_headers_on_every_attempt() {
    let collector = MockCollector::start([500, 200]).await;
    let mut config = fast_config(collector.endpoint());
    config.headers = HashMap::from([
        ("authorization".to_string(), "Bearer secret".to_string()),
        ("x-tenant".to_string(), "acme".to_string()),
    ]);
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Delivered);
    let requests = collector.requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.header("authorization"), Some("Bearer secret"));
        assert_eq!(request.header("x-tenant"), Some("acme"));
        assert_eq!(request.header("content-type"), Some("application/json"));
    }
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn test_export_gzip_body_decodes_to_same_json() {
    let plain = MockCollector::start([200]).await;
    let gzipped = MockCollector::start([200]).await;

    let plain_exporter = OtlpHttpExporter::new(fast_config(plain.endpoint())).unwrap();
    let mut config = fast_config(gzipped.endpoint());
    config.compression = Compression::Gzip;
    let gzip_exporter = OtlpHttpExporter::new(config).unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(
        plain_exporter.export(&batch(), &cancel).await,
        ExportOutcome::Delivered
    );
    assert_eq!(
        gzip_exporter.export(&batch(), &cancel).await,
        ExportOutcome::Delivered
    );

    let gzip_request = &gzipped.requests()[0];
    assert_eq!(gzip_request.header("content-encoding"), Some("gzip"));
    assert_eq!(gzip_request.body, plain.requests()[0].body);
}

#[tokio::test]
async fn test_export_sends_resource_attributes() {
    let collector = MockCollector::start([200]).await;
    let mut config = fast_config(collector.endpoint());
    config.resource_attributes =
        HashMap::from([("service.name".to_string(), "triage-bot".to_string())]);
    let exporter = OtlpHttpExporter::new(config).unwrap();

    exporter.export(&batch(), &CancellationToken::new()).await;

    let body = &collector.requests()[0].body;
    let attributes = &body["resourceSpans"][0]["resource"]["attributes"];
    assert_eq!(attributes[0]["key"], "service.name");
    assert_eq!(attributes[0]["value"]["stringValue"], "triage-bot");
}

#[tokio::test]
async fn test_export_unreachable_endpoint_exhausts() {
    let mut config = fast_config(unreachable_endpoint().await);
    config.max_retries = 2;
    let exporter = OtlpHttpExporter::new(config).unwrap();

    let outcome = exporter.export(&batch(), &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Exhausted);
}

#[tokio::test]
async fn test_export_trace_only_batch_posts_empty_span_list() {
    let collector = MockCollector::start([200]).await;
    let exporter = OtlpHttpExporter::new(fast_config(collector.endpoint())).unwrap();
    let items: Vec<TraceItem> = vec![
        TraceRecord::new("trace_1").into(),
        TraceRecord::new("trace_2").into(),
    ];

    let outcome = exporter.export(&items, &CancellationToken::new()).await;

    assert_eq!(outcome, ExportOutcome::Delivered);
    let requests = collector.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].spans().is_empty());
    assert!(requests[0].body["resourceSpans"][0]["scopeSpans"][0]["spans"].is_array());
}

#[tokio::test]
async fn test_concurrent_exports_share_exporter() {
    let collector = MockCollector::start([500, 500]).await;
    let exporter = OtlpHttpExporter::new(fast_config(collector.endpoint())).unwrap();
    let cancel = CancellationToken::new();

    let (a, b) = (batch(), batch());

    let (first, second) = tokio::join!(exporter.export(&a, &cancel), exporter.export(&b, &cancel));

    assert_eq!(first, ExportOutcome::Delivered);
    assert_eq!(second, ExportOutcome::Delivered);
    assert_eq!(collector.request_count(), 4);
}
