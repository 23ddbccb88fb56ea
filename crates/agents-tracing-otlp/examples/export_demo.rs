//! Sends one small agent trace to an OTLP/HTTP collector.
//!
//! ```text
//! cargo run --example export_demo -- [config.toml]
//! ```
//!
//! The endpoint defaults to `http://localhost:4318/v1/traces` and can be
//! changed with `OTEL_EXPORTER_OTLP_ENDPOINT` or the TOML file.

use agents_tracing_otlp::{
    AgentSpanData, Config, FunctionSpanData, GenerationSpanData, SpanData, SpanRecord,
    TraceProvider, TraceRecord, Usage, install_otlp_http_exporter,
};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("failed to initialise tracing subscriber")?;

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from_path(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => Config::load().context("failed to load configuration")?,
    };
    tracing::debug!(?config, "Configuration loaded");

    let provider = TraceProvider::new();
    install_otlp_http_exporter(&provider, config.exporter, config.batch)
        .context("failed to install exporter")?;

    let trace = TraceRecord::new("trace_demo");
    provider.on_trace_start(&trace).await;

    let agent = span(
        "span_agent",
        None,
        SpanData::Agent(AgentSpanData {
            name: Some("Triage".to_string()),
            output_type: Some("str".to_string()),
        }),
    );
    provider.on_span_start(&agent).await;

    let generation = span(
        "span_generation",
        Some("span_agent"),
        SpanData::Generation(GenerationSpanData {
            model: Some("gpt-4o".to_string()),
            usage: Some(Usage {
                input_tokens: Some(412.0),
                output_tokens: Some(38.0),
            }),
            ..Default::default()
        }),
    );
    provider.on_span_end(&generation).await;

    let tool = span(
        "span_tool",
        Some("span_agent"),
        SpanData::Function(FunctionSpanData {
            name: Some("lookup_order".to_string()),
            call_id: Some("call_1".to_string()),
            description: None,
        }),
    )
    .with_error("order not found");
    provider.on_span_end(&tool).await;

    provider.on_span_end(&agent).await;
    provider.on_trace_end(&trace).await;

    provider.shutdown().await;
    tracing::info!("Demo trace exported");

    Ok(())
}

fn span(id: &str, parent: Option<&str>, data: SpanData) -> SpanRecord {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let span = SpanRecord::new(id, "trace_demo", data).with_times(now.clone(), now);
    match parent {
        Some(parent) => span.with_parent(parent),
        None => span,
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,agents_tracing_otlp=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).without_time())
        .with(filter)
        .try_init()
        .context("failed to initialise tracing registry")?;

    Ok(())
}
