//! OTLP/JSON over HTTP exporter for agent execution traces.
//!
//! Agent runtimes describe their work as traces and spans: model
//! generations, tool calls, agent invocations, and custom payloads. This
//! crate maps those records onto OpenTelemetry spans annotated with the
//! `gen_ai.*` semantic conventions and delivers them to an OTLP collector,
//! retrying transient failures with capped exponential backoff.
//!
//! ```no_run
//! use agents_tracing_otlp::{Config, TraceProvider, set_default_otlp_http_exporter};
//!
//! # async fn run() -> agents_tracing_otlp::Result<()> {
//! let config = Config::load()?;
//! let provider = TraceProvider::new();
//! let processor = set_default_otlp_http_exporter(&provider, config.exporter)?;
//! // ... feed trace and span events through `provider` ...
//! provider.shutdown().await;
//! # drop(processor);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod exporter;
pub mod mapping;
pub mod otlp;
pub mod processor;
pub mod provider;
pub mod span;

pub use config::{BatchConfig, Compression, Config, ConfigBuilder, ExporterConfig};
pub use error::{ConfigError, Result};
pub use exporter::{ExportError, ExportOutcome, OtlpHttpExporter};
pub use mapping::{to_otlp_span, to_otlp_spans};
pub use otlp::{AnyValue, ExportTraceRequest, KeyValue, OtlpSpan, Status, StatusCode};
pub use processor::{BatchTraceProcessor, TraceProcessor, TracingExporter};
pub use provider::{TraceProvider, install_otlp_http_exporter, set_default_otlp_http_exporter};
pub use span::{
    AgentSpanData, FunctionSpanData, GenerationSpanData, ModelConfig, SpanData, SpanError,
    SpanRecord, TraceItem, TraceRecord, Usage,
};
