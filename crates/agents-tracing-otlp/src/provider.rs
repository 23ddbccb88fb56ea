//! Trace provider owning the active processors.

use crate::config::{BatchConfig, ExporterConfig};
use crate::exporter::{ExportError, OtlpHttpExporter};
use crate::processor::{BatchTraceProcessor, TraceProcessor};
use crate::span::{SpanRecord, TraceRecord};
use parking_lot::RwLock;
use std::sync::Arc;

/// Fans lifecycle events out to a set of processors, in registration order.
#[derive(Default)]
pub struct TraceProvider {
    processors: RwLock<Vec<Arc<dyn TraceProcessor>>>,
}

impl TraceProvider {
    /// Creates a provider with no processors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every registered processor.
    pub fn set_processors(&self, processors: Vec<Arc<dyn TraceProcessor>>) {
        *self.processors.write() = processors;
    }

    /// Appends a processor.
    pub fn add_processor(&self, processor: Arc<dyn TraceProcessor>) {
        self.processors.write().push(processor);
    }

    /// Returns a snapshot of the registered processors.
    pub fn processors(&self) -> Vec<Arc<dyn TraceProcessor>> {
        self.processors.read().clone()
    }

    /// Forwards a trace start to every processor.
    pub async fn on_trace_start(&self, trace: &TraceRecord) {
        for processor in self.processors() {
            processor.on_trace_start(trace).await;
        }
    }

    /// Forwards a trace end to every processor.
    pub async fn on_trace_end(&self, trace: &TraceRecord) {
        for processor in self.processors() {
            processor.on_trace_end(trace).await;
        }
    }

    /// Forwards a span start to every processor.
    pub async fn on_span_start(&self, span: &SpanRecord) {
        for processor in self.processors() {
            processor.on_span_start(span).await;
        }
    }

    /// Forwards a span end to every processor.
    pub async fn on_span_end(&self, span: &SpanRecord) {
        for processor in self.processors() {
            processor.on_span_end(span).await;
        }
    }

    /// Flushes every processor.
    pub async fn force_flush(&self) {
        for processor in self.processors() {
            processor.force_flush().await;
        }
    }

    /// Shuts down every processor.
    pub async fn shutdown(&self) {
        for processor in self.processors() {
            processor.shutdown().await;
        }
    }
}

/// Installs an OTLP/HTTP exporter behind a started batch processor.
///
/// The processor becomes the provider's only processor and is returned so
/// the caller can flush or shut it down. Must be called from within a tokio
/// runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built from `config`.
pub fn set_default_otlp_http_exporter(
    provider: &TraceProvider,
    config: ExporterConfig,
) -> Result<Arc<BatchTraceProcessor>, ExportError> {
    install_otlp_http_exporter(provider, config, BatchConfig::default())
}

/// Like [`set_default_otlp_http_exporter`], with explicit batching.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built from `config`.
pub fn install_otlp_http_exporter(
    provider: &TraceProvider,
    config: ExporterConfig,
    batch: BatchConfig,
) -> Result<Arc<BatchTraceProcessor>, ExportError> {
    let exporter = Arc::new(OtlpHttpExporter::new(config)?);
    let processor = Arc::new(BatchTraceProcessor::new(exporter, batch));
    processor.start();

    tracing::debug!("Installed OTLP HTTP exporter");
    let installed: Arc<dyn TraceProcessor> = processor.clone();
    provider.set_processors(vec![installed]);
    Ok(processor)
}
