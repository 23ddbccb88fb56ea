//! Trace processing and batching.
//!
//! [`TraceProcessor`] receives lifecycle events from the agent runtime.
//! [`BatchTraceProcessor`] buffers finished items in a bounded queue and
//! hands them to a [`TracingExporter`] in batches, either on a schedule or
//! early when the queue fills up.

use crate::config::BatchConfig;
use crate::span::{SpanRecord, TraceItem, TraceRecord};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sends batches of trace items to a backend.
#[async_trait]
pub trait TracingExporter: Send + Sync {
    /// Exports a batch. Failures are handled and logged by the exporter.
    async fn export(&self, items: Vec<TraceItem>, cancel: &CancellationToken);
}

/// Receives trace and span lifecycle events.
#[async_trait]
pub trait TraceProcessor: Send + Sync {
    /// Called when a trace starts.
    async fn on_trace_start(&self, trace: &TraceRecord);
    /// Called when a trace ends.
    async fn on_trace_end(&self, trace: &TraceRecord);
    /// Called when a span starts.
    async fn on_span_start(&self, span: &SpanRecord);
    /// Called when a span ends.
    async fn on_span_end(&self, span: &SpanRecord);
    /// Exports everything buffered so far.
    async fn force_flush(&self);
    /// Stops background work and flushes what remains.
    async fn shutdown(&self);
}

/// Bounded FIFO of items awaiting export.
struct TraceQueue {
    items: VecDeque<TraceItem>,
    max_queue_size: usize,
    max_batch_size: usize,
    dropped_count: u64,
}

impl TraceQueue {
    fn new(config: &BatchConfig) -> Self {
        Self {
            items: VecDeque::new(),
            max_queue_size: config.max_queue_size,
            max_batch_size: config.max_batch_size.max(1),
            dropped_count: 0,
        }
    }

    /// Returns false if the queue was full and the item was dropped.
    fn push(&mut self, item: TraceItem) -> bool {
        if self.items.len() >= self.max_queue_size {
            self.dropped_count += 1;
            return false;
        }
        self.items.push_back(item);
        true
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get_batch(&mut self) -> Vec<TraceItem> {
        let take = self.items.len().min(self.max_batch_size);
        self.items.drain(..take).collect()
    }

    fn drain_all(&mut self) -> Vec<TraceItem> {
        self.items.drain(..).collect()
    }
}

struct Shared {
    exporter: Arc<dyn TracingExporter>,
    queue: Mutex<TraceQueue>,
    notify: Notify,
    cancel: CancellationToken,
    config: BatchConfig,
    trigger_size: usize,
}

impl Shared {
    async fn enqueue(&self, item: TraceItem) {
        if self.cancel.is_cancelled() {
            tracing::debug!("Processor shut down, ignoring trace item");
            return;
        }

        let (accepted, len, dropped) = {
            let mut queue = self.queue.lock().await;
            let accepted = queue.push(item);
            (accepted, queue.len(), queue.dropped_count)
        };

        if !accepted {
            tracing::warn!(
                max_queue_size = self.config.max_queue_size,
                dropped = dropped,
                "Trace queue full, dropping item"
            );
            return;
        }

        if len >= self.trigger_size {
            self.notify.notify_one();
        }
    }

    /// Exports at most one batch. Returns the number of items exported.
    async fn export_batch(&self) -> usize {
        let batch = self.queue.lock().await.get_batch();
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        tracing::debug!(items = count, "Exporting trace batch");
        self.exporter.export(batch, &self.cancel.child_token()).await;
        count
    }

    async fn flush(&self) {
        let items = self.queue.lock().await.drain_all();
        if items.is_empty() {
            return;
        }

        tracing::debug!(items = items.len(), "Flushing trace queue");
        let batch_size = self.config.max_batch_size.max(1);
        let cancel = CancellationToken::new();
        for chunk in items.chunks(batch_size) {
            self.exporter.export(chunk.to_vec(), &cancel).await;
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.config.schedule_delay) => {}
            }

            // Keep draining while the queue stays above the trigger.
            loop {
                if self.export_batch().await == 0 || self.cancel.is_cancelled() {
                    break;
                }
                if self.queue.lock().await.len() < self.trigger_size {
                    break;
                }
            }
        }

        tracing::debug!("Batch trace processor worker stopped");
    }
}

/// Processor that batches finished traces and spans for export.
///
/// Trace starts and span ends are queued; the other events are ignored.
/// Call [`start`](Self::start) to run the background export loop, and
/// [`shutdown`](TraceProcessor::shutdown) to stop it.
pub struct BatchTraceProcessor {
    shared: Arc<Shared>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl BatchTraceProcessor {
    /// Creates a processor exporting through `exporter`.
    ///
    /// The background worker is not running until [`start`](Self::start).
    pub fn new(exporter: Arc<dyn TracingExporter>, config: BatchConfig) -> Self {
        let trigger_size = config.export_trigger_size();
        Self {
            shared: Arc::new(Shared {
                exporter,
                queue: Mutex::new(TraceQueue::new(&config)),
                notify: Notify::new(),
                cancel: CancellationToken::new(),
                config,
                trigger_size,
            }),
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Creates a processor with default batching.
    pub fn with_defaults(exporter: Arc<dyn TracingExporter>) -> Self {
        Self::new(exporter, BatchConfig::default())
    }

    /// Spawns the background export loop on the current tokio runtime.
    ///
    /// Calling it again while the worker runs has no effect.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.shared.cancel.is_cancelled() {
            return;
        }
        *worker = Some(tokio::spawn(Arc::clone(&self.shared).run()));
    }

    /// Returns whether the background worker has been started.
    pub fn is_started(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Returns the number of items waiting for export.
    pub async fn queued(&self) -> usize {
        self.shared.queue.lock().await.len()
    }

    /// Returns the number of items dropped because the queue was full.
    pub async fn dropped_count(&self) -> u64 {
        self.shared.queue.lock().await.dropped_count
    }
}

#[async_trait]
impl TraceProcessor for BatchTraceProcessor {
    async fn on_trace_start(&self, trace: &TraceRecord) {
        self.shared.enqueue(TraceItem::Trace(trace.clone())).await;
    }

    async fn on_trace_end(&self, _trace: &TraceRecord) {}

    async fn on_span_start(&self, _span: &SpanRecord) {}

    async fn on_span_end(&self, span: &SpanRecord) {
        self.shared.enqueue(TraceItem::Span(span.clone())).await;
    }

    async fn force_flush(&self) {
        self.shared.flush().await;
    }

    async fn shutdown(&self) {
        self.shared.cancel.cancel();

        let worker = self.worker.lock().take();
        if let Some(handle) = worker
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Batch trace processor worker failed");
        }

        self.shared.flush().await;
    }
}

impl Drop for BatchTraceProcessor {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
