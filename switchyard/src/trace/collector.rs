use std::{pin::pin, sync::Arc, time::Duration};

use futures::{future::BoxFuture, StreamExt};
use futures_batch::ChunksTimeoutStreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::transport::BoxError;

use super::Span;

/// Accepts finished spans. Collection never fails the traced call: problems
/// are logged and the span is dropped.
pub trait Collector: Send + Sync {
    fn collect(&self, span: Span);
}

impl<C> Collector for Arc<C>
where
    C: Collector + ?Sized,
{
    fn collect(&self, span: Span) {
        (**self).collect(span)
    }
}

/// Drops every span.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopCollector;

impl Collector for NopCollector {
    fn collect(&self, _span: Span) {}
}

/// Logs every span and drops it.
pub struct LoggingCollector {
    log_level: log::Level,
}

impl Default for LoggingCollector {
    fn default() -> Self {
        Self {
            log_level: log::Level::Info,
        }
    }
}

impl LoggingCollector {
    pub fn log_level(mut self, log_level: log::Level) -> Self {
        self.log_level = log_level;
        self
    }
}

impl Collector for LoggingCollector {
    fn collect(&self, span: Span) {
        log::log!(self.log_level, "span: {span}")
    }
}

/// Queues spans for [`send_spans_forever`]. Spans are dropped while the queue is full.
#[derive(Debug, Clone)]
pub struct ChannelCollector {
    queue: mpsc::Sender<Span>,
}

impl ChannelCollector {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Span>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { queue: sender }, receiver)
    }
}

impl Collector for ChannelCollector {
    fn collect(&self, span: Span) {
        if let Err(e) = self.queue.try_send(span) {
            log::debug!("could not queue span: {e}");
        }
    }
}

/// Hands every span to each collector in turn.
#[derive(Clone, Default)]
pub struct MultiCollector {
    collectors: Vec<Arc<dyn Collector>>,
}

impl MultiCollector {
    pub fn new(collectors: impl IntoIterator<Item = Arc<dyn Collector>>) -> Self {
        Self {
            collectors: collectors.into_iter().collect(),
        }
    }
}

impl Collector for MultiCollector {
    fn collect(&self, span: Span) {
        if let Some((last, rest)) = self.collectors.split_last() {
            for collector in rest {
                collector.collect(span.clone());
            }
            last.collect(span);
        }
    }
}

/// Where batches of spans go: a tracing backend client, a file, a test.
pub trait SpanSink {
    fn send(&self, spans: Vec<Span>) -> BoxFuture<'_, Result<(), BoxError>>;
}

/// Spawn this on a tokio runtime to ship the spans a [`ChannelCollector`] queues.
///
/// Spans are sent in batches of up to `batch_size`, or whatever arrived within
/// `batch_timeout`. A failed batch is logged and dropped. Returns once every
/// collector feeding `receiver` is gone and the last batch is sent.
pub async fn send_spans_forever(
    receiver: mpsc::Receiver<Span>,
    batch_size: usize,
    batch_timeout: Duration,
    sink: impl SpanSink,
) {
    let mut batches = pin!(ReceiverStream::new(receiver).chunks_timeout(batch_size, batch_timeout));
    while let Some(batch) = batches.next().await {
        let count = batch.len();
        match sink.send(batch).await {
            Ok(()) => log::debug!("sent {count} spans"),
            Err(e) => log::error!("failed to send {count} spans: {e}"),
        }
    }
}
