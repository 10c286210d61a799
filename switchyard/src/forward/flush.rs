use std::{sync::Arc, time::Duration};

use bytes::BytesMut;
use futures::future::BoxFuture;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{Batch, Buffer, Format};

/// Where rendered batches go.
pub trait Writer: Send + Sync {
    fn write<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, std::io::Result<()>>;
}

/// Take a batch from `buffer` every `period` and write it. Each write is
/// attempted once; a failed batch is logged and dropped.
///
/// When `shutdown` is cancelled the buffer is stopped and its final batch is
/// written before this returns. Spawn this on your runtime.
pub async fn flush_forever(
    buffer: Arc<Buffer>,
    period: Duration,
    format: impl Format,
    writer: impl Writer,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => (),
        }
        let batch = buffer.get().await;
        flush(&batch, &format, &writer).await;
    }
    let batch = buffer.stop().await;
    flush(&batch, &format, &writer).await;
    log::info!("metrics flusher stopped");
}

async fn flush(batch: &Batch, format: &impl Format, writer: &impl Writer) {
    if batch.is_empty() {
        log::trace!("nothing to flush");
        return;
    }
    let mut bytes = BytesMut::new();
    format.format(batch, &mut bytes);
    match writer.write(&bytes).await {
        Ok(()) => log::debug!("flushed {} bytes of metrics", bytes.len()),
        Err(e) => log::error!("failed to flush metrics batch, dropping it: {e}"),
    }
}
