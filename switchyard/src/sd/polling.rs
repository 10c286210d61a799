use std::{future::Future, sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use tokio::{sync::watch, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::Error;

use super::{Event, Instance, Publisher};

/// Resolves the current instance set, e.g. from DNS or a registry.
pub trait Lookup: Send + Sync + 'static {
    fn lookup(&self) -> BoxFuture<'static, Result<Vec<Instance>, Error>>;
}

impl<F, Fut> Lookup for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Instance>, Error>> + Send + 'static,
{
    fn lookup(&self) -> BoxFuture<'static, Result<Vec<Instance>, Error>> {
        self().boxed()
    }
}

/// Publishes the result of a [`Lookup`] run every period.
///
/// Only changes are published. A failed lookup is published as an error
/// event. Polling stops on [`Publisher::stop`] or when this is dropped.
#[derive(Debug)]
pub struct PollingPublisher {
    sender: Arc<watch::Sender<Event>>,
    shutdown: CancellationToken,
}

impl PollingPublisher {
    /// Start polling. Must be called within a tokio runtime.
    pub fn new(lookup: impl Lookup, period: Duration) -> Self {
        let (sender, _) = watch::channel(Event::default());
        let sender = Arc::new(sender);
        let shutdown = CancellationToken::new();
        tokio::spawn(poll_forever(
            lookup,
            period,
            sender.clone(),
            shutdown.clone(),
        ));
        Self { sender, shutdown }
    }
}

impl Publisher for PollingPublisher {
    fn subscribe(&self) -> watch::Receiver<Event> {
        self.sender.subscribe()
    }

    fn stop(&self) {
        self.shutdown.cancel()
    }
}

impl Drop for PollingPublisher {
    fn drop(&mut self) {
        self.shutdown.cancel()
    }
}

fn same(current: &Event, next: &Event) -> bool {
    match (&current.error, &next.error) {
        (None, None) => current.instances == next.instances,
        (Some(current), Some(next)) => current.to_string() == next.to_string(),
        _ => false,
    }
}

async fn poll_forever(
    lookup: impl Lookup,
    period: Duration,
    sender: Arc<watch::Sender<Event>>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => (),
        }
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = lookup.lookup() => match result {
                Ok(mut instances) => {
                    instances.sort();
                    instances.dedup();
                    Event { instances, error: None }
                }
                Err(e) => {
                    log::warn!("instance lookup failed: {e}");
                    Event::error(e)
                }
            },
        };
        sender.send_if_modified(|current| {
            if same(current, &event) {
                false
            } else {
                log::debug!("publishing {} instances", event.instances.len());
                *current = event;
                true
            }
        });
    }
    log::debug!("stopped polling for instances");
}
