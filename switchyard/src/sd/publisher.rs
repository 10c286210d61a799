use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::watch;

use crate::Error;

use super::Instance;

/// One snapshot from a [`Publisher`]: the full instance set, or an error.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub instances: Vec<Instance>,
    pub error: Option<Arc<Error>>,
}

impl Event {
    pub fn instances(instances: impl IntoIterator<Item = impl Into<Instance>>) -> Self {
        Self {
            instances: instances.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn error(error: Error) -> Self {
        Self {
            instances: Vec::new(),
            error: Some(Arc::new(error)),
        }
    }
}

/// A source of instance-set snapshots.
///
/// Subscribers see the latest snapshot; intermediate snapshots may be skipped.
pub trait Publisher: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Event>;

    /// Stop publishing. Idempotent.
    fn stop(&self);

    /// The latest snapshot.
    fn snapshot(&self) -> Event {
        self.subscribe().borrow().clone()
    }
}

/// Publishes one set of instances, forever.
#[derive(Debug)]
pub struct FixedPublisher {
    sender: watch::Sender<Event>,
}

impl FixedPublisher {
    pub fn new(instances: impl IntoIterator<Item = impl Into<Instance>>) -> Self {
        let (sender, _) = watch::channel(Event::instances(instances));
        Self { sender }
    }
}

impl Publisher for FixedPublisher {
    fn subscribe(&self) -> watch::Receiver<Event> {
        self.sender.subscribe()
    }

    fn stop(&self) {}
}

/// Publishes whatever it is told to. Useful for in-process registries and tests.
#[derive(Debug)]
pub struct ManualPublisher {
    sender: watch::Sender<Event>,
    stopped: AtomicBool,
}

impl Default for ManualPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualPublisher {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Event::default());
        Self {
            sender,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, event: Event) {
        if self.stopped.load(Ordering::Relaxed) {
            log::debug!("publisher is stopped, dropping event");
            return;
        }
        self.sender.send_replace(event);
    }

    pub fn publish_instances(&self, instances: impl IntoIterator<Item = impl Into<Instance>>) {
        self.publish(Event::instances(instances))
    }
}

impl Publisher for ManualPublisher {
    fn subscribe(&self) -> watch::Receiver<Event> {
        self.sender.subscribe()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}
