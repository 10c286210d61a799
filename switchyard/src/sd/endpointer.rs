use std::sync::Arc;

use tokio_stream::{wrappers::WatchStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{BoxEndpoint, Error};

use super::{EndpointCache, EndpointerOptions, Endpoints, Event, Factory, Publisher};

/// A source of the endpoints a balancer chooses from.
pub trait Endpointer<Req, Resp>: Send + Sync {
    fn endpoints(&self) -> Result<Endpoints<Req, Resp>, Error>;
}

impl<Req, Resp, E> Endpointer<Req, Resp> for Arc<E>
where
    E: Endpointer<Req, Resp> + ?Sized,
{
    fn endpoints(&self) -> Result<Endpoints<Req, Resp>, Error> {
        (**self).endpoints()
    }
}

/// Always the same endpoints.
pub struct FixedEndpointer<Req, Resp> {
    endpoints: Endpoints<Req, Resp>,
}

impl<Req, Resp> FixedEndpointer<Req, Resp> {
    pub fn new(endpoints: impl IntoIterator<Item = BoxEndpoint<Req, Resp>>) -> Self {
        Self {
            endpoints: Arc::new(endpoints.into_iter().collect()),
        }
    }
}

impl<Req, Resp> Endpointer<Req, Resp> for FixedEndpointer<Req, Resp> {
    fn endpoints(&self) -> Result<Endpoints<Req, Resp>, Error> {
        Ok(self.endpoints.clone())
    }
}

/// Follows a [`Publisher`], keeping an [`EndpointCache`] in step with it.
///
/// Events are applied by a background task until [`DefaultEndpointer::close`]
/// or drop, which also closes every endpoint.
pub struct DefaultEndpointer<Req, Resp> {
    cache: Arc<EndpointCache<Req, Resp>>,
    shutdown: CancellationToken,
}

impl<Req, Resp> DefaultEndpointer<Req, Resp>
where
    Req: 'static,
    Resp: 'static,
{
    /// Apply the publisher's current snapshot, then follow it.
    /// Must be called within a tokio runtime.
    pub fn new(
        publisher: &dyn Publisher,
        factory: impl Factory<Req, Resp> + 'static,
        options: EndpointerOptions,
    ) -> Self {
        let cache = Arc::new(EndpointCache::new(factory, options));
        let mut subscription = publisher.subscribe();
        let current = subscription.borrow_and_update().clone();
        cache.update(current);

        let shutdown = CancellationToken::new();
        tokio::spawn(apply_forever(
            cache.clone(),
            WatchStream::from_changes(subscription),
            shutdown.clone(),
        ));
        Self { cache, shutdown }
    }
}

impl<Req, Resp> DefaultEndpointer<Req, Resp> {
    /// Stop following the publisher and close every endpoint.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.cache.close();
    }
}

impl<Req, Resp> Drop for DefaultEndpointer<Req, Resp> {
    fn drop(&mut self) {
        self.close()
    }
}

impl<Req, Resp> Endpointer<Req, Resp> for DefaultEndpointer<Req, Resp> {
    fn endpoints(&self) -> Result<Endpoints<Req, Resp>, Error> {
        self.cache.endpoints()
    }
}

async fn apply_forever<Req, Resp>(
    cache: Arc<EndpointCache<Req, Resp>>,
    mut events: WatchStream<Event>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };
        match event {
            Some(event) => cache.update(event),
            None => {
                log::info!("publisher went away, keeping the last endpoints");
                break;
            }
        }
    }
}
