//! Client-side load balancing.
//!
//! A [`Balancer`] picks one endpoint per call from an
//! [`Endpointer`](crate::sd::Endpointer). [`retry`] wraps a balancer into an
//! endpoint that tries again on failure.

use std::sync::Arc;

use crate::{BoxEndpoint, Error};

mod random;
mod retry;
mod round_robin;

pub use random::Random;
pub use retry::{retry, retry_with_callback, RetryCallback, RetryDecision};
pub use round_robin::RoundRobin;

/// Picks an endpoint for the next call.
pub trait Balancer<Req, Resp>: Send + Sync {
    /// Fails with [`Error::NoEndpoints`] when there is nothing to pick.
    fn endpoint(&self) -> Result<BoxEndpoint<Req, Resp>, Error>;
}

impl<Req, Resp, B> Balancer<Req, Resp> for Arc<B>
where
    B: Balancer<Req, Resp> + ?Sized,
{
    fn endpoint(&self) -> Result<BoxEndpoint<Req, Resp>, Error> {
        (**self).endpoint()
    }
}
