//! The endpoint and middleware algebra.
//!
//! An [`Endpoint`] is one remote procedure: a context and a request go in, a
//! response or an [`Error`] comes out. A [`Middleware`] takes an endpoint and
//! returns a decorated one.

use std::{future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{Context, Error};

mod logging;
mod middleware;

pub use logging::LoggingMiddleware;
pub use middleware::{compose, BoxMiddleware, Chain, Compose, Identity, Middleware};

/// One request/response call.
///
/// Implementations must honor the context: once it ends, the returned future
/// should resolve promptly with the context's error.
pub trait Endpoint<Req, Resp>: Send + Sync {
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>>;
}

/// A shared, type-erased endpoint.
pub type BoxEndpoint<Req, Resp> = Arc<dyn Endpoint<Req, Resp>>;

impl<Req, Resp, E> Endpoint<Req, Resp> for Arc<E>
where
    E: Endpoint<Req, Resp> + ?Sized,
{
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>> {
        (**self).call(ctx, request)
    }
}

/// Adapts a closure returning a future into an [`Endpoint`].
pub struct EndpointFn<F> {
    function: F,
}

impl<Req, Resp, F, Fut> Endpoint<Req, Resp> for EndpointFn<F>
where
    F: Fn(Context, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, Error>> + Send + 'static,
{
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>> {
        (self.function)(ctx, request).boxed()
    }
}

/// Make an endpoint out of an async closure.
/// ```
/// use switchyard::{endpoint_fn, Context, Error};
/// let double = endpoint_fn(|_ctx: Context, n: u32| async move { Ok::<_, Error>(n * 2) });
/// ```
pub fn endpoint_fn<Req, Resp, F, Fut>(function: F) -> BoxEndpoint<Req, Resp>
where
    Req: 'static,
    Resp: 'static,
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Error>> + Send + 'static,
{
    Arc::new(EndpointFn { function })
}

/// An endpoint that does nothing and answers with `Resp::default()`.
pub fn nop<Req, Resp>() -> BoxEndpoint<Req, Resp>
where
    Req: Send + 'static,
    Resp: Default + Send + 'static,
{
    endpoint_fn(|_ctx: Context, _request: Req| async { Ok(Resp::default()) })
}

/// A response-side capability: a response that completed the round trip but
/// represents a domain failure.
///
/// Middleware such as [`crate::metrics::InstrumentingMiddleware`] uses this to
/// tell business failures apart from transport errors.
pub trait Failer {
    fn failed(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)>;
}
