use std::sync::Arc;

use super::BoxEndpoint;

/// Decorates an endpoint with extra behavior.
///
/// Any `Fn(BoxEndpoint) -> BoxEndpoint` closure is a middleware.
pub trait Middleware<Req, Resp>: Send + Sync {
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp>;
}

pub type BoxMiddleware<Req, Resp> = Arc<dyn Middleware<Req, Resp>>;

impl<Req, Resp, F> Middleware<Req, Resp> for F
where
    F: Fn(BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> + Send + Sync,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        self(next)
    }
}

/// The unit of composition: returns the endpoint it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<Req, Resp> Middleware<Req, Resp> for Identity {
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        next
    }
}

/// `outer ∘ inner`: see [`compose`].
#[derive(Debug, Clone, Copy)]
pub struct Compose<F, G> {
    outer: F,
    inner: G,
}

/// Compose two middlewares. `compose(f, g).wrap(e)` is `f.wrap(g.wrap(e))`.
pub fn compose<F, G>(outer: F, inner: G) -> Compose<F, G> {
    Compose { outer, inner }
}

impl<Req, Resp, F, G> Middleware<Req, Resp> for Compose<F, G>
where
    F: Middleware<Req, Resp>,
    G: Middleware<Req, Resp>,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        self.outer.wrap(self.inner.wrap(next))
    }
}

/// An ordered stack of middlewares. The first one added is the outermost:
/// it sees the request first and the response last.
pub struct Chain<Req, Resp> {
    layers: Vec<BoxMiddleware<Req, Resp>>,
}

impl<Req, Resp> Default for Chain<Req, Resp> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<Req, Resp> Clone for Chain<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
        }
    }
}

impl<Req, Resp> Chain<Req, Resp> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer inside the ones already present.
    pub fn then(mut self, middleware: impl Middleware<Req, Resp> + 'static) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<Req, Resp> Middleware<Req, Resp> for Chain<Req, Resp> {
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        self.layers
            .iter()
            .rev()
            .fold(next, |next, layer| layer.wrap(next))
    }
}
