use crate::{BoxEndpoint, Error};

/// Releases the resources behind an endpoint. Runs at most once.
pub struct Closer(Option<Box<dyn FnOnce() + Send>>);

impl Closer {
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(close)))
    }

    /// A closer with nothing to release.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn close(mut self) {
        if let Some(close) = self.0.take() {
            close()
        }
    }
}

impl std::fmt::Debug for Closer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Closer").field(&self.0.is_some()).finish()
    }
}

/// Builds an endpoint, and the closer that releases it, for one instance.
///
/// Any `Fn(&str) -> Result<(BoxEndpoint, Closer), Error>` is a factory.
pub trait Factory<Req, Resp>: Send + Sync {
    fn build(&self, instance: &str) -> Result<(BoxEndpoint<Req, Resp>, Closer), Error>;
}

impl<Req, Resp, F> Factory<Req, Resp> for F
where
    F: Fn(&str) -> Result<(BoxEndpoint<Req, Resp>, Closer), Error> + Send + Sync,
{
    fn build(&self, instance: &str) -> Result<(BoxEndpoint<Req, Resp>, Closer), Error> {
        self(instance)
    }
}
