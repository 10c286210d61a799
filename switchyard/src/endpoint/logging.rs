use std::{sync::Arc, time::Instant};

use futures::FutureExt;

use crate::{BoxEndpoint, Context, Endpoint, Middleware};

/// A middleware that logs each call's method, outcome and duration.
pub struct LoggingMiddleware {
    method: Arc<str>,
    log_level: log::Level,
}

impl LoggingMiddleware {
    pub fn new(method: impl Into<Arc<str>>) -> Self {
        Self {
            method: method.into(),
            log_level: log::Level::Info,
        }
    }

    /// Log successful calls at this level. Errors are always logged at warn.
    pub fn log_level(mut self, log_level: log::Level) -> Self {
        self.log_level = log_level;
        self
    }
}

struct Logged<Req, Resp> {
    next: BoxEndpoint<Req, Resp>,
    method: Arc<str>,
    log_level: log::Level,
}

impl<Req, Resp> Endpoint<Req, Resp> for Logged<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn call(
        &self,
        ctx: Context,
        request: Req,
    ) -> futures::future::BoxFuture<'static, Result<Resp, crate::Error>> {
        let method = self.method.clone();
        let log_level = self.log_level;
        let call = self.next.call(ctx, request);
        async move {
            let start = Instant::now();
            let result = call.await;
            match &result {
                Ok(_) => log::log!(log_level, "method={method} took={:?}", start.elapsed()),
                Err(e) => log::warn!("method={method} took={:?} err={e}", start.elapsed()),
            }
            result
        }
        .boxed()
    }
}

impl<Req, Resp> Middleware<Req, Resp> for LoggingMiddleware
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        Arc::new(Logged {
            next,
            method: self.method.clone(),
            log_level: self.log_level,
        })
    }
}
