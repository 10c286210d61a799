use std::{sync::Arc, time::Instant};

use futures::{future::BoxFuture, FutureExt};

use crate::{BoxEndpoint, Context, Endpoint, Error, Failer, Middleware};

use super::Histogram;

/// Records call latency in seconds, labelled with the call's outcome:
/// `success`, `failure` for a response whose [`Failer`] reports a business
/// failure, or `error` for an endpoint error.
pub struct InstrumentingMiddleware {
    duration: Arc<dyn Histogram>,
}

impl InstrumentingMiddleware {
    pub fn new(duration: Arc<dyn Histogram>) -> Self {
        Self { duration }
    }
}

struct Instrumented<Req, Resp> {
    next: BoxEndpoint<Req, Resp>,
    duration: Arc<dyn Histogram>,
}

impl<Req, Resp> Endpoint<Req, Resp> for Instrumented<Req, Resp>
where
    Req: Send + 'static,
    Resp: Failer + Send + 'static,
{
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>> {
        let duration = self.duration.clone();
        let call = self.next.call(ctx, request);
        async move {
            let start = Instant::now();
            let result = call.await;
            let outcome = match &result {
                Ok(response) if response.failed().is_some() => "failure",
                Ok(_) => "success",
                Err(_) => "error",
            };
            duration
                .with(&["outcome", outcome])
                .observe(start.elapsed().as_secs_f64());
            result
        }
        .boxed()
    }
}

impl<Req, Resp> Middleware<Req, Resp> for InstrumentingMiddleware
where
    Req: Send + 'static,
    Resp: Failer + Send + 'static,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        Arc::new(Instrumented {
            next,
            duration: self.duration.clone(),
        })
    }
}
