use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt};

use crate::{BoxEndpoint, Context, Endpoint, Error, Middleware};

use super::{
    Collector, CurrentSpan, OutboundSpan, Span, CLIENT_RECV, CLIENT_SEND, SERVER_RECV,
    SERVER_SEND,
};

/// Starts a client span for each outbound call, as a child of the
/// [`CurrentSpan`] or as a new trace. The span is set as the [`OutboundSpan`]
/// for the request hooks and collected when the call returns.
pub struct ClientTracing {
    collector: Arc<dyn Collector>,
    service_name: Arc<str>,
    method_name: Arc<str>,
}

impl ClientTracing {
    pub fn new(
        collector: Arc<dyn Collector>,
        service_name: impl Into<Arc<str>>,
        method_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            collector,
            service_name: service_name.into(),
            method_name: method_name.into(),
        }
    }
}

/// Continues the [`CurrentSpan`] an incoming request arrived with, or starts
/// a new trace, and collects it when the call returns.
pub struct ServerTracing {
    collector: Arc<dyn Collector>,
    service_name: Arc<str>,
    method_name: Arc<str>,
}

impl ServerTracing {
    pub fn new(
        collector: Arc<dyn Collector>,
        service_name: impl Into<Arc<str>>,
        method_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            collector,
            service_name: service_name.into(),
            method_name: method_name.into(),
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Client,
    Server,
}

struct Traced<Req, Resp> {
    next: BoxEndpoint<Req, Resp>,
    collector: Arc<dyn Collector>,
    service_name: Arc<str>,
    method_name: Arc<str>,
    side: Side,
}

impl<Req, Resp> Endpoint<Req, Resp> for Traced<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>> {
        let service_name = &*self.service_name;
        let method_name = &*self.method_name;
        let (mut span, ctx, finish) = match self.side {
            Side::Client => {
                let mut span = match ctx.value::<CurrentSpan>() {
                    Some(current) => current.child(service_name, method_name),
                    None => Span::root(service_name, method_name),
                };
                span.annotate(CLIENT_SEND);
                let ctx = ctx.with_value::<OutboundSpan>(span.clone());
                (span, ctx, CLIENT_RECV)
            }
            Side::Server => {
                let mut span = match ctx.value::<CurrentSpan>() {
                    Some(incoming) => incoming.clone(),
                    None => Span::root("", ""),
                };
                span.set_names(service_name, method_name);
                span.annotate(SERVER_RECV);
                let ctx = ctx.with_value::<CurrentSpan>(span.clone());
                (span, ctx, SERVER_SEND)
            }
        };

        let call = self.next.call(ctx, request);
        let collector = self.collector.clone();
        async move {
            let result = call.await;
            if let Err(e) = &result {
                span.annotate(format!("error: {e}"));
            }
            span.annotate(finish);
            collector.collect(span);
            result
        }
        .boxed()
    }
}

impl<Req, Resp> Middleware<Req, Resp> for ClientTracing
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        Arc::new(Traced {
            next,
            collector: self.collector.clone(),
            service_name: self.service_name.clone(),
            method_name: self.method_name.clone(),
            side: Side::Client,
        })
    }
}

impl<Req, Resp> Middleware<Req, Resp> for ServerTracing
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        Arc::new(Traced {
            next,
            collector: self.collector.clone(),
            service_name: self.service_name.clone(),
            method_name: self.method_name.clone(),
            side: Side::Server,
        })
    }
}
