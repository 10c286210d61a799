use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use switchyard::{
    endpoint::{Chain, LoggingMiddleware},
    forward::{Buffer, BufferConfiguration, Kind},
    lb::{retry, RoundRobin},
    metrics::Counter,
    sd::{Closer, DefaultEndpointer, EndpointerOptions, ManualPublisher},
    trace::{to_carrier, ChannelCollector, ClientTracing, CurrentSpan, Span, TRACE_ID_HEADER},
    transport::{BoxError, Carrier, Client},
    BoxEndpoint, Context, Endpoint, Error, Middleware,
};

type Headers = HashMap<String, String>;

/// Instances named `down:*` refuse connections. The others greet the caller
/// and report the trace id the request arrived with.
fn factory(
    requests: Arc<dyn Counter>,
    closed: Arc<AtomicUsize>,
) -> impl Fn(&str) -> Result<(BoxEndpoint<String, String>, Closer), Error> + Send + Sync + 'static
{
    move |instance: &str| -> Result<(BoxEndpoint<String, String>, Closer), Error> {
        let name = instance.to_string();
        let requests = requests.clone();
        let transport = move |_ctx: Context, request: Headers| {
            let name = name.clone();
            let requests = requests.clone();
            async move {
                requests.with(&["instance", name.as_str()]).add(1.0);
                if name.starts_with("down") {
                    return Err::<Headers, BoxError>("connection refused".into());
                }
                let body = Carrier::get(&request, "body").unwrap_or_default();
                let trace = Carrier::get(&request, TRACE_ID_HEADER).unwrap_or("none");
                let mut reply = Headers::new();
                reply.set("body", format!("{name} says {body} in trace {trace}"));
                Ok(reply)
            }
        };
        let client = Client::new(
            transport,
            |_ctx: &Context| Ok(Headers::new()),
            |_ctx: &Context, request: String, message: &mut Headers| {
                message.set("body", request);
                Ok(())
            },
            |_ctx: &Context, reply: Headers| {
                Ok(Carrier::get(&reply, "body")
                    .ok_or("reply without a body")?
                    .to_string())
            },
        )
        .before(to_carrier::<Headers>());

        let endpoint: BoxEndpoint<String, String> = Arc::new(client);
        let closed = closed.clone();
        Ok((
            endpoint,
            Closer::new(move || {
                closed.fetch_add(1, Ordering::Relaxed);
            }),
        ))
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never held");
}

#[test_log::test(tokio::test)]
async fn calls_flow_through_discovery_balancing_and_retry() {
    let buffer = Buffer::new(BufferConfiguration::new().prefix("client."))
        .expect("buffer thread starts");
    let requests: Arc<dyn Counter> = Arc::new(buffer.counter("requests", 1.0));
    let closed = Arc::new(AtomicUsize::new(0));

    let publisher = ManualPublisher::new();
    publisher.publish_instances(["down:9", "a:1"]);
    let endpointer = DefaultEndpointer::new(
        &publisher,
        factory(requests, closed.clone()),
        EndpointerOptions::new(),
    );

    let (collector, mut spans) = ChannelCollector::new(16);
    let endpoint = Chain::<String, String>::new()
        .then(LoggingMiddleware::new("greet"))
        .then(ClientTracing::new(Arc::new(collector), "frontend", "greet"))
        .wrap(retry(3, Duration::from_secs(1), RoundRobin::new(endpointer)));

    let parent = Span::root("frontend", "page");
    let ctx = Context::background().with_value::<CurrentSpan>(parent.clone());
    let expected = format!("a:1 says hello in trace {:016x}", parent.trace_id());

    // Instances are ordered: a:1 first. Every call after the first lands on
    // down:9, fails and is retried on a:1.
    for _ in 0..4 {
        let response = endpoint
            .call(ctx.clone(), "hello".to_string())
            .await
            .expect("retry reaches the live instance");
        assert_eq!(expected, response);
    }

    for _ in 0..4 {
        let span = spans.try_recv().expect("one client span per call");
        assert_eq!(parent.trace_id(), span.trace_id());
        assert_eq!(Some(parent.span_id()), span.parent_span_id());
    }
    assert!(spans.try_recv().is_err());

    let counts: Vec<(String, f64)> = buffer
        .get()
        .await
        .records()
        .into_iter()
        .filter(|record| record.kind == Kind::Counter)
        .map(|record| {
            assert_eq!("client.requests", record.name);
            (record.label_values.to_string(), record.values[0])
        })
        .collect();
    assert_eq!(
        vec![
            ("instance=a:1".to_string(), 4.0),
            ("instance=down:9".to_string(), 3.0)
        ],
        counts
    );

    publisher.publish_instances(["b:2"]);
    eventually(|| closed.load(Ordering::Relaxed) == 2).await;
    let response = endpoint
        .call(ctx.clone(), "again".to_string())
        .await
        .expect("b:2 is live");
    assert!(response.starts_with("b:2 says again"), "{response}");

    buffer.stop().await;
}
