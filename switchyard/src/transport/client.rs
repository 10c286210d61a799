use std::{future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{Context, Endpoint, Error, Phase};

use super::{BoxError, Hooks, RequestFunc, ResponseFunc};

/// Sends one encoded message and returns the reply. This is where a concrete
/// HTTP or gRPC client plugs in.
pub trait Transport<Out, In>: Send + Sync {
    fn round_trip(&self, ctx: Context, message: Out) -> BoxFuture<'static, Result<In, BoxError>>;
}

impl<Out, In, F, Fut> Transport<Out, In> for F
where
    F: Fn(Context, Out) -> Fut + Send + Sync,
    Fut: Future<Output = Result<In, BoxError>> + Send + 'static,
{
    fn round_trip(&self, ctx: Context, message: Out) -> BoxFuture<'static, Result<In, BoxError>> {
        self(ctx, message).boxed()
    }
}

type NewRequestFn<Out> = dyn Fn(&Context) -> Result<Out, BoxError> + Send + Sync;
type EncodeFn<Req, Out> = dyn Fn(&Context, Req, &mut Out) -> Result<(), BoxError> + Send + Sync;
type DecodeFn<In, Resp> = dyn Fn(&Context, In) -> Result<Resp, BoxError> + Send + Sync;

/// A client binding: turns a [`Transport`] plus codecs into an [`Endpoint`].
///
/// Each call builds an outbound message, encodes the request into it, runs
/// the request hooks, sends it, runs the response hooks on the reply and
/// decodes it. A failure in any step is an [`Error::Transport`] tagged with
/// that step's [`Phase`]. Sending is abandoned when the context ends.
pub struct Client<Req, Resp, Out, In> {
    transport: Arc<dyn Transport<Out, In>>,
    new_request: Arc<NewRequestFn<Out>>,
    encode: Arc<EncodeFn<Req, Out>>,
    decode: Arc<DecodeFn<In, Resp>>,
    hooks: Hooks<Out, In>,
}

impl<Req, Resp, Out, In> Client<Req, Resp, Out, In>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    Out: Send + 'static,
    In: Send + 'static,
{
    pub fn new(
        transport: impl Transport<Out, In> + 'static,
        new_request: impl Fn(&Context) -> Result<Out, BoxError> + Send + Sync + 'static,
        encode: impl Fn(&Context, Req, &mut Out) -> Result<(), BoxError> + Send + Sync + 'static,
        decode: impl Fn(&Context, In) -> Result<Resp, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            new_request: Arc::new(new_request),
            encode: Arc::new(encode),
            decode: Arc::new(decode),
            hooks: Hooks::new(),
        }
    }

    pub fn before(mut self, hook: RequestFunc<Out>) -> Self {
        self.hooks = self.hooks.before(hook);
        self
    }

    pub fn after(mut self, hook: ResponseFunc<In>) -> Self {
        self.hooks = self.hooks.after(hook);
        self
    }
}

impl<Req, Resp, Out, In> Endpoint<Req, Resp> for Client<Req, Resp, Out, In>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    Out: Send + 'static,
    In: Send + 'static,
{
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>> {
        let transport = self.transport.clone();
        let new_request = self.new_request.clone();
        let encode = self.encode.clone();
        let decode = self.decode.clone();
        let hooks = self.hooks.clone();
        async move {
            let mut message =
                new_request(&ctx).map_err(|error| Error::transport(Phase::NewRequest, error))?;
            encode(&ctx, request, &mut message)
                .map_err(|error| Error::transport(Phase::Encode, error))?;
            let ctx = hooks.inject(ctx, &mut message);

            let sent = transport.round_trip(ctx.clone(), message);
            let reply = ctx
                .run(async move {
                    sent.await
                        .map_err(|error| Error::transport(Phase::Do, error))
                })
                .await?;

            let ctx = hooks.extract(ctx, &reply);
            decode(&ctx, reply).map_err(|error| Error::transport(Phase::Decode, error))
        }
        .boxed()
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc, time::Duration};

    use crate::{
        transport::{BoxError, Carrier, Client},
        Context, ContextKey, Endpoint, Error, Phase,
    };

    type Message = HashMap<String, String>;

    struct Caller;
    impl ContextKey for Caller {
        type Value = String;
    }

    struct Echoed;
    impl ContextKey for Echoed {
        type Value = String;
    }

    async fn echo(_ctx: Context, message: Message) -> Result<Message, BoxError> {
        Ok(message)
    }

    /// Doubles the request and reports the caller the response hooks saw.
    fn client() -> Client<u32, (u32, Option<String>), Message, Message> {
        Client::new(
            echo,
            |_ctx: &Context| Ok(Message::new()),
            |_ctx: &Context, request: u32, message: &mut Message| {
                message.set("body", request.to_string());
                Ok(())
            },
            |ctx: &Context, message: Message| {
                let body = message.get("body").ok_or("missing body")?;
                Ok((body.parse::<u32>()? * 2, ctx.value::<Echoed>().cloned()))
            },
        )
    }

    #[test_log::test(tokio::test)]
    async fn round_trip_with_hooks() {
        let client = client()
            .before(Arc::new(|ctx: Context, message: &mut Message| {
                if let Some(caller) = ctx.value::<Caller>() {
                    message.set("caller", caller.clone());
                }
                ctx
            }))
            .after(Arc::new(|ctx: Context, message: &Message| {
                match message.get("caller") {
                    Some(caller) => ctx.with_value::<Echoed>(caller.clone()),
                    None => ctx,
                }
            }));

        let ctx = Context::background().with_value::<Caller>("billing".to_string());
        let response = client.call(ctx, 21).await.expect("echo works");
        assert_eq!((42, Some("billing".to_string())), response);

        let response = client
            .call(Context::background(), 4)
            .await
            .expect("echo works");
        assert_eq!((8, None), response);
    }

    #[test_log::test(tokio::test)]
    async fn failures_carry_their_phase() {
        let broken_encode: Client<u32, u32, Message, Message> = Client::new(
            echo,
            |_ctx: &Context| Ok(Message::new()),
            |_ctx: &Context, _request: u32, _message: &mut Message| Err("cannot encode".into()),
            |_ctx: &Context, _message: Message| Ok(0),
        );
        let error = broken_encode
            .call(Context::background(), 1)
            .await
            .expect_err("encode fails");
        assert!(
            matches!(error, Error::Transport { phase: Phase::Encode, .. }),
            "{error:?}"
        );
        assert_eq!("transport error during encode: cannot encode", error.to_string());

        let unreachable: Client<u32, u32, Message, Message> = Client::new(
            |_ctx: Context, _message: Message| async {
                Err::<Message, BoxError>("connection refused".into())
            },
            |_ctx: &Context| Ok(Message::new()),
            |_ctx: &Context, _request: u32, _message: &mut Message| Ok(()),
            |_ctx: &Context, _message: Message| Ok(0),
        );
        let error = unreachable
            .call(Context::background(), 1)
            .await
            .expect_err("send fails");
        assert!(matches!(error, Error::Transport { phase: Phase::Do, .. }), "{error:?}");
        assert_eq!(Some(502), error.status_code());

        let bodiless: Client<u32, u32, Message, Message> = Client::new(
            echo,
            |_ctx: &Context| Ok(Message::new()),
            |_ctx: &Context, _request: u32, _message: &mut Message| Ok(()),
            |_ctx: &Context, message: Message| {
                let body = message.get("body").ok_or("missing body")?;
                Ok(body.parse::<u32>()?)
            },
        );
        let error = bodiless
            .call(Context::background(), 1)
            .await
            .expect_err("nothing to decode");
        assert!(matches!(error, Error::Transport { phase: Phase::Decode, .. }), "{error:?}");
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn sending_stops_with_the_context() {
        let stalled: Client<u32, u32, Message, Message> = Client::new(
            |_ctx: Context, _message: Message| std::future::pending::<Result<Message, BoxError>>(),
            |_ctx: &Context| Ok(Message::new()),
            |_ctx: &Context, _request: u32, _message: &mut Message| Ok(()),
            |_ctx: &Context, _message: Message| Ok(0),
        );
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(10));
        let error = stalled.call(ctx, 1).await.expect_err("times out");
        assert!(matches!(error, Error::DeadlineExceeded), "{error:?}");
    }
}
