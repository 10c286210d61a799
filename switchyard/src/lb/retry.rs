use std::{sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use tokio::task::JoinHandle;

use crate::{BoxEndpoint, Context, Endpoint, Error, RetryError};

use super::Balancer;

/// What to do after a failed attempt.
#[derive(Debug, Default)]
pub struct RetryDecision {
    pub keep_trying: bool,
    /// Recorded in place of the attempt's own error.
    pub replacement: Option<Error>,
}

impl RetryDecision {
    pub fn keep_trying() -> Self {
        Self {
            keep_trying: true,
            replacement: None,
        }
    }

    pub fn give_up() -> Self {
        Self {
            keep_trying: false,
            replacement: None,
        }
    }

    pub fn replacing(mut self, error: impl Into<Error>) -> Self {
        self.replacement = Some(error.into());
        self
    }
}

/// Consulted after each failed attempt with the 1-based attempt number and
/// that attempt's error.
pub type RetryCallback = Arc<dyn Fn(usize, &Error) -> RetryDecision + Send + Sync>;

#[derive(Clone)]
enum Policy {
    Max(usize),
    Callback(RetryCallback),
}

struct Retry<Req, Resp> {
    balancer: Arc<dyn Balancer<Req, Resp>>,
    timeout: Duration,
    policy: Policy,
}

/// An endpoint that calls through `balancer` up to `max` times, all within
/// `timeout` of the call starting.
///
/// When every attempt fails the result is an [`Error::Retry`] holding each
/// attempt's error. Business failures are returned as they are, without
/// another attempt.
pub fn retry<Req, Resp>(
    max: usize,
    timeout: Duration,
    balancer: impl Balancer<Req, Resp> + 'static,
) -> BoxEndpoint<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    if max == 0 {
        log::warn!("retry max must be at least 1, using 1");
    }
    Arc::new(Retry {
        balancer: Arc::new(balancer),
        timeout,
        policy: Policy::Max(max.max(1)),
    })
}

/// Like [`retry`], but `callback` alone decides whether another attempt is made.
pub fn retry_with_callback<Req, Resp>(
    timeout: Duration,
    balancer: impl Balancer<Req, Resp> + 'static,
    callback: impl Fn(usize, &Error) -> RetryDecision + Send + Sync + 'static,
) -> BoxEndpoint<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    Arc::new(Retry {
        balancer: Arc::new(balancer),
        timeout,
        policy: Policy::Callback(Arc::new(callback)),
    })
}

impl<Req, Resp> Endpoint<Req, Resp> for Retry<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Resp, Error>> {
        run_attempts(
            self.balancer.clone(),
            ctx,
            self.timeout,
            self.policy.clone(),
            request,
        )
        .boxed()
    }
}

async fn run_attempts<Req, Resp>(
    balancer: Arc<dyn Balancer<Req, Resp>>,
    ctx: Context,
    timeout: Duration,
    policy: Policy,
    request: Req,
) -> Result<Resp, Error>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    let (ctx, _cancel) = ctx.with_timeout(timeout);
    let mut errors = Vec::new();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut task = AbortOnDrop(tokio::spawn(attempt_once(
            balancer.clone(),
            ctx.clone(),
            request.clone(),
        )));

        let joined = tokio::select! {
            biased;
            error = ctx.done() => return Err(error),
            joined = &mut task.0 => joined,
        };
        let error = match joined {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(error)) => error,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error) => Error::Message(join_error.to_string()),
        };
        if let Some(context_error) = ctx.err() {
            return Err(context_error);
        }
        if matches!(error, Error::Business(_)) {
            return Err(error);
        }
        log::debug!("retry attempt {attempt} failed: {error}");

        let keep_trying = match &policy {
            Policy::Max(max) => {
                errors.push(error);
                attempt < *max
            }
            Policy::Callback(callback) => {
                let decision = callback(attempt, &error);
                errors.push(decision.replacement.unwrap_or(error));
                decision.keep_trying
            }
        };
        if !keep_trying {
            return Err(RetryError::new(errors).into());
        }
    }
}

async fn attempt_once<Req, Resp>(
    balancer: Arc<dyn Balancer<Req, Resp>>,
    ctx: Context,
    request: Req,
) -> Result<Resp, Error> {
    let endpoint = balancer.endpoint()?;
    endpoint.call(ctx, request).await
}

/// The attempt stops when its caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
