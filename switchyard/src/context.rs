//! Request-scoped values, deadlines and cancellation.
//!
//! A [`Context`] is immutable. Deriving a child never changes the parent, and
//! ending a parent ends every child derived from it.

use std::{
    any::{Any, TypeId},
    future::Future,
    sync::Arc,
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// A typed key for values stored in a [`Context`].
///
/// Keys are types, so two libraries can never collide on a key by accident.
/// ```
/// struct RequestId;
/// impl switchyard::ContextKey for RequestId {
///     type Value = u64;
/// }
/// let ctx = switchyard::Context::background().with_value::<RequestId>(7);
/// assert_eq!(Some(&7), ctx.value::<RequestId>());
/// ```
pub trait ContextKey: 'static {
    type Value: Send + Sync + 'static;
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parent: Option<Arc<Inner>>,
    entry: Option<(TypeId, Arc<dyn Any + Send + Sync>)>,
    token: CancellationToken,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with, and all of that context's children.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish()
    }
}

impl Context {
    /// An empty root context that never ends on its own.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                parent: None,
                entry: None,
                token: CancellationToken::new(),
                deadline: None,
            }),
        }
    }

    fn derive(
        &self,
        entry: Option<(TypeId, Arc<dyn Any + Send + Sync>)>,
        token: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                parent: Some(self.inner.clone()),
                entry,
                token,
                deadline,
            }),
        }
    }

    /// A child carrying `value` under `K`. Shadows any value of `K` further up.
    pub fn with_value<K: ContextKey>(&self, value: K::Value) -> Self {
        self.derive(
            Some((TypeId::of::<K>(), Arc::new(value) as Arc<dyn Any + Send + Sync>)),
            self.inner.token.clone(),
            self.inner.deadline,
        )
    }

    /// The closest value stored under `K`.
    pub fn value<K: ContextKey>(&self) -> Option<&K::Value> {
        let key = TypeId::of::<K>();
        let mut node = Some(&self.inner);
        while let Some(inner) = node {
            if let Some((entry_key, value)) = &inner.entry {
                if *entry_key == key {
                    return (**value).downcast_ref::<K::Value>();
                }
            }
            node = inner.parent.as_ref();
        }
        None
    }

    /// A child that can be cancelled independently of this context.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.inner.token.child_token();
        let handle = CancelHandle {
            token: token.clone(),
        };
        (self.derive(None, token, self.inner.deadline), handle)
    }

    /// A cancellable child that ends no later than `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        let token = self.inner.token.child_token();
        let handle = CancelHandle {
            token: token.clone(),
        };
        (self.derive(None, token, Some(deadline)), handle)
    }

    /// A cancellable child that ends no later than `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why this context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<Error> {
        if let Some(deadline) = self.inner.deadline {
            if deadline <= Instant::now() {
                return Some(Error::DeadlineExceeded);
            }
        }
        if self.inner.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves when this context ends, with the reason it ended.
    pub async fn done(&self) -> Error {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => self.err().unwrap_or(Error::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.inner.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// Drive `future` until it completes or this context ends, whichever is first.
    /// When the context ends first the future is dropped unfinished.
    pub async fn run<T>(&self, future: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        if let Some(error) = self.err() {
            return Err(error);
        }
        tokio::select! {
            biased;
            error = self.done() => Err(error),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready};

    use crate::{Context, ContextKey, Error};

    struct Tenant;
    impl ContextKey for Tenant {
        type Value = String;
    }

    struct Attempt;
    impl ContextKey for Attempt {
        type Value = u32;
    }

    #[test_log::test]
    fn values_are_typed_and_shadowed() {
        let root = Context::background().with_value::<Tenant>("blue".to_string());
        let child = root.with_value::<Attempt>(1);
        let shadowed = child.with_value::<Tenant>("green".to_string());

        assert_eq!(Some("blue"), root.value::<Tenant>().map(String::as_str));
        assert_eq!(None, root.value::<Attempt>());
        assert_eq!(Some(&1), child.value::<Attempt>());
        assert_eq!(Some("green"), shadowed.value::<Tenant>().map(String::as_str));
        assert_eq!(Some("blue"), child.value::<Tenant>().map(String::as_str));
    }

    #[test_log::test(tokio::test)]
    async fn cancelling_parent_ends_children() {
        let (parent, cancel) = Context::background().with_cancel();
        let child = parent.with_value::<Attempt>(3);
        let (grandchild, _unused) = child.with_cancel();

        let mut done = tokio_test::task::spawn(async move { grandchild.done().await });
        assert_pending!(done.poll());
        assert!(child.err().is_none());

        cancel.cancel();
        assert!(done.is_woken());
        assert!(matches!(assert_ready!(done.poll()), Error::Cancelled));
        assert!(matches!(child.err(), Some(Error::Cancelled)));
    }

    #[test_log::test]
    fn cancelling_child_leaves_parent() {
        let (parent, _parent_cancel) = Context::background().with_cancel();
        let (child, cancel) = parent.with_cancel();
        cancel.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn deadline_takes_the_earliest() {
        let (parent, _cancel) = Context::background().with_timeout(Duration::from_millis(50));
        let (child, _cancel) = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(parent.deadline(), child.deadline());

        let started = tokio::time::Instant::now();
        let error = child.done().await;
        assert!(matches!(error, Error::DeadlineExceeded));
        assert_eq!(Duration::from_millis(50), started.elapsed());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn run_abandons_slow_work() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(10));
        let result: Result<(), Error> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));

        let result = Context::background().run(async { Ok(5) }).await;
        assert_eq!(5, result.expect("background never ends"));
    }
}
