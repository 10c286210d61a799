//! A single self-healing outbound connection.
//!
//! A [`Manager`] dials in the background, hands out the current connection
//! without blocking, and redials with exponential backoff when a user reports
//! that the connection broke.

use std::{io, sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};

mod manager;
mod tcp;
mod writer;

pub use manager::{Manager, ManagerConfiguration};
pub use tcp::TcpDialer;
pub use writer::ManagedWriter;

/// Where a [`Manager`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Dialing, or waiting out a backoff before the next dial.
    Dialing,
    Connected,
    /// Terminal.
    Closed,
}

/// Opens connections.
pub trait Dialer<C>: Send + Sync {
    fn dial(&self, network: &str, address: &str) -> BoxFuture<'static, io::Result<C>>;
}

impl<C, D> Dialer<C> for Arc<D>
where
    D: Dialer<C> + ?Sized,
{
    fn dial(&self, network: &str, address: &str) -> BoxFuture<'static, io::Result<C>> {
        (**self).dial(network, address)
    }
}

/// A source of delays, so tests can control time.
pub trait After: Send + Sync {
    fn after(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

impl<F> After for F
where
    F: Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync,
{
    fn after(&self, delay: Duration) -> BoxFuture<'static, ()> {
        self(delay)
    }
}

/// Delays with `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioAfter;

impl After for TokioAfter {
    fn after(&self, delay: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(delay).boxed()
    }
}
