use std::io;

use futures::{future::BoxFuture, FutureExt};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::forward::Writer;

use super::Manager;

/// Writes through whatever connection a [`Manager`] currently holds.
///
/// A failed write is reported back to the manager, which redials. The bytes
/// of a failed write are not retried.
#[derive(Debug)]
pub struct ManagedWriter<W> {
    manager: Manager<Mutex<W>>,
}

impl<W> ManagedWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(manager: Manager<Mutex<W>>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Manager<Mutex<W>> {
        &self.manager
    }
}

impl<W> Writer for ManagedWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn write<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        async move {
            let connection = self.manager.take().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "no connection available")
            })?;
            let result = {
                let mut connection = connection.lock().await;
                match connection.write_all(bytes).await {
                    Ok(()) => connection.flush().await,
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = &result {
                self.manager.put(Some(io::Error::new(e.kind(), e.to_string())));
            }
            result
        }
        .boxed()
    }
}
