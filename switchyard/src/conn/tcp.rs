use std::io;

use futures::{future::BoxFuture, FutureExt};
use tokio::{net::TcpStream, sync::Mutex};

use super::Dialer;

/// Dials TCP. Connections are wrapped in a mutex so one writer uses them at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer {
    nodelay: bool,
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Dialer<Mutex<TcpStream>> for TcpDialer {
    fn dial(&self, network: &str, address: &str) -> BoxFuture<'static, io::Result<Mutex<TcpStream>>> {
        let supported = matches!(network, "tcp" | "tcp4" | "tcp6");
        let network = network.to_string();
        let address = address.to_string();
        let nodelay = self.nodelay;
        async move {
            if !supported {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported network {network}"),
                ));
            }
            let stream = TcpStream::connect(address).await?;
            stream.set_nodelay(nodelay)?;
            Ok(Mutex::new(stream))
        }
        .boxed()
    }
}
