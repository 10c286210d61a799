use std::{io, sync::Arc, time::Duration};

use arc_swap::ArcSwapOption;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;

use super::{After, ConnectionState, Dialer, TokioAfter};

/// Settings for a [`Manager`].
#[derive(Clone)]
pub struct ManagerConfiguration {
    backoff: Backoff,
    after: Arc<dyn After>,
}

impl Default for ManagerConfiguration {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            after: Arc::new(TokioAfter),
        }
    }
}

impl ManagerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays between failed dials. Defaults to 1 second doubling up to 1 minute.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// How delays are waited out. Defaults to tokio's timer.
    pub fn after(mut self, after: impl After + 'static) -> Self {
        self.after = Arc::new(after);
        self
    }
}

/// Owns one connection of type `C` and keeps it alive.
///
/// All state lives in a background task. [`Manager::take`] never blocks,
/// [`Manager::put`] reports a broken connection and [`Manager::close`] ends it
/// all. Dropping the manager closes it.
pub struct Manager<C> {
    current: Arc<ArcSwapOption<C>>,
    state: watch::Receiver<ConnectionState>,
    puts: mpsc::UnboundedSender<io::Error>,
    shutdown: CancellationToken,
}

impl<C> std::fmt::Debug for Manager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<C> Manager<C>
where
    C: Send + Sync + 'static,
{
    /// Start dialing `address` right away. Must be called within a tokio runtime.
    pub fn new(
        dialer: impl Dialer<C> + 'static,
        network: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self::with_configuration(dialer, network, address, ManagerConfiguration::default())
    }

    pub fn with_configuration(
        dialer: impl Dialer<C> + 'static,
        network: impl Into<String>,
        address: impl Into<String>,
        configuration: ManagerConfiguration,
    ) -> Self {
        let current = Arc::new(ArcSwapOption::empty());
        let (state_sender, state) = watch::channel(ConnectionState::Dialing);
        let (puts, put_receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let owner = Owner {
            dialer: Box::new(dialer),
            network: network.into(),
            address: address.into(),
            backoff: configuration.backoff,
            after: configuration.after,
            current: current.clone(),
            state: state_sender,
            puts: put_receiver,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(owner.manage_forever());

        Self {
            current,
            state,
            puts,
            shutdown,
        }
    }

    /// The current connection, or `None` while dialing or after close.
    pub fn take(&self) -> Option<Arc<C>> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        self.current.load_full()
    }

    /// Report the outcome of using a connection. `Some(error)` invalidates the
    /// current connection and triggers a redial. `None` is a no-op.
    pub fn put(&self, error: Option<io::Error>) {
        if let Some(error) = error {
            if self.puts.send(error).is_err() {
                log::debug!("connection manager is closed, ignoring error");
            }
        }
    }

    /// Stop managing the connection. Every later [`Manager::take`] returns `None`.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.current.store(None);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Resolve once the manager reaches `wanted`.
    pub async fn wait_for_state(&self, wanted: ConnectionState) {
        let mut state = self.state.clone();
        if state.wait_for(|state| *state == wanted).await.is_err() {
            log::debug!("connection manager went away while waiting for {wanted:?}");
        }
    }
}

impl<C> Drop for Manager<C> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Owner<C> {
    dialer: Box<dyn Dialer<C>>,
    network: String,
    address: String,
    backoff: Backoff,
    after: Arc<dyn After>,
    current: Arc<ArcSwapOption<C>>,
    state: watch::Sender<ConnectionState>,
    puts: mpsc::UnboundedReceiver<io::Error>,
    shutdown: CancellationToken,
}

enum Phase<C> {
    Dialing(BoxFuture<'static, io::Result<C>>),
    Waiting(BoxFuture<'static, ()>),
    Connected,
}

enum Event<C> {
    Shutdown,
    Put(io::Error),
    Dialed(io::Result<C>),
    Waited,
}

async fn advance<C>(phase: &mut Phase<C>) -> Event<C> {
    match phase {
        Phase::Dialing(dial) => Event::Dialed(dial.await),
        Phase::Waiting(wait) => {
            wait.await;
            Event::Waited
        }
        Phase::Connected => std::future::pending().await,
    }
}

impl<C> Owner<C>
where
    C: Send + Sync + 'static,
{
    fn dial(&self) -> Phase<C> {
        log::debug!("dialing {} {}", self.network, self.address);
        Phase::Dialing(self.dialer.dial(&self.network, &self.address))
    }

    async fn manage_forever(mut self) {
        let mut phase = self.dial();
        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => Event::Shutdown,
                put = self.puts.recv() => match put {
                    Some(error) => Event::Put(error),
                    None => Event::Shutdown,
                },
                event = advance(&mut phase) => event,
            };
            phase = match event {
                Event::Shutdown => break,
                Event::Put(error) => match phase {
                    Phase::Connected => {
                        log::warn!("connection to {} failed, reconnecting: {error}", self.address);
                        self.current.store(None);
                        self.state.send_replace(ConnectionState::Dialing);
                        Phase::Waiting(self.after.after(Duration::ZERO))
                    }
                    phase => {
                        log::debug!("ignoring error for a connection that is already gone: {error}");
                        phase
                    }
                },
                Event::Dialed(Ok(connection)) => {
                    log::info!("connected to {}", self.address);
                    self.backoff.reset();
                    self.current.store(Some(Arc::new(connection)));
                    self.state.send_replace(ConnectionState::Connected);
                    Phase::Connected
                }
                Event::Dialed(Err(error)) => {
                    let delay = self.backoff.next_delay();
                    log::warn!("dial {} failed, retrying in {delay:?}: {error}", self.address);
                    Phase::Waiting(self.after.after(delay))
                }
                Event::Waited => self.dial(),
            };
        }
        self.current.store(None);
        self.state.send_replace(ConnectionState::Closed);
        log::info!("stopped managing connection to {}", self.address);
    }
}
