//! Connection manager.
//!
//! Owns the local listener for the whole process lifetime. One producer is
//! serviced at a time; each of its messages is dispatched to completion
//! before the next one is read.
//!
//! ```text
//!            accept + auth             Closed / Failed
//! Listening ───────────────▶ Connected ───────────────▶ Listening
//!     │                          │
//!     └──── stop ────▶ ShuttingDown ──▶ Closed
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, Publisher};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::ipc::{Connection, IpcError, IpcListener, RecvOutcome};

/// Pause after an accept error that is not tied to one peer.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Broker unavailable: {0}")]
    Broker(#[from] BusError),

    #[error("Listener failed: {0}")]
    Listener(#[from] IpcError),
}

/// Lifecycle state of the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Listening,
    Connected,
    ShuttingDown,
    Closed,
}

/// Handle used to stop a running connection manager.
#[derive(Clone)]
pub struct ShutdownHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signal the manager to stop.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }
}

/// Accept/read loop feeding the dispatcher.
pub struct ConnectionManager {
    listener: IpcListener,
    dispatcher: Dispatcher,
    state: watch::Sender<ManagerState>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionManager {
    /// Create a manager around a bound listener.
    pub fn new(listener: IpcListener, dispatcher: Dispatcher) -> (Self, ShutdownHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state, _) = watch::channel(ManagerState::Listening);
        let manager = Self {
            listener,
            dispatcher,
            state,
            shutdown: cancel_rx,
        };
        let handle = ShutdownHandle {
            cancel: Arc::new(cancel_tx),
        };
        (manager, handle)
    }

    /// Bind the configured listener and wire a dispatcher to `publisher`.
    pub async fn bind(
        config: &Config,
        publisher: Arc<dyn Publisher>,
    ) -> Result<(Self, ShutdownHandle), BridgeError> {
        let listener = IpcListener::bind(&config.ipc).await?;
        let dispatcher = Dispatcher::from_config(publisher, config);
        Ok(Self::new(listener, dispatcher))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<ManagerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ManagerState) {
        self.state.send_replace(state);
    }

    /// Run until stopped, then disconnect the publisher and close the
    /// listener.
    pub async fn run(mut self) {
        loop {
            self.set_state(ManagerState::Listening);
            debug!("Waiting for producer");

            let accepted = tokio::select! {
                biased;
                _ = stop_requested(&mut self.shutdown) => break,
                accepted = self.listener.accept() => accepted,
            };

            let mut connection = match accepted {
                Ok(connection) => connection,
                Err(IpcError::Io(e)) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Producer rejected during handshake");
                    continue;
                }
            };

            info!(peer = %connection.peer_addr(), "Producer connected");
            self.set_state(ManagerState::Connected);

            if self.serve(&mut connection).await {
                break;
            }
        }

        self.set_state(ManagerState::ShuttingDown);
        info!("Connection manager shutting down");

        let Self {
            listener,
            dispatcher,
            state,
            ..
        } = self;

        if let Err(e) = dispatcher.publisher().disconnect().await {
            warn!(error = %e, "Publisher disconnect failed");
        }
        drop(listener);

        state.send_replace(ManagerState::Closed);
        info!("Connection manager closed");
    }

    /// Pump one producer session. Returns true if stopped.
    async fn serve(&mut self, connection: &mut Connection) -> bool {
        let peer = connection.peer_addr();
        loop {
            let outcome = tokio::select! {
                biased;
                _ = stop_requested(&mut self.shutdown) => {
                    info!(peer = %peer, "Dropping producer connection on shutdown");
                    return true;
                }
                outcome = connection.recv() => outcome,
            };

            match outcome {
                RecvOutcome::Message(message) => {
                    let report = self.dispatcher.dispatch(message).await;
                    if !report.is_success() {
                        debug!(peer = %peer, kind = report.kind, "Message dispatched with failures");
                    }
                }
                RecvOutcome::Closed => {
                    info!(peer = %peer, "Producer disconnected");
                    return false;
                }
                RecvOutcome::Failed(e) => {
                    warn!(peer = %peer, error = %e, "Producer connection failed");
                    return false;
                }
            }
        }
    }
}

/// Resolve once stop was signalled. A dropped handle never resolves.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
