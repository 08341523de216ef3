//! Authenticated TCP listener and the producer connection it yields.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use super::auth::authenticate_server;
use super::codec::{read_frame, ReadOutcome};
use super::message::InboundMessage;
use super::{IpcError, Result};
use crate::config::IpcConfig;

/// Outcome of reading one message from a producer.
#[derive(Debug)]
pub enum RecvOutcome {
    Message(InboundMessage),
    /// The producer closed the connection cleanly.
    Closed,
    /// Transport or decode failure; the connection is unusable.
    Failed(IpcError),
}

/// An authenticated producer session.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Read and decode the next message.
    pub async fn recv(&mut self) -> RecvOutcome {
        match read_frame(&mut self.stream).await {
            Ok(ReadOutcome::Frame(body)) => match InboundMessage::from_slice(&body) {
                Ok(message) => RecvOutcome::Message(message),
                Err(e) => RecvOutcome::Failed(IpcError::Decode(e)),
            },
            Ok(ReadOutcome::Closed) => RecvOutcome::Closed,
            Err(e) => RecvOutcome::Failed(e),
        }
    }
}

/// Listener for producer connections.
///
/// Only accepts when asked; connection attempts made while a session is
/// active wait in the OS backlog.
pub struct IpcListener {
    listener: TcpListener,
    authkey: Vec<u8>,
    handshake_timeout: Duration,
}

impl IpcListener {
    /// Bind to the configured address.
    pub async fn bind(config: &IpcConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!(address = %listener.local_addr()?, "IPC listener bound");

        Ok(Self {
            listener,
            authkey: config.authkey.as_bytes().to_vec(),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one producer and run the authentication handshake.
    ///
    /// A failed handshake drops that socket and returns the error; the
    /// listener itself stays usable.
    pub async fn accept(&self) -> Result<Connection> {
        let (mut stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "Producer connecting");

        match tokio::time::timeout(
            self.handshake_timeout,
            authenticate_server(&mut stream, &self.authkey),
        )
        .await
        {
            Ok(Ok(())) => Ok(Connection { stream, peer }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(IpcError::HandshakeTimeout(self.handshake_timeout)),
        }
    }
}
