//! Producer side of the IPC boundary.

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use super::auth::authenticate_client;
use super::codec::write_frame;
use super::message::InboundMessage;
use super::Result;

/// Authenticated connection from a producer to the bridge.
pub struct ProducerClient {
    stream: TcpStream,
}

impl ProducerClient {
    /// Connect and complete the mutual handshake.
    pub async fn connect(addr: impl ToSocketAddrs, authkey: &[u8]) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        authenticate_client(&mut stream, authkey).await?;
        debug!(peer = %stream.peer_addr()?, "Connected to bridge");
        Ok(Self { stream })
    }

    /// Send one event message.
    pub async fn send(&mut self, message: &InboundMessage) -> Result<()> {
        let body = serde_json::to_vec(message)?;
        self.send_raw(&body).await
    }

    /// Send a pre-encoded message body.
    pub async fn send_raw(&mut self, body: &[u8]) -> Result<()> {
        write_frame(&mut self.stream, body).await
    }

    /// Close the connection cleanly.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
