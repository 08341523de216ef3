//! Local IPC boundary between the producer process and the bridge.
//!
//! Producers connect over TCP, authenticate with a shared secret and then
//! send length-prefixed JSON messages:
//!
//! ```text
//! ┌──────────┐  #CHALLENGE#nonce / HMAC / #WELCOME#  ┌──────────────┐
//! │ Producer │ ◀───────────────────────────────────▶ │ IpcListener  │
//! │ (client) │  [u32 BE len][{"type": "...", ...}]   │ (Connection) │
//! └──────────┘ ────────────────────────────────────▶ └──────────────┘
//! ```

use std::time::Duration;

pub mod auth;
mod client;
pub mod codec;
mod listener;
mod message;

pub use client::ProducerClient;
pub use listener::{Connection, IpcListener, RecvOutcome};
pub use message::InboundMessage;

/// Result type for IPC operations.
pub type Result<T> = std::result::Result<T, IpcError>;

/// Errors that can occur on the IPC boundary.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("IPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),

    #[error("Invalid message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Handshake not completed within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Invalid authentication key")]
    InvalidKey,
}
