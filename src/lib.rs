//! IPC to MQTT bridge.
//!
//! Receives event messages from a local producer process and republishes
//! them to a publish/subscribe broker: emergency-braking and image-capture
//! events become JSON telemetry records, captured images are streamed as
//! ordered, acknowledged chunk frames.
//!
//! ```text
//! producer ──IPC──▶ ConnectionManager ──▶ Dispatcher ──┬─▶ telemetry ──┐
//!                                                      └─▶ chunk ──────┴─▶ Publisher ──▶ broker
//! ```

pub mod bridge;
pub mod bus;
pub mod chunk;
pub mod config;
pub mod dispatch;
pub mod ipc;
pub mod telemetry;
pub mod utils;
