//! Shared helpers: process bootstrap, retry policies and timestamps.

pub mod bootstrap;
pub mod clock;
pub mod retry;
