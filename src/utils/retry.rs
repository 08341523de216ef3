//! Retry utilities: backoff builders for broker connection attempts.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for broker connection retries at startup.
///
/// - Min delay: 500ms
/// - Max delay: 10s
/// - Max attempts: `retries` (0 = single attempt, no retry)
/// - Jitter enabled
pub fn connection_backoff(retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(retries)
        .with_jitter()
}
