//! Metric helpers for `ddpframe`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) macros. With the
//! `metrics` feature disabled every helper compiles to nothing, so call sites
//! need no feature gates of their own.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "ddpframe_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "ddpframe_frames_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "ddpframe_errors_total";
/// Name of the gauge tracking live subscriptions across all connections.
pub const SUBSCRIPTIONS_ACTIVE: &str = "ddpframe_subscriptions_active";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames received from a client.
    Inbound,
    /// Frames sent to a client.
    Outbound,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an error occurrence, labelled by its source.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Increment the live subscriptions gauge.
pub fn inc_subscriptions() {
    #[cfg(feature = "metrics")]
    gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
}

/// Decrement the live subscriptions gauge.
pub fn dec_subscriptions() {
    #[cfg(feature = "metrics")]
    gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
}
