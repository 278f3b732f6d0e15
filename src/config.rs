//! Per-connection session settings.

use std::time::Duration;

use crate::push::{DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY, PushPolicy};

/// The only protocol version this server speaks.
pub const PROTOCOL_VERSION: &str = "1";

/// Timing and sizing knobs applied to every connection.
///
/// # Default Values
/// - `ping_period`: 54 seconds
/// - `pong_wait`: 60 seconds
/// - `write_wait`: 10 seconds
/// - `outbound_capacity`: 256 frames
/// - `max_message_size`: 512 bytes
/// - `push_policy`: [`PushPolicy::BlockIfFull`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Interval between server pings while the connection is idle.
    pub ping_period: Duration,
    /// How long to wait for the client's `pong` before giving up.
    pub pong_wait: Duration,
    /// Deadline for writing one frame to the transport.
    pub write_wait: Duration,
    /// Capacity of the outbound queue, in frames.
    pub outbound_capacity: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// What producers do when the outbound queue is full.
    pub push_policy: PushPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_size: 512,
            push_policy: PushPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Clamp values to usable bounds.
    ///
    /// Durations are at least one millisecond, the capacity lies within
    /// `1..=MAX_QUEUE_CAPACITY`, and the ping period is pulled below the pong
    /// wait so a healthy client always has a chance to answer.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use ddpframe::config::SessionConfig;
    ///
    /// let cfg = SessionConfig {
    ///     ping_period: Duration::from_secs(90),
    ///     pong_wait: Duration::from_secs(60),
    ///     outbound_capacity: 0,
    ///     ..SessionConfig::default()
    /// }
    /// .normalized();
    ///
    /// assert_eq!(cfg.ping_period, Duration::from_secs(54));
    /// assert_eq!(cfg.outbound_capacity, 1);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let floor = Duration::from_millis(1);
        self.pong_wait = self.pong_wait.max(floor);
        self.write_wait = self.write_wait.max(floor);
        self.ping_period = self.ping_period.max(floor);
        if self.ping_period >= self.pong_wait {
            self.ping_period = (self.pong_wait * 9 / 10).max(floor);
        }
        self.outbound_capacity = self.outbound_capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self.max_message_size = self.max_message_size.max(1);
        self
    }
}
