//! Per-protocol timeout and retry policy.
//!
//! Retry counts are exposed, never applied by the adapters: callers decide
//! whether to resubmit a timed-out command.

use std::time::Duration;

use crate::config::Protocol;

/// Upper bound accepted for the configured response timeout.
pub const MAX_RESPONSE_TIMEOUT_SECS: u32 = 30;

/// Timeout used when the configured value is 0 ("never").
pub const NEVER_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline of the first streaming call after `connect()`.
pub const FIRST_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Fixed retry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy;

impl RetryPolicy {
    /// Maximum number of resubmissions a caller should attempt after a timeout.
    pub const fn max_retries(protocol: Protocol) -> u32 {
        match protocol {
            // Unreliable short-range link: fail fast.
            Protocol::Ble => 0,
            Protocol::Http => 2,
            Protocol::Serial => 2,
        }
    }
}

/// Clamp a configured timeout into `[0, 30]` seconds and map 0 to [`NEVER_TIMEOUT`].
pub fn response_timeout(configured_secs: u32) -> Duration {
    match configured_secs.min(MAX_RESPONSE_TIMEOUT_SECS) {
        0 => NEVER_TIMEOUT,
        secs => Duration::from_secs(u64::from(secs)),
    }
}

/// Deadlines used by a streaming adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Deadline for every call once the link is warmed up.
    pub steady: Duration,
    /// Deadline for the first call after `connect()`, if the link uses one.
    pub first_call: Option<Duration>,
}

impl TimeoutPolicy {
    /// Build the policy for `protocol` with the already-clamped steady deadline.
    ///
    /// Only the serial link has an unknown device turn-around at connect time,
    /// so only it starts with the short deadline.
    pub fn for_protocol(protocol: Protocol, steady: Duration) -> Self {
        let first_call = match protocol {
            Protocol::Serial => Some(FIRST_CALL_TIMEOUT.min(steady)),
            Protocol::Http | Protocol::Ble => None,
        };
        Self { steady, first_call }
    }
}
