//! Domain logic for connection lifecycle decisions.
//!
//! This module contains pure functions that implement the reconnection
//! policy without side effects, making them easy to test.

use std::time::Duration;

use crate::{config::ReconnectPolicy, domain::transport::NORMAL_CLOSURE};

/// Check if a close was a normal closure.
///
/// A missing close code counts as abnormal (the stream dropped without a
/// close frame).
pub fn is_normal_close(code: Option<u16>) -> bool {
    code == Some(NORMAL_CLOSURE)
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `attempt` - The reconnection attempt about to be made (1-indexed)
/// * `max_attempts` - The maximum number of attempts, `None` for unbounded
///
/// # Returns
///
/// `true` if reconnection should be attempted, `false` otherwise
pub fn should_attempt_reconnect(attempt: u32, max_attempts: Option<u32>) -> bool {
    max_attempts.is_none_or(|max| attempt <= max)
}

/// Delay before the given reconnection attempt.
///
/// Doubles from `base_delay` on every attempt and never exceeds `max_delay`.
pub fn reconnect_delay(attempt: u32, policy: &ReconnectPolicy) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    policy
        .base_delay
        .saturating_mul(1u32 << exponent)
        .min(policy.max_delay)
}
