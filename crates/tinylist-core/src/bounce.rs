//! Exponential bounce backoff.
//!
//! After `n >= 2` bounces a subscriber is skipped for `2^(n-2)` bounce
//! intervals counted from the last bounce. A bounce arriving after the
//! previous one has gone stale restarts the count.

use crate::list::Subscription;
use chrono::{DateTime, TimeDelta, Utc};

/// Days in one bounce interval.
pub const BOUNCE_INTERVAL_DAYS: i64 = 7;

/// Counter value that keeps a subscriber suppressed indefinitely.
pub const MAX_BOUNCES: u16 = u16::MAX;

/// `2^exponent` bounce intervals, or `None` when that does not fit a `TimeDelta`.
fn intervals(exponent: u16) -> Option<TimeDelta> {
    2_i64
        .checked_pow(u32::from(exponent))
        .and_then(|factor| factor.checked_mul(BOUNCE_INTERVAL_DAYS))
        .and_then(TimeDelta::try_days)
}

/// How long a subscriber with `bounces` bounces is skipped.
///
/// Returns `None` for an unbounded window.
#[must_use]
pub fn suppression_window(bounces: u16) -> Option<TimeDelta> {
    if bounces < 2 {
        return Some(TimeDelta::zero());
    }
    intervals(bounces - 2)
}

/// Checks whether delivery to this subscriber should be skipped at `now`.
#[must_use]
pub fn is_suppressed(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    suppression_window(subscription.bounces)
        .and_then(|window| subscription.last_bounce.checked_add_signed(window))
        .is_none_or(|until| now < until)
}

/// Computes the counter and timestamp after a new bounce at `now`.
#[must_use]
pub fn record_bounce(subscription: &Subscription, now: DateTime<Utc>) -> (u16, DateTime<Utc>) {
    let mut bounces = subscription.bounces;

    if bounces > 0 {
        let stale = intervals(bounces - 1)
            .and_then(|period| subscription.last_bounce.checked_add_signed(period))
            .is_some_and(|counted_until| now > counted_until);
        if stale {
            bounces = 0;
        }
    }

    (bounces.saturating_add(1), now)
}
