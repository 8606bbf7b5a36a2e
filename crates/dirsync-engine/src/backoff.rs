//! Failure backoff and auto-disable policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dirsync_db::models::BridgeState;

/// Largest exponent applied; `2^62` still fits in an `i64`.
const MAX_EXPONENT: u32 = 62;

/// Decides how long a failing bridge waits and when it is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    ceiling: Duration,
    max_consecutive_failures: u32,
}

/// Result of applying the policy to one more failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTransition {
    /// `Failed` or `Disabled`.
    pub state: BridgeState,
    pub consecutive_failures: i32,
    /// `None` when disabled.
    pub next_sync_at: Option<DateTime<Utc>>,
}

impl BackoffPolicy {
    /// A ceiling below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, ceiling: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            max_consecutive_failures,
        }
    }

    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    #[must_use]
    pub fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
    }

    /// Delay after `failures` consecutive failures.
    ///
    /// `base * 2^min(failures, 62)` in signed 64-bit milliseconds, clamped to
    /// `[base, ceiling]`. Overflow clamps to the ceiling.
    #[must_use]
    pub fn backoff(&self, failures: i32) -> Duration {
        let base_ms = millis(self.base);
        let ceiling_ms = millis(self.ceiling);

        if failures <= 0 {
            return Duration::from_millis(base_ms.unsigned_abs());
        }

        let exponent = failures.unsigned_abs().min(MAX_EXPONENT);
        let factor = 1i64 << exponent;

        let delay_ms = match base_ms.checked_mul(factor) {
            Some(product) if product >= base_ms && product > 0 => product.min(ceiling_ms),
            _ => ceiling_ms,
        };
        Duration::from_millis(delay_ms.unsigned_abs())
    }

    /// True once `failures` reaches the configured cap.
    #[must_use]
    pub fn should_disable(&self, failures: i32) -> bool {
        i64::from(failures) >= i64::from(self.max_consecutive_failures)
    }

    /// Apply one more failure to a bridge that had `previous_failures`.
    #[must_use]
    pub fn failure_transition(&self, previous_failures: i32, now: DateTime<Utc>) -> FailureTransition {
        let consecutive_failures = previous_failures.max(0).saturating_add(1);

        if self.should_disable(consecutive_failures) {
            return FailureTransition {
                state: BridgeState::Disabled,
                consecutive_failures,
                next_sync_at: None,
            };
        }

        FailureTransition {
            state: BridgeState::Failed,
            consecutive_failures,
            next_sync_at: Some(add_clamped(now, self.backoff(consecutive_failures))),
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// `now + delay`, saturating at the latest representable instant.
#[must_use]
pub fn add_clamped(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
