//! Retry policies for transient transport failures.
//!
//! Policies are configured per error kind (`timeout`, `http_error`) in each
//! provider's `errors` section. Delays are expressed in seconds; a
//! `delay_cap` of `-1` means uncapped and `retries` of `-1` means retry
//! forever.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay growth strategy between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryType {
    /// The same delay every time.
    #[default]
    Linear,
    /// `delay * 2^(attempt-1)`.
    IncrementalBackOff,
}

/// Retry configuration for one error kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    #[serde(default)]
    pub retries: i64,
    #[serde(default)]
    pub retry_delay: f64,
    #[serde(default = "uncapped")]
    pub delay_cap: f64,
    #[serde(default)]
    pub retry_type: RetryType,
}

fn uncapped() -> f64 {
    -1.0
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay: 0.0,
            delay_cap: uncapped(),
            retry_type: RetryType::Linear,
        }
    }
}

/// Error-kind name to policy, as found under a provider's `errors` key.
pub type ErrorPolicies = BTreeMap<String, ErrorPolicy>;

impl ErrorPolicy {
    pub fn linear(retries: i64, retry_delay: f64, delay_cap: f64) -> Self {
        Self {
            retries,
            retry_delay,
            delay_cap,
            retry_type: RetryType::Linear,
        }
    }

    pub fn incremental(retries: i64, retry_delay: f64, delay_cap: f64) -> Self {
        Self {
            retry_type: RetryType::IncrementalBackOff,
            ..Self::linear(retries, retry_delay, delay_cap)
        }
    }

    /// Whether another attempt is allowed after `retries_done` retries.
    pub fn allows_retry(&self, retries_done: u32) -> bool {
        match self.retries {
            -1 => true,
            retries if retries > 0 => retries > i64::from(retries_done),
            _ => false,
        }
    }

    /// Seconds to wait before the given 1-based retry attempt.
    pub fn wait_seconds(&self, attempt: u32) -> f64 {
        match self.retry_type {
            RetryType::Linear => linear_delay(self.retry_delay, self.delay_cap),
            RetryType::IncrementalBackOff => {
                incremental_back_off(self.retry_delay, self.delay_cap, attempt)
            }
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::try_from_secs_f64(self.wait_seconds(attempt).max(0.0)).unwrap_or(Duration::MAX)
    }
}

fn is_uncapped(delay_cap: f64) -> bool {
    delay_cap < 0.0
}

/// `delay`, unless a cap is set and `delay` reaches it.
pub fn linear_delay(delay: f64, delay_cap: f64) -> f64 {
    if is_uncapped(delay_cap) || delay < delay_cap {
        delay
    } else {
        delay_cap
    }
}

/// `delay * 2^(attempt-1)`, clamped to `delay_cap` when one is set.
pub fn incremental_back_off(delay: f64, delay_cap: f64, attempt: u32) -> f64 {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let proposed = delay * 2_f64.powi(exponent);
    if is_uncapped(delay_cap) {
        proposed
    } else {
        proposed.min(delay_cap)
    }
}
