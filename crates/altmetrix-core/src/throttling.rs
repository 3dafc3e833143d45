//! Per-provider pacing.
//!
//! [`RateLimitState`] keeps one provider under an external quota without a
//! scheduler: after each outbound request the caller asks how long to wait
//! before the next one. The remaining quota is spread evenly over the rest
//! of the current window, so bursty callers settle into a steady rate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timestamp::now_epoch;

/// Quota settings from a provider's `rate_limit` config section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    #[serde(default = "default_period")]
    pub period: f64,
    /// Requests allowed per window.
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_throttled")]
    pub throttled: bool,
}

fn default_period() -> f64 {
    3600.0
}

fn default_limit() -> u32 {
    350
}

fn default_throttled() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            limit: default_limit(),
            throttled: default_throttled(),
        }
    }
}

/// Mutable pacing state owned by one provider instance. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitState {
    throttled: bool,
    time_fixture: Option<f64>,
    last_request_time: Option<f64>,
    rate_period: f64,
    /// Configured quota plus one, offsetting the pre-increment in
    /// [`RateLimitState::sleep_time_at`].
    rate_limit: i64,
    request_count: i64,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

impl RateLimitState {
    pub fn new(rate_period: f64, rate_limit: u32, throttled: bool) -> Self {
        Self {
            throttled,
            time_fixture: None,
            last_request_time: None,
            rate_period,
            rate_limit: i64::from(rate_limit) + 1,
            request_count: 0,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.period, config.limit, config.throttled)
    }

    pub fn unthrottled() -> Self {
        Self {
            throttled: false,
            ..Self::default()
        }
    }

    pub const fn throttled(&self) -> bool {
        self.throttled
    }

    pub const fn request_count(&self) -> i64 {
        self.request_count
    }

    pub const fn time_fixture(&self) -> Option<f64> {
        self.time_fixture
    }

    pub const fn last_request_time(&self) -> Option<f64> {
        self.last_request_time
    }

    /// Count a request that bypassed pacing.
    pub fn register_unthrottled_hit(&mut self) {
        self.request_count += 1;
    }

    /// Pause recommended after a request made just now.
    pub fn sleep_time(&mut self) -> Duration {
        let seconds = self.sleep_time_at(now_epoch());
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Pause, in seconds, recommended after a request made at `now`.
    pub fn sleep_time_at(&mut self, now: f64) -> f64 {
        if !self.throttled {
            return 0.0;
        }

        // The caller accounts for a request it has already made.
        self.request_count += 1;

        // The first request opens the window and is never paced.
        let Some(time_fixture) = self.time_fixture.filter(|_| self.last_request_time.is_some())
        else {
            self.time_fixture = Some(now);
            self.last_request_time = Some(now);
            return 0.0;
        };

        let window_end = time_fixture + self.rate_period;
        if now >= window_end {
            self.time_fixture = Some(now);
            self.last_request_time = Some(now);
            self.request_count = 1;
            return 0.0;
        }

        let remaining_requests = self.rate_limit - self.request_count;
        let remaining_time = window_end - now;
        self.last_request_time = Some(now);

        if remaining_requests <= 0 {
            remaining_time
        } else {
            remaining_time / remaining_requests as f64
        }
    }
}
