// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Call rate measurement with start/stop hysteresis.

use std::time::{Duration, Instant};

/// Outcome of a rate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Stay in the current state.
    Unchanged,
    /// The rate went above the start threshold while idle.
    StartTracking,
    /// The rate went below the stop threshold while tracking.
    StopTracking,
}

/// Measures the call rate over consecutive windows.
///
/// Each evaluation computes `delta_calls / elapsed` since the window start and
/// then restarts the window at the evaluation point, whatever the outcome.
#[derive(Debug, Clone)]
pub struct RateMonitor {
    check_interval: Duration,
    start_rate: f64,
    stop_rate: f64,
    window_start: Instant,
    window_count: u64,
}

impl RateMonitor {
    /// Creates a monitor whose first window starts at `now` with `count`
    /// calls already seen.
    pub fn new(
        check_interval: Duration,
        start_rate: f64,
        stop_rate: f64,
        now: Instant,
        count: u64,
    ) -> Self {
        RateMonitor {
            check_interval,
            start_rate,
            stop_rate,
            window_start: now,
            window_count: count,
        }
    }

    /// Creates a monitor from a tracker configuration.
    pub fn from_config(config: &crate::config::TrackerConfig, now: Instant, count: u64) -> Self {
        Self::new(
            config.check_interval,
            config.start_rate,
            config.stop_rate,
            now,
            count,
        )
    }

    /// Event-driven evaluation: only evaluates once more than the check
    /// interval has elapsed since the window start.
    pub fn poll(&mut self, now: Instant, count: u64, tracking: bool) -> RateDecision {
        if now.saturating_duration_since(self.window_start) > self.check_interval {
            self.evaluate(now, count, tracking)
        } else {
            RateDecision::Unchanged
        }
    }

    /// Timer-driven evaluation: evaluates unconditionally.
    pub fn evaluate(&mut self, now: Instant, count: u64, tracking: bool) -> RateDecision {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed.is_zero() {
            return RateDecision::Unchanged;
        }
        let rate = self.rate(elapsed, count);
        self.window_start = now;
        self.window_count = count;

        if !tracking && rate > self.start_rate {
            tracing::debug!(rate, threshold = self.start_rate, "call rate above start threshold");
            RateDecision::StartTracking
        } else if tracking && rate < self.stop_rate {
            tracing::debug!(rate, threshold = self.stop_rate, "call rate below stop threshold");
            RateDecision::StopTracking
        } else {
            RateDecision::Unchanged
        }
    }

    fn rate(&self, elapsed: Duration, count: u64) -> f64 {
        let delta = count.saturating_sub(self.window_count);
        delta as f64 / elapsed.as_secs_f64()
    }
}
