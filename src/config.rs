// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tracker configuration.

use std::time::Duration;

use thiserror::Error;

const DEFAULT_START_RATE: f64 = 5000.0;
const DEFAULT_STOP_RATE: f64 = 4000.0;
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_CAPTURE_MODULUS: u64 = 1000;
const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DEPTH: usize = 64;
const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Decides which calls capture a stack while tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    /// Capture at most once per interval of wall-clock time.
    Interval(Duration),
    /// Capture every Nth call since tracking started.
    Modulus(u64),
}

impl SamplingPolicy {
    /// The time-based policy with its default spacing of 200ms.
    pub fn default_interval() -> Self {
        SamplingPolicy::Interval(DEFAULT_CAPTURE_INTERVAL)
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::Modulus(DEFAULT_CAPTURE_MODULUS)
    }
}

/// Errors returned when a [`TrackerConfigBuilder`] holds an invalid combination.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The start rate must be a finite number above zero.
    #[error("start rate must be finite and > 0, got {0}")]
    InvalidStartRate(f64),
    /// The stop rate must be a finite, non-negative number.
    #[error("stop rate must be finite and >= 0, got {0}")]
    InvalidStopRate(f64),
    /// The thresholds leave no hysteresis band.
    #[error("stop rate ({stop}) must be below start rate ({start})")]
    NoHysteresis {
        /// configured start rate
        start: f64,
        /// configured stop rate
        stop: f64,
    },
    /// A zero check interval would evaluate the rate on every call.
    #[error("check interval must be non-zero")]
    ZeroCheckInterval,
    /// A zero report interval would report continuously.
    #[error("report interval must be non-zero")]
    ZeroReportInterval,
    /// Both a capture interval and a capture modulus were set.
    #[error("capture interval and capture modulus are mutually exclusive")]
    ConflictingSampling,
    /// Neither a capture interval nor a capture modulus was set.
    #[error("one of capture interval or capture modulus is required")]
    MissingSampling,
    /// A capture modulus of zero.
    #[error("capture modulus must be > 0")]
    ZeroCaptureModulus,
    /// A capture interval of zero.
    #[error("capture interval must be non-zero")]
    ZeroCaptureInterval,
    /// A stack depth of zero would only ever capture empty traces.
    #[error("max stack depth must be > 0")]
    ZeroMaxDepth,
    /// The trace queue needs room for at least one capture.
    #[error("queue capacity must be > 0")]
    ZeroQueueCapacity,
}

/// Validated, immutable tracker configuration.
///
/// Build one with [`TrackerConfig::builder`], or use [`TrackerConfig::default`]
/// for the stock thresholds: start at 5000 calls/s, stop below 4000 calls/s,
/// check every 5s, report every 15s and capture every 1000th call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub(crate) check_interval: Duration,
    pub(crate) start_rate: f64,
    pub(crate) stop_rate: f64,
    pub(crate) report_interval: Duration,
    pub(crate) sampling: SamplingPolicy,
    pub(crate) max_depth: usize,
    pub(crate) queue_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            check_interval: DEFAULT_CHECK_INTERVAL,
            start_rate: DEFAULT_START_RATE,
            stop_rate: DEFAULT_STOP_RATE,
            report_interval: DEFAULT_REPORT_INTERVAL,
            sampling: SamplingPolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// How often the call rate is evaluated.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Calls per second above which tracking starts.
    pub fn start_rate(&self) -> f64 {
        self.start_rate
    }

    /// Calls per second below which tracking stops.
    pub fn stop_rate(&self) -> f64 {
        self.stop_rate
    }

    /// How often a report is emitted while tracking.
    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }

    /// The active sampling policy.
    pub fn sampling(&self) -> SamplingPolicy {
        self.sampling
    }

    /// Maximum number of frames recorded per trace.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Capacity of the trace queue in the concurrent model.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

/// Builds a [`TrackerConfig`].
///
/// Unset settings fall back to their defaults. At most one of
/// [`with_capture_interval`] and [`with_capture_modulus`] may be set; with
/// neither, the default modulus applies unless [`with_default_sampling`]
/// turned that off.
///
/// [`with_capture_interval`]: TrackerConfigBuilder::with_capture_interval
/// [`with_capture_modulus`]: TrackerConfigBuilder::with_capture_modulus
/// [`with_default_sampling`]: TrackerConfigBuilder::with_default_sampling
#[derive(Debug, Clone)]
pub struct TrackerConfigBuilder {
    check_interval: Option<Duration>,
    start_rate: Option<f64>,
    stop_rate: Option<f64>,
    report_interval: Option<Duration>,
    capture_interval: Option<Duration>,
    capture_modulus: Option<u64>,
    default_sampling: bool,
    max_depth: Option<usize>,
    queue_capacity: Option<usize>,
}

impl Default for TrackerConfigBuilder {
    fn default() -> Self {
        TrackerConfigBuilder {
            check_interval: None,
            start_rate: None,
            stop_rate: None,
            report_interval: None,
            capture_interval: None,
            capture_modulus: None,
            default_sampling: true,
            max_depth: None,
            queue_capacity: None,
        }
    }
}

impl TrackerConfigBuilder {
    /// Sets the rate evaluation interval.
    pub fn with_check_interval(mut self, i: Duration) -> Self {
        self.check_interval = Some(i);
        self
    }

    /// Sets the rate (calls/s) above which tracking starts.
    pub fn with_start_rate(mut self, rate: f64) -> Self {
        self.start_rate = Some(rate);
        self
    }

    /// Sets the rate (calls/s) below which tracking stops.
    pub fn with_stop_rate(mut self, rate: f64) -> Self {
        self.stop_rate = Some(rate);
        self
    }

    /// Sets the reporting interval.
    pub fn with_report_interval(mut self, i: Duration) -> Self {
        self.report_interval = Some(i);
        self
    }

    /// Capture at most once per `i` of wall-clock time.
    pub fn with_capture_interval(mut self, i: Duration) -> Self {
        self.capture_interval = Some(i);
        self
    }

    /// Capture every `n`th call while tracking.
    pub fn with_capture_modulus(mut self, n: u64) -> Self {
        self.capture_modulus = Some(n);
        self
    }

    /// Whether to fall back to the default modulus when no sampling policy
    /// is given. When disabled, `build` fails with
    /// [`ConfigError::MissingSampling`] instead.
    pub fn with_default_sampling(mut self, enabled: bool) -> Self {
        self.default_sampling = enabled;
        self
    }

    /// Sets the maximum number of frames per trace.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Sets the capacity of the trace queue used by the concurrent model.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<TrackerConfig, ConfigError> {
        let start_rate = self.start_rate.unwrap_or(DEFAULT_START_RATE);
        let stop_rate = self.stop_rate.unwrap_or(DEFAULT_STOP_RATE);
        if !start_rate.is_finite() || start_rate <= 0.0 {
            return Err(ConfigError::InvalidStartRate(start_rate));
        }
        if !stop_rate.is_finite() || stop_rate < 0.0 {
            return Err(ConfigError::InvalidStopRate(stop_rate));
        }
        if stop_rate >= start_rate {
            return Err(ConfigError::NoHysteresis {
                start: start_rate,
                stop: stop_rate,
            });
        }

        let check_interval = self.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL);
        if check_interval.is_zero() {
            return Err(ConfigError::ZeroCheckInterval);
        }
        let report_interval = self.report_interval.unwrap_or(DEFAULT_REPORT_INTERVAL);
        if report_interval.is_zero() {
            return Err(ConfigError::ZeroReportInterval);
        }

        let sampling = match (self.capture_interval, self.capture_modulus) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSampling),
            (Some(i), None) if i.is_zero() => return Err(ConfigError::ZeroCaptureInterval),
            (Some(i), None) => SamplingPolicy::Interval(i),
            (None, Some(0)) => return Err(ConfigError::ZeroCaptureModulus),
            (None, Some(n)) => SamplingPolicy::Modulus(n),
            (None, None) if self.default_sampling => SamplingPolicy::default(),
            (None, None) => return Err(ConfigError::MissingSampling),
        };

        let max_depth = self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        if max_depth == 0 {
            return Err(ConfigError::ZeroMaxDepth);
        }
        let queue_capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        Ok(TrackerConfig {
            check_interval,
            start_rate,
            stop_rate,
            report_interval,
            sampling,
            max_depth,
            queue_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::builder().build().unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.start_rate(), 5000.0);
        assert_eq!(config.stop_rate(), 4000.0);
        assert_eq!(config.check_interval(), Duration::from_secs(5));
        assert_eq!(config.report_interval(), Duration::from_secs(15));
        assert_eq!(config.sampling(), SamplingPolicy::Modulus(1000));
        assert_eq!(
            SamplingPolicy::default_interval(),
            SamplingPolicy::Interval(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_interval_policy() {
        let config = TrackerConfig::builder()
            .with_capture_interval(Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(
            config.sampling(),
            SamplingPolicy::Interval(Duration::from_millis(50))
        );
    }

    #[test_case(TrackerConfig::builder().with_start_rate(0.0), ConfigError::InvalidStartRate(0.0); "zero start")]
    #[test_case(TrackerConfig::builder().with_stop_rate(-1.0), ConfigError::InvalidStopRate(-1.0); "negative stop")]
    #[test_case(TrackerConfig::builder().with_start_rate(100.0).with_stop_rate(100.0),
        ConfigError::NoHysteresis { start: 100.0, stop: 100.0 }; "equal rates")]
    #[test_case(TrackerConfig::builder().with_stop_rate(6000.0),
        ConfigError::NoHysteresis { start: 5000.0, stop: 6000.0 }; "stop above start")]
    #[test_case(TrackerConfig::builder().with_check_interval(Duration::ZERO), ConfigError::ZeroCheckInterval; "zero check")]
    #[test_case(TrackerConfig::builder().with_report_interval(Duration::ZERO), ConfigError::ZeroReportInterval; "zero report")]
    #[test_case(TrackerConfig::builder().with_capture_modulus(3).with_capture_interval(Duration::from_millis(1)),
        ConfigError::ConflictingSampling; "both policies")]
    #[test_case(TrackerConfig::builder().with_default_sampling(false), ConfigError::MissingSampling; "neither policy")]
    #[test_case(TrackerConfig::builder().with_capture_modulus(0), ConfigError::ZeroCaptureModulus; "zero modulus")]
    #[test_case(TrackerConfig::builder().with_capture_interval(Duration::ZERO), ConfigError::ZeroCaptureInterval; "zero capture interval")]
    #[test_case(TrackerConfig::builder().with_max_depth(0), ConfigError::ZeroMaxDepth; "zero depth")]
    #[test_case(TrackerConfig::builder().with_queue_capacity(0), ConfigError::ZeroQueueCapacity; "zero queue")]
    fn test_invalid(builder: TrackerConfigBuilder, expected: ConfigError) {
        assert_eq!(builder.build().unwrap_err(), expected);
    }

    #[test]
    fn test_nan_rate_rejected() {
        assert!(matches!(
            TrackerConfig::builder().with_start_rate(f64::NAN).build(),
            Err(ConfigError::InvalidStartRate(_))
        ));
    }
}
