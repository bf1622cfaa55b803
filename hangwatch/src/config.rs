//! Watchdog configuration
//!
//! All knobs are optional; the defaults match what a mobile UI thread
//! tolerates before users perceive a stall (250 ms), capture kicks in at two
//! thirds of that, and the background poller samples every 100 ms.
//!
//! ## JSON form
//!
//! ```json
//! { "hang_threshold_ms": 250, "prediction_ratio": 0.667,
//!   "poll_interval_ms": 100, "max_stacktrace_length": 10000 }
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::domain::ConfigError;

/// Default minimum busy duration classified as a hang
pub const DEFAULT_HANG_THRESHOLD: Duration = Duration::from_millis(250);

/// Default fraction of the hang threshold after which capture is attempted
pub const DEFAULT_PREDICTION_RATIO: f64 = 2.0 / 3.0;

/// Default background sampling cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default upper bound on formatted stack trace length, in characters
pub const DEFAULT_MAX_STACKTRACE_LENGTH: usize = 10_000;

/// Detection policy parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogConfig {
    /// Minimum busy duration reported as a hang
    pub hang_threshold: Duration,
    /// Fraction of `hang_threshold` after which the poller captures a snapshot
    pub prediction_ratio: f64,
    /// Background poll cadence
    pub poll_interval: Duration,
    /// Formatted stack traces are truncated to this many characters
    pub max_stacktrace_length: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            hang_threshold: DEFAULT_HANG_THRESHOLD,
            prediction_ratio: DEFAULT_PREDICTION_RATIO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_stacktrace_length: DEFAULT_MAX_STACKTRACE_LENGTH,
        }
    }
}

impl WatchdogConfig {
    #[must_use]
    pub fn with_hang_threshold(mut self, threshold: Duration) -> Self {
        self.hang_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_prediction_ratio(mut self, ratio: f64) -> Self {
        self.prediction_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_stacktrace_length(mut self, max: usize) -> Self {
        self.max_stacktrace_length = max;
        self
    }

    /// Busy duration after which the poller attempts a snapshot
    #[must_use]
    pub fn prediction_threshold(&self) -> Duration {
        self.hang_threshold.mul_f64(self.prediction_ratio)
    }

    /// Check every parameter is usable
    ///
    /// # Errors
    /// Returns the first invalid parameter found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hang_threshold.is_zero() {
            return Err(ConfigError::ZeroHangThreshold);
        }
        if !self.prediction_ratio.is_finite()
            || self.prediction_ratio <= 0.0
            || self.prediction_ratio > 1.0
        {
            return Err(ConfigError::InvalidPredictionRatio(self.prediction_ratio));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_stacktrace_length == 0 {
            return Err(ConfigError::ZeroStackTraceLength);
        }
        Ok(())
    }

    /// Parse and validate the JSON form; missing fields take their defaults
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or a value is invalid
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;
        let config = WatchdogConfig::from(raw);
        config.validate()?;
        Ok(config)
    }
}

/// On-disk representation (durations in milliseconds)
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    hang_threshold_ms: u64,
    prediction_ratio: f64,
    poll_interval_ms: u64,
    max_stacktrace_length: usize,
}

impl Default for RawConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            hang_threshold_ms: DEFAULT_HANG_THRESHOLD.as_millis() as u64,
            prediction_ratio: DEFAULT_PREDICTION_RATIO,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_stacktrace_length: DEFAULT_MAX_STACKTRACE_LENGTH,
        }
    }
}

impl From<RawConfig> for WatchdogConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            hang_threshold: Duration::from_millis(raw.hang_threshold_ms),
            prediction_ratio: raw.prediction_ratio,
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            max_stacktrace_length: raw.max_stacktrace_length,
        }
    }
}
