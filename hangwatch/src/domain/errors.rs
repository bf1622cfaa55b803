//! Structured error types for hangwatch
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! None of these cross the monitored thread: they surface from setup-time
//! calls (starting the watchdog, registering with a scheduler, parsing
//! configuration, exporting traces) or stay inside the reporter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("An idle/busy observer is already registered with this scheduler")]
    AlreadyRegistered,

    #[error("Idle/busy registration unavailable: {0}")]
    RegistrationUnavailable(String),

    #[error("Failed to spawn watchdog thread: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Hang threshold must be greater than zero")]
    ZeroHangThreshold,

    #[error("Prediction ratio must be in (0, 1], got {0}")]
    InvalidPredictionRatio(f64),

    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("Maximum stack trace length must be greater than zero")]
    ZeroStackTraceLength,

    #[error("Failed to parse watchdog config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot is empty")]
    Empty,

    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidPredictionRatio(1.5);
        assert_eq!(err.to_string(), "Prediction ratio must be in (0, 1], got 1.5");
    }

    #[test]
    fn test_config_error_wraps_into_watchdog_error() {
        let err: WatchdogError = ConfigError::ZeroPollInterval.into();
        assert!(err.to_string().contains("Poll interval"));
    }

    #[test]
    fn test_snapshot_decode_error_message() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"not json").unwrap_err();
        let err = SnapshotError::from(json_err);
        assert!(!err.to_string().is_empty());
    }
}
