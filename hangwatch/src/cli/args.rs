//! CLI argument definitions

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::WatchdogConfig;

/// Which scheduler drives the monitored (main) thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scheduler {
    /// Channel-driven run loop
    Runloop,
    /// Current-thread Tokio runtime
    Tokio,
}

#[derive(Parser, Debug)]
#[command(
    name = "hangwatch",
    about = "Run a synthetic workload on the main thread and report its hangs",
    after_help = "\
EXAMPLES:
    hangwatch                                 Run loop, a 400ms hang every 5th job
    hangwatch --scheduler tokio --jobs 50     Same workload on a Tokio runtime
    hangwatch --export hangs.json             Also write a Chrome trace
    RUST_LOG=debug hangwatch                  Show formatted stack traces"
)]
pub struct Args {
    /// Scheduler running the workload
    #[arg(long, value_enum, default_value = "runloop")]
    pub scheduler: Scheduler,

    /// Number of jobs to run
    #[arg(long, default_value = "20")]
    pub jobs: u32,

    /// Every Nth job hangs (0 = never)
    #[arg(long, default_value = "5")]
    pub hang_every: u32,

    /// How long a hanging job blocks, in milliseconds
    #[arg(long, default_value = "400")]
    pub hang_ms: u64,

    /// How long an ordinary job works, in milliseconds
    #[arg(long, default_value = "5")]
    pub work_ms: u64,

    /// Export hang records to a Chrome trace file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Watchdog configuration file (JSON); flags below override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Minimum busy duration reported as a hang, in milliseconds
    #[arg(long)]
    pub threshold_ms: Option<u64>,

    /// Background poll interval, in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Fraction of the threshold after which a snapshot is captured
    #[arg(long)]
    pub prediction_ratio: Option<f64>,

    /// Report hangs without capturing thread snapshots
    #[arg(long)]
    pub no_snapshot: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Build the watchdog configuration: defaults, then the config file,
    /// then individual flags
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or parsed, or the
    /// result is invalid
    pub fn watchdog_config(&self) -> Result<WatchdogConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                WatchdogConfig::from_json_str(&json)
                    .with_context(|| format!("Invalid config: {}", path.display()))?
            }
            None => WatchdogConfig::default(),
        };

        if let Some(ms) = self.threshold_ms {
            config = config.with_hang_threshold(Duration::from_millis(ms));
        }
        if let Some(ms) = self.poll_ms {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(ratio) = self.prediction_ratio {
            config = config.with_prediction_ratio(ratio);
        }

        config.validate().context("Invalid watchdog configuration")?;
        Ok(config)
    }

    /// Whether job number `n` (1-based) is a hanging one
    #[must_use]
    pub fn is_hang_job(&self, n: u32) -> bool {
        self.hang_every != 0 && n % self.hang_every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("hangwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.scheduler, Scheduler::Runloop);
        assert_eq!(args.jobs, 20);
        assert!(args.is_hang_job(5));
        assert!(!args.is_hang_job(4));
        assert_eq!(args.watchdog_config().unwrap(), WatchdogConfig::default());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "hang_threshold_ms": 500, "poll_interval_ms": 20 }}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let args = parse(&["--config", path, "--threshold-ms", "300"]);
        let config = args.watchdog_config().unwrap();
        assert_eq!(config.hang_threshold, Duration::from_millis(300));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = parse(&["--prediction-ratio", "1.5"]);
        assert!(args.watchdog_config().is_err());
    }

    #[test]
    fn test_hang_every_zero_never_hangs() {
        let args = parse(&["--hang-every", "0", "--scheduler", "tokio"]);
        assert_eq!(args.scheduler, Scheduler::Tokio);
        assert!(!args.is_hang_job(10));
    }

    #[test]
    fn test_unknown_scheduler_rejected() {
        assert!(Args::try_parse_from(["hangwatch", "--scheduler", "gtk"]).is_err());
    }
}
