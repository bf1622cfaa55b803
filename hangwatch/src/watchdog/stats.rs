use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the watchdog counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogStats {
    /// Busy periods observed
    pub episodes_opened: u64,
    /// Busy periods that crossed the threshold and were queued for reporting
    pub hangs_detected: u64,
    /// Busy periods that ended below the threshold
    pub short_episodes: u64,
    /// Records written to the sink
    pub reports_emitted: u64,
    pub captures_attempted: u64,
    pub captures_succeeded: u64,
    pub captures_failed: u64,
    /// Snapshots that finished after their episode had closed
    pub stale_snapshots_dropped: u64,
    /// Busy while busy, or idle while idle
    pub duplicate_signals: u64,
}

impl fmt::Display for WatchdogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "episodes={} hangs={} reported={} captures={}/{} (failed {}, stale {}) duplicates={}",
            self.episodes_opened,
            self.hangs_detected,
            self.reports_emitted,
            self.captures_succeeded,
            self.captures_attempted,
            self.captures_failed,
            self.stale_snapshots_dropped,
            self.duplicate_signals,
        )
    }
}

/// Live counters, bumped with relaxed atomics from either thread
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) episodes_opened: AtomicU64,
    pub(crate) hangs_detected: AtomicU64,
    pub(crate) short_episodes: AtomicU64,
    pub(crate) reports_emitted: AtomicU64,
    pub(crate) captures_attempted: AtomicU64,
    pub(crate) captures_succeeded: AtomicU64,
    pub(crate) captures_failed: AtomicU64,
    pub(crate) stale_snapshots_dropped: AtomicU64,
    pub(crate) duplicate_signals: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> WatchdogStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        WatchdogStats {
            episodes_opened: load(&self.episodes_opened),
            hangs_detected: load(&self.hangs_detected),
            short_episodes: load(&self.short_episodes),
            reports_emitted: load(&self.reports_emitted),
            captures_attempted: load(&self.captures_attempted),
            captures_succeeded: load(&self.captures_succeeded),
            captures_failed: load(&self.captures_failed),
            stale_snapshots_dropped: load(&self.stale_snapshots_dropped),
            duplicate_signals: load(&self.duplicate_signals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = Counters::default();
        Counters::bump(&counters.episodes_opened);
        Counters::bump(&counters.episodes_opened);
        Counters::bump(&counters.captures_attempted);

        let stats = counters.snapshot();
        assert_eq!(stats.episodes_opened, 2);
        assert_eq!(stats.captures_attempted, 1);
        assert_eq!(stats.hangs_detected, 0);
        assert!(stats.to_string().starts_with("episodes=2 hangs=0"));
    }
}
