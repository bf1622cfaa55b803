//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a TID where a
//! PID is expected, or mixing nanosecond timestamps with millisecond counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid(pub u32);

impl Pid {
    /// PID of the running process
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    #[allow(clippy::cast_sign_loss)]
    fn from(pid: i32) -> Self {
        Pid(pid as u32)
    }
}

/// Thread ID
///
/// Kernel thread id (what `gettid()` returns), not `std::thread::ThreadId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tid(pub u32);

impl Tid {
    /// Kernel thread id of the calling thread
    #[cfg(target_os = "linux")]
    #[must_use]
    #[allow(unsafe_code, clippy::cast_sign_loss)]
    pub fn current() -> Self {
        // SAFETY: gettid has no preconditions and cannot fail
        Tid(unsafe { libc::gettid() } as u32)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Hang episode identifier
///
/// Monotonically increasing per watchdog instance, starting at 1. Lets a
/// snapshot be matched to the episode it was captured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeId(pub u64);

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "episode#{}", self.0)
    }
}

/// Timestamp in nanoseconds
///
/// Represents an absolute point in time as nanoseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Build a timestamp from a duration since the epoch (saturates at `u64::MAX` ns)
    #[must_use]
    pub fn from_duration(since_epoch: Duration) -> Self {
        Timestamp(u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Timestamp shifted forward by `delta`
    #[must_use]
    pub fn saturating_add(self, delta: Duration) -> Self {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(delta))
    }

    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (u64)
    #[must_use]
    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Convert to milliseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_conversion() {
        let pid = Pid::from(1234i32);
        assert_eq!(pid.0, 1234);
        assert_eq!(pid.to_string(), "PID:1234");
    }

    #[test]
    fn test_timestamp_conversions() {
        let ts = Timestamp(1_500_000_000); // 1.5 seconds
        assert!((ts.as_seconds() - 1.5).abs() < f64::EPSILON);
        assert!((ts.as_millis() - 1500.0).abs() < f64::EPSILON);
        assert_eq!(ts.as_micros(), 1_500_000);
    }

    #[test]
    fn test_timestamp_arithmetic_saturates() {
        let earlier = Timestamp(1_000);
        let later = Timestamp(5_000);
        assert_eq!(later.saturating_duration_since(earlier), Duration::from_nanos(4_000));
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
        assert_eq!(Timestamp(u64::MAX).saturating_add(Duration::from_secs(1)), Timestamp(u64::MAX));
    }

    #[test]
    fn test_episode_id_ordering() {
        assert!(EpisodeId(1) < EpisodeId(2));
        assert_eq!(EpisodeId(7).to_string(), "episode#7");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_tid_differs_across_threads() {
        let main_tid = Tid::current();
        let other = std::thread::spawn(Tid::current).join().unwrap();
        assert_ne!(main_tid, other);
    }
}
