//! # Thread Snapshots
//!
//! A [`SnapshotProvider`] captures "what every thread is doing right now" as
//! an opaque blob while a hang is still in progress, and later turns that
//! blob into a message and a stack trace text for the hang record.
//!
//! Capture and formatting are split on purpose: capture must happen while
//! the monitored thread is still stuck, formatting can wait until the hang
//! is over and runs off the monitored thread.
//!
//! ## Providers
//!
//! - [`ProcSnapshotProvider`]: Linux, reads `/proc/self/task/*`
//! - [`NoopSnapshotProvider`]: platforms without snapshot support

#[cfg(target_os = "linux")]
pub mod proc_provider;
#[cfg(target_os = "linux")]
pub mod threads;

#[cfg(target_os = "linux")]
pub use proc_provider::{ProcSnapshotProvider, ProcessSnapshot};

use crate::config::DEFAULT_MAX_STACKTRACE_LENGTH;
use crate::domain::SnapshotError;

/// Opaque diagnostic blob produced by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Vec<u8>);

impl Snapshot {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Human-readable rendering of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedSnapshot {
    pub message: String,
    pub stacktrace: String,
}

/// Captures and formats thread snapshots
///
/// Implementations must be callable from any thread and must not block for
/// unbounded time. Capture failures are reported as `None`.
pub trait SnapshotProvider: Send + Sync {
    /// Snapshot every thread of the process, or `None` on failure
    fn capture_snapshot(&self) -> Option<Snapshot>;

    /// Render a snapshot produced by this provider
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be decoded
    fn format(&self, snapshot: &Snapshot) -> Result<FormattedSnapshot, SnapshotError>;

    /// Upper bound on the length of the formatted stack trace, in characters
    fn max_stacktrace_length(&self) -> usize;
}

/// Provider for platforms where snapshots are unavailable
#[derive(Debug, Clone, Copy)]
pub struct NoopSnapshotProvider {
    max_stacktrace_length: usize,
}

impl NoopSnapshotProvider {
    #[must_use]
    pub fn new(max_stacktrace_length: usize) -> Self {
        Self { max_stacktrace_length }
    }
}

impl Default for NoopSnapshotProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STACKTRACE_LENGTH)
    }
}

impl SnapshotProvider for NoopSnapshotProvider {
    fn capture_snapshot(&self) -> Option<Snapshot> {
        None
    }

    fn format(&self, _snapshot: &Snapshot) -> Result<FormattedSnapshot, SnapshotError> {
        Ok(FormattedSnapshot {
            message: "Stack trace collection not available".to_string(),
            stacktrace: "Stack trace collection not supported on this platform".to_string(),
        })
    }

    fn max_stacktrace_length(&self) -> usize {
        self.max_stacktrace_length
    }
}

/// Truncate to at most `max` characters without splitting a character
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Location of the monitored thread's top frame, for grouping hang messages
///
/// Reads the first frame line after `Thread 0:` and keeps only the module
/// name and offset. Full frames would make every message unique.
///
/// ```text
/// Thread 0:
/// 0   libc.so.6                           0x00007f3a2b4c2234 0x7f3a2b400000 + 795188
///     → "libc.so.6 + 795188"
/// ```
///
/// Returns `None` when there is no `Thread 0` frame at all, and
/// `"unknown location"` when the frame line is malformed.
#[must_use]
pub fn first_frame_of_main(stacktrace: &str) -> Option<String> {
    let (_, after) = stacktrace.split_once("Thread 0:\n0")?;
    let line = after.lines().next().unwrap_or("").trim();

    let components: Vec<&str> = line.split_whitespace().collect();
    match (components.len() >= 4, components.first(), components.last()) {
        (true, Some(module), Some(offset)) => Some(format!("{module} + {offset}")),
        _ => Some("unknown location".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_provider() {
        let provider = NoopSnapshotProvider::default();
        assert_eq!(provider.max_stacktrace_length(), 10_000);
        assert!(provider.capture_snapshot().is_none());

        let formatted = provider.format(&Snapshot::new(b"some data".to_vec())).unwrap();
        assert_eq!(formatted.message, "Stack trace collection not available");
        assert_eq!(
            formatted.stacktrace,
            "Stack trace collection not supported on this platform"
        );
        assert_eq!(NoopSnapshotProvider::new(5000).max_stacktrace_length(), 5000);
    }

    #[test]
    fn test_first_frame_with_module_and_offset() {
        let stacktrace = "\
Thread 0:
0   libc.so.6                           0x00007f3a2b4c2234 0x7f3a2b400000 + 795188
1   app                                 0x000055d0c1a40010 0x55d0c1a00000 + 262160
";
        assert_eq!(first_frame_of_main(stacktrace).as_deref(), Some("libc.so.6 + 795188"));
    }

    #[test]
    fn test_first_frame_with_insufficient_components() {
        assert_eq!(first_frame_of_main("Thread 0:\n0   app").as_deref(), Some("unknown location"));
        assert_eq!(first_frame_of_main("Thread 0:\n0").as_deref(), Some("unknown location"));
    }

    #[test]
    fn test_first_frame_without_main_thread() {
        assert_eq!(first_frame_of_main("Some other thread info"), None);
        assert_eq!(first_frame_of_main(""), None);
        // Running thread: header present but no numbered frame
        assert_eq!(first_frame_of_main("Thread 0:\n    (running)\n"), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        // Multi-byte characters are kept whole
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_snapshot_accessors() {
        let snapshot = Snapshot::new(vec![1, 2, 3]);
        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.as_bytes(), &[1, 2, 3]);
    }
}
