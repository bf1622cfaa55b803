//! # Hang Watchdog
//!
//! Two detectors share one piece of state:
//!
//! ```text
//!  monitored thread                 episode mutex                 watchdog thread
//!  ────────────────                 ─────────────                 ───────────────
//!  on_busy()  ── open(now) ──────▶  [id, start,      ◀── begin_capture(now) ── tick (poll_interval)
//!                                    snapshot,                    │ elapsed ≥ threshold × ratio?
//!                                    attempted]                   ▼
//!                                                                 capture_snapshot()  (lock released)
//!                                                    ◀── attach(id, snapshot)
//!  on_idle()  ── close() ────────▶  elapsed ≥ threshold?
//!                  │
//!                  └── ClosedEpisode ── channel ──────────────▶  reporter thread:
//!                                                                 format + emit to sink
//! ```
//!
//! - The monitored thread never waits on anything but the episode mutex,
//!   which is only ever held for O(1) work.
//! - Capture happens at most once per episode and outside the lock.
//! - A snapshot is attached only if its episode is still open; otherwise it
//!   is dropped as stale.
//! - Formatting and emission happen on a separate reporter thread, so a
//!   slow formatter never delays the next poll. Records carry the episode's
//!   original start and end times.

pub mod detector;
pub mod episode;
pub mod stats;

pub use detector::{PollOutcome, WatchdogCore};
pub use episode::{CaptureDecision, EpisodeState, OpenEpisode};
pub use stats::WatchdogStats;

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, error, info};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::domain::WatchdogError;
use crate::monitor::{IdleBusyObserver, IdleBusySource, ObserverHandle};
use crate::snapshot::SnapshotProvider;
use crate::telemetry::TelemetrySink;

/// Name of the thread running the poll step
pub const WATCHDOG_THREAD_NAME: &str = "hangwatch-watchdog";
/// Name of the thread formatting and emitting reports
pub const REPORTER_THREAD_NAME: &str = "hangwatch-reporter";

/// A running watchdog: the core plus its poller and reporter threads
///
/// Stops on [`Watchdog::shutdown`] or when dropped.
pub struct Watchdog {
    core: Arc<WatchdogCore>,
    shutdown_tx: Option<Sender<()>>,
    /// Poller and reporter threads
    workers: Vec<JoinHandle<()>>,
    attachments: Mutex<Vec<ObserverHandle>>,
}

impl Watchdog {
    /// Validate `config` and start the poller and reporter threads
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a thread cannot
    /// be spawned
    pub fn start(
        config: WatchdogConfig,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn SnapshotProvider>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Result<Self, WatchdogError> {
        let core = Arc::new(WatchdogCore::new(config, clock, provider, sink)?);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let poller_core = Arc::clone(&core);
        let poller_shutdown = shutdown_rx.clone();
        let poller = thread::Builder::new()
            .name(WATCHDOG_THREAD_NAME.to_string())
            .spawn(move || {
                let ticker = tick(poller_core.config().poll_interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            poller_core.poll();
                        }
                        recv(poller_shutdown) -> _ => break,
                    }
                }
            })
            .map_err(WatchdogError::SpawnFailed)?;

        // Formatting can take arbitrarily long, so it never shares a thread
        // with the ticker
        let reporter_core = Arc::clone(&core);
        let reporter = thread::Builder::new()
            .name(REPORTER_THREAD_NAME.to_string())
            .spawn(move || {
                let closed = reporter_core.closed_episodes().clone();
                loop {
                    select! {
                        recv(closed) -> episode => {
                            if let Ok(episode) = episode {
                                reporter_core.report(episode);
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                reporter_core.drain_reports();
            });
        let reporter = match reporter {
            Ok(reporter) => reporter,
            Err(e) => {
                drop(shutdown_tx);
                let _ = poller.join();
                return Err(WatchdogError::SpawnFailed(e));
            }
        };

        let config = core.config();
        info!(
            "Watchdog started: threshold {:?}, capture after {:?}, poll every {:?}",
            config.hang_threshold,
            config.prediction_threshold(),
            config.poll_interval
        );

        Ok(Self {
            core,
            shutdown_tx: Some(shutdown_tx),
            workers: vec![poller, reporter],
            attachments: Mutex::new(Vec::new()),
        })
    }

    /// Register with a scheduler so its transitions feed this watchdog
    ///
    /// # Errors
    /// Returns the scheduler's registration error
    pub fn attach(&self, source: &dyn IdleBusySource) -> Result<(), WatchdogError> {
        let handle = source.register_idle_busy_observer(self.observer())?;
        self.attachments.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
        Ok(())
    }

    /// The watchdog as an observer, for schedulers wired up by hand
    #[must_use]
    pub fn observer(&self) -> Arc<dyn IdleBusyObserver> {
        Arc::clone(&self.core) as Arc<dyn IdleBusyObserver>
    }

    #[must_use]
    pub fn core(&self) -> &Arc<WatchdogCore> {
        &self.core
    }

    #[must_use]
    pub fn stats(&self) -> WatchdogStats {
        self.core.stats()
    }

    /// Stop both threads, report already-closed episodes and return the
    /// final counters
    ///
    /// An episode still open at this point is abandoned.
    pub fn shutdown(mut self) -> WatchdogStats {
        self.stop();
        self.core.stats()
    }

    fn stop(&mut self) {
        for handle in self.attachments.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            handle.detach();
        }
        // Dropping the sender wakes both selects
        drop(self.shutdown_tx.take());
        if self.workers.is_empty() {
            return;
        }
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("watchdog").to_string();
            if worker.join().is_err() {
                error!("Thread {name} panicked");
            }
        }
        // Anything closed after the reporter's last drain
        self.core.drain_reports();
        debug!("Watchdog stopped: {}", self.core.stats());
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("running", &!self.workers.is_empty())
            .field("stats", &self.core.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::SnapshotError;
    use crate::monitor::RunLoopMonitor;
    use crate::snapshot::{FormattedSnapshot, NoopSnapshotProvider, Snapshot};
    use crate::telemetry::InMemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn start(sink: &InMemorySink) -> Watchdog {
        let config = WatchdogConfig::default()
            .with_hang_threshold(Duration::from_millis(60))
            .with_poll_interval(Duration::from_millis(10));
        Watchdog::start(
            config,
            Arc::new(SystemClock::new()),
            Arc::new(NoopSnapshotProvider::default()),
            Arc::new(sink.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let result = Watchdog::start(
            WatchdogConfig::default().with_prediction_ratio(2.0),
            Arc::new(SystemClock::new()),
            Arc::new(NoopSnapshotProvider::default()),
            Arc::new(InMemorySink::new()),
        );
        assert!(matches!(result, Err(WatchdogError::Config(_))));
    }

    #[test]
    fn test_worker_reports_real_hang() {
        let sink = InMemorySink::new();
        let watchdog = start(&sink);
        let monitor = RunLoopMonitor::new();
        watchdog.attach(&monitor).unwrap();

        monitor.signal_busy();
        thread::sleep(Duration::from_millis(100));
        monitor.signal_idle();

        let stats = watchdog.shutdown();
        assert_eq!(stats.hangs_detected, 1);
        assert_eq!(stats.reports_emitted, 1);
        // Noop provider never returns a snapshot
        assert_eq!(stats.captures_failed, 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_shutdown_detaches_from_scheduler() {
        let sink = InMemorySink::new();
        let watchdog = start(&sink);
        let monitor = RunLoopMonitor::new();
        watchdog.attach(&monitor).unwrap();
        let core = Arc::clone(watchdog.core());
        drop(watchdog);

        monitor.signal_busy();
        assert!(!core.is_episode_open());
    }

    #[test]
    fn test_threads_are_named() {
        let sink = InMemorySink::new();
        let watchdog = start(&sink);
        let names: Vec<_> =
            watchdog.workers.iter().filter_map(|w| w.thread().name().map(str::to_string)).collect();
        assert_eq!(names, vec![WATCHDOG_THREAD_NAME, REPORTER_THREAD_NAME]);
    }

    /// Provider whose formatting takes far longer than a poll interval
    struct SlowFormatter {
        captures: AtomicUsize,
    }

    impl SnapshotProvider for SlowFormatter {
        fn capture_snapshot(&self) -> Option<Snapshot> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            Some(Snapshot::new(format!("capture {n}").into_bytes()))
        }

        fn format(&self, snapshot: &Snapshot) -> Result<FormattedSnapshot, SnapshotError> {
            thread::sleep(Duration::from_millis(600));
            Ok(FormattedSnapshot {
                message: "Hang detected at app + 1".to_string(),
                stacktrace: String::from_utf8_lossy(snapshot.as_bytes()).into_owned(),
            })
        }

        fn max_stacktrace_length(&self) -> usize {
            10_000
        }
    }

    #[test]
    fn test_slow_formatting_does_not_stall_polling() {
        let sink = InMemorySink::new();
        let config = WatchdogConfig::default()
            .with_hang_threshold(Duration::from_millis(150))
            .with_poll_interval(Duration::from_millis(20));
        let watchdog = Watchdog::start(
            config,
            Arc::new(SystemClock::new()),
            Arc::new(SlowFormatter { captures: AtomicUsize::new(0) }),
            Arc::new(sink.clone()),
        )
        .unwrap();
        let monitor = RunLoopMonitor::new();
        watchdog.attach(&monitor).unwrap();

        // The second hang starts while the first is still being formatted
        for busy_ms in [300, 400] {
            monitor.signal_busy();
            thread::sleep(Duration::from_millis(busy_ms));
            monitor.signal_idle();
            thread::sleep(Duration::from_millis(20));
        }

        let stats = watchdog.shutdown();
        assert_eq!(stats.captures_attempted, 2);
        assert_eq!(stats.captures_succeeded, 2);

        let stacktraces: Vec<_> = sink
            .records()
            .iter()
            .filter_map(|r| r.str_attribute("exception.stacktrace").map(str::to_string))
            .collect();
        assert_eq!(stacktraces, vec!["capture 0", "capture 1"]);
    }
}
