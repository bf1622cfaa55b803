//! # Run Loop Monitoring
//!
//! Turns a cooperative scheduler's idle/busy transitions into two callbacks
//! delivered synchronously on the monitored thread:
//!
//! ```text
//!   scheduler thread            RunLoopMonitor            observer (watchdog)
//!   ────────────────            ──────────────            ───────────────────
//!   woke up with work   ──▶   signal_busy()   ──▶   on_busy()
//!   about to block      ──▶   signal_idle()   ──▶   on_idle()
//! ```
//!
//! Schedulers expose the registration capability through [`IdleBusySource`].
//! Two adapters ship with the crate:
//!
//! - [`RunLoop`]: a channel-driven single-thread run loop
//! - [`TokioParkHooks`]: park/unpark hooks of a current-thread Tokio runtime
//!
//! Callbacks run on the thread being monitored, so everything on this path is
//! O(1): one atomic swap plus the observer call.

pub mod run_loop;
pub mod tokio_hooks;

pub use run_loop::{RunLoop, RunLoopHandle, RunLoopStats};
pub use tokio_hooks::TokioParkHooks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::domain::WatchdogError;

/// Receiver of idle/busy transitions of the monitored thread
///
/// Both methods are invoked on the monitored thread and must not block.
pub trait IdleBusyObserver: Send + Sync {
    /// The monitored thread resumed processing work
    fn on_busy(&self);
    /// The monitored thread finished its work and is about to wait
    fn on_idle(&self);
}

/// Scheduler capability: accept one idle/busy observer
pub trait IdleBusySource {
    /// Register `observer` to receive this scheduler's transitions
    ///
    /// # Errors
    /// Returns [`WatchdogError::AlreadyRegistered`] if an observer was
    /// registered before, or [`WatchdogError::RegistrationUnavailable`] if the
    /// scheduler cannot deliver signals.
    fn register_idle_busy_observer(
        &self,
        observer: Arc<dyn IdleBusyObserver>,
    ) -> Result<ObserverHandle, WatchdogError>;
}

#[derive(Default)]
struct MonitorInner {
    observer: OnceLock<Arc<dyn IdleBusyObserver>>,
    enabled: AtomicBool,
    busy: AtomicBool,
}

/// Registration slot and signal fan-in embedded in each scheduler adapter
///
/// Holds at most one observer for its whole lifetime and enforces strict
/// busy → idle alternation, so a scheduler that reports an extra park or
/// unpark never reaches the observer twice in a row.
#[derive(Clone, Default)]
pub struct RunLoopMonitor {
    inner: Arc<MonitorInner>,
}

impl RunLoopMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the observer
    ///
    /// # Errors
    /// Returns [`WatchdogError::AlreadyRegistered`] on a second call
    pub fn register(
        &self,
        observer: Arc<dyn IdleBusyObserver>,
    ) -> Result<ObserverHandle, WatchdogError> {
        self.inner.observer.set(observer).map_err(|_| WatchdogError::AlreadyRegistered)?;
        self.inner.enabled.store(true, Ordering::Release);
        Ok(ObserverHandle { inner: Arc::clone(&self.inner) })
    }

    /// Forward a "became busy" transition
    pub fn signal_busy(&self) {
        if self.inner.busy.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(observer) = self.active_observer() {
            observer.on_busy();
        }
    }

    /// Forward a "became idle" transition
    pub fn signal_idle(&self) {
        if !self.inner.busy.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(observer) = self.active_observer() {
            observer.on_idle();
        }
    }

    fn active_observer(&self) -> Option<&Arc<dyn IdleBusyObserver>> {
        if self.inner.enabled.load(Ordering::Acquire) {
            self.inner.observer.get()
        } else {
            None
        }
    }
}

impl IdleBusySource for RunLoopMonitor {
    fn register_idle_busy_observer(
        &self,
        observer: Arc<dyn IdleBusyObserver>,
    ) -> Result<ObserverHandle, WatchdogError> {
        self.register(observer)
    }
}

/// Handle to a registered observer
pub struct ObserverHandle {
    inner: Arc<MonitorInner>,
}

impl ObserverHandle {
    /// Stop delivering signals to the observer
    ///
    /// The slot stays occupied: a scheduler accepts one registration per
    /// lifetime.
    pub fn detach(&self) {
        self.inner.enabled.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle").field("attached", &self.is_attached()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records the order of callbacks
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) events: Mutex<Vec<&'static str>>,
    }

    impl IdleBusyObserver for RecordingObserver {
        fn on_busy(&self) {
            self.events.lock().unwrap().push("busy");
        }

        fn on_idle(&self) {
            self.events.lock().unwrap().push("idle");
        }
    }

    #[test]
    fn test_second_registration_rejected() {
        let monitor = RunLoopMonitor::new();
        monitor.register(Arc::new(RecordingObserver::default())).unwrap();
        let err = monitor.register(Arc::new(RecordingObserver::default())).unwrap_err();
        assert!(matches!(err, WatchdogError::AlreadyRegistered));
    }

    #[test]
    fn test_signals_strictly_alternate() {
        let monitor = RunLoopMonitor::new();
        let observer = Arc::new(RecordingObserver::default());
        monitor.register(observer.clone()).unwrap();

        monitor.signal_idle(); // idle before any busy: dropped
        monitor.signal_busy();
        monitor.signal_busy(); // duplicate: dropped
        monitor.signal_idle();
        monitor.signal_idle(); // duplicate: dropped

        assert_eq!(*observer.events.lock().unwrap(), vec!["busy", "idle"]);
    }

    #[test]
    fn test_detach_stops_delivery() {
        let monitor = RunLoopMonitor::new();
        let observer = Arc::new(RecordingObserver::default());
        let handle = monitor.register(observer.clone()).unwrap();
        assert!(handle.is_attached());

        handle.detach();
        monitor.signal_busy();
        monitor.signal_idle();

        assert!(!handle.is_attached());
        assert!(observer.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_monitor_is_a_registration_source() {
        let monitor = RunLoopMonitor::new();
        let observer = Arc::new(RecordingObserver::default());
        let source: &dyn IdleBusySource = &monitor;
        source.register_idle_busy_observer(observer.clone()).unwrap();
        assert!(matches!(
            source.register_idle_busy_observer(observer.clone()),
            Err(WatchdogError::AlreadyRegistered)
        ));

        monitor.signal_busy();
        monitor.signal_idle();
        assert_eq!(*observer.events.lock().unwrap(), vec!["busy", "idle"]);
    }

    #[test]
    fn test_signals_without_observer_are_ignored() {
        let monitor = RunLoopMonitor::new();
        monitor.signal_busy();
        monitor.signal_idle();
    }
}
