//! Tokio runtime adapter
//!
//! A current-thread Tokio runtime parks its driver whenever it has nothing to
//! poll. `on_thread_unpark` therefore marks the start of a busy period and
//! `on_thread_park` its end. Hooks fire on every runtime thread, so the
//! adapter only forwards the ones raised on the thread it was built on.
//!
//! `block_on` polls the main future once before the driver ever parks, so no
//! unpark precedes that first poll. [`TokioParkHooks::block_on`] opens the
//! busy period itself on entry and closes it on exit.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use super::{IdleBusyObserver, IdleBusySource, ObserverHandle, RunLoopMonitor};
use crate::domain::WatchdogError;

/// Park/unpark hooks bridging a Tokio runtime to a [`RunLoopMonitor`]
pub struct TokioParkHooks {
    monitor: RunLoopMonitor,
    thread: ThreadId,
    installed: AtomicBool,
}

impl TokioParkHooks {
    /// Monitor the calling thread (the one that will call `block_on`)
    #[must_use]
    pub fn for_current_thread() -> Self {
        Self {
            monitor: RunLoopMonitor::new(),
            thread: std::thread::current().id(),
            installed: AtomicBool::new(false),
        }
    }

    /// Install the hooks on a runtime builder
    pub fn install<'b>(
        &self,
        builder: &'b mut tokio::runtime::Builder,
    ) -> &'b mut tokio::runtime::Builder {
        let park_monitor = self.monitor.clone();
        let unpark_monitor = self.monitor.clone();
        let thread = self.thread;
        self.installed.store(true, Ordering::Release);

        builder
            .on_thread_park(move || {
                if std::thread::current().id() == thread {
                    park_monitor.signal_idle();
                }
            })
            .on_thread_unpark(move || {
                if std::thread::current().id() == thread {
                    unpark_monitor.signal_busy();
                }
            })
    }

    /// Drive `future` to completion on `runtime`, monitoring the whole call
    ///
    /// The first poll of `future` counts as busy. Called from any thread but
    /// the monitored one, this is a plain `Runtime::block_on`.
    pub fn block_on<F: Future>(&self, runtime: &tokio::runtime::Runtime, future: F) -> F::Output {
        if std::thread::current().id() != self.thread {
            return runtime.block_on(future);
        }
        self.monitor.signal_busy();
        let _idle = IdleOnExit(&self.monitor);
        runtime.block_on(future)
    }
}

/// Closes the busy period when `block_on` returns or unwinds
struct IdleOnExit<'a>(&'a RunLoopMonitor);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.signal_idle();
    }
}

impl IdleBusySource for TokioParkHooks {
    fn register_idle_busy_observer(
        &self,
        observer: Arc<dyn IdleBusyObserver>,
    ) -> Result<ObserverHandle, WatchdogError> {
        if !self.installed.load(Ordering::Acquire) {
            return Err(WatchdogError::RegistrationUnavailable(
                "park hooks are not installed on a runtime builder".to_string(),
            ));
        }
        self.monitor.register(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::RecordingObserver;
    use std::time::Duration;

    fn runtime(hooks: &TokioParkHooks) -> tokio::runtime::Runtime {
        let mut builder = tokio::runtime::Builder::new_current_thread();
        builder.enable_time();
        hooks.install(&mut builder);
        builder.build().unwrap()
    }

    #[test]
    fn test_current_thread_runtime_reports_transitions() {
        let hooks = TokioParkHooks::for_current_thread();
        let runtime = runtime(&hooks);
        let observer = Arc::new(RecordingObserver::default());
        hooks.register_idle_busy_observer(observer.clone()).unwrap();

        hooks.block_on(&runtime, async {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let events = observer.events.lock().unwrap();
        assert_eq!(events.first(), Some(&"busy"));
        assert_eq!(events.last(), Some(&"idle"));
        for pair in events.windows(2) {
            assert_ne!(pair[0], pair[1], "signals must alternate: {events:?}");
        }
    }

    #[test]
    fn test_first_poll_is_busy() {
        let hooks = TokioParkHooks::for_current_thread();
        let runtime = runtime(&hooks);
        let observer = Arc::new(RecordingObserver::default());
        hooks.register_idle_busy_observer(observer.clone()).unwrap();

        // Completes in its first poll, so the driver never parks
        let value = hooks.block_on(&runtime, async { 7 });

        assert_eq!(value, 7);
        assert_eq!(*observer.events.lock().unwrap(), vec!["busy", "idle"]);
    }

    #[test]
    fn test_registration_requires_installed_hooks() {
        let hooks = TokioParkHooks::for_current_thread();
        let err = hooks
            .register_idle_busy_observer(Arc::new(RecordingObserver::default()))
            .unwrap_err();
        assert!(matches!(err, WatchdogError::RegistrationUnavailable(_)));
    }

    #[test]
    fn test_other_threads_are_filtered() {
        let hooks = Arc::new(TokioParkHooks::for_current_thread());
        // Built on this thread but driven from another one
        let runtime = runtime(&hooks);
        let observer = Arc::new(RecordingObserver::default());
        hooks.register_idle_busy_observer(observer.clone()).unwrap();

        let driver = Arc::clone(&hooks);
        std::thread::spawn(move || {
            driver.block_on(&runtime, async {
                tokio::time::sleep(Duration::from_millis(5)).await;
            });
        })
        .join()
        .unwrap();

        assert!(observer.events.lock().unwrap().is_empty());
    }
}
