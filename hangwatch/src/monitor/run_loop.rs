//! Channel-driven cooperative run loop
//!
//! The monitored thread calls [`RunLoop::run`] and from then on alternates
//! between waiting on the job queue (idle) and draining it (busy). Any other
//! thread posts work through a [`RunLoopHandle`].
//!
//! ```text
//! loop {
//!     recv()            ← blocks: idle
//!     signal_busy()
//!     run job, then every job already queued
//!     signal_idle()     ← about to block again
//! }
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::{IdleBusyObserver, IdleBusySource, ObserverHandle, RunLoopMonitor};
use crate::domain::WatchdogError;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Job(Job),
    Stop,
}

/// Counters returned when the loop exits
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunLoopStats {
    /// Number of idle → busy → idle cycles
    pub turns: u64,
    /// Jobs executed (including ones that panicked)
    pub jobs_run: u64,
    /// Jobs that panicked
    pub jobs_panicked: u64,
}

/// Single-thread cooperative scheduler
pub struct RunLoop {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    monitor: RunLoopMonitor,
}

impl RunLoop {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx, monitor: RunLoopMonitor::new() }
    }

    /// Handle for posting work from any thread
    #[must_use]
    pub fn handle(&self) -> RunLoopHandle {
        RunLoopHandle { tx: self.tx.clone() }
    }

    /// Run on the calling thread until a stop request is processed
    ///
    /// Jobs queued ahead of the stop request still run; jobs queued behind it
    /// are dropped with the loop.
    pub fn run(&self) -> RunLoopStats {
        let mut stats = RunLoopStats::default();

        loop {
            // Idle: block until work arrives. The loop owns a sender, so recv
            // only fails if the channel is torn down underneath us.
            let Ok(first) = self.rx.recv() else {
                break;
            };

            self.monitor.signal_busy();

            let mut stop = false;
            let mut next = Some(first);
            while let Some(message) = next {
                match message {
                    Message::Job(job) => {
                        stats.jobs_run += 1;
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            stats.jobs_panicked += 1;
                            warn!("Run loop job panicked; continuing");
                        }
                    }
                    Message::Stop => {
                        stop = true;
                        break;
                    }
                }
                next = self.rx.try_recv().ok();
            }

            self.monitor.signal_idle();
            stats.turns += 1;

            if stop {
                break;
            }
        }

        debug!(
            "Run loop exited after {} turns ({} jobs, {} panicked)",
            stats.turns, stats.jobs_run, stats.jobs_panicked
        );
        stats
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleBusySource for RunLoop {
    fn register_idle_busy_observer(
        &self,
        observer: Arc<dyn IdleBusyObserver>,
    ) -> Result<ObserverHandle, WatchdogError> {
        self.monitor.register(observer)
    }
}

/// Clonable, thread-safe handle to a [`RunLoop`]
#[derive(Clone)]
pub struct RunLoopHandle {
    tx: Sender<Message>,
}

impl RunLoopHandle {
    /// Queue a job; returns `false` if the loop is gone
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Message::Job(Box::new(job))).is_ok()
    }

    /// Ask the loop to exit after the jobs queued so far
    pub fn stop(&self) {
        let _ = self.tx.send(Message::Stop);
    }
}
