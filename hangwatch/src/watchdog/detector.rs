use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::episode::{CaptureDecision, EpisodeState};
use super::stats::{Counters, WatchdogStats};
use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::domain::{ConfigError, EpisodeId};
use crate::monitor::IdleBusyObserver;
use crate::reporter::{ClosedEpisode, HangReporter};
use crate::snapshot::SnapshotProvider;
use crate::telemetry::TelemetrySink;

/// Result of one poll step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing is running on the monitored thread
    Idle,
    /// Busy, but not long enough to predict a hang
    Waiting,
    /// Capture for this episode already happened
    AlreadyAttempted,
    Captured(EpisodeId),
    CaptureFailed(EpisodeId),
    /// Captured, but the episode closed before the snapshot could be attached
    Stale(EpisodeId),
}

/// Detection policy and the episode state it owns
///
/// `on_busy`/`on_idle` run on the monitored thread and only touch the
/// episode mutex and a channel send. `poll` runs on the watchdog thread and
/// `drain_reports` on the reporter thread, or both on a test's thread when
/// driven by hand.
pub struct WatchdogCore {
    config: WatchdogConfig,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn SnapshotProvider>,
    sink: Arc<dyn TelemetrySink>,
    episodes: EpisodeState,
    counters: Counters,
    closed_tx: Sender<ClosedEpisode>,
    closed_rx: Receiver<ClosedEpisode>,
}

impl WatchdogCore {
    /// # Errors
    /// Returns an error if `config` is invalid
    pub fn new(
        config: WatchdogConfig,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn SnapshotProvider>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (closed_tx, closed_rx) = unbounded();
        Ok(Self {
            config,
            clock,
            provider,
            sink,
            episodes: EpisodeState::new(),
            counters: Counters::default(),
            closed_tx,
            closed_rx,
        })
    }

    #[must_use]
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> WatchdogStats {
        self.counters.snapshot()
    }

    #[must_use]
    pub fn is_episode_open(&self) -> bool {
        self.episodes.is_open()
    }

    /// One background poll step
    pub fn poll(&self) -> PollOutcome {
        let now = self.clock.now();
        let id = match self.episodes.begin_capture(now, self.config.prediction_threshold()) {
            CaptureDecision::Idle => return PollOutcome::Idle,
            CaptureDecision::TooEarly => return PollOutcome::Waiting,
            CaptureDecision::AlreadyAttempted => return PollOutcome::AlreadyAttempted,
            CaptureDecision::Capture(id) => id,
        };

        Counters::bump(&self.counters.captures_attempted);
        debug!("{id} looks like a hang, capturing thread snapshot");

        let captured = catch_unwind(AssertUnwindSafe(|| self.provider.capture_snapshot()))
            .unwrap_or_else(|_| {
                warn!("Snapshot provider panicked during capture");
                None
            });

        let Some(snapshot) = captured else {
            Counters::bump(&self.counters.captures_failed);
            warn!("{id}: snapshot capture failed, hang will be reported without stack trace");
            return PollOutcome::CaptureFailed(id);
        };

        match self.episodes.attach(id, snapshot) {
            Ok(()) => {
                Counters::bump(&self.counters.captures_succeeded);
                PollOutcome::Captured(id)
            }
            Err(_stale) => {
                Counters::bump(&self.counters.stale_snapshots_dropped);
                debug!("{id} ended during capture, dropping snapshot");
                PollOutcome::Stale(id)
            }
        }
    }

    /// Report every closed episode queued so far; returns how many
    pub fn drain_reports(&self) -> usize {
        let mut reported = 0;
        while let Ok(episode) = self.closed_rx.try_recv() {
            self.report(episode);
            reported += 1;
        }
        reported
    }

    pub(crate) fn report(&self, episode: ClosedEpisode) {
        HangReporter::new(self.provider.as_ref(), self.sink.as_ref())
            .with_max_stacktrace_length(self.config.max_stacktrace_length)
            .report(episode);
        Counters::bump(&self.counters.reports_emitted);
    }

    pub(crate) fn closed_episodes(&self) -> &Receiver<ClosedEpisode> {
        &self.closed_rx
    }
}

impl IdleBusyObserver for WatchdogCore {
    fn on_busy(&self) {
        let now = self.clock.now();
        match self.episodes.open(now) {
            Some(id) => {
                Counters::bump(&self.counters.episodes_opened);
                trace!("{id} opened");
            }
            None => {
                Counters::bump(&self.counters.duplicate_signals);
                debug!("Busy signal while an episode is already open, ignoring");
            }
        }
    }

    fn on_idle(&self) {
        let end = self.clock.now();
        let Some(episode) = self.episodes.close() else {
            Counters::bump(&self.counters.duplicate_signals);
            debug!("Idle signal with no open episode, ignoring");
            return;
        };

        let elapsed = end.saturating_duration_since(episode.start);
        if elapsed < self.config.hang_threshold {
            Counters::bump(&self.counters.short_episodes);
            return;
        }

        Counters::bump(&self.counters.hangs_detected);
        let closed =
            ClosedEpisode { id: episode.id, start: episode.start, end, snapshot: episode.snapshot };
        // Receiver lives in self, so the send cannot fail
        let _ = self.closed_tx.send(closed);
    }
}
