//! The shared episode state
//!
//! One mutex guards the open episode and the id counter. Every method takes
//! the lock once, does O(1) work and releases it; nothing here blocks on
//! I/O or calls out to collaborators.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::{EpisodeId, Timestamp};
use crate::snapshot::Snapshot;

/// The busy period currently in progress
#[derive(Debug)]
pub struct OpenEpisode {
    pub id: EpisodeId,
    pub start: Timestamp,
    pub snapshot: Option<Snapshot>,
    pub capture_attempted: bool,
}

/// What the poller should do for the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDecision {
    /// No episode open
    Idle,
    /// Episode open but younger than the prediction threshold
    TooEarly,
    /// This episode already had its one capture attempt
    AlreadyAttempted,
    /// Capture now; the attempt is already recorded against this episode
    Capture(EpisodeId),
}

#[derive(Debug, Default)]
struct Slot {
    open: Option<OpenEpisode>,
    last_id: u64,
}

/// Mutex-guarded episode slot
#[derive(Debug, Default)]
pub struct EpisodeState {
    slot: Mutex<Slot>,
}

impl EpisodeState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the slot half-written:
    // every mutation below is a single assignment.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new episode starting at `start`
    ///
    /// Returns `None` if one is already open; its start time is kept.
    pub fn open(&self, start: Timestamp) -> Option<EpisodeId> {
        let mut slot = self.lock();
        if slot.open.is_some() {
            return None;
        }
        slot.last_id += 1;
        let id = EpisodeId(slot.last_id);
        slot.open = Some(OpenEpisode { id, start, snapshot: None, capture_attempted: false });
        Some(id)
    }

    /// Decide whether to capture, marking the attempt in the same critical
    /// section
    pub fn begin_capture(&self, now: Timestamp, prediction_threshold: Duration) -> CaptureDecision {
        let mut slot = self.lock();
        let Some(episode) = slot.open.as_mut() else {
            return CaptureDecision::Idle;
        };
        if now.saturating_duration_since(episode.start) < prediction_threshold {
            return CaptureDecision::TooEarly;
        }
        if episode.capture_attempted {
            return CaptureDecision::AlreadyAttempted;
        }
        episode.capture_attempted = true;
        CaptureDecision::Capture(episode.id)
    }

    /// Attach a snapshot to episode `id` if it is still the open one
    ///
    /// Returns the snapshot back when the episode has closed in the meantime.
    pub fn attach(&self, id: EpisodeId, snapshot: Snapshot) -> Result<(), Snapshot> {
        let mut slot = self.lock();
        match slot.open.as_mut() {
            Some(episode) if episode.id == id => {
                episode.snapshot = Some(snapshot);
                Ok(())
            }
            _ => Err(snapshot),
        }
    }

    /// Take the open episode, leaving the slot empty
    pub fn close(&self) -> Option<OpenEpisode> {
        self.lock().open.take()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().open.is_some()
    }

    /// Id of the open episode
    #[must_use]
    pub fn current(&self) -> Option<EpisodeId> {
        self.lock().open.as_ref().map(|e| e.id)
    }
}
