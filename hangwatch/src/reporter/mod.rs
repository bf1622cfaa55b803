//! Hang reports
//!
//! Turns a closed episode into the one `device.hang` record it is owed.
//! Formatting may fail or even panic inside a provider; either way the
//! record is still emitted, with fallback text.

use hangwatch_common::{
    AttributeValue, ATTR_EXCEPTION_MESSAGE, ATTR_EXCEPTION_STACKTRACE, ATTR_EXCEPTION_TYPE,
    ATTR_HANG_DURATION_MS, ATTR_HANG_EPISODE_ID, FALLBACK_MESSAGE, FALLBACK_STACKTRACE,
    HANG_EXCEPTION_TYPE, HANG_RECORD_NAME, PARSE_FAILURE_PREFIX,
};
use log::{info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::domain::{EpisodeId, Timestamp};
use crate::snapshot::{truncate_chars, Snapshot, SnapshotProvider};
use crate::telemetry::TelemetrySink;

/// A busy period that crossed the hang threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedEpisode {
    pub id: EpisodeId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub snapshot: Option<Snapshot>,
}

impl ClosedEpisode {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Fully formatted hang, ready to emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangReport {
    pub episode_id: EpisodeId,
    pub name: &'static str,
    pub start: Timestamp,
    pub end: Timestamp,
    pub exception_type: &'static str,
    pub message: String,
    pub stacktrace: String,
}

impl HangReport {
    /// Format `episode`, falling back to fixed text when there is no usable
    /// snapshot
    ///
    /// The stack trace is cut to the smaller of `max_stacktrace_length` and
    /// the provider's own limit, whatever the provider returned.
    #[must_use]
    pub fn build(
        episode: ClosedEpisode,
        provider: &dyn SnapshotProvider,
        max_stacktrace_length: usize,
    ) -> Self {
        let (message, stacktrace) = match episode.snapshot.as_ref() {
            Some(snapshot) => {
                let (message, stacktrace) = format_snapshot(snapshot, provider);
                let limit = max_stacktrace_length.min(provider.max_stacktrace_length());
                (message, truncate_chars(&stacktrace, limit).to_string())
            }
            None => (FALLBACK_MESSAGE.to_string(), FALLBACK_STACKTRACE.to_string()),
        };

        Self {
            episode_id: episode.id,
            name: HANG_RECORD_NAME,
            start: episode.start,
            end: episode.end,
            exception_type: HANG_EXCEPTION_TYPE,
            message,
            stacktrace,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    /// Write the report as one record, closed at the episode's end time
    pub fn emit(self, sink: &dyn TelemetrySink) {
        let duration_ms = i64::try_from(self.duration().as_millis()).unwrap_or(i64::MAX);
        let episode_id = i64::try_from(self.episode_id.0).unwrap_or(i64::MAX);

        let mut record = sink.begin_record(self.name, self.start);
        record.set_attribute(ATTR_EXCEPTION_TYPE, AttributeValue::from(self.exception_type));
        record.set_attribute(ATTR_EXCEPTION_MESSAGE, AttributeValue::String(self.message));
        record.set_attribute(ATTR_EXCEPTION_STACKTRACE, AttributeValue::String(self.stacktrace));
        record.set_attribute(ATTR_HANG_DURATION_MS, AttributeValue::Int(duration_ms));
        record.set_attribute(ATTR_HANG_EPISODE_ID, AttributeValue::Int(episode_id));
        record.close(self.end);
    }
}

fn format_snapshot(snapshot: &Snapshot, provider: &dyn SnapshotProvider) -> (String, String) {
    match catch_unwind(AssertUnwindSafe(|| provider.format(snapshot))) {
        Ok(Ok(formatted)) => (formatted.message, formatted.stacktrace),
        Ok(Err(e)) => {
            warn!("Failed to format hang snapshot: {e}");
            (FALLBACK_MESSAGE.to_string(), format!("{PARSE_FAILURE_PREFIX}: {e}"))
        }
        Err(_) => {
            warn!("Snapshot formatter panicked");
            (FALLBACK_MESSAGE.to_string(), format!("{PARSE_FAILURE_PREFIX}: formatter panicked"))
        }
    }
}

/// Builds and emits reports for closed episodes
pub struct HangReporter<'a> {
    provider: &'a dyn SnapshotProvider,
    sink: &'a dyn TelemetrySink,
    max_stacktrace_length: usize,
}

impl<'a> HangReporter<'a> {
    /// Reporter bounded by the provider's own stack trace limit
    #[must_use]
    pub fn new(provider: &'a dyn SnapshotProvider, sink: &'a dyn TelemetrySink) -> Self {
        Self { provider, sink, max_stacktrace_length: provider.max_stacktrace_length() }
    }

    /// Tighten the stack trace limit, e.g. to the watchdog configuration's
    #[must_use]
    pub fn with_max_stacktrace_length(mut self, max: usize) -> Self {
        self.max_stacktrace_length = max;
        self
    }

    /// Emit exactly one record for `episode`
    pub fn report(&self, episode: ClosedEpisode) {
        let report = HangReport::build(episode, self.provider, self.max_stacktrace_length);
        info!(
            "{} hung for {}ms: {}",
            report.episode_id,
            report.duration().as_millis(),
            report.message
        );
        report.emit(self.sink);
    }
}
