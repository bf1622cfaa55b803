//! # Telemetry Sinks
//!
//! A [`TelemetrySink`] is anything that can start a timed record, take
//! attributes on it, and close it. The watchdog knows nothing else about
//! where hang records go.
//!
//! ```text
//! let mut record = sink.begin_record("device.hang", start);
//! record.set_attribute("exception.type", "hang".into());
//! record.close(end);
//! ```
//!
//! Sinks shipped here:
//!
//! - [`InMemorySink`]: keeps finished records, for tests and embedding apps
//! - [`LogSink`]: one `warn!` line per record
//! - [`FanoutSink`]: duplicates each record into several sinks
//! - [`crate::export::ChromeTraceSink`]: Chrome Trace Event JSON

use hangwatch_common::AttributeValue;
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::Timestamp;

/// Destination for timed records
pub trait TelemetrySink: Send + Sync {
    /// Start a record; it is finished when the handle is closed
    fn begin_record(&self, name: &str, start: Timestamp) -> Box<dyn RecordHandle>;
}

/// An open record
pub trait RecordHandle: Send {
    fn set_attribute(&mut self, key: &str, value: AttributeValue);

    /// Finish the record with its end time
    fn close(self: Box<Self>, end: Timestamp);
}

/// A closed record with everything that was set on it
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecord {
    pub name: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub attributes: Vec<(String, AttributeValue)>,
}

impl FinishedRecord {
    /// Last value set for `key`
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// String attribute shortcut
    #[must_use]
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attribute(key).and_then(AttributeValue::as_str)
    }
}

/// Record under construction, shared by the sinks in this module
struct PendingRecord {
    name: String,
    start: Timestamp,
    attributes: Vec<(String, AttributeValue)>,
}

impl PendingRecord {
    fn new(name: &str, start: Timestamp) -> Self {
        Self { name: name.to_string(), start, attributes: Vec::new() }
    }

    fn finish(self, end: Timestamp) -> FinishedRecord {
        FinishedRecord { name: self.name, start: self.start, end, attributes: self.attributes }
    }
}

/// Sink that stores every closed record in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    records: Arc<Mutex<Vec<FinishedRecord>>>,
}

impl InMemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record closed so far
    #[must_use]
    pub fn records(&self) -> Vec<FinishedRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct InMemoryRecord {
    pending: PendingRecord,
    records: Arc<Mutex<Vec<FinishedRecord>>>,
}

impl RecordHandle for InMemoryRecord {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        self.pending.attributes.push((key.to_string(), value));
    }

    fn close(self: Box<Self>, end: Timestamp) {
        let record = self.pending.finish(end);
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    }
}

impl TelemetrySink for InMemorySink {
    fn begin_record(&self, name: &str, start: Timestamp) -> Box<dyn RecordHandle> {
        Box::new(InMemoryRecord {
            pending: PendingRecord::new(name, start),
            records: Arc::clone(&self.records),
        })
    }
}

/// Sink that logs each closed record
///
/// Multi-line attribute values (stack traces) are logged on their own lines
/// at debug level so the warn line stays greppable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

struct LogRecord(PendingRecord);

impl RecordHandle for LogRecord {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        self.0.attributes.push((key.to_string(), value));
    }

    fn close(self: Box<Self>, end: Timestamp) {
        let record = self.0.finish(end);
        let duration = record.end.saturating_duration_since(record.start);

        let inline: Vec<String> = record
            .attributes
            .iter()
            .filter(|(_, v)| !v.to_string().contains('\n'))
            .map(|(k, v)| format!("{k}={v:?}"))
            .collect();
        warn!("{} lasted {:.1}ms {}", record.name, duration.as_secs_f64() * 1000.0, inline.join(" "));

        for (key, value) in record.attributes.iter().filter(|(_, v)| v.to_string().contains('\n')) {
            debug!("{} {key}:\n{value}", record.name);
        }
    }
}

impl TelemetrySink for LogSink {
    fn begin_record(&self, name: &str, start: Timestamp) -> Box<dyn RecordHandle> {
        Box::new(LogRecord(PendingRecord::new(name, start)))
    }
}

/// Sink forwarding every record to each of its children
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

struct FanoutRecord(Vec<Box<dyn RecordHandle>>);

impl RecordHandle for FanoutRecord {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        for handle in &mut self.0 {
            handle.set_attribute(key, value.clone());
        }
    }

    fn close(self: Box<Self>, end: Timestamp) {
        for handle in self.0 {
            handle.close(end);
        }
    }
}

impl TelemetrySink for FanoutSink {
    fn begin_record(&self, name: &str, start: Timestamp) -> Box<dyn RecordHandle> {
        Box::new(FanoutRecord(self.sinks.iter().map(|s| s.begin_record(name, start)).collect()))
    }
}
