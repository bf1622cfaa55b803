use hangwatch_common::AttributeValue;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::{ExportError, Pid, Timestamp};
use crate::telemetry::{RecordHandle, TelemetrySink};

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Record name
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "X" = complete, "M" = metadata
    ph: String,
    /// Timestamp in microseconds, relative to the first record
    ts: f64,
    /// Duration in microseconds (complete events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    pid: u32,
    tid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

#[derive(Debug, Default)]
struct TraceState {
    events: Vec<ChromeTraceEvent>,
    /// Start of the first record, origin of every `ts`
    origin: Option<Timestamp>,
}

/// Sink collecting records as Chrome trace "complete" events
///
/// All records land on one synthetic track named after the monitored
/// thread, so hangs show up as bars on a single timeline.
#[derive(Debug, Clone)]
pub struct ChromeTraceSink {
    state: Arc<Mutex<TraceState>>,
    pid: u32,
    track: u32,
    track_name: String,
}

impl ChromeTraceSink {
    #[must_use]
    pub fn new(track_name: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            pid: Pid::current().0,
            track: 0,
            track_name: track_name.into(),
        }
    }

    /// Get the number of events collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).events.len()
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut all_events =
            self.state.lock().unwrap_or_else(PoisonError::into_inner).events.clone();

        let mut args = HashMap::new();
        args.insert("name".to_string(), serde_json::json!(self.track_name));
        all_events.push(ChromeTraceEvent {
            name: "thread_name".to_string(),
            cat: String::new(),
            ph: "M".to_string(),
            ts: 0.0,
            dur: None,
            pid: self.pid,
            tid: self.track,
            args: Some(args),
        });

        let trace = ChromeTrace { trace_events: all_events, display_time_unit: "ms".to_string() };
        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Export to a file, creating or truncating it
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written
    pub fn write_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.export(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn push(&self, name: String, start: Timestamp, end: Timestamp, args: HashMap<String, JsonValue>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let origin = *state.origin.get_or_insert(start);

        #[allow(clippy::cast_precision_loss)]
        let ts = start.0.saturating_sub(origin.0) as f64 / 1000.0;
        #[allow(clippy::cast_precision_loss)]
        let dur = end.0.saturating_sub(start.0) as f64 / 1000.0;

        state.events.push(ChromeTraceEvent {
            name,
            cat: "hang".to_string(),
            ph: "X".to_string(),
            ts,
            dur: Some(dur),
            pid: self.pid,
            tid: self.track,
            args: Some(args),
        });
    }
}

struct ChromeTraceRecord {
    sink: ChromeTraceSink,
    name: String,
    start: Timestamp,
    args: HashMap<String, JsonValue>,
}

impl RecordHandle for ChromeTraceRecord {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        let json = match value {
            AttributeValue::String(s) => JsonValue::from(s),
            AttributeValue::Int(v) => JsonValue::from(v),
            AttributeValue::Double(v) => JsonValue::from(v),
            AttributeValue::Bool(v) => JsonValue::from(v),
        };
        self.args.insert(key.to_string(), json);
    }

    fn close(self: Box<Self>, end: Timestamp) {
        let ChromeTraceRecord { sink, name, start, args } = *self;
        sink.push(name, start, end, args);
    }
}

impl TelemetrySink for ChromeTraceSink {
    fn begin_record(&self, name: &str, start: Timestamp) -> Box<dyn RecordHandle> {
        Box::new(ChromeTraceRecord {
            sink: self.clone(),
            name: name.to_string(),
            start,
            args: HashMap::new(),
        })
    }
}
