//! Trace export functionality
//!
//! Hang records can be written as Chrome Trace Event Format JSON for
//! visualization in Perfetto or chrome://tracing.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceSink;
