//! # Shared Record Contract (Watchdog ↔ Sinks)
//!
//! Defines the names, attribute keys and value type that a hang record carries
//! on its way from the watchdog to a telemetry sink. Exporters and sinks that
//! live outside the `hangwatch` crate depend on this crate only, so the record
//! shape stays in one place.
//!
//! ## Record Shape
//!
//! Every qualifying hang produces exactly one record:
//!
//! ```text
//! device.hang  [start ─────────────── end]
//!   exception.type       = "hang"
//!   exception.message    = "Hang detected at libc.so.6 + 1054"
//!   exception.stacktrace = "Thread 0 name:  main\nThread 0:\n0   libc.so.6 ..."
//!   hang.duration_ms     = 412
//!   hang.episode_id      = 7
//! ```
//!
//! ## Key Types
//!
//! - [`AttributeValue`] - Typed attribute payload set on a record

// ============================================================================
// Record Names
// ============================================================================

/// Name of the timed record emitted for each reportable hang
pub const HANG_RECORD_NAME: &str = "device.hang";

/// Value of [`ATTR_EXCEPTION_TYPE`] on every hang record
pub const HANG_EXCEPTION_TYPE: &str = "hang";

// ============================================================================
// Attribute Keys
// ============================================================================

/// Exception classification, always [`HANG_EXCEPTION_TYPE`]
pub const ATTR_EXCEPTION_TYPE: &str = "exception.type";

/// One-line summary naming where the monitored thread was stuck
pub const ATTR_EXCEPTION_MESSAGE: &str = "exception.message";

/// Formatted thread snapshot (bounded length)
pub const ATTR_EXCEPTION_STACKTRACE: &str = "exception.stacktrace";

/// Busy duration in whole milliseconds
pub const ATTR_HANG_DURATION_MS: &str = "hang.duration_ms";

/// Per-watchdog episode counter, useful for correlating log lines
pub const ATTR_HANG_EPISODE_ID: &str = "hang.episode_id";

// ============================================================================
// Fallback Text
// ============================================================================

/// Message used when no usable snapshot exists for a hang
pub const FALLBACK_MESSAGE: &str = "Hang detected at unknown location";

/// Stacktrace used when capture failed or never ran for a hang
pub const FALLBACK_STACKTRACE: &str = "No stack trace captured";

/// Prefix of the stacktrace used when a captured snapshot could not be decoded
pub const PARSE_FAILURE_PREFIX: &str = "Failed to parse stack trace";

// ============================================================================
// Attribute Values
// ============================================================================

/// Value attached to a record attribute
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl AttributeValue {
    /// Borrow the string payload, if this is a string attribute
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer attribute
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl core::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Double(v) => write!(f, "{v}"),
            AttributeValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}
