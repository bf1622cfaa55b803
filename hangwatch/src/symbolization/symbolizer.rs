// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianArcSlice, RunTimeEndian};
use object::{Object, ObjectSection};
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Symbolizer for resolving instruction pointers to source locations
///
/// Includes a cache to avoid re-resolving the same addresses repeatedly.
/// Backed by `Arc` slices so it can move to the thread that formats
/// snapshots; callers share it behind a mutex.
pub struct Symbolizer {
    ctx: Context<EndianArcSlice<RunTimeEndian>>,
    /// Cache of resolved frames by address
    cache: HashMap<u64, ResolvedFrame>,
}

impl Symbolizer {
    /// Create a new symbolizer for the given binary
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed, or if DWARF debug info is missing
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("Failed to read binary file")?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;

        // Load DWARF debug info
        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        Ok(Self { ctx, cache: HashMap::new() })
    }

    /// Resolve a file offset to source location information
    pub fn resolve(&mut self, addr: u64) -> ResolvedFrame {
        if let Some(cached) = self.cache.get(&addr) {
            return cached.clone();
        }

        let mut result = Vec::new();

        if let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() {
            while let Ok(Some(frame)) = frame_iter.next() {
                let function = frame
                    .function
                    .and_then(|f| {
                        f.demangle().ok().map(|s| s.to_string()).or_else(|| {
                            f.raw_name().ok().map(|raw| Self::demangle_symbol(&raw))
                        })
                    })
                    .unwrap_or_else(|| "<unknown>".to_string());

                let location = frame.location.map(|loc| SourceLocation {
                    file: loc.file.map(std::string::ToString::to_string),
                    line: loc.line,
                    column: loc.column,
                });

                result.push(InlinedFrame { function, location });
            }
        }

        let resolved = ResolvedFrame {
            addr,
            frames: if result.is_empty() {
                vec![InlinedFrame { function: "<unknown>".to_string(), location: None }]
            } else {
                result
            },
        };

        self.cache.insert(addr, resolved.clone());

        resolved
    }

    /// Demangle a Rust symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

/// A resolved stack frame (may contain multiple inlined frames)
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub addr: u64,
    pub frames: Vec<InlinedFrame>,
}

/// An inlined frame within a resolved frame
#[derive(Debug, Clone)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<SourceLocation>,
}

/// Source code location
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ResolvedFrame {
    /// Whether anything beyond `<unknown>` was found
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.frames.iter().any(|f| f.function != "<unknown>")
    }

    /// Indented "at" lines, one per inlined frame
    ///
    /// ```text
    ///     at hangwatch::demo::spin (src/main.rs:42:9)
    ///     at hangwatch::demo::run_job (src/main.rs:88)
    /// ```
    #[must_use]
    pub fn format_at_lines(&self, indent: &str) -> String {
        let mut output = String::new();

        for (idx, inlined) in self.frames.iter().enumerate() {
            output.push_str(&format!("{indent}at {}", inlined.function));

            if let Some(ref loc) = inlined.location {
                if let Some(ref file) = loc.file {
                    output.push_str(&format!(" ({file}"));
                    if let Some(line) = loc.line {
                        output.push_str(&format!(":{line}"));
                        if let Some(col) = loc.column {
                            output.push_str(&format!(":{col}"));
                        }
                    }
                    output.push(')');
                }
            }

            if idx < self.frames.len() - 1 {
                output.push('\n');
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, file: Option<&str>, line: Option<u32>) -> InlinedFrame {
        InlinedFrame {
            function: function.to_string(),
            location: Some(SourceLocation {
                file: file.map(str::to_string),
                line,
                column: None,
            }),
        }
    }

    #[test]
    fn test_format_at_lines() {
        let resolved = ResolvedFrame {
            addr: 0x1234,
            frames: vec![
                frame("app::spin", Some("src/main.rs"), Some(42)),
                frame("app::run", Some("src/main.rs"), None),
            ],
        };
        assert_eq!(
            resolved.format_at_lines("    "),
            "    at app::spin (src/main.rs:42)\n    at app::run (src/main.rs)"
        );
        assert!(resolved.is_resolved());
    }

    #[test]
    fn test_unknown_frame_is_not_resolved() {
        let resolved = ResolvedFrame {
            addr: 0,
            frames: vec![InlinedFrame { function: "<unknown>".into(), location: None }],
        };
        assert!(!resolved.is_resolved());
        assert_eq!(resolved.format_at_lines(""), "at <unknown>");
    }

    #[test]
    fn test_demangle_symbol() {
        let demangled = Symbolizer::demangle_symbol("_ZN4core3fmt5write17h01234567890abcdeE");
        assert_eq!(demangled, "core::fmt::write");
    }

    #[test]
    fn test_symbolizer_missing_binary() {
        assert!(Symbolizer::new("/nonexistent/binary").is_err());
    }

    #[test]
    fn test_symbolizer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Symbolizer>();
    }
}
