//! Pre-flight checks for the demo binary
//!
//! Snapshot capture needs `/proc/self/task`; readable stack traces need
//! debug symbols in the running executable. Missing symbols only degrade
//! the output, so they produce a warning instead of an error.

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSection};
use std::path::Path;

/// What symbol information a binary carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStatus {
    /// `.debug_info` present: function, file and line
    Dwarf,
    /// `.symtab` only: function names, no source locations
    SymbolTableOnly,
    /// Fully stripped: module + offset only
    Stripped,
    /// Not an object file we can parse
    Unknown,
}

/// Run all pre-flight checks
///
/// # Errors
/// Returns an error when snapshots are requested but `/proc` task entries
/// cannot be read
pub fn run_preflight_checks(snapshots: bool, quiet: bool) -> Result<()> {
    if snapshots {
        check_proc_tasks()?;
        let exe = std::env::current_exe().context("Failed to locate running executable")?;
        let status = check_debug_symbols(&exe)?;
        if !quiet {
            match status {
                SymbolStatus::Stripped => {
                    eprintln!("warning: binary stripped, stack traces will show addresses only");
                }
                SymbolStatus::SymbolTableOnly => {
                    eprintln!("warning: no DWARF debug info, source locations unavailable");
                }
                SymbolStatus::Dwarf | SymbolStatus::Unknown => {}
            }
        }
    }
    Ok(())
}

/// Check that this process's thread entries are readable
///
/// # Errors
/// Returns an error if `/proc/self/task` is missing or unreadable
pub fn check_proc_tasks() -> Result<()> {
    let entries = std::fs::read_dir("/proc/self/task").context(
        "Cannot read /proc/self/task\n\n\
         Thread snapshots need a mounted /proc.\n\
         Run with --no-snapshot to report hangs without stack traces.",
    )?;
    if entries.count() == 0 {
        bail!("/proc/self/task lists no threads; is /proc mounted correctly?");
    }
    Ok(())
}

/// Inspect a binary's symbol sections
///
/// # Errors
/// Returns an error if the binary cannot be read
pub fn check_debug_symbols(binary: &Path) -> Result<SymbolStatus> {
    let file_data = std::fs::read(binary)
        .with_context(|| format!("Failed to read binary: {}", binary.display()))?;

    let Ok(obj) = object::File::parse(&*file_data) else {
        return Ok(SymbolStatus::Unknown);
    };

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    Ok(match (has_debug_info, has_symtab) {
        (true, _) => SymbolStatus::Dwarf,
        (false, true) => SymbolStatus::SymbolTableOnly,
        (false, false) => SymbolStatus::Stripped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_tasks_readable() {
        assert!(check_proc_tasks().is_ok());
    }

    #[test]
    fn test_missing_binary() {
        let err = check_debug_symbols(Path::new("/nonexistent/path/to/binary")).unwrap_err();
        assert!(err.to_string().contains("Failed to read binary"));
    }

    #[test]
    fn test_non_object_file_is_unknown() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an elf").unwrap();
        assert_eq!(check_debug_symbols(file.path()).unwrap(), SymbolStatus::Unknown);
    }

    #[test]
    fn test_test_binary_has_symbols() {
        // Test builds keep the symbol table
        let exe = std::env::current_exe().unwrap();
        let status = check_debug_symbols(&exe).unwrap();
        assert!(matches!(status, SymbolStatus::Dwarf | SymbolStatus::SymbolTableOnly));
    }
}
