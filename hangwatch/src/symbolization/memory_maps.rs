//! Memory mapping utilities for process address space analysis
//!
//! Parses `/proc/<pid>/maps` so a program counter can be attributed to the
//! module it falls in (`libc.so.6 + 795188`) and, for the main executable,
//! converted to a file offset for DWARF lookup (PIE adjustment).

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::domain::Pid;

/// Memory range of a loaded binary in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub range: MemoryRange,
    pub perms: String,
    pub path: Option<String>,
}

/// Parse a single maps line: "start-end perms offset dev inode pathname"
#[must_use]
pub fn parse_maps_line(line: &str) -> Option<Mapping> {
    let mut parts = line.split_whitespace();
    let range = parts.next()?;
    let perms = parts.next()?.to_string();
    // offset, dev, inode
    let mut rest = parts.skip(3);
    let path = rest.next().map(|first| {
        // Paths may contain spaces; re-join whatever follows the inode
        std::iter::once(first).chain(rest).collect::<Vec<_>>().join(" ")
    });

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    Some(Mapping { range: MemoryRange { start, end }, perms, path })
}

impl Mapping {
    /// Backed by a file, as opposed to `[stack]`, `[vdso]` or anonymous memory
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        self.path.as_deref().is_some_and(|path| !path.starts_with('['))
    }
}

/// Read and parse every mapping of a process
///
/// # Errors
/// Returns an error if `/proc/<pid>/maps` cannot be read
pub fn read_mappings(pid: Pid) -> io::Result<Vec<Mapping>> {
    let maps = fs::read_to_string(format!("/proc/{}/maps", pid.0))?;
    let mappings: Vec<Mapping> = maps.lines().filter_map(parse_maps_line).collect();
    debug!("Read {} mappings of pid {}", mappings.len(), pid.0);
    Ok(mappings)
}

/// Where an address lives: module name, load base and offset from that base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub module: String,
    pub base: u64,
    pub offset: u64,
    pub is_main_executable: bool,
}

/// Address → module lookup built from one maps read
#[derive(Debug, Default)]
pub struct ModuleMap {
    /// (range, module path) for every file-backed mapping
    regions: Vec<(MemoryRange, String)>,
    /// Lowest mapped address per module path
    bases: HashMap<String, u64>,
    main_executable: Option<String>,
}

impl ModuleMap {
    /// Build from parsed mappings; `main_executable` marks the binary whose
    /// frames can be symbolized
    #[must_use]
    pub fn new(mappings: &[Mapping], main_executable: Option<String>) -> Self {
        let mut regions = Vec::new();
        let mut bases: HashMap<String, u64> = HashMap::new();

        for mapping in mappings.iter().filter(|m| m.is_file_backed()) {
            let Some(path) = mapping.path.as_ref() else {
                continue;
            };
            regions.push((mapping.range, path.clone()));
            bases
                .entry(path.clone())
                .and_modify(|base| *base = (*base).min(mapping.range.start))
                .or_insert(mapping.range.start);
        }

        Self { regions, bases, main_executable }
    }

    /// Attribute an address to the module containing it
    #[must_use]
    pub fn resolve(&self, addr: u64) -> Option<ModuleLocation> {
        let (_, path) = self.regions.iter().find(|(range, _)| range.contains(addr))?;
        let base = self.bases.get(path).copied().unwrap_or(0);
        let module = Path::new(path)
            .file_name()
            .map_or_else(|| path.clone(), |name| name.to_string_lossy().into_owned());

        Some(ModuleLocation {
            module,
            base,
            offset: addr - base,
            is_main_executable: self.main_executable.as_deref() == Some(path.as_str()),
        })
    }
}
