//! # Symbol Resolution and Address Translation
//!
//! Converts raw program counters found in a thread snapshot (for example
//! `0x55f3a2b4c780`) into something a human can group and read:
//!
//! - **Module + offset**: `libc.so.6 + 795188`, stable across runs despite
//!   ASLR, which keeps hang messages groupable
//! - **Function, file, line**: only for the main executable, via DWARF
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Snapshot records a program counter
//!    pc = 0x55f3a2b4c780
//!
//! 2. /proc/self/maps says which module holds it
//!    /usr/bin/app mapped at 0x55f3a2b4c000 - 0x55f3a2b5f000
//!
//! 3. offset = pc - lowest mapped address of that module = 0x780
//!
//! 4. For the main executable, look the offset up in DWARF
//!    0x780 → app::render::layout at src/render.rs:42
//! ```
//!
//! **Libraries used**:
//! - `gimli`: Low-level DWARF parser
//! - `addr2line`: High-level symbolization library built on gimli
//! - `object`: ELF binary parser
//! - `rustc-demangle`: Rust symbol demangling
//!
//! ## Limitations
//!
//! - **Requires debug symbols** for function names: build with `debug = true`
//! - **Shared libraries** are reported as module + offset only
//!
//! ## References
//!
//! - [DWARF Debugging Format](http://dwarfstd.org/)
//! - [Linux `/proc/pid/maps` format](https://man7.org/linux/man-pages/man5/proc.5.html)

pub mod memory_maps;
pub mod symbolizer;

pub use memory_maps::{
    parse_maps_line, read_mappings, Mapping, MemoryRange, ModuleLocation, ModuleMap,
};
pub use symbolizer::{ResolvedFrame, Symbolizer};
