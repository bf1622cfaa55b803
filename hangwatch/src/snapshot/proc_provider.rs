//! `/proc`-based snapshot provider
//!
//! Capture walks `/proc/self/task` and records each thread's state. For a
//! thread blocked in the kernel, `/proc/<tid>/syscall` also gives its user
//! space program counter, which is where the thread will resume. Threads on
//! a CPU at capture time have no program counter to report.
//!
//! The file-backed mappings of `/proc/self/maps` are captured along with the
//! threads, so formatting resolves program counters against the address
//! space as it was during the hang.
//!
//! Formatting renders a crash-report-style text with the monitored thread
//! always first as `Thread 0`:
//!
//! ```text
//! Thread 0 name:  main (tid 4242, sleeping, wchan hrtimer_nanosleep)
//! Thread 0:
//! 0   libc.so.6                           0x00007f3a2b4e57fa 0x7f3a2b400000 + 927738
//!     [kernel] hrtimer_nanosleep+0xa1/0x130
//!
//! Thread 1 name:  hangwatch-watch (tid 4243, running)
//! Thread 1:
//!     (running, no frames available)
//! ```

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

use super::threads::{list_threads, sample_thread, ThreadSample};
use super::{first_frame_of_main, truncate_chars, FormattedSnapshot, Snapshot, SnapshotProvider};
use crate::domain::{Pid, SnapshotError, Tid};
use crate::symbolization::{read_mappings, Mapping, ModuleMap, Symbolizer};

/// Decoded form of a [`Snapshot`] produced by [`ProcSnapshotProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub monitored: Tid,
    /// Monitored thread first, then the rest in tid order
    pub threads: Vec<ThreadSample>,
    /// File-backed mappings at capture time
    pub mappings: Vec<Mapping>,
    /// Path of the main executable, whose frames get symbolized
    pub executable: Option<String>,
}

impl ProcessSnapshot {
    /// Address lookup over the mappings recorded at capture time
    #[must_use]
    pub fn module_map(&self) -> ModuleMap {
        ModuleMap::new(&self.mappings, self.executable.clone())
    }

    /// Serialize into the opaque blob form
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_snapshot(&self) -> Result<Snapshot, SnapshotError> {
        Ok(Snapshot::new(serde_json::to_vec(self)?))
    }

    /// Decode a blob produced by [`ProcessSnapshot::to_snapshot`]
    ///
    /// # Errors
    /// Returns [`SnapshotError::Empty`] for an empty blob and
    /// [`SnapshotError::Decode`] for anything that is not a snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, SnapshotError> {
        if snapshot.is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(serde_json::from_slice(snapshot.as_bytes())?)
    }
}

/// Snapshot provider for Linux reading `/proc/self/task`
pub struct ProcSnapshotProvider {
    monitored: Tid,
    max_stacktrace_length: usize,
    executable: Option<PathBuf>,
    /// Built on first format; `None` inside when the binary has no DWARF
    symbolizer: OnceLock<Option<Mutex<Symbolizer>>>,
}

impl ProcSnapshotProvider {
    #[must_use]
    pub fn new(monitored: Tid, max_stacktrace_length: usize) -> Self {
        Self {
            monitored,
            max_stacktrace_length,
            executable: std::env::current_exe().ok(),
            symbolizer: OnceLock::new(),
        }
    }

    /// Provider monitoring the calling thread
    #[must_use]
    pub fn for_current_thread(max_stacktrace_length: usize) -> Self {
        Self::new(Tid::current(), max_stacktrace_length)
    }

    #[must_use]
    pub fn monitored(&self) -> Tid {
        self.monitored
    }

    /// Read every thread of the process
    ///
    /// # Errors
    /// Returns an error if the task directory cannot be listed
    pub fn capture_process(&self) -> Result<ProcessSnapshot, SnapshotError> {
        let mut threads: Vec<ThreadSample> =
            list_threads()?.into_iter().filter_map(sample_thread).collect();

        let Some(main_idx) = threads.iter().position(|t| t.tid == self.monitored) else {
            return Err(SnapshotError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("monitored thread {} not found", self.monitored),
            )));
        };
        let main = threads.remove(main_idx);
        threads.insert(0, main);

        let pid = Pid::current();
        let mappings = read_mappings(pid).map_or_else(
            |e| {
                debug!("Cannot read memory maps, frames stay unresolved: {e}");
                Vec::new()
            },
            |all| all.into_iter().filter(Mapping::is_file_backed).collect(),
        );
        let executable = self.executable.as_ref().map(|p| p.to_string_lossy().into_owned());

        Ok(ProcessSnapshot { pid, monitored: self.monitored, threads, mappings, executable })
    }

    fn symbolizer(&self) -> Option<&Mutex<Symbolizer>> {
        self.symbolizer
            .get_or_init(|| {
                let path = self.executable.as_ref()?;
                match Symbolizer::new(path) {
                    Ok(symbolizer) => Some(Mutex::new(symbolizer)),
                    Err(e) => {
                        debug!("No DWARF symbolization for {}: {e:#}", path.display());
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Render the full, untruncated report text
    #[must_use]
    pub fn render(&self, process: &ProcessSnapshot, modules: &ModuleMap) -> String {
        let mut out = String::new();

        for (idx, thread) in process.threads.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            let _ = write!(
                out,
                "Thread {idx} name:  {} (tid {}, {}",
                thread.name,
                thread.tid.0,
                thread.state_name()
            );
            if let Some(wchan) = &thread.wchan {
                let _ = write!(out, ", wchan {wchan}");
            }
            let _ = writeln!(out, ")");
            let _ = writeln!(out, "Thread {idx}:");

            match thread.syscall.filter(|s| s.program_counter != 0) {
                Some(syscall) => {
                    self.render_frame(&mut out, syscall.program_counter, modules);
                }
                None => out.push_str("    (running, no frames available)\n"),
            }

            for symbol in &thread.kernel_stack {
                let _ = writeln!(out, "    [kernel] {symbol}");
            }
        }

        out
    }

    fn render_frame(&self, out: &mut String, pc: u64, modules: &ModuleMap) {
        let Some(location) = modules.resolve(pc) else {
            let _ = writeln!(out, "0   ???  0x{pc:016x}");
            return;
        };

        let _ = writeln!(
            out,
            "0   {:<35} 0x{pc:016x} 0x{:x} + {}",
            location.module, location.base, location.offset
        );

        if !location.is_main_executable {
            return;
        }
        if let Some(symbolizer) = self.symbolizer() {
            let resolved =
                symbolizer.lock().unwrap_or_else(PoisonError::into_inner).resolve(location.offset);
            if resolved.is_resolved() {
                out.push_str(&resolved.format_at_lines("    "));
                out.push('\n');
            }
        }
    }
}

impl SnapshotProvider for ProcSnapshotProvider {
    fn capture_snapshot(&self) -> Option<Snapshot> {
        let snapshot = self.capture_process().and_then(|process| process.to_snapshot());
        match snapshot {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Thread snapshot capture failed: {e}");
                None
            }
        }
    }

    fn format(&self, snapshot: &Snapshot) -> Result<FormattedSnapshot, SnapshotError> {
        let process = ProcessSnapshot::from_snapshot(snapshot)?;
        let full = self.render(&process, &process.module_map());
        let location =
            first_frame_of_main(&full).unwrap_or_else(|| "unknown location".to_string());

        Ok(FormattedSnapshot {
            message: format!("Hang detected at {location}"),
            stacktrace: truncate_chars(&full, self.max_stacktrace_length).to_string(),
        })
    }

    fn max_stacktrace_length(&self) -> usize {
        self.max_stacktrace_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::threads::SyscallSample;
    use crate::symbolization::parse_maps_line;

    fn thread(tid: u32, name: &str, pc: Option<u64>) -> ThreadSample {
        ThreadSample {
            tid: Tid(tid),
            name: name.to_string(),
            state: if pc.is_some() { 'S' } else { 'R' },
            wchan: pc.map(|_| "futex_wait_queue".to_string()),
            syscall: pc.map(|pc| SyscallSample {
                number: 202,
                stack_pointer: 0x7ffd_0000_1000,
                program_counter: pc,
            }),
            kernel_stack: Vec::new(),
        }
    }

    fn fake_mappings() -> Vec<Mapping> {
        let maps = "\
7f3a2b400000-7f3a2b428000 r--p 00000000 08:01 99 /usr/lib/libc.so.6
7f3a2b428000-7f3a2b5bd000 r-xp 00028000 08:01 99 /usr/lib/libc.so.6
";
        maps.lines().filter_map(parse_maps_line).collect()
    }

    fn fake_modules() -> ModuleMap {
        ModuleMap::new(&fake_mappings(), None)
    }

    fn process(threads: Vec<ThreadSample>) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: Pid(1),
            monitored: Tid(10),
            threads,
            mappings: fake_mappings(),
            executable: None,
        }
    }

    #[test]
    fn test_render_puts_monitored_thread_first() {
        let provider = ProcSnapshotProvider::new(Tid(10), 10_000);
        let process =
            process(vec![thread(10, "main", Some(0x7f3a_2b4c_2234)), thread(11, "worker", None)]);

        let text = provider.render(&process, &fake_modules());
        assert!(text.starts_with(
            "Thread 0 name:  main (tid 10, sleeping, wchan futex_wait_queue)\nThread 0:\n0   libc.so.6"
        ));
        assert!(text.contains("0x00007f3a2b4c2234 0x7f3a2b400000 + 795188"));
        assert!(text.contains("Thread 1 name:  worker (tid 11, running)"));
        assert!(text.contains("    (running, no frames available)"));
        assert_eq!(first_frame_of_main(&text).as_deref(), Some("libc.so.6 + 795188"));
    }

    #[test]
    fn test_unmapped_pc_is_unknown_location() {
        let provider = ProcSnapshotProvider::new(Tid(10), 10_000);
        let process = process(vec![thread(10, "main", Some(0x1000))]);
        let text = provider.render(&process, &fake_modules());
        assert_eq!(first_frame_of_main(&text).as_deref(), Some("unknown location"));
    }

    #[test]
    fn test_format_rejects_empty_and_garbage() {
        let provider = ProcSnapshotProvider::new(Tid(1), 10_000);
        assert!(matches!(provider.format(&Snapshot::new(Vec::new())), Err(SnapshotError::Empty)));
        assert!(matches!(
            provider.format(&Snapshot::new(b"not json".to_vec())),
            Err(SnapshotError::Decode(_))
        ));
    }

    #[test]
    fn test_format_running_main_thread() {
        let provider = ProcSnapshotProvider::new(Tid(10), 10_000);
        let process = process(vec![thread(10, "main", None)]);
        let formatted = provider.format(&process.to_snapshot().unwrap()).unwrap();
        assert_eq!(formatted.message, "Hang detected at unknown location");
        assert!(formatted.stacktrace.starts_with("Thread 0 name:  main"));
    }

    #[test]
    fn test_format_truncates() {
        let provider = ProcSnapshotProvider::new(Tid(10), 20);
        let process = process(vec![thread(10, "main", None), thread(11, "other", None)]);
        let formatted = provider.format(&process.to_snapshot().unwrap()).unwrap();
        assert_eq!(formatted.stacktrace.chars().count(), 20);
    }

    #[test]
    fn test_capture_current_process() {
        let provider = ProcSnapshotProvider::for_current_thread(10_000);
        let snapshot = provider.capture_snapshot().expect("capture must work on linux");

        let process = ProcessSnapshot::from_snapshot(&snapshot).unwrap();
        assert_eq!(process.threads[0].tid, provider.monitored());
        assert_eq!(process.pid, Pid::current());

        let formatted = provider.format(&snapshot).unwrap();
        assert!(formatted.message.starts_with("Hang detected at "));
        assert!(formatted.stacktrace.starts_with("Thread 0 name:"));
    }

    #[test]
    fn test_format_uses_mappings_from_capture_time() {
        let provider = ProcSnapshotProvider::new(Tid(10), 10_000);
        // libc mapped in the recorded address space, not in this process
        let process = process(vec![thread(10, "main", Some(0x7f3a_2b4c_2234))]);

        let formatted = provider.format(&process.to_snapshot().unwrap()).unwrap();
        assert_eq!(formatted.message, "Hang detected at libc.so.6 + 795188");
    }

    #[test]
    fn test_capture_records_file_backed_mappings() {
        let provider = ProcSnapshotProvider::for_current_thread(10_000);
        let process = provider.capture_process().unwrap();
        assert!(!process.mappings.is_empty());
        assert!(process.mappings.iter().all(Mapping::is_file_backed));
        assert!(process.executable.is_some());
    }

    #[test]
    fn test_capture_missing_thread_fails() {
        let provider = ProcSnapshotProvider::new(Tid(u32::MAX), 10_000);
        assert!(provider.capture_snapshot().is_none());
    }
}
