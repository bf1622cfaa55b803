//! Per-thread state sampled from `/proc/self/task`
//!
//! Everything here is plain file reads of the calling process's own
//! entries, so it works without extra privileges. The kernel stack file is
//! root-only and is recorded when readable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::domain::Tid;

/// Where a blocked thread sits in user space, from `/proc/<tid>/syscall`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallSample {
    /// Syscall number, or -1 when blocked outside a syscall
    pub number: i64,
    pub stack_pointer: u64,
    pub program_counter: u64,
}

/// One thread's state at capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSample {
    pub tid: Tid,
    pub name: String,
    /// Scheduler state letter from `stat` (R, S, D, ...)
    pub state: char,
    /// Kernel function the thread is waiting in, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wchan: Option<String>,
    /// `None` while the thread is running on a CPU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syscall: Option<SyscallSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kernel_stack: Vec<String>,
}

impl ThreadSample {
    /// Human name for the scheduler state letter
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self.state {
            'R' => "running",
            'S' => "sleeping",
            'D' => "disk sleep",
            'T' | 't' => "stopped",
            'Z' => "zombie",
            'I' => "idle",
            _ => "unknown",
        }
    }
}

/// List the thread ids of the current process
///
/// # Errors
/// Returns an error if `/proc/self/task` cannot be read
pub fn list_threads() -> io::Result<Vec<Tid>> {
    let mut tids: Vec<Tid> = fs::read_dir("/proc/self/task")?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            entry.file_name().to_string_lossy().parse::<u32>().ok().map(Tid)
        })
        .collect();
    tids.sort();
    Ok(tids)
}

/// Sample one thread; `None` if it exited between listing and reading
#[must_use]
pub fn sample_thread(tid: Tid) -> Option<ThreadSample> {
    let dir = format!("/proc/self/task/{}", tid.0);
    let dir = Path::new(&dir);

    let stat = fs::read_to_string(dir.join("stat")).ok()?;
    let state = parse_stat_state(&stat).unwrap_or('?');
    let name = fs::read_to_string(dir.join("comm"))
        .map(|comm| comm.trim().to_string())
        .unwrap_or_default();
    let wchan = fs::read_to_string(dir.join("wchan"))
        .ok()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty() && w != "0");
    let syscall =
        fs::read_to_string(dir.join("syscall")).ok().and_then(|line| parse_syscall(&line));
    let kernel_stack = fs::read_to_string(dir.join("stack"))
        .map(|stack| parse_kernel_stack(&stack))
        .unwrap_or_default();

    Some(ThreadSample { tid, name, state, wchan, syscall, kernel_stack })
}

/// Scheduler state from a `stat` line: the field right after "(comm)"
///
/// The comm may itself contain spaces and parentheses, so anchor on the
/// last ')'.
#[must_use]
pub fn parse_stat_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// Parse `/proc/<tid>/syscall`
///
/// ```text
/// 202 0x7f..a0 0x80 0x0 0x0 0x0 0x0 0x7ffd4a2c1e38 0x7f3a2b4c2234
/// -1 0x7ffd4a2c1e38 0x7f3a2b4c2234
/// running
/// ```
///
/// Stack pointer and program counter are always the last two fields.
#[must_use]
pub fn parse_syscall(line: &str) -> Option<SyscallSample> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let number = fields[0].parse::<i64>().ok()?;
    let stack_pointer = parse_hex(fields[fields.len() - 2])?;
    let program_counter = parse_hex(fields[fields.len() - 1])?;
    Some(SyscallSample { number, stack_pointer, program_counter })
}

/// Parse `/proc/<tid>/stack` lines like `[<0>] futex_wait_queue+0x60/0x90`
#[must_use]
pub fn parse_kernel_stack(stack: &str) -> Vec<String> {
    stack
        .lines()
        .filter_map(|line| {
            let symbol = line.split_once("] ").map_or(line, |(_, s)| s).trim();
            (!symbol.is_empty()).then(|| symbol.to_string())
        })
        .collect()
}

fn parse_hex(field: &str) -> Option<u64> {
    u64::from_str_radix(field.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_state_with_tricky_comm() {
        assert_eq!(parse_stat_state("1234 (main) S 1 1234 1234 0"), Some('S'));
        assert_eq!(parse_stat_state("1234 (we (ird) R 1 1234"), Some('R'));
        assert_eq!(parse_stat_state("garbage"), None);
    }

    #[test]
    fn test_parse_syscall_variants() {
        let blocked = parse_syscall(
            "202 0x7f00000000a0 0x80 0x0 0x0 0x0 0x0 0x7ffd4a2c1e38 0x7f3a2b4c2234\n",
        )
        .unwrap();
        assert_eq!(blocked.number, 202);
        assert_eq!(blocked.stack_pointer, 0x7ffd_4a2c_1e38);
        assert_eq!(blocked.program_counter, 0x7f3a_2b4c_2234);

        let outside = parse_syscall("-1 0x7ffd4a2c1e38 0x7f3a2b4c2234").unwrap();
        assert_eq!(outside.number, -1);

        assert_eq!(parse_syscall("running\n"), None);
        assert_eq!(parse_syscall(""), None);
    }

    #[test]
    fn test_parse_kernel_stack() {
        let stack = "[<0>] futex_wait_queue+0x60/0x90\n[<0>] do_futex+0x105/0x1b0\n";
        assert_eq!(
            parse_kernel_stack(stack),
            vec!["futex_wait_queue+0x60/0x90", "do_futex+0x105/0x1b0"]
        );
    }

    #[test]
    fn test_sample_current_thread() {
        let tid = Tid::current();
        assert!(list_threads().unwrap().contains(&tid));

        let sample = sample_thread(tid).expect("own thread must be readable");
        assert_eq!(sample.tid, tid);
        // Sampling ourselves: we are on a CPU right now
        assert_eq!(sample.state, 'R');
        assert_eq!(sample.state_name(), "running");
    }

    #[test]
    fn test_sample_missing_thread() {
        assert!(sample_thread(Tid(u32::MAX)).is_none());
    }
}
