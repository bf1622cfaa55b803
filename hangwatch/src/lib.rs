//! # hangwatch - Main-Thread Hang Watchdog
//!
//! hangwatch watches a cooperative scheduler's thread (a UI run loop, a
//! current-thread Tokio runtime) and reports every busy period longer than a
//! threshold as a `device.hang` record. While a hang is still in progress it
//! captures a snapshot of every thread, so the report can say where the
//! thread was stuck.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                Monitored thread (scheduler)                     │
//! │   RunLoop::run()  or  TokioParkHooks::block_on (current_thread) │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ on_busy() / on_idle()   (RunLoopMonitor)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     WatchdogCore                                │
//! │   EpisodeState (one mutex): id, start, snapshot, attempted      │
//! └───────┬───────────────────────────────────────────▲─────────────┘
//!         │ ClosedEpisode (channel)                   │ poll() every
//!         ▼                                           │ poll_interval
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               Watchdog thread ("hangwatch-watchdog")            │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Snapshot    │──▶│ HangReporter │──▶│  Telemetry   │         │
//! │  │  (/proc)     │   │  (format)    │   │    Sink      │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         │                                   │                   │
//! │         ▼                                   ▼                   │
//! │  ┌──────────────┐                   ┌──────────────┐            │
//! │  │ Symbolizer   │                   │    Export    │            │
//! │  │  (DWARF)     │                   │ (trace.json) │            │
//! │  └──────────────┘                   └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core
//!
//! - [`watchdog`]: episode state, poll step, poller and reporter threads
//! - [`monitor`]: idle/busy signal plumbing and scheduler adapters
//! - [`reporter`]: closed episode → `device.hang` record
//!
//! ### Collaborators
//!
//! - [`snapshot`]: thread snapshot capture and formatting
//! - [`symbolization`]: `/proc/<pid>/maps` and DWARF lookups
//! - [`telemetry`]: record sinks
//! - [`export`]: Chrome Trace Event Format JSON
//!
//! ### Support
//!
//! - [`config`], [`clock`], [`domain`], [`preflight`], [`cli`]
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use hangwatch::clock::SystemClock;
//! use hangwatch::config::WatchdogConfig;
//! use hangwatch::monitor::RunLoop;
//! use hangwatch::snapshot::NoopSnapshotProvider;
//! use hangwatch::telemetry::LogSink;
//! use hangwatch::watchdog::Watchdog;
//!
//! # fn main() -> Result<(), hangwatch::domain::WatchdogError> {
//! let run_loop = RunLoop::new();
//! let watchdog = Watchdog::start(
//!     WatchdogConfig::default(),
//!     Arc::new(SystemClock::new()),
//!     Arc::new(NoopSnapshotProvider::default()),
//!     Arc::new(LogSink),
//! )?;
//! watchdog.attach(&run_loop)?;
//!
//! let handle = run_loop.handle();
//! handle.post(|| std::thread::sleep(std::time::Duration::from_millis(300)));
//! handle.stop();
//! run_loop.run();
//!
//! let stats = watchdog.shutdown();
//! assert_eq!(stats.hangs_detected, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! - **Episode**: one busy period, from `on_busy` to `on_idle`
//! - **Prediction threshold**: `hang_threshold × prediction_ratio`; past it the
//!   poller captures a snapshot once
//! - **Stale snapshot**: a capture that finished after its episode ended;
//!   dropped, never attached to a later episode

pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod export;
pub mod monitor;
pub mod preflight;
pub mod reporter;
pub mod snapshot;
pub mod symbolization;
pub mod telemetry;
pub mod watchdog;
