//! # hangwatch - Demo Entry Point
//!
//! Runs a synthetic workload on the main thread under one of two schedulers
//! and reports its hangs:
//! - **Run loop** (`--scheduler runloop`): jobs posted from a feeder thread
//! - **Tokio** (`--scheduler tokio`): a current-thread runtime whose tasks
//!   occasionally block the thread
//!
//! Hang records go to the log (`RUST_LOG=warn` or finer) and, with
//! `--export`, to a Chrome trace file.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hangwatch::cli::{Args, Scheduler};
use hangwatch::clock::SystemClock;
use hangwatch::export::ChromeTraceSink;
use hangwatch::monitor::{RunLoop, TokioParkHooks};
use hangwatch::preflight::run_preflight_checks;
use hangwatch::snapshot::{NoopSnapshotProvider, SnapshotProvider};
use hangwatch::telemetry::{FanoutSink, LogSink, TelemetrySink};
use hangwatch::watchdog::{Watchdog, WatchdogStats};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Gap between jobs, long enough for the scheduler to go idle
const JOB_GAP: Duration = Duration::from_millis(20);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("invalid config") || msg.contains("invalid watchdog configuration") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn snapshot_provider(args: &Args, max_stacktrace_length: usize) -> Arc<dyn SnapshotProvider> {
    if args.no_snapshot {
        return Arc::new(NoopSnapshotProvider::new(max_stacktrace_length));
    }
    #[cfg(target_os = "linux")]
    {
        Arc::new(hangwatch::snapshot::ProcSnapshotProvider::for_current_thread(
            max_stacktrace_length,
        ))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(NoopSnapshotProvider::new(max_stacktrace_length))
    }
}

fn job_duration(args: &Args, n: u32) -> Duration {
    if args.is_hang_job(n) {
        Duration::from_millis(args.hang_ms)
    } else {
        Duration::from_millis(args.work_ms)
    }
}

/// Feed jobs to a run loop from another thread, one per turn
fn run_on_run_loop(args: &Args, watchdog: &Watchdog) -> Result<()> {
    let run_loop = RunLoop::new();
    watchdog.attach(&run_loop).context("Failed to attach to run loop")?;

    let handle = run_loop.handle();
    let durations: Vec<Duration> = (1..=args.jobs).map(|n| job_duration(args, n)).collect();
    let feeder = thread::Builder::new()
        .name("hangwatch-feeder".to_string())
        .spawn(move || {
            for duration in durations {
                thread::sleep(JOB_GAP);
                if !handle.post(move || thread::sleep(duration)) {
                    break;
                }
            }
            handle.stop();
        })
        .context("Failed to spawn feeder thread")?;

    let stats = run_loop.run();
    info!("Run loop finished: {} turns, {} jobs", stats.turns, stats.jobs_run);

    if feeder.join().is_err() {
        anyhow::bail!("Feeder thread panicked");
    }
    Ok(())
}

/// Run the jobs as tasks on a current-thread Tokio runtime
fn run_on_tokio(args: &Args, watchdog: &Watchdog) -> Result<()> {
    let hooks = TokioParkHooks::for_current_thread();
    let mut builder = tokio::runtime::Builder::new_current_thread();
    builder.enable_all();
    hooks.install(&mut builder);
    let runtime = builder.build().context("Failed to build Tokio runtime")?;
    watchdog.attach(&hooks).context("Failed to attach to Tokio runtime")?;

    hooks.block_on(&runtime, async {
        for n in 1..=args.jobs {
            tokio::time::sleep(JOB_GAP).await;
            // Blocks the only runtime thread, like a slow UI callback
            thread::sleep(job_duration(args, n));
        }
    });
    Ok(())
}

fn print_summary(args: &Args, stats: &WatchdogStats) {
    println!(
        "{} jobs on {:?}: {} hangs reported ({} snapshots captured)",
        args.jobs, args.scheduler, stats.reports_emitted, stats.captures_succeeded
    );
    if !args.quiet {
        println!("  {stats}");
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.watchdog_config()?;

    run_preflight_checks(!args.no_snapshot, args.quiet)?;

    if !args.quiet {
        println!("hangwatch v{}", env!("CARGO_PKG_VERSION"));
    }

    let trace = args.export.as_ref().map(|_| Arc::new(ChromeTraceSink::new("main")));
    let mut sinks = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(trace) = &trace {
        sinks = sinks.with(Arc::clone(trace) as Arc<dyn TelemetrySink>);
    }

    let provider = snapshot_provider(&args, config.max_stacktrace_length);
    let watchdog =
        Watchdog::start(config, Arc::new(SystemClock::new()), provider, Arc::new(sinks))?;

    match args.scheduler {
        Scheduler::Runloop => run_on_run_loop(&args, &watchdog)?,
        Scheduler::Tokio => run_on_tokio(&args, &watchdog)?,
    }

    let stats = watchdog.shutdown();
    print_summary(&args, &stats);

    if let (Some(path), Some(trace)) = (&args.export, &trace) {
        trace
            .write_to_file(path)
            .with_context(|| format!("Failed to write trace: {}", path.display()))?;
        if !args.quiet {
            println!("Wrote {} hang records to {}", trace.event_count(), path.display());
        }
    }

    Ok(())
}
