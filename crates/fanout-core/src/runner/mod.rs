//! Execution strategies for batches of jobs.
//!
//! Three interchangeable isolation tiers run the same batch contract:
//!
//! - **`ThreadRunner`** - shared-memory worker threads. Cheapest to start;
//!   jobs and results pass by reference.
//! - **`ProcessRunner`** - separate OS worker processes. Jobs and outcomes
//!   are marshaled over pipes; workers can report their resident memory.
//! - **`IsolateRunner`** - one-shot fully isolated instances. Everything
//!   crosses the boundary as serialized bytes. Most expensive to start.
//!
//! # Architecture
//!
//! ```text
//! Runner::new(kind, workers)          (factory: closed enum, no string map)
//!     │
//!     └── Runner::start(jobs, sink)
//!             │
//!             ├── spins up exactly `workers` execution units
//!             ├── dispatches every job to some unit (pool load balancing)
//!             ├── sink.job_complete(report) once per job, completion order
//!             ├── sink.batch_dispatched() once, after submission finishes
//!             └── joins every unit, resets WorkerId mapping, returns
//! ```
//!
//! `batch_dispatched` signals that *submission* of the batch has finished,
//! not that results have arrived; callbacks may still be in flight when it
//! fires. `start` itself does not return until every callback has fired.
//!
//! # Module Structure
//!
//! - `identity` - WorkerId and the per-batch first-seen resolver
//! - `threads` - shared-memory thread pool strategy
//! - `processes` - OS process pool strategy
//! - `isolates` - one-shot isolated instance strategy

mod identity;
mod isolates;
mod processes;
mod threads;

pub use identity::{WorkerId, WorkerIdResolver};
pub use isolates::IsolateRunner;
pub use processes::ProcessRunner;
pub use threads::ThreadRunner;

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::job::{Job, JobOutcome};
use crate::probe::MemorySnapshot;

/// One finished job, as reported to the completion sink.
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Which execution unit ran the job; [`WorkerId::UNASSIGNED`] when the
    /// job never reached a unit (isolate transfer failure).
    pub worker: WorkerId,
    /// How the job ended.
    pub outcome: JobOutcome,
    /// Resident-memory snapshot of the worker that ran the job, when the
    /// strategy probes memory. Forwarded as-is, never aggregated here.
    pub memory: Option<MemorySnapshot>,
}

/// Callback sink for batch progress.
///
/// Both methods may be invoked from worker-owned threads, concurrently with
/// each other; implementations synchronize their own shared state.
pub trait CompletionSink: Send + Sync {
    /// Called exactly once per job in the batch, in completion order.
    fn job_complete(&self, report: JobReport);

    /// Called exactly once, when submission of the whole batch has finished
    /// dispatching. Results may still be outstanding at that point.
    fn batch_dispatched(&self);
}

/// Handle for cooperative cancellation of a running batch.
///
/// Can be cloned and shared across threads; any clone can trigger the abort.
/// A runner that observes the abort stops submitting new jobs; jobs already
/// dispatched still complete and report.
#[derive(Clone, Default)]
pub struct AbortHandle {
    /// Shared abort flag.
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Clear the flag before starting a new batch.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }
}

/// The closed set of strategy tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerKind {
    /// Shared-memory worker threads.
    Thread,
    /// Separate OS worker processes.
    Process,
    /// One-shot fully isolated instances.
    Subinterpreter,
}

impl RunnerKind {
    /// All known strategies, in documentation order.
    pub const ALL: [RunnerKind; 3] = [
        RunnerKind::Thread,
        RunnerKind::Process,
        RunnerKind::Subinterpreter,
    ];

    /// Canonical token for this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Thread => "THREAD",
            RunnerKind::Process => "PROCESS",
            RunnerKind::Subinterpreter => "SUBINTERPRETER",
        }
    }
}

impl FromStr for RunnerKind {
    type Err = Error;

    /// Parse a strategy token, case-insensitively.
    ///
    /// Fails loud at construction time; an unknown token never turns into a
    /// usable-looking runner.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "THREAD" => Ok(RunnerKind::Thread),
            "PROCESS" => Ok(RunnerKind::Process),
            "SUBINTERPRETER" => Ok(RunnerKind::Subinterpreter),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constructed execution strategy.
///
/// Closed tagged enum over the three strategies; dispatch is an exhaustive
/// match, so there is no runtime lookup that can miss.
pub enum Runner {
    /// Thread-pool strategy.
    Threads(ThreadRunner),
    /// Process-pool strategy.
    Processes(ProcessRunner),
    /// Isolated-instance strategy.
    Isolates(IsolateRunner),
}

impl Runner {
    /// Build a runner for the given strategy and worker count.
    ///
    /// This is the canonical way callers turn a token into a ready-to-use
    /// strategy. A zero worker count is rejected by every strategy
    /// constructor, so the check holds for direct construction too.
    pub fn new(kind: RunnerKind, workers: usize) -> Result<Self> {
        Ok(match kind {
            RunnerKind::Thread => Runner::Threads(ThreadRunner::new(workers)?),
            RunnerKind::Process => Runner::Processes(ProcessRunner::new(workers)?),
            RunnerKind::Subinterpreter => Runner::Isolates(IsolateRunner::new(workers)?),
        })
    }

    /// Which strategy this runner implements.
    pub fn kind(&self) -> RunnerKind {
        match self {
            Runner::Threads(_) => RunnerKind::Thread,
            Runner::Processes(_) => RunnerKind::Process,
            Runner::Isolates(_) => RunnerKind::Subinterpreter,
        }
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        match self {
            Runner::Threads(r) => r.workers(),
            Runner::Processes(r) => r.workers(),
            Runner::Isolates(r) => r.workers(),
        }
    }

    /// Enable per-result resident-memory reporting.
    ///
    /// Only the process strategy has units that can report it; the other
    /// strategies ignore this.
    pub fn set_memory_probe(&mut self, enabled: bool) {
        if let Runner::Processes(r) = self {
            r.set_memory_probe(enabled);
        }
    }

    /// Install an abort handle checked between job dispatches.
    pub fn set_abort_handle(&mut self, handle: AbortHandle) {
        match self {
            Runner::Threads(r) => r.set_abort_handle(handle),
            Runner::Processes(r) => r.set_abort_handle(handle),
            Runner::Isolates(r) => r.set_abort_handle(handle),
        }
    }

    /// Run a batch to completion.
    ///
    /// Spins up the strategy's execution units, dispatches every job, streams
    /// per-job reports plus one `batch_dispatched` through `sink`, then tears
    /// the units down. When this returns, all callbacks have fired and the
    /// WorkerId mapping has been reset for the next batch.
    pub fn start(&self, jobs: &[Job], sink: &dyn CompletionSink) -> Result<()> {
        tracing::info!(
            strategy = %self.kind(),
            workers = self.workers(),
            jobs = jobs.len(),
            "starting batch"
        );

        match self {
            Runner::Threads(r) => r.start(jobs, sink),
            Runner::Processes(r) => r.start(jobs, sink),
            Runner::Isolates(r) => r.start(jobs, sink),
        }
    }
}
