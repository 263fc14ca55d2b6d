//! Isolate strategy: one-shot fully isolated instances.
//!
//! The experimental, most expensive tier. Nothing is shared with an
//! instance, not even ordinary object passing: the job is serialized to
//! bytes and pushed through a pipe into a fresh `fanout-worker --bootstrap`
//! instance, whose bootstrap deserializes it, executes it, and serializes
//! the outcome back before exiting.
//!
//! Jobs are pre-assigned round-robin (job index modulo worker count) to one
//! supervisor thread per slot; the slot index is the worker identity. Any
//! failure in the transfer/execute/return pipeline collapses into a single
//! report under the sentinel id with the error text as payload; a job body
//! that fails but round-trips cleanly is an ordinary failed outcome under
//! the slot's id.

use crate::error::{Error, Result};
use crate::ipc;
use crate::job::{Job, JobOutcome};

use super::identity::{WorkerId, WorkerIdResolver};
use super::{AbortHandle, CompletionSink, JobReport};

/// Fully isolated one-shot instance strategy.
pub struct IsolateRunner {
    /// Number of concurrent slots, set at construction.
    workers: usize,
    /// Cooperative cancellation, checked before each dispatch.
    abort: AbortHandle,
}

impl IsolateRunner {
    /// Create a runner with a fixed slot count; rejects zero, which would
    /// leave the round-robin assignment with no slot to land in.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidWorkerCount(workers));
        }
        Ok(Self {
            workers,
            abort: AbortHandle::new(),
        })
    }

    /// Configured slot count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Install an abort handle.
    pub fn set_abort_handle(&mut self, handle: AbortHandle) {
        self.abort = handle;
    }

    /// Run a batch across `workers` supervisor slots.
    ///
    /// Each job gets a fresh isolated instance; instances are never reused.
    /// All supervisors are joined before this returns.
    pub fn start(&self, jobs: &[Job], sink: &dyn CompletionSink) -> Result<()> {
        let resolver = WorkerIdResolver::new();

        let mut slots: Vec<Vec<Job>> = vec![Vec::new(); self.workers];
        for (index, job) in jobs.iter().enumerate() {
            slots[index % self.workers].push(job.clone());
        }

        std::thread::scope(|scope| {
            for (slot, slot_jobs) in slots.into_iter().enumerate() {
                let resolver = &resolver;
                let abort = &self.abort;
                scope.spawn(move || {
                    for job in slot_jobs {
                        if abort.is_aborted() {
                            break;
                        }

                        match ipc::run_bootstrap(&job) {
                            Ok(outcome) => sink.job_complete(JobReport {
                                worker: resolver.resolve(slot),
                                outcome,
                                memory: None,
                            }),
                            Err(e) => {
                                tracing::warn!(slot, "isolate transfer failed: {}", e);
                                sink.job_complete(JobReport {
                                    worker: WorkerId::UNASSIGNED,
                                    outcome: JobOutcome::Failed(e.to_string()),
                                    memory: None,
                                });
                            }
                        }
                    }
                });
            }

            // All slots launched with their share of the batch: submission done.
            sink.batch_dispatched();
        });

        resolver.reset();
        Ok(())
    }
}
