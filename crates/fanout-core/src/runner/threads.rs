//! Thread-pool strategy: shared-memory worker threads.
//!
//! The cheapest tier to start. A rayon pool of exactly `workers` threads is
//! built per batch and dropped when the batch ends; jobs and results pass by
//! reference, nothing is serialized. Which thread picks up which job is left
//! to rayon's work stealing.

use crate::error::{Error, Result};
use crate::job::Job;

use super::identity::WorkerIdResolver;
use super::{AbortHandle, CompletionSink, JobReport};

/// Shared-memory thread pool strategy.
pub struct ThreadRunner {
    /// Fixed pool size, set at construction.
    workers: usize,
    /// Cooperative cancellation, checked before each dispatch.
    abort: AbortHandle,
}

impl ThreadRunner {
    /// Create a runner with a fixed worker count; rejects zero.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidWorkerCount(workers));
        }
        Ok(Self {
            workers,
            abort: AbortHandle::new(),
        })
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Install an abort handle.
    pub fn set_abort_handle(&mut self, handle: AbortHandle) {
        self.abort = handle;
    }

    /// Run a batch on a fresh pool of `workers` threads.
    ///
    /// Worker identity is the pool thread's own index, never parsed back out
    /// of a thread name, routed through the resolver so ids come out in
    /// first-seen order. All pool threads are joined (the pool is dropped)
    /// before this returns.
    pub fn start(&self, jobs: &[Job], sink: &dyn CompletionSink) -> Result<()> {
        let resolver = WorkerIdResolver::new();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::Execution(format!("failed to build thread pool: {}", e)))?;

        pool.scope(|scope| {
            for job in jobs {
                if self.abort.is_aborted() {
                    break;
                }

                let resolver = &resolver;
                scope.spawn(move |_| {
                    let slot = rayon::current_thread_index().unwrap_or(0);
                    let outcome = job.execute();
                    sink.job_complete(JobReport {
                        worker: resolver.resolve(slot),
                        outcome,
                        memory: None,
                    });
                });
            }

            // Every job has been handed to the pool: submission is done,
            // even though results may still be in flight.
            sink.batch_dispatched();
        });

        resolver.reset();
        Ok(())
    }
}
