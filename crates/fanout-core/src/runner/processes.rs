//! Process-pool strategy: separate OS worker processes.
//!
//! One supervisor thread per worker slot, each owning one persistent
//! `fanout-worker` child process. Supervisors drain a shared queue, so load
//! balancing falls out of whoever finishes first. Jobs and outcomes cross
//! the process boundary as rkyv messages; the reply names the worker's OS
//! pid, which the resolver maps to a small id fresh for every batch (the OS
//! reuses pids, the mapping must not outlive the batch).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::ipc::WorkerHandle;
use crate::job::{Job, JobOutcome};
use crate::probe::MemorySnapshot;

use super::identity::{WorkerId, WorkerIdResolver};
use super::{AbortHandle, CompletionSink, JobReport};

/// OS process pool strategy.
pub struct ProcessRunner {
    /// Fixed pool size, set at construction.
    workers: usize,
    /// Whether workers report their resident memory with each result.
    probe_memory: bool,
    /// Cooperative cancellation, checked before each dispatch.
    abort: AbortHandle,
}

impl ProcessRunner {
    /// Create a runner with a fixed worker count; rejects zero. Memory
    /// probing is off until enabled with
    /// [`set_memory_probe`](Self::set_memory_probe).
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidWorkerCount(workers));
        }
        Ok(Self {
            workers,
            probe_memory: false,
            abort: AbortHandle::new(),
        })
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Enable or disable per-result resident-memory reporting.
    pub fn set_memory_probe(&mut self, enabled: bool) {
        self.probe_memory = enabled;
    }

    /// Install an abort handle.
    pub fn set_abort_handle(&mut self, handle: AbortHandle) {
        self.abort = handle;
    }

    /// Run a batch across `workers` freshly spawned worker processes.
    ///
    /// All workers are shut down and all supervisor threads joined before
    /// this returns; the pid mapping is reset for the next batch.
    pub fn start(&self, jobs: &[Job], sink: &dyn CompletionSink) -> Result<()> {
        let resolver = WorkerIdResolver::new();
        let queue: Mutex<VecDeque<Job>> = Mutex::new(jobs.iter().cloned().collect());

        let result = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            for _ in 0..self.workers {
                let queue = &queue;
                let resolver = &resolver;
                handles.push(
                    scope.spawn(move || self.supervise(queue, resolver, sink)),
                );
            }

            // Every job is queued and every slot launched: submission done.
            sink.batch_dispatched();

            let mut first_err: Option<Error> = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        first_err.get_or_insert(e);
                    }
                    Err(_) => {
                        first_err
                            .get_or_insert(Error::Execution("supervisor thread panicked".into()));
                    }
                }
            }

            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        });

        resolver.reset();
        result
    }

    /// One supervisor: own a worker process, drain the queue through it.
    ///
    /// A worker that dies mid-job still produces a report for that job (as a
    /// failure under the sentinel id); the supervisor then spawns a
    /// replacement for the next job, so one crash never blocks the batch.
    /// A job that was popped but could not be given a worker reports the
    /// same way: every popped job produces exactly one callback, and the
    /// first spawn error surfaces only after the queue has drained.
    fn supervise(
        &self,
        queue: &Mutex<VecDeque<Job>>,
        resolver: &WorkerIdResolver<u32>,
        sink: &dyn CompletionSink,
    ) -> Result<()> {
        // Spawned lazily so an empty queue costs no process.
        let mut current: Option<WorkerHandle> = None;
        let mut first_spawn_err: Option<Error> = None;

        while !self.abort.is_aborted() {
            let job = queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            let Some(job) = job else { break };

            let mut worker = match current.take() {
                Some(worker) => worker,
                None => match WorkerHandle::spawn() {
                    Ok(worker) => worker,
                    Err(e) => {
                        tracing::warn!("failed to spawn worker: {}", e);
                        sink.job_complete(JobReport {
                            worker: WorkerId::UNASSIGNED,
                            outcome: JobOutcome::Failed(e.to_string()),
                            memory: None,
                        });
                        first_spawn_err.get_or_insert(e);
                        continue;
                    }
                },
            };

            match worker.run_job(job, self.probe_memory) {
                Ok((pid, outcome, memory_mb)) => {
                    sink.job_complete(JobReport {
                        worker: resolver.resolve(pid),
                        outcome,
                        memory: memory_mb.map(|mb| MemorySnapshot::single(pid, mb)),
                    });
                    current = Some(worker);
                }
                Err(e) => {
                    tracing::warn!(pid = worker.pid(), "worker failed mid-job: {}", e);
                    let _ = worker.kill();
                    sink.job_complete(JobReport {
                        worker: WorkerId::UNASSIGNED,
                        outcome: JobOutcome::Failed(e.to_string()),
                        memory: None,
                    });
                    // Next loop iteration spawns a replacement.
                }
            }
        }

        if let Some(worker) = current {
            let _ = worker.shutdown();
        }
        match first_spawn_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_configuration() {
        let mut runner = ProcessRunner::new(4).unwrap();
        assert_eq!(runner.workers(), 4);
        assert!(!runner.probe_memory);

        runner.set_memory_probe(true);
        assert!(runner.probe_memory);
    }

    #[test]
    fn test_zero_workers_rejected() {
        match ProcessRunner::new(0) {
            Err(Error::InvalidWorkerCount(0)) => {}
            Err(other) => panic!("expected InvalidWorkerCount, got {:?}", other),
            Ok(_) => panic!("zero workers must not construct a runner"),
        }
    }

    // Batch behavior is covered by tests/strategy_contract.rs, which needs
    // the fanout-worker binary on disk.
}
