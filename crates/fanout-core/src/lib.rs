//! Core engine for fanout: concurrent batch job execution under
//! interchangeable isolation strategies.
//!
//! This crate provides:
//! - Job definitions that can cross isolation boundaries
//! - Three execution strategies behind one contract (threads, processes,
//!   one-shot isolated instances)
//! - Stable per-batch worker identities
//! - The IPC protocol spoken with `fanout-worker` processes
//! - A resident-memory probe for worker processes

pub mod error;
pub mod ipc;
pub mod job;
pub mod probe;
pub mod runner;

pub use error::{Error, Result};
pub use job::{Batch, Job, JobOutcome, JobValue};
pub use probe::MemorySnapshot;
pub use runner::{
    AbortHandle, CompletionSink, IsolateRunner, JobReport, ProcessRunner, Runner, RunnerKind,
    ThreadRunner, WorkerId, WorkerIdResolver,
};
