//! IPC layer for worker processes.
//!
//! - `protocol` - length-prefixed rkyv messages over stdin/stdout
//! - `worker` - spawning and talking to `fanout-worker` processes

pub mod protocol;
pub mod worker;

pub use protocol::{WorkerCommand, WorkerReply, read_message, write_message};
pub use worker::{WorkerHandle, run_bootstrap};
