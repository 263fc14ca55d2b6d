//! Worker process management.
//!
//! Provides `WorkerHandle` for spawning and communicating with a persistent
//! worker process (process strategy), and `run_bootstrap` for one-shot
//! isolated instances (isolate strategy).
//!
//! Workers are always started by spawning an explicit `fanout-worker` binary
//! with piped stdin/stdout. Spawning a named binary (rather than forking and
//! inheriting the parent image) keeps startup behavior identical across host
//! operating systems.

use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::job::{Job, JobOutcome};

use super::protocol::{WorkerCommand, WorkerReply, read_message, write_message};

/// Handle to a persistent worker process.
///
/// Provides methods to send commands, receive replies, and kill the process.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Buffered stdin writer.
    stdin: BufWriter<std::process::ChildStdin>,
    /// Buffered stdout reader.
    stdout: BufReader<std::process::ChildStdout>,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn a new worker process and verify it answers a ping.
    pub fn spawn() -> Result<Self> {
        let worker_path = find_worker_binary()?;

        let mut child = Command::new(&worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker stderr pass through for debugging
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to spawn worker process '{}': {}",
                    worker_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        let mut handle = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            killed: false,
        };

        handle.send_command(&WorkerCommand::Ping)?;
        match handle.recv_reply()? {
            WorkerReply::Pong => Ok(handle),
            other => Err(Error::Ipc(format!(
                "Unexpected response from worker: {:?}",
                other
            ))),
        }
    }

    /// Send a command to the worker.
    pub fn send_command(&mut self, cmd: &WorkerCommand) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        write_message(&mut self.stdin, cmd)
    }

    /// Receive a reply from the worker.
    pub fn recv_reply(&mut self) -> Result<WorkerReply> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        read_message(&mut self.stdout)
    }

    /// Run one job in the worker, blocking until its outcome arrives.
    ///
    /// Returns the worker's pid, the outcome, and the worker's own
    /// resident-memory measurement when `probe_memory` was requested.
    pub fn run_job(&mut self, job: Job, probe_memory: bool) -> Result<(u32, JobOutcome, Option<f64>)> {
        self.send_command(&WorkerCommand::Run { job, probe_memory })?;

        match self.recv_reply()? {
            WorkerReply::Done {
                pid,
                outcome,
                memory_mb,
            } => Ok((pid, outcome, memory_mb)),
            other => Err(Error::Ipc(format!(
                "Unexpected response when running job: {:?}",
                other
            ))),
        }
    }

    /// Kill the worker process immediately.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        self.killed = true;

        // Try graceful shutdown first so the worker can flush and exit
        let _ = write_message(&mut self.stdin, &WorkerCommand::Shutdown);
        std::thread::sleep(Duration::from_millis(10));

        // Force kill if still running
        if let Err(e) = self.child.kill() {
            // ESRCH means process already exited, which is fine
            if !e.to_string().contains("No such process") {
                tracing::warn!("Failed to kill worker: {}", e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();

        Ok(())
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Graceful shutdown - ask the worker to exit cleanly and wait for it.
    pub fn shutdown(mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        let _ = self.send_command(&WorkerCommand::Shutdown);
        self.killed = true;

        match self.child.wait() {
            Ok(status) => {
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::Ipc(format!("Worker exited with status: {}", status)))
                }
            }
            Err(e) => Err(Error::Ipc(format!("Failed to wait for worker: {}", e))),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Ensure worker is killed when handle is dropped
        let _ = self.kill();
    }
}

/// Run one job in a fresh one-shot isolated instance.
///
/// The job is serialized into the instance's stdin pipe; the bootstrap inside
/// the instance deserializes it, executes it, and serializes the outcome back
/// through stdout before exiting. The instance is never reused.
pub fn run_bootstrap(job: &Job) -> Result<JobOutcome> {
    let worker_path = find_worker_binary()?;

    let mut child = Command::new(&worker_path)
        .arg("--bootstrap")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            Error::Ipc(format!(
                "Failed to spawn isolated instance '{}': {}",
                worker_path.display(),
                e
            ))
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Ipc("Failed to get instance stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Ipc("Failed to get instance stdout".to_string()))?;

    // Write the job and close the pipe so the bootstrap sees EOF after it.
    let mut writer = BufWriter::new(stdin);
    write_message(&mut writer, job)?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush job to instance: {}", e)))?;
    drop(writer);

    let mut reader = BufReader::new(stdout);
    let outcome: JobOutcome = read_message(&mut reader)?;

    let status = child
        .wait()
        .map_err(|e| Error::Ipc(format!("Failed to wait for instance: {}", e)))?;
    if !status.success() {
        return Err(Error::Ipc(format!(
            "Isolated instance exited with status: {}",
            status
        )));
    }

    Ok(outcome)
}

/// Find the fanout-worker binary path.
///
/// Looks in the following order:
/// 1. `FANOUT_WORKER_PATH` environment variable
/// 2. Same directory as the current executable
/// 3. System PATH
/// 4. Cargo target directories (development builds)
fn find_worker_binary() -> Result<PathBuf> {
    let worker_name = if cfg!(windows) {
        "fanout-worker.exe"
    } else {
        "fanout-worker"
    };

    // 1. Check environment variable
    if let Ok(path) = std::env::var("FANOUT_WORKER_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    // 2. Look next to current executable
    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let worker_path = exe_dir.join(worker_name);
        if worker_path.exists() {
            return Ok(worker_path);
        }
    }

    // 3. Try system PATH via which
    if let Ok(path) = which::which(worker_name) {
        return Ok(path);
    }

    // 4. For development: try target/debug or target/release
    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in &["debug", "release"] {
            let path = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(worker_name);
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }
    }

    Err(Error::Ipc(
        "Could not find fanout-worker binary. Set FANOUT_WORKER_PATH or ensure it's in PATH."
            .to_string(),
    ))
}
