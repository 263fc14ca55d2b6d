//! Worker process for fanout job execution.
//!
//! Two modes, both speaking length-prefixed rkyv over stdin/stdout:
//!
//! - Serve mode (default): loop reading `WorkerCommand`s until Shutdown or
//!   EOF. Used by the process strategy, which keeps the worker alive for
//!   many jobs.
//! - `--bootstrap`: read exactly one serialized `Job`, execute it, write one
//!   serialized `JobOutcome`, exit. Used by the isolate strategy, which
//!   never reuses an instance.
//!
//! stdout is the wire; all logging goes to stderr.

use std::io::{BufReader, BufWriter, Read, Write};

use fanout_core::ipc::{WorkerCommand, WorkerReply, read_message, write_message};
use fanout_core::job::Job;
use fanout_core::probe;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let bootstrap = std::env::args().any(|arg| arg == "--bootstrap");

    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();

    if bootstrap {
        run_bootstrap(stdin, stdout)
    } else {
        serve(stdin, stdout)
    }
}

/// One-shot bootstrap: deserialize a job, run it, serialize the outcome back.
fn run_bootstrap<R: Read, W: Write>(mut input: R, output: W) -> anyhow::Result<()> {
    let job: Job = read_message(&mut input)?;
    tracing::debug!(?job, "bootstrap executing job");

    let outcome = job.execute();

    let mut writer = BufWriter::new(output);
    write_message(&mut writer, &outcome)?;
    writer.flush()?;
    Ok(())
}

/// Persistent serve loop for the process strategy.
fn serve<R: Read, W: Write>(input: R, output: W) -> anyhow::Result<()> {
    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let pid = std::process::id();

    tracing::debug!(pid, "worker ready");

    loop {
        let command: WorkerCommand = match read_message(&mut reader) {
            Ok(command) => command,
            Err(e) => {
                // Parent closed the pipe; treat EOF as an implicit shutdown.
                tracing::debug!(pid, "worker stdin closed: {}", e);
                break;
            }
        };

        match command {
            WorkerCommand::Ping => {
                write_message(&mut writer, &WorkerReply::Pong)?;
            }

            WorkerCommand::Run { job, probe_memory } => {
                let outcome = job.execute();

                let memory_mb = if probe_memory {
                    match probe::resident_memory_mb(None) {
                        Ok(snapshot) => snapshot.get(pid),
                        Err(e) => {
                            tracing::warn!(pid, "memory probe failed: {}", e);
                            None
                        }
                    }
                } else {
                    None
                };

                write_message(
                    &mut writer,
                    &WorkerReply::Done {
                        pid,
                        outcome,
                        memory_mb,
                    },
                )?;
            }

            WorkerCommand::Shutdown => {
                write_message(&mut writer, &WorkerReply::ShuttingDown)?;
                break;
            }
        }
    }

    tracing::debug!(pid, "worker exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::job::{JobOutcome, JobValue};
    use std::io::Cursor;

    #[test]
    fn test_bootstrap_executes_one_job() {
        let mut input = Vec::new();
        write_message(&mut input, &Job::Fibonacci { n: 10 }).unwrap();

        let mut output = Vec::new();
        run_bootstrap(Cursor::new(input), &mut output).unwrap();

        let outcome: JobOutcome = read_message(&mut Cursor::new(output)).unwrap();
        assert_eq!(outcome, JobOutcome::Success(JobValue::Int(55)));
    }

    #[test]
    fn test_serve_ping_then_shutdown() {
        let mut input = Vec::new();
        write_message(&mut input, &WorkerCommand::Ping).unwrap();
        write_message(&mut input, &WorkerCommand::Shutdown).unwrap();

        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();

        let mut cursor = Cursor::new(output);
        let first: WorkerReply = read_message(&mut cursor).unwrap();
        let second: WorkerReply = read_message(&mut cursor).unwrap();
        assert!(matches!(first, WorkerReply::Pong));
        assert!(matches!(second, WorkerReply::ShuttingDown));
    }

    #[test]
    fn test_serve_runs_job_and_reports_pid() {
        let mut input = Vec::new();
        write_message(
            &mut input,
            &WorkerCommand::Run {
                job: Job::Fail {
                    message: "boom".to_string(),
                },
                probe_memory: false,
            },
        )
        .unwrap();

        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();

        let reply: WorkerReply = read_message(&mut Cursor::new(output)).unwrap();
        match reply {
            WorkerReply::Done {
                pid,
                outcome,
                memory_mb,
            } => {
                assert_eq!(pid, std::process::id());
                assert_eq!(outcome, JobOutcome::Failed("boom".to_string()));
                assert!(memory_mb.is_none());
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }
}
