//! Run command implementation for the fanout CLI.
//!
//! Builds the batch, runs it under the requested strategy, and acts as the
//! completion sink: per-job lines as they finish, then a summary. Memory
//! snapshots forwarded by the process strategy are merged here into a
//! running per-pid total; the engine itself never aggregates them.

use std::sync::Mutex;
use std::time::Instant;

use fanout_core::{
    Batch, CompletionSink, Job, JobOutcome, JobReport, MemorySnapshot, Runner, RunnerKind,
};
use serde::Serialize;

/// Shape of one `--json` output line.
#[derive(Serialize)]
struct ReportLine<'a> {
    worker: i32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_mb: Option<f64>,
}

/// Completion sink that prints each report and tallies the batch.
struct PrintSink {
    json: bool,
    state: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    completed: usize,
    failed: usize,
    memory_total: MemorySnapshot,
}

impl PrintSink {
    fn new(json: bool) -> Self {
        Self {
            json,
            state: Mutex::new(SinkState::default()),
        }
    }

    fn print_report(&self, report: &JobReport) {
        if self.json {
            let memory_mb = report
                .memory
                .as_ref()
                .and_then(|snap| snap.entries().next().map(|(_, mb)| mb));
            let line = match &report.outcome {
                JobOutcome::Success(value) => ReportLine {
                    worker: report.worker.as_i32(),
                    ok: true,
                    value: Some(value.to_string()),
                    error: None,
                    memory_mb,
                },
                JobOutcome::Failed(message) => ReportLine {
                    worker: report.worker.as_i32(),
                    ok: false,
                    value: None,
                    error: Some(message),
                    memory_mb,
                },
            };
            // Serializing a struct of plain fields cannot fail.
            if let Ok(json) = serde_json::to_string(&line) {
                println!("{}", json);
            }
        } else {
            match &report.outcome {
                JobOutcome::Success(value) => {
                    println!("Worker id: {}, result: {}", report.worker, value)
                }
                JobOutcome::Failed(message) => {
                    println!("Worker id: {}, FAILED: {}", report.worker, message)
                }
            }
        }
    }
}

impl CompletionSink for PrintSink {
    fn job_complete(&self, report: JobReport) {
        self.print_report(&report);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match report.outcome {
            JobOutcome::Success(_) => state.completed += 1,
            JobOutcome::Failed(_) => state.failed += 1,
        }
        if let Some(snapshot) = report.memory {
            state.memory_total.merge(&snapshot);
        }
    }

    fn batch_dispatched(&self) {
        if !self.json {
            println!("All jobs submitted, waiting for results...");
        }
    }
}

/// Execute a batch under the given strategy.
pub fn execute(
    strategy: &str,
    workers: usize,
    jobs: usize,
    fib: i64,
    fail: usize,
    probe_memory: bool,
    json: bool,
) -> anyhow::Result<()> {
    let kind: RunnerKind = strategy.parse()?;

    let mut batch: Batch = vec![Job::Fibonacci { n: fib }; jobs];
    batch.extend(
        (0..fail).map(|i| Job::Fail {
            message: format!("injected failure {}", i),
        }),
    );

    let mut runner = Runner::new(kind, workers)?;
    runner.set_memory_probe(probe_memory);

    if !json {
        println!("Running {} jobs with {} workers ({})", batch.len(), workers, kind);
    }

    let start = Instant::now();
    let sink = PrintSink::new(json);
    runner.start(&batch, &sink)?;
    let elapsed = start.elapsed();

    let state = sink.state.lock().unwrap_or_else(|e| e.into_inner());
    if !json {
        println!(
            "Done: {} succeeded, {} failed in {:.2}s",
            state.completed,
            state.failed,
            elapsed.as_secs_f64()
        );
        if !state.memory_total.is_empty() {
            println!("Worker resident memory (latest per pid):");
            let mut entries: Vec<_> = state.memory_total.entries().collect();
            entries.sort_by_key(|(pid, _)| *pid);
            for (pid, mb) in entries {
                println!("  pid {}: {:.1} MB", pid, mb);
            }
        }
    }

    Ok(())
}
