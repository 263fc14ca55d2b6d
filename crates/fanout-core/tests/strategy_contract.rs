//! Integration tests for the batch contract every strategy honors.
//!
//! Thread-strategy tests run self-contained. Process and isolate tests talk
//! to real worker processes, so they are ignored unless the fanout-worker
//! binary has been built (`cargo build -p fanout-worker`).

use std::sync::Mutex;

use fanout_core::{
    CompletionSink, Job, JobOutcome, JobReport, JobValue, Runner, RunnerKind, WorkerId,
};

/// What the sink observed, in observation order.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Completed(WorkerId),
    Dispatched,
}

#[derive(Default)]
struct CollectSink {
    events: Mutex<Vec<Event>>,
    reports: Mutex<Vec<JobReport>>,
}

impl CollectSink {
    fn new() -> Self {
        Self::default()
    }

    fn reports(&self) -> Vec<JobReport> {
        self.reports.lock().unwrap().clone()
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn dispatched_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Dispatched)
            .count()
    }

    /// Distinct assigned ids, sorted.
    fn assigned_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .reports()
            .iter()
            .filter(|r| r.worker.is_assigned())
            .map(|r| r.worker.as_i32())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl CompletionSink for CollectSink {
    fn job_complete(&self, report: JobReport) {
        self.events.lock().unwrap().push(Event::Completed(report.worker));
        self.reports.lock().unwrap().push(report);
    }

    fn batch_dispatched(&self) {
        self.events.lock().unwrap().push(Event::Dispatched);
    }
}

fn assert_contiguous_from_zero(ids: &[i32], max_workers: usize) {
    let expected: Vec<i32> = (0..ids.len() as i32).collect();
    assert_eq!(ids, expected, "ids must be contiguous from 0");
    assert!(
        ids.len() <= max_workers,
        "saw {} distinct units for {} workers",
        ids.len(),
        max_workers
    );
}

#[test]
fn thread_pool_runs_full_batch() {
    let runner = Runner::new(RunnerKind::Thread, 10).unwrap();
    let jobs = vec![Job::Fibonacci { n: 10 }; 50];
    let sink = CollectSink::new();

    runner.start(&jobs, &sink).unwrap();

    let reports = sink.reports();
    assert_eq!(reports.len(), 50);
    assert_eq!(sink.dispatched_count(), 1);
    for report in &reports {
        assert_eq!(report.outcome, JobOutcome::Success(JobValue::Int(55)));
        assert!(report.worker.is_assigned());
    }
    assert_contiguous_from_zero(&sink.assigned_ids(), 10);
}

#[test]
fn empty_batch_yields_only_dispatch() {
    // Safe for all strategies without a worker binary: worker processes are
    // only spawned when there is a job to run.
    for kind in [
        RunnerKind::Thread,
        RunnerKind::Process,
        RunnerKind::Subinterpreter,
    ] {
        let runner = Runner::new(kind, 4).unwrap();
        let sink = CollectSink::new();

        runner.start(&[], &sink).unwrap();

        assert!(sink.reports().is_empty(), "{}: no per-job callbacks", kind);
        assert_eq!(sink.dispatched_count(), 1, "{}: one dispatch", kind);
    }
}

#[test]
fn failing_job_still_reports_once() {
    let runner = Runner::new(RunnerKind::Thread, 2).unwrap();
    let jobs = vec![
        Job::Fibonacci { n: 10 },
        Job::Fail {
            message: "boom".to_string(),
        },
        Job::Fibonacci { n: -1 },
    ];
    let sink = CollectSink::new();

    runner.start(&jobs, &sink).unwrap();

    let reports = sink.reports();
    assert_eq!(reports.len(), 3);

    let failures: Vec<&JobReport> = reports.iter().filter(|r| !r.outcome.is_success()).collect();
    assert_eq!(failures.len(), 2);
    for failure in failures {
        // Failures are distinguishable from successes and still carry the
        // id of the thread that ran them.
        assert!(matches!(failure.outcome, JobOutcome::Failed(_)));
        assert!(failure.worker.is_assigned());
    }
}

#[test]
fn second_batch_restarts_worker_ids_at_zero() {
    let runner = Runner::new(RunnerKind::Thread, 3).unwrap();
    let jobs = vec![Job::Fibonacci { n: 15 }; 9];

    let first = CollectSink::new();
    runner.start(&jobs, &first).unwrap();
    let second = CollectSink::new();
    runner.start(&jobs, &second).unwrap();

    assert_eq!(second.reports().len(), 9);
    // No leakage: the second batch's mapping starts over at 0.
    assert_contiguous_from_zero(&second.assigned_ids(), 3);
}

#[test]
fn dispatch_fires_before_results_finish() {
    let runner = Runner::new(RunnerKind::Thread, 1).unwrap();
    let jobs = vec![Job::Sleep { millis: 500 }, Job::Sleep { millis: 1 }];
    let sink = CollectSink::new();

    runner.start(&jobs, &sink).unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 3);
    // Submission completes while the single worker is still sleeping on the
    // first job, so Dispatched precedes every completion.
    assert_eq!(events[0], Event::Dispatched);
}

#[test]
fn process_pool_reports_every_job_even_when_no_worker_spawns() {
    // Runs with or without the fanout-worker binary on disk. When spawning
    // fails, each popped job must still come back as an explicit failure
    // under the sentinel id; a job never vanishes without its callback.
    let runner = Runner::new(RunnerKind::Process, 2).unwrap();
    let jobs = vec![Job::Fibonacci { n: 10 }; 3];
    let sink = CollectSink::new();

    let result = runner.start(&jobs, &sink);

    let reports = sink.reports();
    assert_eq!(reports.len(), 3, "one callback per job, no matter what");
    assert_eq!(sink.dispatched_count(), 1);

    if result.is_err() {
        for report in &reports {
            assert!(matches!(report.outcome, JobOutcome::Failed(_)));
            assert_eq!(report.worker, WorkerId::UNASSIGNED);
        }
    } else {
        for report in &reports {
            assert_eq!(report.outcome, JobOutcome::Success(JobValue::Int(55)));
            assert!(report.worker.is_assigned());
        }
    }
}

// --- Tests below require the fanout-worker binary to be built. ---

#[test]
#[ignore = "Requires fanout-worker binary"]
fn process_pool_runs_full_batch() {
    let runner = Runner::new(RunnerKind::Process, 2).unwrap();
    let jobs = vec![Job::Fibonacci { n: 10 }; 8];
    let sink = CollectSink::new();

    runner.start(&jobs, &sink).unwrap();

    let reports = sink.reports();
    assert_eq!(reports.len(), 8);
    assert_eq!(sink.dispatched_count(), 1);
    for report in &reports {
        assert_eq!(report.outcome, JobOutcome::Success(JobValue::Int(55)));
        assert!(report.worker.is_assigned());
    }
    assert_contiguous_from_zero(&sink.assigned_ids(), 2);
}

#[cfg(target_os = "linux")]
#[test]
#[ignore = "Requires fanout-worker binary"]
fn process_pool_forwards_memory_snapshots() {
    let mut runner = Runner::new(RunnerKind::Process, 2).unwrap();
    runner.set_memory_probe(true);

    let jobs = vec![Job::Fibonacci { n: 10 }; 4];
    let sink = CollectSink::new();
    runner.start(&jobs, &sink).unwrap();

    let own_pid = std::process::id();
    for report in sink.reports() {
        let snapshot = report.memory.expect("probe enabled, snapshot expected");
        assert_eq!(snapshot.len(), 1);
        let (pid, mb) = snapshot.entries().next().unwrap();
        assert_ne!(pid, own_pid, "snapshot must describe the worker, not us");
        assert!(mb > 0.0);
    }
}

#[test]
#[ignore = "Requires fanout-worker binary"]
fn isolate_pool_runs_batch_and_roundtrips_failures() {
    let runner = Runner::new(RunnerKind::Subinterpreter, 3).unwrap();
    let mut jobs = vec![Job::Fibonacci { n: 10 }; 5];
    jobs.push(Job::Fail {
        message: "boom".to_string(),
    });
    let sink = CollectSink::new();

    runner.start(&jobs, &sink).unwrap();

    let reports = sink.reports();
    assert_eq!(reports.len(), 6);
    assert_eq!(sink.dispatched_count(), 1);

    let successes = reports.iter().filter(|r| r.outcome.is_success()).count();
    assert_eq!(successes, 5);

    // The job body failed but the transfer round-tripped cleanly, so the
    // report carries the slot's id, not the unassigned sentinel.
    let failure = reports
        .iter()
        .find(|r| !r.outcome.is_success())
        .expect("one failure expected");
    assert_eq!(failure.outcome, JobOutcome::Failed("boom".to_string()));
    assert!(failure.worker.is_assigned());
}
