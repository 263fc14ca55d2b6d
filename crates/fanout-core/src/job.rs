//! Job definitions: the units of work a batch is made of.
//!
//! A [`Job`] is a zero-argument computation described as data so it can cross
//! isolation boundaries. Strategies that share memory run it in place; the
//! process and isolate strategies serialize it with rkyv and ship it to a
//! worker over a pipe.

use std::panic::AssertUnwindSafe;

use rkyv::{Archive, Deserialize, Serialize};

/// An ordered batch of jobs submitted to one runner invocation.
///
/// Order defines submission order only; completion order is whatever the
/// pool's scheduling produces.
pub type Batch = Vec<Job>;

/// A deferred, zero-argument computation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Job {
    /// Naive recursive Fibonacci. CPU-bound on purpose; `fibonacci(10) == 55`.
    /// Negative input fails instead of returning.
    Fibonacci {
        /// 1-indexed position in the sequence.
        n: i64,
    },

    /// Sleep for the given duration, then return `Unit`.
    Sleep {
        /// Milliseconds to sleep.
        millis: u64,
    },

    /// Always fail with the given message. Used to exercise the failure path.
    Fail {
        /// Failure description surfaced in the outcome.
        message: String,
    },
}

/// The value a successful job produced.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum JobValue {
    /// No meaningful value.
    Unit,
    /// Integer result.
    Int(i64),
    /// Text result.
    Text(String),
}

impl std::fmt::Display for JobValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobValue::Unit => write!(f, "()"),
            JobValue::Int(v) => write!(f, "{}", v),
            JobValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// How a job ended. Failure is an explicit variant, never a value that
/// happens to look like a result.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum JobOutcome {
    /// The job returned a value.
    Success(JobValue),
    /// The job raised; the description is all that survives.
    Failed(String),
}

impl JobOutcome {
    /// Whether this outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

impl Job {
    /// Execute the job to completion.
    ///
    /// Total: a failing or panicking job body becomes `JobOutcome::Failed`,
    /// it never propagates out of this call.
    pub fn execute(&self) -> JobOutcome {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(outcome) => outcome,
            Err(payload) => JobOutcome::Failed(panic_message(payload.as_ref())),
        }
    }

    fn run(&self) -> JobOutcome {
        match self {
            Job::Fibonacci { n } => {
                if *n < 0 {
                    JobOutcome::Failed(format!("incorrect input: fibonacci({})", n))
                } else {
                    JobOutcome::Success(JobValue::Int(fibonacci(*n as u64) as i64))
                }
            }
            Job::Sleep { millis } => {
                std::thread::sleep(std::time::Duration::from_millis(*millis));
                JobOutcome::Success(JobValue::Unit)
            }
            Job::Fail { message } => JobOutcome::Failed(message.clone()),
        }
    }
}

/// Naive doubly-recursive Fibonacci, 1-indexed: fib(1) = fib(2) = 1.
///
/// Deliberately exponential so a batch of these actually loads the pool.
pub fn fibonacci(n: u64) -> u64 {
    match n {
        0 => 0,
        1 | 2 => 1,
        _ => fibonacci(n - 1) + fibonacci(n - 2),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {}", s)
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_values() {
        assert_eq!(fibonacci(0), 0);
        assert_eq!(fibonacci(1), 1);
        assert_eq!(fibonacci(2), 1);
        assert_eq!(fibonacci(10), 55);
        assert_eq!(fibonacci(20), 6765);
    }

    #[test]
    fn test_fibonacci_job_success() {
        let job = Job::Fibonacci { n: 10 };
        assert_eq!(job.execute(), JobOutcome::Success(JobValue::Int(55)));
    }

    #[test]
    fn test_negative_fibonacci_fails() {
        let job = Job::Fibonacci { n: -3 };
        match job.execute() {
            JobOutcome::Failed(msg) => assert!(msg.contains("incorrect input")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_fail_job_carries_message() {
        let job = Job::Fail {
            message: "boom".to_string(),
        };
        assert_eq!(job.execute(), JobOutcome::Failed("boom".to_string()));
    }

    #[test]
    fn test_sleep_job_returns_unit() {
        let job = Job::Sleep { millis: 1 };
        assert_eq!(job.execute(), JobOutcome::Success(JobValue::Unit));
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(JobOutcome::Success(JobValue::Unit).is_success());
        assert!(!JobOutcome::Failed("x".to_string()).is_success());
    }
}
