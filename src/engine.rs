//! Execution engine.
//!
//! [`execute`] runs one test with resolved inputs under a wall-clock budget and always returns an
//! [`ExecutionOutcome`]. The test body runs on its own named thread; the caller waits on a channel
//! and gives up when the budget expires, tripping the run's [`CancelToken`] so a cooperative test
//! can stop early. A test that ignores the token is abandoned, never joined.
//!
//! Threads are started through a [`Spawner`]; [`execute_with`] takes one explicitly.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use sectoolbox_core::{CancelToken, Payload, ResolvedInputs, RunContext, RunResult};

use crate::panics::{contain, redact};
use crate::registry::TestDefinition;

/// Terminal state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    TimedOut,
    ErroredInSetup,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::TimedOut => "timedOut",
            OutcomeStatus::ErroredInSetup => "erroredInSetup",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened when a test ran. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    test_name: String,
    status: OutcomeStatus,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    /// The test's payload; `Null` unless the run succeeded.
    detail: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip)]
    elapsed: Duration,
}

impl ExecutionOutcome {
    fn succeeded(test_name: String, clock: Clock, detail: Payload) -> Self {
        clock.finish(test_name, OutcomeStatus::Succeeded, detail, None)
    }

    fn unsuccessful(test_name: String, clock: Clock, status: OutcomeStatus, message: String) -> Self {
        clock.finish(test_name, status, Payload::Null, Some(message))
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn detail(&self) -> &Payload {
        &self.detail
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Monotonic time between start and finish.
    pub fn duration(&self) -> Duration {
        self.elapsed
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Wall-clock start plus a monotonic one for the duration.
struct Clock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn finish(
        self,
        test_name: String,
        status: OutcomeStatus,
        detail: Payload,
        error_message: Option<String>,
    ) -> ExecutionOutcome {
        ExecutionOutcome {
            test_name,
            status,
            started_at: self.started_at,
            finished_at: Utc::now(),
            detail,
            error_message,
            elapsed: self.started.elapsed(),
        }
    }
}

/// What the worker thread reports back.
enum WorkerReport {
    Returned(RunResult),
    Panicked(String),
}

/// Replace every secret input value in `message` with the redaction marker.
fn scrub(message: &str, inputs: &ResolvedInputs) -> String {
    redact(message, inputs.secret_values())
}

fn thread_name(test: &str) -> String {
    let name: String = test.chars().filter(|&c| c != '\0').collect();
    format!("sectoolbox-run:{name}")
}

/// A unit of work handed to a [`Spawner`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Starts the worker that runs one test body.
pub trait Spawner {
    fn spawn(&self, name: String, job: Job) -> io::Result<()>;
}

/// Named OS threads, detached.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: String, job: Job) -> io::Result<()> {
        thread::Builder::new().name(name).spawn(job).map(drop)
    }
}

/// Run `def` once with `inputs`, giving it at most `timeout`.
pub fn execute(def: &TestDefinition, inputs: ResolvedInputs, timeout: Duration) -> ExecutionOutcome {
    execute_with(&ThreadSpawner, def, inputs, timeout)
}

/// [`execute`] with the worker started by `spawner`.
#[tracing::instrument(skip_all, fields(test = def.name(), timeout_ms = timeout.as_millis() as u64))]
pub fn execute_with(
    spawner: &impl Spawner,
    def: &TestDefinition,
    inputs: ResolvedInputs,
    timeout: Duration,
) -> ExecutionOutcome {
    let name = def.name().to_string();
    let clock = Clock::start();

    let token = CancelToken::new();
    let ctx = RunContext::with_token(timeout, token.clone());
    let (tx, rx) = mpsc::sync_channel::<WorkerReport>(1);

    let test = def.handle();
    let worker_inputs = inputs.clone();
    let dispatch = tracing::dispatcher::get_default(Clone::clone);
    let spawned = spawner.spawn(
        thread_name(&name),
        Box::new(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                let secrets = worker_inputs.secret_values().map(str::to_string).collect();
                let report = match contain(secrets, || test.run(&worker_inputs, &ctx)) {
                    Ok(result) => WorkerReport::Returned(result),
                    Err(reason) => WorkerReport::Panicked(reason),
                };
                // The supervisor may have given up already.
                let _ = tx.send(report);
            });
        }),
    );

    if let Err(err) = spawned {
        tracing::error!(error = %err, "could not start test worker");
        return ExecutionOutcome::unsuccessful(
            name,
            clock,
            OutcomeStatus::ErroredInSetup,
            format!("could not start test worker: {err}"),
        );
    }

    let outcome = match rx.recv_timeout(timeout) {
        Ok(WorkerReport::Returned(Ok(detail))) => ExecutionOutcome::succeeded(name, clock, detail),
        Ok(WorkerReport::Returned(Err(failure))) => {
            let message = scrub(failure.message(), &inputs);
            ExecutionOutcome::unsuccessful(name, clock, OutcomeStatus::Failed, message)
        }
        Ok(WorkerReport::Panicked(reason)) => {
            let message = format!("test panicked: {}", scrub(&reason, &inputs));
            ExecutionOutcome::unsuccessful(name, clock, OutcomeStatus::Failed, message)
        }
        Err(RecvTimeoutError::Timeout) => {
            token.cancel();
            let message = format!("test exceeded its time budget of {:.3}s", timeout.as_secs_f64());
            ExecutionOutcome::unsuccessful(name, clock, OutcomeStatus::TimedOut, message)
        }
        Err(RecvTimeoutError::Disconnected) => ExecutionOutcome::unsuccessful(
            name,
            clock,
            OutcomeStatus::Failed,
            "test worker exited without reporting a result".to_string(),
        ),
    };

    match outcome.status() {
        OutcomeStatus::Succeeded => tracing::info!(elapsed_ms = outcome.duration().as_millis() as u64, "test succeeded"),
        status => tracing::warn!(%status, error = outcome.error_message().unwrap_or_default(), "test did not succeed"),
    }
    outcome
}
