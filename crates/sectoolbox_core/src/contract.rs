//! The test contract.
//!
//! Every test module implements [`SecurityTest`]. The runner only ever calls the four contract
//! methods; it never inspects a module beyond them.
//!
//! ## Failure signaling
//!
//! `run` returns a [`RunResult`]. A test that cannot complete returns `Err(TestFailure)` with a
//! human-readable message rather than panicking. Panics are still contained by the runner, but
//! they are reported less precisely.
//!
//! ## Cancellation
//!
//! The runner stops waiting once the time budget is spent and trips the context's
//! [`CancelToken`]. It cannot reclaim a thread that is blocked in I/O, so tests doing slow work
//! should bound each blocking call by [`RunContext::remaining`] and poll
//! [`RunContext::is_cancelled`] between steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::inputs::{InputSpec, ResolvedInputs};

/// Structured payload a test returns on success. Opaque to the runner.
pub type Payload = serde_json::Value;

/// Result of one `run` call.
pub type RunResult = Result<Payload, TestFailure>;

/// A test-reported failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TestFailure {
    message: String,
}

impl TestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Failure reported when a test notices it has been cancelled.
    pub fn cancelled() -> Self {
        Self::new("cancelled before completion")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Shared cancellation flag between the runner and one test invocation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation context: the deadline and the cancellation token.
#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Instant,
    token: CancelToken,
}

impl RunContext {
    /// Context whose deadline is `budget` from now.
    pub fn new(budget: Duration) -> Self {
        Self::with_token(budget, CancelToken::new())
    }

    pub fn with_token(budget: Duration, token: CancelToken) -> Self {
        let now = Instant::now();
        // Budgets too large to represent are treated as "about a century".
        let deadline = now
            .checked_add(budget)
            .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600));
        Self { deadline, token }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the runner gives up on this invocation.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.remaining().is_zero()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// `Err(TestFailure::cancelled())` once the invocation has been cancelled or run out of time.
    pub fn checkpoint(&self) -> Result<(), TestFailure> {
        if self.is_cancelled() {
            Err(TestFailure::cancelled())
        } else {
            Ok(())
        }
    }
}

/// The contract every security test module satisfies.
///
/// Implementations are shared read-only across the process (`Send + Sync`); per-run state belongs
/// in locals of `run`, never in `self`.
pub trait SecurityTest: Send + Sync {
    /// Stable, non-empty identifier, unique across the catalog.
    fn name(&self) -> &str;

    /// Non-empty human-readable summary shown in the menu.
    fn description(&self) -> &str;

    /// Inputs the test needs, in prompt order. Names must be unique.
    fn requires(&self) -> Vec<InputSpec> {
        Vec::new()
    }

    /// Execute the test.
    fn run(&self, inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult;
}
