#![forbid(unsafe_code)]
//! sectoolbox: a pluggable runner for self-contained security test modules
//!
//! Test modules implement [`SecurityTest`] and are registered in a [`CandidateSet`]. The runner
//! turns that list into a [`Catalog`], resolves each test's declared inputs from a prompt, flags or
//! the environment, runs the test under a time budget and hands the [`ExecutionOutcome`] to a
//! [`ResultSink`].
//!
//! ```text
//! registry ──▶ select ──▶ resolver ──▶ engine ──▶ results
//! ```
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The crate enforces
//!   `#![deny(clippy::unwrap_used)]` and `#![deny(clippy::expect_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Test modules**: a panic inside a module's `run` is caught by the engine and reported as a
//!   failed outcome; a panic while constructing one is a discovery error. Either way the panic is
//!   logged through `tracing` with secret inputs redacted, never by the default panic printer.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cli;
pub mod config;
pub mod engine;
mod panics;
pub mod registry;
pub mod resolver;
pub mod results;
pub mod sources;
pub mod version;

pub use sectoolbox_core::{
    CancelToken, CandidateSet, InputKind, InputSpec, InputValue, Payload, ResolvedInputs, RunContext, RunResult,
    SecretValue, SecurityTest, TestFailure,
};

pub use config::RunnerConfig;
pub use engine::{ExecutionOutcome, OutcomeStatus, Spawner, ThreadSpawner, execute, execute_with};
pub use registry::{Catalog, Discovery, DiscoveryError, LookupError, TestDefinition, discover};
pub use resolver::{ResolveError, SourceError, ValueSource, resolve};
pub use results::{ResultSink, SaveFormat, SinkError};
