//! Shared contract for sectoolbox test modules.
//!
//! This crate is the small, dependency-light vocabulary that both the runner (`sectoolbox`) and
//! the test modules (`sectoolbox_checks`, or any out-of-tree crate) agree on:
//!
//! - [`contract`]: the [`SecurityTest`] trait, run context, and typed failure
//! - [`inputs`]: declared inputs ([`InputSpec`]), typed values and the coercion rules
//! - [`registration`]: the explicit registration list modules add themselves to
//!
//! ## Notes
//!
//! - Discovery, resolution and execution live in the runner crate. Nothing here spawns threads or
//!   touches the terminal.
//! - A module only needs this crate to be registrable; it never depends on the runner.

pub mod contract;
pub mod inputs;
pub mod registration;

pub use contract::{CancelToken, Payload, RunContext, RunResult, SecurityTest, TestFailure};
pub use inputs::{InputKind, InputSpec, InputValue, InvalidValue, ResolvedInputs, SecretValue, coerce};
pub use registration::{Candidate, CandidateSet, ConstructResult};
