//! Toolbox version information.
//!
//! Taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time; the CLI `--version` flag and the
//! `list --json` output both read it from here.

/// The sectoolbox version string (for example, `0.1.0`).
pub const TOOLBOX_VERSION: &str = env!("CARGO_PKG_VERSION");
