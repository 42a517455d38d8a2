//! CLI module for sectoolbox
//!
//! This module provides the command-line interface for the runner.
//!
//! ## Commands
//!
//! - *(none)* / `menu` - Interactive numbered menu
//! - `list [--json]` - Show the catalog
//! - `run <TEST> [-i name=value ...]` - Run one test headlessly
//!
//! ## Modules
//!
//! - `commands` - `list` and headless `run`
//! - `interactive` - Menu loop and the prompting value source
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros. Every option has a `SECTOOLBOX_*`
//! environment fallback so the runner can be driven from CI without flags.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.
//!
//! ## Exit codes
//!
//! | code | meaning                      |
//! |------|------------------------------|
//! | 0    | test succeeded / clean exit  |
//! | 1    | any other failure            |
//! | 2    | usage error                  |
//! | 10   | test failed                  |
//! | 11   | test timed out               |
//! | 12   | test errored in setup        |
//! | 20   | test not found               |
//! | 21   | missing input                |
//! | 22   | invalid input                |

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod interactive;

use std::fmt;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme};

use crate::config::{DEFAULT_RESULTS_DIR, RunnerConfig};
use crate::engine::OutcomeStatus;
use crate::registry::{self, LookupError};
use crate::resolver::{ResolveError, SourceError};
use crate::results::{SaveFormat, SinkError};
use crate::sources::EnvSource;
use crate::version::TOOLBOX_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    pub const USAGE: ExitCode = ExitCode(2);
    pub const TEST_FAILED: ExitCode = ExitCode(10);
    pub const TIMED_OUT: ExitCode = ExitCode(11);
    pub const SETUP_ERROR: ExitCode = ExitCode(12);
    pub const NOT_FOUND: ExitCode = ExitCode(20);
    pub const MISSING_INPUT: ExitCode = ExitCode(21);
    pub const INVALID_INPUT: ExitCode = ExitCode(22);

    /// Exit code reported for a finished run.
    pub fn for_status(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Succeeded => ExitCode::SUCCESS,
            OutcomeStatus::Failed => ExitCode::TEST_FAILED,
            OutcomeStatus::TimedOut => ExitCode::TIMED_OUT,
            OutcomeStatus::ErroredInSetup => ExitCode::SETUP_ERROR,
        }
    }
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// A missing test, rendered as a diagnostic.
    pub fn not_found(err: &LookupError) -> Self {
        Self::new(render_diagnostic(err, false), ExitCode::NOT_FOUND)
    }

    /// Inputs for `test` could not be resolved.
    pub fn unresolved(test: &str, err: &ResolveError) -> Self {
        let exit_code = match err {
            ResolveError::MissingInput { .. } => ExitCode::MISSING_INPUT,
            ResolveError::InvalidInput { .. } => ExitCode::INVALID_INPUT,
            ResolveError::Source(SourceError::Closed { .. }) => ExitCode::MISSING_INPUT,
            ResolveError::Source(SourceError::Io { .. }) => ExitCode::FAILURE,
        };
        Self::new(
            format!("cannot run `{test}`:\n{}", render_diagnostic(err, false)),
            exit_code,
        )
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<SinkError> for CliError {
    fn from(err: SinkError) -> Self {
        let mut message = format!("Error: {err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(&format!("\n  caused by: {cause}"));
            source = cause.source();
        }
        CliError::failure(message)
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Render a diagnostic with its code and help text.
pub fn render_diagnostic(diagnostic: &dyn Diagnostic, color: bool) -> String {
    let theme = if color {
        GraphicalTheme::unicode()
    } else {
        GraphicalTheme::unicode_nocolor()
    };
    let mut out = String::new();
    match GraphicalReportHandler::new_themed(theme).render_report(&mut out, diagnostic) {
        Ok(()) => out.trim_end().to_string(),
        Err(_) => diagnostic.to_string(),
    }
}

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run self-contained security test modules from a menu or headlessly.
#[derive(Parser, Debug)]
#[command(name = "sectoolbox")]
#[command(version = TOOLBOX_VERSION)]
#[command(about = "Pluggable runner for security test modules", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Time budget for one test run, in seconds
    #[arg(
        long,
        global = true,
        env = "SECTOOLBOX_TIMEOUT",
        value_name = "SECS",
        default_value = "30",
        value_parser = parse_timeout
    )]
    pub timeout: Duration,

    /// Save every result in this format without asking
    #[arg(long, global = true, env = "SECTOOLBOX_SAVE", value_enum)]
    pub save: Option<SaveFormat>,

    /// Directory for saved results
    #[arg(
        long = "results-dir",
        global = true,
        env = "SECTOOLBOX_RESULTS_DIR",
        value_name = "DIR",
        default_value = DEFAULT_RESULTS_DIR
    )]
    pub results_dir: PathBuf,

    /// Disable ANSI colors in console output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive menu (the default)
    Menu,

    /// List registered tests
    List {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one test without prompting
    Run {
        /// Test name or 1-based menu number
        #[arg(value_name = "TEST", env = "SECTOOLBOX_TEST")]
        test: String,
        /// Input value (repeatable); falls back to SECTOOLBOX_INPUT_<NAME>
        #[arg(short = 'i', long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,
    },
}

/// Positive, finite number of seconds.
fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got `{raw}`"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

impl Cli {
    /// Runner settings taken from the parsed flags.
    pub fn config(&self) -> RunnerConfig {
        RunnerConfig::new()
            .with_timeout(self.timeout)
            .with_save(self.save)
            .with_results_dir(&self.results_dir)
            .with_color(!self.no_color && io::stdout().is_terminal())
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let config = cli.config();
    let discovery = registry::global();
    let catalog = &discovery.catalog;

    match cli.command {
        Some(Command::List { json }) => commands::list_tests(catalog, json, &mut io::stdout().lock()),
        Some(Command::Run { test, inputs }) => commands::run_headless(
            catalog,
            &test,
            &inputs,
            EnvSource::from_process(),
            &config,
            &mut io::stdout().lock(),
        ),
        Some(Command::Menu) | None => {
            interactive::run_menu(catalog, &config, &mut io::stdin().lock(), &mut io::stdout().lock())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_subcommand_is_menu() {
        let cli = Cli::try_parse_from(["sectoolbox"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_list_json() {
        let cli = Cli::try_parse_from(["sectoolbox", "list", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Command::List { json: true })));
    }

    #[test]
    fn test_cli_parse_run_with_inputs() {
        let cli = Cli::try_parse_from([
            "sectoolbox",
            "run",
            "tcp-reachability",
            "-i",
            "host=example.com",
            "--input",
            "port=443",
            "--timeout",
            "2.5",
            "--save",
            "csv",
        ])
        .unwrap();
        if let Some(Command::Run { test, inputs }) = &cli.command {
            assert_eq!(test, "tcp-reachability");
            assert_eq!(inputs, &vec!["host=example.com".to_string(), "port=443".to_string()]);
        } else {
            panic!("Expected Run command");
        }
        assert_eq!(cli.timeout, Duration::from_millis(2500));
        assert_eq!(cli.save, Some(SaveFormat::Csv));
    }

    #[test]
    fn test_cli_rejects_bad_timeout() {
        for bad in ["0", "-1", "soon", "inf"] {
            assert!(Cli::try_parse_from(["sectoolbox", "list", "--timeout", bad]).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_exit_codes_per_status() {
        assert_eq!(ExitCode::for_status(OutcomeStatus::Succeeded), ExitCode(0));
        assert_eq!(ExitCode::for_status(OutcomeStatus::Failed), ExitCode(10));
        assert_eq!(ExitCode::for_status(OutcomeStatus::TimedOut), ExitCode(11));
        assert_eq!(ExitCode::for_status(OutcomeStatus::ErroredInSetup), ExitCode(12));
    }

    #[test]
    fn test_not_found_renders_code_and_help() {
        let err = CliError::not_found(&LookupError::NotFound {
            selector: "missing-test".into(),
        });
        assert_eq!(err.exit_code, ExitCode::NOT_FOUND);
        assert!(err.message.contains("sectoolbox::not_found"), "{}", err.message);
        assert!(err.message.contains("missing-test"));
        assert!(err.message.contains("sectoolbox list"));
    }

    #[test]
    fn test_unresolved_names_test_and_input() {
        let err = CliError::unresolved(
            "ping",
            &ResolveError::MissingInput {
                input: "host".into(),
            },
        );
        assert_eq!(err.exit_code, ExitCode::MISSING_INPUT);
        assert!(err.message.starts_with("cannot run `ping`"));
        assert!(err.message.contains("host"));
    }
}
