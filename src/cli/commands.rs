//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::io::Write;

use serde::Serialize;

use sectoolbox_core::{InputSpec, ResolvedInputs};

use crate::config::RunnerConfig;
use crate::engine::{ExecutionOutcome, execute};
use crate::registry::{Catalog, TestDefinition};
use crate::resolver::{ValueSource, resolve};
use crate::results::{ConsoleSink, ResultSink, SaveFormat};
use crate::sources::{ChainSource, MapSource};
use crate::version::TOOLBOX_VERSION;

use super::{CliError, CliResult, ExitCode};

fn write_err(e: std::io::Error) -> CliError {
    CliError::failure(format!("Error writing output: {e}"))
}

/// `name (kind, required)` summary of declared inputs.
fn describe_inputs(requires: &[InputSpec]) -> String {
    requires
        .iter()
        .map(|spec| {
            let need = match (&spec.default, spec.required) {
                (Some(default), _) if !spec.kind.is_secret() => format!("default {default}"),
                (Some(_), _) => "has default".to_string(),
                (None, true) => "required".to_string(),
                (None, false) => "optional".to_string(),
            };
            format!("{} ({}, {need})", spec.name, spec.kind)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Serialize)]
struct ListedTest<'a> {
    index: usize,
    name: &'a str,
    description: &'a str,
    inputs: &'a [InputSpec],
}

#[derive(Serialize)]
struct Listing<'a> {
    version: &'a str,
    tests: Vec<ListedTest<'a>>,
}

/// Print the catalog in menu order.
pub fn list_tests(catalog: &Catalog, json: bool, out: &mut impl Write) -> CliResult<ExitCode> {
    if json {
        let listing = Listing {
            version: TOOLBOX_VERSION,
            tests: catalog
                .iter()
                .enumerate()
                .map(|(i, def)| ListedTest {
                    index: i + 1,
                    name: def.name(),
                    description: def.description(),
                    inputs: def.requires(),
                })
                .collect(),
        };
        let text = serde_json::to_string_pretty(&listing)
            .map_err(|e| CliError::failure(format!("Error serializing catalog: {e}")))?;
        writeln!(out, "{text}").map_err(write_err)?;
        return Ok(ExitCode::SUCCESS);
    }

    if catalog.is_empty() {
        writeln!(out, "No tests are registered.").map_err(write_err)?;
        return Ok(ExitCode::SUCCESS);
    }
    for (i, def) in catalog.iter().enumerate() {
        writeln!(out, "{}) {} — {}", i + 1, def.name(), def.description()).map_err(write_err)?;
        if !def.requires().is_empty() {
            writeln!(out, "   inputs: {}", describe_inputs(def.requires())).map_err(write_err)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Run one test without prompting.
///
/// The test is selected before any input is looked at, so an unknown name fails with
/// [`ExitCode::NOT_FOUND`] no matter what inputs were given. Flag values win over `env`.
///
/// Once the test has run, its status decides the exit code. A result that cannot be saved is
/// reported on stderr and does not change it.
#[tracing::instrument(skip_all, fields(selector = %selector))]
pub fn run_headless(
    catalog: &Catalog,
    selector: &str,
    pairs: &[String],
    env: impl ValueSource,
    config: &RunnerConfig,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    let def = catalog.select(selector).map_err(|e| CliError::not_found(&e))?;

    let mut flags = MapSource::from_pairs(pairs).map_err(|e| CliError::new(format!("Error: {e}"), ExitCode::USAGE))?;
    let inputs = resolve(def.requires(), ChainSource::new().then(&mut flags).then(env))
        .map_err(|e| CliError::unresolved(def.name(), &e))?;
    for unused in flags.unused() {
        tracing::warn!(test = def.name(), input = unused, "ignoring input the test does not declare");
    }

    let outcome = run_and_print(def, inputs, config, out)?;
    let exit_code = ExitCode::for_status(outcome.status());
    if let Some(format) = config.save {
        if let Err(err) = save(format, outcome, config, out) {
            tracing::error!(test = def.name(), ?format, "could not save result");
            eprintln!("{}", err.message);
        }
    }
    Ok(exit_code)
}

/// Execute once and print the outcome.
pub(super) fn run_and_print(
    def: &TestDefinition,
    inputs: ResolvedInputs,
    config: &RunnerConfig,
    out: &mut impl Write,
) -> CliResult<ExecutionOutcome> {
    let outcome = execute(def, inputs, config.timeout);
    ConsoleSink::new(&mut *out, config.color).accept(outcome.clone())?;
    Ok(outcome)
}

/// Hand `outcome` to the file sink for `format` and report where it went.
pub(super) fn save(
    format: SaveFormat,
    outcome: ExecutionOutcome,
    config: &RunnerConfig,
    out: &mut impl Write,
) -> CliResult<()> {
    let mut sink = format.sink(&config.results_dir);
    sink.accept(outcome)?;
    if let Some(path) = sink.last_path() {
        writeln!(out, "Result saved to: {}", path.display()).map_err(write_err)?;
    }
    Ok(())
}
