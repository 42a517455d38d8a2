//! Interactive menu.
//!
//! The loop prints the numbered catalog, reads a choice (number or name), prompts for the
//! chosen test's inputs, runs it and offers to save the result. Anything that goes wrong before
//! the test runs (unknown choice, missing or invalid input) is reported and the menu comes back.
//! End of input exits cleanly.

use std::io::{self, BufRead, Write};

use sectoolbox_core::InputSpec;

use crate::config::RunnerConfig;
use crate::registry::Catalog;
use crate::resolver::{ResolveError, SourceError, ValueSource, resolve};
use crate::results::SaveFormat;

use super::commands::{run_and_print, save};
use super::{CliError, CliResult, ExitCode, render_diagnostic};

/// Asks for each value on `output` and reads the answer from `input`.
///
/// A blank answer means "missing", so the declared default (if any) applies.
pub struct PromptSource<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<'a, R: BufRead, W: Write> PromptSource<'a, R, W> {
    pub fn new(input: &'a mut R, output: &'a mut W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ValueSource for PromptSource<'_, R, W> {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        let io_err = |source: io::Error| SourceError::Io {
            input: spec.name.clone(),
            source,
        };
        write!(self.output, "{}", spec.prompt_line()).map_err(io_err)?;
        self.output.flush().map_err(io_err)?;

        match read_answer(&mut *self.input).map_err(io_err)? {
            None => Err(SourceError::Closed {
                input: spec.name.clone(),
            }),
            Some(answer) if answer.trim().is_empty() => Ok(None),
            Some(answer) => Ok(Some(answer)),
        }
    }
}

/// One line without its terminator, or `None` at end of input.
///
/// Other whitespace is kept; string and secret values are taken verbatim.
fn read_answer(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let end = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(end);
    Ok(Some(line))
}

fn write_err(e: io::Error) -> CliError {
    CliError::failure(format!("Error writing output: {e}"))
}

fn print_menu(catalog: &Catalog, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "\n=== Available tests ===")?;
    for (i, def) in catalog.iter().enumerate() {
        writeln!(out, "{}) {} — {}", i + 1, def.name(), def.description())?;
    }
    writeln!(out, "0) Exit")?;
    write!(out, "\nChoose a test (number or name): ")?;
    out.flush()
}

/// `csv`, `json` or anything else for "don't save".
fn ask_save(input: &mut impl BufRead, out: &mut impl Write) -> CliResult<Option<SaveFormat>> {
    write!(out, "\nSave the result as CSV, JSON, or not at all? (csv/json/N): ").map_err(write_err)?;
    out.flush().map_err(write_err)?;
    let answer = read_answer(input).map_err(|e| CliError::failure(format!("Error reading input: {e}")))?;
    Ok(answer.and_then(|a| a.parse().ok()))
}

/// Run the menu until the user picks `0` or input ends.
pub fn run_menu(
    catalog: &Catalog,
    config: &RunnerConfig,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> CliResult<ExitCode> {
    tracing::info!(tests = catalog.len(), "starting interactive menu");
    if catalog.is_empty() {
        writeln!(out, "No tests are registered.").map_err(write_err)?;
        return Ok(ExitCode::SUCCESS);
    }

    loop {
        print_menu(catalog, out).map_err(write_err)?;
        let Some(choice) = read_answer(input).map_err(|e| CliError::failure(format!("Error reading input: {e}")))?
        else {
            writeln!(out).map_err(write_err)?;
            return Ok(ExitCode::SUCCESS);
        };
        let choice = choice.trim();
        if choice == "0" {
            tracing::info!("leaving interactive menu");
            return Ok(ExitCode::SUCCESS);
        }

        let def = match catalog.select(choice) {
            Ok(def) if !choice.is_empty() => def,
            _ => {
                writeln!(out, "Invalid choice.").map_err(write_err)?;
                continue;
            }
        };

        writeln!(out, "\nRunning: {} — {}\n", def.name(), def.description()).map_err(write_err)?;
        let inputs = match resolve(def.requires(), PromptSource::new(&mut *input, &mut *out)) {
            Ok(inputs) => inputs,
            Err(ResolveError::Source(SourceError::Closed { .. })) => {
                writeln!(out).map_err(write_err)?;
                return Ok(ExitCode::SUCCESS);
            }
            Err(err) => {
                writeln!(out, "{}", render_diagnostic(&err, config.color)).map_err(write_err)?;
                continue;
            }
        };

        // Errors past this point belong to this run only.
        let result = run_and_print(def, inputs, config, out).and_then(|outcome| {
            let format = match config.save {
                Some(format) => Some(format),
                None => ask_save(&mut *input, &mut *out)?,
            };
            match format {
                Some(format) => save(format, outcome, config, &mut *out),
                None => Ok(()),
            }
        });
        if let Err(err) = result {
            writeln!(out, "{}", err.message).map_err(write_err)?;
        }
    }
}
