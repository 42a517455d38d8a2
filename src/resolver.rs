//! Input resolution.
//!
//! [`resolve`] turns a test's declared inputs into a [`ResolvedInputs`] using any
//! [`ValueSource`] (interactive prompt, `--input` flags, environment). It is all-or-nothing: the
//! caller gets either a complete, type-checked set or an error, and no test code has run yet.

use std::io;

use miette::Diagnostic;
use thiserror::Error;

use sectoolbox_core::{InputKind, InputSpec, InvalidValue, ResolvedInputs, coerce};

/// Placeholder used wherever a secret value would otherwise be echoed.
pub const REDACTED: &str = "***";

/// A source failed to produce a value at all (as opposed to reporting it missing).
#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("failed to read a value for input `{input}`")]
    #[diagnostic(code(sectoolbox::input::io))]
    Io {
        input: String,
        #[source]
        source: io::Error,
    },

    #[error("input closed while waiting for a value for `{input}`")]
    #[diagnostic(code(sectoolbox::input::closed))]
    Closed { input: String },
}

/// Why a test's inputs could not be resolved.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("missing required input `{input}`")]
    #[diagnostic(
        code(sectoolbox::missing_input),
        help("pass it with `--input {input}=<value>` or set the matching SECTOOLBOX_INPUT_* variable")
    )]
    MissingInput { input: String },

    /// `raw` is already redacted for secret inputs.
    #[error("invalid value for input `{input}` ({kind}): {raw:?}, {reason}")]
    #[diagnostic(code(sectoolbox::invalid_input))]
    InvalidInput {
        input: String,
        kind: InputKind,
        raw: String,
        reason: InvalidValue,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),
}

impl ResolveError {
    /// Name of the input the error is about.
    pub fn input(&self) -> &str {
        match self {
            ResolveError::MissingInput { input }
            | ResolveError::InvalidInput { input, .. }
            | ResolveError::Source(SourceError::Io { input, .. })
            | ResolveError::Source(SourceError::Closed { input }) => input,
        }
    }
}

/// Anything that can be asked for an input value by name.
///
/// `Ok(None)` means the value is missing, which is different from `Ok(Some(""))`.
pub trait ValueSource {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError>;
}

impl<S: ValueSource + ?Sized> ValueSource for &mut S {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        (**self).fetch(spec)
    }
}

impl<S: ValueSource + ?Sized> ValueSource for Box<S> {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        (**self).fetch(spec)
    }
}

/// Resolve `requires` in declared order against `source`.
#[tracing::instrument(skip_all, fields(inputs = requires.len()))]
pub fn resolve<S: ValueSource>(requires: &[InputSpec], mut source: S) -> Result<ResolvedInputs, ResolveError> {
    let mut resolved = ResolvedInputs::new();

    for spec in requires {
        let raw = match source.fetch(spec)? {
            Some(raw) => raw,
            None => match &spec.default {
                Some(default) => {
                    tracing::debug!(input = %spec.name, "using declared default");
                    default.clone()
                }
                None if spec.required => {
                    return Err(ResolveError::MissingInput {
                        input: spec.name.clone(),
                    });
                }
                None => continue,
            },
        };

        let value = coerce(spec.kind, &raw).map_err(|reason| ResolveError::InvalidInput {
            input: spec.name.clone(),
            kind: spec.kind,
            raw: if spec.kind.is_secret() { REDACTED.to_string() } else { raw.clone() },
            reason,
        })?;
        resolved.insert(spec.name.clone(), value);
    }

    tracing::debug!(resolved = resolved.len(), "inputs resolved");
    Ok(resolved)
}
