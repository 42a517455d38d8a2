//! Declared inputs and their typed values.
//!
//! A test declares what it needs as an ordered list of [`InputSpec`]s. The runner collects raw
//! text for each one, coerces it with [`coerce`], and hands the test a [`ResolvedInputs`] map.
//!
//! ## Coercion rules
//!
//! | kind      | accepted raw text                                                    |
//! |-----------|----------------------------------------------------------------------|
//! | `string`  | anything, verbatim                                                   |
//! | `secret`  | anything, verbatim (redacted from `Debug`/`Display`)                 |
//! | `number`  | a finite decimal, surrounding whitespace ignored                     |
//! | `boolean` | `true/false/yes/no/y/n/1/0/on/off`, case-insensitive, trimmed        |

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Semantic type of a declared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    String,
    Number,
    Boolean,
    Secret,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::String => "string",
            InputKind::Number => "number",
            InputKind::Boolean => "boolean",
            InputKind::Secret => "secret",
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, InputKind::Secret)
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter of a test.
///
/// Specs are built with the constructor matching their required-ness and then refined:
///
/// ```rust
/// use sectoolbox_core::{InputKind, InputSpec};
///
/// let port = InputSpec::optional("port", InputKind::Number)
///     .with_default("443")
///     .with_prompt("TCP port");
/// assert_eq!(port.prompt_line(), "TCP port [443]: ");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
    pub required: bool,
    /// Raw default text; coerced with the same rules as user-supplied values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Human-facing question shown by interactive sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl InputSpec {
    /// A value that must be supplied (or covered by a default).
    pub fn required(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            prompt: None,
        }
    }

    /// A value the test can run without.
    pub fn optional(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// The line an interactive source prints before reading the value.
    ///
    /// Secret defaults are never shown.
    pub fn prompt_line(&self) -> String {
        let question = self.prompt.as_deref().unwrap_or(&self.name);
        match (&self.default, self.kind.is_secret()) {
            (Some(default), false) => format!("{question} [{default}]: "),
            (Some(_), true) => format!("{question} [****]: "),
            (None, _) if !self.required => format!("{question} [optional]: "),
            (None, _) => format!("{question}: "),
        }
    }
}

/// A secret string that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// A validated, typed input value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Secret(SecretValue),
}

impl InputValue {
    pub fn kind(&self) -> InputKind {
        match self {
            InputValue::Text(_) => InputKind::String,
            InputValue::Number(_) => InputKind::Number,
            InputValue::Bool(_) => InputKind::Boolean,
            InputValue::Secret(_) => InputKind::Secret,
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Text(s) => f.write_str(s),
            InputValue::Number(n) => write!(f, "{n}"),
            InputValue::Bool(b) => write!(f, "{b}"),
            InputValue::Secret(s) => write!(f, "{s}"),
        }
    }
}

/// Why a raw value could not be coerced to its declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidValue {
    #[error("expected a finite number")]
    NotANumber,
    #[error("expected one of true/false, yes/no, y/n, 1/0, on/off")]
    NotABoolean,
}

/// Coerce raw text to a value of `kind`.
pub fn coerce(kind: InputKind, raw: &str) -> Result<InputValue, InvalidValue> {
    match kind {
        InputKind::String => Ok(InputValue::Text(raw.to_string())),
        InputKind::Secret => Ok(InputValue::Secret(SecretValue::new(raw))),
        InputKind::Number => {
            let n: f64 = raw.trim().parse().map_err(|_| InvalidValue::NotANumber)?;
            if n.is_finite() {
                Ok(InputValue::Number(n))
            } else {
                Err(InvalidValue::NotANumber)
            }
        }
        InputKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => Ok(InputValue::Bool(true)),
            "false" | "no" | "n" | "0" | "off" => Ok(InputValue::Bool(false)),
            _ => Err(InvalidValue::NotABoolean),
        },
    }
}

/// The validated parameter set handed to one test run.
///
/// Built by the runner's resolver; tests only read from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    values: BTreeMap<String, InputValue>,
}

impl ResolvedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value, replacing any earlier value for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: InputValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Text value of a `string` input.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(InputValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(InputValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(InputValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn secret(&self, name: &str) -> Option<&SecretValue> {
        match self.values.get(name) {
            Some(InputValue::Secret(s)) => Some(s),
            _ => None,
        }
    }

    /// Every non-empty secret value, for scrubbing messages.
    pub fn secret_values(&self) -> impl Iterator<Item = &str> {
        self.values.values().filter_map(|v| match v {
            InputValue::Secret(s) if !s.expose().is_empty() => Some(s.expose()),
            _ => None,
        })
    }

    /// Input names in sorted order. Values are deliberately not exposed here so this can be logged.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, InputValue)> for ResolvedInputs {
    fn from_iter<I: IntoIterator<Item = (K, InputValue)>>(iter: I) -> Self {
        let mut inputs = Self::new();
        for (name, value) in iter {
            inputs.insert(name, value);
        }
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_coerce_number_trims_whitespace() {
        assert_eq!(coerce(InputKind::Number, " 8080 "), Ok(InputValue::Number(8080.0)));
        assert_eq!(coerce(InputKind::Number, "2.5"), Ok(InputValue::Number(2.5)));
    }

    #[test]
    fn test_coerce_number_rejects_garbage_and_non_finite() {
        assert_eq!(coerce(InputKind::Number, "eighty"), Err(InvalidValue::NotANumber));
        assert_eq!(coerce(InputKind::Number, ""), Err(InvalidValue::NotANumber));
        assert_eq!(coerce(InputKind::Number, "inf"), Err(InvalidValue::NotANumber));
        assert_eq!(coerce(InputKind::Number, "NaN"), Err(InvalidValue::NotANumber));
    }

    #[test]
    fn test_coerce_boolean_spellings() {
        for raw in ["true", "YES", "y", "1", " On "] {
            assert_eq!(coerce(InputKind::Boolean, raw), Ok(InputValue::Bool(true)), "{raw}");
        }
        for raw in ["false", "No", "n", "0", "off"] {
            assert_eq!(coerce(InputKind::Boolean, raw), Ok(InputValue::Bool(false)), "{raw}");
        }
        assert_eq!(coerce(InputKind::Boolean, "maybe"), Err(InvalidValue::NotABoolean));
    }

    #[test]
    fn test_coerce_string_is_verbatim() {
        assert_eq!(
            coerce(InputKind::String, "  spaced  "),
            Ok(InputValue::Text("  spaced  ".to_string()))
        );
        assert_eq!(coerce(InputKind::String, ""), Ok(InputValue::Text(String::new())));
    }

    #[test]
    fn test_secret_is_redacted_in_debug_and_display() {
        let value = coerce(InputKind::Secret, "hunter2").unwrap();
        assert_eq!(format!("{value}"), "***");
        assert!(!format!("{value:?}").contains("hunter2"));

        let inputs: ResolvedInputs = [("password", value)].into_iter().collect();
        assert!(!format!("{inputs:?}").contains("hunter2"));
        assert_eq!(inputs.secret("password").map(SecretValue::expose), Some("hunter2"));
    }

    #[test]
    fn test_typed_accessors_reject_wrong_kind() {
        let inputs: ResolvedInputs = [
            ("host", InputValue::Text("example.com".into())),
            ("port", InputValue::Number(443.0)),
            ("verbose", InputValue::Bool(true)),
        ]
        .into_iter()
        .collect();

        assert_eq!(inputs.text("host"), Some("example.com"));
        assert_eq!(inputs.number("port"), Some(443.0));
        assert_eq!(inputs.flag("verbose"), Some(true));
        assert_eq!(inputs.text("port"), None);
        assert_eq!(inputs.number("missing"), None);
        assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["host", "port", "verbose"]);
    }

    #[test]
    fn test_secret_values_skips_empty_secrets() {
        let inputs: ResolvedInputs = [
            ("token", InputValue::Secret(SecretValue::new("abc"))),
            ("pin", InputValue::Secret(SecretValue::new(""))),
            ("user", InputValue::Text("root".into())),
        ]
        .into_iter()
        .collect();
        assert_eq!(inputs.secret_values().collect::<Vec<_>>(), vec!["abc"]);
    }

    #[test]
    fn test_prompt_line_variants() {
        let spec = InputSpec::required("target", InputKind::String);
        assert_eq!(spec.prompt_line(), "target: ");

        let spec = InputSpec::optional("exclude_list", InputKind::String);
        assert_eq!(spec.prompt_line(), "exclude_list [optional]: ");

        let spec = InputSpec::optional("api_key", InputKind::Secret).with_default("changeme");
        assert_eq!(spec.prompt_line(), "api_key [****]: ");
    }

    proptest! {
        #[test]
        fn prop_integers_coerce_to_the_same_number(n in -1_000_000i64..1_000_000) {
            let value = coerce(InputKind::Number, &n.to_string()).unwrap();
            prop_assert_eq!(value, InputValue::Number(n as f64));
        }

        #[test]
        fn prop_string_and_secret_never_fail(raw in ".*") {
            prop_assert!(coerce(InputKind::String, &raw).is_ok());
            prop_assert!(coerce(InputKind::Secret, &raw).is_ok());
        }
    }
}
