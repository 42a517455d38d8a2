//! Non-interactive value sources: `--input name=value` pairs and `SECTOOLBOX_INPUT_*` variables.

use std::collections::{BTreeMap, BTreeSet};

use sectoolbox_core::InputSpec;

use crate::resolver::{SourceError, ValueSource};

/// Prefix for environment-provided inputs.
pub const ENV_PREFIX: &str = "SECTOOLBOX_INPUT_";

/// Values given up front, keyed by input name.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: BTreeMap<String, String>,
    used: BTreeSet<String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name=value` pairs. Only the first `=` separates; the value may be empty.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected NAME=VALUE, got `{pair}`"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("input name missing in `{pair}`"));
            }
            source.insert(name, value);
        }
        Ok(source)
    }

    /// Later values for the same name replace earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Names that were supplied but never asked for.
    pub fn unused(&self) -> impl Iterator<Item = &str> {
        self.values
            .keys()
            .filter(|name| !self.used.contains(*name))
            .map(String::as_str)
    }
}

impl ValueSource for MapSource {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        let value = self.values.get(&spec.name).cloned();
        if value.is_some() {
            self.used.insert(spec.name.clone());
        }
        Ok(value)
    }
}

/// Environment variable name for an input: `host-name` becomes `SECTOOLBOX_INPUT_HOST_NAME`.
pub fn env_var_name(input: &str) -> String {
    let suffix: String = input
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{ENV_PREFIX}{suffix}")
}

/// Reads inputs from environment variables.
///
/// The lookup is injectable so callers (and tests) never have to mutate the process environment.
pub struct EnvSource<F = fn(&str) -> Option<String>> {
    lookup: F,
}

impl EnvSource {
    pub fn from_process() -> Self {
        Self {
            lookup: |key| std::env::var(key).ok(),
        }
    }
}

impl<F: FnMut(&str) -> Option<String>> EnvSource<F> {
    pub fn with_lookup(lookup: F) -> Self {
        Self { lookup }
    }
}

impl<F: FnMut(&str) -> Option<String>> ValueSource for EnvSource<F> {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        let key = env_var_name(&spec.name);
        let value = (self.lookup)(&key);
        if value.is_some() {
            tracing::debug!(input = %spec.name, var = %key, "input taken from environment");
        }
        Ok(value)
    }
}

/// Tries each source in order; the first one with a value wins.
#[derive(Default)]
pub struct ChainSource<'a> {
    sources: Vec<Box<dyn ValueSource + 'a>>,
}

impl<'a> ChainSource<'a> {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    pub fn then(mut self, source: impl ValueSource + 'a) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl ValueSource for ChainSource<'_> {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        for source in &mut self.sources {
            if let Some(value) = source.fetch(spec)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sectoolbox_core::InputKind;

    fn spec(name: &str) -> InputSpec {
        InputSpec::required(name, InputKind::String)
    }

    #[test]
    fn test_pairs_split_on_first_equals() {
        let mut source = MapSource::from_pairs(["q=a=b", "empty=", " host =example.com"]).unwrap();
        assert_eq!(source.fetch(&spec("q")).unwrap().as_deref(), Some("a=b"));
        assert_eq!(source.fetch(&spec("empty")).unwrap().as_deref(), Some(""));
        assert_eq!(source.fetch(&spec("host")).unwrap().as_deref(), Some("example.com"));
        assert_eq!(source.fetch(&spec("port")).unwrap(), None);
    }

    #[test]
    fn test_malformed_pairs_are_rejected() {
        assert!(MapSource::from_pairs(["novalue"]).is_err());
        assert!(MapSource::from_pairs(["=value"]).is_err());
    }

    #[test]
    fn test_unused_reports_names_never_fetched() {
        let mut source = MapSource::from_pairs(["host=a", "typo=b"]).unwrap();
        source.fetch(&spec("host")).unwrap();
        assert_eq!(source.unused().collect::<Vec<_>>(), vec!["typo"]);
    }

    #[test]
    fn test_env_var_name_mangling() {
        assert_eq!(env_var_name("host"), "SECTOOLBOX_INPUT_HOST");
        assert_eq!(env_var_name("set-cookie"), "SECTOOLBOX_INPUT_SET_COOKIE");
        assert_eq!(env_var_name("exclude_list"), "SECTOOLBOX_INPUT_EXCLUDE_LIST");
    }

    #[test]
    fn test_env_source_uses_lookup() {
        let mut source = EnvSource::with_lookup(|key: &str| (key == "SECTOOLBOX_INPUT_HOST").then(|| "h".to_string()));
        assert_eq!(source.fetch(&spec("host")).unwrap().as_deref(), Some("h"));
        assert_eq!(source.fetch(&spec("port")).unwrap(), None);
    }

    #[test]
    fn test_chain_prefers_earlier_sources() {
        let flags = MapSource::from_pairs(["host=from-flag"]).unwrap();
        let env = EnvSource::with_lookup(|key: &str| Some(format!("env:{key}")));
        let mut chain = ChainSource::new().then(flags).then(env);
        assert_eq!(chain.fetch(&spec("host")).unwrap().as_deref(), Some("from-flag"));
        assert_eq!(
            chain.fetch(&spec("port")).unwrap().as_deref(),
            Some("env:SECTOOLBOX_INPUT_PORT")
        );
        assert_eq!(ChainSource::new().fetch(&spec("host")).unwrap(), None);
    }
}
