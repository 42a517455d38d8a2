//! Test discovery and the catalog.
//!
//! ## Discovery
//!
//! [`discover`] walks a [`CandidateSet`] in registration order. For each candidate it runs the
//! constructor (a panic is contained and reported like any other failure), validates what the
//! instance declares, and either registers a [`TestDefinition`] or records exactly one
//! [`DiscoveryError`]. A bad candidate never stops the candidates after it.
//!
//! ## Catalog
//!
//! The [`Catalog`] is read-only once built. Iteration order is registration order, so menu
//! numbering and headless selection by index are reproducible for a given module set.
//!
//! ## Process-wide catalog
//!
//! [`global`] builds the built-in catalog once, on first use, and logs any discovery errors.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use miette::Diagnostic;
use thiserror::Error;

use sectoolbox_core::{CandidateSet, InputKind, InputSpec, SecurityTest, coerce};

use crate::panics::contain;

/// A candidate that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DiscoveryError {
    #[error("candidate `{origin}` failed to construct: {reason}")]
    #[diagnostic(code(sectoolbox::discovery::construct))]
    Construct { origin: String, reason: String },

    #[error("candidate `{origin}` panicked while constructing: {reason}")]
    #[diagnostic(code(sectoolbox::discovery::panic))]
    Panicked { origin: String, reason: String },

    #[error("candidate `{origin}` reports an empty name")]
    #[diagnostic(code(sectoolbox::discovery::empty_name))]
    EmptyName { origin: String },

    #[error("test `{name}` ({origin}) has an empty description")]
    #[diagnostic(code(sectoolbox::discovery::empty_description))]
    EmptyDescription { origin: String, name: String },

    #[error("test `{name}` ({origin}) declares an input with an empty name")]
    #[diagnostic(code(sectoolbox::discovery::empty_input))]
    EmptyInputName { origin: String, name: String },

    #[error("test `{name}` ({origin}) declares input `{input}` more than once")]
    #[diagnostic(code(sectoolbox::discovery::duplicate_input))]
    DuplicateInput { origin: String, name: String, input: String },

    #[error("test `{name}` ({origin}): default for input `{input}` is not a valid {kind}")]
    #[diagnostic(code(sectoolbox::discovery::invalid_default))]
    InvalidDefault {
        origin: String,
        name: String,
        input: String,
        kind: InputKind,
    },

    #[error("test `{name}` ({origin}) is already registered by `{existing}`")]
    #[diagnostic(code(sectoolbox::discovery::duplicate_name))]
    DuplicateName { origin: String, name: String, existing: String },
}

impl DiscoveryError {
    /// The candidate this error is about.
    pub fn origin(&self) -> &str {
        match self {
            DiscoveryError::Construct { origin, .. }
            | DiscoveryError::Panicked { origin, .. }
            | DiscoveryError::EmptyName { origin }
            | DiscoveryError::EmptyDescription { origin, .. }
            | DiscoveryError::EmptyInputName { origin, .. }
            | DiscoveryError::DuplicateInput { origin, .. }
            | DiscoveryError::InvalidDefault { origin, .. }
            | DiscoveryError::DuplicateName { origin, .. } => origin,
        }
    }
}

/// A selector that matches no registered test.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum LookupError {
    #[error("no test named `{selector}` is registered")]
    #[diagnostic(
        code(sectoolbox::not_found),
        help("run `sectoolbox list` to see the available tests")
    )]
    NotFound { selector: String },
}

/// Immutable descriptor of a registered test plus the shared handle to run it.
#[derive(Clone)]
pub struct TestDefinition {
    name: String,
    description: String,
    requires: Vec<InputSpec>,
    origin: String,
    test: Arc<dyn SecurityTest>,
}

impl TestDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared inputs, captured once at registration.
    pub fn requires(&self) -> &[InputSpec] {
        &self.requires
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub(crate) fn handle(&self) -> Arc<dyn SecurityTest> {
        Arc::clone(&self.test)
    }
}

impl fmt::Debug for TestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDefinition")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

/// Ordered, read-only set of registered tests.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<TestDefinition>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestDefinition> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(TestDefinition::name)
    }

    /// Look a test up by its exact name.
    pub fn lookup(&self, name: &str) -> Result<&TestDefinition, LookupError> {
        self.by_name
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| LookupError::NotFound {
                selector: name.to_string(),
            })
    }

    /// Look a test up by name, or by its 1-based position in the catalog.
    ///
    /// Names win over positions, so a test literally named `"2"` stays reachable.
    pub fn select(&self, selector: &str) -> Result<&TestDefinition, LookupError> {
        let selector = selector.trim();
        if let Ok(def) = self.lookup(selector) {
            return Ok(def);
        }
        selector
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| LookupError::NotFound {
                selector: selector.to_string(),
            })
    }

    fn insert(&mut self, def: TestDefinition) {
        self.by_name.insert(def.name.clone(), self.entries.len());
        self.entries.push(def);
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a TestDefinition;
    type IntoIter = std::slice::Iter<'a, TestDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// What discovery produced: the catalog plus one error per rejected candidate.
#[derive(Debug, Default)]
pub struct Discovery {
    pub catalog: Catalog,
    pub errors: Vec<DiscoveryError>,
}

/// Validate an instance and capture its definition.
fn define(origin: String, test: Arc<dyn SecurityTest>, catalog: &Catalog) -> Result<TestDefinition, DiscoveryError> {
    let name = test.name().to_string();
    if name.trim().is_empty() {
        return Err(DiscoveryError::EmptyName { origin });
    }
    let description = test.description().to_string();
    if description.trim().is_empty() {
        return Err(DiscoveryError::EmptyDescription { origin, name });
    }

    let requires = test.requires();
    let mut seen = HashSet::new();
    for spec in &requires {
        if spec.name.trim().is_empty() {
            return Err(DiscoveryError::EmptyInputName { origin, name });
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(DiscoveryError::DuplicateInput {
                origin,
                name,
                input: spec.name.clone(),
            });
        }
        if let Some(default) = &spec.default {
            if coerce(spec.kind, default).is_err() {
                return Err(DiscoveryError::InvalidDefault {
                    origin,
                    name,
                    input: spec.name.clone(),
                    kind: spec.kind,
                });
            }
        }
    }

    if let Ok(existing) = catalog.lookup(&name) {
        return Err(DiscoveryError::DuplicateName {
            origin,
            name,
            existing: existing.origin.clone(),
        });
    }

    Ok(TestDefinition {
        name,
        description,
        requires,
        origin,
        test,
    })
}

/// Build a catalog from registered candidates.
#[tracing::instrument(skip_all, fields(candidates = candidates.len()))]
pub fn discover(candidates: CandidateSet) -> Discovery {
    let mut discovery = Discovery::default();

    for candidate in candidates {
        let (origin, construct) = candidate.into_parts();

        let constructed = match contain(Vec::new(), construct) {
            Ok(Ok(test)) => Ok(test),
            Ok(Err(reason)) => Err(DiscoveryError::Construct {
                origin: origin.clone(),
                reason,
            }),
            Err(reason) => Err(DiscoveryError::Panicked {
                origin: origin.clone(),
                reason,
            }),
        };

        // Contract methods are module code too; a panic there rejects the candidate.
        let defined = constructed.and_then(|test| {
            let origin_for_panic = origin.clone();
            contain(Vec::new(), || define(origin, test, &discovery.catalog)).unwrap_or_else(|reason| {
                Err(DiscoveryError::Panicked {
                    origin: origin_for_panic,
                    reason,
                })
            })
        });

        match defined {
            Ok(def) => {
                tracing::debug!(test = def.name(), origin = def.origin(), "registered test");
                discovery.catalog.insert(def);
            }
            Err(err) => {
                tracing::warn!(origin = err.origin(), "{err}");
                discovery.errors.push(err);
            }
        }
    }

    tracing::info!(
        registered = discovery.catalog.len(),
        rejected = discovery.errors.len(),
        "test discovery complete"
    );
    discovery
}

/// Candidates for every built-in test module.
pub fn builtin_candidates() -> CandidateSet {
    let mut set = CandidateSet::new();
    sectoolbox_checks::register_builtin(&mut set);
    set
}

static GLOBAL: OnceLock<Discovery> = OnceLock::new();

/// The process-wide discovery result for the built-in modules.
pub fn global() -> &'static Discovery {
    GLOBAL.get_or_init(|| discover(builtin_candidates()))
}
