//! Explicit registration list.
//!
//! Modules make themselves discoverable by adding a constructor to a [`CandidateSet`] at process
//! init. The runner later turns the set into a catalog, constructing and validating each candidate
//! in registration order.
//!
//! Constructors are fallible: a module that cannot build itself (missing wordlist, bad embedded
//! data) returns `Err(reason)` and only that candidate is dropped.

use std::fmt;
use std::sync::Arc;

use crate::contract::SecurityTest;

/// What a candidate constructor produces.
pub type ConstructResult = Result<Arc<dyn SecurityTest>, String>;

type Constructor = Box<dyn FnOnce() -> ConstructResult + Send>;

/// One registered, not yet constructed test module.
pub struct Candidate {
    origin: String,
    construct: Constructor,
}

impl Candidate {
    pub fn new(origin: impl Into<String>, construct: impl FnOnce() -> ConstructResult + Send + 'static) -> Self {
        Self {
            origin: origin.into(),
            construct: Box::new(construct),
        }
    }

    /// Where the candidate came from (typically its module path), used in discovery errors.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Split into the origin label and the constructor.
    pub fn into_parts(self) -> (String, Box<dyn FnOnce() -> ConstructResult + Send>) {
        (self.origin, self.construct)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate").field("origin", &self.origin).finish_non_exhaustive()
    }
}

/// Ordered list of registered candidates.
#[derive(Debug, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fallible constructor.
    pub fn register(
        &mut self,
        origin: impl Into<String>,
        construct: impl FnOnce() -> ConstructResult + Send + 'static,
    ) -> &mut Self {
        self.candidates.push(Candidate::new(origin, construct));
        self
    }

    /// Register an already built instance.
    pub fn register_instance<T: SecurityTest + 'static>(&mut self, origin: impl Into<String>, test: T) -> &mut Self {
        self.register(origin, move || Ok(Arc::new(test) as Arc<dyn SecurityTest>))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(Candidate::origin)
    }
}

impl IntoIterator for CandidateSet {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

impl Extend<Candidate> for CandidateSet {
    fn extend<I: IntoIterator<Item = Candidate>>(&mut self, iter: I) {
        self.candidates.extend(iter);
    }
}
