//! Guardrails for the built-in modules: every one satisfies the registration rules the runner
//! enforces, so none of them is ever dropped at discovery.

use std::collections::HashSet;

use sectoolbox_checks::{CookieVerification, HeaderCheck, Intruder, TcpBurst, TcpReachability, register_builtin};
use sectoolbox_core::{CandidateSet, SecurityTest, coerce};

fn builtins() -> Vec<Box<dyn SecurityTest>> {
    vec![
        Box::new(CookieVerification),
        Box::new(HeaderCheck),
        Box::new(TcpReachability),
        Box::new(TcpBurst),
        Box::new(Intruder),
    ]
}

#[test]
fn builtin_names_are_unique_and_non_empty() {
    let mut seen = HashSet::new();
    for test in builtins() {
        assert!(!test.name().is_empty());
        assert!(!test.description().is_empty(), "{} has no description", test.name());
        assert!(seen.insert(test.name().to_string()), "duplicate name {}", test.name());
    }
}

#[test]
fn builtin_inputs_are_unique_and_defaults_coerce() {
    for test in builtins() {
        let mut names = HashSet::new();
        for spec in test.requires() {
            assert!(names.insert(spec.name.clone()), "{}: duplicate input {}", test.name(), spec.name);
            if let Some(default) = &spec.default {
                assert!(
                    coerce(spec.kind, default).is_ok(),
                    "{}: default {default:?} for {} is not a valid {}",
                    test.name(),
                    spec.name,
                    spec.kind
                );
            }
        }
    }
}

#[test]
fn register_builtin_adds_every_module_in_menu_order() {
    let mut set = CandidateSet::new();
    register_builtin(&mut set);
    let origins: Vec<String> = set.origins().map(str::to_string).collect();
    assert_eq!(
        origins,
        vec![
            "sectoolbox_checks::cookies",
            "sectoolbox_checks::headers",
            "sectoolbox_checks::tcp::reachability",
            "sectoolbox_checks::tcp::burst",
            "sectoolbox_checks::intruder",
        ]
    );
}
