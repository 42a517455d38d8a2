//! End-to-end tests for the headless runner: selection, resolution, execution, exit codes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use sectoolbox::cli::ExitCode;
use sectoolbox::cli::commands::{list_tests, run_headless};
use sectoolbox::sources::EnvSource;
use sectoolbox::{
    CandidateSet, Catalog, InputKind, InputSpec, ResolvedInputs, RunContext, RunResult, RunnerConfig, SecurityTest,
    SourceError, TestFailure, ValueSource, discover,
};

/// Reachability stand-in that never touches the network.
struct Ping {
    calls: Arc<AtomicUsize>,
}

impl SecurityTest for Ping {
    fn name(&self) -> &str {
        "ping"
    }
    fn description(&self) -> &str {
        "Check that a host answers"
    }
    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("host", InputKind::String),
            InputSpec::optional("count", InputKind::Number).with_default("1"),
        ]
    }
    fn run(&self, inputs: &ResolvedInputs, _ctx: &RunContext) -> RunResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match inputs.text("host") {
            Some("unreachable.invalid") => Err(TestFailure::new("host did not answer")),
            _ => Ok(json!({"reachable": true})),
        }
    }
}

struct Headers;

impl SecurityTest for Headers {
    fn name(&self) -> &str {
        "headers"
    }
    fn description(&self) -> &str {
        "Audit response headers"
    }
    fn run(&self, _inputs: &ResolvedInputs, _ctx: &RunContext) -> RunResult {
        Ok(json!({"missing": ["content-security-policy"]}))
    }
}

struct Stall;

impl SecurityTest for Stall {
    fn name(&self) -> &str {
        "stall"
    }
    fn description(&self) -> &str {
        "Never finishes on time"
    }
    fn run(&self, _inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult {
        while !ctx.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(TestFailure::cancelled())
    }
}

fn catalog() -> (Catalog, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut set = CandidateSet::new();
    set.register_instance(
        "stub::ping",
        Ping {
            calls: Arc::clone(&calls),
        },
    )
    .register_instance("stub::headers", Headers)
    .register_instance("stub::stall", Stall);
    let discovery = discover(set);
    assert!(discovery.errors.is_empty());
    (discovery.catalog, calls)
}

/// Environment source for tests that must never be consulted.
struct Untouchable;

impl ValueSource for Untouchable {
    fn fetch(&mut self, spec: &InputSpec) -> Result<Option<String>, SourceError> {
        panic!("input `{}` was requested", spec.name)
    }
}

fn no_env() -> EnvSource<impl FnMut(&str) -> Option<String>> {
    EnvSource::with_lookup(|_: &str| None)
}

fn config() -> RunnerConfig {
    RunnerConfig::new().with_color(false).with_timeout(Duration::from_secs(5))
}

fn pairs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The JSON document printed after the status line.
fn printed_record(out: &[u8]) -> Value {
    let text = String::from_utf8_lossy(out);
    let start = text.find('{').unwrap();
    let end = text.rfind('}').unwrap();
    serde_json::from_str(&text[start..=end]).unwrap()
}

#[test]
fn catalog_lists_tests_in_registration_order() {
    let (catalog, _) = catalog();
    let mut out = Vec::new();
    list_tests(&catalog, false, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    insta::assert_snapshot!(text.trim_end(), @r"
    1) ping — Check that a host answers
       inputs: host (string, required), count (number, default 1)
    2) headers — Audit response headers
    3) stall — Never finishes on time
    ");
}

#[test]
fn list_json_includes_inputs() {
    let (catalog, _) = catalog();
    let mut out = Vec::new();
    list_tests(&catalog, true, &mut out).unwrap();
    let listing: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(listing["tests"][0]["name"], json!("ping"));
    assert_eq!(listing["tests"][0]["index"], json!(1));
    assert_eq!(listing["tests"][0]["inputs"][0], json!({"name": "host", "kind": "string", "required": true}));
    assert_eq!(listing["tests"][1]["inputs"], json!([]));
}

#[test]
fn ping_with_host_succeeds() {
    let (catalog, calls) = catalog();
    let mut out = Vec::new();
    let code = run_headless(&catalog, "ping", &pairs(&["host=example.com"]), no_env(), &config(), &mut out).unwrap();

    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let record = printed_record(&out);
    assert_eq!(record["reachable"], json!(true));
    assert_eq!(record["status"], json!("succeeded"));
    assert_eq!(record["test_name"], json!("ping"));
}

#[test]
fn unknown_test_fails_before_any_input_is_requested() {
    let (catalog, calls) = catalog();
    let mut out = Vec::new();
    let err = run_headless(&catalog, "missing-test", &pairs(&["host=x"]), Untouchable, &config(), &mut out)
        .unwrap_err();

    assert_eq!(err.exit_code, ExitCode::NOT_FOUND);
    assert!(err.message.contains("missing-test"));
    assert!(out.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_input_never_runs_the_test() {
    let (catalog, calls) = catalog();
    let mut out = Vec::new();
    let err = run_headless(&catalog, "ping", &[], no_env(), &config(), &mut out).unwrap_err();

    assert_eq!(err.exit_code, ExitCode::MISSING_INPUT);
    assert!(err.message.contains("`ping`"));
    assert!(err.message.contains("host"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn invalid_input_is_rejected() {
    let (catalog, calls) = catalog();
    let mut out = Vec::new();
    let err = run_headless(&catalog, "1", &pairs(&["host=a", "count=many"]), no_env(), &config(), &mut out)
        .unwrap_err();

    assert_eq!(err.exit_code, ExitCode::INVALID_INPUT);
    assert!(err.message.contains("count"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn malformed_input_flag_is_a_usage_error() {
    let (catalog, _) = catalog();
    let err = run_headless(&catalog, "ping", &pairs(&["host"]), no_env(), &config(), &mut Vec::new()).unwrap_err();
    assert_eq!(err.exit_code, ExitCode::USAGE);
}

#[test]
fn environment_fills_inputs_flags_leave_out() {
    let (catalog, _) = catalog();
    let env = EnvSource::with_lookup(|key: &str| (key == "SECTOOLBOX_INPUT_HOST").then(|| "env.example".to_string()));
    let code = run_headless(&catalog, "ping", &[], env, &config(), &mut Vec::new()).unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
}

#[test]
fn failed_run_maps_to_its_exit_code_and_runner_keeps_working() {
    let (catalog, calls) = catalog();
    let mut out = Vec::new();
    let code = run_headless(
        &catalog,
        "ping",
        &pairs(&["host=unreachable.invalid"]),
        no_env(),
        &config(),
        &mut out,
    )
    .unwrap();
    assert_eq!(code, ExitCode::TEST_FAILED);
    let record = printed_record(&out);
    assert_eq!(record["error_message"], json!("host did not answer"));

    let code = run_headless(&catalog, "ping", &pairs(&["host=example.com"]), no_env(), &config(), &mut Vec::new())
        .unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn stalled_test_times_out() {
    let (catalog, _) = catalog();
    let config = config().with_timeout(Duration::from_millis(100));
    let code = run_headless(&catalog, "stall", &[], no_env(), &config, &mut Vec::new()).unwrap();
    assert_eq!(code, ExitCode::TIMED_OUT);
}

#[test]
fn configured_save_format_writes_a_file() {
    let (catalog, _) = catalog();
    let dir = tempfile::tempdir().unwrap();
    let config = config()
        .with_save(Some(sectoolbox::SaveFormat::Csv))
        .with_results_dir(dir.path().join("out"));
    let mut out = Vec::new();
    run_headless(&catalog, "headers", &[], no_env(), &config, &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Result saved to:"), "{text}");
    let files: Vec<_> = std::fs::read_dir(dir.path().join("out")).unwrap().collect();
    assert_eq!(files.len(), 1);
    let csv = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    assert!(csv.starts_with("duration_seconds,missing,run_timestamp,status,test_name"), "{csv}");
}

#[test]
fn unsaved_result_keeps_the_run_exit_code() {
    let (catalog, _) = catalog();
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "occupied").unwrap();
    let config = config()
        .with_save(Some(sectoolbox::SaveFormat::Json))
        .with_results_dir(&blocker);

    let mut out = Vec::new();
    let code = run_headless(&catalog, "ping", &pairs(&["host=unreachable.invalid"]), no_env(), &config, &mut out)
        .unwrap();
    assert_eq!(code, ExitCode::TEST_FAILED);
    assert!(!String::from_utf8(out).unwrap().contains("Result saved to:"));

    let code = run_headless(&catalog, "headers", &[], no_env(), &config, &mut Vec::new()).unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
}
