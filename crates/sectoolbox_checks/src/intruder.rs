//! The `intruder` test: many concurrent HTTP requests against one URL.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::json;

use sectoolbox_core::{InputKind, InputSpec, ResolvedInputs, RunContext, RunResult, SecurityTest, TestFailure};

use crate::burst::{
    DETAILS_SAMPLE, LatencyStats, MAX_CONCURRENCY, MAX_TOTAL, count_input, round4, run_burst, seconds_input,
};
use crate::http::{self, Request};

/// One request of a burst. `ok` means a response arrived, whatever its status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpAttempt {
    pub index: usize,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn attempt(index: usize, client: &Client, request: &Request, limit: Duration, ctx: &RunContext) -> HttpAttempt {
    let start = Instant::now();
    let result = http::send(client, request, limit, ctx);
    let elapsed_seconds = round4(start.elapsed().as_secs_f64());
    match result {
        Ok(response) => {
            let status = response.status();
            HttpAttempt {
                index,
                ok: true,
                status_code: Some(status.as_u16()),
                reason: status.canonical_reason().map(str::to_string),
                elapsed_seconds,
                error: None,
            }
        }
        Err(error) => {
            tracing::debug!(index, %error, "request failed");
            HttpAttempt {
                index,
                ok: false,
                status_code: None,
                reason: None,
                elapsed_seconds,
                error: Some(error),
            }
        }
    }
}

/// Response counts keyed by status code.
pub fn status_counts(attempts: &[HttpAttempt]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for code in attempts.iter().filter_map(|a| a.status_code) {
        *counts.entry(code.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Sends a burst of concurrent requests and summarizes status codes and latency.
pub struct Intruder;

impl SecurityTest for Intruder {
    fn name(&self) -> &str {
        "intruder"
    }

    fn description(&self) -> &str {
        "Send many concurrent HTTP requests to a URL and report status counts and latency percentiles."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("target", InputKind::String).with_prompt("Target URL (e.g. https://example.com/path)"),
            InputSpec::optional("method", InputKind::String)
                .with_default("GET")
                .with_prompt("HTTP method"),
            InputSpec::optional("total", InputKind::Number)
                .with_default("10")
                .with_prompt("Total number of requests"),
            InputSpec::optional("concurrency", InputKind::Number)
                .with_default("4")
                .with_prompt("Simultaneous requests"),
            InputSpec::optional("timeout", InputKind::Number)
                .with_default("5")
                .with_prompt("Per-request timeout in seconds"),
            InputSpec::optional("headers", InputKind::Secret)
                .with_prompt("Request headers, one `Name: value` per line (separate lines with \\n)"),
        ]
    }

    fn run(&self, inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult {
        let request =
            Request::from_inputs(inputs, "headers")?.ok_or_else(|| TestFailure::new("target must not be empty"))?;
        let total = count_input(inputs, "total", 10, MAX_TOTAL);
        let concurrency = count_input(inputs, "concurrency", 4, MAX_CONCURRENCY);
        let limit = seconds_input(inputs, "timeout", 5.0);
        let client = http::client()?;
        ctx.checkpoint()?;

        let wall = Instant::now();
        let attempts = run_burst(
            total,
            concurrency,
            ctx,
            |index| attempt(index, &client, &request, limit, ctx),
            |a| a.index,
        );
        let wall_time = wall.elapsed();

        let successes = attempts.iter().filter(|a| a.ok).count();
        let failures = attempts.len() - successes;
        let latencies: Vec<f64> = attempts.iter().map(|a| a.elapsed_seconds).collect();
        let stats = LatencyStats::from_samples(&latencies);

        Ok(json!({
            "target": request.url.as_str(),
            "method": request.method.as_str(),
            "request_headers": request.header_names(),
            "total_requested": total,
            "concurrency": concurrency,
            "timeout_seconds": limit.as_secs_f64(),
            "wall_time_seconds": round4(wall_time.as_secs_f64()),
            "requests_sent": attempts.len(),
            "successes": successes,
            "failures": failures,
            "errors": failures,
            "status_counts": status_counts(&attempts),
            "avg_latency_seconds": stats.map(|s| s.avg),
            "p50_latency_seconds": stats.map(|s| s.p50),
            "p95_latency_seconds": stats.map(|s| s.p95),
            "details_sample": &attempts[..attempts.len().min(DETAILS_SAMPLE)],
        }))
    }
}
