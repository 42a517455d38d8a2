//! TCP checks: `tcp-reachability` and `tcp-burst`.
//!
//! Both tests bound every connect attempt by the smaller of their own per-attempt timeout and the
//! time the runner has left for them, and stop issuing attempts once cancelled.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use sectoolbox_core::{InputKind, InputSpec, ResolvedInputs, RunContext, RunResult, SecurityTest, TestFailure};

use crate::burst::{
    DETAILS_SAMPLE, LatencyStats, MAX_CONCURRENCY, MAX_TOTAL, count_input, round4, run_burst, seconds_input,
};

fn host_input(inputs: &ResolvedInputs) -> Result<&str, TestFailure> {
    let host = inputs.text("host").unwrap_or_default().trim();
    if host.is_empty() {
        return Err(TestFailure::new("host must not be empty"));
    }
    Ok(host)
}

fn port_input(inputs: &ResolvedInputs) -> Result<u16, TestFailure> {
    let port = inputs.number("port").unwrap_or(80.0);
    if port.fract() != 0.0 || !(1.0..=65535.0).contains(&port) {
        return Err(TestFailure::new(format!("port must be an integer between 1 and 65535, got {port}")));
    }
    Ok(port as u16)
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, TestFailure> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TestFailure::new(format!("could not resolve {host}:{port}: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(TestFailure::new(format!("{host}:{port} resolved to no addresses")));
    }
    Ok(addrs)
}

/// One connect attempt bounded by `limit` and the context deadline.
fn connect_once(addr: &SocketAddr, limit: Duration, ctx: &RunContext) -> Result<Duration, String> {
    let budget = limit.min(ctx.remaining());
    if budget.is_zero() {
        return Err("no time left".to_string());
    }
    let start = Instant::now();
    TcpStream::connect_timeout(addr, budget)
        .map(|_| start.elapsed())
        .map_err(|e| e.to_string())
}

/// Checks whether a TCP port accepts connections.
pub struct TcpReachability;

impl SecurityTest for TcpReachability {
    fn name(&self) -> &str {
        "tcp-reachability"
    }

    fn description(&self) -> &str {
        "Check whether a host accepts TCP connections on a port."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("host", InputKind::String).with_prompt("Target host (e.g. example.com)"),
            InputSpec::optional("port", InputKind::Number)
                .with_default("80")
                .with_prompt("TCP port"),
            InputSpec::optional("connect_timeout", InputKind::Number)
                .with_default("3")
                .with_prompt("Connect timeout in seconds"),
        ]
    }

    fn run(&self, inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult {
        let host = host_input(inputs)?;
        let port = port_input(inputs)?;
        let limit = seconds_input(inputs, "connect_timeout", 3.0);

        let addrs = resolve(host, port)?;
        let mut last_error = None;
        for addr in &addrs {
            ctx.checkpoint()?;
            match connect_once(addr, limit, ctx) {
                Ok(latency) => {
                    return Ok(json!({
                        "host": host,
                        "port": port,
                        "reachable": true,
                        "address": addr.to_string(),
                        "latency_ms": round4(latency.as_secs_f64() * 1000.0),
                    }));
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Ok(json!({
            "host": host,
            "port": port,
            "reachable": false,
            "addresses_tried": addrs.len(),
            "error": last_error,
        }))
    }
}

/// Outcome of one burst attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub index: usize,
    pub ok: bool,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Opens many TCP connections concurrently and summarizes latency and failures.
pub struct TcpBurst;

impl TcpBurst {
    fn burst(addr: SocketAddr, total: usize, concurrency: usize, limit: Duration, ctx: &RunContext) -> Vec<Attempt> {
        run_burst(
            total,
            concurrency,
            ctx,
            |index| {
                let start = Instant::now();
                let result = connect_once(&addr, limit, ctx);
                Attempt {
                    index,
                    ok: result.is_ok(),
                    elapsed_seconds: round4(start.elapsed().as_secs_f64()),
                    error: result.err(),
                }
            },
            |attempt| attempt.index,
        )
    }
}

impl SecurityTest for TcpBurst {
    fn name(&self) -> &str {
        "tcp-burst"
    }

    fn description(&self) -> &str {
        "Open many concurrent TCP connections to a port and report failures and latency percentiles."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::required("host", InputKind::String).with_prompt("Target host (e.g. example.com)"),
            InputSpec::optional("port", InputKind::Number)
                .with_default("80")
                .with_prompt("TCP port"),
            InputSpec::optional("total", InputKind::Number)
                .with_default("10")
                .with_prompt("Total number of connections"),
            InputSpec::optional("concurrency", InputKind::Number)
                .with_default("4")
                .with_prompt("Simultaneous connections"),
            InputSpec::optional("timeout", InputKind::Number)
                .with_default("5")
                .with_prompt("Per-connection timeout in seconds"),
        ]
    }

    fn run(&self, inputs: &ResolvedInputs, ctx: &RunContext) -> RunResult {
        let host = host_input(inputs)?;
        let port = port_input(inputs)?;
        let total = count_input(inputs, "total", 10, MAX_TOTAL);
        let concurrency = count_input(inputs, "concurrency", 4, MAX_CONCURRENCY);
        let limit = seconds_input(inputs, "timeout", 5.0);

        let addrs = resolve(host, port)?;
        let addr = addrs[0];
        ctx.checkpoint()?;

        let wall = Instant::now();
        let attempts = Self::burst(addr, total, concurrency, limit, ctx);
        let wall_time = wall.elapsed();

        let successes = attempts.iter().filter(|a| a.ok).count();
        let latencies: Vec<f64> = attempts.iter().map(|a| a.elapsed_seconds).collect();
        let stats = LatencyStats::from_samples(&latencies);

        Ok(json!({
            "host": host,
            "port": port,
            "address": addr.to_string(),
            "total_requested": total,
            "concurrency": concurrency,
            "timeout_seconds": limit.as_secs_f64(),
            "wall_time_seconds": round4(wall_time.as_secs_f64()),
            "attempts_made": attempts.len(),
            "successes": successes,
            "failures": attempts.len() - successes,
            "avg_latency_seconds": stats.map(|s| s.avg),
            "p50_latency_seconds": stats.map(|s| s.p50),
            "p95_latency_seconds": stats.map(|s| s.p95),
            "details_sample": &attempts[..attempts.len().min(DETAILS_SAMPLE)],
        }))
    }
}
