//! Concurrent attempt loop and latency summary shared by the burst-style tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Serialize;

use sectoolbox_core::{ResolvedInputs, RunContext};

/// Attempts kept in a payload's `details_sample`.
pub(crate) const DETAILS_SAMPLE: usize = 100;
pub(crate) const MAX_TOTAL: usize = 10_000;
pub(crate) const MAX_CONCURRENCY: usize = 256;

pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Seconds input as a duration; non-positive values fall back to `fallback`.
pub(crate) fn seconds_input(inputs: &ResolvedInputs, name: &str, fallback: f64) -> Duration {
    let secs = inputs.number(name).filter(|s| *s > 0.0).unwrap_or(fallback);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(fallback))
}

/// Count input clamped to `1..=max`.
pub(crate) fn count_input(inputs: &ResolvedInputs, name: &str, fallback: usize, max: usize) -> usize {
    let raw = inputs.number(name).unwrap_or(fallback as f64);
    if raw < 1.0 { 1 } else { (raw as usize).min(max) }
}

/// Run `attempt(index)` for `0..total` on up to `concurrency` scoped workers.
///
/// Workers stop taking new indices once `ctx` is cancelled, so the result may be shorter than
/// `total`. Results come back sorted by `index_of`.
pub(crate) fn run_burst<T, F>(
    total: usize,
    concurrency: usize,
    ctx: &RunContext,
    attempt: F,
    index_of: impl Fn(&T) -> usize,
) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let next = AtomicUsize::new(0);
    let results = Mutex::new(Vec::with_capacity(total));

    thread::scope(|scope| {
        for _ in 0..concurrency.min(total) {
            scope.spawn(|| {
                loop {
                    if ctx.is_cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= total {
                        break;
                    }
                    let outcome = attempt(index);
                    if let Ok(mut guard) = results.lock() {
                        guard.push(outcome);
                    }
                }
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    results.sort_by_key(|r| index_of(r));
    results
}

/// Latency summary over a set of samples, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
}

impl LatencyStats {
    /// `None` for an empty sample set.
    ///
    /// `p50` is the median (mean of the middle pair for even counts); `p95` is the sample at
    /// index `floor(n * 0.95)`, clamped to the last one.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();

        let avg = sorted.iter().sum::<f64>() / n as f64;
        let p50 = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let idx95 = ((n as f64 * 0.95) as usize).min(n - 1);

        Some(Self {
            avg: round4(avg),
            p50: round4(p50),
            p95: round4(sorted[idx95]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sectoolbox_core::InputValue;

    #[test]
    fn test_latency_stats_odd_and_even() {
        let odd = LatencyStats::from_samples(&[0.3, 0.1, 0.2]).unwrap();
        assert_eq!(odd.p50, 0.2);
        assert_eq!(odd.avg, 0.2);
        assert_eq!(odd.p95, 0.3);

        let even = LatencyStats::from_samples(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(even.p50, 0.25);
        assert_eq!(even.p95, 0.4);

        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_p95_index_on_ten_samples() {
        let samples: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        let stats = LatencyStats::from_samples(&samples).unwrap();
        assert_eq!(stats.p95, 10.0);
        assert_eq!(stats.p50, 5.5);
    }

    #[test]
    fn test_run_burst_visits_every_index_once() {
        let ctx = RunContext::new(Duration::from_secs(5));
        let seen = run_burst(25, 4, &ctx, |i| i, |i| *i);
        assert_eq!(seen, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_burst_does_nothing_once_cancelled() {
        let ctx = RunContext::new(Duration::from_secs(5));
        ctx.token().cancel();
        assert!(run_burst(10, 2, &ctx, |i| i, |i| *i).is_empty());
    }

    #[test]
    fn test_count_and_seconds_inputs_fall_back() {
        let inputs: ResolvedInputs = [("total", InputValue::Number(-3.0)), ("timeout", InputValue::Number(0.0))]
            .into_iter()
            .collect();
        assert_eq!(count_input(&inputs, "total", 10, 100), 1);
        assert_eq!(count_input(&inputs, "concurrency", 4, 2), 2);
        assert_eq!(seconds_input(&inputs, "timeout", 5.0), Duration::from_secs(5));
    }
}
