use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::benchmark::{BenchmarkResult, ErrorKind, RunCounters};

/// Print with timestamp prefix
macro_rules! output {
    () => {
        let now = chrono::Utc::now();
        println!("{}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
    };
    ($($arg:tt)*) => {{
        let now = chrono::Utc::now();
        print!("{} ", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
        println!($($arg)*);
    }};
}

/// Aggregate statistics over one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub requests_per_second: f64,
    /// Completion tokens from successful requests over whole-run wall clock.
    pub output_tokens_per_second: f64,
    pub total_prompt_tokens: u64,
    pub total_output_tokens: u64,
    pub latency: LatencySummary,
    pub errors: ErrorBreakdown,
}

/// Latency statistics in milliseconds over successful requests only.
/// Percentiles use the nearest-rank method: the value at rank
/// `ceil(p/100 * n)` of the ascending-sorted sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub stdev_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorBreakdown {
    pub timeout: usize,
    pub http_error: usize,
    pub parse_error: usize,
}

/// Folds a result sequence into a [`BenchmarkSummary`].
///
/// Pure over its inputs: an empty sequence yields an all-zero summary and
/// never divides by zero.
pub fn summarize(results: &[BenchmarkResult], wall_clock: Duration) -> BenchmarkSummary {
    let total = results.len();
    let mut latencies: Vec<f64> = Vec::with_capacity(total);
    let mut errors = ErrorBreakdown::default();
    let mut prompt_tokens: u64 = 0;
    let mut output_tokens: u64 = 0;

    for result in results {
        if result.success {
            latencies.push(result.latency_ms);
            prompt_tokens += result.prompt_tokens;
            output_tokens += result.completion_tokens;
        } else if let Some(kind) = result.error {
            match kind {
                ErrorKind::Timeout => errors.timeout += 1,
                ErrorKind::HttpError => errors.http_error += 1,
                ErrorKind::ParseError => errors.parse_error += 1,
            }
        }
    }

    latencies.sort_by(|a, b| a.total_cmp(b));
    let successful = latencies.len();
    let wall_secs = wall_clock.as_secs_f64();

    BenchmarkSummary {
        total_requests: total,
        successful_requests: successful,
        failed_requests: total - successful,
        requests_per_second: if wall_secs > 0.0 {
            total as f64 / wall_secs
        } else {
            0.0
        },
        output_tokens_per_second: if wall_secs > 0.0 {
            output_tokens as f64 / wall_secs
        } else {
            0.0
        },
        total_prompt_tokens: prompt_tokens,
        total_output_tokens: output_tokens,
        latency: latency_summary(&latencies),
        errors,
    }
}

fn latency_summary(sorted: &[f64]) -> LatencySummary {
    if sorted.is_empty() {
        return LatencySummary::default();
    }

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let stdev = if n > 1 {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    LatencySummary {
        mean_ms: mean,
        min_ms: sorted[0],
        max_ms: sorted[n - 1],
        stdev_ms: stdev,
        p50_ms: nearest_rank(sorted, 50.0),
        p95_ms: nearest_rank(sorted, 95.0),
        p99_ms: nearest_rank(sorted, 99.0),
    }
}

/// Nearest-rank percentile over an ascending-sorted sample.
pub fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (percentile / 100.0 * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Prints windowed progress lines from the run counters until stopped.
/// Each window reports the delta over the previous one as rates.
pub async fn progress_loop(
    counters: Arc<RunCounters>,
    interval: Duration,
    stop: CancellationToken,
) {
    let mut window: u64 = 0;
    let mut prev_sent = 0usize;
    let mut prev_succeeded = 0usize;
    let mut prev_failed = 0usize;
    let mut prev_tokens = 0u64;

    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; swallow it so window 1 covers a
    // full interval.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sent = counters.sent();
        let succeeded = counters.succeeded();
        let failed = counters.failed();
        let tokens = counters.output_tokens();
        let interval_secs = interval.as_secs_f64();

        window += 1;
        output!();
        output!("-----");
        output!("Window: {}", window);
        output!(
            "Requests/s: Sent: {:.2} In-flight: {}",
            (sent - prev_sent) as f64 / interval_secs,
            counters.in_flight()
        );

        let window_responses = (succeeded - prev_succeeded) + (failed - prev_failed);
        let success_rate = if window_responses > 0 {
            100.0 * (succeeded - prev_succeeded) as f64 / window_responses as f64
        } else {
            0.0
        };
        output!(
            "Responses/s: Ok: {:.2} Err: {:.2} Success: {:.2}%",
            (succeeded - prev_succeeded) as f64 / interval_secs,
            (failed - prev_failed) as f64 / interval_secs,
            success_rate
        );

        if tokens > prev_tokens {
            output!(
                "Tokens/s: Output: {:.2}",
                (tokens - prev_tokens) as f64 / interval_secs
            );
        }

        prev_sent = sent;
        prev_succeeded = succeeded;
        prev_failed = failed;
        prev_tokens = tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LatencyMode;

    fn result(index: usize, success: bool, latency_ms: f64, error: Option<ErrorKind>) -> BenchmarkResult {
        BenchmarkResult {
            index,
            success,
            latency_ms,
            prompt_tokens: if success { 10 } else { 0 },
            completion_tokens: if success { 50 } else { 0 },
            mode: LatencyMode::FullResponse,
            error,
        }
    }

    #[test]
    fn test_empty_results_yield_zero_summary() {
        let summary = summarize(&[], Duration::ZERO);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.successful_requests, 0);
        assert_eq!(summary.failed_requests, 0);
        assert_eq!(summary.requests_per_second, 0.0);
        assert_eq!(summary.output_tokens_per_second, 0.0);
        assert_eq!(summary.latency, LatencySummary::default());
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64 * 10.0).collect();

        // rank = ceil(0.50 * 10) = 5 -> 50ms
        assert_eq!(nearest_rank(&sorted, 50.0), 50.0);
        // rank = ceil(0.95 * 10) = 10 -> 100ms
        assert_eq!(nearest_rank(&sorted, 95.0), 100.0);
        // rank = ceil(0.99 * 10) = 10 -> 100ms
        assert_eq!(nearest_rank(&sorted, 99.0), 100.0);
        assert_eq!(nearest_rank(&sorted, 100.0), 100.0);
        assert_eq!(nearest_rank(&sorted, 10.0), 10.0);
    }

    #[test]
    fn test_nearest_rank_single_sample() {
        assert_eq!(nearest_rank(&[42.0], 50.0), 42.0);
        assert_eq!(nearest_rank(&[42.0], 99.0), 42.0);
    }

    #[test]
    fn test_summary_counts_and_error_breakdown() {
        let results = vec![
            result(0, true, 100.0, None),
            result(1, false, 5000.0, Some(ErrorKind::Timeout)),
            result(2, true, 200.0, None),
            result(3, false, 10.0, Some(ErrorKind::HttpError)),
            result(4, false, 20.0, Some(ErrorKind::ParseError)),
            result(5, true, 300.0, None),
        ];
        let summary = summarize(&results, Duration::from_secs(10));

        assert_eq!(summary.total_requests, 6);
        assert_eq!(summary.successful_requests, 3);
        assert_eq!(summary.failed_requests, 3);
        assert_eq!(summary.successful_requests + summary.failed_requests, 6);
        assert_eq!(summary.errors.timeout, 1);
        assert_eq!(summary.errors.http_error, 1);
        assert_eq!(summary.errors.parse_error, 1);
        // Failed requests contribute no tokens.
        assert_eq!(summary.total_output_tokens, 150);
        assert!((summary.output_tokens_per_second - 15.0).abs() < 1e-9);
        assert!((summary.requests_per_second - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_latency_stats_over_successes_only() {
        let mut results: Vec<BenchmarkResult> = (1..=10)
            .map(|i| result(i, true, i as f64 * 10.0, None))
            .collect();
        // A slow failure must not distort the percentiles.
        results.push(result(11, false, 60_000.0, Some(ErrorKind::Timeout)));

        let summary = summarize(&results, Duration::from_secs(1));
        assert_eq!(summary.latency.p50_ms, 50.0);
        assert_eq!(summary.latency.p99_ms, 100.0);
        assert_eq!(summary.latency.min_ms, 10.0);
        assert_eq!(summary.latency.max_ms, 100.0);
        assert!((summary.latency.mean_ms - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_stdev_sample_formula() {
        let results = vec![
            result(0, true, 10.0, None),
            result(1, true, 20.0, None),
            result(2, true, 30.0, None),
        ];
        let summary = summarize(&results, Duration::from_secs(1));
        assert!((summary.latency.stdev_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_is_deterministic() {
        let results = vec![
            result(0, true, 100.0, None),
            result(1, false, 50.0, Some(ErrorKind::Timeout)),
        ];
        let a = summarize(&results, Duration::from_secs(2));
        let b = summarize(&results, Duration::from_secs(2));
        assert_eq!(a.latency, b.latency);
        assert_eq!(a.errors, b.errors);
        assert_eq!(a.total_requests, b.total_requests);
    }
}
