use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::client::{
    ChatCompletionRequest, ClientError, CompletionClient, LatencyMode, Message,
};
use crate::config::BenchConfig;
use crate::prompts::{BenchmarkRequest, PromptPool};

/// The endpoint could not be reached on the very first request. Later
/// transport failures are tolerated and recorded per request; this one means
/// the endpoint is misconfigured and fails the whole run.
#[derive(Error, Debug)]
#[error("endpoint unreachable: {0}")]
pub struct ConnectivityError(pub String);

/// Per-request failure categories surfaced in results and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    HttpError,
    ParseError,
}

impl ErrorKind {
    fn classify(error: &ClientError) -> Self {
        match error {
            ClientError::Timeout(_) => ErrorKind::Timeout,
            ClientError::Parse(_) => ErrorKind::ParseError,
            // Transport failures past the probe count against the endpoint
            // the same as any non-2xx exchange.
            ClientError::Connection(_) | ClientError::Http { .. } | ClientError::Other(_) => {
                ErrorKind::HttpError
            }
        }
    }
}

/// The measured outcome of one dispatched request. Every dispatched request
/// yields exactly one of these, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub index: usize,
    pub success: bool,
    pub latency_ms: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Which latency measurement this result reflects.
    pub mode: LatencyMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Results of a finished (or cancelled) run, ordered by request index.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<BenchmarkResult>,
    pub wall_clock: Duration,
}

/// Live counters for a single run, shared between the workers and the
/// progress printer. Owned by the runner rather than living in a global
/// registry so that two runs in one process cannot observe each other.
#[derive(Debug, Default)]
pub struct RunCounters {
    sent: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    output_tokens: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RunCounters {
    fn request_started(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    fn request_finished(&self, result: &BenchmarkResult) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        if result.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            self.output_tokens
                .fetch_add(result.completion_tokens, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// High-water mark of concurrently in-flight requests. Never exceeds the
    /// configured concurrency.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Relaxed)
    }
}

/// Drives a fixed number of completion requests through a bounded worker
/// pool against any [`CompletionClient`].
///
/// Workers pull sample indices from a shared counter, so at most
/// `concurrency` requests are ever in flight and every index is issued
/// exactly once. Results land in one slot per index and are reported in
/// index order regardless of completion order.
pub struct BenchmarkRunner {
    client: Arc<dyn CompletionClient>,
    config: BenchConfig,
    pool: Arc<PromptPool>,
    counters: Arc<RunCounters>,
}

impl BenchmarkRunner {
    pub fn new(client: Arc<dyn CompletionClient>, config: BenchConfig, pool: PromptPool) -> Self {
        Self {
            client,
            config,
            pool: Arc::new(pool),
            counters: Arc::new(RunCounters::default()),
        }
    }

    /// Handle to the live counters, for progress reporting.
    pub fn counters(&self) -> Arc<RunCounters> {
        Arc::clone(&self.counters)
    }

    /// Executes the run.
    ///
    /// Cancelling `cancel` stops new dispatches; requests already in flight
    /// finish on their own timeouts and the partial results are returned.
    /// The configured run timeout cancels the same way. The only fatal
    /// error is a connection-level failure on the very first request.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunOutcome, ConnectivityError> {
        let samples = self.config.load.samples;
        let mode = if self.config.load.stream {
            LatencyMode::FirstToken
        } else {
            LatencyMode::FullResponse
        };
        let start = Instant::now();

        if samples == 0 || cancel.is_cancelled() {
            return Ok(RunOutcome {
                results: Vec::new(),
                wall_clock: start.elapsed(),
            });
        }

        if let Some(limit) = self.config.load.run_timeout {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        info!("Run timeout of {:?} reached, stopping dispatch", limit);
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            });
        }

        let model = self.config.endpoint.model.clone().unwrap_or_default();
        let request_timeout = self.config.endpoint.request_timeout;
        let mut slots: Vec<Option<BenchmarkResult>> = vec![None; samples];

        // The first request doubles as a connectivity probe.
        let request = wire_request(&model, &self.pool.request(0), 0);
        let (first, error) = Self::issue(
            Arc::clone(&self.client),
            request,
            0,
            mode,
            request_timeout,
            Arc::clone(&self.counters),
        )
        .await;
        if let Some(ClientError::Connection(message)) = error {
            return Err(ConnectivityError(message));
        }
        slots[0] = Some(first);

        let next = Arc::new(AtomicUsize::new(1));
        let workers = self.config.load.concurrency.min(samples - 1);

        debug!(
            "Dispatching {} remaining requests across {} workers",
            samples - 1,
            workers
        );

        let mut handles = Vec::with_capacity(workers);
        for _worker_id in 0..workers {
            let client = Arc::clone(&self.client);
            let counters = Arc::clone(&self.counters);
            let pool = Arc::clone(&self.pool);
            let next = Arc::clone(&next);
            let cancel = cancel.clone();
            let model = model.clone();

            let handle = tokio::spawn(async move {
                let mut results = Vec::new();
                loop {
                    // Stop pulling new work once cancelled; requests already
                    // in flight on other workers finish on their own.
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    if index >= samples {
                        break;
                    }
                    let request = wire_request(&model, &pool.request(index), index);
                    let (result, _) = Self::issue(
                        Arc::clone(&client),
                        request,
                        index,
                        mode,
                        request_timeout,
                        Arc::clone(&counters),
                    )
                    .await;
                    results.push(result);
                }
                results
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(worker_results) => {
                    for result in worker_results {
                        let index = result.index;
                        slots[index] = Some(result);
                    }
                }
                Err(e) => warn!("Benchmark worker failed: {}", e),
            }
        }

        let wall_clock = start.elapsed();
        // Cancellation can leave unissued indices behind; the report covers
        // whatever completed, still ordered by index.
        let results: Vec<BenchmarkResult> = slots.into_iter().flatten().collect();

        info!(
            "Benchmark completed in {:.1}s ({}/{} requests)",
            wall_clock.as_secs_f64(),
            results.len(),
            samples
        );

        Ok(RunOutcome {
            results,
            wall_clock,
        })
    }

    async fn issue(
        client: Arc<dyn CompletionClient>,
        request: ChatCompletionRequest,
        index: usize,
        mode: LatencyMode,
        request_timeout: Duration,
        counters: Arc<RunCounters>,
    ) -> (BenchmarkResult, Option<ClientError>) {
        debug!("Executing request {}", index);
        counters.request_started();
        let start = Instant::now();

        let outcome = timeout(request_timeout, client.complete(request, mode)).await;
        let elapsed = start.elapsed();

        let (result, error) = match outcome {
            Ok(Ok(completion)) => {
                let latency = match mode {
                    LatencyMode::FirstToken => completion.time_to_first_token.unwrap_or(elapsed),
                    LatencyMode::FullResponse => elapsed,
                };
                let result = BenchmarkResult {
                    index,
                    success: true,
                    latency_ms: latency.as_secs_f64() * 1000.0,
                    prompt_tokens: completion.prompt_tokens,
                    completion_tokens: completion.completion_tokens,
                    mode,
                    error: None,
                };
                (result, None)
            }
            Ok(Err(e)) => {
                debug!("Request {} failed: {}", index, e);
                (failure(index, elapsed, mode, ErrorKind::classify(&e)), Some(e))
            }
            Err(_) => {
                debug!("Request {} timed out after {:?}", index, request_timeout);
                (failure(index, elapsed, mode, ErrorKind::Timeout), None)
            }
        };

        counters.request_finished(&result);
        (result, error)
    }
}

fn failure(index: usize, elapsed: Duration, mode: LatencyMode, kind: ErrorKind) -> BenchmarkResult {
    BenchmarkResult {
        index,
        success: false,
        latency_ms: elapsed.as_secs_f64() * 1000.0,
        prompt_tokens: 0,
        completion_tokens: 0,
        mode,
        error: Some(kind),
    }
}

fn wire_request(model: &str, sample: &BenchmarkRequest, index: usize) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![Message {
            role: "user".to_string(),
            // Per-request prefix keeps every request unique so server-side
            // prompt caches cannot skew the measurement.
            content: format!("[req-{}] {}", index, sample.prompt),
        }],
        max_tokens: Some(sample.max_tokens),
        temperature: Some(sample.temperature as f32),
        stream: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Completion;
    use crate::config::{EndpointConfig, LoadConfig, OutputConfig, OutputFormat};
    use crate::prompts::PromptPool;
    use async_trait::async_trait;

    struct MockClient {
        delay: Duration,
        /// Fail every k-th call (counting from the first) with an HTTP 500.
        fail_every: Option<usize>,
        /// Fail with a connection error from this call number onward.
        connection_fail_from: Option<usize>,
        calls: AtomicUsize,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl MockClient {
        fn ok(delay: Duration) -> Self {
            Self {
                delay,
                fail_every: None,
                connection_fail_from: None,
                calls: AtomicUsize::new(0),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for MockClient {
        async fn complete(
            &self,
            _request: ChatCompletionRequest,
            _mode: LatencyMode,
        ) -> Result<Completion, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.concurrent.fetch_sub(1, Ordering::SeqCst);

            if let Some(from) = self.connection_fail_from {
                if call >= from {
                    return Err(ClientError::Connection("refused".to_string()));
                }
            }
            if let Some(k) = self.fail_every {
                if call % k == 0 {
                    return Err(ClientError::Http {
                        status: 500,
                        message: "injected failure".to_string(),
                    });
                }
            }

            Ok(Completion {
                text: "ok".to_string(),
                prompt_tokens: 10,
                completion_tokens: 20,
                time_to_first_token: None,
            })
        }
    }

    fn config(samples: usize, concurrency: usize) -> BenchConfig {
        BenchConfig {
            endpoint: EndpointConfig {
                base_url: "http://mock".to_string(),
                model: Some("mock-model".to_string()),
                api_key: None,
                request_timeout: Duration::from_secs(5),
            },
            load: LoadConfig {
                samples,
                concurrency,
                stream: false,
                max_tokens: 64,
                temperature: 0.0,
                run_timeout: None,
            },
            output: OutputConfig {
                format: OutputFormat::Console,
                file: None,
                quiet: true,
            },
        }
    }

    fn runner(client: MockClient, samples: usize, concurrency: usize) -> BenchmarkRunner {
        BenchmarkRunner::new(
            Arc::new(client),
            config(samples, concurrency),
            PromptPool::fixed("ping", 64, 0.0),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sequential_run_preserves_index_order() {
        let runner = runner(MockClient::ok(Duration::ZERO), 5, 1);
        let outcome = runner.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.results.len(), 5);
        for (i, result) in outcome.results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert!(result.success);
            assert_eq!(result.completion_tokens, 20);
            assert_eq!(result.mode, LatencyMode::FullResponse);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failures_are_recorded_not_fatal() {
        let client = MockClient {
            fail_every: Some(3),
            ..MockClient::ok(Duration::ZERO)
        };
        let runner = runner(client, 10, 2);
        let outcome = runner.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.results.len(), 10);
        let failed = outcome.results.iter().filter(|r| !r.success).count();
        let succeeded = outcome.results.iter().filter(|r| r.success).count();
        // Calls 0, 3, 6, 9 fail: ceil(10 / 3).
        assert_eq!(failed, 4);
        assert_eq!(succeeded + failed, 10);
        for result in outcome.results.iter().filter(|r| !r.success) {
            assert_eq!(result.error, Some(ErrorKind::HttpError));
            assert_eq!(result.completion_tokens, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrency_ceiling_respected() {
        let client = Arc::new(MockClient::ok(Duration::from_millis(20)));
        let runner = BenchmarkRunner::new(
            client.clone(),
            config(12, 3),
            PromptPool::fixed("ping", 64, 0.0),
        );
        let counters = runner.counters();
        let outcome = runner.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.results.len(), 12);
        assert!(client.max_concurrent.load(Ordering::SeqCst) <= 3);
        assert!(counters.max_in_flight() <= 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connection_failure_on_first_request_is_fatal() {
        let client = MockClient {
            connection_fail_from: Some(0),
            ..MockClient::ok(Duration::ZERO)
        };
        let runner = runner(client, 5, 2);
        let result = runner.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connection_failure_mid_run_is_recorded() {
        let client = MockClient {
            connection_fail_from: Some(1),
            ..MockClient::ok(Duration::ZERO)
        };
        let runner = runner(client, 4, 1);
        let outcome = runner.run(CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.results.len(), 4);
        assert!(outcome.results[0].success);
        for result in &outcome.results[1..] {
            assert!(!result.success);
            assert_eq!(result.error, Some(ErrorKind::HttpError));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_samples_returns_empty_outcome() {
        let runner = runner(MockClient::ok(Duration::ZERO), 0, 4);
        let outcome = runner.run(CancellationToken::new()).await.unwrap();
        assert!(outcome.results.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancellation_returns_partial_results() {
        let runner = runner(MockClient::ok(Duration::from_millis(30)), 100, 2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = runner.run(cancel).await.unwrap();
        assert!(!outcome.results.is_empty());
        assert!(outcome.results.len() < 100);
        // Still ordered by index with no duplicates.
        for pair in outcome.results.windows(2) {
            assert!(pair[0].index < pair[1].index);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_timeout_cancels_dispatch() {
        let mut config = config(100, 2);
        config.load.run_timeout = Some(Duration::from_millis(80));
        let runner = BenchmarkRunner::new(
            Arc::new(MockClient::ok(Duration::from_millis(25))),
            config,
            PromptPool::fixed("ping", 64, 0.0),
        );

        let outcome = runner.run(CancellationToken::new()).await.unwrap();
        assert!(!outcome.results.is_empty());
        assert!(outcome.results.len() < 100);
    }
}
