use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use podmeter::benchmark::BenchmarkRunner;
use podmeter::cli::BenchArgs;
use podmeter::client::{self, ClientConfig, ClientError, OpenAIClient};
use podmeter::config::BenchConfig;
use podmeter::prompts::PromptPool;
use podmeter::report::{self, ReportBuilder};
use podmeter::{logging, stats};

/// Interval between progress windows on the console.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    // Parse CLI arguments (flags > environment > defaults)
    let args = BenchArgs::parse_args();

    logging::init(args.log_level.to_level_filter(), args.trace_log.as_deref())?;

    let config = args.to_config()?;

    // Print clean startup message
    if !config.output.quiet && !config.json_to_stdout() {
        println!("podmeter-bench");
        println!("   Target: {}", config.endpoint.base_url);
        println!(
            "   Requests: {} ({} in flight)",
            config.load.samples, config.load.concurrency
        );
        println!(
            "   Latency mode: {}",
            if config.load.stream {
                "time to first token"
            } else {
                "full response"
            }
        );
        println!();
    }

    let pool = if let Some(text) = &args.prompt {
        PromptPool::fixed(text.clone(), args.max_tokens, args.temperature)
    } else {
        PromptPool::builtin(args.prompt_set, args.shuffle, args.max_tokens, args.temperature)
    };

    // Build custom tokio runtime with specified worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.worker_threads.unwrap_or_else(num_cpus::get))
        .enable_all()
        .build()?;

    runtime.block_on(async { run_benchmark(config, pool).await })
}

async fn run_benchmark(mut config: BenchConfig, pool: PromptPool) -> Result<()> {
    // Resolve the model from the server when not specified. A connection
    // failure here already means the endpoint is unreachable.
    if config.endpoint.model.is_none() {
        info!("Model not specified, querying server for available models");
        let detected = client::detect_model(
            &config.endpoint.base_url,
            config.endpoint.api_key.as_deref(),
            config.endpoint.request_timeout,
        )
        .await
        .map_err(|e| match e {
            ClientError::Connection(message) => {
                anyhow::anyhow!("endpoint unreachable: {}", message)
            }
            other => anyhow::anyhow!("model detection failed: {}", other),
        })?;
        config.endpoint.model = Some(detected);
    }

    let client = OpenAIClient::new(ClientConfig {
        base_url: config.endpoint.base_url.clone(),
        api_key: config.endpoint.api_key.clone(),
        timeout: config.endpoint.request_timeout,
        pool_size: config.load.concurrency, // Pool size matches concurrency
    })?;

    let prompt_source = pool.describe();
    let runner = BenchmarkRunner::new(Arc::new(client), config.clone(), pool);

    // Ctrl-C stops new dispatches; in-flight requests finish on their own.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, finishing in-flight requests");
                cancel.cancel();
            }
        });
    }

    // Periodic progress windows, unless output would be interleaved with a
    // JSON report on stdout.
    let progress_stop = CancellationToken::new();
    let progress_handle = if !config.output.quiet && !config.json_to_stdout() {
        Some(tokio::spawn(stats::progress_loop(
            runner.counters(),
            PROGRESS_INTERVAL,
            progress_stop.clone(),
        )))
    } else {
        None
    };

    debug!("Starting benchmark run");
    let builder = ReportBuilder::new(config.clone(), prompt_source);
    let outcome = runner.run(cancel).await?;

    progress_stop.cancel();
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let summary = stats::summarize(&outcome.results, outcome.wall_clock);
    let report = builder.build(&outcome, summary);
    report::emit_bench(&report, &config.output)?;

    info!("Benchmark completed successfully");
    Ok(())
}
