use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    BenchConfig, EndpointConfig, LoadConfig, LogLevel, OutputConfig, OutputFormat,
};
use crate::cost::{self, UsageProfile};
use crate::prompts::PromptSet;

/// Flags override environment variables, which override the built-in
/// defaults shown here.
#[derive(Parser, Debug)]
#[command(name = "podmeter-cost")]
#[command(author, version, about = "Project GPU and storage spend for a serverless LLM deployment", long_about = None)]
pub struct CostArgs {
    /// Projection horizon in days
    #[arg(long, default_value_t = cost::DEFAULT_DAYS)]
    pub days: u32,

    /// Billed GPU-worker hours per day; may exceed 24 when several workers
    /// run in parallel
    #[arg(long = "hours-per-day", default_value_t = cost::DEFAULT_HOURS_PER_DAY)]
    pub hours_per_day: f64,

    /// Number of GPUs billed while a worker is active
    #[arg(long = "gpus", default_value_t = cost::DEFAULT_NUM_GPUS)]
    pub num_gpus: u32,

    /// Hourly rate per GPU in dollars
    #[arg(long = "gpu-rate", env = "PODMETER_GPU_RATE", default_value_t = cost::DEFAULT_GPU_RATE_PER_HOUR)]
    pub gpu_rate: f64,

    /// Network volume size in GB
    #[arg(long = "storage-gb", default_value_t = cost::DEFAULT_STORAGE_GB)]
    pub storage_gb: f64,

    /// Monthly storage rate per GB in dollars
    #[arg(long = "storage-rate", env = "PODMETER_STORAGE_RATE", default_value_t = cost::DEFAULT_STORAGE_RATE_PER_GB_MONTH)]
    pub storage_rate: f64,

    /// Budget ceiling; the projection reports whether total spend stays
    /// within it
    #[arg(long)]
    pub budget: Option<f64>,

    /// Sustained request volume; enables the revenue projection
    #[arg(long = "requests-per-hour")]
    pub requests_per_hour: Option<u64>,

    /// Include per-second and per-request economics
    #[arg(long)]
    pub detailed: bool,

    /// Evaluate the canonical usage scenarios instead of a single projection
    #[arg(long)]
    pub scenarios: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    #[arg(long = "log-level", env = "PODMETER_LOG", value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

impl CostArgs {
    pub fn parse_args() -> Self {
        CostArgs::parse()
    }

    pub fn profile(&self) -> UsageProfile {
        UsageProfile {
            hours_per_day: self.hours_per_day,
            days: self.days,
            num_gpus: self.num_gpus,
            hourly_rate_per_gpu: self.gpu_rate,
            storage_gb: self.storage_gb,
            storage_rate_per_gb_month: self.storage_rate,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "podmeter-bench")]
#[command(author, version, about = "Benchmark an OpenAI-compatible LLM inference endpoint", long_about = None)]
pub struct BenchArgs {
    /// Base URL of the endpoint, e.g. https://api.runpod.ai/v2/<id>/openai/v1
    #[arg(long, env = "PODMETER_ENDPOINT")]
    pub endpoint: String,

    /// API key sent as a bearer token
    #[arg(long = "api-key", env = "PODMETER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name; auto-detected from the server when omitted
    #[arg(long, env = "PODMETER_MODEL")]
    pub model: Option<String>,

    /// Number of requests to issue
    #[arg(long, default_value_t = 10)]
    pub samples: usize,

    /// Maximum number of in-flight requests
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Measure time to first token over a streaming response instead of
    /// full completion time
    #[arg(long)]
    pub stream: bool,

    /// Fixed prompt text; overrides --prompt-set
    #[arg(long)]
    pub prompt: Option<String>,

    /// Built-in prompt pool to rotate through
    #[arg(long = "prompt-set", value_enum, default_value_t = PromptSet::Mixed)]
    pub prompt_set: PromptSet,

    /// Shuffle the prompt pool before the run
    #[arg(long)]
    pub shuffle: bool,

    #[arg(long = "max-tokens", default_value_t = 512)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,

    /// Per-request timeout (e.g. "60s", "2m")
    #[arg(long = "request-timeout", value_parser = humantime::parse_duration, default_value = "60s")]
    pub request_timeout: Duration,

    /// Wall-clock ceiling for the whole run (e.g. "10m")
    #[arg(long = "run-timeout", value_parser = humantime::parse_duration)]
    pub run_timeout: Option<Duration>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Write the JSON report to this file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Suppress progress output
    #[arg(long)]
    pub quiet: bool,

    /// Tokio worker threads; defaults to the number of CPUs
    #[arg(long = "worker-threads")]
    pub worker_threads: Option<usize>,

    #[arg(long = "log-level", env = "PODMETER_LOG", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Rotating trace log file for debug output
    #[arg(long = "trace-log")]
    pub trace_log: Option<PathBuf>,
}

impl BenchArgs {
    pub fn parse_args() -> Self {
        BenchArgs::parse()
    }

    /// Assembles and validates the run configuration.
    pub fn to_config(&self) -> anyhow::Result<BenchConfig> {
        let config = BenchConfig {
            endpoint: EndpointConfig {
                base_url: self.endpoint.trim_end_matches('/').to_string(),
                model: self.model.clone(),
                api_key: self.api_key.clone(),
                request_timeout: self.request_timeout,
            },
            load: LoadConfig {
                samples: self.samples,
                concurrency: self.concurrency,
                stream: self.stream,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                run_timeout: self.run_timeout,
            },
            output: OutputConfig {
                format: self.format,
                file: self.output.clone(),
                quiet: self.quiet,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
