pub mod benchmark;
pub mod cli;
pub mod client;
pub mod config;
pub mod cost;
pub mod logging;
pub mod prompts;
pub mod report;
pub mod stats;

pub use benchmark::{BenchmarkResult, BenchmarkRunner, ConnectivityError, RunOutcome};
pub use cli::{BenchArgs, CostArgs};
pub use client::{
    ChatCompletionRequest, ChatCompletionResponse, ClientConfig, CompletionClient, LatencyMode,
    OpenAIClient,
};
pub use config::BenchConfig;
pub use cost::{CostProjection, UsageProfile};
pub use report::{BenchReport, ReportBuilder};
pub use stats::BenchmarkSummary;
