use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Resolved configuration for one benchmark run. Assembled from CLI flags
/// (which override environment variables, which override built-in defaults)
/// and passed explicitly to the runner; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub endpoint: EndpointConfig,
    pub load: LoadConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    /// If not provided, auto-detected from the server's models endpoint.
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub samples: usize,
    pub concurrency: usize,
    /// Measure time to first token over a streaming response when set.
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Wall-clock ceiling for the whole run; unset means run to completion.
    pub run_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<PathBuf>,
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Console,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Console => write!(f, "console"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{}", name)
    }
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.base_url.is_empty() {
            anyhow::bail!("endpoint must not be empty");
        }

        if self.load.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }

        if self.load.max_tokens == 0 {
            anyhow::bail!("max-tokens must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.load.temperature) {
            anyhow::bail!(
                "temperature must be between 0.0 and 2.0 (got {})",
                self.load.temperature
            );
        }

        if self.endpoint.request_timeout.is_zero() {
            anyhow::bail!("request-timeout must be greater than 0");
        }

        Ok(())
    }

    /// True when the JSON report goes to stdout and must not be interleaved
    /// with progress output.
    pub fn json_to_stdout(&self) -> bool {
        self.output.format == OutputFormat::Json && self.output.file.is_none()
    }
}
