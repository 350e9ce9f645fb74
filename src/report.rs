use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::benchmark::{BenchmarkResult, RunOutcome};
use crate::config::{BenchConfig, OutputConfig, OutputFormat};
use crate::cost::{CostProjection, RevenueProjection, UsageProfile};
use crate::stats::BenchmarkSummary;

/// Full benchmark report, serializable for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub version: String,
    pub configuration: TestConfiguration,
    pub summary: BenchmarkSummary,
    pub results: Vec<BenchmarkResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestConfiguration {
    pub endpoint: String,
    pub model: String,
    pub samples: usize,
    pub concurrency: usize,
    pub latency_mode: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub prompt_source: String,
    pub request_timeout_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<f64>,
}

pub struct ReportBuilder {
    timestamp: DateTime<Utc>,
    config: BenchConfig,
    prompt_source: String,
}

impl ReportBuilder {
    pub fn new(config: BenchConfig, prompt_source: String) -> Self {
        Self {
            timestamp: Utc::now(),
            config,
            prompt_source,
        }
    }

    pub fn build(&self, outcome: &RunOutcome, summary: BenchmarkSummary) -> BenchReport {
        let config = &self.config;
        let configuration = TestConfiguration {
            endpoint: config.endpoint.base_url.clone(),
            model: config
                .endpoint
                .model
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            samples: config.load.samples,
            concurrency: config.load.concurrency,
            latency_mode: if config.load.stream {
                "first_token".to_string()
            } else {
                "full_response".to_string()
            },
            max_tokens: config.load.max_tokens,
            temperature: config.load.temperature,
            prompt_source: self.prompt_source.clone(),
            request_timeout_secs: config.endpoint.request_timeout.as_secs_f64(),
            run_timeout_secs: config.load.run_timeout.map(|d| d.as_secs_f64()),
        };

        BenchReport {
            timestamp: self.timestamp,
            duration_secs: outcome.wall_clock.as_secs_f64(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            configuration,
            summary,
            results: outcome.results.clone(),
        }
    }
}

/// Writes the report per the output configuration: console lines, JSON to
/// stdout, or JSON to a file with a brief console summary.
pub fn emit_bench(report: &BenchReport, output: &OutputConfig) -> Result<()> {
    match output.format {
        OutputFormat::Console => print_bench_console(report),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)?;
            if let Some(path) = &output.file {
                std::fs::write(path, json)?;
                if !output.quiet {
                    print_bench_console(report);
                    let timestamp = now_stamp();
                    println!("{} Report written to {}", timestamp, path.display());
                }
            } else {
                println!("{}", json);
            }
        }
    }
    Ok(())
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

fn print_bench_console(report: &BenchReport) {
    let timestamp = now_stamp();
    let summary = &report.summary;

    println!();
    println!("{}", timestamp);
    println!("{} -----", timestamp);
    println!("{} Benchmark Complete", timestamp);
    println!("{} Duration: {:.1}s", timestamp, report.duration_secs);
    println!(
        "{} Requests: Sent: {} Ok: {} Err: {} Success: {:.2}%",
        timestamp,
        summary.total_requests,
        summary.successful_requests,
        summary.failed_requests,
        if summary.total_requests > 0 {
            100.0 * summary.successful_requests as f64 / summary.total_requests as f64
        } else {
            0.0
        }
    );

    let total_errors = summary.errors.timeout + summary.errors.http_error + summary.errors.parse_error;
    if total_errors > 0 {
        println!(
            "{} Errors: Timeout: {} Http: {} Parse: {}",
            timestamp, summary.errors.timeout, summary.errors.http_error, summary.errors.parse_error
        );
    }

    println!(
        "{} Tokens: Input: {} Output: {}",
        timestamp, summary.total_prompt_tokens, summary.total_output_tokens
    );
    println!(
        "{} Throughput: Requests/s: {:.2} Output tokens/s: {:.2}",
        timestamp, summary.requests_per_second, summary.output_tokens_per_second
    );
    println!(
        "{} Latency ({}, ms): mean: {:.1} min: {:.0} max: {:.0} stdev: {:.1}",
        timestamp,
        report.configuration.latency_mode,
        summary.latency.mean_ms,
        summary.latency.min_ms,
        summary.latency.max_ms,
        summary.latency.stdev_ms
    );
    println!(
        "{} Latency percentiles (ms): p50: {:.0} p95: {:.0} p99: {:.0}",
        timestamp, summary.latency.p50_ms, summary.latency.p95_ms, summary.latency.p99_ms
    );
    println!();
}

/// Cost projection report, serializable for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct CostReport<'a> {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub profile: &'a UsageProfile,
    pub projection: &'a CostProjection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<&'a RevenueProjection>,
}

pub fn emit_cost(report: &CostReport, format: OutputFormat, detailed: bool) -> Result<()> {
    match format {
        OutputFormat::Console => print_cost_console(report, detailed),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

const RULE: &str =
    "======================================================================";
const THIN_RULE: &str =
    "----------------------------------------------------------------------";

fn print_cost_console(report: &CostReport, detailed: bool) {
    let profile = report.profile;
    let projection = report.projection;

    println!();
    println!("{}", RULE);
    println!("  SERVERLESS DEPLOYMENT COST PROJECTION");
    println!("{}", RULE);
    println!();
    println!("Period: {} days", profile.days);
    println!(
        "GPUs: {} @ ${:.2}/hour each, {:.1} active hours/day",
        profile.num_gpus, profile.hourly_rate_per_gpu, profile.hours_per_day
    );
    println!(
        "Storage: {:.0} GB @ ${:.2}/GB/month",
        profile.storage_gb, profile.storage_rate_per_gb_month
    );
    println!();
    println!("Compute cost:  ${:.2}", projection.compute_cost);
    println!("Storage cost:  ${:.2}", projection.storage_cost);
    println!(
        "Total cost:    ${:.2}  (${:.2}/day)",
        projection.total_cost, projection.daily_average
    );

    if let (Some(budget), Some(within)) = (report.budget, projection.within_budget) {
        let verdict = if within {
            "within budget"
        } else {
            "OVER BUDGET"
        };
        println!("Budget:        ${:.2}  -> {}", budget, verdict);
    }

    if let Some(revenue) = report.revenue {
        println!();
        println!("{}", THIN_RULE);
        println!("  REVENUE PROJECTION");
        println!("{}", THIN_RULE);
        println!();
        println!("Requests:        {}", revenue.requests);
        println!("Gross revenue:   ${:.2}", revenue.gross_revenue);
        println!("Platform fee:    ${:.2}", revenue.platform_fee);
        println!("Net revenue:     ${:.2}", revenue.net_revenue);
        println!("Generation cost: ${:.2}", revenue.generation_cost);
        println!(
            "Profit:          ${:.2}  ({:.1}% margin)",
            revenue.profit, revenue.profit_margin_percent
        );
    }

    if detailed {
        println!();
        println!("{}", THIN_RULE);
        println!("  DETAILED BREAKDOWN");
        println!("{}", THIN_RULE);
        println!();
        println!(
            "Per-second compute: ${:.6}/second across {} GPUs",
            profile.rate_per_second(),
            profile.num_gpus
        );
        println!("Total active hours: {:.0}", profile.total_hours());
        if let Some(revenue) = report.revenue {
            println!(
                "Gross per request:  ${:.4}",
                revenue.gross_per_request
            );
            if revenue.requests > 0 {
                println!(
                    "Profit per request: ${:.4}",
                    revenue.profit / revenue.requests as f64
                );
            }
        }
    }

    println!();
    println!("{}", RULE);
}

/// Prints the canonical usage scenarios side by side for a given horizon and
/// rate card.
pub fn print_scenarios(base: &UsageProfile, budget: Option<f64>) -> Result<()> {
    use crate::cost::{self, RequestEconomics, RevenuePricing, SCENARIOS};

    println!();
    println!("{}", RULE);
    println!("  USAGE SCENARIOS ({} days)", base.days);
    println!("{}", RULE);

    let pricing = RevenuePricing::default();
    let economics = RequestEconomics::default();

    for scenario in SCENARIOS {
        let profile = UsageProfile {
            hours_per_day: scenario.hours_per_day,
            ..base.clone()
        };
        let projection = cost::project(&profile, budget)?;
        let requests =
            (scenario.requests_per_hour as f64 * profile.total_hours()).round() as u64;
        let revenue = cost::project_revenue(&profile, &pricing, &economics, requests);

        println!();
        println!("{}:", scenario.name);
        println!(
            "  Active hours: {:.1} hrs/day ({:.0} hrs total)",
            profile.hours_per_day,
            profile.total_hours()
        );
        println!("  Compute cost: ${:.2}", projection.compute_cost);
        println!("  Storage cost: ${:.2}", projection.storage_cost);
        println!(
            "  Total cost:   ${:.2} (${:.2}/day)",
            projection.total_cost, projection.daily_average
        );
        if let Some(within) = projection.within_budget {
            println!(
                "  Budget:       {}",
                if within { "within" } else { "over" }
            );
        }
        println!("  Requests:     {}", requests);
        println!(
            "  Profit:       ${:.2} ({:.1}% margin)",
            revenue.profit, revenue.profit_margin_percent
        );
    }

    println!();
    println!("{}", RULE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, LoadConfig, OutputConfig, OutputFormat};
    use crate::stats;
    use std::time::Duration;

    fn config() -> BenchConfig {
        BenchConfig {
            endpoint: EndpointConfig {
                base_url: "http://localhost:8080/v1".to_string(),
                model: Some("mixtral-8x22b".to_string()),
                api_key: None,
                request_timeout: Duration::from_secs(60),
            },
            load: LoadConfig {
                samples: 2,
                concurrency: 1,
                stream: true,
                max_tokens: 128,
                temperature: 0.7,
                run_timeout: None,
            },
            output: OutputConfig {
                format: OutputFormat::Json,
                file: None,
                quiet: true,
            },
        }
    }

    #[test]
    fn test_report_serializes_with_mode_and_results() {
        let outcome = RunOutcome {
            results: Vec::new(),
            wall_clock: Duration::from_secs(3),
        };
        let summary = stats::summarize(&outcome.results, outcome.wall_clock);
        let builder = ReportBuilder::new(config(), "fixed prompt".to_string());
        let report = builder.build(&outcome, summary);

        assert_eq!(report.configuration.latency_mode, "first_token");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["configuration"]["model"], "mixtral-8x22b");
        assert_eq!(json["summary"]["total_requests"], 0);
        assert!(json["results"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_cost_report_serializes() {
        let profile = UsageProfile {
            hours_per_day: 4.0,
            days: 30,
            num_gpus: 4,
            hourly_rate_per_gpu: 0.60,
            storage_gb: 200.0,
            storage_rate_per_gb_month: 0.20,
        };
        let projection = crate::cost::project(&profile, Some(500.0)).unwrap();
        let report = CostReport {
            timestamp: Utc::now(),
            version: "0.1.0".to_string(),
            profile: &profile,
            projection: &projection,
            budget: Some(500.0),
            revenue: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["projection"]["total_cost"], 328.0);
        assert_eq!(json["projection"]["within_budget"], true);
        assert!(json.get("revenue").is_none());
    }
}
