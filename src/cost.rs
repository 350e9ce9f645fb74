use serde::Serialize;
use thiserror::Error;

/// Default per-GPU hourly rate in dollars (H100 80GB class, serverless billing).
pub const DEFAULT_GPU_RATE_PER_HOUR: f64 = 0.60;
/// Default network volume rate in dollars per GB per month.
pub const DEFAULT_STORAGE_RATE_PER_GB_MONTH: f64 = 0.20;
/// Default network volume size in GB.
pub const DEFAULT_STORAGE_GB: f64 = 200.0;
/// Default GPU count per worker.
pub const DEFAULT_NUM_GPUS: u32 = 4;
/// Default active hours per day.
pub const DEFAULT_HOURS_PER_DAY: f64 = 4.0;
/// Default projection horizon in days.
pub const DEFAULT_DAYS: u32 = 30;

// Metered-API pricing defaults, dollars.
pub const DEFAULT_INPUT_PER_MTOK: f64 = 0.50;
pub const DEFAULT_OUTPUT_PER_MTOK: f64 = 1.30;
pub const DEFAULT_FEE_PER_REQUEST: f64 = 0.001;
pub const DEFAULT_PLATFORM_FEE_PERCENT: f64 = 5.5;

// Typical request shape used for per-request economics.
pub const DEFAULT_AVG_INPUT_TOKENS: u64 = 1000;
pub const DEFAULT_AVG_OUTPUT_TOKENS: u64 = 500;
pub const DEFAULT_AVG_GENERATION_SECONDS: f64 = 30.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidInput {
    #[error("{0} must be greater than zero (got {1})")]
    NotPositive(&'static str, f64),

    #[error("{0} must not be negative (got {1})")]
    Negative(&'static str, f64),
}

/// Expected usage of a serverless deployment over a projection horizon.
///
/// `hours_per_day` counts billed GPU-worker hours, so it may exceed 24 when
/// several workers run in parallel.
#[derive(Debug, Clone, Serialize)]
pub struct UsageProfile {
    pub hours_per_day: f64,
    pub days: u32,
    pub num_gpus: u32,
    pub hourly_rate_per_gpu: f64,
    pub storage_gb: f64,
    pub storage_rate_per_gb_month: f64,
}

impl UsageProfile {
    fn validate(&self) -> Result<(), InvalidInput> {
        if self.hours_per_day <= 0.0 {
            return Err(InvalidInput::NotPositive("hours_per_day", self.hours_per_day));
        }
        if self.days == 0 {
            return Err(InvalidInput::NotPositive("days", self.days as f64));
        }
        if self.num_gpus == 0 {
            return Err(InvalidInput::NotPositive("num_gpus", self.num_gpus as f64));
        }
        if self.hourly_rate_per_gpu < 0.0 {
            return Err(InvalidInput::Negative(
                "hourly_rate_per_gpu",
                self.hourly_rate_per_gpu,
            ));
        }
        if self.storage_gb < 0.0 {
            return Err(InvalidInput::Negative("storage_gb", self.storage_gb));
        }
        if self.storage_rate_per_gb_month < 0.0 {
            return Err(InvalidInput::Negative(
                "storage_rate_per_gb_month",
                self.storage_rate_per_gb_month,
            ));
        }
        Ok(())
    }

    /// Total billed GPU-worker hours over the horizon.
    pub fn total_hours(&self) -> f64 {
        self.hours_per_day * self.days as f64
    }

    /// Combined cost of one billed second across all GPUs.
    pub fn rate_per_second(&self) -> f64 {
        self.num_gpus as f64 * self.hourly_rate_per_gpu / 3600.0
    }
}

/// Projected spend derived from a [`UsageProfile`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostProjection {
    pub compute_cost: f64,
    pub storage_cost: f64,
    pub total_cost: f64,
    pub daily_average: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within_budget: Option<bool>,
}

/// Projects spend for `profile` over its horizon.
///
/// Compute spend is hours x GPUs x rate; storage is the monthly rate
/// pro-rated over the horizon. When `budget` is given, `within_budget`
/// reports whether total spend stays at or under it.
pub fn project(profile: &UsageProfile, budget: Option<f64>) -> Result<CostProjection, InvalidInput> {
    profile.validate()?;

    let compute_cost = profile.total_hours() * profile.num_gpus as f64 * profile.hourly_rate_per_gpu;
    let storage_cost =
        profile.storage_gb * profile.storage_rate_per_gb_month * profile.days as f64 / 30.0;
    let total_cost = compute_cost + storage_cost;

    Ok(CostProjection {
        compute_cost,
        storage_cost,
        total_cost,
        daily_average: total_cost / profile.days as f64,
        within_budget: budget.map(|b| total_cost <= b),
    })
}

/// Metered-API pricing applied to served traffic.
#[derive(Debug, Clone, Serialize)]
pub struct RevenuePricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
    pub per_request: f64,
    pub platform_fee_percent: f64,
}

impl Default for RevenuePricing {
    fn default() -> Self {
        Self {
            input_per_mtok: DEFAULT_INPUT_PER_MTOK,
            output_per_mtok: DEFAULT_OUTPUT_PER_MTOK,
            per_request: DEFAULT_FEE_PER_REQUEST,
            platform_fee_percent: DEFAULT_PLATFORM_FEE_PERCENT,
        }
    }
}

/// Shape of a typical request, used to estimate revenue and generation cost.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEconomics {
    pub avg_input_tokens: u64,
    pub avg_output_tokens: u64,
    pub avg_generation_seconds: f64,
}

impl Default for RequestEconomics {
    fn default() -> Self {
        Self {
            avg_input_tokens: DEFAULT_AVG_INPUT_TOKENS,
            avg_output_tokens: DEFAULT_AVG_OUTPUT_TOKENS,
            avg_generation_seconds: DEFAULT_AVG_GENERATION_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueProjection {
    pub requests: u64,
    pub gross_revenue: f64,
    pub platform_fee: f64,
    pub net_revenue: f64,
    pub generation_cost: f64,
    pub profit: f64,
    pub profit_margin_percent: f64,
    pub gross_per_request: f64,
}

/// Projects revenue and profit for `requests` served at `pricing`.
///
/// Generation cost bills only the seconds a request actively holds the GPUs,
/// which is the serverless billing model; idle time is covered by the compute
/// projection instead.
pub fn project_revenue(
    profile: &UsageProfile,
    pricing: &RevenuePricing,
    economics: &RequestEconomics,
    requests: u64,
) -> RevenueProjection {
    let input_revenue =
        economics.avg_input_tokens as f64 / 1_000_000.0 * pricing.input_per_mtok;
    let output_revenue =
        economics.avg_output_tokens as f64 / 1_000_000.0 * pricing.output_per_mtok;
    let gross_per_request = input_revenue + output_revenue + pricing.per_request;

    let gross_revenue = requests as f64 * gross_per_request;
    let platform_fee = gross_revenue * pricing.platform_fee_percent / 100.0;
    let net_revenue = gross_revenue - platform_fee;

    let generation_cost =
        requests as f64 * economics.avg_generation_seconds * profile.rate_per_second();

    let profit = net_revenue - generation_cost;
    let profit_margin_percent = if net_revenue > 0.0 {
        profit / net_revenue * 100.0
    } else {
        0.0
    };

    RevenueProjection {
        requests,
        gross_revenue,
        platform_fee,
        net_revenue,
        generation_cost,
        profit,
        profit_margin_percent,
        gross_per_request,
    }
}

/// A canonical usage pattern evaluated by the `--scenarios` report.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub hours_per_day: f64,
    pub requests_per_hour: u64,
}

pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "Light Usage",
        hours_per_day: 2.0,
        requests_per_hour: 10,
    },
    Scenario {
        name: "Moderate Usage",
        hours_per_day: 4.0,
        requests_per_hour: 20,
    },
    Scenario {
        name: "Heavy Usage",
        hours_per_day: 8.0,
        requests_per_hour: 30,
    },
    Scenario {
        name: "Always On (Dev)",
        hours_per_day: 24.0,
        requests_per_hour: 5,
    },
];
