use anyhow::Result;
use chrono::Utc;

use podmeter::cli::CostArgs;
use podmeter::cost::{self, RequestEconomics, RevenuePricing};
use podmeter::logging;
use podmeter::report::{self, CostReport};

fn main() -> Result<()> {
    // Parse CLI arguments (flags > environment > defaults)
    let args = CostArgs::parse_args();

    logging::init(args.log_level.to_level_filter(), None)?;

    let profile = args.profile();

    if args.scenarios {
        // Validate the rate card once before evaluating the scenario grid.
        cost::project(&profile, args.budget)?;
        return report::print_scenarios(&profile, args.budget);
    }

    let projection = cost::project(&profile, args.budget)?;

    let revenue = args.requests_per_hour.map(|per_hour| {
        let requests = (per_hour as f64 * profile.total_hours()).round() as u64;
        cost::project_revenue(
            &profile,
            &RevenuePricing::default(),
            &RequestEconomics::default(),
            requests,
        )
    });

    let cost_report = CostReport {
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        profile: &profile,
        projection: &projection,
        budget: args.budget,
        revenue: revenue.as_ref(),
    };

    report::emit_cost(&cost_report, args.format, args.detailed)
}
