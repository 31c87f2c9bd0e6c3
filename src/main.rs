//
// Uses
//

use clap::{Parser, ValueEnum};

extern crate tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smart_ptr::scenario::{self, ScenarioReport};

//
// Implementation
//

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    All,
    Shared,
    Unique,
    Reset,
    Stress,
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Walks unique and shared SmartPtr handles through copy, move and reset, printing reference counts and releases at each step"
)]
struct Args {
    /// Which walk to run
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Upper bound on live handles during the stress walk
    #[arg(long, value_name = "NUM", default_value_t = 8)]
    copies: usize,

    /// Seed for the stress walk
    #[arg(long, value_name = "NUM", default_value_t = 0)]
    seed: u64,

    /// Print reports as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn collect_reports(args: &Args) -> Vec<ScenarioReport> {
    let mut reports = Vec::new();
    let wants = |s: Scenario| args.scenario == Scenario::All || args.scenario == s;
    if wants(Scenario::Shared) {
        reports.push(scenario::run_shared());
    }
    if wants(Scenario::Unique) {
        reports.push(scenario::run_unique());
    }
    if wants(Scenario::Reset) {
        reports.push(scenario::run_reset());
    }
    if wants(Scenario::Stress) {
        reports.push(scenario::run_stress(args.copies, args.seed));
    }
    reports
}

fn print_text(report: &ScenarioReport) {
    println!("== {} ({})", report.name, report.kind);
    for step in &report.steps {
        match step.count {
            Some(c) => println!(
                "  {:<40} count={:<3} live={:<3} released={}",
                step.action, c, step.live_handles, step.released
            ),
            None => println!(
                "  {:<40} live={:<3} released={}",
                step.action, step.live_handles, step.released
            ),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    tracing::debug!(?args, "parsed arguments");

    let reports = collect_reports(&args);
    for report in &reports {
        if !report.invariant_held() {
            tracing::error!(scenario = %report.name, "count did not match live handles");
        } else {
            tracing::info!(scenario = %report.name, steps = report.steps.len(), "done");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        reports.iter().for_each(print_text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Scenario::All, 4)]
    #[test_case(Scenario::Shared, 1)]
    #[test_case(Scenario::Stress, 1)]
    fn collects_requested_reports(which: Scenario, expected: usize) {
        let args = Args::parse_from(["smart_ptr_demo", "--scenario", "all", "--copies", "3"]);
        let args = Args { scenario: which, ..args };
        assert_eq!(collect_reports(&args).len(), expected);
    }

    #[test]
    fn parses_defaults() {
        let args = Args::parse_from(["smart_ptr_demo"]);
        assert_eq!(args.scenario, Scenario::All);
        assert_eq!(args.copies, 8);
        assert!(!args.json);
    }
}
