use chrono::{DateTime, Utc};
use clap::Args;
use coinroom_core::{Config, Scenario, SessionSettings, UserId, MAX_SCENARIO_SECS};
use serde::Serialize;

#[derive(Args)]
pub struct SimulateArgs {
    #[arg(long)]
    user: UserId,
    /// Ledger balance at sign-in
    #[arg(long, default_value_t = 0)]
    balance: i64,
    /// Session length in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(..=MAX_SCENARIO_SECS))]
    duration: u64,
    /// Offsets (seconds) of interactions, comma-separated
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = clap::value_parser!(u64).range(..=MAX_SCENARIO_SECS)
    )]
    activity: Vec<u64>,
    /// 1-based tick numbers whose grant fails, comma-separated
    #[arg(long, value_delimiter = ',')]
    fail_ticks: Vec<u64>,
    /// Grant round-trip time in seconds
    #[arg(
        long,
        default_value_t = 0,
        value_parser = clap::value_parser!(u64).range(..=MAX_SCENARIO_SECS)
    )]
    latency: u64,
    /// Wall-clock start of the replay (RFC 3339), defaults to now
    #[arg(long)]
    origin: Option<DateTime<Utc>>,
    /// Use timing from the config file instead of built-in defaults
    #[arg(long)]
    use_config: bool,
    /// Print only the summary
    #[arg(long)]
    quiet: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    user_id: &'a UserId,
    displayed_balance: u64,
    ledger_balance: i64,
    time_active_minutes: u64,
    events: usize,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = if args.use_config {
        SessionSettings::from(&Config::load()?)
    } else {
        SessionSettings::default()
    };
    settings.validate()?;

    let mut scenario = Scenario::new(args.user, args.balance, args.duration);
    scenario.activity_at = args.activity;
    scenario.fail_ticks = args.fail_ticks;
    scenario.latency_secs = args.latency;
    scenario.settings = settings;

    let report = scenario.run(args.origin.unwrap_or_else(Utc::now))?;

    if !args.quiet {
        for event in &report.events {
            println!("{}", serde_json::to_string(event)?);
        }
    }
    let summary = Summary {
        user_id: &scenario.user_id,
        displayed_balance: report.displayed_balance,
        ledger_balance: report.ledger_balance,
        time_active_minutes: report.time_active_minutes,
        events: report.events.len(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
