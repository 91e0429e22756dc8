//! Weir CLI
//!
//! Inspect an emission schedule and replay reward scenarios.

mod scenario;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weir_economics::{EconomicsConfig, EmissionSchedule, LoggingConfig};

use crate::scenario::{Scenario, Simulation};

#[derive(Parser)]
#[command(name = "weir")]
#[command(version)]
#[command(about = "Weir - token emission and weighted reward distribution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "WEIR_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the per-cycle emission table
    Schedule {
        /// Number of cycles to show
        #[arg(short = 'n', long, default_value = "8")]
        cycles: u64,
    },

    /// Show the cycle and cumulative unlocked amount at each timestamp
    Available {
        /// Unix timestamps; defaults to now
        timestamps: Vec<i64>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Replay a scenario file and print the final balances as JSON
    Simulate {
        /// Scenario file path
        scenario: PathBuf,
    },
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn format_time(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EconomicsConfig::load(path)?,
        None => EconomicsConfig::default(),
    };
    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Schedule { cycles } => {
            let schedule = EmissionSchedule::from_config(&config.schedule)?;

            println!("Genesis:            {}", format_time(schedule.genesis_time()));
            println!("Cycle duration:     {}s", schedule.cycle_duration());
            println!("Lifetime allocation: {}", config.lifetime_allocation());
            println!("Total emission:     {}", schedule.total_emission());
            println!();
            println!("{:>5}  {:<25}  {:>30}  {:>24}", "cycle", "start", "budget", "rate/s");
            for n in 1..=cycles {
                println!(
                    "{:>5}  {:<25}  {:>30}  {:>24}",
                    n,
                    format_time(schedule.start_of_cycle(n)?),
                    schedule.tokens_for_cycle(n),
                    schedule.reward_rate(n),
                );
            }
        }

        Commands::Available { timestamps } => {
            let schedule = EmissionSchedule::from_config(&config.schedule)?;
            let lifetime = config.lifetime_allocation();
            let timestamps = if timestamps.is_empty() {
                vec![chrono::Utc::now().timestamp()]
            } else {
                timestamps
            };

            for t in timestamps {
                let available = schedule.available_rewards(t);
                println!(
                    "{} cycle={} unlocked={} releasable_cap={}",
                    format_time(t),
                    schedule.cycle_index(t),
                    available,
                    available.min(lifetime),
                );
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }

        Commands::Simulate { scenario } => {
            let scenario = Scenario::load(&scenario)?;
            tracing::info!(steps = scenario.steps.len(), "replaying scenario");

            let mut simulation = Simulation::new(scenario.economics, &scenario.stakers)?;
            simulation.run(&scenario.steps)?;
            println!("{}", serde_json::to_string_pretty(&simulation.report()?)?);
        }
    }

    Ok(())
}
