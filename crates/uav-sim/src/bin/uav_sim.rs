//! UAV Sim - Run a deconfliction scenario and report the outcome.
//!
//! Usage:
//!   cargo run -p uav-sim -- --scenario sample --duration 300
//!   cargo run -p uav-sim -- --scenario random --uavs 12 --seed 7 --real-time

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uav_sim::scenarios::{
    create_converging_scenario, create_crossing_scenario, create_head_on_scenario,
    create_parallel_scenario, create_priority_scenario, create_random_scenario,
    create_sample_scenario,
};
use uav_sim::{Config, Scenario, Simulation};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioChoice {
    /// Three mixed UAVs around a central no-fly zone
    Sample,
    /// Two UAVs flying straight at each other
    HeadOn,
    /// Two UAVs crossing at the origin
    Crossing,
    /// Two UAVs on parallel tracks (no conflict)
    Parallel,
    /// Emergency responder against a training flight
    Priority,
    /// Four UAVs converging on the origin
    Converging,
    /// Seeded random fleet
    Random,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "UAV fleet deconfliction simulator")]
struct Args {
    /// Scenario to run
    #[arg(long, value_enum, default_value = "sample")]
    scenario: ScenarioChoice,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 300.0)]
    duration: f64,

    /// Override the tick length in seconds
    #[arg(long)]
    time_step: Option<f64>,

    /// Seed for weather randomness and the random scenario
    #[arg(long)]
    seed: Option<u64>,

    /// UAV count for the random scenario
    #[arg(long, default_value_t = 10)]
    uavs: usize,

    /// Sleep one time step between ticks
    #[arg(long)]
    real_time: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write results, events and final UAV states here
    #[arg(long)]
    export: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("uav_sim=info".parse()?)
        .add_directive("uav_core=info".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    }
    .with_env();

    if let Some(time_step) = args.time_step {
        config.simulation.time_step = time_step;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(path) = &args.export {
        config.export_path = Some(path.clone());
    }
    Ok(config)
}

fn scenario(args: &Args, config: &Config) -> Scenario {
    match args.scenario {
        ScenarioChoice::Sample => create_sample_scenario(),
        ScenarioChoice::HeadOn => create_head_on_scenario(),
        ScenarioChoice::Crossing => create_crossing_scenario(),
        ScenarioChoice::Parallel => create_parallel_scenario(),
        ScenarioChoice::Priority => create_priority_scenario(),
        ScenarioChoice::Converging => create_converging_scenario(),
        ScenarioChoice::Random => {
            let (min_x, max_x, min_y, max_y) = config.simulation.area_bounds;
            let extent = (max_x - min_x).min(max_y - min_y) / 4.0;
            create_random_scenario(args.uavs, extent, config.seed())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs)?;

    let config = load_config(&args)?;
    if let Err(err) = config.validate() {
        tracing::error!("Invalid configuration: {}", err);
        return Err(err.into());
    }

    tracing::info!(
        "Starting UAV Sim (scenario {:?}, seed {})",
        args.scenario,
        config.seed()
    );
    let export_path = config.export_path.clone();
    let scenario = scenario(&args, &config);
    let mut sim = Simulation::new(config)?;
    scenario.load_into(&mut sim);

    let results = if args.real_time {
        tokio::select! {
            results = sim.run_paced(args.duration) => Some(results),
            _ = tokio::signal::ctrl_c() => None,
        }
    } else {
        Some(sim.run(args.duration))
    };
    let results = match results {
        Some(results) => results,
        None => {
            sim.stop();
            sim.results()
        }
    };

    println!("{sim}");
    println!("{}", sim.fleet().conflict_summary());
    println!(
        "{}",
        serde_json::to_string_pretty(&results).context("serializing results")?
    );

    if let Some(path) = export_path {
        sim.export_results(&path)
            .with_context(|| format!("exporting results to {}", path.display()))?;
    }
    Ok(())
}
