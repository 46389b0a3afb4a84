//! Headless Tilestorm runner.
//!
//! Runs scripted scenarios without graphics or input. Summaries go to
//! stdout as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in duel against the bundled data
//! cargo run -p tilestorm_headless -- run
//!
//! # Run a scenario file with a replica, recording a replay
//! cargo run -p tilestorm_headless -- run --scenario duel.ron --replica --record duel.replay
//!
//! # Verify a replay
//! cargo run -p tilestorm_headless -- replay --input duel.replay
//!
//! # Check a game data file
//! cargo run -p tilestorm_headless -- validate --data assets/data/game.ron
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tilestorm_core::data::GameData;
use tilestorm_core::replay::{Replay, ReplayPlayer};
use tilestorm_headless::{run_scenario, RunOptions, Scenario, ScenarioError};

#[derive(Parser)]
#[command(name = "tilestorm")]
#[command(about = "Headless Tilestorm runner for determinism checks and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print a JSON summary
    Run {
        /// Scenario file to load (the built-in duel if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Game data file
        #[arg(short, long, default_value = "assets/data/game.ron")]
        data: PathBuf,

        /// Override the scenario's tick count
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Mirror the host on a replica and check every tick
        #[arg(long)]
        replica: bool,

        /// Save a replay of the run
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Play a replay back and verify its final hash
    Replay {
        /// Replay file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Parse and link a game data file
    Validate {
        /// Game data file
        #[arg(short, long, default_value = "assets/data/game.ron")]
        data: PathBuf,
    },
}

#[derive(Serialize)]
struct ReplayReport {
    seed: u64,
    frames: usize,
    events: usize,
    final_tick: u64,
    expected_hash: u64,
    actual_hash: u64,
    verified: bool,
}

#[derive(Serialize)]
struct DataReport {
    bullets: usize,
    weapons: usize,
    ammo: usize,
    particles: usize,
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr (stdout is for JSON)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            data,
            ticks,
            replica,
            record,
        } => cmd_run(scenario, &data, &RunOptions {
            ticks,
            replica,
            record,
        }),
        Commands::Replay { input } => cmd_replay(&input),
        Commands::Validate { data } => cmd_validate(&data),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ScenarioError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a scenario; fails if the replica diverged.
fn cmd_run(
    scenario: Option<PathBuf>,
    data: &Path,
    options: &RunOptions,
) -> Result<bool, ScenarioError> {
    let scenario = match &scenario {
        Some(path) => {
            tracing::info!("Loading scenario: {}", path.display());
            Scenario::load(path)?
        }
        None => Scenario::duel(),
    };
    let data = GameData::load(data)?;

    let summary = run_scenario(&scenario, data, options)?;
    print_json(&summary)?;

    if !summary.converged() {
        eprintln!("FAIL: replica diverged from the host");
    }
    Ok(summary.converged())
}

/// Replay a recorded game and check it ends where the host did.
fn cmd_replay(input: &Path) -> Result<bool, ScenarioError> {
    tracing::info!("Verifying replay: {}", input.display());

    let replay = Replay::load(input)?;
    let mut report = ReplayReport {
        seed: replay.seed,
        frames: replay.frames.len(),
        events: replay.event_count(),
        final_tick: replay.final_tick,
        expected_hash: replay.final_hash,
        actual_hash: 0,
        verified: false,
    };

    let mut player = ReplayPlayer::new(replay)?;
    report.verified = player.verify()?;
    report.actual_hash = player.session().state_hash();
    print_json(&report)?;

    if report.verified {
        eprintln!("PASS: Replay verification successful");
    } else {
        eprintln!("FAIL: Replay produced different hash!");
    }
    Ok(report.verified)
}

/// Load and link a data file.
fn cmd_validate(data: &Path) -> Result<bool, ScenarioError> {
    tracing::info!("Validating game data: {}", data.display());

    let data = GameData::load(data)?;
    print_json(&DataReport {
        bullets: data.bullets.len(),
        weapons: data.weapons.len(),
        ammo: data.ammo.len(),
        particles: data.particles.len(),
    })?;
    Ok(true)
}
