//! PetLife CLI
//!
//! Drives the shared pet from a terminal.
//!
//! # Usage
//! ```bash
//! petlife [--config petlife.toml] [--device laptop] [--verbose] status --json
//! petlife interact play
//! petlife catch-up --hours 8
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use petlife_core::{EngineConfig, Outcome, SimulationManager, SimulationState};
use tracing_subscriber::EnvFilter;

/// PetLife - one virtual pet shared by every device
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (default: environment and built-in defaults)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Label identifying this device in logs and history
    #[arg(short, long, default_value = "cli")]
    device: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Pet(PetCommand),

    /// Print the effective configuration as TOML
    Config,
}

/// Subcommands that operate on the shared pet
#[derive(Subcommand)]
enum PetCommand {
    /// Show the pet, with elapsed time applied
    Status {
        /// Output as JSON for integrations
        #[arg(long)]
        json: bool,
    },

    /// Perform an action (feed, greet, play)
    Interact {
        /// Action name
        action: String,
    },

    /// Shorthand for `interact feed`
    Feed,

    /// Compensate hours of absence in one step
    CatchUp {
        /// Hours to simulate (1..=720 with the default clock)
        #[arg(long, allow_negative_numbers = true)]
        hours: i64,
    },

    /// Reset the shared pet to its defaults
    Reset,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => EngineConfig::from_env().context("Reading PETLIFE_* environment")?,
    };
    tracing::debug!(identity = %config.identity, flush_policy = ?config.flush_policy, "Configuration loaded");

    match cli.command {
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
        Commands::Pet(command) => run(config, &cli.device, command)?,
    }
    Ok(())
}

fn run(config: EngineConfig, device: &str, command: PetCommand) -> anyhow::Result<()> {
    let manager = SimulationManager::from_config(config)?;
    let pet = manager.get()?;

    match command {
        PetCommand::Status { json } => {
            let outcome = pet.status(device)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.state)?);
            } else {
                print_state(&outcome.state);
            }
            warn_if_unsaved(&outcome);
        }
        PetCommand::Interact { action } => report(pet.interact(device, &action)?),
        PetCommand::Feed => report(pet.interact(device, "feed")?),
        PetCommand::CatchUp { hours } => report(pet.catch_up(device, hours)?),
        PetCommand::Reset => report(pet.reset(device)?),
    }

    drop(pet);
    if let Some(warning) = manager.shutdown() {
        eprintln!("Warning: {warning}");
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    // Logs go to stderr so `status --json` stays machine-readable
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn report(outcome: Outcome) {
    print_state(&outcome.state);
    warn_if_unsaved(&outcome);
}

fn warn_if_unsaved(outcome: &Outcome) {
    if let Some(warning) = &outcome.persistence {
        eprintln!("Warning: {warning}");
    }
}

fn print_state(state: &SimulationState) {
    println!("{} ({})", state.pet_name, state.identity);
    println!("  energy  {:>5.1}", state.energy);
    println!("  hunger  {:>5.1}", state.hunger);
    println!("  mood    {:>5.1}", state.mood);
    println!("  updated {}", state.last_updated.to_rfc3339());
}
