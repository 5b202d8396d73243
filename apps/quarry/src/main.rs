//! # Quarry
//!
//! Command-line host for the mark tracker.
//!
//! ```text
//! quarry init
//! quarry apply --caster ranger --target g1 --target g2
//! quarry unleash --caster ranger --target g1 --aspect detonation
//! quarry rest --caster ranger
//! ```

use clap::{Parser, Subcommand};
use quarry::cli::{
    Session, SessionPaths, cmd_apply, cmd_bonus, cmd_init, cmd_remove, cmd_rest, cmd_status,
    cmd_unleash, cmd_vitality, flush_failures,
};
use quarry::error::CliError;
use quarry_core::Aspect;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry", version, about = "Track and unleash hunter's marks")]
struct Cli {
    /// Database file
    #[arg(long, global = true, default_value = "quarry.redb")]
    db: PathBuf,

    /// Scene file (JSON)
    #[arg(long, global = true, default_value = "scene.json")]
    scene: PathBuf,

    /// Settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for the dice
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Mark one or more targets
    Apply {
        #[arg(long)]
        caster: String,
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
    },
    /// Consume a mark
    Unleash {
        #[arg(long)]
        caster: String,
        #[arg(long)]
        target: String,
        #[arg(long)]
        aspect: Aspect,
    },
    /// Remove a mark without effect
    Remove {
        #[arg(long)]
        caster: String,
        #[arg(long)]
        target: String,
    },
    /// Recover: resets uses and clears the caster's marks
    Rest {
        #[arg(long)]
        caster: String,
        /// Short recovery (no effect on marks)
        #[arg(long)]
        short: bool,
    },
    /// Report a target's new vitality
    Vitality {
        #[arg(long)]
        target: String,
        #[arg(long, allow_hyphen_values = true)]
        value: i64,
    },
    /// Roll mark bonus damage on a hit
    Bonus {
        #[arg(long)]
        caster: String,
        #[arg(long)]
        target: String,
    },
    /// Show a caster's allowance and marks
    Status {
        #[arg(long)]
        caster: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    // stderr keeps stdout clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Init { force } = cli.command {
        return cmd_init(&cli.db, force);
    }

    let paths = SessionPaths {
        db: cli.db,
        scene: cli.scene,
        config: cli.config,
        seed: cli.seed,
    };
    let session = Session::open(&paths)?;
    let json = cli.json;

    let result = match &cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Apply { caster, targets } => cmd_apply(&session, caster, targets, json).map(drop),
        Commands::Unleash {
            caster,
            target,
            aspect,
        } => cmd_unleash(&session, caster, target, *aspect, json).map(drop),
        Commands::Remove { caster, target } => cmd_remove(&session, caster, target, json),
        Commands::Rest { caster, short } => cmd_rest(&session, caster, *short, json),
        Commands::Vitality { target, value } => cmd_vitality(&session, target, *value, json),
        Commands::Bonus { caster, target } => cmd_bonus(&session, caster, target, json).map(drop),
        Commands::Status { caster } => cmd_status(&session, caster, json).map(drop),
    };

    if result.is_err() {
        flush_failures(&session, json);
    }
    result
}

fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
