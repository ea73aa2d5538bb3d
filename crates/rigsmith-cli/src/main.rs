//! Rigsmith CLI - build character rigs from markers
//!
//! This binary prints default marker layouts, validates rig configs and
//! builds rigs into JSON reports.

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use rigsmith_cli::commands;

/// Rigsmith - Marker-driven character rig builder
#[derive(Parser)]
#[command(name = "rigsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default marker layout as JSON
    Markers {
        /// Body kind (full, half)
        #[arg(short, long, default_value = "full", value_parser = ["full", "half"])]
        body: String,

        /// Spine kind (plain, spline)
        #[arg(short, long, default_value = "plain", value_parser = ["plain", "spline"])]
        spine: String,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate a rig config file
    Validate {
        /// Path to the rig config JSON file
        #[arg(short, long)]
        config: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Build a rig and write a JSON report
    Build {
        /// Path to the rig config JSON file (default config when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Report file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,

        /// Mirror left markers to the right before building (half body)
        #[arg(long)]
        mirror: bool,

        /// Snap every FK/IK limb after building
        #[arg(long, value_parser = ["fk-to-ik", "ik-to-fk"])]
        snap: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Markers {
            body,
            spine,
            output,
        } => commands::markers::run(&body, &spine, output.as_deref()),
        Commands::Validate { config, json } => commands::validate::run(&config, json),
        Commands::Build {
            config,
            output,
            mirror,
            snap,
        } => commands::build::run(
            config.as_deref(),
            output.as_deref(),
            mirror,
            snap.as_deref(),
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
