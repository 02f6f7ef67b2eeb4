//! placeflow - Command-line interface for placeflow workflows
//!
//! Validates and inspects workflow files, drives them one-shot, or opens an
//! interactive session.

mod commands;
mod config;
mod repl;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use placeflow_core::WorkflowKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "placeflow")]
#[command(about = "Validate, inspect and drive placeflow workflow files")]
#[command(version)]
struct Cli {
    /// CLI configuration file (YAML)
    #[arg(short, long, env = "PLACEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build and validate a workflow file
    Validate {
        /// Workflow file (YAML, or JSON with a .json extension)
        file: PathBuf,

        /// Validate as this kind instead of the one in the file
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,

        /// Validate for a marking store holding a single place
        #[arg(long)]
        single_place: bool,
    },

    /// Show places, transitions and metadata of a workflow file
    Inspect {
        /// Workflow file
        file: PathBuf,
    },

    /// Apply transitions in order to a fresh in-memory subject
    Run {
        /// Workflow file
        file: PathBuf,

        /// Context JSON passed to every call (or @file.json to read from file)
        #[arg(short, long)]
        context: Option<String>,

        /// Print every channel a notification is published on
        #[arg(long)]
        trace: bool,

        /// Subject identifier
        #[arg(short, long, default_value = "subject")]
        subject: String,

        /// Transition names, applied in order
        #[arg(required = true)]
        transitions: Vec<String>,
    },

    /// Start an interactive session on a workflow file
    Repl {
        /// Workflow file
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Workflow,
    StateMachine,
}

impl From<KindArg> for WorkflowKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Workflow => WorkflowKind::Workflow,
            KindArg::StateMachine => WorkflowKind::StateMachine,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log.filter))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if !config.output.color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Repl { file } => repl::run(&file, &config),
        cmd => commands::execute(cmd).map(|output| println!("{}", output)),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }

    Ok(())
}
