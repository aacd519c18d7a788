use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod commands;
mod utils;

use commands::{compile, evaluate, validate};

/// Policy decision point CLI - works with policy trees stored as JSON
#[derive(Parser)]
#[command(name = "pdpc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (YAML, `id: authz`)
    #[arg(long, global = true, env = "AUTHZ_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a policy set (or rule sets) into the encoded form
    Compile {
        /// Policy set JSON file
        input: PathBuf,

        /// Write the encoded tree here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat the input as a rule-set file
        #[arg(long)]
        rule_sets: bool,
    },

    /// Check that an encoded tree can be loaded
    Validate {
        /// Encoded policy set JSON file
        input: PathBuf,
    },

    /// Evaluate a request context against an encoded tree
    Evaluate {
        /// Encoded policy set JSON file
        input: PathBuf,

        /// Request context JSON file
        #[arg(short, long)]
        context: PathBuf,

        /// Output format (text, json, yaml)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up AUTHZ_SETTINGS and RUST_LOG from a local .env before parsing
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr so command output stays machine readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let settings = match utils::inputs::load_settings(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Compile {
            input,
            output,
            rule_sets,
        } => compile::execute(input, output, rule_sets, settings).await,
        Commands::Validate { input } => validate::execute(input, settings).await,
        Commands::Evaluate {
            input,
            context,
            format,
        } => evaluate::execute(input, context, format, settings).await,
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
