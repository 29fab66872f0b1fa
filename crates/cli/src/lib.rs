pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "signoff",
    about = "Signoff operator CLI",
    long_about = "Validate approval definitions, dry-run document routing, and inspect chains.",
    after_help = "Examples:\n  signoff check --definitions definitions.toml\n  signoff route --definitions definitions.toml --document invoice.json\n  signoff show-chain --definitions definitions.toml --id finance-review"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate a definitions file: chains, rules, and seed data")]
    Check {
        #[arg(long, help = "Path to the definitions TOML file")]
        definitions: PathBuf,
    },
    #[command(about = "Dry-run routing for a document JSON file; prints the selected chain")]
    Route {
        #[arg(long, help = "Path to the definitions TOML file")]
        definitions: PathBuf,
        #[arg(long, help = "Path to a document JSON file")]
        document: PathBuf,
    },
    #[command(about = "Show one approval chain's steps and consensus rules")]
    ShowChain {
        #[arg(long, help = "Path to the definitions TOML file")]
        definitions: PathBuf,
        #[arg(long, help = "Chain id to show")]
        id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Check { definitions } => commands::check::run(&definitions),
        Command::Route { definitions, document } => commands::route::run(&definitions, &document),
        Command::ShowChain { definitions, id } => commands::chain::run(&definitions, &id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
