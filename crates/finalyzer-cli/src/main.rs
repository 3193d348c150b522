//! Finalyzer CLI - upload financial documents and follow their analysis
//! from the terminal.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod storage;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::analysis::run_analysis;
use crate::commands::auth_cmd::run_auth;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::documents::run_documents;
use crate::commands::health::run_health;
use crate::commands::upload::run_upload;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "finalyzer_core=info,finalyzer_cli=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let api_url = cli.api_url;

    match cli.command {
        Commands::Auth { command } => run_auth(command, profile, api_url).await,
        Commands::Documents {
            page,
            json,
            interactive,
        } => run_documents(page, json, interactive, profile, api_url).await,
        Commands::Upload { path, query, watch } => {
            run_upload(&path, query, watch, profile, api_url).await
        }
        Commands::Analysis {
            document_id,
            once,
            json,
        } => run_analysis(&document_id, once, json, profile, api_url).await,
        Commands::Config { command } => run_config(command, profile, api_url),
        Commands::Health => run_health(profile, api_url).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
