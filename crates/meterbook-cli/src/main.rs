//! Meterbook CLI - record utility readings and car documents from the terminal
//!
//! Readings are stored locally and merged with the family group on `sync`.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{CarCommands, Cli, Commands, PriceCommands};
use crate::commands::common::{resolve_db_path, resolve_settings_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("meterbook_cli=info,meterbook_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let settings_path = resolve_settings_path(cli.config_path);

    match cli.command {
        Commands::Add { meter, value, date } => {
            commands::add::run_add(&meter, &value, date.as_deref(), &db_path).await
        }
        Commands::List { meter, limit, json } => {
            commands::list::run_list(&meter, limit, json, &db_path).await
        }
        Commands::Delete { meter, id } => commands::delete::run_delete(&meter, &id, &db_path).await,
        Commands::Car { command } => match command.unwrap_or(CarCommands::Show { json: false }) {
            CarCommands::Show { json } => commands::car::run_car_show(json, &db_path).await,
            CarCommands::Set { field, value } => {
                commands::car::run_car_set(&field, &value, &db_path).await
            }
        },
        Commands::Price { command } => {
            match command.unwrap_or(PriceCommands::Show { json: false }) {
                PriceCommands::Show { json } => {
                    commands::price::run_price_show(json, &db_path).await
                }
                PriceCommands::Set { field, value } => {
                    commands::price::run_price_set(&field, &value, &db_path).await
                }
            }
        }
        Commands::Reminders { date, json } => {
            commands::reminders::run_reminders(date.as_deref(), json, &db_path).await
        }
        Commands::Usage { meter, json } => {
            commands::usage::run_usage(&meter, json, &db_path).await
        }
        Commands::Cost { json } => commands::usage::run_cost(json, &db_path).await,
        Commands::Export {
            from,
            to,
            format,
            output,
        } => {
            commands::export::run_export(
                from.as_deref(),
                to.as_deref(),
                format,
                output.as_deref(),
                &db_path,
            )
            .await
        }
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())
        }
        Commands::Sync { command } => {
            commands::sync::run_sync(command, &db_path, &settings_path).await
        }
        Commands::Config { command } => commands::config::run_config(command, &settings_path),
    }
}
