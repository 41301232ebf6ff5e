//! Planbook CLI - inspect and edit the local planner store
//!
//! Works against the same offline database the app uses: entities, the
//! sync outbox, conflict history and the offline credential cache.

mod cli;
mod commands;
mod config;
mod error;


use std::env;

use clap::Parser;

use crate::cli::{Cli, Commands, CredentialsCommands};
use crate::commands::completions::run_completions;
use crate::commands::conflicts::run_conflicts;
use crate::commands::credentials::{
    run_credentials_clear, run_credentials_status, run_credentials_verify,
};
use crate::commands::entities::{run_add, run_delete, run_list};
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::config::{CliConfig, DB_PATH_ENV};
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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("planbook=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load()?;
    let db_path = config.resolve_db_path(cli.db_path, env::var_os(DB_PATH_ENV));

    match cli.command {
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Add {
            table,
            user,
            fields,
            parent,
        } => {
            let user_id = config.resolve_user(user)?;
            run_add(&table, &user_id, &fields, parent.as_deref(), &db_path).await?;
        }
        Commands::List { table, user, json } => {
            let user_id = config.resolve_user(user)?;
            run_list(&table, &user_id, json, &db_path).await?;
        }
        Commands::Delete { table, id } => run_delete(&table, &id, &db_path).await?,
        Commands::Queue { json } => run_queue(json, &db_path).await?,
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path).await?,
        Commands::Credentials { command } => match command {
            CredentialsCommands::Status => run_credentials_status(&db_path).await?,
            CredentialsCommands::Verify {
                email,
                password,
                user,
            } => {
                run_credentials_verify(&email, &password, user.as_deref(), &db_path).await?;
            }
            CredentialsCommands::Clear => run_credentials_clear(&db_path).await?,
        },
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
