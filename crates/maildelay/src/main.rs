//! `maildelay` - operator tool for the delay-address service
//!
//! Decodes delay addresses, generates keys and identifiers, and inspects or
//! purges the address log of the abuse guard.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use maildelay_core::{
    AddressCodec, AddressLogRepository, Config, DelaySpec, KeyGenerator, LogStore,
    derive_local_id,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Operator tool for the maildelay service
#[derive(Parser, Debug)]
#[command(name = "maildelay")]
#[command(about = "Inspect delay addresses and the notification log", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode delay addresses
    Decode {
        /// Addresses to decode
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Print a fresh correlation key
    Key,
    /// Strip reply and forward prefixes from a subject
    CleanSubject {
        /// Subject line
        subject: String,
    },
    /// Print the local identifier derived from an address
    LocalId {
        /// Email address
        email: String,
    },
    /// Address log commands
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Subcommand, Debug)]
enum LogAction {
    /// Show the entries recorded for an address
    Show {
        /// Email address
        email: String,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every entry recorded for an address
    Purge {
        /// Email address
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maildelay=info,maildelay_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::Decode { addresses } => cmd_decode(&config, &addresses)?,
        Commands::Key => println!("{}", KeyGenerator::new().new_key()),
        Commands::CleanSubject { subject } => {
            println!("{}", config.subject_normalizer()?.clean(&subject));
        }
        Commands::LocalId { email } => println!("{}", derive_local_id(&email)),
        Commands::Log { action } => match action {
            LogAction::Show { email, json } => cmd_log_show(&config, &email, json).await?,
            LogAction::Purge { email } => cmd_log_purge(&config, &email).await?,
        },
    }

    Ok(())
}

/// Decode each address, reporting failures per address.
fn cmd_decode(config: &Config, addresses: &[String]) -> anyhow::Result<()> {
    let codec = AddressCodec::new(config.unit_table()?)?;
    let now = Utc::now();
    let mut failed = 0usize;

    for address in addresses {
        match codec.decode_delay_spec(address) {
            Ok(spec) => println!("{address}: {}", describe(&spec, now)),
            Err(e) => {
                failed += 1;
                println!("{address}: {e}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} addresses could not be decoded", addresses.len());
    }
    Ok(())
}

/// One-line summary of a decoded address for a message received at `received`.
fn describe(spec: &DelaySpec, received: DateTime<Utc>) -> String {
    let due = spec
        .due_at(received)
        .map_or_else(|| "out of range".to_string(), |due| due.to_rfc3339());
    let key = spec.key.as_deref().unwrap_or("-");
    format!("{} days, due {due}, key {key}", spec.delay_days)
}

async fn cmd_log_show(config: &Config, email: &str, json: bool) -> anyhow::Result<()> {
    let repo = open_log(config).await?;
    let entries = repo.entries_for(email).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries for {email}");
        return Ok(());
    }
    for entry in entries {
        let next = entry
            .next_eligible_at
            .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
        println!("{:<6} attempt {:<3} next {next}", entry.reason.as_str(), entry.attempt);
    }
    Ok(())
}

async fn cmd_log_purge(config: &Config, email: &str) -> anyhow::Result<()> {
    let repo = open_log(config).await?;
    let removed = repo.delete_all(email).await?;
    info!(%email, removed, "Purged address log");
    println!("Removed {removed} entries for {email}");
    Ok(())
}

async fn open_log(config: &Config) -> anyhow::Result<AddressLogRepository> {
    AddressLogRepository::new(&config.database_path)
        .await
        .with_context(|| format!("failed to open database {}", config.database_path))
}
