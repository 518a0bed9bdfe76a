//! Tenantry CLI - operator tooling over a tenantry database

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(name = "tenantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "./tenantry.db")]
    db_path: PathBuf,

    /// JSON platform config; overrides --db-path when given
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Operator id recorded on facts this command appends
    #[arg(long)]
    actor: Option<Uuid>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an organization's projection and bootstrap status
    Status {
        organization_id: Uuid,
    },

    /// List facts whose projection failed
    Failed {
        #[arg(long)]
        fact_type: Option<String>,

        #[arg(long)]
        stream_type: Option<String>,

        /// Only failures created at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Dispatch a fact again
    Retry {
        fact_id: Uuid,
    },

    /// Aggregate failure statistics
    Stats,

    /// Print every fact of one stream as JSON lines
    Stream {
        stream_id: Uuid,
    },

    /// Truncate projections and replay the whole log
    Rebuild {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List persisted provisioning runs
    Runs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = commands::load_config(cli.db_path, cli.config.as_deref())?;
    let operator = commands::operator_context(cli.actor);

    match cli.command {
        Commands::Status { organization_id } => {
            commands::status::execute(&config, organization_id)?;
        }
        Commands::Failed {
            fact_type,
            stream_type,
            since,
            limit,
        } => {
            commands::facts::list_failed(&config, &operator, fact_type, stream_type, since, limit)?;
        }
        Commands::Retry { fact_id } => {
            commands::facts::retry(&config, &operator, fact_id)?;
        }
        Commands::Stats => {
            commands::facts::stats(&config, &operator)?;
        }
        Commands::Stream { stream_id } => {
            commands::facts::stream(&config, stream_id)?;
        }
        Commands::Rebuild { force } => {
            commands::rebuild::execute(&config, force)?;
        }
        Commands::Runs => {
            commands::runs::execute(&config)?;
        }
    }

    Ok(())
}
