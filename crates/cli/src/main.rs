//! Souk CLI - Database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! souk-cli migrate
//!
//! # Expire idle sessions and purge old records
//! souk-cli cleanup sessions
//! souk-cli cleanup attempts --days 30
//! souk-cli cleanup all
//!
//! # Create the payment method rows
//! souk-cli seed payment-methods
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `cleanup` - Session and security-log housekeeping
//! - `seed` - Insert reference data

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "souk-cli")]
#[command(author, version, about = "Souk CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Delete expired sessions and old security records
    Cleanup {
        #[command(subcommand)]
        target: CleanupTarget,
    },
    /// Seed reference data
    Seed {
        #[command(subcommand)]
        data: SeedData,
    },
}

#[derive(Subcommand)]
enum CleanupTarget {
    /// Expire idle sessions, delete old inactive ones, purge the token blacklist
    Sessions {
        /// Retention in days for inactive sessions (default 90)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Delete old security attempts
    Attempts {
        /// Retention in days (default 90)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Both of the above
    All {
        /// Retention in days for sessions and attempts (default 90)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
enum SeedData {
    /// Create the payment method rows (PayPal enabled, others disabled)
    PaymentMethods,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Cleanup { target } => match target {
            CleanupTarget::Sessions { days } => commands::cleanup::sessions(days).await?,
            CleanupTarget::Attempts { days } => commands::cleanup::attempts(days).await?,
            CleanupTarget::All { days } => commands::cleanup::all(days).await?,
        },
        Commands::Seed { data } => match data {
            SeedData::PaymentMethods => commands::seed::payment_methods().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cleanup_days_flag() {
        let cli = Cli::try_parse_from(["souk-cli", "cleanup", "attempts", "--days", "30"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cleanup {
                target: CleanupTarget::Attempts { days: Some(30) }
            }
        ));
    }

    #[test]
    fn test_seed_payment_methods_parses() {
        let cli = Cli::try_parse_from(["souk-cli", "seed", "payment-methods"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Seed {
                data: SeedData::PaymentMethods
            }
        ));
    }
}
