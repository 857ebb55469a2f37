//! syncbridge CLI library
//!
//! Exposes the command tree for integration testing. The binary entry point
//! is in main.rs.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::Context;
use config::{Config, DEFAULT_CONFIG_FILE};
use error::CliResult;
use logging::LogFormat;

/// syncbridge - Inspect connections and reconcile collections
#[derive(Parser, Debug)]
#[command(name = "syncbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file naming the connections
    #[arg(long, global = true, env = "SYNCBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the collections of a connection
    Collections(commands::collections::CollectionsArgs),

    /// Print the schema of a collection as JSON
    Describe(commands::describe::DescribeArgs),

    /// Check that a connection is reachable with its credentials
    TestConnection(commands::test_connection::TestConnectionArgs),

    /// Pair the records of two collections by key and print the mapping
    Reconcile(commands::reconcile::ReconcileArgs),
}

impl Cli {
    /// Load the config file named on the command line, or the default one.
    pub fn load_config(&self) -> CliResult<Config> {
        match &self.config {
            Some(path) => Config::load(path, true),
            None => Config::load(&PathBuf::from(DEFAULT_CONFIG_FILE), false),
        }
    }
}

/// Run a parsed command line.
pub async fn run(cli: Cli) -> CliResult<()> {
    let config = cli.load_config()?;
    logging::init_logging(&config.log_filter, cli.log_format)?;

    let ctx = Context::new(config).await;
    match cli.command {
        Commands::Collections(args) => commands::collections::execute(args, &ctx).await,
        Commands::Describe(args) => commands::describe::execute(args, &ctx).await,
        Commands::TestConnection(args) => commands::test_connection::execute(args, &ctx).await,
        Commands::Reconcile(args) => commands::reconcile::execute(args, &ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reconcile() {
        let cli = Cli::try_parse_from([
            "syncbridge",
            "reconcile",
            "--source",
            "crm:contacts",
            "--destination",
            "sheets:leads",
            "--source-key",
            "email",
            "--destination-key",
            "Email",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Reconcile(args) = cli.command else {
            panic!("expected reconcile");
        };
        assert_eq!(args.source.connection, "crm");
        assert_eq!(args.destination.collection, "leads");
        assert_eq!(args.sync_id, None);
    }

    #[test]
    fn test_reconcile_requires_keys() {
        let result = Cli::try_parse_from([
            "syncbridge",
            "reconcile",
            "--source",
            "crm:contacts",
            "--destination",
            "sheets:leads",
        ]);
        assert!(result.is_err());
    }
}
