//! syncbridge CLI - Command-line driver for connectors and reconciliation
//!
//! This CLI enables operators to:
//! - List and describe the collections of a configured connection
//! - Check that a connection is reachable
//! - Reconcile two collections by key and print the id mapping

use clap::Parser;

use syncbridge_cli::{run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "Command failed");
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}
