//! Test-connection command - Check that a connection is reachable

use clap::Args;
use serde::Serialize;
use tracing::info;

use syncbridge_connector::error_details::ErrorDetails;
use syncbridge_connector::traits::Connector;

use super::{dispose, print_json, Context};
use crate::error::CliResult;

/// Arguments for the test-connection command
#[derive(Args, Debug)]
pub struct TestConnectionArgs {
    /// Connection name from the config file
    pub connection: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TestConnectionOutput<'a> {
    connection: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetails>,
}

/// Execute the test-connection command
pub async fn execute(args: TestConnectionArgs, ctx: &Context) -> CliResult<()> {
    let connector = ctx.connect(&args.connection).await?;
    let result = connector.test_connection().await;
    let details = result
        .as_ref()
        .err()
        .map(|e| connector.extract_error_details(e));
    dispose(&connector).await;

    if args.json {
        print_json(&TestConnectionOutput {
            connection: &args.connection,
            ok: result.is_ok(),
            error: details,
        })?;
    } else if let Some(details) = &details {
        println!("{}: {}", args.connection, details.user_message);
        println!("  {}", details.technical_detail);
    } else {
        println!("{}: connection OK", args.connection);
    }

    result?;
    info!(connection = %args.connection, "Connection test passed");
    Ok(())
}
