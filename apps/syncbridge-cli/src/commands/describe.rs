//! Describe command - Print the schema of one collection

use clap::Args;

use syncbridge_connector::traits::SchemaIntrospector;

use super::{dispose, print_json, Context};
use crate::error::CliResult;

/// Arguments for the describe command
#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Connection name from the config file
    pub connection: String,

    /// Collection id as listed by `collections`
    pub collection: String,
}

/// Execute the describe command
pub async fn execute(args: DescribeArgs, ctx: &Context) -> CliResult<()> {
    let connector = ctx.connect(&args.connection).await?;
    let result = connector.describe_collection(&args.collection).await;
    dispose(&connector).await;
    print_json(&result?)
}
