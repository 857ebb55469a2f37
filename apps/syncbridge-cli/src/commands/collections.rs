//! Collections command - List the collections of a connection

use clap::Args;

use syncbridge_connector::traits::SchemaIntrospector;

use super::{dispose, print_json, Context};
use crate::error::CliResult;

/// Arguments for the collections command
#[derive(Args, Debug)]
pub struct CollectionsArgs {
    /// Connection name from the config file
    pub connection: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the collections command
pub async fn execute(args: CollectionsArgs, ctx: &Context) -> CliResult<()> {
    let connector = ctx.connect(&args.connection).await?;
    let result = connector.list_collections().await;
    dispose(&connector).await;
    let collections = result?;

    if args.json {
        return print_json(&collections);
    }
    if collections.is_empty() {
        println!("No collections found.");
        return Ok(());
    }
    for collection in &collections {
        if collection.display_name == collection.id {
            println!("{}", collection.id);
        } else {
            println!("{}\t{}", collection.id, collection.display_name);
        }
    }
    Ok(())
}
