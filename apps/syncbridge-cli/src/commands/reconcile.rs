//! Reconcile command - Pair the records of two collections by key

use clap::Args;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use syncbridge_reconcile::{
    Actor, InMemoryCacheRepository, ReconciliationEngine, RemoteIdMapping, RunStatistics, SyncId,
    TableMapping,
};

use super::{dispose, print_json, Context};
use crate::error::CliResult;

/// `<connection>:<collection>` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub connection: String,
    pub collection: String,
}

impl FromStr for CollectionRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((connection, collection)) if !connection.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    connection: connection.to_string(),
                    collection: collection.to_string(),
                })
            }
            _ => Err(format!("expected <connection>:<collection>, got '{s}'")),
        }
    }
}

/// Arguments for the reconcile command
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Source collection as <connection>:<collection>
    #[arg(long)]
    pub source: CollectionRef,

    /// Destination collection as <connection>:<collection>
    #[arg(long)]
    pub destination: CollectionRef,

    /// Key column on the source collection
    #[arg(long)]
    pub source_key: String,

    /// Key column on the destination collection
    #[arg(long)]
    pub destination_key: String,

    /// Sync identifier; a new one is generated when omitted
    #[arg(long)]
    pub sync_id: Option<Uuid>,

    /// Records per extraction page, overriding the config file
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Serialize)]
struct ReconcileOutput {
    sync_id: SyncId,
    run_id: Uuid,
    statistics: RunStatistics,
    id_mappings: Vec<RemoteIdMapping>,
}

/// Execute the reconcile command
pub async fn execute(args: ReconcileArgs, ctx: &Context) -> CliResult<()> {
    let mapping = TableMapping::new(
        &args.source.collection,
        &args.destination.collection,
        &args.source_key,
        &args.destination_key,
    );
    mapping.validate()?;

    let mut config = ctx.config.reconciliation.clone();
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }

    let source = ctx.connect(&args.source.connection).await?;
    let destination = match ctx.connect(&args.destination.connection).await {
        Ok(destination) => destination,
        Err(e) => {
            dispose(&source).await;
            return Err(e);
        }
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling reconciliation run");
                on_ctrl_c.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });

    let engine = ReconciliationEngine::new(
        source.clone(),
        destination.clone(),
        Arc::new(InMemoryCacheRepository::new()),
    )
    .with_config(config)
    .with_cancellation(cancel);

    let sync_id = args.sync_id.map(SyncId::from).unwrap_or_default();
    let result = engine
        .run_reconciliation(sync_id, &mapping, &Actor::System)
        .await;

    watcher.abort();
    dispose(&source).await;
    dispose(&destination).await;

    let outcome = result?;
    info!(
        sync_id = %outcome.sync_id,
        matched = outcome.statistics.matched,
        unmatched = outcome.statistics.unmatched,
        "Reconciliation finished"
    );
    print_json(&ReconcileOutput {
        sync_id: outcome.sync_id,
        run_id: outcome.run_id,
        statistics: outcome.statistics,
        id_mappings: outcome.id_mappings,
    })
}
