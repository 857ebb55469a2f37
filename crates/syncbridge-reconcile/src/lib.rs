//! # Reconciliation
//!
//! Matches the records of two connector-backed collections by a
//! caller-chosen key column and keeps two caches per sync:
//!
//! - **match keys**: the normalized key of every record on both sides;
//! - **remote id mappings**: the destination partner of every source record,
//!   or none.
//!
//! Native identifiers mean nothing across systems, so records pair up only
//! through their key values. Blank keys never match, and when several
//! destination records share a key the first one extracted wins.
//!
//! The engine does not decide what to create, update or delete; callers plan
//! that from the returned pairs and hand it to a [`BatchApplier`].
//!
//! ## Example
//!
//! ```ignore
//! use syncbridge_reconcile::prelude::*;
//!
//! let engine = ReconciliationEngine::new(source, destination, Arc::new(InMemoryCacheRepository::new()));
//! let mapping = TableMapping::new("contacts", "tblLeads", "email", "fldEmail");
//! let outcome = engine.run_reconciliation(SyncId::new(), &mapping, &Actor::System).await?;
//! ```
//!
//! [`BatchApplier`]: applier::BatchApplier

pub mod applier;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod matching;
pub mod pg_cache;
pub mod progress;
pub mod statistics;
pub mod types;

pub use applier::{BatchApplier, TablePlan, TableReport};
pub use cache::{CacheRepository, InMemoryCacheRepository, MatchKey, RemoteIdMapping, RunCaches};
pub use config::ReconciliationConfig;
pub use engine::{MatchKeys, ReconciliationEngine, ReconciliationOutcome};
pub use error::{CacheError, CacheResult, ReconcileError, ReconcileResult};
pub use lock::{CollectionLock, InMemoryCollectionLock, LockKey};
pub use pg_cache::PgCacheRepository;
pub use progress::{NoopProgress, ProgressReport, ProgressSink, WatchProgressSink};
pub use statistics::RunStatistics;
pub use types::{
    Actor, ColumnMapping, ReconciliationPhase, RecordMatching, Side, SyncId, TableMapping,
};

/// Prelude for callers driving reconciliation runs.
pub mod prelude {
    pub use crate::applier::{BatchApplier, TablePlan, TableReport};
    pub use crate::cache::{CacheRepository, InMemoryCacheRepository};
    pub use crate::config::ReconciliationConfig;
    pub use crate::engine::{ReconciliationEngine, ReconciliationOutcome};
    pub use crate::error::{ReconcileError, ReconcileResult};
    pub use crate::lock::{CollectionLock, InMemoryCollectionLock};
    pub use crate::progress::{ProgressReport, ProgressSink, WatchProgressSink};
    pub use crate::types::{Actor, ReconciliationPhase, Side, SyncId, TableMapping};
}
