//! Reconciliation engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for reconciliation runs and mutation batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Records requested per extraction page and per mutation batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether runs write the match-key and id-mapping caches.
    #[serde(default = "default_persist_caches")]
    pub persist_caches: bool,
}

fn default_batch_size() -> usize {
    1000
}

fn default_persist_caches() -> bool {
    true
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            persist_caches: default_persist_caches(),
        }
    }
}

impl ReconciliationConfig {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn without_persistence(mut self) -> Self {
        self.persist_caches = false;
        self
    }
}
