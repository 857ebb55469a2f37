//! Per-batch transaction handling.
//!
//! Every mutation batch runs inside one [`BatchTransaction`]. Dropping it
//! without committing rolls back, so an early return through `?` never
//! leaves partial writes behind.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use syncbridge_connector::error::{ConnectorError, ConnectorResult};

use crate::error::map_sqlx_error;

/// A transaction scoped to one mutation batch.
pub struct BatchTransaction {
    inner: Transaction<'static, Postgres>,
    collection: String,
    operation: &'static str,
}

impl BatchTransaction {
    /// Begin a transaction for a batch on `collection`.
    pub async fn begin(
        pool: &PgPool,
        collection: &str,
        operation: &'static str,
    ) -> ConnectorResult<Self> {
        let inner = pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("failed to begin transaction", e))?;

        debug!(collection = %collection, operation, "Batch transaction started");

        Ok(Self {
            inner,
            collection: collection.to_string(),
            operation,
        })
    }

    /// The connection to run statements on.
    pub fn conn(&mut self) -> &mut sqlx::PgConnection {
        &mut self.inner
    }

    /// Commit the batch.
    #[instrument(skip(self), fields(collection = %self.collection, operation = self.operation))]
    pub async fn commit(self) -> ConnectorResult<()> {
        self.inner
            .commit()
            .await
            .map_err(|e| map_sqlx_error("failed to commit transaction", e))?;
        debug!("Batch transaction committed");
        Ok(())
    }

    /// Roll the batch back and return `cause`.
    ///
    /// A failure to roll back is logged; the original error is what the
    /// caller needs to see.
    pub async fn abort(self, cause: ConnectorError) -> ConnectorError {
        let collection = self.collection.clone();
        let operation = self.operation;
        if let Err(e) = self.inner.rollback().await {
            warn!(
                collection = %collection,
                operation,
                error = %e,
                "Rollback failed after batch error"
            );
        } else {
            warn!(
                collection = %collection,
                operation,
                error_code = cause.error_code(),
                "Batch transaction rolled back"
            );
        }
        cause
    }
}
