/*!
 * Transaction scope with cancellation checkpoints
 *
 * Every multi-step write runs inside a `TxScope`. The scope checks its
 * `CancelSignal` before `BEGIN`, right after it, whenever the caller reaches
 * a checkpoint, and once more before `COMMIT`. Any error or signal hit rolls
 * the whole transaction back.
 */

use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cancellation::CancelSignal;
use crate::errors::ServiceError;

pub struct TxScope<'s> {
    txn: DatabaseTransaction,
    signal: &'s CancelSignal,
    operation: &'static str,
    transaction_id: Uuid,
    started: Instant,
}

impl<'s> TxScope<'s> {
    /// Opens a transaction for `operation`.
    ///
    /// # Errors
    /// `Cancelled`/`Timeout` if the signal has fired, `TransactionFailed` if
    /// the store refuses to begin.
    pub async fn begin(
        db: &DatabaseConnection,
        signal: &'s CancelSignal,
        operation: &'static str,
    ) -> Result<TxScope<'s>, ServiceError> {
        signal.check()?;

        let txn = db.begin().await.map_err(|source| {
            counter!("sales_db.transaction.begin_failed", 1);
            ServiceError::TransactionFailed {
                stage: "begin",
                source,
            }
        })?;

        let scope = TxScope {
            txn,
            signal,
            operation,
            transaction_id: Uuid::new_v4(),
            started: Instant::now(),
        };
        debug!(transaction_id = %scope.transaction_id, operation, "Starting database transaction");
        counter!("sales_db.transaction.started", 1);

        if let Err(err) = signal.check() {
            scope.rollback(&err).await;
            return Err(err);
        }
        Ok(scope)
    }

    /// Connection to run statements on while the scope is open.
    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Fails if the signal has fired. Call once per loop iteration.
    pub fn checkpoint(&self) -> Result<(), ServiceError> {
        self.signal.check()
    }

    /// Commits on `Ok` (after a last signal check), rolls back on `Err`.
    pub async fn finish<T>(self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                self.rollback(&err).await;
                return Err(err);
            }
        };

        if let Err(err) = self.signal.check() {
            self.rollback(&err).await;
            return Err(err);
        }

        let transaction_id = self.transaction_id;
        let operation = self.operation;
        let started = self.started;
        self.txn.commit().await.map_err(|source| {
            counter!("sales_db.transaction.commit_failed", 1);
            warn!(transaction_id = %transaction_id, operation, error = %source, "Commit failed");
            ServiceError::TransactionFailed {
                stage: "commit",
                source,
            }
        })?;

        let elapsed = started.elapsed();
        histogram!("sales_db.transaction.duration", elapsed);
        counter!("sales_db.transaction.committed", 1);
        debug!(transaction_id = %transaction_id, operation, "Transaction committed in {:?}", elapsed);
        Ok(value)
    }

    async fn rollback(self, cause: &ServiceError) {
        let elapsed = self.started.elapsed();
        if cause.is_cancellation() {
            counter!("sales_db.transaction.cancelled", 1);
        }
        counter!("sales_db.transaction.rolled_back", 1);
        warn!(
            transaction_id = %self.transaction_id,
            operation = self.operation,
            cause = %cause,
            "Transaction rolled back after {:?}",
            elapsed
        );
        if let Err(err) = self.txn.rollback().await {
            warn!(transaction_id = %self.transaction_id, error = %err, "Rollback failed");
        }
    }
}
