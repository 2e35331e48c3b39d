//! Transactional execution of units of work
//!
//! A unit of work runs between [`Connection::begin`] and a commit; any error
//! rolls back every write performed in between. Stores can ask
//! [`in_transaction`] whether a write belongs to the running unit of work.

use std::future::Future;

use async_trait::async_trait;
use tracing::{error, trace};

use reconciler_common::Result;

tokio::task_local! {
    static UNIT_OF_WORK: ();
}

/// Whether the caller runs inside [`transaction`]
///
/// Writes issued outside a unit of work are not part of any open transaction
/// and must not be discarded by its rollback.
pub fn in_transaction() -> bool {
    UNIT_OF_WORK.try_with(|_| ()).is_ok()
}

/// Source of transactions
#[async_trait]
pub trait Connection: Send + Sync {
    /// Start a transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// An open transaction
#[async_trait]
pub trait Transaction: Send {
    /// Make all writes of the transaction durable
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all writes of the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Run `op` as one unit of work
///
/// Commits when `op` succeeds. When it fails the transaction is rolled back
/// and the error from `op` is returned; a failing rollback is logged but does
/// not replace that error. Units of work do not nest.
pub async fn transaction<F, Fut, T>(conn: &dyn Connection, op: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let tx = conn.begin().await?;
    trace!("transaction started");

    match UNIT_OF_WORK.scope((), op()).await {
        Ok(value) => {
            tx.commit().await?;
            trace!("transaction committed");
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %e, rollback_error = %rollback_err, "transaction rollback failed");
            } else {
                trace!(error = %e, "transaction rolled back");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconciler_common::Error;

    struct NoopConnection;

    struct NoopTransaction;

    #[async_trait]
    impl Connection for NoopConnection {
        async fn begin(&self) -> Result<Box<dyn Transaction>> {
            Ok(Box::new(NoopTransaction))
        }
    }

    #[async_trait]
    impl Transaction for NoopTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unit_of_work_is_visible_to_writes() {
        assert!(!in_transaction());

        let inside = transaction(&NoopConnection, || async { Ok(in_transaction()) })
            .await
            .unwrap();
        assert!(inside);

        let failed: Result<()> = transaction(&NoopConnection, || async {
            assert!(in_transaction());
            Err(Error::internal("boom"))
        })
        .await;
        assert!(failed.is_err());
        assert!(!in_transaction());
    }

    #[tokio::test]
    async fn test_spawned_tasks_are_outside_the_unit_of_work() {
        let spawned = transaction(&NoopConnection, || async {
            tokio::spawn(async { in_transaction() })
                .await
                .map_err(|e| Error::internal(e.to_string()))
        })
        .await
        .unwrap();
        assert!(!spawned);
    }
}
