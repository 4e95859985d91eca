//! Run a unit of database work inside one transaction

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{error, warn};

use crate::error::{RegistryError, Result};

/// Run `f` inside a transaction and commit or roll back based on its outcome
///
/// - `f` succeeds: the transaction is committed. A failed commit is reported
///   as [`RegistryError::Commit`].
/// - `f` fails: the transaction is rolled back and `f`'s error is returned.
///   If the rollback fails too, both errors are kept in
///   [`RegistryError::Rollback`].
/// - `f` panics: the transaction is rolled back and the panic resumes
///   unchanged.
///
/// ```rust,no_run
/// # use depot_registry::unit_of_work::with_tx;
/// # async fn example(pool: sqlx::SqlitePool) -> depot_registry::error::Result<()> {
/// let inserted = with_tx(&pool, |conn| {
///     Box::pin(async move {
///         let result = sqlx::query("DELETE FROM artifact_versions")
///             .execute(&mut *conn)
///             .await?;
///         Ok(result.rows_affected())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_tx<T, F>(pool: &SqlitePool, f: F) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
{
    let mut tx = pool.begin().await?;

    let outcome = AssertUnwindSafe(f(&mut *tx)).catch_unwind().await;

    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await.map_err(RegistryError::Commit)?;
            Ok(value)
        }
        Ok(Err(err)) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback) => Err(RegistryError::Rollback {
                source: Box::new(err),
                rollback: Box::new(RegistryError::Database(rollback)),
            }),
        },
        Err(panic) => {
            warn!("unit of work panicked, rolling back");
            if let Err(e) = tx.rollback().await {
                error!(error = %e, "rollback after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}
