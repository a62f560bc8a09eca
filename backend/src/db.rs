//! Connection pool setup and the serializable transaction helper

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;

use crate::config::{DatabaseConfig, DatabaseProvider};
use crate::error::{AppError, AppResult};

/// Creates the process-wide pool for the configured provider
pub async fn connect(config: &DatabaseConfig) -> AppResult<PgPool> {
    match config
        .provider()
        .map_err(|e| AppError::Configuration(e.to_string()))?
    {
        DatabaseProvider::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
                .connect(&config.url)
                .await?;
            Ok(pool)
        }
    }
}

/// Runs `op` in a SERIALIZABLE transaction, retrying serialization failures.
///
/// `op` may run more than once, so it must only capture owned inputs. Any error rolls
/// the transaction back; a serialization failure (40001/40P01) restarts it until
/// `attempts` runs out.
pub async fn serializable<T, F>(pool: &PgPool, attempts: u32, mut op: F) -> AppResult<T>
where
    T: Send,
    F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, AppResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let outcome = match op(&mut *tx).await {
            Ok(value) => tx.commit().await.map(|_| value).map_err(AppError::from),
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                Err(err)
            }
        };

        match outcome {
            Err(err) if err.is_serialization_failure() && attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    "Serialization failure, retrying transaction"
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}
