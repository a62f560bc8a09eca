//! Postgres persistence for items, purchases, sales and assets
//!
//! Functions are generic over the executor so the same query runs on the pool or inside
//! a transaction. Functions that lock rows take the transaction's connection directly.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use shared::models::{Item, Purchase, Sale};
use shared::rebuild::{FieldChange, ItemRebuildResult};
use shared::InventoryError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};

pub mod assets;
pub mod items;
pub mod purchases;
pub mod sales;

/// Parses a stored enum column
pub(crate) fn parse_text<T>(value: &str) -> AppResult<T>
where
    T: FromStr<Err = InventoryError>,
{
    value
        .parse()
        .map_err(|e: InventoryError| AppError::Internal(format!("Corrupt row: {}", e)))
}

pub(crate) fn parse_opt<T>(value: Option<&str>) -> AppResult<Option<T>>
where
    T: FromStr<Err = InventoryError>,
{
    value.map(parse_text).transpose()
}

/// Rewrites an item from its purchase and sale history, returning the changed fields
pub type Revaluation =
    dyn Fn(&mut Item, &[Purchase], &[Sale]) -> AppResult<Vec<FieldChange>> + Send + Sync;

/// Item access needed by the inventory rebuilder
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn item_ids(&self) -> AppResult<Vec<Uuid>>;

    /// Applies `revalue` to the item and its history as one atomic step and persists the
    /// item when fields changed. `None` when the item does not exist.
    async fn revalue_item(
        &self,
        id: Uuid,
        revalue: Arc<Revaluation>,
    ) -> AppResult<Option<ItemRebuildResult>>;
}

/// Postgres ledger: each revaluation runs in a serializable transaction holding the item row lock
#[derive(Clone)]
pub struct PgInventoryLedger {
    pool: PgPool,
    retries: u32,
}

impl PgInventoryLedger {
    pub fn new(pool: PgPool, retries: u32) -> Self {
        Self { pool, retries }
    }
}

#[async_trait]
impl InventoryLedger for PgInventoryLedger {
    async fn item_ids(&self) -> AppResult<Vec<Uuid>> {
        items::ids(&self.pool).await
    }

    async fn revalue_item(
        &self,
        id: Uuid,
        revalue: Arc<Revaluation>,
    ) -> AppResult<Option<ItemRebuildResult>> {
        db::serializable(&self.pool, self.retries, move |conn| {
            let revalue = revalue.clone();
            Box::pin(async move {
                let Some(mut item) = items::try_lock(&mut *conn, id).await? else {
                    return Ok(None);
                };
                let purchases = purchases::containing_item(&mut *conn, id).await?;
                let sales = sales::containing_item(&mut *conn, id).await?;

                let changes = revalue(&mut item, &purchases, &sales)?;
                if !changes.is_empty() {
                    items::save_valuation(&mut *conn, &item).await?;
                }
                Ok(Some(ItemRebuildResult::new(&item, changes)))
            })
        })
        .await
    }
}
