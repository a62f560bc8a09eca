//! Recomputes item stock and landed cost from the purchase and sale history
//!
//! The rebuilder only talks to an [`InventoryLedger`], so it runs against Postgres in
//! production and against an in-memory ledger in tests. Each item is revalued as one
//! atomic step, so a purchase or sale committed during a run is never overwritten.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use shared::models::{Item, Purchase, Sale};
use shared::rebuild::{
    apply_valuation, recompute_valuation, FieldChange, ItemRebuildResult, PricePolicy,
    RebuildSummary,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::repositories::{InventoryLedger, PgInventoryLedger, Revaluation};

/// Inventory rebuilder
#[derive(Clone)]
pub struct InventoryRebuilder {
    ledger: Arc<dyn InventoryLedger>,
    batch_size: usize,
    policy: PricePolicy,
}

impl InventoryRebuilder {
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    pub fn new(ledger: Arc<dyn InventoryLedger>, batch_size: usize, policy: PricePolicy) -> Self {
        Self {
            ledger,
            batch_size: batch_size.max(1),
            policy,
        }
    }

    pub fn postgres(pool: PgPool, retries: u32, batch_size: usize, policy: PricePolicy) -> Self {
        Self::new(
            Arc::new(PgInventoryLedger::new(pool, retries)),
            batch_size,
            policy,
        )
    }

    /// Rebuilds every item, `batch_size` items at a time.
    ///
    /// A failing item is recorded in the summary and does not stop the run.
    pub async fn rebuild_all(&self) -> AppResult<RebuildSummary> {
        let ids = self.ledger.item_ids().await?;
        let revalue = self.revaluation();
        let mut summary = RebuildSummary::default();

        for batch in ids.chunks(self.batch_size) {
            let results = join_all(
                batch
                    .iter()
                    .map(|id| self.ledger.revalue_item(*id, revalue.clone())),
            )
            .await;

            for (id, result) in batch.iter().zip(results) {
                match result {
                    Ok(Some(outcome)) => summary.record(outcome),
                    Ok(None) => tracing::debug!("Item {} was deleted during the rebuild", id),
                    Err(e) => {
                        tracing::warn!("Failed to rebuild item {}: {}", id, e);
                        summary.record(ItemRebuildResult::failed(*id, e));
                    }
                }
            }
        }

        tracing::info!(
            "Inventory rebuild finished: {} processed, {} updated, {} errors",
            summary.processed,
            summary.updated,
            summary.errors
        );
        Ok(summary)
    }

    /// Rebuilds one item; 404 when it does not exist
    pub async fn rebuild_item(&self, id: Uuid) -> AppResult<ItemRebuildResult> {
        let outcome = self
            .ledger
            .revalue_item(id, self.revaluation())
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        tracing::info!(
            "Rebuilt inventory of item {} ({} changes)",
            outcome.sku,
            outcome.changes.len()
        );
        Ok(outcome)
    }

    fn revaluation(&self) -> Arc<Revaluation> {
        let policy = self.policy;
        Arc::new(move |item: &mut Item, purchases: &[Purchase], sales: &[Sale]| {
            revalue(item, purchases, sales, policy)
        })
    }
}

fn revalue(
    item: &mut Item,
    purchases: &[Purchase],
    sales: &[Sale],
    policy: PricePolicy,
) -> AppResult<Vec<FieldChange>> {
    let valuation = recompute_valuation(item, purchases, sales)?;
    if valuation.skipped_lines > 0 {
        tracing::warn!(
            "Item {} has {} lines not measured by {}, ignored",
            item.sku,
            valuation.skipped_lines,
            item.tracking_type
        );
    }
    Ok(apply_valuation(item, &valuation, policy, Utc::now()))
}
