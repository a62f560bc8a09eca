//! Business logic services for the inventory tracker

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use shared::stock::ItemIndex;
use shared::types::{Pagination, DEFAULT_PAGE_SIZE};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppResult;
use crate::repositories;

pub mod assets;
pub mod images;
pub mod inventory_rebuild;
pub mod items;
pub mod purchases;
pub mod relationships;
pub mod reporting;
pub mod sales;

pub use assets::AssetService;
pub use inventory_rebuild::InventoryRebuilder;
pub use items::ItemService;
pub use purchases::PurchaseService;
pub use relationships::RelationshipService;
pub use reporting::ReportingService;
pub use sales::SaleService;

/// Normalized pagination from optional `page`/`limit` query values
pub(crate) fn page_of(page: Option<u32>, limit: Option<u32>) -> Pagination {
    Pagination {
        page: page.unwrap_or(1),
        limit: limit.unwrap_or(DEFAULT_PAGE_SIZE),
    }
    .normalized()
}

/// Stamps and writes back the locked items a document mutation changed
pub(crate) async fn save_touched(
    conn: &mut PgConnection,
    index: &mut ItemIndex,
    touched: &BTreeSet<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    for id in touched {
        if let Some(item) = index.get_mut(id) {
            item.last_updated = now;
            item.updated_at = now;
            repositories::items::update(&mut *conn, item).await?;
        }
    }
    Ok(())
}
