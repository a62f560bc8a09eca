//! Breakdown into derived items, link diagnostics and the `usedInProducts` rebuild

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::models::{Component, DerivedFrom, DerivedItemLink, Item, ItemSummary};
use shared::relationships::{
    attach_derived, breakdown_measurement, detach_derived, find_asymmetries, project_used_in,
    Asymmetry, DerivedEntry, RelationshipRebuild,
};
use shared::stock::affected_ids;
use shared::InventoryError;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::items::check_item;
use crate::db;
use crate::error::AppResult;
use crate::repositories::items;

#[derive(Clone)]
pub struct RelationshipService {
    db: PgPool,
    retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownInput {
    pub derived_items: Vec<DerivedEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownResult {
    pub source: Item,
    pub derived_items: Vec<Item>,
}

/// `GET /items/:id/relationships`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDiagnostics {
    pub item: ItemSummary,
    pub components: Vec<Component>,
    pub used_in_products: Vec<Uuid>,
    pub derived_from: Option<DerivedFrom>,
    pub derived_items: Vec<DerivedItemLink>,
    /// Products whose components actually reference the item
    pub referenced_by_products: Vec<ItemSummary>,
    pub asymmetries: Vec<Asymmetry>,
}

impl RelationshipService {
    pub fn new(db: PgPool, retries: u32) -> Self {
        Self { db, retries }
    }

    /// Creates or links derived items under `source_id`.
    ///
    /// Stock is not moved from the source to the derived items.
    pub async fn breakdown(&self, source_id: Uuid, input: BreakdownInput) -> AppResult<BreakdownResult> {
        if input.derived_items.is_empty() {
            return Err(InventoryError::InvalidBreakdown(
                "at least one derived item is required".to_string(),
            )
            .into());
        }
        for entry in &input.derived_items {
            entry.new_item_fields()?;
        }

        let result = db::serializable(&self.db, self.retries, move |conn| {
            let entries = input.derived_items.clone();
            Box::pin(async move { Self::breakdown_in_tx(conn, source_id, entries).await })
        })
        .await?;

        tracing::info!(
            "Broke item {} down into {} derived items",
            source_id,
            result.derived_items.len()
        );
        Ok(result)
    }

    async fn breakdown_in_tx(
        conn: &mut PgConnection,
        source_id: Uuid,
        entries: Vec<DerivedEntry>,
    ) -> AppResult<BreakdownResult> {
        let mut source = items::lock(&mut *conn, source_id).await?;
        let now = Utc::now();
        let mut derived_items = Vec::with_capacity(entries.len());

        for entry in entries {
            let measurement = breakdown_measurement(&source, &entry.amount)?;

            let derived = match entry.item_id {
                Some(id) => {
                    let mut derived = items::lock(&mut *conn, id).await?;
                    let previous = attach_derived(&mut source, &mut derived, measurement)?;
                    if let Some(previous) = previous {
                        let mut old_sources = items::lock_existing(&mut *conn, &[previous]).await?;
                        if let Some(old_source) = old_sources.get_mut(&previous) {
                            if detach_derived(old_source, id) {
                                items::update(&mut *conn, old_source).await?;
                            }
                        }
                    }
                    derived.updated_at = now;
                    items::update(&mut *conn, &derived).await?
                }
                None => {
                    let (name, sku) = entry
                        .new_item_fields()?
                        .map(|(name, sku)| (name.trim().to_string(), sku.trim().to_string()))
                        .ok_or_else(|| {
                            InventoryError::InvalidBreakdown("name and sku are required".to_string())
                        })?;

                    let mut derived = Item::new(sku, name, source.tracking_type);
                    derived.business_id = source.business_id;
                    derived.item_type = source.item_type;
                    derived.category = entry.category.clone().or_else(|| source.category.clone());
                    derived.description = entry.description.clone();
                    derived.weight_unit = source.weight_unit;
                    derived.length_unit = source.length_unit;
                    derived.area_unit = source.area_unit;
                    derived.volume_unit = source.volume_unit;
                    derived.price_type = source.price_type;
                    attach_derived(&mut source, &mut derived, measurement)?;
                    check_item(&derived)?;
                    items::insert(&mut *conn, &derived).await?
                }
            };
            derived_items.push(derived);
        }

        source.updated_at = now;
        let source = items::update(&mut *conn, &source).await?;
        Ok(BreakdownResult {
            source,
            derived_items,
        })
    }

    /// Items whose `derivedFrom` points at the item
    pub async fn derived(&self, id: Uuid) -> AppResult<Vec<Item>> {
        items::get(&self.db, id).await?;
        items::derived_of(&self.db, id).await
    }

    /// The item's source, 404 when it was not derived from anything
    pub async fn parent(&self, id: Uuid) -> AppResult<Item> {
        let item = items::get(&self.db, id).await?;
        match item.derived_from {
            Some(link) => items::get(&self.db, link.item).await,
            None => Err(crate::error::AppError::NotFound("Parent item".to_string())),
        }
    }

    pub async fn diagnostics(&self, id: Uuid) -> AppResult<RelationshipDiagnostics> {
        let item = items::get(&self.db, id).await?;
        let products = items::products_using(&self.db, id).await?;
        let derived = items::derived_of(&self.db, id).await?;

        let neighbour_ids = affected_ids(
            item.components
                .iter()
                .map(|c| &c.item)
                .chain(&item.used_in_products)
                .chain(item.derived_from.iter().map(|d| &d.item))
                .chain(item.derived_items.iter().map(|d| &d.item))
                .chain(products.iter().map(|p| &p.id))
                .chain(derived.iter().map(|d| &d.id))
                .filter(|other| **other != id),
        );
        let mut graph = items::find_many(&self.db, &neighbour_ids).await?;
        graph.push(item.clone());

        let asymmetries = find_asymmetries(&graph)
            .into_iter()
            .filter(|a| a.involves(id))
            .collect();

        Ok(RelationshipDiagnostics {
            item: ItemSummary::from(&item),
            components: item.components,
            used_in_products: item.used_in_products,
            derived_from: item.derived_from,
            derived_items: item.derived_items,
            referenced_by_products: products.iter().map(ItemSummary::from).collect(),
            asymmetries,
        })
    }

    /// Clears and re-derives every `usedInProducts` list from product components
    pub async fn rebuild_used_in(&self) -> AppResult<RelationshipRebuild> {
        let report = db::serializable(&self.db, self.retries, |conn| {
            Box::pin(async move { Self::rebuild_in_tx(conn).await })
        })
        .await?;

        tracing::info!(
            "Rebuilt relationships: {} products processed, {} materials updated",
            report.products_processed,
            report.materials_updated
        );
        Ok(report)
    }

    async fn rebuild_in_tx(conn: &mut PgConnection) -> AppResult<RelationshipRebuild> {
        let mut all = items::all(&mut *conn).await?;
        let before: Vec<Vec<Uuid>> = all.iter().map(|i| i.used_in_products.clone()).collect();

        let (report, missing) = project_used_in(&mut all);
        for (product, material) in missing {
            tracing::warn!(
                "Product {} lists missing component {}, skipping",
                product,
                material
            );
        }

        for (item, old) in all.iter().zip(before) {
            if item.used_in_products != old {
                items::save_used_in(&mut *conn, item.id, &item.used_in_products).await?;
            }
        }
        Ok(report)
    }
}
