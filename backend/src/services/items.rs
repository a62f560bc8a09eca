//! Item catalogue service: CRUD, component back-references, SKUs and images

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{
    AreaUnit, Component, Item, ItemSummary, ItemType, LengthUnit, Measurement,
    MeasurementFields, PackInfo, PriceType, Purchase, Sale, StockLevels, TrackingType,
    VolumeUnit, WeightUnit,
};
use shared::relationships::{component_ids, detach_derived, diff_components, link_product, unlink_product};
use shared::sequence::next_sku;
use shared::stock::affected_ids;
use shared::types::PaginatedResponse;
use shared::validation::{validate_item, validate_tracking_unit};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::images::{discard_image, store_image, ImageUpload};
use super::page_of;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::repositories::items::{self, ItemFilter};
use crate::repositories::{purchases, sales};
use crate::storage::Storage;

/// Item service
#[derive(Clone)]
pub struct ItemService {
    db: PgPool,
    retries: u32,
}

/// Query string of `GET /items`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub item_type: Option<ItemType>,
    pub tracking_type: Option<TrackingType>,
    pub search: Option<String>,
}

/// Input for creating an item. Without `sku` the next numeric SKU is assigned.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemInput {
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub item_type: ItemType,
    #[serde(default)]
    pub tracking_type: TrackingType,
    #[serde(flatten)]
    pub stock: StockLevels,
    pub weight_unit: Option<WeightUnit>,
    pub length_unit: Option<LengthUnit>,
    pub area_unit: Option<AreaUnit>,
    pub volume_unit: Option<VolumeUnit>,
    pub price: Decimal,
    #[serde(default)]
    pub price_type: PriceType,
    #[serde(default)]
    pub cost: Decimal,
    pub pack_info: Option<PackInfo>,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// Partial item update; absent fields are left alone, empty strings clear text fields
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemInput {
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub item_type: Option<ItemType>,
    pub tracking_type: Option<TrackingType>,
    pub quantity: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub length: Option<Decimal>,
    pub area: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub weight_unit: Option<WeightUnit>,
    pub length_unit: Option<LengthUnit>,
    pub area_unit: Option<AreaUnit>,
    pub volume_unit: Option<VolumeUnit>,
    pub price: Option<Decimal>,
    pub price_type: Option<PriceType>,
    pub cost: Option<Decimal>,
    pub pack_info: Option<PackInfo>,
    pub components: Option<Vec<Component>>,
}

pub(crate) fn clearable(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .filter_map(clearable)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

impl UpdateItemInput {
    fn apply(self, item: &mut Item) {
        if let Some(sku) = self.sku {
            item.sku = sku.trim().to_string();
        }
        if let Some(name) = self.name {
            item.name = name.trim().to_string();
        }
        if let Some(category) = self.category {
            item.category = clearable(category);
        }
        if let Some(description) = self.description {
            item.description = clearable(description);
        }
        if let Some(image_url) = self.image_url {
            item.image_url = clearable(image_url);
        }
        if let Some(tags) = self.tags {
            item.tags = clean_tags(tags);
        }
        if let Some(item_type) = self.item_type {
            item.item_type = item_type;
        }
        if let Some(tracking_type) = self.tracking_type {
            item.tracking_type = tracking_type;
        }

        let stock = [
            (TrackingType::Quantity, self.quantity),
            (TrackingType::Weight, self.weight),
            (TrackingType::Length, self.length),
            (TrackingType::Area, self.area),
            (TrackingType::Volume, self.volume),
        ];
        for (kind, value) in stock {
            if let Some(value) = value {
                item.stock.set(kind, value);
            }
        }

        if self.weight_unit.is_some() {
            item.weight_unit = self.weight_unit;
        }
        if self.length_unit.is_some() {
            item.length_unit = self.length_unit;
        }
        if self.area_unit.is_some() {
            item.area_unit = self.area_unit;
        }
        if self.volume_unit.is_some() {
            item.volume_unit = self.volume_unit;
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(price_type) = self.price_type {
            item.price_type = price_type;
        }
        if let Some(cost) = self.cost {
            item.cost = cost;
        }
        if self.pack_info.is_some() {
            item.pack_info = self.pack_info;
        }
        if let Some(components) = self.components {
            item.components = components;
        }
    }
}

/// Reference to another item, expanded when it exists
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedComponent {
    pub item_id: Uuid,
    pub item: Option<ItemSummary>,
    #[serde(flatten)]
    pub amount: MeasurementFields,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedDerivation {
    pub item_id: Uuid,
    pub item: Option<ItemSummary>,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReferences {
    pub components: Vec<PopulatedComponent>,
    pub used_in_products: Vec<ItemSummary>,
    pub derived_from: Option<PopulatedDerivation>,
    pub derived_items: Vec<PopulatedDerivation>,
}

/// `GET /items/:id?populate=true`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedItem {
    #[serde(flatten)]
    pub item: Item,
    pub references: ItemReferences,
}

/// Checks the stored figures and the unit of the tracked dimension
pub(crate) fn check_item(item: &Item) -> AppResult<()> {
    validate_item(item).map_err(|msg| AppError::ValidationError(msg.to_string()))?;
    validate_tracking_unit(item)
        .map_err(|msg| AppError::validation(format!("{}Unit", item.tracking_type), msg))?;
    if item.components.iter().any(|c| c.item == item.id) {
        return Err(AppError::validation(
            "components",
            "An item cannot be a component of itself",
        ));
    }
    Ok(())
}

impl ItemService {
    pub fn new(db: PgPool, retries: u32) -> Self {
        Self { db, retries }
    }

    /// List items with filters and pagination
    pub async fn list(&self, query: ItemListQuery) -> AppResult<PaginatedResponse<Item>> {
        let pagination = page_of(query.page, query.limit);
        let filter = ItemFilter {
            category: query.category,
            tag: query.tag,
            item_type: query.item_type,
            tracking_type: query.tracking_type,
            search: query.search,
        };
        let (data, total) =
            items::list(&self.db, &filter, pagination.offset(), pagination.per_page()).await?;
        Ok(PaginatedResponse::new(data, pagination, total))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Item> {
        items::get(&self.db, id).await
    }

    /// Item with every referenced item expanded to a summary
    pub async fn get_populated(&self, id: Uuid) -> AppResult<PopulatedItem> {
        let item = items::get(&self.db, id).await?;

        let referenced = affected_ids(
            item.components
                .iter()
                .map(|c| &c.item)
                .chain(&item.used_in_products)
                .chain(item.derived_from.iter().map(|d| &d.item))
                .chain(item.derived_items.iter().map(|d| &d.item)),
        );
        let related: BTreeMap<Uuid, ItemSummary> = items::find_many(&self.db, &referenced)
            .await?
            .iter()
            .map(|i| (i.id, ItemSummary::from(i)))
            .collect();
        let summary = |id: &Uuid| related.get(id).cloned();

        let references = ItemReferences {
            components: item
                .components
                .iter()
                .map(|c| PopulatedComponent {
                    item_id: c.item,
                    item: summary(&c.item),
                    amount: c.amount.clone(),
                })
                .collect(),
            used_in_products: item
                .used_in_products
                .iter()
                .filter_map(|id| summary(id))
                .collect(),
            derived_from: item.derived_from.as_ref().map(|d| PopulatedDerivation {
                item_id: d.item,
                item: summary(&d.item),
                measurement: d.measurement,
            }),
            derived_items: item
                .derived_items
                .iter()
                .map(|d| PopulatedDerivation {
                    item_id: d.item,
                    item: summary(&d.item),
                    measurement: d.measurement,
                })
                .collect(),
        };

        Ok(PopulatedItem { item, references })
    }

    /// Create an item and register it with its component materials
    pub async fn create(&self, input: CreateItemInput) -> AppResult<Item> {
        input.validate()?;

        let sku = match input.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(sku) => sku.to_string(),
            None => self.next_sku().await?,
        };

        let mut item = Item::new(sku, input.name.trim(), input.tracking_type);
        item.category = input.category.and_then(clearable);
        item.description = input.description.and_then(clearable);
        item.image_url = input.image_url.and_then(clearable);
        item.tags = clean_tags(input.tags);
        item.item_type = input.item_type;
        item.stock = input.stock;
        item.weight_unit = input.weight_unit;
        item.length_unit = input.length_unit;
        item.area_unit = input.area_unit;
        item.volume_unit = input.volume_unit;
        item.price = input.price;
        item.price_type = input.price_type;
        item.cost = input.cost;
        item.pack_info = input.pack_info;
        item.components = input.components;
        check_item(&item)?;

        let created = db::serializable(&self.db, self.retries, move |conn| {
            let item = item.clone();
            Box::pin(async move {
                let created = items::insert(&mut *conn, &item).await?;
                let materials: Vec<Uuid> = component_ids(&created.components).into_iter().collect();
                Self::relink(conn, created.id, &materials, &[]).await?;
                Ok(created)
            })
        })
        .await?;

        tracing::info!("Created item {} ({})", created.sku, created.id);
        Ok(created)
    }

    /// Patch an item, keeping material back-references in step with its components
    pub async fn update(&self, id: Uuid, input: UpdateItemInput) -> AppResult<Item> {
        input.validate()?;

        let updated = db::serializable(&self.db, self.retries, move |conn| {
            let input = input.clone();
            Box::pin(async move { Self::update_in_tx(conn, id, input).await })
        })
        .await?;

        tracing::info!("Updated item {} ({})", updated.sku, updated.id);
        Ok(updated)
    }

    async fn update_in_tx(
        conn: &mut PgConnection,
        id: Uuid,
        input: UpdateItemInput,
    ) -> AppResult<Item> {
        let mut item = items::lock(&mut *conn, id).await?;
        let old_components = item.components.clone();
        let old_tracking = item.tracking_type;

        input.apply(&mut item);
        check_item(&item)?;

        if item.tracking_type != old_tracking && Self::has_history(conn, id).await? {
            return Err(AppError::Conflict {
                resource: "trackingType".to_string(),
                message: "Tracking type cannot change once purchases or sales reference the item"
                    .to_string(),
            });
        }

        let now = Utc::now();
        item.last_updated = now;
        item.updated_at = now;
        let saved = items::update(&mut *conn, &item).await?;

        let diff = diff_components(&old_components, &saved.components);
        Self::relink(conn, id, &diff.added, &diff.removed).await?;
        Ok(saved)
    }

    /// Delete an unreferenced item and drop its own outbound links
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let deleted = db::serializable(&self.db, self.retries, move |conn| {
            Box::pin(async move { Self::delete_in_tx(conn, id).await })
        })
        .await?;

        tracing::info!("Deleted item {} ({})", deleted.sku, deleted.id);
        Ok(())
    }

    async fn delete_in_tx(conn: &mut PgConnection, id: Uuid) -> AppResult<Item> {
        let item = items::lock(&mut *conn, id).await?;

        if Self::has_history(conn, id).await? {
            return Err(AppError::Conflict {
                resource: "item".to_string(),
                message: "Item is referenced by purchases or sales".to_string(),
            });
        }

        let inbound = item.has_inbound_links()
            || !items::products_using(&mut *conn, id).await?.is_empty()
            || !items::derived_of(&mut *conn, id).await?.is_empty();
        if inbound {
            return Err(AppError::Conflict {
                resource: "item".to_string(),
                message: "Item is used by other items; remove those links first".to_string(),
            });
        }

        let materials: Vec<Uuid> = component_ids(&item.components).into_iter().collect();
        Self::relink(conn, id, &[], &materials).await?;

        if let Some(link) = &item.derived_from {
            let mut sources = items::lock_existing(&mut *conn, &[link.item]).await?;
            if let Some(source) = sources.get_mut(&link.item) {
                if detach_derived(source, id) {
                    items::update(&mut *conn, source).await?;
                }
            }
        }

        items::delete(&mut *conn, id).await?;
        Ok(item)
    }

    async fn has_history(conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        Ok(purchases::references_item(&mut *conn, id).await?
            || sales::references_item(&mut *conn, id).await?)
    }

    /// Applies a product's component change to the materials' `usedInProducts`.
    ///
    /// Materials that do not exist are skipped with a warning.
    pub(crate) async fn relink(
        conn: &mut PgConnection,
        product: Uuid,
        added: &[Uuid],
        removed: &[Uuid],
    ) -> AppResult<()> {
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }

        let touched = affected_ids(added.iter().chain(removed));
        let mut materials = items::lock_existing(&mut *conn, &touched).await?;

        for id in added {
            match materials.get_mut(id) {
                Some(material) => {
                    if link_product(material, product) {
                        items::save_used_in(&mut *conn, *id, &material.used_in_products).await?;
                    }
                }
                None => tracing::warn!(
                    "Component {} of product {} does not exist, skipping",
                    id,
                    product
                ),
            }
        }

        for id in removed {
            if let Some(material) = materials.get_mut(id) {
                if unlink_product(material, product) {
                    items::save_used_in(&mut *conn, *id, &material.used_in_products).await?;
                }
            }
        }
        Ok(())
    }

    /// Next free 10-digit numeric SKU (advisory)
    pub async fn next_sku(&self) -> AppResult<String> {
        let max = items::max_numeric_sku(&self.db).await?;
        Ok(next_sku(max.iter().map(String::as_str)))
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        items::categories(&self.db).await
    }

    pub async fn tags(&self) -> AppResult<Vec<String>> {
        items::tags(&self.db).await
    }

    /// Purchases containing the item, newest first
    pub async fn purchase_history(&self, id: Uuid) -> AppResult<Vec<Purchase>> {
        items::get(&self.db, id).await?;
        purchases::containing_item(&self.db, id).await
    }

    /// Sales containing the item, newest first
    pub async fn sale_history(&self, id: Uuid) -> AppResult<Vec<Sale>> {
        items::get(&self.db, id).await?;
        sales::containing_item(&self.db, id).await
    }

    /// Upload an image and point the item at it
    pub async fn set_image(
        &self,
        storage: &dyn Storage,
        prefix: &str,
        id: Uuid,
        upload: ImageUpload,
    ) -> AppResult<Item> {
        items::get(&self.db, id).await?;
        let image = store_image(storage, prefix, upload).await?;

        match items::set_image_url(&self.db, id, &image.url).await {
            Ok(item) => {
                tracing::info!("Updated image of item {}", id);
                Ok(item)
            }
            Err(e) => {
                discard_image(storage, &image).await;
                Err(e)
            }
        }
    }
}
