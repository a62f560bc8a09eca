//! Asset service: CRUD, maintenance log, retirement and straight-line depreciation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::models::{
    Asset, AssetStatus, MaintenanceFrequency, MaintenanceRecord, MaintenanceSchedule, NewAsset,
};
use shared::types::PaginatedResponse;
use shared::validation::validate_non_negative;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::images::{discard_image, store_image, ImageUpload};
use super::items::clearable;
use super::page_of;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::repositories::assets::{self, AssetFilter};
use crate::repositories::{items, purchases};
use crate::storage::Storage;

/// Asset service
#[derive(Clone)]
pub struct AssetService {
    db: PgPool,
    retries: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<AssetStatus>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub initial_cost: Decimal,
    /// Defaults to the initial cost
    pub current_value: Option<Decimal>,
    pub purchase_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub assigned_to: Option<String>,
    pub serial_number: Option<String>,
    pub maintenance_schedule: Option<MaintenanceSchedule>,
    pub notes: Option<String>,
}

/// Partial asset update; status only changes through `retire`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssetInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub initial_cost: Option<Decimal>,
    pub current_value: Option<Decimal>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub assigned_to: Option<String>,
    pub serial_number: Option<String>,
    pub maintenance_schedule: Option<MaintenanceSchedule>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceInput {
    pub date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 1000))]
    pub description: String,
    pub performed_by: Option<String>,
    #[serde(default)]
    pub cost: Decimal,
    pub frequency: Option<MaintenanceFrequency>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepreciateInput {
    pub useful_life_years: Decimal,
    pub salvage_value: Option<Decimal>,
    pub as_of: Option<DateTime<Utc>>,
}

fn check_money(field: &str, value: Decimal) -> AppResult<()> {
    validate_non_negative(value).map_err(|msg| AppError::validation(field, msg))
}

impl UpdateAssetInput {
    fn apply(self, asset: &mut Asset) {
        if let Some(name) = self.name {
            asset.name = name.trim().to_string();
        }
        if let Some(category) = self.category {
            asset.category = clearable(category);
        }
        if let Some(description) = self.description {
            asset.description = clearable(description);
        }
        if let Some(image_url) = self.image_url {
            asset.image_url = clearable(image_url);
        }
        if let Some(cost) = self.initial_cost {
            asset.initial_cost = cost;
        }
        if let Some(value) = self.current_value {
            asset.current_value = value;
        }
        if self.purchase_date.is_some() {
            asset.purchase_date = self.purchase_date;
        }
        if let Some(location) = self.location {
            asset.location = clearable(location);
        }
        if let Some(assigned_to) = self.assigned_to {
            asset.assigned_to = clearable(assigned_to);
        }
        if let Some(serial) = self.serial_number {
            asset.serial_number = clearable(serial);
        }
        if self.maintenance_schedule.is_some() {
            asset.maintenance_schedule = self.maintenance_schedule;
        }
        if let Some(notes) = self.notes {
            asset.notes = clearable(notes);
        }
    }
}

impl AssetService {
    pub fn new(db: PgPool, retries: u32) -> Self {
        Self { db, retries }
    }

    pub async fn list(&self, query: AssetListQuery) -> AppResult<PaginatedResponse<Asset>> {
        let pagination = page_of(query.page, query.limit);
        let filter = AssetFilter {
            status: query.status,
            category: query.category.and_then(clearable),
        };
        let (data, total) =
            assets::list(&self.db, &filter, pagination.offset(), pagination.per_page()).await?;
        Ok(PaginatedResponse::new(data, pagination, total))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Asset> {
        assets::get(&self.db, id).await
    }

    pub async fn create(&self, input: CreateAssetInput) -> AppResult<Asset> {
        input.validate()?;
        check_money("initialCost", input.initial_cost)?;
        let current_value = input.current_value.unwrap_or(input.initial_cost);
        check_money("currentValue", current_value)?;

        if let Some(item_id) = input.item_id {
            items::get(&self.db, item_id).await?;
        }
        if let Some(purchase_id) = input.purchase_id {
            purchases::get(&self.db, purchase_id).await?;
        }

        let asset = NewAsset {
            business_id: None,
            name: input.name.trim().to_string(),
            category: input.category.and_then(clearable),
            description: input.description.and_then(clearable),
            image_url: input.image_url.and_then(clearable),
            initial_cost: input.initial_cost,
            current_value,
            purchase_id: input.purchase_id,
            item_id: input.item_id,
            purchase_date: input.purchase_date,
            status: AssetStatus::Active,
            location: input.location.and_then(clearable),
            assigned_to: input.assigned_to.and_then(clearable),
            serial_number: input.serial_number.and_then(clearable),
            maintenance_schedule: input.maintenance_schedule,
            notes: input.notes.and_then(clearable),
        };

        let created = assets::insert(&self.db, &asset).await?;
        tracing::info!("Created asset {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, input: UpdateAssetInput) -> AppResult<Asset> {
        input.validate()?;
        if let Some(cost) = input.initial_cost {
            check_money("initialCost", cost)?;
        }
        if let Some(value) = input.current_value {
            check_money("currentValue", value)?;
        }

        let updated = self
            .modify(id, move |asset| {
                input.clone().apply(asset);
                Ok(())
            })
            .await?;

        tracing::info!("Updated asset {} ({})", updated.name, updated.id);
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !assets::delete(&self.db, id).await? {
            return Err(AppError::NotFound("Asset".to_string()));
        }
        tracing::info!("Deleted asset {}", id);
        Ok(())
    }

    /// Log maintenance and advance the schedule
    pub async fn record_maintenance(&self, id: Uuid, input: MaintenanceInput) -> AppResult<Asset> {
        input.validate()?;
        let record = MaintenanceRecord {
            date: input.date.unwrap_or_else(Utc::now),
            description: input.description.trim().to_string(),
            performed_by: input.performed_by.and_then(clearable),
            cost: input.cost,
            frequency: input.frequency,
        };

        let updated = self
            .modify(id, move |asset| Ok(asset.record_maintenance(record.clone())?))
            .await?;

        tracing::info!(
            "Recorded maintenance on asset {} (next due {:?})",
            updated.id,
            updated
                .maintenance_schedule
                .as_ref()
                .and_then(|s| s.next_maintenance)
        );
        Ok(updated)
    }

    pub async fn retire(&self, id: Uuid) -> AppResult<Asset> {
        let retired = self.modify(id, |asset| Ok(asset.retire()?)).await?;
        tracing::info!("Retired asset {}", retired.id);
        Ok(retired)
    }

    /// Straight-line depreciation as of `asOf` (default now)
    pub async fn depreciate(&self, id: Uuid, input: DepreciateInput) -> AppResult<Asset> {
        let salvage = input.salvage_value.unwrap_or(Decimal::ZERO);
        let as_of = input.as_of.unwrap_or_else(Utc::now);
        let years = input.useful_life_years;

        let updated = self
            .modify(id, move |asset| {
                asset.depreciate(years, salvage, as_of)?;
                Ok(())
            })
            .await?;

        tracing::info!(
            "Depreciated asset {} to {}",
            updated.id,
            updated.current_value
        );
        Ok(updated)
    }

    /// Upload an image and point the asset at it
    pub async fn set_image(
        &self,
        storage: &dyn Storage,
        prefix: &str,
        id: Uuid,
        upload: ImageUpload,
    ) -> AppResult<Asset> {
        assets::get(&self.db, id).await?;
        let image = store_image(storage, prefix, upload).await?;

        let url = image.url.clone();
        let result = self
            .modify(id, move |asset| {
                asset.image_url = Some(url.clone());
                Ok(())
            })
            .await;

        match result {
            Ok(asset) => {
                tracing::info!("Updated image of asset {}", id);
                Ok(asset)
            }
            Err(e) => {
                discard_image(storage, &image).await;
                Err(e)
            }
        }
    }

    /// Locks the asset, applies `change` and writes it back in one transaction
    async fn modify<F>(&self, id: Uuid, change: F) -> AppResult<Asset>
    where
        F: Fn(&mut Asset) -> AppResult<()> + Clone + Send + Sync + 'static,
    {
        db::serializable(&self.db, self.retries, move |conn| {
            let change = change.clone();
            Box::pin(async move { Self::modify_in_tx(conn, id, change).await })
        })
        .await
    }

    async fn modify_in_tx<F>(conn: &mut PgConnection, id: Uuid, change: F) -> AppResult<Asset>
    where
        F: Fn(&mut Asset) -> AppResult<()> + Send,
    {
        let mut asset = assets::lock(&mut *conn, id).await?;
        change(&mut asset)?;
        asset.updated_at = Utc::now();
        assets::update(&mut *conn, &asset).await
    }
}
