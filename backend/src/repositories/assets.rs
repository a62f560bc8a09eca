//! Asset persistence

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{Asset, AssetStatus, MaintenanceRecord, MaintenanceSchedule, NewAsset};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::parse_text;
use crate::error::{AppError, AppResult};

const ASSET_COLUMNS: &str = r#"
    id, business_id, name, category, description, image_url, initial_cost,
    current_value, purchase_id, item_id, purchase_date, status, location,
    assigned_to, serial_number, maintenance_schedule, maintenance_history, notes,
    created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct AssetRow {
    id: Uuid,
    business_id: Option<Uuid>,
    name: String,
    category: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    initial_cost: Decimal,
    current_value: Decimal,
    purchase_id: Option<Uuid>,
    item_id: Option<Uuid>,
    purchase_date: Option<DateTime<Utc>>,
    status: String,
    location: Option<String>,
    assigned_to: Option<String>,
    serial_number: Option<String>,
    maintenance_schedule: Option<Json<MaintenanceSchedule>>,
    maintenance_history: Json<Vec<MaintenanceRecord>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = AppError;

    fn try_from(row: AssetRow) -> AppResult<Self> {
        Ok(Asset {
            id: row.id,
            business_id: row.business_id,
            name: row.name,
            category: row.category,
            description: row.description,
            image_url: row.image_url,
            initial_cost: row.initial_cost,
            current_value: row.current_value,
            purchase_id: row.purchase_id,
            item_id: row.item_id,
            purchase_date: row.purchase_date,
            status: parse_text(&row.status)?,
            location: row.location,
            assigned_to: row.assigned_to,
            serial_number: row.serial_number,
            maintenance_schedule: row.maintenance_schedule.map(|j| j.0),
            maintenance_history: row.maintenance_history.0,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_assets(rows: Vec<AssetRow>) -> AppResult<Vec<Asset>> {
    rows.into_iter().map(Asset::try_from).collect()
}

#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub status: Option<AssetStatus>,
    pub category: Option<String>,
}

pub async fn find<'e, E>(executor: E, id: Uuid) -> AppResult<Option<Asset>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM assets WHERE id = $1", ASSET_COLUMNS);
    sqlx::query_as::<_, AssetRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Asset::try_from)
        .transpose()
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> AppResult<Asset>
where
    E: Executor<'e, Database = Postgres>,
{
    find(executor, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Asset".to_string()))
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> AppResult<Asset> {
    let sql = format!("SELECT {} FROM assets WHERE id = $1 FOR UPDATE", ASSET_COLUMNS);
    sqlx::query_as::<_, AssetRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Asset::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound("Asset".to_string()))
}

pub async fn insert<'e, E>(executor: E, asset: &NewAsset) -> AppResult<Asset>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        INSERT INTO assets (
            business_id, name, category, description, image_url, initial_cost,
            current_value, purchase_id, item_id, purchase_date, status, location,
            assigned_to, serial_number, maintenance_schedule, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING {}
        "#,
        ASSET_COLUMNS
    );
    let row = sqlx::query_as::<_, AssetRow>(&sql)
        .bind(asset.business_id)
        .bind(&asset.name)
        .bind(&asset.category)
        .bind(&asset.description)
        .bind(&asset.image_url)
        .bind(asset.initial_cost)
        .bind(asset.current_value)
        .bind(asset.purchase_id)
        .bind(asset.item_id)
        .bind(asset.purchase_date)
        .bind(asset.status.as_str())
        .bind(&asset.location)
        .bind(&asset.assigned_to)
        .bind(&asset.serial_number)
        .bind(asset.maintenance_schedule.as_ref().map(Json))
        .bind(&asset.notes)
        .fetch_one(executor)
        .await?;
    Asset::try_from(row)
}

pub async fn update<'e, E>(executor: E, asset: &Asset) -> AppResult<Asset>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        UPDATE assets SET
            name = $2, category = $3, description = $4, image_url = $5,
            initial_cost = $6, current_value = $7, purchase_date = $8, status = $9,
            location = $10, assigned_to = $11, serial_number = $12,
            maintenance_schedule = $13, maintenance_history = $14, notes = $15,
            updated_at = $16
        WHERE id = $1
        RETURNING {}
        "#,
        ASSET_COLUMNS
    );
    let row = sqlx::query_as::<_, AssetRow>(&sql)
        .bind(asset.id)
        .bind(&asset.name)
        .bind(&asset.category)
        .bind(&asset.description)
        .bind(&asset.image_url)
        .bind(asset.initial_cost)
        .bind(asset.current_value)
        .bind(asset.purchase_date)
        .bind(asset.status.as_str())
        .bind(&asset.location)
        .bind(&asset.assigned_to)
        .bind(&asset.serial_number)
        .bind(asset.maintenance_schedule.as_ref().map(Json))
        .bind(Json(&asset.maintenance_history))
        .bind(&asset.notes)
        .bind(asset.updated_at)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Asset".to_string()))?;
    Asset::try_from(row)
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM assets WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list(
    pool: &PgPool,
    filter: &AssetFilter,
    offset: i64,
    limit: i64,
) -> AppResult<(Vec<Asset>, u64)> {
    const WHERE: &str = r#"
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR category = $2)
    "#;
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM assets {}", WHERE))
        .bind(status)
        .bind(&filter.category)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM assets {} ORDER BY created_at DESC, id OFFSET $3 LIMIT $4",
        ASSET_COLUMNS, WHERE
    );
    let rows = sqlx::query_as::<_, AssetRow>(&sql)
        .bind(status)
        .bind(&filter.category)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok((into_assets(rows)?, total.max(0) as u64))
}

/// Assets materialized from one purchase
pub async fn by_purchase<'e, E>(executor: E, purchase_id: Uuid) -> AppResult<Vec<Asset>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM assets WHERE purchase_id = $1 ORDER BY created_at, id",
        ASSET_COLUMNS
    );
    let rows = sqlx::query_as::<_, AssetRow>(&sql)
        .bind(purchase_id)
        .fetch_all(executor)
        .await?;
    into_assets(rows)
}

pub async fn all<'e, E>(executor: E) -> AppResult<Vec<Asset>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM assets ORDER BY category, name", ASSET_COLUMNS);
    let rows = sqlx::query_as::<_, AssetRow>(&sql)
        .fetch_all(executor)
        .await?;
    into_assets(rows)
}
