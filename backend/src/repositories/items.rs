//! Item persistence

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{
    Component, DerivedFrom, DerivedItemLink, Item, ItemType, PackInfo, StockLevels, TrackingType,
};
use shared::stock::ItemIndex;
use sqlx::types::Json;
use sqlx::{Executor, FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::{parse_opt, parse_text};
use crate::error::{AppError, AppResult};

const ITEM_COLUMNS: &str = r#"
    id, business_id, sku, name, category, description, image_url, tags,
    item_type, tracking_type, quantity, weight, length, area, volume,
    weight_unit, length_unit, area_unit, volume_unit, price, price_type, cost,
    pack_info, components, used_in_products, derived_from, derived_items,
    last_updated, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    business_id: Option<Uuid>,
    sku: String,
    name: String,
    category: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    tags: Vec<String>,
    item_type: String,
    tracking_type: String,
    quantity: Decimal,
    weight: Decimal,
    length: Decimal,
    area: Decimal,
    volume: Decimal,
    weight_unit: Option<String>,
    length_unit: Option<String>,
    area_unit: Option<String>,
    volume_unit: Option<String>,
    price: Decimal,
    price_type: String,
    cost: Decimal,
    pack_info: Option<Json<PackInfo>>,
    components: Json<Vec<Component>>,
    used_in_products: Vec<Uuid>,
    derived_from: Option<Json<DerivedFrom>>,
    derived_items: Json<Vec<DerivedItemLink>>,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = AppError;

    fn try_from(row: ItemRow) -> AppResult<Self> {
        Ok(Item {
            id: row.id,
            business_id: row.business_id,
            sku: row.sku,
            name: row.name,
            category: row.category,
            description: row.description,
            image_url: row.image_url,
            tags: row.tags,
            item_type: parse_text(&row.item_type)?,
            tracking_type: parse_text(&row.tracking_type)?,
            stock: StockLevels {
                quantity: row.quantity,
                weight: row.weight,
                length: row.length,
                area: row.area,
                volume: row.volume,
            },
            weight_unit: parse_opt(row.weight_unit.as_deref())?,
            length_unit: parse_opt(row.length_unit.as_deref())?,
            area_unit: parse_opt(row.area_unit.as_deref())?,
            volume_unit: parse_opt(row.volume_unit.as_deref())?,
            price: row.price,
            price_type: parse_text(&row.price_type)?,
            cost: row.cost,
            pack_info: row.pack_info.map(|j| j.0),
            components: row.components.0,
            used_in_products: row.used_in_products,
            derived_from: row.derived_from.map(|j| j.0),
            derived_items: row.derived_items.0,
            last_updated: row.last_updated,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_items(rows: Vec<ItemRow>) -> AppResult<Vec<Item>> {
    rows.into_iter().map(Item::try_from).collect()
}

/// Filters for the item listing
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub item_type: Option<ItemType>,
    pub tracking_type: Option<TrackingType>,
    pub search: Option<String>,
}

pub async fn find<'e, E>(executor: E, id: Uuid) -> AppResult<Option<Item>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS);
    sqlx::query_as::<_, ItemRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Item::try_from)
        .transpose()
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> AppResult<Item>
where
    E: Executor<'e, Database = Postgres>,
{
    find(executor, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))
}

pub async fn find_many<'e, E>(executor: E, ids: &[Uuid]) -> AppResult<Vec<Item>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM items WHERE id = ANY($1) ORDER BY id", ITEM_COLUMNS);
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(ids)
        .fetch_all(executor)
        .await?;
    into_items(rows)
}

/// Locks one item row for the rest of the transaction, `None` when it does not exist
pub async fn try_lock(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Item>> {
    let sql = format!("SELECT {} FROM items WHERE id = $1 FOR UPDATE", ITEM_COLUMNS);
    sqlx::query_as::<_, ItemRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Item::try_from)
        .transpose()
}

/// Locks one item row for the rest of the transaction
pub async fn lock(conn: &mut PgConnection, id: Uuid) -> AppResult<Item> {
    try_lock(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))
}

/// Locks the given rows in ascending id order; every id must exist
pub async fn lock_many(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<ItemIndex> {
    let sql = format!(
        "SELECT {} FROM items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    let index: ItemIndex = into_items(rows)?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();
    if let Some(missing) = ids.iter().find(|id| !index.contains_key(id)) {
        return Err(AppError::NotFound(format!("Item {}", missing)));
    }
    Ok(index)
}

/// Like [`lock_many`] but silently skips ids that no longer exist
pub async fn lock_existing(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<ItemIndex> {
    let sql = format!(
        "SELECT {} FROM items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    Ok(into_items(rows)?
        .into_iter()
        .map(|item| (item.id, item))
        .collect())
}

pub async fn insert<'e, E>(executor: E, item: &Item) -> AppResult<Item>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        INSERT INTO items (
            id, business_id, sku, name, category, description, image_url, tags,
            item_type, tracking_type, quantity, weight, length, area, volume,
            weight_unit, length_unit, area_unit, volume_unit, price, price_type, cost,
            pack_info, components, used_in_products, derived_from, derived_items,
            last_updated, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );
    let row = bind_item(sqlx::query_as::<_, ItemRow>(&sql), item)
        .fetch_one(executor)
        .await?;
    Item::try_from(row)
}

/// Writes every column of an existing item
pub async fn update<'e, E>(executor: E, item: &Item) -> AppResult<Item>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        UPDATE items SET
            business_id = $2, sku = $3, name = $4, category = $5, description = $6,
            image_url = $7, tags = $8, item_type = $9, tracking_type = $10,
            quantity = $11, weight = $12, length = $13, area = $14, volume = $15,
            weight_unit = $16, length_unit = $17, area_unit = $18, volume_unit = $19,
            price = $20, price_type = $21, cost = $22, pack_info = $23, components = $24,
            used_in_products = $25, derived_from = $26, derived_items = $27,
            last_updated = $28, created_at = $29, updated_at = $30
        WHERE id = $1
        RETURNING {}
        "#,
        ITEM_COLUMNS
    );
    let row = bind_item(sqlx::query_as::<_, ItemRow>(&sql), item)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
    Item::try_from(row)
}

type ItemQuery<'q> = sqlx::query::QueryAs<'q, Postgres, ItemRow, sqlx::postgres::PgArguments>;

fn bind_item<'q>(query: ItemQuery<'q>, item: &'q Item) -> ItemQuery<'q> {
    query
        .bind(item.id)
        .bind(item.business_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.category)
        .bind(&item.description)
        .bind(&item.image_url)
        .bind(&item.tags)
        .bind(item.item_type.as_str())
        .bind(item.tracking_type.as_str())
        .bind(item.stock.quantity)
        .bind(item.stock.weight)
        .bind(item.stock.length)
        .bind(item.stock.area)
        .bind(item.stock.volume)
        .bind(item.weight_unit.map(|u| u.as_str()))
        .bind(item.length_unit.map(|u| u.as_str()))
        .bind(item.area_unit.map(|u| u.as_str()))
        .bind(item.volume_unit.map(|u| u.as_str()))
        .bind(item.price)
        .bind(item.price_type.as_str())
        .bind(item.cost)
        .bind(item.pack_info.as_ref().map(Json))
        .bind(Json(&item.components))
        .bind(&item.used_in_products)
        .bind(item.derived_from.as_ref().map(Json))
        .bind(Json(&item.derived_items))
        .bind(item.last_updated)
        .bind(item.created_at)
        .bind(item.updated_at)
}

/// Writes only what the inventory rebuild recomputes
pub async fn save_valuation<'e, E>(executor: E, item: &Item) -> AppResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE items SET
            quantity = $2, weight = $3, length = $4, area = $5, volume = $6,
            cost = $7, price = $8, pack_info = $9, last_updated = $10, updated_at = $11
        WHERE id = $1
        "#,
    )
    .bind(item.id)
    .bind(item.stock.quantity)
    .bind(item.stock.weight)
    .bind(item.stock.length)
    .bind(item.stock.area)
    .bind(item.stock.volume)
    .bind(item.cost)
    .bind(item.price)
    .bind(item.pack_info.as_ref().map(Json))
    .bind(item.last_updated)
    .bind(item.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Writes the back-reference list of one material
pub async fn save_used_in<'e, E>(executor: E, id: Uuid, used_in: &[Uuid]) -> AppResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE items SET used_in_products = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(used_in)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM items WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Filtered page of items plus the total match count
pub async fn list(
    pool: &PgPool,
    filter: &ItemFilter,
    offset: i64,
    limit: i64,
) -> AppResult<(Vec<Item>, u64)> {
    const WHERE: &str = r#"
        WHERE ($1::text IS NULL OR category = $1)
          AND ($2::text IS NULL OR $2 = ANY(tags))
          AND ($3::text IS NULL OR item_type = $3)
          AND ($4::text IS NULL OR tracking_type = $4)
          AND ($5::text IS NULL OR name ILIKE '%' || $5 || '%' OR sku ILIKE '%' || $5 || '%')
    "#;

    let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let item_type = filter.item_type.map(|t| t.as_str());
    let tracking_type = filter.tracking_type.map(|t| t.as_str());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM items {}", WHERE))
        .bind(&filter.category)
        .bind(&filter.tag)
        .bind(item_type)
        .bind(tracking_type)
        .bind(search)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM items {} ORDER BY name ASC, id ASC OFFSET $6 LIMIT $7",
        ITEM_COLUMNS, WHERE
    );
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(&filter.category)
        .bind(&filter.tag)
        .bind(item_type)
        .bind(tracking_type)
        .bind(search)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok((into_items(rows)?, total.max(0) as u64))
}

pub async fn all<'e, E>(executor: E) -> AppResult<Vec<Item>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS);
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .fetch_all(executor)
        .await?;
    into_items(rows)
}

/// Every item id, ascending
pub async fn ids<'e, E>(executor: E) -> AppResult<Vec<Uuid>>
where
    E: Executor<'e, Database = Postgres>,
{
    let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM items ORDER BY id")
        .fetch_all(executor)
        .await?;
    Ok(ids)
}

/// Numerically largest purely numeric SKU, if any
pub async fn max_numeric_sku<'e, E>(executor: E) -> AppResult<Option<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sku = sqlx::query_scalar::<_, String>(
        r#"
        SELECT sku FROM items
        WHERE sku ~ '^[0-9]+$'
        ORDER BY length(ltrim(sku, '0')) DESC, ltrim(sku, '0') DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await?;
    Ok(sku)
}

pub async fn categories<'e, E>(executor: E) -> AppResult<Vec<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    let categories = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT category FROM items
        WHERE category IS NOT NULL AND btrim(category) <> ''
        ORDER BY category
        "#,
    )
    .fetch_all(executor)
    .await?;
    Ok(categories)
}

pub async fn tags<'e, E>(executor: E) -> AppResult<Vec<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    let tags = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT tag FROM items, unnest(tags) AS tag
        WHERE btrim(tag) <> ''
        ORDER BY tag
        "#,
    )
    .fetch_all(executor)
    .await?;
    Ok(tags)
}

/// Products whose components reference `material_id`
pub async fn products_using<'e, E>(executor: E, material_id: Uuid) -> AppResult<Vec<Item>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        SELECT {} FROM items
        WHERE components @> jsonb_build_array(jsonb_build_object('item', $1::text))
        ORDER BY id
        "#,
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(material_id.to_string())
        .fetch_all(executor)
        .await?;
    into_items(rows)
}

/// Items whose `derivedFrom` points at `source_id`
pub async fn derived_of<'e, E>(executor: E, source_id: Uuid) -> AppResult<Vec<Item>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM items WHERE derived_from ->> 'item' = $1 ORDER BY name, id",
        ITEM_COLUMNS
    );
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(source_id.to_string())
        .fetch_all(executor)
        .await?;
    into_items(rows)
}

pub async fn set_image_url<'e, E>(executor: E, id: Uuid, image_url: &str) -> AppResult<Item>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        "UPDATE items SET image_url = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        ITEM_COLUMNS
    );
    let row = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(id)
        .bind(image_url)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
    Item::try_from(row)
}
