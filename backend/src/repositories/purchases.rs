//! Purchase persistence

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{Purchase, PurchaseLineItem, PurchaseStatus, Supplier};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::parse_text;
use crate::error::{AppError, AppResult};

const PURCHASE_COLUMNS: &str = r#"
    id, business_id, supplier, items, invoice_number, purchase_date, subtotal,
    discount_amount, tax_rate, tax_amount, shipping_cost, total, notes,
    payment_method, status, received_at, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: Uuid,
    business_id: Option<Uuid>,
    supplier: Json<Supplier>,
    items: Json<Vec<PurchaseLineItem>>,
    invoice_number: Option<String>,
    purchase_date: DateTime<Utc>,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    notes: Option<String>,
    payment_method: String,
    status: String,
    received_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = AppError;

    fn try_from(row: PurchaseRow) -> AppResult<Self> {
        Ok(Purchase {
            id: row.id,
            business_id: row.business_id,
            supplier: row.supplier.0,
            items: row.items.0,
            invoice_number: row.invoice_number,
            purchase_date: row.purchase_date,
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            tax_rate: row.tax_rate,
            tax_amount: row.tax_amount,
            shipping_cost: row.shipping_cost,
            total: row.total,
            notes: row.notes,
            payment_method: parse_text(&row.payment_method)?,
            status: parse_text(&row.status)?,
            received_at: row.received_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_purchases(rows: Vec<PurchaseRow>) -> AppResult<Vec<Purchase>> {
    rows.into_iter().map(Purchase::try_from).collect()
}

fn item_ids(purchase: &Purchase) -> Vec<Uuid> {
    shared::stock::affected_ids(purchase.items.iter().map(|line| &line.item))
}

#[derive(Debug, Clone, Default)]
pub struct PurchaseFilter {
    pub status: Option<PurchaseStatus>,
    pub supplier: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub async fn find<'e, E>(executor: E, id: Uuid) -> AppResult<Option<Purchase>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM purchases WHERE id = $1", PURCHASE_COLUMNS);
    sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Purchase::try_from)
        .transpose()
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> AppResult<Purchase>
where
    E: Executor<'e, Database = Postgres>,
{
    find(executor, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> AppResult<Purchase> {
    let sql = format!(
        "SELECT {} FROM purchases WHERE id = $1 FOR UPDATE",
        PURCHASE_COLUMNS
    );
    sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Purchase::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))
}

pub async fn insert<'e, E>(executor: E, purchase: &Purchase) -> AppResult<Purchase>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        INSERT INTO purchases (
            id, business_id, supplier, items, item_ids, invoice_number, purchase_date,
            subtotal, discount_amount, tax_rate, tax_amount, shipping_cost, total, notes,
            payment_method, status, received_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19)
        RETURNING {}
        "#,
        PURCHASE_COLUMNS
    );
    let row = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(purchase.id)
        .bind(purchase.business_id)
        .bind(Json(&purchase.supplier))
        .bind(Json(&purchase.items))
        .bind(item_ids(purchase))
        .bind(&purchase.invoice_number)
        .bind(purchase.purchase_date)
        .bind(purchase.subtotal)
        .bind(purchase.discount_amount)
        .bind(purchase.tax_rate)
        .bind(purchase.tax_amount)
        .bind(purchase.shipping_cost)
        .bind(purchase.total)
        .bind(&purchase.notes)
        .bind(purchase.payment_method.as_str())
        .bind(purchase.status.as_str())
        .bind(purchase.received_at)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .fetch_one(executor)
        .await?;
    Purchase::try_from(row)
}

pub async fn update<'e, E>(executor: E, purchase: &Purchase) -> AppResult<Purchase>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        UPDATE purchases SET
            supplier = $2, items = $3, item_ids = $4, invoice_number = $5,
            purchase_date = $6, subtotal = $7, discount_amount = $8, tax_rate = $9,
            tax_amount = $10, shipping_cost = $11, total = $12, notes = $13,
            payment_method = $14, status = $15, received_at = $16, updated_at = $17
        WHERE id = $1
        RETURNING {}
        "#,
        PURCHASE_COLUMNS
    );
    let row = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(purchase.id)
        .bind(Json(&purchase.supplier))
        .bind(Json(&purchase.items))
        .bind(item_ids(purchase))
        .bind(&purchase.invoice_number)
        .bind(purchase.purchase_date)
        .bind(purchase.subtotal)
        .bind(purchase.discount_amount)
        .bind(purchase.tax_rate)
        .bind(purchase.tax_amount)
        .bind(purchase.shipping_cost)
        .bind(purchase.total)
        .bind(&purchase.notes)
        .bind(purchase.payment_method.as_str())
        .bind(purchase.status.as_str())
        .bind(purchase.received_at)
        .bind(purchase.updated_at)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;
    Purchase::try_from(row)
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM purchases WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list(
    pool: &PgPool,
    filter: &PurchaseFilter,
    offset: i64,
    limit: i64,
) -> AppResult<(Vec<Purchase>, u64)> {
    const WHERE: &str = r#"
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR supplier ->> 'name' ILIKE '%' || $2 || '%')
          AND ($3::timestamptz IS NULL OR purchase_date >= $3)
          AND ($4::timestamptz IS NULL OR purchase_date <= $4)
    "#;
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM purchases {}", WHERE))
        .bind(status)
        .bind(&filter.supplier)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM purchases {} ORDER BY purchase_date DESC, created_at DESC OFFSET $5 LIMIT $6",
        PURCHASE_COLUMNS, WHERE
    );
    let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(status)
        .bind(&filter.supplier)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok((into_purchases(rows)?, total.max(0) as u64))
}

/// Purchases with a line for `item_id`, newest first
pub async fn containing_item<'e, E>(executor: E, item_id: Uuid) -> AppResult<Vec<Purchase>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        SELECT {} FROM purchases
        WHERE $1 = ANY(item_ids)
        ORDER BY purchase_date DESC, created_at DESC
        "#,
        PURCHASE_COLUMNS
    );
    let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(item_id)
        .fetch_all(executor)
        .await?;
    into_purchases(rows)
}

/// True when any purchase references the item
pub async fn references_item<'e, E>(executor: E, item_id: Uuid) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM purchases WHERE $1 = ANY(item_ids))",
    )
    .bind(item_id)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

/// Purchases dated within the inclusive range, oldest first; open bounds are unbounded
pub async fn in_range<'e, E>(
    executor: E,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> AppResult<Vec<Purchase>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        SELECT {} FROM purchases
        WHERE ($1::timestamptz IS NULL OR purchase_date >= $1)
          AND ($2::timestamptz IS NULL OR purchase_date <= $2)
        ORDER BY purchase_date ASC, created_at ASC
        "#,
        PURCHASE_COLUMNS
    );
    let rows = sqlx::query_as::<_, PurchaseRow>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(executor)
        .await?;
    into_purchases(rows)
}
