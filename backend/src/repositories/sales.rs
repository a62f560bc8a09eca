//! Sale persistence

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::{Customer, PaymentStatus, Sale, SaleLineItem, SaleStatus};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::parse_text;
use crate::error::{AppError, AppResult};

const SALE_COLUMNS: &str = r#"
    id, business_id, customer, items, invoice_number, sale_date, subtotal,
    discount_amount, tax_rate, tax_amount, shipping_cost, total, payment_method,
    payment_status, status, notes, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    business_id: Option<Uuid>,
    customer: Json<Customer>,
    items: Json<Vec<SaleLineItem>>,
    invoice_number: String,
    sale_date: DateTime<Utc>,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    payment_method: String,
    payment_status: Json<PaymentStatus>,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = AppError;

    fn try_from(row: SaleRow) -> AppResult<Self> {
        Ok(Sale {
            id: row.id,
            business_id: row.business_id,
            customer: row.customer.0,
            items: row.items.0,
            invoice_number: row.invoice_number,
            sale_date: row.sale_date,
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            tax_rate: row.tax_rate,
            tax_amount: row.tax_amount,
            shipping_cost: row.shipping_cost,
            total: row.total,
            payment_method: parse_text(&row.payment_method)?,
            payment_status: row.payment_status.0,
            status: parse_text(&row.status)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_sales(rows: Vec<SaleRow>) -> AppResult<Vec<Sale>> {
    rows.into_iter().map(Sale::try_from).collect()
}

fn item_ids(sale: &Sale) -> Vec<Uuid> {
    shared::stock::affected_ids(sale.items.iter().map(|line| &line.item))
}

#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub customer: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub async fn find<'e, E>(executor: E, id: Uuid) -> AppResult<Option<Sale>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM sales WHERE id = $1", SALE_COLUMNS);
    sqlx::query_as::<_, SaleRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Sale::try_from)
        .transpose()
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> AppResult<Sale>
where
    E: Executor<'e, Database = Postgres>,
{
    find(executor, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> AppResult<Sale> {
    let sql = format!("SELECT {} FROM sales WHERE id = $1 FOR UPDATE", SALE_COLUMNS);
    sqlx::query_as::<_, SaleRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Sale::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))
}

pub async fn insert<'e, E>(executor: E, sale: &Sale) -> AppResult<Sale>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        INSERT INTO sales (
            id, business_id, customer, items, item_ids, invoice_number, sale_date,
            subtotal, discount_amount, tax_rate, tax_amount, shipping_cost, total,
            payment_method, payment_status, status, notes, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19)
        RETURNING {}
        "#,
        SALE_COLUMNS
    );
    let row = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(sale.id)
        .bind(sale.business_id)
        .bind(Json(&sale.customer))
        .bind(Json(&sale.items))
        .bind(item_ids(sale))
        .bind(&sale.invoice_number)
        .bind(sale.sale_date)
        .bind(sale.subtotal)
        .bind(sale.discount_amount)
        .bind(sale.tax_rate)
        .bind(sale.tax_amount)
        .bind(sale.shipping_cost)
        .bind(sale.total)
        .bind(sale.payment_method.as_str())
        .bind(Json(&sale.payment_status))
        .bind(sale.status.as_str())
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .fetch_one(executor)
        .await?;
    Sale::try_from(row)
}

pub async fn update<'e, E>(executor: E, sale: &Sale) -> AppResult<Sale>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        UPDATE sales SET
            customer = $2, items = $3, item_ids = $4, invoice_number = $5, sale_date = $6,
            subtotal = $7, discount_amount = $8, tax_rate = $9, tax_amount = $10,
            shipping_cost = $11, total = $12, payment_method = $13, payment_status = $14,
            status = $15, notes = $16, updated_at = $17
        WHERE id = $1
        RETURNING {}
        "#,
        SALE_COLUMNS
    );
    let row = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(sale.id)
        .bind(Json(&sale.customer))
        .bind(Json(&sale.items))
        .bind(item_ids(sale))
        .bind(&sale.invoice_number)
        .bind(sale.sale_date)
        .bind(sale.subtotal)
        .bind(sale.discount_amount)
        .bind(sale.tax_rate)
        .bind(sale.tax_amount)
        .bind(sale.shipping_cost)
        .bind(sale.total)
        .bind(sale.payment_method.as_str())
        .bind(Json(&sale.payment_status))
        .bind(sale.status.as_str())
        .bind(&sale.notes)
        .bind(sale.updated_at)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;
    Sale::try_from(row)
}

pub async fn delete<'e, E>(executor: E, id: Uuid) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM sales WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list(
    pool: &PgPool,
    filter: &SaleFilter,
    offset: i64,
    limit: i64,
) -> AppResult<(Vec<Sale>, u64)> {
    const WHERE: &str = r#"
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR customer ->> 'name' ILIKE '%' || $2 || '%')
          AND ($3::timestamptz IS NULL OR sale_date >= $3)
          AND ($4::timestamptz IS NULL OR sale_date <= $4)
    "#;
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM sales {}", WHERE))
        .bind(status)
        .bind(&filter.customer)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {} FROM sales {} ORDER BY sale_date DESC, created_at DESC OFFSET $5 LIMIT $6",
        SALE_COLUMNS, WHERE
    );
    let rows = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(status)
        .bind(&filter.customer)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok((into_sales(rows)?, total.max(0) as u64))
}

/// Sales with a line for `item_id`, newest first
pub async fn containing_item<'e, E>(executor: E, item_id: Uuid) -> AppResult<Vec<Sale>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        SELECT {} FROM sales
        WHERE $1 = ANY(item_ids)
        ORDER BY sale_date DESC, created_at DESC
        "#,
        SALE_COLUMNS
    );
    let rows = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(item_id)
        .fetch_all(executor)
        .await?;
    into_sales(rows)
}

pub async fn references_item<'e, E>(executor: E, item_id: Uuid) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM sales WHERE $1 = ANY(item_ids))",
    )
    .bind(item_id)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

pub async fn in_range<'e, E>(
    executor: E,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> AppResult<Vec<Sale>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        SELECT {} FROM sales
        WHERE ($1::timestamptz IS NULL OR sale_date >= $1)
          AND ($2::timestamptz IS NULL OR sale_date <= $2)
        ORDER BY sale_date ASC, created_at ASC
        "#,
        SALE_COLUMNS
    );
    let rows = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(executor)
        .await?;
    into_sales(rows)
}

/// Numerically largest purely numeric invoice number, if any
pub async fn max_numeric_invoice<'e, E>(executor: E) -> AppResult<Option<String>>
where
    E: Executor<'e, Database = Postgres>,
{
    let invoice = sqlx::query_scalar::<_, String>(
        r#"
        SELECT invoice_number FROM sales
        WHERE invoice_number ~ '^[0-9]+$'
        ORDER BY length(ltrim(invoice_number, '0')) DESC, ltrim(invoice_number, '0') DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await?;
    Ok(invoice)
}
