//! Sale service: completed sales consume stock, with an invoice sequence and payment ledger

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{
    Customer, MeasurementFields, MeasurementVectors, PaymentMethod, PaymentRecord, PaymentStatus,
    Sale, SaleLineItem, SaleStatus, TrackingType,
};
use shared::pricing::{document_totals, price_line};
use shared::sequence::next_invoice_number;
use shared::stock::{affected_ids, apply_stock_deltas, sale_vectors, stock_deltas, ItemIndex};
use shared::types::PaginatedResponse;
use shared::validation::{validate_email, validate_line_amount, validate_non_negative};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::items::clearable;
use super::reporting::date_range;
use super::{page_of, save_touched};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::repositories::items;
use crate::repositories::sales::{self, SaleFilter};

/// Sale service
#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
    retries: u32,
    invoice_width: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineInput {
    pub item: Uuid,
    pub sold_by: TrackingType,
    #[serde(flatten)]
    pub amount: MeasurementFields,
    pub price_per_unit: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
}

/// Input for creating a sale. Without `invoiceNumber` the next number is assigned.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleInput {
    #[serde(default)]
    pub customer: Customer,
    #[validate(length(min = 1, message = "A sale needs at least one line item"))]
    pub items: Vec<SaleLineInput>,
    #[validate(length(min = 1, max = 64))]
    pub invoice_number: Option<String>,
    pub sale_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Amount already received when the sale is recorded
    #[serde(default)]
    pub amount_paid: Decimal,
    #[serde(default)]
    pub status: SaleStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleInput {
    pub customer: Option<Customer>,
    #[validate(length(min = 1, message = "A sale needs at least one line item"))]
    pub items: Option<Vec<SaleLineInput>>,
    #[validate(length(min = 1, max = 64))]
    pub invoice_number: Option<String>,
    pub sale_date: Option<DateTime<Utc>>,
    pub discount_amount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    /// Overwrites the ledger total without adding a payment record
    pub amount_paid: Option<Decimal>,
    pub status: Option<SaleStatus>,
    pub notes: Option<String>,
}

/// `POST /sales/:id/payments`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub amount: Decimal,
    pub method: Option<PaymentMethod>,
    pub date: Option<DateTime<Utc>>,
    pub reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<SaleStatus>,
    pub customer: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextInvoice {
    pub invoice_number: String,
}

fn check_customer(customer: &Customer) -> AppResult<()> {
    if let Some(email) = customer.email.as_deref().filter(|e| !e.is_empty()) {
        validate_email(email).map_err(|msg| AppError::validation("customer.email", msg))?;
    }
    Ok(())
}

pub fn build_line(line: SaleLineInput) -> AppResult<SaleLineItem> {
    let measurement = line.amount.require(line.item, line.sold_by)?;
    validate_line_amount(measurement.value())
        .map_err(|msg| AppError::validation(line.sold_by.as_str(), msg))?;

    let priced = price_line(
        measurement.value(),
        line.price_per_unit,
        line.discount_amount,
        line.discount_percentage,
    )?;

    Ok(SaleLineItem {
        item: line.item,
        measurement,
        price_per_unit: line.price_per_unit,
        discount_amount: priced.discount_amount,
        discount_percentage: priced.discount_percentage,
        total_price: priced.total,
    })
}

fn build_lines(lines: Vec<SaleLineInput>) -> AppResult<Vec<SaleLineItem>> {
    lines.into_iter().map(build_line).collect()
}

/// Recomputes the header totals and re-derives the payment state against them
fn reprice(sale: &mut Sale) -> AppResult<()> {
    let totals = document_totals(
        sale.items.iter().map(|line| line.total_price),
        sale.discount_amount,
        sale.tax_rate,
        sale.shipping_cost,
    )?;
    sale.subtotal = totals.subtotal;
    sale.discount_amount = totals.discount_amount;
    sale.tax_rate = totals.tax_rate;
    sale.tax_amount = totals.tax_amount;
    sale.shipping_cost = totals.shipping_cost;
    sale.total = totals.total;
    sale.payment_status.refresh(sale.total);
    Ok(())
}

impl UpdateSaleInput {
    fn apply(self, sale: &mut Sale, lines: Option<Vec<SaleLineItem>>) {
        if let Some(customer) = self.customer {
            sale.customer = customer;
        }
        if let Some(lines) = lines {
            sale.items = lines;
        }
        if let Some(invoice_number) = self.invoice_number {
            sale.invoice_number = invoice_number.trim().to_string();
        }
        if let Some(date) = self.sale_date {
            sale.sale_date = date;
        }
        if let Some(discount) = self.discount_amount {
            sale.discount_amount = discount;
        }
        if let Some(rate) = self.tax_rate {
            sale.tax_rate = rate;
        }
        if let Some(shipping) = self.shipping_cost {
            sale.shipping_cost = shipping;
        }
        if let Some(method) = self.payment_method {
            sale.payment_method = method;
        }
        if let Some(paid) = self.amount_paid {
            sale.payment_status.amount_paid = paid;
        }
        if let Some(status) = self.status {
            sale.status = status;
        }
        if let Some(notes) = self.notes {
            sale.notes = clearable(notes);
        }
    }
}

impl SaleService {
    pub fn new(db: PgPool, retries: u32, invoice_width: usize) -> Self {
        Self {
            db,
            retries,
            invoice_width,
        }
    }

    pub async fn list(&self, query: SaleListQuery) -> AppResult<PaginatedResponse<Sale>> {
        let pagination = page_of(query.page, query.limit);
        let (start_date, end_date) =
            date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
        let filter = SaleFilter {
            status: query.status,
            customer: query.customer.and_then(clearable),
            start_date,
            end_date,
        };
        let (data, total) =
            sales::list(&self.db, &filter, pagination.offset(), pagination.per_page()).await?;
        Ok(PaginatedResponse::new(data, pagination, total))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Sale> {
        sales::get(&self.db, id).await
    }

    /// Next free invoice number (advisory)
    pub async fn next_invoice(&self) -> AppResult<NextInvoice> {
        let max = sales::max_numeric_invoice(&self.db).await?;
        Ok(NextInvoice {
            invoice_number: next_invoice_number(max.iter().map(String::as_str), self.invoice_width),
        })
    }

    /// Create a sale; a completed sale consumes stock or fails as a whole
    pub async fn create(&self, input: CreateSaleInput) -> AppResult<Sale> {
        input.validate()?;
        check_customer(&input.customer)?;
        validate_non_negative(input.amount_paid)
            .map_err(|msg| AppError::validation("amountPaid", msg))?;

        let lines = build_lines(input.items)?;
        let now = Utc::now();
        let sale_date = input.sale_date.unwrap_or(now);
        let mut sale = Sale {
            id: Uuid::new_v4(),
            business_id: None,
            customer: input.customer,
            items: lines,
            invoice_number: input
                .invoice_number
                .map(|n| n.trim().to_string())
                .unwrap_or_default(),
            sale_date,
            subtotal: Decimal::ZERO,
            discount_amount: input.discount_amount,
            tax_rate: input.tax_rate,
            tax_amount: Decimal::ZERO,
            shipping_cost: input.shipping_cost,
            total: Decimal::ZERO,
            payment_method: input.payment_method,
            payment_status: PaymentStatus::new(Decimal::ZERO, Decimal::ZERO),
            status: input.status,
            notes: input.notes.and_then(clearable),
            created_at: now,
            updated_at: now,
        };
        reprice(&mut sale)?;
        if input.amount_paid > Decimal::ZERO {
            let initial = PaymentRecord {
                amount: input.amount_paid,
                method: Some(sale.payment_method),
                date: sale_date,
                reference: None,
            };
            sale.payment_status.record(initial, sale.total)?;
        }

        let width = self.invoice_width;
        let created = db::serializable(&self.db, self.retries, move |conn| {
            let sale = sale.clone();
            Box::pin(async move { Self::create_in_tx(conn, sale, width).await })
        })
        .await?;

        tracing::info!(
            "Created sale {} (invoice {}, status {}, total {})",
            created.id,
            created.invoice_number,
            created.status,
            created.total
        );
        Ok(created)
    }

    async fn create_in_tx(conn: &mut PgConnection, mut sale: Sale, width: usize) -> AppResult<Sale> {
        if sale.invoice_number.is_empty() {
            let max = sales::max_numeric_invoice(&mut *conn).await?;
            sale.invoice_number = next_invoice_number(max.iter().map(String::as_str), width);
        }

        let ids = affected_ids(sale.items.iter().map(|line| &line.item));
        let mut index = items::lock_many(&mut *conn, &ids).await?;

        let effect = sale_vectors(&sale.items, sale.status, &index)?;
        let deltas = stock_deltas(&MeasurementVectors::new(), &effect);
        let touched = Self::apply_effects(&mut index, &deltas)?;
        save_touched(&mut *conn, &mut index, &touched, sale.updated_at).await?;

        sales::insert(&mut *conn, &sale).await
    }

    /// Update a sale, consuming or returning only the stock difference
    pub async fn update(&self, id: Uuid, input: UpdateSaleInput) -> AppResult<Sale> {
        input.validate()?;
        if let Some(customer) = &input.customer {
            check_customer(customer)?;
        }
        if let Some(paid) = input.amount_paid {
            validate_non_negative(paid).map_err(|msg| AppError::validation("amountPaid", msg))?;
        }
        let lines = input.items.clone().map(build_lines).transpose()?;

        let updated = db::serializable(&self.db, self.retries, move |conn| {
            let input = input.clone();
            let lines = lines.clone();
            Box::pin(async move { Self::update_in_tx(conn, id, input, lines).await })
        })
        .await?;

        tracing::info!(
            "Updated sale {} (status {}, total {})",
            updated.id,
            updated.status,
            updated.total
        );
        Ok(updated)
    }

    async fn update_in_tx(
        conn: &mut PgConnection,
        id: Uuid,
        input: UpdateSaleInput,
        lines: Option<Vec<SaleLineItem>>,
    ) -> AppResult<Sale> {
        let old = sales::lock(&mut *conn, id).await?;
        let mut next = old.clone();
        input.apply(&mut next, lines);
        reprice(&mut next)?;
        let now = Utc::now();
        next.updated_at = now;

        let ids = affected_ids(old.items.iter().chain(&next.items).map(|line| &line.item));
        let mut index = items::lock_many(&mut *conn, &ids).await?;

        let before = sale_vectors(&old.items, old.status, &index)?;
        let after = sale_vectors(&next.items, next.status, &index)?;
        let deltas = stock_deltas(&before, &after);
        let touched = Self::apply_effects(&mut index, &deltas)?;
        save_touched(&mut *conn, &mut index, &touched, now).await?;

        sales::update(&mut *conn, &next).await
    }

    /// Delete a sale, returning its stock when it was completed
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let deleted = db::serializable(&self.db, self.retries, move |conn| {
            Box::pin(async move { Self::delete_in_tx(conn, id).await })
        })
        .await?;

        tracing::info!(
            "Deleted sale {} (invoice {}, status {})",
            deleted.id,
            deleted.invoice_number,
            deleted.status
        );
        Ok(())
    }

    async fn delete_in_tx(conn: &mut PgConnection, id: Uuid) -> AppResult<Sale> {
        let old = sales::lock(&mut *conn, id).await?;

        if old.status.is_stock_live() {
            let ids = affected_ids(old.items.iter().map(|line| &line.item));
            let mut index = items::lock_many(&mut *conn, &ids).await?;
            let before = sale_vectors(&old.items, old.status, &index)?;
            let deltas = stock_deltas(&before, &MeasurementVectors::new());
            let touched = Self::apply_effects(&mut index, &deltas)?;
            save_touched(&mut *conn, &mut index, &touched, Utc::now()).await?;
        }

        sales::delete(&mut *conn, id).await?;
        Ok(old)
    }

    /// Append a payment and re-derive the payment state
    pub async fn add_payment(&self, id: Uuid, input: PaymentInput) -> AppResult<Sale> {
        let record = PaymentRecord {
            amount: input.amount,
            method: input.method,
            date: input.date.unwrap_or_else(Utc::now),
            reference: input.reference.and_then(clearable),
        };

        let updated = db::serializable(&self.db, self.retries, move |conn| {
            let record = record.clone();
            Box::pin(async move {
                let mut sale = sales::lock(&mut *conn, id).await?;
                sale.payment_status.record(record, sale.total)?;
                sale.updated_at = Utc::now();
                sales::update(&mut *conn, &sale).await
            })
        })
        .await?;

        tracing::info!(
            "Recorded payment on sale {} (paid {}, {})",
            updated.id,
            updated.payment_status.amount_paid,
            updated.payment_status.status
        );
        Ok(updated)
    }

    fn apply_effects(index: &mut ItemIndex, deltas: &MeasurementVectors) -> AppResult<BTreeSet<Uuid>> {
        Ok(apply_stock_deltas(index, deltas)?
            .into_iter()
            .map(|change| change.item)
            .collect())
    }
}
