//! Purchase service: priced documents whose received lines add stock and land costs
//!
//! Every mutation applies `effect(new) - effect(old)` to the touched items inside one
//! serializable transaction, so a status change and a line edit go through the same path.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{
    asset_from_purchase_line, Asset, AssetInfo, MeasurementFields, MeasurementVectors,
    PackageInfo, PaymentMethod, Purchase, PurchaseLineItem, PurchaseStatus, Supplier,
    TrackingType,
};
use shared::pricing::{document_totals, price_line, DocumentTotals};
use shared::stock::{
    affected_ids, apply_landed_cost, apply_stock_deltas, landed_costs, purchase_vectors,
    stock_deltas, ItemIndex,
};
use shared::types::PaginatedResponse;
use shared::validation::{validate_email, validate_line_amount};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::items::clearable;
use super::reporting::date_range;
use super::{page_of, save_touched};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::repositories::purchases::{self, PurchaseFilter};
use crate::repositories::{assets, items};

/// Purchase service
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
    retries: u32,
}

/// One purchase line as submitted. `totalCost` is always recomputed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLineInput {
    pub item: Uuid,
    pub purchased_by: TrackingType,
    #[serde(flatten)]
    pub amount: MeasurementFields,
    pub cost_per_unit: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    pub package_info: Option<PackageInfo>,
    #[serde(default)]
    pub is_asset: bool,
    pub asset_info: Option<AssetInfo>,
}

/// Input for creating a purchase
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseInput {
    pub supplier: Supplier,
    #[validate(length(min = 1, message = "A purchase needs at least one line item"))]
    pub items: Vec<PurchaseLineInput>,
    #[validate(length(max = 64))]
    pub invoice_number: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub shipping_cost: Decimal,
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: PurchaseStatus,
}

/// Partial purchase update; `items` replaces every line when present
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePurchaseInput {
    pub supplier: Option<Supplier>,
    #[validate(length(min = 1, message = "A purchase needs at least one line item"))]
    pub items: Option<Vec<PurchaseLineInput>>,
    #[validate(length(max = 64))]
    pub invoice_number: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub discount_amount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<PurchaseStatus>,
}

/// Query string of `GET /purchases`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<PurchaseStatus>,
    pub supplier: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn check_supplier(supplier: &Supplier) -> AppResult<()> {
    if supplier.name.trim().is_empty() {
        return Err(AppError::validation("supplier.name", "Supplier name is required"));
    }
    if let Some(email) = supplier.email.as_deref().filter(|e| !e.is_empty()) {
        validate_email(email).map_err(|msg| AppError::validation("supplier.email", msg))?;
    }
    Ok(())
}

/// Prices one submitted line
pub fn build_line(line: PurchaseLineInput) -> AppResult<PurchaseLineItem> {
    let measurement = line.amount.require(line.item, line.purchased_by)?;
    validate_line_amount(measurement.value())
        .map_err(|msg| AppError::validation(line.purchased_by.as_str(), msg))?;

    let priced = price_line(
        measurement.value(),
        line.cost_per_unit,
        line.discount_amount,
        line.discount_percentage,
    )?;

    Ok(PurchaseLineItem {
        item: line.item,
        measurement,
        cost_per_unit: line.cost_per_unit,
        discount_amount: priced.discount_amount,
        discount_percentage: priced.discount_percentage,
        total_cost: priced.total,
        package_info: line.package_info,
        is_asset: line.is_asset,
        asset_info: line.asset_info,
    })
}

fn build_lines(lines: Vec<PurchaseLineInput>) -> AppResult<Vec<PurchaseLineItem>> {
    lines.into_iter().map(build_line).collect()
}

fn set_totals(purchase: &mut Purchase, totals: DocumentTotals) {
    purchase.subtotal = totals.subtotal;
    purchase.discount_amount = totals.discount_amount;
    purchase.tax_rate = totals.tax_rate;
    purchase.tax_amount = totals.tax_amount;
    purchase.shipping_cost = totals.shipping_cost;
    purchase.total = totals.total;
}

fn reprice(purchase: &mut Purchase) -> AppResult<()> {
    let totals = document_totals(
        purchase.items.iter().map(|line| line.total_cost),
        purchase.discount_amount,
        purchase.tax_rate,
        purchase.shipping_cost,
    )?;
    set_totals(purchase, totals);
    Ok(())
}

impl UpdatePurchaseInput {
    fn apply(self, purchase: &mut Purchase, lines: Option<Vec<PurchaseLineItem>>) {
        if let Some(supplier) = self.supplier {
            purchase.supplier = supplier;
        }
        if let Some(lines) = lines {
            purchase.items = lines;
        }
        if let Some(invoice_number) = self.invoice_number {
            purchase.invoice_number = clearable(invoice_number);
        }
        if let Some(date) = self.purchase_date {
            purchase.purchase_date = date;
        }
        if let Some(discount) = self.discount_amount {
            purchase.discount_amount = discount;
        }
        if let Some(rate) = self.tax_rate {
            purchase.tax_rate = rate;
        }
        if let Some(shipping) = self.shipping_cost {
            purchase.shipping_cost = shipping;
        }
        if let Some(notes) = self.notes {
            purchase.notes = clearable(notes);
        }
        if let Some(method) = self.payment_method {
            purchase.payment_method = method;
        }
        if let Some(status) = self.status {
            purchase.status = status;
        }
    }
}

impl PurchaseService {
    pub fn new(db: PgPool, retries: u32) -> Self {
        Self { db, retries }
    }

    /// List purchases with filters and pagination, newest first
    pub async fn list(&self, query: PurchaseListQuery) -> AppResult<PaginatedResponse<Purchase>> {
        let pagination = page_of(query.page, query.limit);
        let (start_date, end_date) =
            date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
        let filter = PurchaseFilter {
            status: query.status,
            supplier: query.supplier.and_then(clearable),
            start_date,
            end_date,
        };
        let (data, total) =
            purchases::list(&self.db, &filter, pagination.offset(), pagination.per_page()).await?;
        Ok(PaginatedResponse::new(data, pagination, total))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Purchase> {
        purchases::get(&self.db, id).await
    }

    /// Assets materialized from the purchase
    pub async fn assets(&self, id: Uuid) -> AppResult<Vec<Asset>> {
        purchases::get(&self.db, id).await?;
        assets::by_purchase(&self.db, id).await
    }

    /// Create a purchase; a received purchase adds stock and lands costs immediately
    pub async fn create(&self, input: CreatePurchaseInput) -> AppResult<Purchase> {
        input.validate()?;
        check_supplier(&input.supplier)?;

        let lines = build_lines(input.items)?;
        let now = Utc::now();
        let mut purchase = Purchase {
            id: Uuid::new_v4(),
            business_id: None,
            supplier: input.supplier,
            items: lines,
            invoice_number: input.invoice_number.and_then(clearable),
            purchase_date: input.purchase_date.unwrap_or(now),
            subtotal: Decimal::ZERO,
            discount_amount: input.discount_amount,
            tax_rate: input.tax_rate,
            tax_amount: Decimal::ZERO,
            shipping_cost: input.shipping_cost,
            total: Decimal::ZERO,
            notes: input.notes.and_then(clearable),
            payment_method: input.payment_method,
            status: input.status,
            received_at: (input.status == PurchaseStatus::Received).then_some(now),
            created_at: now,
            updated_at: now,
        };
        reprice(&mut purchase)?;

        let created = db::serializable(&self.db, self.retries, move |conn| {
            let purchase = purchase.clone();
            Box::pin(async move { Self::create_in_tx(conn, purchase).await })
        })
        .await?;

        tracing::info!(
            "Created purchase {} ({} lines, status {}, total {})",
            created.id,
            created.items.len(),
            created.status,
            created.total
        );
        Ok(created)
    }

    async fn create_in_tx(conn: &mut PgConnection, purchase: Purchase) -> AppResult<Purchase> {
        let ids = affected_ids(purchase.items.iter().map(|line| &line.item));
        let mut index = items::lock_many(&mut *conn, &ids).await?;

        let effect = purchase_vectors(&purchase.items, purchase.status, &index)?;
        let deltas = stock_deltas(&MeasurementVectors::new(), &effect);
        let landed = purchase.status.is_stock_live().then_some(purchase.items.as_slice());
        let touched = Self::apply_effects(&mut index, &deltas, landed)?;
        save_touched(&mut *conn, &mut index, &touched, purchase.updated_at).await?;

        let created = purchases::insert(&mut *conn, &purchase).await?;
        if created.received_at.is_some() {
            Self::project_assets(conn, &created, &index).await?;
        }
        Ok(created)
    }

    /// Update a purchase, applying only the stock difference between old and new
    pub async fn update(&self, id: Uuid, input: UpdatePurchaseInput) -> AppResult<Purchase> {
        input.validate()?;
        if let Some(supplier) = &input.supplier {
            check_supplier(supplier)?;
        }
        let lines = input.items.clone().map(build_lines).transpose()?;

        let updated = db::serializable(&self.db, self.retries, move |conn| {
            let input = input.clone();
            let lines = lines.clone();
            Box::pin(async move { Self::update_in_tx(conn, id, input, lines).await })
        })
        .await?;

        tracing::info!(
            "Updated purchase {} (status {}, total {})",
            updated.id,
            updated.status,
            updated.total
        );
        Ok(updated)
    }

    async fn update_in_tx(
        conn: &mut PgConnection,
        id: Uuid,
        input: UpdatePurchaseInput,
        lines: Option<Vec<PurchaseLineItem>>,
    ) -> AppResult<Purchase> {
        let old = purchases::lock(&mut *conn, id).await?;
        let mut next = old.clone();
        input.apply(&mut next, lines);
        reprice(&mut next)?;

        let now = Utc::now();
        let first_receipt = old.enters_received(next.status);
        if first_receipt {
            next.received_at = Some(now);
        }
        next.updated_at = now;

        let ids = affected_ids(old.items.iter().chain(&next.items).map(|line| &line.item));
        let mut index = items::lock_many(&mut *conn, &ids).await?;

        let before = purchase_vectors(&old.items, old.status, &index)?;
        let after = purchase_vectors(&next.items, next.status, &index)?;
        let deltas = stock_deltas(&before, &after);

        let reland = next.status.is_stock_live()
            && (!old.status.is_stock_live() || old.items != next.items);
        let landed = reland.then_some(next.items.as_slice());
        let touched = Self::apply_effects(&mut index, &deltas, landed)?;
        save_touched(&mut *conn, &mut index, &touched, now).await?;

        let saved = purchases::update(&mut *conn, &next).await?;
        if first_receipt {
            Self::project_assets(conn, &saved, &index).await?;
        }
        Ok(saved)
    }

    /// Delete a purchase, reversing its stock effect when it was live.
    ///
    /// Assets materialized from it are kept and lose their purchase link.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let deleted = db::serializable(&self.db, self.retries, move |conn| {
            Box::pin(async move { Self::delete_in_tx(conn, id).await })
        })
        .await?;

        tracing::info!("Deleted purchase {} (status {})", deleted.id, deleted.status);
        Ok(())
    }

    async fn delete_in_tx(conn: &mut PgConnection, id: Uuid) -> AppResult<Purchase> {
        let old = purchases::lock(&mut *conn, id).await?;

        if old.status.is_stock_live() {
            let ids = affected_ids(old.items.iter().map(|line| &line.item));
            let mut index = items::lock_many(&mut *conn, &ids).await?;
            let before = purchase_vectors(&old.items, old.status, &index)?;
            let deltas = stock_deltas(&before, &MeasurementVectors::new());
            let touched = Self::apply_effects(&mut index, &deltas, None)?;
            save_touched(&mut *conn, &mut index, &touched, Utc::now()).await?;
        }

        purchases::delete(&mut *conn, id).await?;
        Ok(old)
    }

    /// Applies stock deltas and, for live lines, their landed unit costs
    fn apply_effects(
        index: &mut ItemIndex,
        deltas: &MeasurementVectors,
        landed: Option<&[PurchaseLineItem]>,
    ) -> AppResult<BTreeSet<Uuid>> {
        let mut touched: BTreeSet<Uuid> = apply_stock_deltas(index, deltas)?
            .into_iter()
            .map(|change| change.item)
            .collect();

        if let Some(lines) = landed {
            for (id, cost) in landed_costs(lines, index)? {
                if let Some(item) = index.get_mut(&id) {
                    if apply_landed_cost(item, cost) {
                        touched.insert(id);
                    }
                }
            }
        }
        Ok(touched)
    }

    /// Creates one asset per asset-flagged line of a purchase entering `received`
    async fn project_assets(
        conn: &mut PgConnection,
        purchase: &Purchase,
        index: &ItemIndex,
    ) -> AppResult<Vec<Asset>> {
        let mut created = Vec::new();
        for line in purchase.asset_lines() {
            let asset = asset_from_purchase_line(purchase, line, index.get(&line.item));
            created.push(assets::insert(&mut *conn, &asset).await?);
        }

        if !created.is_empty() {
            tracing::info!(
                "Materialized {} assets from purchase {}",
                created.len(),
                purchase.id
            );
        }
        Ok(created)
    }
}
