//! Purchase models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::measurement::{Measurement, TrackingType};

text_enum! {
    #[derive(Default)]
    PaymentMethod {
        #[default]
        Cash => "cash",
        Credit => "credit",
        Debit => "debit",
        Check => "check",
        BankTransfer => "bank_transfer",
        Other => "other",
    }
}

text_enum! {
    /// Purchase lifecycle. `received` and `partially_received` make the stock effect live.
    #[derive(Default)]
    PurchaseStatus {
        #[default]
        Pending => "pending",
        Received => "received",
        PartiallyReceived => "partially_received",
        Cancelled => "cancelled",
    }
}

impl PurchaseStatus {
    pub fn is_stock_live(&self) -> bool {
        matches!(self, PurchaseStatus::Received | PurchaseStatus::PartiallyReceived)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Supplier packaging details, informational only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    #[serde(default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub units_per_package: Option<Decimal>,
}

/// Hints used when a line is materialized as an asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLineItem {
    pub item: Uuid,
    pub measurement: Measurement,
    pub cost_per_unit: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    pub total_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_info: Option<PackageInfo>,
    #[serde(default)]
    pub is_asset: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_info: Option<AssetInfo>,
}

impl PurchaseLineItem {
    pub fn purchased_by(&self) -> TrackingType {
        self.measurement.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Uuid>,
    pub supplier: Supplier,
    pub items: Vec<PurchaseLineItem>,
    pub invoice_number: Option<String>,
    pub purchase_date: DateTime<Utc>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: PurchaseStatus,
    /// Set the first time the purchase enters `received`
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    pub fn contains_item(&self, item_id: Uuid) -> bool {
        self.items.iter().any(|line| line.item == item_id)
    }

    pub fn lines_for(&self, item_id: Uuid) -> impl Iterator<Item = &PurchaseLineItem> {
        self.items.iter().filter(move |line| line.item == item_id)
    }

    pub fn asset_lines(&self) -> impl Iterator<Item = &PurchaseLineItem> {
        self.items.iter().filter(|line| line.is_asset)
    }

    /// True when this status change is the first entry into `received`
    pub fn enters_received(&self, next: PurchaseStatus) -> bool {
        next == PurchaseStatus::Received && self.received_at.is_none()
    }
}
