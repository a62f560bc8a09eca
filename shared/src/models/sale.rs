//! Sale models and the payment ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::measurement::{Measurement, TrackingType};
use super::purchase::PaymentMethod;
use crate::error::InventoryError;

text_enum! {
    /// Sale lifecycle. Only `completed` consumes stock.
    #[derive(Default)]
    SaleStatus {
        #[default]
        Pending => "pending",
        Completed => "completed",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

impl SaleStatus {
    pub fn is_stock_live(&self) -> bool {
        matches!(self, SaleStatus::Completed)
    }
}

text_enum! {
    #[derive(Default)]
    PaymentState {
        Paid => "paid",
        Partial => "partial",
        #[default]
        Unpaid => "unpaid",
    }
}

impl PaymentState {
    pub fn derive(amount_paid: Decimal, total: Decimal) -> Self {
        if total <= Decimal::ZERO || amount_paid >= total {
            PaymentState::Paid
        } else if amount_paid > Decimal::ZERO {
            PaymentState::Partial
        } else {
            PaymentState::Unpaid
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineItem {
    pub item: Uuid,
    pub measurement: Measurement,
    pub price_per_unit: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
    pub total_price: Decimal,
}

impl SaleLineItem {
    pub fn sold_by(&self) -> TrackingType {
        self.measurement.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub amount: Decimal,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Amount-paid ledger with its derived state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub amount_paid: Decimal,
    pub status: PaymentState,
    #[serde(default)]
    pub payments: Vec<PaymentRecord>,
}

impl PaymentStatus {
    pub fn new(amount_paid: Decimal, total: Decimal) -> Self {
        Self {
            amount_paid,
            status: PaymentState::derive(amount_paid, total),
            payments: Vec::new(),
        }
    }

    /// Appends a payment and re-derives the state against `total`
    pub fn record(&mut self, payment: PaymentRecord, total: Decimal) -> Result<(), InventoryError> {
        if payment.amount <= Decimal::ZERO {
            return Err(InventoryError::invalid_amount(
                "amount",
                "payment amount must be greater than zero",
            ));
        }
        self.amount_paid += payment.amount;
        self.payments.push(payment);
        self.refresh(total);
        Ok(())
    }

    pub fn refresh(&mut self, total: Decimal) {
        self.status = PaymentState::derive(self.amount_paid, total);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Uuid>,
    pub customer: Customer,
    pub items: Vec<SaleLineItem>,
    pub invoice_number: String,
    pub sale_date: DateTime<Utc>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: SaleStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn contains_item(&self, item_id: Uuid) -> bool {
        self.items.iter().any(|line| line.item == item_id)
    }

    pub fn lines_for(&self, item_id: Uuid) -> impl Iterator<Item = &SaleLineItem> {
        self.items.iter().filter(move |line| line.item == item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn payment(amount: &str) -> PaymentRecord {
        PaymentRecord {
            amount: dec(amount),
            method: Some(PaymentMethod::Cash),
            date: Utc::now(),
            reference: None,
        }
    }

    #[test]
    fn test_payment_state_derivation() {
        assert_eq!(PaymentState::derive(dec("0"), dec("100")), PaymentState::Unpaid);
        assert_eq!(PaymentState::derive(dec("40"), dec("100")), PaymentState::Partial);
        assert_eq!(PaymentState::derive(dec("100"), dec("100")), PaymentState::Paid);
        assert_eq!(PaymentState::derive(dec("120"), dec("100")), PaymentState::Paid);
        assert_eq!(PaymentState::derive(dec("0"), dec("0")), PaymentState::Paid);
    }

    #[test]
    fn test_payment_ledger_accumulates() {
        let total = dec("90");
        let mut ledger = PaymentStatus::new(Decimal::ZERO, total);
        assert_eq!(ledger.status, PaymentState::Unpaid);

        ledger.record(payment("30"), total).unwrap();
        assert_eq!(ledger.status, PaymentState::Partial);
        ledger.record(payment("60"), total).unwrap();
        assert_eq!(ledger.status, PaymentState::Paid);
        assert_eq!(ledger.amount_paid, total);
        assert_eq!(ledger.payments.len(), 2);
    }

    #[test]
    fn test_payment_must_be_positive() {
        let mut ledger = PaymentStatus::new(Decimal::ZERO, dec("10"));
        assert!(ledger.record(payment("0"), dec("10")).is_err());
        assert!(ledger.record(payment("-5"), dec("10")).is_err());
        assert!(ledger.payments.is_empty());
    }
}
