//! Line and document pricing shared by purchases and sales

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::validation::{validate_percentage, validate_stored_value, STORED_SCALE};

/// Rounds a monetary value to cents, half away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a derived stock figure or unit cost to the scale the store keeps.
///
/// Live mutations and the inventory rebuild both round through here, so a value
/// reloaded from the store compares equal to a freshly computed one.
pub fn round_stored(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(STORED_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn too_large(field: &str) -> InventoryError {
    InventoryError::invalid_amount(field, "is too large")
}

/// Discount-normalized line price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub discount_percentage: Decimal,
    pub total: Decimal,
}

/// Prices one line: `amount * unit_price` less its discount.
///
/// A positive percentage wins over an absolute discount; an absolute discount is
/// back-converted into a percentage of the base (0 when the base is 0).
pub fn price_line(
    amount: Decimal,
    unit_price: Decimal,
    discount_amount: Decimal,
    discount_percentage: Decimal,
) -> Result<PricedLine, InventoryError> {
    if amount < Decimal::ZERO {
        return Err(InventoryError::invalid_amount("amount", "must not be negative"));
    }
    if unit_price < Decimal::ZERO {
        return Err(InventoryError::invalid_amount("unitPrice", "must not be negative"));
    }
    if discount_amount < Decimal::ZERO {
        return Err(InventoryError::invalid_amount(
            "discountAmount",
            "must not be negative",
        ));
    }
    check_percentage("discountPercentage", discount_percentage)?;
    check_stored("amount", amount)?;
    check_stored("unitPrice", unit_price)?;
    check_stored("discountAmount", discount_amount)?;

    let base_amount = amount
        .checked_mul(unit_price)
        .ok_or_else(|| too_large("amount"))?;
    let hundred = Decimal::ONE_HUNDRED;

    let (discount_amount, discount_percentage) = if discount_percentage > Decimal::ZERO {
        let discount = base_amount
            .checked_mul(discount_percentage / hundred)
            .ok_or_else(|| too_large("discountPercentage"))?;
        (discount, discount_percentage)
    } else if discount_amount > Decimal::ZERO {
        let pct = if base_amount.is_zero() {
            Decimal::ZERO
        } else {
            hundred
                .checked_mul(discount_amount)
                .and_then(|scaled| scaled.checked_div(base_amount))
                .ok_or_else(|| too_large("discountAmount"))?
        };
        (discount_amount, pct)
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let total = (base_amount - discount_amount).max(Decimal::ZERO);

    Ok(PricedLine {
        base_amount: round_money(base_amount),
        discount_amount: round_money(discount_amount),
        discount_percentage: discount_percentage.round_dp(4),
        total: round_money(total),
    })
}

/// Header totals of a purchase or sale
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

/// `total = subtotal - discount + subtotal * taxRate / 100 + shipping`
pub fn document_totals<I>(
    line_totals: I,
    discount_amount: Decimal,
    tax_rate: Decimal,
    shipping_cost: Decimal,
) -> Result<DocumentTotals, InventoryError>
where
    I: IntoIterator<Item = Decimal>,
{
    if discount_amount < Decimal::ZERO {
        return Err(InventoryError::invalid_amount(
            "discountAmount",
            "must not be negative",
        ));
    }
    if shipping_cost < Decimal::ZERO {
        return Err(InventoryError::invalid_amount(
            "shippingCost",
            "must not be negative",
        ));
    }
    check_percentage("taxRate", tax_rate)?;
    check_stored("discountAmount", discount_amount)?;
    check_stored("shippingCost", shipping_cost)?;

    let subtotal = line_totals
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line))
        .ok_or_else(|| too_large("subtotal"))?;
    let subtotal = round_money(subtotal);
    let discount_amount = round_money(discount_amount);
    let shipping_cost = round_money(shipping_cost);
    let tax_amount = subtotal
        .checked_mul(tax_rate / Decimal::ONE_HUNDRED)
        .map(round_money)
        .ok_or_else(|| too_large("taxRate"))?;
    let total = (subtotal - discount_amount)
        .checked_add(tax_amount)
        .and_then(|total| total.checked_add(shipping_cost))
        .ok_or_else(|| too_large("total"))?;

    Ok(DocumentTotals {
        subtotal,
        discount_amount,
        tax_rate,
        tax_amount,
        shipping_cost,
        total: round_money(total),
    })
}

fn check_percentage(field: &str, value: Decimal) -> Result<(), InventoryError> {
    validate_percentage(value).map_err(|msg| InventoryError::invalid_amount(field, msg))
}

fn check_stored(field: &str, value: Decimal) -> Result<(), InventoryError> {
    validate_stored_value(value).map_err(|msg| InventoryError::invalid_amount(field, msg))
}
