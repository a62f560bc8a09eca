//! Stock consistency tests
//!
//! Drives the same delta arithmetic the purchase and sale services apply:
//! - Received purchases add exactly their line amounts
//! - Completed sales subtract and never drive stock negative
//! - Deleting a document restores the prior stock

use std::str::FromStr;

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::models::{
    Item, Measurement, MeasurementVectors, PackInfo, PurchaseLineItem, PurchaseStatus,
    SaleLineItem, SaleStatus, TrackingType, WeightUnit,
};
use shared::stock::{
    apply_stock_deltas, purchase_vectors, sale_vectors, stock_deltas, ItemIndex,
};
use shared::InventoryError;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn purchase_line(item: Uuid, measurement: Measurement, cost: &str) -> PurchaseLineItem {
    PurchaseLineItem {
        item,
        measurement,
        cost_per_unit: dec(cost),
        discount_amount: Decimal::ZERO,
        discount_percentage: Decimal::ZERO,
        total_cost: measurement.value() * dec(cost),
        package_info: None,
        is_asset: false,
        asset_info: None,
    }
}

fn sale_line(item: Uuid, measurement: Measurement) -> SaleLineItem {
    SaleLineItem {
        item,
        measurement,
        price_per_unit: dec("2"),
        discount_amount: Decimal::ZERO,
        discount_percentage: Decimal::ZERO,
        total_price: measurement.value() * dec("2"),
    }
}

fn index_of(item: Item) -> ItemIndex {
    let mut index = ItemIndex::new();
    index.insert(item.id, item);
    index
}

/// Applies the transition of one purchase from `old` to `new`
fn transition_purchase(
    index: &mut ItemIndex,
    old: (&[PurchaseLineItem], PurchaseStatus),
    new: (&[PurchaseLineItem], PurchaseStatus),
) -> Result<(), InventoryError> {
    let before = purchase_vectors(old.0, old.1, index)?;
    let after = purchase_vectors(new.0, new.1, index)?;
    apply_stock_deltas(index, &stock_deltas(&before, &after))?;
    Ok(())
}

fn transition_sale(
    index: &mut ItemIndex,
    old: (&[SaleLineItem], SaleStatus),
    new: (&[SaleLineItem], SaleStatus),
) -> Result<(), InventoryError> {
    let before = sale_vectors(old.0, old.1, index)?;
    let after = sale_vectors(new.0, new.1, index)?;
    apply_stock_deltas(index, &stock_deltas(&before, &after))?;
    Ok(())
}

fn flour() -> Item {
    let mut item = Item::new("A1", "Flour", TrackingType::Weight);
    item.weight_unit = Some(WeightUnit::Lb);
    item
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Received purchase then two sales, the second exceeding stock
    #[test]
    fn test_purchase_then_sales() {
        let item = flour();
        let id = item.id;
        let mut index = index_of(item);

        let bought = [purchase_line(id, Measurement::weight(dec("50"), WeightUnit::Lb), "1.2")];
        transition_purchase(&mut index, (&[], PurchaseStatus::Pending), (&bought, PurchaseStatus::Received))
            .unwrap();
        assert_eq!(index[&id].stock.weight, dec("50"));

        let first = [sale_line(id, Measurement::weight(dec("20"), WeightUnit::Lb))];
        transition_sale(&mut index, (&[], SaleStatus::Pending), (&first, SaleStatus::Completed))
            .unwrap();
        assert_eq!(index[&id].stock.weight, dec("30"));

        let second = [sale_line(id, Measurement::weight(dec("40"), WeightUnit::Lb))];
        let err = transition_sale(&mut index, (&[], SaleStatus::Pending), (&second, SaleStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
        assert_eq!(index[&id].stock.weight, dec("30"));
    }

    /// Pending purchases do not move stock until received
    #[test]
    fn test_status_transition_applies_once() {
        let item = flour();
        let id = item.id;
        let mut index = index_of(item);
        let lines = [purchase_line(id, Measurement::weight(dec("10"), WeightUnit::Lb), "1")];

        transition_purchase(&mut index, (&[], PurchaseStatus::Pending), (&lines, PurchaseStatus::Pending))
            .unwrap();
        assert_eq!(index[&id].stock.weight, Decimal::ZERO);

        transition_purchase(&mut index, (&lines, PurchaseStatus::Pending), (&lines, PurchaseStatus::Received))
            .unwrap();
        assert_eq!(index[&id].stock.weight, dec("10"));

        // received -> partially received keeps the stock
        transition_purchase(
            &mut index,
            (&lines, PurchaseStatus::Received),
            (&lines, PurchaseStatus::PartiallyReceived),
        )
        .unwrap();
        assert_eq!(index[&id].stock.weight, dec("10"));

        transition_purchase(&mut index, (&lines, PurchaseStatus::PartiallyReceived), (&lines, PurchaseStatus::Cancelled))
            .unwrap();
        assert_eq!(index[&id].stock.weight, Decimal::ZERO);
    }

    /// Editing a received line applies only the difference
    #[test]
    fn test_line_edit_applies_difference() {
        let item = flour();
        let id = item.id;
        let mut index = index_of(item);
        let old = [purchase_line(id, Measurement::weight(dec("10"), WeightUnit::Lb), "1")];
        let new = [purchase_line(id, Measurement::weight(dec("14"), WeightUnit::Lb), "1")];

        transition_purchase(&mut index, (&[], PurchaseStatus::Pending), (&old, PurchaseStatus::Received))
            .unwrap();
        transition_purchase(&mut index, (&old, PurchaseStatus::Received), (&new, PurchaseStatus::Received))
            .unwrap();
        assert_eq!(index[&id].stock.weight, dec("14"));
    }

    /// Five packs of twelve become sixty units
    #[test]
    fn test_pack_purchase_counts_units() {
        let mut item = Item::new("B1", "Bolts", TrackingType::Quantity);
        item.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("12"),
            cost_per_unit: None,
        });
        let id = item.id;
        let mut index = index_of(item);
        let lines = [purchase_line(id, Measurement::quantity(dec("5")), "24")];

        transition_purchase(&mut index, (&[], PurchaseStatus::Pending), (&lines, PurchaseStatus::Received))
            .unwrap();
        assert_eq!(index[&id].stock.quantity, dec("60"));
    }

    #[test]
    fn test_mismatched_dimension_is_rejected() {
        let item = flour();
        let id = item.id;
        let index = index_of(item);
        let lines = [purchase_line(id, Measurement::quantity(dec("3")), "1")];

        let err = purchase_vectors(&lines, PurchaseStatus::Received, &index).unwrap_err();
        assert!(matches!(err, InventoryError::MeasurementMismatch { .. }));
    }

    #[test]
    fn test_unknown_item_is_rejected() {
        let index = index_of(flour());
        let stranger = Uuid::new_v4();
        let lines = [sale_line(stranger, Measurement::quantity(dec("1")))];

        let err = sale_vectors(&lines, SaleStatus::Completed, &index).unwrap_err();
        assert_eq!(err, InventoryError::UnknownItem(stranger));
    }

    #[test]
    fn test_deltas_drop_unchanged_items() {
        let a = Uuid::new_v4();
        let mut old = MeasurementVectors::new();
        old.entry(a).or_default().add(TrackingType::Quantity, dec("3"));
        let new = old.clone();
        assert!(stock_deltas(&old, &new).is_empty());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn weight_strategy() -> impl Strategy<Value = Decimal> {
        (1u32..=10_000u32).prop_map(|cents| Decimal::new(cents as i64, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Received purchases sum straight into stock, minus completed sales
        #[test]
        fn prop_stock_is_sum_of_lines(
            bought in prop::collection::vec(weight_strategy(), 1..8),
            sell_share in 0u32..=100u32,
        ) {
            let item = flour();
            let id = item.id;
            let mut index = index_of(item);

            let mut total = Decimal::ZERO;
            for amount in &bought {
                let lines = [purchase_line(id, Measurement::weight(*amount, WeightUnit::Lb), "1")];
                transition_purchase(&mut index, (&[], PurchaseStatus::Pending), (&lines, PurchaseStatus::Received))
                    .unwrap();
                total += *amount;
            }
            prop_assert_eq!(index[&id].stock.weight, total);

            let sold = (total * Decimal::from(sell_share) / Decimal::ONE_HUNDRED).round_dp(2).min(total);
            if sold > Decimal::ZERO {
                let lines = [sale_line(id, Measurement::weight(sold, WeightUnit::Lb))];
                transition_sale(&mut index, (&[], SaleStatus::Pending), (&lines, SaleStatus::Completed))
                    .unwrap();
            }
            prop_assert_eq!(index[&id].stock.weight, total - sold);
            prop_assert!(index[&id].stock.weight >= Decimal::ZERO);
        }

        /// Deleting a received purchase restores the pre-create stock
        #[test]
        fn prop_delete_round_trips(
            start in weight_strategy(),
            amount in weight_strategy(),
        ) {
            let mut item = flour();
            item.stock.weight = start;
            let id = item.id;
            let mut index = index_of(item);
            let lines = [purchase_line(id, Measurement::weight(amount, WeightUnit::Lb), "1")];

            transition_purchase(&mut index, (&[], PurchaseStatus::Pending), (&lines, PurchaseStatus::Received))
                .unwrap();
            prop_assert_eq!(index[&id].stock.weight, start + amount);

            transition_purchase(&mut index, (&lines, PurchaseStatus::Received), (&[], PurchaseStatus::Pending))
                .unwrap();
            prop_assert_eq!(index[&id].stock.weight, start);
        }

        /// A sale larger than the stock fails and leaves the stock untouched
        #[test]
        fn prop_stock_never_negative(
            start in weight_strategy(),
            extra in weight_strategy(),
        ) {
            let mut item = flour();
            item.stock.weight = start;
            let id = item.id;
            let mut index = index_of(item);
            let lines = [sale_line(id, Measurement::weight(start + extra, WeightUnit::Lb))];

            let result = transition_sale(&mut index, (&[], SaleStatus::Pending), (&lines, SaleStatus::Completed));
            prop_assert!(result.is_err());
            prop_assert_eq!(index[&id].stock.weight, start);
        }
    }
}
