//! Stock effects of purchases and sales
//!
//! A document's effect is a per-item vector of signed stock changes: purchases add,
//! sales subtract, and a document whose status is not stock-live has no effect.
//! Every mutation applies `effect(new) - effect(old)`, so creates, updates, status
//! transitions and deletes all go through the same arithmetic.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::InventoryError;
use crate::pricing::round_stored;
use crate::validation::validate_stored_value;
use crate::models::{
    ensure_tracking_match, Item, MeasurementVectors, PurchaseLineItem, PurchaseStatus,
    SaleLineItem, SaleStatus, StockLevels, TrackingType,
};

/// Items touched by a mutation, keyed by id
pub type ItemIndex = BTreeMap<Uuid, Item>;

/// Stock and cost effect of one received purchase line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PurchaseEffect {
    pub kind: TrackingType,
    pub delta: Decimal,
    pub cost_per_unit: Decimal,
}

/// Converts an amount and unit cost in purchased units into stock units of `item`.
///
/// Quantity lines of a pack material are counted in packs: the amount is multiplied
/// and the unit cost divided by `unitsPerPack`. Both results are rounded to the stored
/// scale, and the stock delta must fit the stored columns.
pub fn to_stock_units(
    item: &Item,
    kind: TrackingType,
    amount: Decimal,
    unit_cost: Decimal,
) -> Result<PurchaseEffect, InventoryError> {
    let (delta, cost) = match item.active_pack() {
        Some(pack) if kind == TrackingType::Quantity => (
            amount.checked_mul(pack.units_per_pack),
            unit_cost.checked_div(pack.units_per_pack),
        ),
        _ => (Some(amount), Some(unit_cost)),
    };

    let delta = delta
        .filter(|delta| validate_stored_value(*delta).is_ok())
        .ok_or_else(|| InventoryError::invalid_amount(kind.as_str(), "is too large"))?;
    let cost = cost.ok_or_else(|| InventoryError::invalid_amount("costPerUnit", "is too large"))?;

    Ok(PurchaseEffect {
        kind,
        delta: round_stored(delta),
        cost_per_unit: round_stored(cost),
    })
}

/// Converts a purchase line into stock units of its item
pub fn purchase_effect(item: &Item, line: &PurchaseLineItem) -> Result<PurchaseEffect, InventoryError> {
    let kind = line.purchased_by();
    ensure_tracking_match(item.id, item.tracking_type, kind)?;
    to_stock_units(item, kind, line.measurement.value(), line.cost_per_unit)
}

fn lookup<'a>(items: &'a ItemIndex, id: Uuid) -> Result<&'a Item, InventoryError> {
    items.get(&id).ok_or(InventoryError::UnknownItem(id))
}

/// Signed stock vector of a purchase; empty unless the status is live
pub fn purchase_vectors(
    lines: &[PurchaseLineItem],
    status: PurchaseStatus,
    items: &ItemIndex,
) -> Result<MeasurementVectors, InventoryError> {
    let mut vectors = MeasurementVectors::new();
    if !status.is_stock_live() {
        return Ok(vectors);
    }

    for line in lines {
        let item = lookup(items, line.item)?;
        let effect = purchase_effect(item, line)?;
        vectors
            .entry(line.item)
            .or_default()
            .add(effect.kind, effect.delta);
    }
    Ok(vectors)
}

/// Signed stock vector of a sale (negative amounts); empty unless completed
pub fn sale_vectors(
    lines: &[SaleLineItem],
    status: SaleStatus,
    items: &ItemIndex,
) -> Result<MeasurementVectors, InventoryError> {
    let mut vectors = MeasurementVectors::new();
    if !status.is_stock_live() {
        return Ok(vectors);
    }

    for line in lines {
        let item = lookup(items, line.item)?;
        ensure_tracking_match(item.id, item.tracking_type, line.sold_by())?;
        vectors
            .entry(line.item)
            .or_default()
            .add(line.sold_by(), -line.measurement.value());
    }
    Ok(vectors)
}

/// Per-item `new - old` over the union of both key sets, without zero entries
pub fn stock_deltas(old: &MeasurementVectors, new: &MeasurementVectors) -> MeasurementVectors {
    let mut deltas = MeasurementVectors::new();
    for id in old.keys().chain(new.keys()) {
        if deltas.contains_key(id) {
            continue;
        }
        let before = old.get(id).copied().unwrap_or_default();
        let after = new.get(id).copied().unwrap_or_default();
        let delta = after - before;
        if !delta.is_zero() {
            deltas.insert(*id, delta);
        }
    }
    deltas
}

/// Ids an item-level mutation has to load, ascending
pub fn affected_ids<'a, I>(ids: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = &'a Uuid>,
{
    let mut ids: Vec<Uuid> = ids.into_iter().copied().collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Before/after figures of one applied stock change
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub item: Uuid,
    pub kind: TrackingType,
    pub before: Decimal,
    pub after: Decimal,
}

/// Applies the tracked dimension of `delta` to the item.
///
/// Fails without touching the item when the result would be negative.
pub fn apply_stock_delta(
    item: &mut Item,
    delta: &StockLevels,
) -> Result<Option<StockChange>, InventoryError> {
    let kind = item.tracking_type;
    let change = delta.get(kind);
    if change.is_zero() {
        return Ok(None);
    }

    let before = item.stock.get(kind);
    let after = before + change;
    if validate_stored_value(after).is_err() {
        return Err(InventoryError::invalid_amount(
            kind.as_str(),
            "stock would exceed 99999999999999",
        ));
    }
    if after < Decimal::ZERO {
        return Err(InventoryError::InsufficientStock {
            item: item.id,
            kind,
            available: before,
            requested: -change,
        });
    }

    item.stock.set(kind, after);
    Ok(Some(StockChange {
        item: item.id,
        kind,
        before,
        after,
    }))
}

/// Applies every delta to the indexed items, failing on the first violation
pub fn apply_stock_deltas(
    items: &mut ItemIndex,
    deltas: &MeasurementVectors,
) -> Result<Vec<StockChange>, InventoryError> {
    let mut changes = Vec::new();
    for (id, delta) in deltas {
        let item = items.get_mut(id).ok_or(InventoryError::UnknownItem(*id))?;
        if let Some(change) = apply_stock_delta(item, delta)? {
            changes.push(change);
        }
    }
    Ok(changes)
}

/// Landed unit cost per item from a received purchase; later lines win
pub fn landed_costs(
    lines: &[PurchaseLineItem],
    items: &ItemIndex,
) -> Result<BTreeMap<Uuid, Decimal>, InventoryError> {
    let mut costs = BTreeMap::new();
    for line in lines {
        let item = lookup(items, line.item)?;
        let effect = purchase_effect(item, line)?;
        costs.insert(line.item, effect.cost_per_unit);
    }
    Ok(costs)
}

/// Sets `cost`, mirroring it into `packInfo.costPerUnit` for pack materials
pub fn apply_landed_cost(item: &mut Item, cost_per_unit: Decimal) -> bool {
    let pack_applies = item.active_pack().is_some();
    let mut changed = item.cost != cost_per_unit;
    item.cost = cost_per_unit;

    if pack_applies {
        if let Some(pack) = item.pack_info.as_mut() {
            changed |= pack.cost_per_unit != Some(cost_per_unit);
            pack.cost_per_unit = Some(cost_per_unit);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Measurement, PackInfo, WeightUnit};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(item: &Item, measurement: Measurement, cost: &str) -> PurchaseLineItem {
        PurchaseLineItem {
            item: item.id,
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

    fn index(items: &[&Item]) -> ItemIndex {
        items.iter().map(|i| (i.id, (*i).clone())).collect()
    }

    #[test]
    fn test_pack_purchase_converts_quantity_and_cost() {
        let mut bolts = Item::new("B1", "Bolts", TrackingType::Quantity);
        bolts.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("12"),
            cost_per_unit: None,
        });
        let effect = purchase_effect(&bolts, &line(&bolts, Measurement::quantity(dec("5")), "24")).unwrap();
        assert_eq!(effect.delta, dec("60"));
        assert_eq!(effect.cost_per_unit, dec("2"));
    }

    #[test]
    fn test_pack_cost_is_rounded_to_stored_scale() {
        let mut crates = Item::new("C7", "Crates", TrackingType::Quantity);
        crates.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("7"),
            cost_per_unit: None,
        });
        let effect = purchase_effect(&crates, &line(&crates, Measurement::quantity(dec("5")), "24")).unwrap();
        assert_eq!(effect.delta, dec("35"));
        assert_eq!(effect.cost_per_unit, dec("3.428571"));
    }

    #[test]
    fn test_oversized_pack_delta_is_rejected() {
        let mut crates = Item::new("C7", "Crates", TrackingType::Quantity);
        crates.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("1000000"),
            cost_per_unit: None,
        });
        let amount = dec("99999999999");
        let err = purchase_effect(&crates, &line(&crates, Measurement::quantity(amount), "1")).unwrap_err();
        assert_eq!(err.field(), Some("quantity"));
    }

    #[test]
    fn test_mismatched_line_is_rejected() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let result = purchase_effect(&flour, &line(&flour, Measurement::quantity(dec("5")), "1"));
        assert!(matches!(result, Err(InventoryError::MeasurementMismatch { .. })));
    }

    #[test]
    fn test_pending_purchase_has_no_effect() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let lines = vec![line(&flour, Measurement::weight(dec("50"), WeightUnit::Lb), "1.2")];
        let items = index(&[&flour]);
        assert!(purchase_vectors(&lines, PurchaseStatus::Pending, &items).unwrap().is_empty());
        let live = purchase_vectors(&lines, PurchaseStatus::Received, &items).unwrap();
        assert_eq!(live[&flour.id].weight, dec("50"));
    }

    #[test]
    fn test_sale_vectors_are_negative() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let lines = vec![SaleLineItem {
            item: flour.id,
            measurement: Measurement::weight(dec("20"), WeightUnit::Lb),
            price_per_unit: dec("2"),
            discount_amount: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            total_price: dec("40"),
        }];
        let vectors = sale_vectors(&lines, SaleStatus::Completed, &index(&[&flour])).unwrap();
        assert_eq!(vectors[&flour.id].weight, dec("-20"));
        assert!(sale_vectors(&lines, SaleStatus::Refunded, &index(&[&flour]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_deltas_cover_removed_and_added_items() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut old = MeasurementVectors::new();
        old.insert(a, StockLevels::of(&Measurement::quantity(dec("5"))));
        let mut new = MeasurementVectors::new();
        new.insert(b, StockLevels::of(&Measurement::quantity(dec("3"))));

        let deltas = stock_deltas(&old, &new);
        assert_eq!(deltas[&a].quantity, dec("-5"));
        assert_eq!(deltas[&b].quantity, dec("3"));
        assert!(stock_deltas(&new, &new).is_empty());
    }

    #[test]
    fn test_negative_stock_is_refused() {
        let mut flour = Item::new("A1", "Flour", TrackingType::Weight);
        flour.stock.weight = dec("30");
        let delta = StockLevels::of(&Measurement::weight(dec("-40"), WeightUnit::Lb));
        let err = apply_stock_delta(&mut flour, &delta).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                item: flour.id,
                kind: TrackingType::Weight,
                available: dec("30"),
                requested: dec("40"),
            }
        );
        assert_eq!(flour.stock.weight, dec("30"));
    }

    #[test]
    fn test_untracked_dimensions_are_ignored() {
        let mut flour = Item::new("A1", "Flour", TrackingType::Weight);
        let delta = StockLevels::of(&Measurement::quantity(dec("9")));
        assert_eq!(apply_stock_delta(&mut flour, &delta).unwrap(), None);
        assert!(flour.stock.is_zero());
    }

    #[test]
    fn test_landed_cost_updates_pack_info() {
        let mut bolts = Item::new("B1", "Bolts", TrackingType::Quantity);
        bolts.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("12"),
            cost_per_unit: None,
        });
        assert!(apply_landed_cost(&mut bolts, dec("2")));
        assert_eq!(bolts.cost, dec("2"));
        assert_eq!(bolts.pack_info.unwrap().cost_per_unit, Some(dec("2")));
    }
}
