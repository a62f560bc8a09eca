//! Recomputes item stock and cost from the transaction history

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InventoryError;
use crate::models::{Item, Purchase, PurchaseLineItem, Sale};
use crate::stock::to_stock_units;

text_enum! {
    /// What a rebuild does with the sell price once a landed cost is known
    #[derive(Default)]
    PricePolicy {
        /// The last landed cost also becomes the sell price
        #[default]
        FollowCost => "follow_cost",
        KeepPrice => "keep_price",
    }
}

/// Figures derived from an item's history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub purchased: Decimal,
    pub sold: Decimal,
    pub stock: Decimal,
    pub cost: Option<Decimal>,
    /// Lines measured in a dimension other than the item's tracking type
    pub skipped_lines: usize,
}

/// Stock units and landed unit cost of one purchase line.
///
/// The cost falls back to `totalCost / amount` and is `None` when the line carries neither.
fn line_effect(
    item: &Item,
    line: &PurchaseLineItem,
) -> Result<(Decimal, Option<Decimal>), InventoryError> {
    let amount = line.measurement.value();
    let per_purchased_unit = if line.cost_per_unit > Decimal::ZERO {
        Some(line.cost_per_unit)
    } else if line.total_cost > Decimal::ZERO && amount > Decimal::ZERO {
        line.total_cost.checked_div(amount)
    } else {
        None
    };

    let effect = to_stock_units(
        item,
        line.purchased_by(),
        amount,
        per_purchased_unit.unwrap_or_default(),
    )?;
    Ok((effect.delta, per_purchased_unit.map(|_| effect.cost_per_unit)))
}

/// Sums the stock-live history of `item` and finds its last landed cost.
///
/// Stock is clamped at zero. The cost comes from the newest live purchase by
/// `purchaseDate`, then `createdAt`; within that purchase the last line for the item wins.
/// Figures go through the same pack conversion and rounding as live purchases.
pub fn recompute_valuation(
    item: &Item,
    purchases: &[Purchase],
    sales: &[Sale],
) -> Result<Valuation, InventoryError> {
    let kind = item.tracking_type;
    let mut purchased = Decimal::ZERO;
    let mut sold = Decimal::ZERO;
    let mut skipped_lines = 0;

    let mut live: Vec<&Purchase> = purchases
        .iter()
        .filter(|p| p.status.is_stock_live())
        .collect();

    for purchase in &live {
        for line in purchase.lines_for(item.id) {
            if line.purchased_by() != kind {
                skipped_lines += 1;
                continue;
            }
            purchased += line_effect(item, line)?.0;
        }
    }

    for sale in sales.iter().filter(|s| s.status.is_stock_live()) {
        for line in sale.lines_for(item.id) {
            if line.sold_by() != kind {
                skipped_lines += 1;
                continue;
            }
            sold += line.measurement.value();
        }
    }

    live.sort_by(|a, b| {
        b.purchase_date
            .cmp(&a.purchase_date)
            .then(b.created_at.cmp(&a.created_at))
    });
    let mut cost = None;
    for purchase in &live {
        let last = purchase
            .lines_for(item.id)
            .filter(|line| line.purchased_by() == kind)
            .last();
        if let Some(line) = last {
            cost = line_effect(item, line)?.1;
            if cost.is_some() {
                break;
            }
        }
    }

    Ok(Valuation {
        purchased,
        sold,
        stock: (purchased - sold).max(Decimal::ZERO),
        cost,
        skipped_lines,
    })
}

/// One field rewritten by a rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub from: Decimal,
    pub to: Decimal,
}

/// Writes a valuation into the item and lists what changed.
///
/// `lastUpdated` is only stamped when something changed, so repeating a rebuild is a no-op.
pub fn apply_valuation(
    item: &mut Item,
    valuation: &Valuation,
    policy: PricePolicy,
    now: DateTime<Utc>,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let kind = item.tracking_type;

    let current = item.stock.get(kind);
    if current != valuation.stock {
        changes.push(FieldChange {
            field: kind.as_str().to_string(),
            from: current,
            to: valuation.stock,
        });
        item.stock.set(kind, valuation.stock);
    }

    if let Some(cost) = valuation.cost {
        if item.cost != cost {
            changes.push(FieldChange {
                field: "cost".to_string(),
                from: item.cost,
                to: cost,
            });
            item.cost = cost;
        }
        if item.active_pack().is_some() {
            if let Some(pack) = item.pack_info.as_mut() {
                if pack.cost_per_unit != Some(cost) {
                    changes.push(FieldChange {
                        field: "packInfo.costPerUnit".to_string(),
                        from: pack.cost_per_unit.unwrap_or_default(),
                        to: cost,
                    });
                    pack.cost_per_unit = Some(cost);
                }
            }
        }
        if policy == PricePolicy::FollowCost && item.price != cost {
            changes.push(FieldChange {
                field: "price".to_string(),
                from: item.price,
                to: cost,
            });
            item.price = cost;
        }
    }

    if !changes.is_empty() {
        item.last_updated = now;
        item.updated_at = now;
    }
    changes
}

/// Per-item rebuild outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRebuildResult {
    pub item_id: Uuid,
    pub sku: String,
    pub name: String,
    pub changes: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemRebuildResult {
    pub fn new(item: &Item, changes: Vec<FieldChange>) -> Self {
        Self {
            item_id: item.id,
            sku: item.sku.clone(),
            name: item.name.clone(),
            changes,
            error: None,
        }
    }

    pub fn failed(item_id: Uuid, error: impl ToString) -> Self {
        Self {
            item_id,
            sku: String::new(),
            name: String::new(),
            changes: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn updated(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Aggregate of a rebuild run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    pub processed: usize,
    pub updated: usize,
    pub errors: usize,
    pub details: Vec<ItemRebuildResult>,
}

impl RebuildSummary {
    pub fn record(&mut self, result: ItemRebuildResult) {
        self.processed += 1;
        if result.error.is_some() {
            self.errors += 1;
        } else if result.updated() {
            self.updated += 1;
        }
        self.details.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Measurement, PackInfo, PaymentMethod, PaymentStatus, PurchaseStatus, SaleLineItem,
        SaleStatus, Supplier, TrackingType, WeightUnit,
    };
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn purchase(item: &Item, m: Measurement, cost: &str, status: PurchaseStatus, days: i64) -> Purchase {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(days);
        Purchase {
            id: Uuid::new_v4(),
            business_id: None,
            supplier: Supplier::default(),
            items: vec![PurchaseLineItem {
                item: item.id,
                measurement: m,
                cost_per_unit: dec(cost),
                discount_amount: Decimal::ZERO,
                discount_percentage: Decimal::ZERO,
                total_cost: m.value() * dec(cost),
                package_info: None,
                is_asset: false,
                asset_info: None,
            }],
            invoice_number: None,
            purchase_date: date,
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            total: Decimal::ZERO,
            notes: None,
            payment_method: PaymentMethod::Cash,
            status,
            received_at: None,
            created_at: date,
            updated_at: date,
        }
    }

    fn sale(item: &Item, m: Measurement, status: SaleStatus) -> Sale {
        let now = Utc::now();
        Sale {
            id: Uuid::new_v4(),
            business_id: None,
            customer: Default::default(),
            items: vec![SaleLineItem {
                item: item.id,
                measurement: m,
                price_per_unit: Decimal::ONE,
                discount_amount: Decimal::ZERO,
                discount_percentage: Decimal::ZERO,
                total_price: m.value(),
            }],
            invoice_number: "000001".to_string(),
            sale_date: now,
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            total: Decimal::ZERO,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::new(Decimal::ZERO, Decimal::ZERO),
            status,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn lb(v: &str) -> Measurement {
        Measurement::weight(dec(v), WeightUnit::Lb)
    }

    #[test]
    fn test_valuation_sums_live_history() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let purchases = vec![
            purchase(&flour, lb("50"), "1.2", PurchaseStatus::Received, 0),
            purchase(&flour, lb("99"), "9", PurchaseStatus::Pending, 5),
            purchase(&flour, lb("99"), "9", PurchaseStatus::Cancelled, 6),
        ];
        let sales = vec![
            sale(&flour, lb("20"), SaleStatus::Completed),
            sale(&flour, lb("40"), SaleStatus::Cancelled),
        ];

        let v = recompute_valuation(&flour, &purchases, &sales).unwrap();
        assert_eq!(v.purchased, dec("50"));
        assert_eq!(v.sold, dec("20"));
        assert_eq!(v.stock, dec("30"));
        assert_eq!(v.cost, Some(dec("1.2")));
    }

    #[test]
    fn test_newest_purchase_sets_cost() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let purchases = vec![
            purchase(&flour, lb("10"), "3", PurchaseStatus::Received, 10),
            purchase(&flour, lb("10"), "1", PurchaseStatus::Received, 2),
        ];
        let v = recompute_valuation(&flour, &purchases, &[]).unwrap();
        assert_eq!(v.cost, Some(dec("3")));
    }

    #[test]
    fn test_cost_falls_back_to_total() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let mut p = purchase(&flour, lb("40"), "0", PurchaseStatus::Received, 0);
        p.items[0].total_cost = dec("60");
        let v = recompute_valuation(&flour, &[p], &[]).unwrap();
        assert_eq!(v.cost, Some(dec("1.5")));
    }

    #[test]
    fn test_stock_is_clamped_and_mismatches_skipped() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let purchases = vec![purchase(
            &flour,
            Measurement::quantity(dec("7")),
            "1",
            PurchaseStatus::Received,
            0,
        )];
        let sales = vec![sale(&flour, lb("5"), SaleStatus::Completed)];
        let v = recompute_valuation(&flour, &purchases, &sales).unwrap();
        assert_eq!(v.stock, Decimal::ZERO);
        assert_eq!(v.skipped_lines, 1);
        assert_eq!(v.cost, None);
    }

    #[test]
    fn test_pack_history_is_converted() {
        let mut bolts = Item::new("B1", "Bolts", TrackingType::Quantity);
        bolts.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("12"),
            cost_per_unit: None,
        });
        let purchases = vec![purchase(
            &bolts,
            Measurement::quantity(dec("5")),
            "24",
            PurchaseStatus::Received,
            0,
        )];
        let v = recompute_valuation(&bolts, &purchases, &[]).unwrap();
        assert_eq!(v.stock, dec("60"));
        assert_eq!(v.cost, Some(dec("2")));
    }

    /// Mimics a write and re-read: 6-dp numeric columns and a JSONB pack document
    fn reload(item: &Item) -> Item {
        let mut stored = item.clone();
        stored.cost = stored.cost.round_dp(6);
        stored.price = stored.price.round_dp(6);
        stored.stock.quantity = stored.stock.quantity.round_dp(6);
        stored.pack_info = stored
            .pack_info
            .as_ref()
            .map(|pack| serde_json::from_value(serde_json::to_value(pack).unwrap()).unwrap());
        stored
    }

    #[test]
    fn test_rebuild_settles_after_store_round_trip() {
        let mut crates = Item::new("C7", "Crates", TrackingType::Quantity);
        crates.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: dec("7"),
            cost_per_unit: None,
        });
        let purchases = vec![purchase(
            &crates,
            Measurement::quantity(dec("5")),
            "24",
            PurchaseStatus::Received,
            0,
        )];

        let valuation = recompute_valuation(&crates, &purchases, &[]).unwrap();
        assert_eq!(valuation.stock, dec("35"));
        assert_eq!(valuation.cost, Some(dec("3.428571")));

        let first = apply_valuation(&mut crates, &valuation, PricePolicy::FollowCost, Utc::now());
        assert_eq!(first.len(), 4);

        let mut stored = reload(&crates);
        let again = recompute_valuation(&stored, &purchases, &[]).unwrap();
        let second = apply_valuation(&mut stored, &again, PricePolicy::FollowCost, Utc::now());
        assert!(second.is_empty(), "{:?}", second);
    }

    #[test]
    fn test_long_unit_cost_is_rounded() {
        let flour = Item::new("A1", "Flour", TrackingType::Weight);
        let purchases = vec![purchase(&flour, lb("3"), "1.23456789", PurchaseStatus::Received, 0)];
        let v = recompute_valuation(&flour, &purchases, &[]).unwrap();
        assert_eq!(v.cost, Some(dec("1.234568")));
    }

    #[test]
    fn test_apply_valuation_is_idempotent() {
        let mut flour = Item::new("A1", "Flour", TrackingType::Weight);
        flour.stock.weight = dec("999");
        flour.cost = dec("-4");
        flour.price = dec("2");
        let stamp = flour.last_updated;

        let valuation = Valuation {
            purchased: dec("50"),
            sold: dec("20"),
            stock: dec("30"),
            cost: Some(dec("1.2")),
            skipped_lines: 0,
        };
        let now = stamp + Duration::seconds(5);
        let first = apply_valuation(&mut flour, &valuation, PricePolicy::FollowCost, now);
        assert_eq!(first.len(), 3);
        assert_eq!(flour.stock.weight, dec("30"));
        assert_eq!(flour.price, dec("1.2"));
        assert_eq!(flour.last_updated, now);

        let later = now + Duration::seconds(5);
        let second = apply_valuation(&mut flour, &valuation, PricePolicy::FollowCost, later);
        assert!(second.is_empty());
        assert_eq!(flour.last_updated, now);
    }

    #[test]
    fn test_keep_price_policy() {
        let mut flour = Item::new("A1", "Flour", TrackingType::Weight);
        flour.price = dec("2");
        let valuation = Valuation {
            purchased: Decimal::ZERO,
            sold: Decimal::ZERO,
            stock: Decimal::ZERO,
            cost: Some(dec("1.2")),
            skipped_lines: 0,
        };
        apply_valuation(&mut flour, &valuation, PricePolicy::KeepPrice, Utc::now());
        assert_eq!(flour.price, dec("2"));
        assert_eq!(flour.cost, dec("1.2"));
    }
}
