//! Inventory rebuild tests
//!
//! Runs the rebuilder against in-memory repositories:
//! - History replay restores stock and landed cost
//! - A second run changes nothing
//! - Failures are reported per item

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use inventory_tracker_backend::error::{AppError, AppResult};
use inventory_tracker_backend::repositories::{InventoryLedger, Revaluation};
use inventory_tracker_backend::services::InventoryRebuilder;
use rust_decimal::Decimal;
use shared::models::{
    Customer, Item, Measurement, PackInfo, PaymentMethod, PaymentStatus, Purchase,
    PurchaseLineItem, PurchaseStatus, Sale, SaleLineItem, SaleStatus, Supplier, TrackingType,
    WeightUnit,
};
use shared::rebuild::{ItemRebuildResult, PricePolicy};
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// In-memory ledger
// ============================================================================

#[derive(Default)]
struct MemoryStore {
    items: Mutex<HashMap<Uuid, Item>>,
    purchases: Mutex<Vec<Purchase>>,
    sales: Mutex<Vec<Sale>>,
    saves: Mutex<usize>,
    broken: Mutex<Option<Uuid>>,
    /// Sale committed once the rebuild has listed its items
    late_sale: Mutex<Option<Sale>>,
}

impl MemoryStore {
    fn insert_item(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    fn item(&self, id: Uuid) -> Item {
        self.items.lock().unwrap()[&id].clone()
    }

    fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    /// Records a completed sale the way the sale service does: stock and document together
    fn commit_sale(&self, sale: Sale) {
        let mut items = self.items.lock().unwrap();
        for line in &sale.items {
            if let Some(item) = items.get_mut(&line.item) {
                item.stock.add(line.sold_by(), -line.measurement.value());
            }
        }
        self.sales.lock().unwrap().push(sale);
    }
}

/// What a NUMERIC(20, 6) column and a JSONB document give back
fn as_stored(item: &Item) -> Item {
    let mut stored = item.clone();
    stored.cost = stored.cost.round_dp(6);
    stored.price = stored.price.round_dp(6);
    for kind in TrackingType::ALL {
        stored.stock.set(*kind, stored.stock.get(*kind).round_dp(6));
    }
    stored.pack_info = stored
        .pack_info
        .as_ref()
        .map(|pack| serde_json::from_value(serde_json::to_value(pack).unwrap()).unwrap());
    stored
}

#[async_trait]
impl InventoryLedger for MemoryStore {
    async fn item_ids(&self) -> AppResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.items.lock().unwrap().keys().copied().collect();
        ids.sort();
        if let Some(sale) = self.late_sale.lock().unwrap().take() {
            self.commit_sale(sale);
        }
        Ok(ids)
    }

    async fn revalue_item(
        &self,
        id: Uuid,
        revalue: Arc<Revaluation>,
    ) -> AppResult<Option<ItemRebuildResult>> {
        if *self.broken.lock().unwrap() == Some(id) {
            return Err(AppError::Internal("connection reset".to_string()));
        }

        // the items map stays locked for the whole read-modify-write
        let mut items = self.items.lock().unwrap();
        let Some(mut item) = items.get(&id).cloned() else {
            return Ok(None);
        };
        let purchases: Vec<Purchase> = self
            .purchases
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains_item(id))
            .cloned()
            .collect();
        let sales: Vec<Sale> = self
            .sales
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains_item(id))
            .cloned()
            .collect();

        let changes = revalue(&mut item, &purchases, &sales)?;
        if !changes.is_empty() {
            *self.saves.lock().unwrap() += 1;
            items.insert(id, as_stored(&item));
        }
        Ok(Some(ItemRebuildResult::new(&item, changes)))
    }
}

fn rebuilder(store: &Arc<MemoryStore>, policy: PricePolicy) -> InventoryRebuilder {
    InventoryRebuilder::new(store.clone(), 2, policy)
}

// ============================================================================
// Fixtures
// ============================================================================

fn purchase(item: Uuid, measurement: Measurement, cost: &str, status: PurchaseStatus, days_ago: i64) -> Purchase {
    let at = Utc::now() - Duration::days(days_ago);
    let total = measurement.value() * dec(cost);
    Purchase {
        id: Uuid::new_v4(),
        business_id: None,
        supplier: Supplier {
            name: "Mill Co".to_string(),
            ..Default::default()
        },
        items: vec![PurchaseLineItem {
            item,
            measurement,
            cost_per_unit: dec(cost),
            discount_amount: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            total_cost: total,
            package_info: None,
            is_asset: false,
            asset_info: None,
        }],
        invoice_number: None,
        purchase_date: at,
        subtotal: total,
        discount_amount: Decimal::ZERO,
        tax_rate: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        total,
        notes: None,
        payment_method: PaymentMethod::Cash,
        status,
        received_at: status.is_stock_live().then_some(at),
        created_at: at,
        updated_at: at,
    }
}

fn sale(item: Uuid, measurement: Measurement, status: SaleStatus, invoice: &str) -> Sale {
    let now = Utc::now();
    let total = measurement.value() * dec("2");
    Sale {
        id: Uuid::new_v4(),
        business_id: None,
        customer: Customer::default(),
        items: vec![SaleLineItem {
            item,
            measurement,
            price_per_unit: dec("2"),
            discount_amount: Decimal::ZERO,
            discount_percentage: Decimal::ZERO,
            total_price: total,
        }],
        invoice_number: invoice.to_string(),
        sale_date: now,
        subtotal: total,
        discount_amount: Decimal::ZERO,
        tax_rate: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        total,
        payment_method: PaymentMethod::Cash,
        payment_status: PaymentStatus::new(Decimal::ZERO, total),
        status,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

fn lb(value: &str) -> Measurement {
    Measurement::weight(dec(value), WeightUnit::Lb)
}

/// Flour bought at 50 lb for 1.2, 20 lb sold; stored figures overwritten with garbage
fn flour_store() -> (Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::default());
    let mut flour = Item::new("A1", "Flour", TrackingType::Weight);
    flour.weight_unit = Some(WeightUnit::Lb);
    flour.price = dec("2");
    flour.stock.weight = dec("999");
    flour.cost = dec("42");
    let id = flour.id;
    store.insert_item(flour);

    store
        .purchases
        .lock()
        .unwrap()
        .push(purchase(id, lb("50"), "1.2", PurchaseStatus::Received, 3));
    store
        .sales
        .lock()
        .unwrap()
        .push(sale(id, lb("20"), SaleStatus::Completed, "0000000001"));
    (store, id)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_rebuild_item_restores_stock_and_cost() {
    let (store, id) = flour_store();

    let result = rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_item(id)
        .await
        .unwrap();

    let flour = store.item(id);
    assert_eq!(flour.stock.weight, dec("30"));
    assert_eq!(flour.cost, dec("1.2"));
    assert_eq!(flour.price, dec("2"));
    assert!(result.updated());
    assert_eq!(result.sku, "A1");
    assert!(result.changes.iter().any(|c| c.field == "weight" && c.from == dec("999")));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (store, id) = flour_store();
    let rebuilder = rebuilder(&store, PricePolicy::FollowCost);

    let first = rebuilder.rebuild_all().await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.updated, 1);
    let after_first = store.item(id);
    assert_eq!(after_first.price, dec("1.2"));

    let second = rebuilder.rebuild_all().await.unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.updated, 0);
    assert!(second.details[0].changes.is_empty());
    assert_eq!(store.item(id), after_first);
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_rebuild_ignores_documents_that_are_not_live() {
    let (store, id) = flour_store();
    store
        .purchases
        .lock()
        .unwrap()
        .push(purchase(id, lb("100"), "9", PurchaseStatus::Pending, 0));
    store
        .sales
        .lock()
        .unwrap()
        .push(sale(id, lb("10"), SaleStatus::Cancelled, "0000000002"));

    rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_item(id)
        .await
        .unwrap();

    let flour = store.item(id);
    assert_eq!(flour.stock.weight, dec("30"));
    assert_eq!(flour.cost, dec("1.2"));
}

#[tokio::test]
async fn test_rebuild_uses_newest_purchase_cost() {
    let (store, id) = flour_store();
    store
        .purchases
        .lock()
        .unwrap()
        .push(purchase(id, lb("10"), "1.5", PurchaseStatus::Received, 1));

    rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_item(id)
        .await
        .unwrap();

    let flour = store.item(id);
    assert_eq!(flour.stock.weight, dec("40"));
    assert_eq!(flour.cost, dec("1.5"));
}

#[tokio::test]
async fn test_rebuild_counts_packs_in_units() {
    let store = Arc::new(MemoryStore::default());
    let mut bolts = Item::new("B1", "Bolts", TrackingType::Quantity);
    bolts.pack_info = Some(PackInfo {
        is_pack: true,
        units_per_pack: dec("12"),
        cost_per_unit: None,
    });
    let id = bolts.id;
    store.insert_item(bolts);
    store.purchases.lock().unwrap().push(purchase(
        id,
        Measurement::quantity(dec("5")),
        "24",
        PurchaseStatus::Received,
        1,
    ));

    rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_item(id)
        .await
        .unwrap();

    let bolts = store.item(id);
    assert_eq!(bolts.stock.quantity, dec("60"));
    assert_eq!(bolts.cost, dec("2"));
    assert_eq!(bolts.pack_info.unwrap().cost_per_unit, Some(dec("2")));
}

#[tokio::test]
async fn test_rebuild_of_odd_pack_settles_after_storage() {
    let store = Arc::new(MemoryStore::default());
    let mut crates = Item::new("C7", "Crates", TrackingType::Quantity);
    crates.pack_info = Some(PackInfo {
        is_pack: true,
        units_per_pack: dec("7"),
        cost_per_unit: None,
    });
    let id = crates.id;
    store.insert_item(crates);
    store.purchases.lock().unwrap().push(purchase(
        id,
        Measurement::quantity(dec("5")),
        "24",
        PurchaseStatus::Received,
        1,
    ));
    let rebuilder = rebuilder(&store, PricePolicy::FollowCost);

    let first = rebuilder.rebuild_item(id).await.unwrap();
    assert!(first.updated());
    let crates = store.item(id);
    assert_eq!(crates.stock.quantity, dec("35"));
    assert_eq!(crates.cost, dec("3.428571"));
    assert_eq!(crates.price, dec("3.428571"));

    let second = rebuilder.rebuild_item(id).await.unwrap();
    assert!(second.changes.is_empty(), "{:?}", second.changes);
    assert_eq!(store.saves(), 1);
    assert_eq!(store.item(id), crates);
}

#[tokio::test]
async fn test_sale_committed_during_rebuild_is_kept() {
    let (store, id) = flour_store();
    *store.late_sale.lock().unwrap() = Some(sale(id, lb("5"), SaleStatus::Completed, "0000000002"));

    let summary = rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_all()
        .await
        .unwrap();
    assert_eq!(summary.errors, 0);

    // 50 bought, 20 and 5 sold
    assert_eq!(store.item(id).stock.weight, dec("25"));
    assert_eq!(store.sales.lock().unwrap().len(), 2);

    let again = rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_item(id)
        .await
        .unwrap();
    assert!(again.changes.is_empty());
}

#[tokio::test]
async fn test_rebuild_missing_item_is_not_found() {
    let store = Arc::new(MemoryStore::default());
    let err = rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_item(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_rebuild_all_records_failures_and_continues() {
    let (store, flour) = flour_store();
    let sugar = Item::new("A2", "Sugar", TrackingType::Weight);
    let sugar_id = sugar.id;
    store.insert_item(sugar);
    let extra = Item::new("A3", "Salt", TrackingType::Weight);
    store.insert_item(extra);
    *store.broken.lock().unwrap() = Some(sugar_id);

    let summary = rebuilder(&store, PricePolicy::KeepPrice)
        .rebuild_all()
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.updated, 1);
    let failed = summary
        .details
        .iter()
        .find(|d| d.item_id == sugar_id)
        .unwrap();
    assert!(failed.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(store.item(flour).stock.weight, dec("30"));
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Stock is purchases minus sales clamped at zero, and a second run is a no-op
        #[test]
        fn prop_rebuild_matches_history_and_settles(
            bought in prop::collection::vec(1u32..500u32, 0..6),
            sold in prop::collection::vec(1u32..500u32, 0..6),
            garbage in 0u32..10_000u32,
        ) {
            let store = Arc::new(MemoryStore::default());
            let mut item = Item::new("Q1", "Widget", TrackingType::Quantity);
            item.stock.quantity = Decimal::from(garbage);
            let id = item.id;
            store.insert_item(item);

            for (i, amount) in bought.iter().enumerate() {
                store.purchases.lock().unwrap().push(purchase(
                    id,
                    Measurement::quantity(Decimal::from(*amount)),
                    "3",
                    PurchaseStatus::Received,
                    i as i64 + 1,
                ));
            }
            for (i, amount) in sold.iter().enumerate() {
                store.sales.lock().unwrap().push(sale(
                    id,
                    Measurement::quantity(Decimal::from(*amount)),
                    SaleStatus::Completed,
                    &format!("{:010}", i + 1),
                ));
            }

            let rebuilder = rebuilder(&store, PricePolicy::FollowCost);
            tokio_test::block_on(rebuilder.rebuild_all()).unwrap();

            let purchased: u32 = bought.iter().sum();
            let consumed: u32 = sold.iter().sum();
            let expected = Decimal::from(purchased.saturating_sub(consumed));
            prop_assert_eq!(store.item(id).stock.quantity, expected);

            let settled = store.item(id);
            let second = tokio_test::block_on(rebuilder.rebuild_all()).unwrap();
            prop_assert_eq!(second.updated, 0);
            prop_assert_eq!(store.item(id), settled);
        }
    }
}
