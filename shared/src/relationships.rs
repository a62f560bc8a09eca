//! Item relationship projection
//!
//! `components` and `derivedFrom` are the owning sides. `usedInProducts` and
//! `derivedItems` are back-references that are kept in step on every write and can be
//! rebuilt from the owning side at any time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InventoryError;
use crate::models::{
    Component, DerivedFrom, DerivedItemLink, Item, Measurement, MeasurementFields,
};

/// Distinct material ids referenced by a component list
pub fn component_ids(components: &[Component]) -> BTreeSet<Uuid> {
    components.iter().map(|c| c.item).collect()
}

/// Materials gained and lost by a product's component change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDiff {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl LinkDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Every material touched by the diff, ascending
    pub fn touched(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.added.iter().chain(&self.removed).copied().collect();
        ids.sort();
        ids
    }
}

pub fn diff_components(old: &[Component], new: &[Component]) -> LinkDiff {
    let old_ids = component_ids(old);
    let new_ids = component_ids(new);
    LinkDiff {
        added: new_ids.difference(&old_ids).copied().collect(),
        removed: old_ids.difference(&new_ids).copied().collect(),
    }
}

/// Adds `product` to the material's back-references; false when already present
pub fn link_product(material: &mut Item, product: Uuid) -> bool {
    if material.used_in_products.contains(&product) {
        return false;
    }
    material.used_in_products.push(product);
    true
}

/// Removes `product` from the material's back-references; false when absent
pub fn unlink_product(material: &mut Item, product: Uuid) -> bool {
    let before = material.used_in_products.len();
    material.used_in_products.retain(|id| *id != product);
    material.used_in_products.len() != before
}

/// Outcome of a full `usedInProducts` rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRebuild {
    pub products_processed: usize,
    pub materials_updated: usize,
}

/// Clears every `usedInProducts` list and re-derives it from product components.
///
/// Components pointing at items outside `items` are skipped and returned.
pub fn project_used_in(items: &mut [Item]) -> (RelationshipRebuild, Vec<(Uuid, Uuid)>) {
    let mut used_in: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    let mut products_processed = 0;

    for product in items.iter() {
        if !product.is_product() || product.components.is_empty() {
            continue;
        }
        products_processed += 1;
        for material in component_ids(&product.components) {
            let entry = used_in.entry(material).or_default();
            if !entry.contains(&product.id) {
                entry.push(product.id);
            }
        }
    }

    let mut materials_updated = 0;
    for item in items.iter_mut() {
        let projected = used_in.remove(&item.id).unwrap_or_default();
        if !projected.is_empty() {
            materials_updated += 1;
        }
        item.used_in_products = projected;
    }

    let missing = used_in
        .into_iter()
        .flat_map(|(material, products)| products.into_iter().map(move |p| (p, material)))
        .collect();

    (
        RelationshipRebuild {
            products_processed,
            materials_updated,
        },
        missing,
    )
}

/// One derived entry of a breakdown request: an existing item or a new one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEntry {
    #[serde(default)]
    pub item_id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub amount: MeasurementFields,
}

impl DerivedEntry {
    /// Name and SKU of a new item; an existing item needs neither
    pub fn new_item_fields(&self) -> Result<Option<(&str, &str)>, InventoryError> {
        if self.item_id.is_some() {
            return Ok(None);
        }
        match (self.name.as_deref(), self.sku.as_deref()) {
            (Some(name), Some(sku)) if !name.trim().is_empty() && !sku.trim().is_empty() => {
                Ok(Some((name, sku)))
            }
            _ => Err(InventoryError::InvalidBreakdown(
                "new derived items need a name and a sku".to_string(),
            )),
        }
    }
}

/// Measurement of a derived entry in the source item's tracking dimension
pub fn breakdown_measurement(
    source: &Item,
    amount: &MeasurementFields,
) -> Result<Measurement, InventoryError> {
    let measurement = amount.measurement(source.tracking_type).ok_or_else(|| {
        InventoryError::InvalidBreakdown(format!(
            "each derived entry needs a {} value",
            source.tracking_type
        ))
    })?;
    if measurement.value() <= rust_decimal::Decimal::ZERO {
        return Err(InventoryError::InvalidBreakdown(format!(
            "{} must be greater than zero",
            source.tracking_type
        )));
    }
    Ok(measurement)
}

/// Links `derived` under `source`, replacing any existing link for the same pair.
///
/// Returns the previous source when `derived` was derived from a different item.
pub fn attach_derived(
    source: &mut Item,
    derived: &mut Item,
    measurement: Measurement,
) -> Result<Option<Uuid>, InventoryError> {
    if source.id == derived.id {
        return Err(InventoryError::InvalidBreakdown(
            "an item cannot be derived from itself".to_string(),
        ));
    }

    let previous = derived
        .derived_from
        .as_ref()
        .map(|link| link.item)
        .filter(|id| *id != source.id);

    derived.derived_from = Some(DerivedFrom {
        item: source.id,
        measurement,
    });

    match source.derived_items.iter_mut().find(|l| l.item == derived.id) {
        Some(link) => link.measurement = measurement,
        None => source.derived_items.push(DerivedItemLink {
            item: derived.id,
            measurement,
        }),
    }
    Ok(previous)
}

/// Drops `derived` from the source's back-references; false when absent
pub fn detach_derived(source: &mut Item, derived: Uuid) -> bool {
    let before = source.derived_items.len();
    source.derived_items.retain(|link| link.item != derived);
    source.derived_items.len() != before
}

/// A broken pair of link lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asymmetry {
    /// The product lists the material as a component, the material does not list the product
    MissingUsedIn { material: Uuid, product: Uuid },
    /// The material lists the product, the product has no such component
    StaleUsedIn { material: Uuid, product: Uuid },
    /// The item names a source that does not list it
    MissingDerivedItem { source: Uuid, derived: Uuid },
    /// The source lists an item that is not derived from it
    StaleDerivedItem { source: Uuid, derived: Uuid },
}

impl Asymmetry {
    pub fn involves(&self, id: Uuid) -> bool {
        match *self {
            Asymmetry::MissingUsedIn { material, product }
            | Asymmetry::StaleUsedIn { material, product } => material == id || product == id,
            Asymmetry::MissingDerivedItem { source, derived }
            | Asymmetry::StaleDerivedItem { source, derived } => source == id || derived == id,
        }
    }
}

/// Checks both link pairs across the given items, sorted
pub fn find_asymmetries(items: &[Item]) -> Vec<Asymmetry> {
    let by_id: BTreeMap<Uuid, &Item> = items.iter().map(|i| (i.id, i)).collect();
    let mut found = BTreeSet::new();

    for item in items {
        for material in component_ids(&item.components) {
            if let Some(m) = by_id.get(&material) {
                if !m.used_in_products.contains(&item.id) {
                    found.insert(Asymmetry::MissingUsedIn {
                        material,
                        product: item.id,
                    });
                }
            }
        }

        for product in &item.used_in_products {
            let references = by_id
                .get(product)
                .map(|p| p.components.iter().any(|c| c.item == item.id))
                .unwrap_or(false);
            if !references {
                found.insert(Asymmetry::StaleUsedIn {
                    material: item.id,
                    product: *product,
                });
            }
        }

        if let Some(link) = &item.derived_from {
            if let Some(source) = by_id.get(&link.item) {
                if !source.derived_items.iter().any(|d| d.item == item.id) {
                    found.insert(Asymmetry::MissingDerivedItem {
                        source: link.item,
                        derived: item.id,
                    });
                }
            }
        }

        for link in &item.derived_items {
            let points_back = by_id
                .get(&link.item)
                .and_then(|d| d.derived_from.as_ref())
                .map(|from| from.item == item.id)
                .unwrap_or(false);
            if !points_back {
                found.insert(Asymmetry::StaleDerivedItem {
                    source: item.id,
                    derived: link.item,
                });
            }
        }
    }

    found.into_iter().collect()
}
