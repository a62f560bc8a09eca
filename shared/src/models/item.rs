//! Item models: materials, products and their relationship links

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::measurement::{
    AreaUnit, LengthUnit, Measurement, MeasurementFields, StockLevels, TrackingType, VolumeUnit,
    WeightUnit,
};

text_enum! {
    /// Whether an item is consumed, sold, or both
    #[derive(Default)]
    ItemType {
        #[default]
        Material => "material",
        Product => "product",
        Both => "both",
    }
}

text_enum! {
    /// How the sell price is expressed
    #[derive(Default)]
    PriceType {
        #[default]
        Each => "each",
        PerWeightUnit => "per_weight_unit",
        PerLengthUnit => "per_length_unit",
        PerAreaUnit => "per_area_unit",
        PerVolumeUnit => "per_volume_unit",
    }
}

/// Pack purchasing information. With `is_pack`, purchased quantities are counted in packs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackInfo {
    #[serde(default)]
    pub is_pack: bool,
    #[serde(default = "default_units_per_pack")]
    pub units_per_pack: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_unit: Option<Decimal>,
}

fn default_units_per_pack() -> Decimal {
    Decimal::ONE
}

impl PackInfo {
    /// True when purchases must be multiplied by `units_per_pack`
    pub fn applies(&self) -> bool {
        self.is_pack && self.units_per_pack > Decimal::ZERO
    }
}

/// A material consumed to make one unit of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub item: Uuid,
    #[serde(flatten)]
    pub amount: MeasurementFields,
}

/// Source link of an item broken out of another item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFrom {
    pub item: Uuid,
    pub measurement: Measurement,
}

/// Back-reference from a source item to one of its derived items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedItemLink {
    pub item: Uuid,
    pub measurement: Measurement,
}

/// A tracked material, product, or both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Uuid>,
    /// Business-unique stock keeping unit
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub item_type: ItemType,
    pub tracking_type: TrackingType,
    #[serde(flatten)]
    pub stock: StockLevels,
    pub weight_unit: Option<WeightUnit>,
    pub length_unit: Option<LengthUnit>,
    pub area_unit: Option<AreaUnit>,
    pub volume_unit: Option<VolumeUnit>,
    pub price: Decimal,
    pub price_type: PriceType,
    /// Unit cost from the most recent received purchase
    pub cost: Decimal,
    pub pack_info: Option<PackInfo>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub used_in_products: Vec<Uuid>,
    pub derived_from: Option<DerivedFrom>,
    #[serde(default)]
    pub derived_items: Vec<DerivedItemLink>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Bare item with zero stock, used for new records and tests
    pub fn new(sku: impl Into<String>, name: impl Into<String>, tracking_type: TrackingType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            business_id: None,
            sku: sku.into(),
            name: name.into(),
            category: None,
            description: None,
            image_url: None,
            tags: Vec::new(),
            item_type: ItemType::Material,
            tracking_type,
            stock: StockLevels::default(),
            weight_unit: None,
            length_unit: None,
            area_unit: None,
            volume_unit: None,
            price: Decimal::ZERO,
            price_type: PriceType::Each,
            cost: Decimal::ZERO,
            pack_info: None,
            components: Vec::new(),
            used_in_products: Vec::new(),
            derived_from: None,
            derived_items: Vec::new(),
            last_updated: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_material(&self) -> bool {
        matches!(self.item_type, ItemType::Material | ItemType::Both)
    }

    pub fn is_product(&self) -> bool {
        matches!(self.item_type, ItemType::Product | ItemType::Both)
    }

    /// Stock in the authoritative dimension
    pub fn tracked_stock(&self) -> Decimal {
        self.stock.get(self.tracking_type)
    }

    /// Pack information that changes how purchases are counted
    pub fn active_pack(&self) -> Option<&PackInfo> {
        if !self.is_material() {
            return None;
        }
        self.pack_info.as_ref().filter(|pack| pack.applies())
    }

    /// True when any other record may point at this item through a link list
    pub fn has_inbound_links(&self) -> bool {
        !self.used_in_products.is_empty() || !self.derived_items.is_empty()
    }
}

/// Compact view used when expanding references (`?populate=true`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    pub tracking_type: TrackingType,
    pub image_url: Option<String>,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            sku: item.sku.clone(),
            name: item.name.clone(),
            item_type: item.item_type,
            tracking_type: item.tracking_type,
            image_url: item.image_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_json_is_camel_case_with_flat_stock() {
        let mut item = Item::new("A1", "Flour", TrackingType::Weight);
        item.stock.weight = Decimal::from(50);
        item.weight_unit = Some(WeightUnit::Lb);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["trackingType"], "weight");
        assert_eq!(json["weightUnit"], "lb");
        assert_eq!(json["weight"], 50.0);
        assert!(json.get("usedInProducts").is_some());

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_pack_applies_only_to_materials() {
        let mut item = Item::new("P1", "Bolts", TrackingType::Quantity);
        item.pack_info = Some(PackInfo {
            is_pack: true,
            units_per_pack: Decimal::from(12),
            cost_per_unit: None,
        });
        assert!(item.active_pack().is_some());

        item.item_type = ItemType::Product;
        assert!(item.active_pack().is_none());

        item.item_type = ItemType::Both;
        item.pack_info.as_mut().unwrap().is_pack = false;
        assert!(item.active_pack().is_none());
    }

    #[test]
    fn test_component_fields_are_flattened() {
        let component: Component = serde_json::from_str(
            r#"{"item":"6f1c1c3e-2f9b-4c38-9d4b-0b7f4a1f9e11","quantity":3}"#,
        )
        .unwrap();
        assert_eq!(component.amount.quantity, Some(Decimal::from(3)));
        assert!(component.amount.weight.is_none());
    }
}
