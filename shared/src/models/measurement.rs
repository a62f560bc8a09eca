//! Measurement model: the five tracking dimensions and their units
//!
//! An item counts stock in exactly one dimension. Line items carry a tagged
//! [`Measurement`] whose kind must equal the item's tracking type. Units are stored
//! as declared; no conversion is performed.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Neg, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InventoryError;

text_enum! {
    /// Dimension in which an item's stock is counted
    #[derive(Default, PartialOrd, Ord)]
    TrackingType {
        #[default]
        Quantity => "quantity",
        Weight => "weight",
        Length => "length",
        Area => "area",
        Volume => "volume",
    }
}

text_enum! {
    WeightUnit {
        Oz => "oz",
        Lb => "lb",
        G => "g",
        Kg => "kg",
    }
}

text_enum! {
    LengthUnit {
        Mm => "mm",
        Cm => "cm",
        M => "m",
        In => "in",
        Ft => "ft",
        Yd => "yd",
    }
}

text_enum! {
    AreaUnit {
        Sqft => "sqft",
        Sqm => "sqm",
        Sqyd => "sqyd",
        Acre => "acre",
        Ha => "ha",
    }
}

text_enum! {
    VolumeUnit {
        Ml => "ml",
        L => "l",
        Gal => "gal",
        Floz => "floz",
        CuFt => "cu_ft",
        CuM => "cu_m",
    }
}

/// A single amount in one tracking dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Quantity {
        value: Decimal,
    },
    Weight {
        value: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<WeightUnit>,
    },
    Length {
        value: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<LengthUnit>,
    },
    Area {
        value: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<AreaUnit>,
    },
    Volume {
        value: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<VolumeUnit>,
    },
}

impl Measurement {
    pub fn kind(&self) -> TrackingType {
        match self {
            Measurement::Quantity { .. } => TrackingType::Quantity,
            Measurement::Weight { .. } => TrackingType::Weight,
            Measurement::Length { .. } => TrackingType::Length,
            Measurement::Area { .. } => TrackingType::Area,
            Measurement::Volume { .. } => TrackingType::Volume,
        }
    }

    pub fn value(&self) -> Decimal {
        match *self {
            Measurement::Quantity { value }
            | Measurement::Weight { value, .. }
            | Measurement::Length { value, .. }
            | Measurement::Area { value, .. }
            | Measurement::Volume { value, .. } => value,
        }
    }

    /// Declared unit label, if any (quantity has none)
    pub fn unit_label(&self) -> Option<&'static str> {
        match self {
            Measurement::Quantity { .. } => None,
            Measurement::Weight { unit, .. } => unit.map(|u| u.as_str()),
            Measurement::Length { unit, .. } => unit.map(|u| u.as_str()),
            Measurement::Area { unit, .. } => unit.map(|u| u.as_str()),
            Measurement::Volume { unit, .. } => unit.map(|u| u.as_str()),
        }
    }

    pub fn quantity(value: Decimal) -> Self {
        Measurement::Quantity { value }
    }

    pub fn weight(value: Decimal, unit: WeightUnit) -> Self {
        Measurement::Weight {
            value,
            unit: Some(unit),
        }
    }
}

/// Flat measurement fields as they appear on components and request payloads
///
/// At most one dimension is expected to be filled; [`MeasurementFields::measurement`]
/// picks the one the caller asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_unit: Option<WeightUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_unit: Option<LengthUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_unit: Option<AreaUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_unit: Option<VolumeUnit>,
}

impl MeasurementFields {
    /// Measurement in the requested dimension, when a value is present
    pub fn measurement(&self, kind: TrackingType) -> Option<Measurement> {
        match kind {
            TrackingType::Quantity => self.quantity.map(|value| Measurement::Quantity { value }),
            TrackingType::Weight => self.weight.map(|value| Measurement::Weight {
                value,
                unit: self.weight_unit,
            }),
            TrackingType::Length => self.length.map(|value| Measurement::Length {
                value,
                unit: self.length_unit,
            }),
            TrackingType::Area => self.area.map(|value| Measurement::Area {
                value,
                unit: self.area_unit,
            }),
            TrackingType::Volume => self.volume.map(|value| Measurement::Volume {
                value,
                unit: self.volume_unit,
            }),
        }
    }

    /// Like [`Self::measurement`] but fails when the value is absent
    pub fn require(&self, item: Uuid, kind: TrackingType) -> Result<Measurement, InventoryError> {
        self.measurement(kind)
            .ok_or(InventoryError::MissingMeasurement { item, kind })
    }

    /// First filled dimension, in declaration order
    pub fn first_present(&self) -> Option<Measurement> {
        TrackingType::ALL
            .iter()
            .find_map(|kind| self.measurement(*kind))
    }

    pub fn from_measurement(measurement: &Measurement) -> Self {
        let mut fields = MeasurementFields::default();
        match *measurement {
            Measurement::Quantity { value } => fields.quantity = Some(value),
            Measurement::Weight { value, unit } => {
                fields.weight = Some(value);
                fields.weight_unit = unit;
            }
            Measurement::Length { value, unit } => {
                fields.length = Some(value);
                fields.length_unit = unit;
            }
            Measurement::Area { value, unit } => {
                fields.area = Some(value);
                fields.area_unit = unit;
            }
            Measurement::Volume { value, unit } => {
                fields.volume = Some(value);
                fields.volume_unit = unit;
            }
        }
        fields
    }
}

/// One stock figure per dimension. Only the item's tracking dimension is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevels {
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub weight: Decimal,
    #[serde(default)]
    pub length: Decimal,
    #[serde(default)]
    pub area: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl StockLevels {
    pub fn of(measurement: &Measurement) -> Self {
        let mut levels = StockLevels::default();
        levels.set(measurement.kind(), measurement.value());
        levels
    }

    pub fn get(&self, kind: TrackingType) -> Decimal {
        match kind {
            TrackingType::Quantity => self.quantity,
            TrackingType::Weight => self.weight,
            TrackingType::Length => self.length,
            TrackingType::Area => self.area,
            TrackingType::Volume => self.volume,
        }
    }

    pub fn set(&mut self, kind: TrackingType, value: Decimal) {
        match kind {
            TrackingType::Quantity => self.quantity = value,
            TrackingType::Weight => self.weight = value,
            TrackingType::Length => self.length = value,
            TrackingType::Area => self.area = value,
            TrackingType::Volume => self.volume = value,
        }
    }

    pub fn add(&mut self, kind: TrackingType, delta: Decimal) {
        self.set(kind, self.get(kind) + delta);
    }

    pub fn is_zero(&self) -> bool {
        TrackingType::ALL.iter().all(|kind| self.get(*kind).is_zero())
    }

    /// Dimensions holding a negative figure
    pub fn negative_dimensions(&self) -> Vec<TrackingType> {
        TrackingType::ALL
            .iter()
            .copied()
            .filter(|kind| self.get(*kind) < Decimal::ZERO)
            .collect()
    }
}

impl Add for StockLevels {
    type Output = StockLevels;

    fn add(mut self, rhs: StockLevels) -> StockLevels {
        self += rhs;
        self
    }
}

impl AddAssign for StockLevels {
    fn add_assign(&mut self, rhs: StockLevels) {
        for kind in TrackingType::ALL {
            self.add(*kind, rhs.get(*kind));
        }
    }
}

impl Sub for StockLevels {
    type Output = StockLevels;

    fn sub(self, rhs: StockLevels) -> StockLevels {
        self + (-rhs)
    }
}

impl Neg for StockLevels {
    type Output = StockLevels;

    fn neg(self) -> StockLevels {
        StockLevels {
            quantity: -self.quantity,
            weight: -self.weight,
            length: -self.length,
            area: -self.area,
            volume: -self.volume,
        }
    }
}

/// Per-item measurement vectors keyed by item id
pub type MeasurementVectors = BTreeMap<Uuid, StockLevels>;

/// Fails when a line's measurement kind differs from the item's tracking type
pub fn ensure_tracking_match(
    item: Uuid,
    expected: TrackingType,
    actual: TrackingType,
) -> Result<(), InventoryError> {
    if expected == actual {
        Ok(())
    } else {
        Err(InventoryError::MeasurementMismatch {
            item,
            expected,
            actual,
        })
    }
}
