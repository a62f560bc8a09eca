//! Rule violations raised by the inventory consistency engine

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TrackingType;

/// Errors produced by the pure inventory rules.
///
/// Every variant aborts the enclosing persistence transaction when raised from a mutator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InventoryError {
    #[error("Item {item} is tracked by {expected} but the line is measured by {actual}")]
    MeasurementMismatch {
        item: Uuid,
        expected: TrackingType,
        actual: TrackingType,
    },

    #[error("Line for item {item} has no {kind} value")]
    MissingMeasurement { item: Uuid, kind: TrackingType },

    #[error("Insufficient stock for item {item}: {available} available, {requested} requested ({kind})")]
    InsufficientStock {
        item: Uuid,
        kind: TrackingType,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    #[error("Invalid breakdown: {0}")]
    InvalidBreakdown(String),

    #[error("Item {0} is not part of this operation")]
    UnknownItem(Uuid),

    #[error("Asset is retired")]
    AssetRetired,

    #[error("Unknown {kind} value '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

impl InventoryError {
    pub fn invalid_amount(field: impl Into<String>, reason: impl Into<String>) -> Self {
        InventoryError::InvalidAmount {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Field name the error relates to, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            InventoryError::InvalidAmount { field, .. } => Some(field),
            InventoryError::MissingMeasurement { kind, .. } => Some(kind.as_str()),
            InventoryError::InsufficientStock { kind, .. } => Some(kind.as_str()),
            _ => None,
        }
    }
}
