//! Validation utilities for the inventory tracker

use rust_decimal::Decimal;

use crate::models::{Item, ItemType, TrackingType};

// ============================================================================
// Amounts
// ============================================================================

/// Validate a decimal is zero or positive
pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        return Err("Value cannot be negative");
    }
    Ok(())
}

/// Validate a percentage is in 0..=100
pub fn validate_percentage(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Decimal places kept by the stored stock, cost and price columns
pub const STORED_SCALE: u32 = 6;

/// Largest magnitude the stored `NUMERIC(20, 6)` columns hold
pub fn max_stored_value() -> Decimal {
    Decimal::new(99_999_999_999_999, 0)
}

/// Validate a value fits the stored columns
pub fn validate_stored_value(value: Decimal) -> Result<(), &'static str> {
    if value.abs() > max_stored_value() {
        return Err("Value exceeds 99999999999999");
    }
    Ok(())
}

/// Validate a line measurement is strictly positive and storable as is
pub fn validate_line_amount(value: Decimal) -> Result<(), &'static str> {
    if value <= Decimal::ZERO {
        return Err("Line amount must be greater than zero");
    }
    validate_stored_value(value)?;
    if value.normalize().scale() > STORED_SCALE {
        return Err("Line amount allows at most 6 decimal places");
    }
    Ok(())
}

// ============================================================================
// Items
// ============================================================================

/// Validate SKU format (1-64 chars, alphanumeric plus `-`, `_`, `.`)
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    if sku.trim().is_empty() {
        return Err("SKU is required");
    }
    if sku.len() > 64 {
        return Err("SKU must be at most 64 characters");
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("SKU may only contain letters, digits, '-', '_' and '.'");
    }
    Ok(())
}

/// Validate the stored figures of an item before it is written
pub fn validate_item(item: &Item) -> Result<(), &'static str> {
    validate_sku(&item.sku)?;
    if item.name.trim().is_empty() {
        return Err("Name is required");
    }
    if !item.stock.negative_dimensions().is_empty() {
        return Err("Stock levels cannot be negative");
    }
    validate_non_negative(item.price).map_err(|_| "Price cannot be negative")?;
    validate_non_negative(item.cost).map_err(|_| "Cost cannot be negative")?;
    if let Some(pack) = &item.pack_info {
        if pack.is_pack && pack.units_per_pack <= Decimal::ZERO {
            return Err("Units per pack must be greater than zero");
        }
        validate_stored_value(pack.units_per_pack)?;
    }
    if item.item_type == ItemType::Material && !item.components.is_empty() {
        return Err("Only products can have components");
    }
    Ok(())
}

/// Validate the unit field of a non-quantity item is set
pub fn validate_tracking_unit(item: &Item) -> Result<(), &'static str> {
    let has_unit = match item.tracking_type {
        TrackingType::Quantity => true,
        TrackingType::Weight => item.weight_unit.is_some(),
        TrackingType::Length => item.length_unit.is_some(),
        TrackingType::Area => item.area_unit.is_some(),
        TrackingType::Volume => item.volume_unit.is_some(),
    };
    if has_unit {
        Ok(())
    } else {
        Err("A unit is required for the tracking type")
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// Maximum accepted image size in bytes (5 MiB)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted image MIME types
pub const IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Validate an image upload's MIME type and size
pub fn validate_image(content_type: &str, len: usize) -> Result<(), &'static str> {
    if !IMAGE_CONTENT_TYPES.contains(&content_type) {
        return Err("Only JPEG, PNG, GIF and WebP images are allowed");
    }
    if len == 0 {
        return Err("Image is empty");
    }
    if len > MAX_IMAGE_BYTES {
        return Err("Image exceeds the 5 MiB limit");
    }
    Ok(())
}

/// File extension for a stored image, from the filename or the MIME type
pub fn image_extension(filename: Option<&str>, content_type: &str) -> &'static str {
    let from_name = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match from_name.as_deref() {
        Some("jpg") | Some("jpeg") => return "jpg",
        Some("png") => return "png",
        Some("gif") => return "gif",
        Some("webp") => return "webp",
        _ => {}
    }
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.contains('@') && email.contains('.') && email.len() >= 5 {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Component, MeasurementFields, WeightUnit};

    #[test]
    fn test_sku_rules() {
        assert!(validate_sku("A1").is_ok());
        assert!(validate_sku("0000000001").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
    }

    #[test]
    fn test_line_amount_bounds() {
        use std::str::FromStr;
        assert!(validate_line_amount(Decimal::from_str("0.000001").unwrap()).is_ok());
        assert!(validate_line_amount(Decimal::from_str("2.5000000").unwrap()).is_ok());
        assert!(validate_line_amount(Decimal::from_str("0.0000001").unwrap()).is_err());
        assert!(validate_line_amount(max_stored_value()).is_ok());
        assert!(validate_line_amount(max_stored_value() + Decimal::ONE).is_err());
        assert!(validate_line_amount(Decimal::from_scientific("1e28").unwrap()).is_err());
        assert!(validate_line_amount(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_validate_item() {
        let mut item = Item::new("A1", "Flour", TrackingType::Weight);
        assert!(validate_item(&item).is_ok());
        assert!(validate_tracking_unit(&item).is_err());
        item.weight_unit = Some(WeightUnit::Lb);
        assert!(validate_tracking_unit(&item).is_ok());

        item.stock.weight = Decimal::NEGATIVE_ONE;
        assert!(validate_item(&item).is_err());
        item.stock.weight = Decimal::ZERO;

        item.components.push(Component {
            item: uuid::Uuid::new_v4(),
            amount: MeasurementFields::default(),
        });
        assert!(validate_item(&item).is_err());
        item.item_type = ItemType::Product;
        assert!(validate_item(&item).is_ok());
    }

    #[test]
    fn test_image_rules() {
        assert!(validate_image("image/png", 1024).is_ok());
        assert!(validate_image("image/svg+xml", 1024).is_err());
        assert!(validate_image("image/jpeg", MAX_IMAGE_BYTES + 1).is_err());
        assert!(validate_image("image/jpeg", 0).is_err());
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension(Some("photo.JPEG"), "image/jpeg"), "jpg");
        assert_eq!(image_extension(Some("noext"), "image/webp"), "webp");
        assert_eq!(image_extension(None, "image/gif"), "gif");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("buyer@example.com").is_ok());
        assert!(validate_email("invalid").is_err());
    }
}
