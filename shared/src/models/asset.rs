//! Capital asset models, maintenance scheduling and depreciation

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::Item;
use super::purchase::{Purchase, PurchaseLineItem};
use crate::error::InventoryError;

text_enum! {
    /// Asset lifecycle: `active -> retired`
    #[derive(Default)]
    AssetStatus {
        #[default]
        Active => "active",
        Retired => "retired",
    }
}

text_enum! {
    MaintenanceFrequency {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

impl MaintenanceFrequency {
    /// Next due date after `from`, using calendar months for the longer periods.
    ///
    /// Month arithmetic clamps to the last day of the target month (Jan 31 + 1 month = Feb 28/29).
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            MaintenanceFrequency::Daily => return from + Duration::days(1),
            MaintenanceFrequency::Weekly => return from + Duration::days(7),
            MaintenanceFrequency::Monthly => 1,
            MaintenanceFrequency::Quarterly => 3,
            MaintenanceFrequency::Yearly => 12,
        };
        from.checked_add_months(Months::new(months))
            .unwrap_or(from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSchedule {
    pub frequency: MaintenanceFrequency,
    #[serde(default)]
    pub last_maintenance: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_maintenance: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecord {
    pub date: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub performed_by: Option<String>,
    #[serde(default)]
    pub cost: Decimal,
    #[serde(default)]
    pub frequency: Option<MaintenanceFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<Uuid>,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub initial_cost: Decimal,
    pub current_value: Decimal,
    pub purchase_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub status: AssetStatus,
    pub location: Option<String>,
    pub assigned_to: Option<String>,
    pub serial_number: Option<String>,
    pub maintenance_schedule: Option<MaintenanceSchedule>,
    #[serde(default)]
    pub maintenance_history: Vec<MaintenanceRecord>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Appends a maintenance record and advances the schedule.
    ///
    /// The record's own frequency wins over the schedule's; without either the next date is left alone.
    pub fn record_maintenance(&mut self, record: MaintenanceRecord) -> Result<(), InventoryError> {
        if self.status == AssetStatus::Retired {
            return Err(InventoryError::AssetRetired);
        }
        if record.cost < Decimal::ZERO {
            return Err(InventoryError::invalid_amount("cost", "must not be negative"));
        }

        let frequency = record
            .frequency
            .or_else(|| self.maintenance_schedule.as_ref().map(|s| s.frequency));

        if let Some(frequency) = frequency {
            let schedule = self
                .maintenance_schedule
                .get_or_insert_with(|| MaintenanceSchedule {
                    frequency,
                    last_maintenance: None,
                    next_maintenance: None,
                });
            schedule.frequency = frequency;
            schedule.last_maintenance = Some(record.date);
            schedule.next_maintenance = Some(frequency.advance(record.date));
        } else if let Some(schedule) = self.maintenance_schedule.as_mut() {
            schedule.last_maintenance = Some(record.date);
        }

        self.maintenance_history.push(record);
        Ok(())
    }

    pub fn retire(&mut self) -> Result<(), InventoryError> {
        if self.status == AssetStatus::Retired {
            return Err(InventoryError::AssetRetired);
        }
        self.status = AssetStatus::Retired;
        Ok(())
    }

    /// Applies straight-line depreciation as of `as_of` and returns the new value
    pub fn depreciate(
        &mut self,
        useful_life_years: Decimal,
        salvage_value: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, InventoryError> {
        let start = self.purchase_date.unwrap_or(self.created_at);
        let elapsed_days = (as_of - start).num_days().max(0);
        let value = straight_line_value(
            self.initial_cost,
            salvage_value,
            useful_life_years,
            elapsed_days,
        )?;
        self.current_value = value;
        Ok(value)
    }
}

/// Straight-line book value after `elapsed_days` of a `useful_life_years` lifetime
pub fn straight_line_value(
    initial_cost: Decimal,
    salvage_value: Decimal,
    useful_life_years: Decimal,
    elapsed_days: i64,
) -> Result<Decimal, InventoryError> {
    if useful_life_years <= Decimal::ZERO {
        return Err(InventoryError::invalid_amount(
            "usefulLifeYears",
            "must be greater than zero",
        ));
    }
    if salvage_value < Decimal::ZERO || salvage_value > initial_cost {
        return Err(InventoryError::invalid_amount(
            "salvageValue",
            "must be between zero and the initial cost",
        ));
    }

    let lifetime_days = useful_life_years * Decimal::from(365);
    let fraction = (Decimal::from(elapsed_days.max(0)) / lifetime_days).min(Decimal::ONE);
    let value = initial_cost - (initial_cost - salvage_value) * fraction;
    Ok(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Asset fields ready to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub business_id: Option<Uuid>,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub initial_cost: Decimal,
    pub current_value: Decimal,
    pub purchase_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub status: AssetStatus,
    pub location: Option<String>,
    pub assigned_to: Option<String>,
    pub serial_number: Option<String>,
    pub maintenance_schedule: Option<MaintenanceSchedule>,
    pub notes: Option<String>,
}

/// Projects an asset-flagged purchase line into a new asset record.
///
/// Name and category come from `assetInfo` first, then from the item.
pub fn asset_from_purchase_line(
    purchase: &Purchase,
    line: &PurchaseLineItem,
    item: Option<&Item>,
) -> NewAsset {
    let info = line.asset_info.clone().unwrap_or_default();
    let name = info
        .name
        .or_else(|| item.map(|i| i.name.clone()))
        .unwrap_or_else(|| format!("Asset from purchase {}", purchase.id));
    let category = info
        .category
        .or_else(|| item.and_then(|i| i.category.clone()));

    NewAsset {
        business_id: purchase.business_id,
        name,
        category,
        description: item.and_then(|i| i.description.clone()),
        image_url: item.and_then(|i| i.image_url.clone()),
        initial_cost: line.total_cost,
        current_value: line.total_cost,
        purchase_id: Some(purchase.id),
        item_id: Some(line.item),
        purchase_date: Some(purchase.purchase_date),
        status: AssetStatus::Active,
        location: info.location,
        assigned_to: info.assigned_to,
        serial_number: info.serial_number,
        maintenance_schedule: None,
        notes: info.notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn asset() -> Asset {
        let now = date(2024, 1, 1);
        Asset {
            id: Uuid::new_v4(),
            business_id: None,
            name: "Mixer".to_string(),
            category: Some("Equipment".to_string()),
            description: None,
            image_url: None,
            initial_cost: dec("1000"),
            current_value: dec("1000"),
            purchase_id: None,
            item_id: None,
            purchase_date: Some(now),
            status: AssetStatus::Active,
            location: None,
            assigned_to: None,
            serial_number: None,
            maintenance_schedule: None,
            maintenance_history: Vec::new(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_frequency_advance() {
        let from = date(2024, 1, 31);
        assert_eq!(MaintenanceFrequency::Daily.advance(from), date(2024, 2, 1));
        assert_eq!(MaintenanceFrequency::Weekly.advance(from), date(2024, 2, 7));
        assert_eq!(MaintenanceFrequency::Monthly.advance(from), date(2024, 2, 29));
        assert_eq!(MaintenanceFrequency::Quarterly.advance(from), date(2024, 4, 30));
        assert_eq!(MaintenanceFrequency::Yearly.advance(from), date(2025, 1, 31));
    }

    #[test]
    fn test_record_maintenance_advances_schedule() {
        let mut asset = asset();
        asset.maintenance_schedule = Some(MaintenanceSchedule {
            frequency: MaintenanceFrequency::Quarterly,
            last_maintenance: None,
            next_maintenance: None,
        });

        asset
            .record_maintenance(MaintenanceRecord {
                date: date(2024, 3, 15),
                description: "Belt replaced".to_string(),
                performed_by: Some("Sam".to_string()),
                cost: dec("45.50"),
                frequency: None,
            })
            .unwrap();

        let schedule = asset.maintenance_schedule.as_ref().unwrap();
        assert_eq!(schedule.last_maintenance, Some(date(2024, 3, 15)));
        assert_eq!(schedule.next_maintenance, Some(date(2024, 6, 15)));
        assert_eq!(asset.maintenance_history.len(), 1);
    }

    #[test]
    fn test_record_frequency_creates_schedule() {
        let mut asset = asset();
        asset
            .record_maintenance(MaintenanceRecord {
                date: date(2024, 5, 1),
                description: "Inspection".to_string(),
                performed_by: None,
                cost: Decimal::ZERO,
                frequency: Some(MaintenanceFrequency::Weekly),
            })
            .unwrap();
        let schedule = asset.maintenance_schedule.unwrap();
        assert_eq!(schedule.frequency, MaintenanceFrequency::Weekly);
        assert_eq!(schedule.next_maintenance, Some(date(2024, 5, 8)));
    }

    #[test]
    fn test_retired_asset_rejects_maintenance() {
        let mut asset = asset();
        asset.retire().unwrap();
        assert_eq!(asset.retire(), Err(InventoryError::AssetRetired));
        let result = asset.record_maintenance(MaintenanceRecord {
            date: date(2024, 5, 1),
            description: "Too late".to_string(),
            performed_by: None,
            cost: Decimal::ZERO,
            frequency: None,
        });
        assert_eq!(result, Err(InventoryError::AssetRetired));
    }

    #[test]
    fn test_straight_line_value() {
        // Half of a two-year life
        let value = straight_line_value(dec("1000"), dec("200"), dec("2"), 365).unwrap();
        assert_eq!(value, dec("600"));
        // Past end of life stays at salvage
        let value = straight_line_value(dec("1000"), dec("200"), dec("2"), 5000).unwrap();
        assert_eq!(value, dec("200"));
        assert!(straight_line_value(dec("1000"), dec("0"), dec("0"), 10).is_err());
        assert!(straight_line_value(dec("1000"), dec("1500"), dec("3"), 10).is_err());
    }

    #[test]
    fn test_depreciate_uses_purchase_date() {
        let mut asset = asset();
        let value = asset
            .depreciate(dec("1"), Decimal::ZERO, date(2024, 1, 1) + Duration::days(73))
            .unwrap();
        assert_eq!(value, dec("800"));
        assert_eq!(asset.current_value, dec("800"));
    }
}
