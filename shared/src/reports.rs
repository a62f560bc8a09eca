//! Report rollups over purchases, sales and assets

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Asset, AssetStatus};
use crate::pricing::round_money;

/// Count, sum and mean of document totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsSummary {
    pub count: usize,
    pub total: Decimal,
    pub average: Decimal,
}

pub fn summarize_totals<I>(totals: I) -> TotalsSummary
where
    I: IntoIterator<Item = Decimal>,
{
    let (count, total) = totals
        .into_iter()
        .fold((0usize, Decimal::ZERO), |(n, sum), t| (n + 1, sum + t));
    if count == 0 {
        return TotalsSummary::default();
    }
    TotalsSummary {
        count,
        total: round_money(total),
        average: round_money(total / Decimal::from(count)),
    }
}

text_enum! {
    /// Trend bucket size
    #[derive(Default)]
    TrendInterval {
        #[default]
        Day => "day",
        Week => "week",
        Month => "month",
    }
}

impl TrendInterval {
    /// Bucket label: `2024-03-07`, `2024-W10` (ISO week) or `2024-03`
    pub fn label(&self, at: DateTime<Utc>) -> String {
        match self {
            TrendInterval::Day => at.format("%Y-%m-%d").to_string(),
            TrendInterval::Week => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            TrendInterval::Month => at.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub period: String,
    pub count: usize,
    pub total: Decimal,
    pub average: Decimal,
}

/// Groups `(date, total)` pairs into buckets, ordered by period
pub fn bucket_trends<I>(entries: I, interval: TrendInterval) -> Vec<TrendPoint>
where
    I: IntoIterator<Item = (DateTime<Utc>, Decimal)>,
{
    let mut buckets: BTreeMap<String, Vec<Decimal>> = BTreeMap::new();
    for (at, total) in entries {
        buckets.entry(interval.label(at)).or_default().push(total);
    }

    buckets
        .into_iter()
        .map(|(period, totals)| {
            let summary = summarize_totals(totals);
            TrendPoint {
                period,
                count: summary.count,
                total: summary.total,
                average: summary.average,
            }
        })
        .collect()
}

/// Label used for assets without a category
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCategorySummary {
    pub category: String,
    pub count: usize,
    pub active_count: usize,
    pub total_value: Decimal,
}

pub fn summarize_assets_by_category(assets: &[Asset]) -> Vec<AssetCategorySummary> {
    let mut groups: BTreeMap<String, AssetCategorySummary> = BTreeMap::new();
    for asset in assets {
        let category = asset
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        let group = groups
            .entry(category.clone())
            .or_insert_with(|| AssetCategorySummary {
                category,
                count: 0,
                active_count: 0,
                total_value: Decimal::ZERO,
            });
        group.count += 1;
        if asset.status == AssetStatus::Active {
            group.active_count += 1;
        }
        group.total_value += asset.current_value;
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_empty_range_is_zero() {
        assert_eq!(summarize_totals(Vec::new()), TotalsSummary::default());
    }

    #[test]
    fn test_summary_average() {
        let s = summarize_totals(vec![dec("10"), dec("20"), dec("0.01")]);
        assert_eq!(s.count, 3);
        assert_eq!(s.total, dec("30.01"));
        assert_eq!(s.average, dec("10.00"));
    }

    #[test]
    fn test_trend_buckets() {
        let d = |day: u32| Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        let entries = vec![(d(4), dec("5")), (d(5), dec("7")), (d(12), dec("1"))];

        let daily = bucket_trends(entries.clone(), TrendInterval::Day);
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].period, "2024-03-04");

        let weekly = bucket_trends(entries.clone(), TrendInterval::Week);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].period, "2024-W10");
        assert_eq!(weekly[0].total, dec("12"));

        let monthly = bucket_trends(entries, TrendInterval::Month);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].count, 3);
    }
}
