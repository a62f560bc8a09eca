//! Reporting service for date-range summaries, trends and data export

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{Purchase, Sale};
use shared::reports::{
    bucket_trends, summarize_assets_by_category, summarize_totals, AssetCategorySummary,
    TrendInterval, TrendPoint,
};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::repositories::{assets, purchases, sales};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// Query of the by-date reports
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub format: Option<String>, // "json" or "csv"
}

impl ReportQuery {
    pub fn wants_csv(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("csv"))
    }
}

/// Query of the trend reports; both dates are required
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<TrendInterval>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReport {
    pub total_purchases: usize,
    pub total_cost: Decimal,
    pub average_purchase_value: Decimal,
    pub purchases: Vec<Purchase>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleReport {
    pub total_sales: usize,
    pub total_revenue: Decimal,
    pub average_sale_value: Decimal,
    pub sales: Vec<Sale>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub group_by: TrendInterval,
    pub trends: Vec<TrendPoint>,
}

/// One CSV row of the purchase report
#[derive(Debug, Serialize)]
pub struct PurchaseCsvRow {
    pub id: String,
    pub purchase_date: String,
    pub supplier: String,
    pub invoice_number: String,
    pub status: &'static str,
    pub line_count: usize,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

impl From<&Purchase> for PurchaseCsvRow {
    fn from(p: &Purchase) -> Self {
        Self {
            id: p.id.to_string(),
            purchase_date: p.purchase_date.to_rfc3339(),
            supplier: p.supplier.name.clone(),
            invoice_number: p.invoice_number.clone().unwrap_or_default(),
            status: p.status.as_str(),
            line_count: p.items.len(),
            subtotal: p.subtotal,
            discount_amount: p.discount_amount,
            tax_amount: p.tax_amount,
            shipping_cost: p.shipping_cost,
            total: p.total,
        }
    }
}

/// One CSV row of the sale report
#[derive(Debug, Serialize)]
pub struct SaleCsvRow {
    pub id: String,
    pub sale_date: String,
    pub invoice_number: String,
    pub customer: String,
    pub status: &'static str,
    pub payment_status: &'static str,
    pub line_count: usize,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
}

impl From<&Sale> for SaleCsvRow {
    fn from(s: &Sale) -> Self {
        Self {
            id: s.id.to_string(),
            sale_date: s.sale_date.to_rfc3339(),
            invoice_number: s.invoice_number.clone(),
            customer: s.customer.name.clone().unwrap_or_default(),
            status: s.status.as_str(),
            payment_status: s.payment_status.status.as_str(),
            line_count: s.items.len(),
            subtotal: s.subtotal,
            discount_amount: s.discount_amount,
            tax_amount: s.tax_amount,
            shipping_cost: s.shipping_cost,
            total: s.total,
            amount_paid: s.payment_status.amount_paid,
        }
    }
}

/// Parses an RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
///
/// A plain date bounds the whole day: midnight for a start, the last instant for an end.
pub(crate) fn date_bound(
    field: &str,
    value: Option<&str>,
    end_of_day: bool,
) -> AppResult<Option<DateTime<Utc>>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(at.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::validation(field, "Expected an ISO date (YYYY-MM-DD) or an RFC 3339 timestamp")
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .unwrap_or_default();
    Ok(Some(date.and_time(time).and_utc()))
}

/// Both ends of a range, rejecting a start after the end
pub(crate) fn date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> AppResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = date_bound("startDate", start, false)?;
    let end = date_bound("endDate", end, true)?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(AppError::validation(
                "startDate",
                "startDate must not be after endDate",
            ));
        }
    }
    Ok((start, end))
}

fn required_range(query: &TrendQuery) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    match date_range(query.start_date.as_deref(), query.end_date.as_deref())? {
        (Some(start), Some(end)) => Ok((start, end)),
        (None, _) => Err(AppError::validation("startDate", "startDate is required")),
        (_, None) => Err(AppError::validation("endDate", "endDate is required")),
    }
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Purchases in the range with their count, total and mean
    pub async fn purchases_by_date(&self, query: &ReportQuery) -> AppResult<PurchaseReport> {
        let (start, end) = date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
        let purchases = purchases::in_range(&self.db, start, end).await?;
        let summary = summarize_totals(purchases.iter().map(|p| p.total));

        Ok(PurchaseReport {
            total_purchases: summary.count,
            total_cost: summary.total,
            average_purchase_value: summary.average,
            purchases,
        })
    }

    pub async fn sales_by_date(&self, query: &ReportQuery) -> AppResult<SaleReport> {
        let (start, end) = date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
        let sales = sales::in_range(&self.db, start, end).await?;
        let summary = summarize_totals(sales.iter().map(|s| s.total));

        Ok(SaleReport {
            total_sales: summary.count,
            total_revenue: summary.total,
            average_sale_value: summary.average,
            sales,
        })
    }

    pub async fn purchase_trends(&self, query: &TrendQuery) -> AppResult<TrendReport> {
        let (start, end) = required_range(query)?;
        let group_by = query.group_by.unwrap_or_default();
        let purchases = purchases::in_range(&self.db, Some(start), Some(end)).await?;

        Ok(TrendReport {
            start_date: start,
            end_date: end,
            group_by,
            trends: bucket_trends(purchases.iter().map(|p| (p.purchase_date, p.total)), group_by),
        })
    }

    pub async fn sale_trends(&self, query: &TrendQuery) -> AppResult<TrendReport> {
        let (start, end) = required_range(query)?;
        let group_by = query.group_by.unwrap_or_default();
        let sales = sales::in_range(&self.db, Some(start), Some(end)).await?;

        Ok(TrendReport {
            start_date: start,
            end_date: end,
            group_by,
            trends: bucket_trends(sales.iter().map(|s| (s.sale_date, s.total)), group_by),
        })
    }

    /// Asset counts and value grouped by category
    pub async fn assets_by_type(&self) -> AppResult<Vec<AssetCategorySummary>> {
        let assets = assets::all(&self.db).await?;
        Ok(summarize_assets_by_category(&assets))
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_plain_dates_cover_whole_days() {
        let start = date_bound("startDate", Some("2024-03-01"), false).unwrap().unwrap();
        let end = date_bound("endDate", Some("2024-03-01"), true).unwrap().unwrap();
        assert_eq!((start.day(), start.hour()), (1, 0));
        assert_eq!((end.day(), end.hour(), end.minute()), (1, 23, 59));
        assert!(start < end);
    }

    #[test]
    fn test_rfc3339_bounds_are_kept() {
        let at = date_bound("startDate", Some("2024-03-01T10:30:00+02:00"), false)
            .unwrap()
            .unwrap();
        assert_eq!(at.hour(), 8);
    }

    #[test]
    fn test_bad_or_inverted_ranges_are_rejected() {
        assert!(date_bound("startDate", Some("yesterday"), false).is_err());
        assert!(date_range(Some("2024-03-02"), Some("2024-03-01")).is_err());
        assert_eq!(date_range(None, Some("")).unwrap(), (None, None));
    }

    #[test]
    fn test_trends_require_both_dates() {
        let query = TrendQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: None,
            group_by: None,
        };
        assert!(matches!(
            required_range(&query),
            Err(AppError::Validation { field, .. }) if field == "endDate"
        ));
    }

    #[test]
    fn test_csv_export_writes_header_and_rows() {
        #[derive(Serialize)]
        struct Row {
            name: &'static str,
            total: u32,
        }
        let csv = ReportingService::export_to_csv(&[
            Row { name: "a", total: 1 },
            Row { name: "b", total: 2 },
        ])
        .unwrap();
        assert_eq!(csv, "name,total\na,1\nb,2\n");
    }
}
