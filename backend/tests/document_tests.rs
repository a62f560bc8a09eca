//! Purchase and sale document tests
//!
//! Tests for line pricing, request decoding, code generation and error mapping.

use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use inventory_tracker_backend::error::{redact, AppError};
use inventory_tracker_backend::services::purchases::{self, PurchaseLineInput};
use inventory_tracker_backend::services::sales::{self, CreateSaleInput, SaleLineInput};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use shared::models::{Measurement, WeightUnit};
use shared::sequence::{next_invoice_number, next_sku};
use shared::InventoryError;
use uuid::Uuid;
use validator::Validate;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn purchase_input(value: serde_json::Value) -> PurchaseLineInput {
    serde_json::from_value(value).unwrap()
}

fn sale_input(value: serde_json::Value) -> SaleLineInput {
    serde_json::from_value(value).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_purchase_line_is_priced() {
        let item = Uuid::new_v4();
        let line = purchases::build_line(purchase_input(json!({
            "item": item,
            "purchasedBy": "weight",
            "weight": 50,
            "weightUnit": "lb",
            "costPerUnit": 1.2,
            "totalCost": 999
        })))
        .unwrap();

        assert_eq!(line.measurement, Measurement::weight(dec("50"), WeightUnit::Lb));
        assert_eq!(line.total_cost, dec("60"));
        assert_eq!(line.discount_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_purchase_percentage_discount_wins() {
        let line = purchases::build_line(purchase_input(json!({
            "item": Uuid::new_v4(),
            "purchasedBy": "quantity",
            "quantity": 4,
            "costPerUnit": 25,
            "discountAmount": 5,
            "discountPercentage": 10
        })))
        .unwrap();

        assert_eq!(line.discount_amount, dec("10"));
        assert_eq!(line.total_cost, dec("90"));
    }

    #[test]
    fn test_sale_absolute_discount_becomes_percentage() {
        let line = sales::build_line(sale_input(json!({
            "item": Uuid::new_v4(),
            "soldBy": "quantity",
            "quantity": 2,
            "pricePerUnit": 50,
            "discountAmount": 25
        })))
        .unwrap();

        assert_eq!(line.discount_percentage, dec("25"));
        assert_eq!(line.total_price, dec("75"));
    }

    #[test]
    fn test_line_without_its_dimension_is_rejected() {
        let err = sales::build_line(sale_input(json!({
            "item": Uuid::new_v4(),
            "soldBy": "length",
            "quantity": 2,
            "pricePerUnit": 1
        })))
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Inventory(InventoryError::MissingMeasurement { .. })
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let err = purchases::build_line(purchase_input(json!({
            "item": Uuid::new_v4(),
            "purchasedBy": "quantity",
            "quantity": 0,
            "costPerUnit": 1
        })))
        .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_response(false).field.as_deref(), Some("quantity"));
    }

    #[test]
    fn test_oversized_line_is_a_bad_request() {
        let err = purchases::build_line(purchase_input(json!({
            "item": Uuid::new_v4(),
            "purchasedBy": "quantity",
            "quantity": 1e28,
            "costPerUnit": 100
        })))
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_response(false).field.as_deref(), Some("quantity"));

        let err = sales::build_line(sale_input(json!({
            "item": Uuid::new_v4(),
            "soldBy": "quantity",
            "quantity": 2,
            "pricePerUnit": 1e20
        })))
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_response(false).field.as_deref(), Some("unitPrice"));
    }

    #[test]
    fn test_sale_needs_a_line() {
        let input: CreateSaleInput = serde_json::from_value(json!({ "items": [] })).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let item = Uuid::new_v4();
        let cases = [
            (AppError::NotFound("Item".to_string()), StatusCode::NOT_FOUND),
            (
                AppError::Inventory(InventoryError::UnknownItem(item)),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Inventory(InventoryError::InsufficientStock {
                    item,
                    kind: shared::models::TrackingType::Weight,
                    available: dec("30"),
                    requested: dec("40"),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::DuplicateEntry("sku".to_string()), StatusCode::CONFLICT),
            (
                AppError::Conflict {
                    resource: "trackingType".to_string(),
                    message: "Item has history".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                AppError::InvalidUpload("Empty image".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[test]
    fn test_insufficient_stock_names_the_dimension() {
        let err = AppError::from(InventoryError::InsufficientStock {
            item: Uuid::new_v4(),
            kind: shared::models::TrackingType::Weight,
            available: dec("30"),
            requested: dec("40"),
        });
        let body = err.to_response(true);
        assert_eq!(body.status, "error");
        assert_eq!(body.field.as_deref(), Some("weight"));
        assert!(body.message.contains("Insufficient stock"));
    }

    #[test]
    fn test_internal_details_hidden_in_production() {
        let err = AppError::Internal("pool exhausted".to_string());
        assert!(err.to_response(true).details.is_none());
        assert_eq!(
            err.to_response(false).details.as_deref(),
            Some("pool exhausted")
        );
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_redaction_strips_server_error_details() {
        let response = AppError::Internal("pool exhausted".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let redacted = body_json(redact(response)).await;
        assert_eq!(redacted["status"], "error");
        assert!(redacted.get("details").is_none());

        let response = AppError::Internal("pool exhausted".to_string()).into_response();
        let full = body_json(response).await;
        assert_eq!(full["details"], "pool exhausted");
    }

    #[tokio::test]
    async fn test_redaction_leaves_client_errors_alone() {
        let response = AppError::validation("quantity", "must be positive").into_response();
        let body = body_json(redact(response)).await;
        assert_eq!(body["field"], "quantity");
        assert_eq!(body["message"], "must be positive");
    }

    #[test]
    fn test_next_codes_skip_non_numeric() {
        assert_eq!(next_sku(["0000000007", "ABC-1", "12"]), "0000000013");
        assert_eq!(next_sku(Vec::<&str>::new()), "0000000001");
        assert_eq!(next_invoice_number(["INV-9", "000041"], 6), "000042");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Each generated SKU is ten digits and above every earlier one
        #[test]
        fn prop_next_sku_increases(start in 0u64..1_000_000u64, creates in 1usize..20) {
            let mut skus = vec![format!("{:010}", start)];
            for _ in 0..creates {
                let next = next_sku(skus.iter().map(String::as_str));
                prop_assert_eq!(next.len(), 10);
                let last = skus.last().unwrap().parse::<u64>().unwrap();
                prop_assert!(next.parse::<u64>().unwrap() > last);
                skus.push(next);
            }
        }

        /// Line totals are never negative and never exceed the base amount
        #[test]
        fn prop_line_total_bounded(
            quantity in 1u32..1000u32,
            cents in 0u32..100_000u32,
            discount in 0u32..=100u32,
        ) {
            let line = sales::build_line(sale_input(json!({
                "item": Uuid::new_v4(),
                "soldBy": "quantity",
                "quantity": quantity,
                "pricePerUnit": Decimal::new(cents as i64, 2).to_string(),
                "discountPercentage": discount
            })))
            .unwrap();

            let base = Decimal::from(quantity) * Decimal::new(cents as i64, 2);
            prop_assert!(line.total_price >= Decimal::ZERO);
            prop_assert!(line.total_price <= base);
        }
    }
}
