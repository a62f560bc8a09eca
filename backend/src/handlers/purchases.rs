//! HTTP handlers for purchase endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::{Asset, Purchase};
use shared::types::PaginatedResponse;
use uuid::Uuid;

use super::csv_attachment;
use crate::error::AppResult;
use crate::services::purchases::{CreatePurchaseInput, PurchaseListQuery, UpdatePurchaseInput};
use crate::services::reporting::{PurchaseCsvRow, ReportQuery, TrendQuery, TrendReport};
use crate::services::{PurchaseService, ReportingService};
use crate::AppState;

fn purchase_service(state: &AppState) -> PurchaseService {
    PurchaseService::new(state.db.clone(), state.retries())
}

pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchaseListQuery>,
) -> AppResult<Json<PaginatedResponse<Purchase>>> {
    Ok(Json(purchase_service(&state).list(query).await?))
}

pub async fn get_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Purchase>> {
    Ok(Json(purchase_service(&state).get(id).await?))
}

pub async fn create_purchase(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseInput>,
) -> AppResult<(StatusCode, Json<Purchase>)> {
    let purchase = purchase_service(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

pub async fn update_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePurchaseInput>,
) -> AppResult<Json<Purchase>> {
    Ok(Json(purchase_service(&state).update(id, input).await?))
}

pub async fn delete_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    purchase_service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Assets materialized from a purchase
pub async fn purchase_assets(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Asset>>> {
    Ok(Json(purchase_service(&state).assets(id).await?))
}

/// Purchases by date range, as JSON or CSV
pub async fn purchase_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let report = ReportingService::new(state.db.clone())
        .purchases_by_date(&query)
        .await?;

    if query.wants_csv() {
        let rows: Vec<PurchaseCsvRow> = report.purchases.iter().map(PurchaseCsvRow::from).collect();
        let csv = ReportingService::export_to_csv(&rows)?;
        Ok(csv_attachment("purchases_by_date.csv", csv))
    } else {
        Ok(Json(report).into_response())
    }
}

pub async fn purchase_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> AppResult<Json<TrendReport>> {
    let trends = ReportingService::new(state.db.clone())
        .purchase_trends(&query)
        .await?;
    Ok(Json(trends))
}
