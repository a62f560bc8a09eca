//! HTTP handlers for sale endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::Sale;
use shared::types::PaginatedResponse;
use uuid::Uuid;

use super::csv_attachment;
use crate::error::AppResult;
use crate::services::reporting::{ReportQuery, SaleCsvRow, TrendQuery, TrendReport};
use crate::services::sales::{
    CreateSaleInput, NextInvoice, PaymentInput, SaleListQuery, UpdateSaleInput,
};
use crate::services::{ReportingService, SaleService};
use crate::AppState;

fn sale_service(state: &AppState) -> SaleService {
    SaleService::new(
        state.db.clone(),
        state.retries(),
        state.config.sales.invoice_number_width,
    )
}

pub async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<SaleListQuery>,
) -> AppResult<Json<PaginatedResponse<Sale>>> {
    Ok(Json(sale_service(&state).list(query).await?))
}

pub async fn get_sale(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Sale>> {
    Ok(Json(sale_service(&state).get(id).await?))
}

pub async fn create_sale(
    State(state): State<AppState>,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<(StatusCode, Json<Sale>)> {
    let sale = sale_service(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn update_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSaleInput>,
) -> AppResult<Json<Sale>> {
    Ok(Json(sale_service(&state).update(id, input).await?))
}

pub async fn delete_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    sale_service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a payment against a sale
pub async fn add_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<PaymentInput>,
) -> AppResult<Json<Sale>> {
    Ok(Json(sale_service(&state).add_payment(id, input).await?))
}

pub async fn next_invoice(State(state): State<AppState>) -> AppResult<Json<NextInvoice>> {
    Ok(Json(sale_service(&state).next_invoice().await?))
}

/// Sales by date range, as JSON or CSV
pub async fn sale_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let report = ReportingService::new(state.db.clone())
        .sales_by_date(&query)
        .await?;

    if query.wants_csv() {
        let rows: Vec<SaleCsvRow> = report.sales.iter().map(SaleCsvRow::from).collect();
        let csv = ReportingService::export_to_csv(&rows)?;
        Ok(csv_attachment("sales_by_date.csv", csv))
    } else {
        Ok(Json(report).into_response())
    }
}

pub async fn sale_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> AppResult<Json<TrendReport>> {
    let trends = ReportingService::new(state.db.clone())
        .sale_trends(&query)
        .await?;
    Ok(Json(trends))
}
