//! HTTP handlers for asset endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use shared::models::Asset;
use shared::reports::AssetCategorySummary;
use shared::types::PaginatedResponse;
use uuid::Uuid;

use super::uploads::{multipart_image, Base64Image};
use crate::error::AppResult;
use crate::services::assets::{
    AssetListQuery, CreateAssetInput, DepreciateInput, MaintenanceInput, UpdateAssetInput,
};
use crate::services::images::ImageUpload;
use crate::services::{AssetService, ReportingService};
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetImageResponse {
    pub image_url: Option<String>,
    pub asset: Asset,
}

fn asset_service(state: &AppState) -> AssetService {
    AssetService::new(state.db.clone(), state.retries())
}

pub async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<AssetListQuery>,
) -> AppResult<Json<PaginatedResponse<Asset>>> {
    Ok(Json(asset_service(&state).list(query).await?))
}

pub async fn get_asset(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Asset>> {
    Ok(Json(asset_service(&state).get(id).await?))
}

pub async fn create_asset(
    State(state): State<AppState>,
    Json(input): Json<CreateAssetInput>,
) -> AppResult<(StatusCode, Json<Asset>)> {
    let asset = asset_service(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

pub async fn update_asset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateAssetInput>,
) -> AppResult<Json<Asset>> {
    Ok(Json(asset_service(&state).update(id, input).await?))
}

pub async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    asset_service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_maintenance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<MaintenanceInput>,
) -> AppResult<Json<Asset>> {
    Ok(Json(asset_service(&state).record_maintenance(id, input).await?))
}

pub async fn retire_asset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Asset>> {
    Ok(Json(asset_service(&state).retire(id).await?))
}

pub async fn depreciate_asset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<DepreciateInput>,
) -> AppResult<Json<Asset>> {
    Ok(Json(asset_service(&state).depreciate(id, input).await?))
}

/// Counts and current value grouped by category
pub async fn asset_report_by_type(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AssetCategorySummary>>> {
    let report = ReportingService::new(state.db.clone()).assets_by_type().await?;
    Ok(Json(report))
}

/// `PATCH /assets/:id/image` with a base64 body
pub async fn set_asset_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Base64Image>,
) -> AppResult<Json<AssetImageResponse>> {
    store_asset_image(&state, id, body.decode()?).await
}

/// `PUT /assets/:id/image` with a multipart `image` field
pub async fn upload_asset_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<AssetImageResponse>> {
    let upload = multipart_image(multipart).await?;
    store_asset_image(&state, id, upload).await
}

async fn store_asset_image(
    state: &AppState,
    id: Uuid,
    upload: ImageUpload,
) -> AppResult<Json<AssetImageResponse>> {
    let asset = asset_service(state)
        .set_image(
            state.storage.as_ref(),
            &state.config.storage.prefix,
            id,
            upload,
        )
        .await?;
    Ok(Json(AssetImageResponse {
        image_url: asset.image_url.clone(),
        asset,
    }))
}
