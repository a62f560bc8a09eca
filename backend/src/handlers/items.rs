//! HTTP handlers for item, relationship and rebuild endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::models::{Item, Purchase, Sale};
use shared::rebuild::{ItemRebuildResult, RebuildSummary};
use shared::relationships::RelationshipRebuild;
use shared::types::PaginatedResponse;
use uuid::Uuid;

use super::uploads::{multipart_image, Base64Image};
use crate::error::AppResult;
use crate::services::images::ImageUpload;
use crate::services::items::{CreateItemInput, ItemListQuery, UpdateItemInput};
use crate::services::relationships::{BreakdownInput, BreakdownResult, RelationshipDiagnostics};
use crate::services::{InventoryRebuilder, ItemService, RelationshipService};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ItemQuery {
    pub populate: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextSkuResponse {
    pub next_sku: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemImageResponse {
    pub image_url: Option<String>,
    pub item: Item,
}

fn item_service(state: &AppState) -> ItemService {
    ItemService::new(state.db.clone(), state.retries())
}

fn relationship_service(state: &AppState) -> RelationshipService {
    RelationshipService::new(state.db.clone(), state.retries())
}

fn rebuilder(state: &AppState) -> InventoryRebuilder {
    InventoryRebuilder::postgres(
        state.db.clone(),
        state.retries(),
        state.config.inventory.rebuild_batch_size,
        state.config.inventory.rebuild_price_policy,
    )
}

/// List items
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemListQuery>,
) -> AppResult<Json<PaginatedResponse<Item>>> {
    let items = item_service(&state).list(query).await?;
    Ok(Json(items))
}

/// Get an item, with references expanded when `populate=true`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ItemQuery>,
) -> AppResult<Response> {
    let service = item_service(&state);
    if query.populate.unwrap_or(false) {
        Ok(Json(service.get_populated(id).await?).into_response())
    } else {
        Ok(Json(service.get(id).await?).into_response())
    }
}

pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItemInput>,
) -> AppResult<(StatusCode, Json<Item>)> {
    let item = item_service(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<Item>> {
    let item = item_service(&state).update(id, input).await?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    item_service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn next_sku(State(state): State<AppState>) -> AppResult<Json<NextSkuResponse>> {
    let next_sku = item_service(&state).next_sku().await?;
    Ok(Json(NextSkuResponse { next_sku }))
}

pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(item_service(&state).categories().await?))
}

pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(item_service(&state).tags().await?))
}

/// Purchases containing the item
pub async fn item_purchases(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Purchase>>> {
    Ok(Json(item_service(&state).purchase_history(id).await?))
}

/// Sales containing the item
pub async fn item_sales(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Sale>>> {
    Ok(Json(item_service(&state).sale_history(id).await?))
}

pub async fn breakdown_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<BreakdownInput>,
) -> AppResult<(StatusCode, Json<BreakdownResult>)> {
    let result = relationship_service(&state).breakdown(id, input).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn derived_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Item>>> {
    Ok(Json(relationship_service(&state).derived(id).await?))
}

pub async fn parent_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Item>> {
    Ok(Json(relationship_service(&state).parent(id).await?))
}

pub async fn item_relationships(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RelationshipDiagnostics>> {
    Ok(Json(relationship_service(&state).diagnostics(id).await?))
}

pub async fn rebuild_relationships(
    State(state): State<AppState>,
) -> AppResult<Json<RelationshipRebuild>> {
    Ok(Json(relationship_service(&state).rebuild_used_in().await?))
}

pub async fn rebuild_inventory(State(state): State<AppState>) -> AppResult<Json<RebuildSummary>> {
    Ok(Json(rebuilder(&state).rebuild_all().await?))
}

pub async fn rebuild_item_inventory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ItemRebuildResult>> {
    Ok(Json(rebuilder(&state).rebuild_item(id).await?))
}

/// `PATCH /items/:id/image` with a base64 body
pub async fn set_item_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Base64Image>,
) -> AppResult<Json<ItemImageResponse>> {
    store_item_image(&state, id, body.decode()?).await
}

/// `PUT /items/:id/image` with a multipart `image` field
pub async fn upload_item_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ItemImageResponse>> {
    let upload = multipart_image(multipart).await?;
    store_item_image(&state, id, upload).await
}

async fn store_item_image(
    state: &AppState,
    id: Uuid,
    upload: ImageUpload,
) -> AppResult<Json<ItemImageResponse>> {
    let item = item_service(state)
        .set_image(
            state.storage.as_ref(),
            &state.config.storage.prefix,
            id,
            upload,
        )
        .await?;
    Ok(Json(ItemImageResponse {
        image_url: item.image_url.clone(),
        item,
    }))
}
