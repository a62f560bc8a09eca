//! Route definitions for the inventory tracker API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::{config::ServerConfig, handlers, AppState};

/// Create API routes.
///
/// The rebuild-inventory routes get the longer rebuild deadline; everything else gets the
/// request deadline.
pub fn api_routes(server: &ServerConfig) -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Item catalogue and relationships
        .nest("/items", item_routes(server))
        // Purchases
        .nest("/purchases", purchase_routes())
        // Sales
        .nest("/sales", sale_routes())
        // Assets
        .nest("/assets", asset_routes(server))
        .layer(TimeoutLayer::new(server.request_timeout()))
        .merge(rebuild_routes(server))
}

/// Item routes
fn item_routes(server: &ServerConfig) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/nextsku", get(handlers::next_sku))
        .route("/categories", get(handlers::list_categories))
        .route("/tags", get(handlers::list_tags))
        .route("/rebuild-relationships", post(handlers::rebuild_relationships))
        .route(
            "/:id",
            get(handlers::get_item)
                .patch(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route("/:id/purchases", get(handlers::item_purchases))
        .route("/:id/sales", get(handlers::item_sales))
        .route("/:id/breakdown", post(handlers::breakdown_item))
        .route("/:id/derived", get(handlers::derived_items))
        .route("/:id/parent", get(handlers::parent_item))
        .route("/:id/relationships", get(handlers::item_relationships))
        .merge(image_routes(
            "/:id/image",
            server,
            patch(handlers::set_item_image).put(handlers::upload_item_image),
        ))
}

/// Purchase routes
fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_purchases).post(handlers::create_purchase))
        .route("/reports/by-date", get(handlers::purchase_report))
        .route("/trends", get(handlers::purchase_trends))
        .route(
            "/:id",
            get(handlers::get_purchase)
                .patch(handlers::update_purchase)
                .delete(handlers::delete_purchase),
        )
        .route("/:id/assets", get(handlers::purchase_assets))
}

/// Sale routes
fn sale_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sale))
        .route("/utility/next-invoice", get(handlers::next_invoice))
        .route("/reports/by-date", get(handlers::sale_report))
        .route("/trends", get(handlers::sale_trends))
        .route(
            "/:id",
            get(handlers::get_sale)
                .patch(handlers::update_sale)
                .delete(handlers::delete_sale),
        )
        .route("/:id/payments", post(handlers::add_payment))
}

/// Asset routes
fn asset_routes(server: &ServerConfig) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_assets).post(handlers::create_asset))
        .route("/reports/by-type", get(handlers::asset_report_by_type))
        .route(
            "/:id",
            get(handlers::get_asset)
                .patch(handlers::update_asset)
                .delete(handlers::delete_asset),
        )
        .route("/:id/maintenance", post(handlers::record_maintenance))
        .route("/:id/retire", post(handlers::retire_asset))
        .route("/:id/depreciate", post(handlers::depreciate_asset))
        .merge(image_routes(
            "/:id/image",
            server,
            patch(handlers::set_asset_image).put(handlers::upload_asset_image),
        ))
}

/// Image upload route with a body limit sized for base64 payloads
fn image_routes(
    path: &str,
    server: &ServerConfig,
    method_router: axum::routing::MethodRouter<AppState>,
) -> Router<AppState> {
    // base64 inflates by 4/3; leave room for the JSON or multipart envelope
    let limit = server.max_upload_bytes / 3 * 4 + 64 * 1024;
    Router::new()
        .route(path, method_router)
        .layer(DefaultBodyLimit::max(limit))
}

/// Inventory rebuild routes (long deadline)
fn rebuild_routes(server: &ServerConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/items/utility/rebuild-inventory",
            post(handlers::rebuild_inventory),
        )
        .route(
            "/items/utility/rebuild-inventory/:id",
            post(handlers::rebuild_item_inventory),
        )
        .layer(TimeoutLayer::new(server.rebuild_timeout()))
}
