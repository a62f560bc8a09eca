//! Inventory Tracker - Backend
//!
//! HTTP service for items, purchases, sales and assets. Stock, landed cost and item
//! back-references are kept consistent with the transaction documents inside serializable
//! Postgres transactions.

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use chrono::{DateTime, Utc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod storage;

pub use config::Config;

use crate::config::StorageProvider;
use crate::storage::Storage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub storage: Arc<dyn Storage>,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, storage: Arc<dyn Storage>, config: Config) -> Self {
        Self {
            db,
            storage,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    /// Attempts per serializable transaction
    pub fn retries(&self) -> u32 {
        self.config.database.transaction_retries
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(&state.config.server));

    // Local uploads are served by this process
    if state.config.storage.provider == StorageProvider::Local {
        app = app.nest_service("/uploads", ServeDir::new(&state.config.storage.local_root));
    }

    let redaction =
        middleware::map_response_with_state(state.clone(), error::redact_internal_details);

    app.layer(redaction)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Inventory Tracker API v1"
}
