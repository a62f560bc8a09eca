//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct ProviderHealth {
    pub health: &'static str,
}

#[derive(Serialize)]
pub struct Providers {
    pub database: ProviderHealth,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the server started
    pub uptime: i64,
    pub version: &'static str,
    pub providers: Providers,
}

/// Health check endpoint handler; 503 while the database is unreachable
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // Check database connectivity
    let database_up = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    if !database_up {
        tracing::warn!("Health check: database is unreachable");
    }

    let now = Utc::now();
    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if database_up { "ok" } else { "error" },
            timestamp: now,
            uptime: (now - state.started_at).num_seconds(),
            version: env!("CARGO_PKG_VERSION"),
            providers: Providers {
                database: ProviderHealth {
                    health: if database_up { "healthy" } else { "unhealthy" },
                },
            },
        }),
    )
}
