//! HTTP handlers for the inventory tracker API

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

pub mod assets;
pub mod health;
pub mod items;
pub mod purchases;
pub mod sales;
pub mod uploads;

pub use assets::*;
pub use health::*;
pub use items::*;
pub use purchases::*;
pub use sales::*;

/// `text/csv` download response
pub(crate) fn csv_attachment(filename: &str, csv: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response()
}
