//! Image upload validation and storage

use shared::validation::{image_extension, validate_image};

use crate::error::{AppError, AppResult};
use crate::storage::{object_key, Storage};

/// A decoded image from a base64 body or a multipart field
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

/// Stored object and the URL it is served from
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
}

/// Checks type and size, then uploads under `<prefix>/<millis>-<random>.<ext>`
pub async fn store_image(
    storage: &dyn Storage,
    prefix: &str,
    upload: ImageUpload,
) -> AppResult<StoredImage> {
    let content_type = upload.content_type.trim().to_ascii_lowercase();
    validate_image(&content_type, upload.data.len())
        .map_err(|msg| AppError::InvalidUpload(msg.to_string()))?;

    let extension = image_extension(upload.filename.as_deref(), &content_type);
    let key = object_key(prefix, extension);
    let url = storage.upload(&key, upload.data, &content_type).await?;

    tracing::debug!("Stored image {}", key);
    Ok(StoredImage { key, url })
}

/// Best-effort removal of an object whose record could not be saved
pub async fn discard_image(storage: &dyn Storage, image: &StoredImage) {
    if let Err(e) = storage.delete(&image.key).await {
        tracing::warn!("Failed to remove orphaned image {}: {}", image.key, e);
    }
}
