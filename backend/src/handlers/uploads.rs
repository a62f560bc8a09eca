//! Image payload decoding for the image endpoints

use axum::extract::Multipart;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::services::images::ImageUpload;

/// Base64 image body: `{image, filename?, contentType?}`.
///
/// `image` may also be a data URL (`data:image/png;base64,...`), whose media type is
/// used when `contentType` is absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64Image {
    pub image: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Base64Image {
    pub fn decode(self) -> AppResult<ImageUpload> {
        let (embedded_type, payload) = match self.image.strip_prefix("data:") {
            Some(rest) => {
                let (meta, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| AppError::InvalidUpload("Malformed data URL".to_string()))?;
                let media_type = meta.strip_suffix(";base64").unwrap_or(meta);
                (Some(media_type.to_string()), payload)
            }
            None => (None, self.image.as_str()),
        };

        let content_type = self
            .content_type
            .clone()
            .or(embedded_type)
            .ok_or_else(|| AppError::InvalidUpload("contentType is required".to_string()))?;

        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| AppError::InvalidUpload(format!("Image is not valid base64: {}", e)))?;

        Ok(ImageUpload {
            data,
            content_type,
            filename: self.filename,
        })
    }
}

/// Reads the `image` field of a multipart form, ignoring other fields
pub async fn multipart_image(mut multipart: Multipart) -> AppResult<ImageUpload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidUpload(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidUpload(format!("Failed to read image: {}", e)))?;

        return Ok(ImageUpload {
            data: data.to_vec(),
            content_type,
            filename,
        });
    }

    Err(AppError::InvalidUpload(
        "Multipart field 'image' is required".to_string(),
    ))
}
