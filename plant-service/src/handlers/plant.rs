use crate::dtos::AnalyzeResponse;
use crate::startup::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use service_core::error::AppError;

const IMAGE_FIELDS: [&str; 2] = ["image", "file"];

/// `POST /plant/analyze`: multipart upload with an `image` (or `file`) part.
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e))
    })?;
    let max_bytes = state.config.vision.max_upload_bytes;

    let bytes = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| {
                AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
            })?
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Missing 'image' file field"))
            })?;

        if !field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name)) {
            continue;
        }

        if let Some(content_type) = field.content_type() {
            if !content_type.to_ascii_lowercase().starts_with("image/") {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unsupported content type '{}', expected image/*",
                    content_type
                )));
            }
        }

        break field.bytes().await.map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read image bytes: {}", e))
        })?;
    };

    if bytes.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Empty image upload")));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Image too large ({} bytes, max {})",
            bytes.len(),
            max_bytes
        )));
    }

    tracing::debug!(size = bytes.len(), "Received image upload");

    let result = state.analysis.analyze(bytes.to_vec()).await?;
    Ok(Json(AnalyzeResponse::success(result)))
}
