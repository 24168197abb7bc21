//! Photo upload endpoints.
//!
//! `POST /api/photo` decodes an uploaded image; `POST /api/photo/{id}`
//! additionally pushes the decoded text to the client addressed by `id`
//! (transport id or socket alias). Whether that push lands is logged, not
//! surfaced: the HTTP caller gets the decode verdict either way.

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PhotoResponse {
    fn from_detection(decoded: Option<String>) -> Self {
        match decoded {
            Some(data) => Self {
                status: "success",
                data: Some(data),
                message: None,
            },
            None => Self {
                status: "not_found",
                data: None,
                message: Some("No QR or barcode detected in the image.".to_string()),
            },
        }
    }
}

/// POST /api/photo - decode an uploaded image
#[tracing::instrument(name = "api.photo", skip(state, multipart))]
pub async fn process_photo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PhotoResponse>> {
    let (image, content_type) = read_photo_field(multipart).await?;
    let decoded = state.detector.detect(image, &content_type).await?;
    Ok(Json(PhotoResponse::from_detection(decoded)))
}

/// POST /api/photo/{id} - decode and push the result to one client
#[tracing::instrument(name = "api.photo_for_client", skip(state, multipart))]
pub async fn process_photo_for_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<PhotoResponse>> {
    let (image, content_type) = read_photo_field(multipart).await?;
    let decoded = state.detector.detect(image, &content_type).await?;

    if let Some(text) = &decoded {
        let delivered = state.coordinator.send_to_client(&id, text);
        if delivered {
            tracing::info!(client_id = %id, "Decoded result pushed to client");
        } else {
            // The client may have disconnected since uploading; the decode
            // result still goes back in the HTTP response.
            tracing::warn!(client_id = %id, "Decoded result not delivered");
        }
    }

    Ok(Json(PhotoResponse::from_detection(decoded)))
}

/// Pull the `photo` part out of the multipart body and validate it.
async fn read_photo_field(mut multipart: Multipart) -> Result<(Vec<u8>, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("photo") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(str::to_owned)
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(AppError::Validation(
                "The uploaded file must be an image.".to_string(),
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;
        if bytes.is_empty() {
            return Err(AppError::Validation("No file was received.".to_string()));
        }

        return Ok((bytes.to_vec(), content_type));
    }

    Err(AppError::Validation(
        "Missing multipart field: photo".to_string(),
    ))
}
