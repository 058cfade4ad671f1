//! Route handlers.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{Html, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DepixelateError, InferenceError};
use crate::pipeline::SrPipeline;

/// Multipart field carrying the upload.
pub const IMAGE_FIELD: &str = "image";

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Serialize, Deserialize)]
pub struct DepixelateResponse {
    pub image_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub scale: u32,
}

/// Manual test page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(State(pipeline): State<SrPipeline>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        scale: pipeline.scale(),
    })
}

/// Upscale the uploaded `image` field and return it as base64 JPEG.
pub async fn depixelate(
    State(pipeline): State<SrPipeline>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DepixelateResponse>, DepixelateError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected non-multipart upload: {}", e);
        DepixelateError::MissingFile
    })?;
    let bytes = read_image_field(&mut multipart).await?;
    let upload_len = bytes.len();

    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || pipeline.process(&bytes))
        .await
        .map_err(|e| InferenceError::Backend(format!("inference task aborted: {e}")))??;

    info!(
        "Depixelated {} bytes {}x{} -> {}x{} in {}ms",
        upload_len,
        result.input_size.0,
        result.input_size.1,
        result.output_size.0,
        result.output_size.1,
        started.elapsed().as_millis()
    );
    Ok(Json(DepixelateResponse {
        image_base64: result.image_base64,
    }))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, DepixelateError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(DepixelateError::MissingFile),
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Err(DepixelateError::MissingFile);
            }
        };
        // Plain form values named `image` do not count as an upload.
        if field.name() == Some(IMAGE_FIELD) && field.file_name().is_some() {
            return field.bytes().await.map_err(|e| DepixelateError::Decode(e.to_string()));
        }
    }
}
