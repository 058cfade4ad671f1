//! Error types for bootstrap, inference and the request boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to fetch the weight artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("weights server answered {status} for {url}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The weight artifact is corrupt or does not fit the inference routine.
#[derive(Debug, Error)]
pub enum WeightLoadError {
    #[error("failed to load weights from {origin}: {source}")]
    Session {
        origin: String,
        #[source]
        source: ort::Error,
    },

    #[error("weights from {origin} are incompatible: {reason}")]
    Incompatible { origin: String, reason: String },
}

impl WeightLoadError {
    /// Path or description of the artifact that failed to load.
    pub fn origin(&self) -> &str {
        match self {
            WeightLoadError::Session { origin, .. } | WeightLoadError::Incompatible { origin, .. } => origin,
        }
    }
}

/// Startup-fatal failures of the model loader.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    WeightLoad(#[from] WeightLoadError),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("{0}")]
    Backend(String),

    #[error("model produced x{actual} output, expected x{expected}")]
    ScaleMismatch { expected: u32, actual: u32 },
}

impl From<opencv::Error> for InferenceError {
    fn from(e: opencv::Error) -> Self {
        InferenceError::Backend(e.to_string())
    }
}

impl From<ort::Error> for InferenceError {
    fn from(e: ort::Error) -> Self {
        InferenceError::Backend(e.to_string())
    }
}

/// Terminal failure of a `/depixelate` request.
#[derive(Debug, Error)]
pub enum DepixelateError {
    #[error("No image file provided")]
    MissingFile,

    #[error("Invalid image file: {0}")]
    Decode(String),

    #[error("Processing error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Processing error: {0}")]
    Encode(String),
}

impl DepixelateError {
    pub fn status(&self) -> StatusCode {
        match self {
            DepixelateError::MissingFile | DepixelateError::Decode(_) => StatusCode::BAD_REQUEST,
            DepixelateError::Inference(_) | DepixelateError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for DepixelateError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("depixelate failed: {}", self);
        } else {
            tracing::warn!("depixelate rejected: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
