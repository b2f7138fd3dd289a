use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{gemini::GeminiError, storage::StoreError};

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("history record {0} not found")]
    RecordNotFound(Uuid),
    #[error("chunk {chunk_id} not found in record {record_id}")]
    ChunkNotFound { record_id: Uuid, chunk_id: usize },
    #[error("chunk {chunk_id} of record {record_id} is already being regenerated")]
    AlreadyRegenerating { record_id: Uuid, chunk_id: usize },
    #[error("the model returned an empty response")]
    EmptyResponse,
    #[error("generation failed: {0}")]
    Generation(#[from] GeminiError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("export failed: {0}")]
    Export(String),
}

impl StudioError {
    pub fn status(&self) -> StatusCode {
        match self {
            StudioError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            StudioError::RecordNotFound(_) | StudioError::ChunkNotFound { .. } => StatusCode::NOT_FOUND,
            StudioError::AlreadyRegenerating { .. } => StatusCode::CONFLICT,
            StudioError::EmptyResponse | StudioError::Generation(_) => StatusCode::BAD_GATEWAY,
            StudioError::Store(_) | StudioError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StudioError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        } else {
            tracing::warn!("⚠️ {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
