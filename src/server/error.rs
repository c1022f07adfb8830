//! Error types for the server

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::ShapesError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    MultipartRejection(#[from] MultipartRejection),

    #[error(transparent)]
    Shapes(#[from] ShapesError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Multipart(e) => e.status(),
            ServerError::MultipartRejection(e) => e.status(),
            ServerError::Shapes(e) => match e {
                ShapesError::InvalidInput(_) | ShapesError::InferenceRuntime(_) => {
                    StatusCode::BAD_REQUEST
                }
                ShapesError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ServerError::Multipart(e) => e.body_text(),
            ServerError::MultipartRejection(e) => e.body_text(),
            _ if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE => {
                tracing::error!(detail = %self, "Internal server error");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BackendKind;

    #[test]
    fn test_status_mapping() {
        let invalid = ServerError::from(ShapesError::invalid_input("not an image"));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let runtime = ServerError::from(ShapesError::inference("bad tensor"));
        assert_eq!(runtime.status(), StatusCode::BAD_REQUEST);

        let unavailable = ServerError::from(ShapesError::BackendUnavailable {
            kind: BackendKind::ResNet,
            reason: "weights missing".to_string(),
        });
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let lifecycle = ServerError::from(ShapesError::Lifecycle("twice".to_string()));
        assert_eq!(lifecycle.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_detail_keeps_client_message() {
        let err = ServerError::from(ShapesError::invalid_input("uploaded file is empty"));
        assert_eq!(err.to_string(), "uploaded file is empty");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
