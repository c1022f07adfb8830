//! Error types shared by the serving core

use thiserror::Error;

use crate::registry::BackendKind;

#[derive(Error, Debug)]
pub enum ShapesError {
    /// Upload is not an image, or its bytes could not be decoded
    #[error("{0}")]
    InvalidInput(String),

    /// Backend failed to load at startup or the service is shutting down
    #[error("backend '{kind}' is unavailable: {reason}")]
    BackendUnavailable { kind: BackendKind, reason: String },

    /// Preprocessing or forward pass failed for a single request
    #[error("inference failed: {0}")]
    InferenceRuntime(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShapesError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn inference(msg: impl std::fmt::Display) -> Self {
        Self::InferenceRuntime(msg.to_string())
    }

    pub fn model_load(msg: impl std::fmt::Display) -> Self {
        Self::ModelLoad(msg.to_string())
    }

    /// True for failures caused by the request itself rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InferenceRuntime(_))
    }
}

impl From<candle_core::Error> for ShapesError {
    fn from(err: candle_core::Error) -> Self {
        Self::InferenceRuntime(err.to_string())
    }
}

impl From<image::ImageError> for ShapesError {
    fn from(err: image::ImageError) -> Self {
        Self::InvalidInput(format!("could not decode image: {err}"))
    }
}

impl From<serde_json::Error> for ShapesError {
    fn from(err: serde_json::Error) -> Self {
        Self::ModelLoad(format!("invalid model configuration: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ShapesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(ShapesError::invalid_input("bad").is_client_error());
        assert!(ShapesError::inference("shape mismatch").is_client_error());
        assert!(!ShapesError::BackendUnavailable {
            kind: BackendKind::MobileNet,
            reason: "missing file".to_string(),
        }
        .is_client_error());
    }

    #[test]
    fn test_unavailable_message_names_backend() {
        let err = ShapesError::BackendUnavailable {
            kind: BackendKind::ResNet,
            reason: "weights not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("resnet3d"));
        assert!(msg.contains("weights not found"));
    }

    #[test]
    fn test_image_error_becomes_invalid_input() {
        let err = image::load_from_memory(b"not an image").unwrap_err();
        assert!(matches!(ShapesError::from(err), ShapesError::InvalidInput(_)));
    }
}
