//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Redirect,
    Json,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dispatch::Prediction;
use crate::preprocessing::Upload;
use crate::registry::BackendKind;

use super::error::{Result, ServerError};
use super::state::AppState;

/// Multipart field carrying the image
const UPLOAD_FIELD: &str = "file";

// ============================================================================
// Classification Handlers
// ============================================================================

/// Classify an image with the ResNet backend
pub async fn classify_resnet3d(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>> {
    classify(&state, BackendKind::ResNet, multipart?).await
}

/// Classify an image with the MobileNet backend
pub async fn classify_mobilenet3d(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>> {
    classify(&state, BackendKind::MobileNet, multipart?).await
}

async fn classify(state: &AppState, kind: BackendKind, multipart: Multipart) -> Result<Json<Prediction>> {
    let upload = read_upload(multipart).await?;
    debug!(
        backend = %kind,
        file_name = upload.file_name.as_deref().unwrap_or("-"),
        content_type = upload.content_type.as_deref().unwrap_or("-"),
        bytes = upload.bytes.len(),
        "Received upload"
    );
    let prediction = state.dispatcher.classify_async(kind, upload).await?;
    Ok(Json(prediction))
}

/// Take the `file` field, or failing that the first field with a filename
async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut fallback = None;
    while let Some(field) = multipart.next_field().await? {
        let is_upload_field = field.name() == Some(UPLOAD_FIELD);
        if !is_upload_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        let mut upload = Upload::new(bytes.to_vec(), content_type.as_deref());
        if let Some(name) = file_name {
            upload = upload.with_file_name(name);
        }

        if is_upload_field {
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    fallback.ok_or_else(|| {
        ServerError::BadRequest(format!("no file uploaded (expected multipart field '{UPLOAD_FIELD}')"))
    })
}

// ============================================================================
// Service Handlers
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let registry = state.registry();
    let metrics = state.dispatcher.metrics();

    let statuses = registry.status();
    let ready = statuses.iter().filter(|s| s.is_ready()).count();
    let overall = match ready {
        0 => "unavailable",
        n if n == statuses.len() => "ok",
        _ => "degraded",
    };

    let mut backends = Map::new();
    for status in statuses {
        let kind = status.backend;
        let mut entry = json!(status);
        if let (Some(obj), Some(summary)) = (entry.as_object_mut(), metrics.get(&kind)) {
            obj.insert("metrics".to_string(), json!(summary));
        }
        backends.insert(kind.name().to_string(), entry);
    }

    Json(json!({
        "status": overall,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "lifecycle": registry.state(),
        "uptime_secs": state.uptime_secs(),
        "backends": backends,
    }))
}

pub async fn root() -> Redirect {
    Redirect::temporary("/health")
}
