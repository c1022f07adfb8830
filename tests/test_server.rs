//! Integration test: Server routes, health report and error envelopes

use inteceleri_shapes::config::{Environment, ServiceConfig};
use inteceleri_shapes::inference::Classifier;
use inteceleri_shapes::preprocessing::InputGeometry;
use inteceleri_shapes::registry::{BackendKind, ModelRegistry};
use inteceleri_shapes::server::{create_router, AppState};
use inteceleri_shapes::{Result, ShapesError};
use std::sync::Arc;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use image::RgbImage;
use tower::ServiceExt;

struct Constant(usize);

impl Classifier for Constant {
    fn name(&self) -> &str {
        "constant"
    }

    fn input_geometry(&self) -> InputGeometry {
        InputGeometry::square(16)
    }

    fn predict(&self, _pixels: &RgbImage) -> Result<usize> {
        Ok(self.0)
    }
}

fn test_app_with(
    loader: impl FnMut(BackendKind) -> Result<Arc<dyn Classifier>>,
) -> (axum::Router, Arc<AppState>) {
    let config = ServiceConfig::new()
        .with_environment(Environment::Testing)
        .with_address("127.0.0.1", 0);
    let registry = Arc::new(ModelRegistry::new());
    registry.load_with(loader).unwrap();
    let state = Arc::new(AppState::new(config, registry));
    (create_router(state.clone()), state)
}

fn test_app() -> axum::Router {
    test_app_with(|_| Ok(Arc::new(Constant(0)))).0
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = test_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["lifecycle"], "ready");
    assert_eq!(json["environment"], "testing");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["backends"]["resnet3d"]["status"], "ready");
    assert_eq!(json["backends"]["mobilenet3d"]["input"]["height"], 16);
    assert_eq!(json["backends"]["mobilenet3d"]["metrics"]["total_requests"], 0);

    let histogram = json["backends"]["resnet3d"]["metrics"]["latency_histogram"]
        .as_array()
        .unwrap();
    assert_eq!(histogram.len(), 9);
    assert!(histogram.iter().all(|bucket| bucket["count"] == 0));
    assert_eq!(histogram.last().unwrap()["le"], "+Inf");
}

#[tokio::test]
async fn test_health_reports_degraded_backend() {
    let (app, _) = test_app_with(|kind| match kind {
        BackendKind::ResNet => Ok(Arc::new(Constant(1))),
        BackendKind::MobileNet => Err(ShapesError::model_load("file not found: mobilenet3d.tflite")),
    });
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["backends"]["mobilenet3d"]["status"], "failed");
    assert!(json["backends"]["mobilenet3d"]["error"]
        .as_str()
        .unwrap()
        .contains("mobilenet3d.tflite"));
}

#[tokio::test]
async fn test_health_after_unload() {
    let (app, state) = test_app_with(|_| Ok(Arc::new(Constant(0))));
    state.registry().unload().unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["status"], "unavailable");
    assert_eq!(json["lifecycle"], "unloaded");
}

#[tokio::test]
async fn test_root_redirects_to_health() {
    let response = test_app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/health");
}

#[tokio::test]
async fn test_404_returns_detail() {
    let response = test_app()
        .oneshot(Request::builder().uri("/vgg16").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json_body(response).await["detail"].is_string());
}

#[tokio::test]
async fn test_405_on_get_classifier() {
    let response = test_app()
        .oneshot(Request::builder().uri("/resnet3d").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(json_body(response).await["detail"].is_string());
}

#[tokio::test]
async fn test_non_multipart_body_is_rejected() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mobilenet3d")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["detail"].is_string());
}

#[tokio::test]
async fn test_multipart_without_file_is_rejected() {
    let boundary = "shapes-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{boundary}--\r\n"
    );
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/resnet3d")
                .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["detail"].as_str().unwrap().contains("file"));
}
