//! Inference dispatcher
//!
//! Per-request path: validate, decode, resize to the backend's geometry,
//! predict, map through the label table.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ShapesError};
use crate::labels::label_for;
use crate::monitoring::{MetricsSummary, PerformanceMetrics};
use crate::preprocessing::{prepare, Upload};
use crate::registry::{BackendKind, ModelRegistry};

/// Response body of the classification endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: String,
}

pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    metrics: BTreeMap<BackendKind, PerformanceMetrics>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let metrics = BackendKind::ALL
            .iter()
            .map(|&kind| (kind, PerformanceMetrics::default()))
            .collect();
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Classify one upload on the calling thread
    pub fn classify(&self, kind: BackendKind, upload: &Upload) -> Result<Prediction> {
        let start = Instant::now();
        let result = self.run(kind, upload);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Some(metrics) = self.metrics.get(&kind) {
            metrics.record_latency(elapsed_ms);
            if result.is_err() {
                metrics.record_error();
            }
        }
        match &result {
            Ok(prediction) => debug!(
                backend = %kind,
                label = %prediction.prediction,
                elapsed_ms,
                "Prediction served"
            ),
            Err(e) => warn!(backend = %kind, error = %e, elapsed_ms, "Prediction failed"),
        }
        result
    }

    /// Classify on the blocking pool so the async runtime keeps serving
    pub async fn classify_async(self: &Arc<Self>, kind: BackendKind, upload: Upload) -> Result<Prediction> {
        let dispatcher = Arc::clone(self);
        tokio::task::spawn_blocking(move || dispatcher.classify(kind, &upload))
            .await
            .map_err(|e| {
                if let Some(metrics) = self.metrics.get(&kind) {
                    metrics.record_error();
                }
                warn!(backend = %kind, error = %e, "Inference task aborted");
                ShapesError::inference(format!("inference task failed: {e}"))
            })?
    }

    fn run(&self, kind: BackendKind, upload: &Upload) -> Result<Prediction> {
        // MIME check and decode first: a bad upload is a 400 even on a failed backend
        let image = upload.decode()?;

        let classifier = self.registry.get(kind)?;
        let pixels = prepare(&image, classifier.input_geometry());
        let index = classifier.predict(&pixels).map_err(|e| match e {
            e if e.is_client_error() => e,
            other => ShapesError::inference(other),
        })?;

        Ok(Prediction {
            prediction: label_for(index)?.to_string(),
        })
    }

    /// Metrics snapshot per backend
    pub fn metrics(&self) -> BTreeMap<BackendKind, MetricsSummary> {
        self.metrics
            .iter()
            .map(|(&kind, metrics)| (kind, metrics.summary()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Classifier;
    use crate::labels::LABELS;
    use crate::preprocessing::InputGeometry;
    use crate::registry::tests::{fixed, FixedClassifier};
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Fails unless it sees exactly its declared geometry
    struct GeometryCheck(InputGeometry);

    impl Classifier for GeometryCheck {
        fn name(&self) -> &str {
            "geometry-check"
        }

        fn input_geometry(&self) -> InputGeometry {
            self.0
        }

        fn predict(&self, pixels: &RgbImage) -> Result<usize> {
            assert_eq!(pixels.dimensions(), (self.0.width, self.0.height));
            Ok(4)
        }
    }

    fn dispatcher_with(
        loader: impl FnMut(BackendKind) -> Result<Arc<dyn Classifier>>,
    ) -> Arc<Dispatcher> {
        let registry = Arc::new(ModelRegistry::new());
        registry.load_with(loader).unwrap();
        Arc::new(Dispatcher::new(registry))
    }

    #[test]
    fn test_prediction_maps_through_labels() {
        let dispatcher = dispatcher_with(|_| Ok(fixed(2)));
        let upload = Upload::new(png_bytes(300, 300), Some("image/png"));
        let prediction = dispatcher.classify(BackendKind::ResNet, &upload).unwrap();
        assert_eq!(prediction.prediction, "Esfera");
        assert!(LABELS.contains(&prediction.prediction.as_str()));
    }

    #[test]
    fn test_resizes_to_backend_geometry() {
        let dispatcher = dispatcher_with(|_| Ok(Arc::new(GeometryCheck(InputGeometry::new(96, 128)))));
        let upload = Upload::new(png_bytes(37, 301), Some("image/png"));
        let prediction = dispatcher.classify(BackendKind::MobileNet, &upload).unwrap();
        assert_eq!(prediction.prediction, "Paralelepipedo");
    }

    #[test]
    fn test_non_image_is_invalid_input() {
        let dispatcher = dispatcher_with(|_| Ok(fixed(0)));
        let upload = Upload::new(b"hello".to_vec(), Some("text/plain"));
        let err = dispatcher.classify(BackendKind::ResNet, &upload).unwrap_err();
        assert!(matches!(err, ShapesError::InvalidInput(_)));
    }

    #[test]
    fn test_garbage_bytes_are_invalid_input() {
        let dispatcher = dispatcher_with(|_| Ok(fixed(0)));
        let upload = Upload::new(vec![7u8; 10], Some("image/png"));
        let err = dispatcher.classify(BackendKind::MobileNet, &upload).unwrap_err();
        assert!(matches!(err, ShapesError::InvalidInput(_)));
        assert_eq!(dispatcher.metrics()[&BackendKind::MobileNet].total_errors, 1);
    }

    #[test]
    fn test_out_of_range_index_is_runtime_error() {
        let dispatcher = dispatcher_with(|_| {
            Ok(Arc::new(FixedClassifier {
                index: 9,
                geometry: InputGeometry::square(8),
            }))
        });
        let upload = Upload::new(png_bytes(8, 8), Some("image/png"));
        let err = dispatcher.classify(BackendKind::ResNet, &upload).unwrap_err();
        assert!(matches!(err, ShapesError::InferenceRuntime(_)));
    }

    #[test]
    fn test_failed_backend_is_unavailable() {
        let dispatcher = dispatcher_with(|kind| match kind {
            BackendKind::ResNet => Ok(fixed(1)),
            BackendKind::MobileNet => Err(ShapesError::model_load("no interpreter")),
        });
        let upload = Upload::new(png_bytes(16, 16), Some("image/png"));
        assert!(matches!(
            dispatcher.classify(BackendKind::MobileNet, &upload),
            Err(ShapesError::BackendUnavailable { .. })
        ));
        assert_eq!(
            dispatcher.classify(BackendKind::ResNet, &upload).unwrap().prediction,
            "Cone"
        );
    }

    #[test]
    fn test_garbage_upload_on_failed_backend_is_invalid_input() {
        let dispatcher = dispatcher_with(|kind| match kind {
            BackendKind::ResNet => Ok(fixed(1)),
            BackendKind::MobileNet => Err(ShapesError::model_load("no interpreter")),
        });
        let upload = Upload::new(vec![0x13, 0x37, 0x00, 0xff, 0x42], Some("image/png"));
        let err = dispatcher.classify(BackendKind::MobileNet, &upload).unwrap_err();
        assert!(matches!(err, ShapesError::InvalidInput(_)), "{err}");

        let text = Upload::new(b"hello".to_vec(), Some("text/plain"));
        let err = dispatcher.classify(BackendKind::MobileNet, &text).unwrap_err();
        assert!(matches!(err, ShapesError::InvalidInput(_)), "{err}");
    }

    #[tokio::test]
    async fn test_classify_async_matches_sync() {
        let dispatcher = dispatcher_with(|_| Ok(fixed(5)));
        let upload = Upload::new(png_bytes(20, 10), Some("image/png"));
        let first = dispatcher.classify_async(BackendKind::ResNet, upload.clone()).await.unwrap();
        let second = dispatcher.classify_async(BackendKind::ResNet, upload).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.prediction, "Superficie");
        assert_eq!(dispatcher.metrics()[&BackendKind::ResNet].total_requests, 2);
    }
}
