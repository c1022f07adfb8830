//! Backend A: ResNet classifier on the candle tensor-graph runtime

mod model;
mod processor;

pub use model::{LayerType, ResNet, ResNetConfig};
pub use processor::{CropSize, ImageProcessor, ImageProcessorConfig, SizeSpec};

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use image::RgbImage;
use tracing::{info, warn};

use super::{argmax, Classifier};
use crate::error::{Result, ShapesError};
use crate::labels::{LABELS, NUM_CLASSES};
use crate::preprocessing::InputGeometry;

pub const CONFIG_FILE: &str = "config.json";
pub const PREPROCESSOR_FILE: &str = "preprocessor_config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Pixel grid handed to the image processor
pub const INPUT_SIDE: u32 = 224;

/// Loaded ResNet: immutable weights plus its image processor
pub struct ResNetClassifier {
    model: ResNet,
    processor: ImageProcessor,
    device: Device,
}

impl std::fmt::Debug for ResNetClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResNetClassifier")
            .field("device", &self.device)
            .field("processor", &self.processor.config())
            .finish()
    }
}

impl ResNetClassifier {
    /// Load `config.json`, `preprocessor_config.json` and `model.safetensors` from `dir`
    pub fn load(dir: &Path, device: &Device) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        let weights_path = dir.join(WEIGHTS_FILE);
        for path in [&config_path, &weights_path] {
            if !path.exists() {
                return Err(ShapesError::model_load(format!(
                    "file not found: {}",
                    path.display()
                )));
            }
        }

        let config: ResNetConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let preprocessor_path = dir.join(PREPROCESSOR_FILE);
        let processor = if preprocessor_path.exists() {
            ImageProcessor::from_json(&std::fs::read_to_string(&preprocessor_path)?)?
        } else {
            warn!(path = %preprocessor_path.display(), "No preprocessor config, using ResNet defaults");
            ImageProcessor::new(ImageProcessorConfig::default())
        };

        info!(weights = %weights_path.display(), "Loading ResNet weights");
        // SAFETY: the weights file is not modified while the process holds the mapping
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, device) }
            .map_err(|e| ShapesError::model_load(format!("failed to map weights: {e}")))?;

        Self::from_parts(&config, processor, vb, device.clone())
    }

    /// Build from an already opened variable store
    pub fn from_parts(
        config: &ResNetConfig,
        processor: ImageProcessor,
        vb: VarBuilder,
        device: Device,
    ) -> Result<Self> {
        let num_labels = config
            .num_labels()
            .ok_or_else(|| ShapesError::model_load("config.json declares no labels"))?;
        if num_labels != NUM_CLASSES {
            return Err(ShapesError::model_load(format!(
                "classifier has {num_labels} outputs, expected {NUM_CLASSES}"
            )));
        }
        if let Some(names) = config.ordered_labels() {
            if names != LABELS {
                warn!(checkpoint = ?names, "Checkpoint label names differ from the service label table");
            }
        }

        let model = ResNet::new(config, num_labels, vb)
            .map_err(|e| ShapesError::model_load(format!("failed to build ResNet: {e}")))?;

        Ok(Self {
            model,
            processor,
            device,
        })
    }

    fn encode(&self, pixels: &RgbImage) -> Result<Tensor> {
        let (values, height, width) = self.processor.encode(pixels);
        Ok(Tensor::from_vec(values, (1, 3, height, width), &self.device)?)
    }

    /// Raw logits for one image
    pub fn logits(&self, pixels: &RgbImage) -> Result<Vec<f32>> {
        let input = self.encode(pixels)?;
        let logits = self.model.forward(&input)?;
        Ok(logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

impl Classifier for ResNetClassifier {
    fn name(&self) -> &str {
        "resnet3d"
    }

    fn input_geometry(&self) -> InputGeometry {
        InputGeometry::square(INPUT_SIDE)
    }

    fn predict(&self, pixels: &RgbImage) -> Result<usize> {
        let logits = self.logits(pixels)?;
        argmax(&logits).ok_or_else(|| ShapesError::inference("model produced no logits"))
    }
}

#[cfg(test)]
mod tests {
    use super::model::tests::tiny_config;
    use super::*;
    use image::Rgb;

    fn zero_classifier() -> ResNetClassifier {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        ResNetClassifier::from_parts(
            &tiny_config(LayerType::Basic),
            ImageProcessor::new(ImageProcessorConfig::default()),
            vb,
            Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn test_predict_on_zero_weights_ties_to_first_class() {
        let classifier = zero_classifier();
        let pixels = RgbImage::from_pixel(224, 224, Rgb([90, 90, 90]));
        let logits = classifier.logits(&pixels).unwrap();
        assert_eq!(logits.len(), NUM_CLASSES);
        assert_eq!(classifier.predict(&pixels).unwrap(), 0);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let classifier = zero_classifier();
        let pixels = RgbImage::from_fn(224, 224, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7]));
        let first = classifier.logits(&pixels).unwrap();
        let second = classifier.logits(&pixels).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_wrong_label_count() {
        let mut config = tiny_config(LayerType::Basic);
        config.num_labels = Some(10);
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let err = ResNetClassifier::from_parts(
            &config,
            ImageProcessor::new(ImageProcessorConfig::default()),
            vb,
            Device::Cpu,
        )
        .unwrap_err();
        assert!(matches!(err, ShapesError::ModelLoad(_)));
    }

    #[test]
    fn test_load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResNetClassifier::load(dir.path(), &Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_geometry_is_fixed() {
        assert_eq!(zero_classifier().input_geometry(), InputGeometry::square(224));
    }
}
