//! Inference backends
//!
//! Both classifiers implement [`Classifier`]:
//! - [`ResNetClassifier`] runs a ResNet graph on candle
//! - [`MobileNetClassifier`] drives a quantized MobileNet through a TensorFlow Lite interpreter
//!
//! Each backend owns its own normalization; callers hand over an RGB grid
//! already resized to [`Classifier::input_geometry`].

mod config;
pub mod mobilenet;
pub mod resnet;

pub use config::InferenceConfig;
pub use mobilenet::{MobileNetClassifier, TensorInterpreter};
pub use resnet::{ImageProcessor, ResNetClassifier, ResNetConfig};

use candle_core::Device;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::preprocessing::InputGeometry;

/// Uniform `predict(image) -> class index` capability
pub trait Classifier: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Pixel grid size `predict` expects
    fn input_geometry(&self) -> InputGeometry;

    /// One forward pass; returns the first index holding the maximum score
    fn predict(&self, pixels: &RgbImage) -> Result<usize>;
}

/// Index of the first maximum. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Pick the compute device for graph backends
pub fn select_device(config: &InferenceConfig) -> Device {
    if !config.use_gpu {
        return Device::Cpu;
    }
    match Device::cuda_if_available(config.device_id) {
        Ok(device) => {
            if device.is_cpu() {
                warn!(device_id = config.device_id, "GPU requested but CUDA is not available, using CPU");
            } else {
                info!(device_id = config.device_id, "Using CUDA device for inference");
            }
            device
        }
        Err(e) => {
            warn!(error = %e, "Failed to initialise CUDA device, using CPU");
            Device::Cpu
        }
    }
}

/// Flush outstanding work on an accelerator so its buffers can be reclaimed
pub fn release_accelerator(device: &Device) {
    if device.is_cpu() {
        debug!("No accelerator memory to release");
        return;
    }
    match device.synchronize() {
        Ok(()) => info!("Accelerator memory released"),
        Err(e) => warn!(error = %e, "Accelerator synchronisation failed during release"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_maximum() {
        assert_eq!(argmax(&[0.1, 2.5, -1.0, 0.3]), Some(1));
    }

    #[test]
    fn test_argmax_ties_break_to_lowest_index() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[0.0; 6]), Some(0));
    }

    #[test]
    fn test_argmax_ignores_nan_and_empty() {
        assert_eq!(argmax(&[f32::NAN, 0.5, 0.7]), Some(2));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn test_cpu_device_when_gpu_disabled() {
        let device = select_device(&InferenceConfig::default());
        assert!(device.is_cpu());
        release_accelerator(&device);
    }
}
