//! Inference device configuration

use serde::{Deserialize, Serialize};

/// Where graph backends execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Whether to use GPU acceleration when the binary was built with CUDA
    pub use_gpu: bool,

    /// GPU device ID (if using GPU)
    pub device_id: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            use_gpu: false,
            device_id: 0,
        }
    }
}

impl InferenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to request a GPU device
    pub fn with_gpu(mut self, device_id: usize) -> Self {
        self.use_gpu = true;
        self.device_id = device_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert!(!config.use_gpu);
        assert_eq!(config.device_id, 0);
    }

    #[test]
    fn test_builder_pattern() {
        let config = InferenceConfig::new().with_gpu(1);
        assert!(config.use_gpu);
        assert_eq!(config.device_id, 1);
    }
}
