//! ResNet graph in the Hugging Face `ResNetForImageClassification` layout
//!
//! Tensor names follow the published checkpoints:
//! `resnet.embedder.embedder.{convolution,normalization}`,
//! `resnet.encoder.stages.{i}.layers.{j}.{shortcut,layer.{k}}`,
//! `classifier.1`.

use std::collections::HashMap;

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{
    batch_norm, conv2d_no_bias, linear, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear,
    VarBuilder,
};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Basic,
    Bottleneck,
}

/// Architecture section of `config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct ResNetConfig {
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub depths: Vec<usize>,
    #[serde(default = "default_layer_type")]
    pub layer_type: LayerType,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    #[serde(default)]
    pub downsample_in_first_stage: bool,
    #[serde(default)]
    pub downsample_in_bottleneck: bool,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
    #[serde(default)]
    pub num_labels: Option<usize>,
}

fn default_num_channels() -> usize {
    3
}

fn default_embedding_size() -> usize {
    64
}

fn default_layer_type() -> LayerType {
    LayerType::Bottleneck
}

fn default_hidden_act() -> String {
    "relu".to_string()
}

impl ResNetConfig {
    /// Classifier width, from `id2label` when present
    pub fn num_labels(&self) -> Option<usize> {
        if self.id2label.is_empty() {
            self.num_labels
        } else {
            Some(self.id2label.len())
        }
    }

    /// Labels ordered by class index, if the checkpoint names them
    pub fn ordered_labels(&self) -> Option<Vec<&str>> {
        (0..self.id2label.len())
            .map(|i| self.id2label.get(&i.to_string()).map(String::as_str))
            .collect()
    }
}

/// Conv + batch norm + optional ReLU
#[derive(Debug)]
struct ConvLayer {
    conv: Conv2d,
    norm: BatchNorm,
    relu: bool,
}

impl ConvLayer {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        relu: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: kernel / 2,
            stride,
            ..Default::default()
        };
        let conv = conv2d_no_bias(in_channels, out_channels, kernel, cfg, vb.pp("convolution"))?;
        let norm = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("normalization"))?;
        Ok(Self { conv, norm, relu })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        // running statistics only
        let xs = self.norm.forward_t(&xs, false)?;
        if self.relu {
            xs.relu()
        } else {
            Ok(xs)
        }
    }
}

#[derive(Debug)]
struct ResidualLayer {
    shortcut: Option<ConvLayer>,
    layers: Vec<ConvLayer>,
}

impl ResidualLayer {
    fn basic(in_channels: usize, out_channels: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let shortcut = Self::shortcut(in_channels, out_channels, stride, &vb)?;
        let body = vb.pp("layer");
        let layers = vec![
            ConvLayer::new(in_channels, out_channels, 3, stride, true, body.pp("0"))?,
            ConvLayer::new(out_channels, out_channels, 3, 1, false, body.pp("1"))?,
        ];
        Ok(Self { shortcut, layers })
    }

    fn bottleneck(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        downsample_in_bottleneck: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let shortcut = Self::shortcut(in_channels, out_channels, stride, &vb)?;
        let reduced = out_channels / 4;
        let (reduce_stride, conv_stride) = if downsample_in_bottleneck {
            (stride, 1)
        } else {
            (1, stride)
        };
        let body = vb.pp("layer");
        let layers = vec![
            ConvLayer::new(in_channels, reduced, 1, reduce_stride, true, body.pp("0"))?,
            ConvLayer::new(reduced, reduced, 3, conv_stride, true, body.pp("1"))?,
            ConvLayer::new(reduced, out_channels, 1, 1, false, body.pp("2"))?,
        ];
        Ok(Self { shortcut, layers })
    }

    fn shortcut(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        vb: &VarBuilder,
    ) -> Result<Option<ConvLayer>> {
        if in_channels == out_channels && stride == 1 {
            return Ok(None);
        }
        ConvLayer::new(in_channels, out_channels, 1, stride, false, vb.pp("shortcut")).map(Some)
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let residual = match &self.shortcut {
            Some(shortcut) => shortcut.forward(xs)?,
            None => xs.clone(),
        };
        let mut hidden = xs.clone();
        for layer in &self.layers {
            hidden = layer.forward(&hidden)?;
        }
        (hidden + residual)?.relu()
    }
}

/// Full classifier: embedder, residual stages, pooler, linear head
#[derive(Debug)]
pub struct ResNet {
    embedder: ConvLayer,
    stages: Vec<Vec<ResidualLayer>>,
    classifier: Linear,
}

impl ResNet {
    pub fn new(config: &ResNetConfig, num_labels: usize, vb: VarBuilder) -> Result<Self> {
        if config.hidden_act != "relu" {
            candle_core::bail!("unsupported activation '{}'", config.hidden_act);
        }
        if config.hidden_sizes.is_empty() || config.hidden_sizes.len() != config.depths.len() {
            candle_core::bail!(
                "hidden_sizes ({}) and depths ({}) must be non-empty and equal in length",
                config.hidden_sizes.len(),
                config.depths.len()
            );
        }

        let resnet = vb.pp("resnet");
        let embedder = ConvLayer::new(
            config.num_channels,
            config.embedding_size,
            7,
            2,
            true,
            resnet.pp("embedder").pp("embedder"),
        )?;

        let stages_vb = resnet.pp("encoder").pp("stages");
        let mut stages = Vec::with_capacity(config.depths.len());
        let mut in_channels = config.embedding_size;
        for (i, (&out_channels, &depth)) in config.hidden_sizes.iter().zip(&config.depths).enumerate() {
            let stride = if i == 0 && !config.downsample_in_first_stage { 1 } else { 2 };
            let layers_vb = stages_vb.pp(i.to_string()).pp("layers");
            let mut layers = Vec::with_capacity(depth);
            for j in 0..depth {
                let (layer_in, layer_stride) = if j == 0 { (in_channels, stride) } else { (out_channels, 1) };
                let vb = layers_vb.pp(j.to_string());
                let layer = match config.layer_type {
                    LayerType::Basic => ResidualLayer::basic(layer_in, out_channels, layer_stride, vb)?,
                    LayerType::Bottleneck => ResidualLayer::bottleneck(
                        layer_in,
                        out_channels,
                        layer_stride,
                        config.downsample_in_bottleneck,
                        vb,
                    )?,
                };
                layers.push(layer);
            }
            stages.push(layers);
            in_channels = out_channels;
        }

        let classifier = linear(in_channels, num_labels, vb.pp("classifier").pp("1"))?;

        Ok(Self {
            embedder,
            stages,
            classifier,
        })
    }
}

impl Module for ResNet {
    /// `(batch, channels, height, width)` → `(batch, num_labels)` logits
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.embedder.forward(xs)?;
        // 3x3/2 max pool with padding 1; zero padding is exact after ReLU
        let mut xs = xs
            .pad_with_zeros(2, 1, 1)?
            .pad_with_zeros(3, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;
        for stage in &self.stages {
            for layer in stage {
                xs = layer.forward(&xs)?;
            }
        }
        let pooled = xs.mean((2, 3))?;
        self.classifier.forward(&pooled)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use candle_core::{DType, Device};

    /// Tiny two-stage network for fast tests
    pub(crate) fn tiny_config(layer_type: LayerType) -> ResNetConfig {
        let hidden_sizes = match layer_type {
            LayerType::Basic => vec![8, 16],
            LayerType::Bottleneck => vec![16, 32],
        };
        ResNetConfig {
            num_channels: 3,
            embedding_size: 8,
            hidden_sizes,
            depths: vec![1, 2],
            layer_type,
            hidden_act: "relu".to_string(),
            downsample_in_first_stage: false,
            downsample_in_bottleneck: false,
            id2label: HashMap::new(),
            num_labels: Some(6),
        }
    }

    #[test]
    fn test_logits_shape() {
        for layer_type in [LayerType::Basic, LayerType::Bottleneck] {
            let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
            let model = ResNet::new(&tiny_config(layer_type), 6, vb).unwrap();
            let input = Tensor::zeros((1, 3, 64, 64), DType::F32, &Device::Cpu).unwrap();
            let logits = model.forward(&input).unwrap();
            assert_eq!(logits.dims(), &[1, 6]);
        }
    }

    #[test]
    fn test_rejects_unknown_activation() {
        let mut config = tiny_config(LayerType::Basic);
        config.hidden_act = "gelu".to_string();
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(ResNet::new(&config, 6, vb).is_err());
    }

    #[test]
    fn test_config_parses_hf_layout() {
        let json = r#"{
            "architectures": ["ResNetForImageClassification"],
            "depths": [3, 4, 6, 3],
            "downsample_in_first_stage": false,
            "embedding_size": 64,
            "hidden_act": "relu",
            "hidden_sizes": [256, 512, 1024, 2048],
            "layer_type": "bottleneck",
            "id2label": {"0": "Cilindro", "1": "Cone", "2": "Esfera",
                         "3": "Nao definido", "4": "Paralelepipedo", "5": "Superficie"},
            "model_type": "resnet",
            "num_channels": 3
        }"#;
        let config: ResNetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.num_labels(), Some(6));
        assert_eq!(config.layer_type, LayerType::Bottleneck);
        assert_eq!(config.ordered_labels().unwrap()[3], "Nao definido");
    }
}
