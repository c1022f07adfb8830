//! Backend-owned image encoding driven by `preprocessor_config.json`

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;

use crate::error::Result;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// `size` entry; checkpoints use either form, older ones a bare integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    ShortestEdge { shortest_edge: u32 },
    Exact { height: u32, width: u32 },
    Square(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropSize {
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageProcessorConfig {
    #[serde(default = "yes")]
    pub do_resize: bool,
    #[serde(default)]
    pub size: Option<SizeSpec>,
    #[serde(default)]
    pub crop_pct: Option<f64>,
    #[serde(default)]
    pub resample: Option<u8>,
    #[serde(default)]
    pub do_center_crop: bool,
    #[serde(default)]
    pub crop_size: Option<CropSize>,
    #[serde(default = "yes")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f64,
    #[serde(default = "yes")]
    pub do_normalize: bool,
    #[serde(default)]
    pub image_mean: Option<[f32; 3]>,
    #[serde(default)]
    pub image_std: Option<[f32; 3]>,
}

fn yes() -> bool {
    true
}

fn default_rescale_factor() -> f64 {
    1.0 / 255.0
}

impl Default for ImageProcessorConfig {
    /// ConvNeXt-style ResNet defaults: shortest edge 224, crop_pct 0.875, bicubic, ImageNet stats
    fn default() -> Self {
        Self {
            do_resize: true,
            size: Some(SizeSpec::ShortestEdge { shortest_edge: 224 }),
            crop_pct: Some(0.875),
            resample: Some(3),
            do_center_crop: false,
            crop_size: None,
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: true,
            image_mean: None,
            image_std: None,
        }
    }
}

/// Encodes an RGB grid into a normalized CHW buffer
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    config: ImageProcessorConfig,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageProcessor {
    pub fn new(config: ImageProcessorConfig) -> Self {
        let mean = config.image_mean.unwrap_or(IMAGENET_MEAN);
        let std = config.image_std.unwrap_or(IMAGENET_STD);
        Self { config, mean, std }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn config(&self) -> &ImageProcessorConfig {
        &self.config
    }

    /// Returns `(chw_values, height, width)`
    pub fn encode(&self, pixels: &RgbImage) -> (Vec<f32>, usize, usize) {
        let mut image = if self.config.do_resize {
            self.resize(pixels)
        } else {
            pixels.clone()
        };
        if self.config.do_center_crop {
            if let Some(crop) = self.config.crop_size {
                image = center_crop(&image, crop.height, crop.width);
            }
        }

        let (width, height) = image.dimensions();
        let (h, w) = (height as usize, width as usize);
        let plane = h * w;
        let scale = if self.config.do_rescale {
            self.config.rescale_factor as f32
        } else {
            1.0
        };

        let mut values = vec![0f32; 3 * plane];
        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                let mut v = f32::from(pixel[c]) * scale;
                if self.config.do_normalize {
                    v = (v - self.mean[c]) / self.std[c];
                }
                values[c * plane + offset] = v;
            }
        }
        (values, h, w)
    }

    fn filter(&self) -> FilterType {
        match self.config.resample {
            Some(0) => FilterType::Nearest,
            Some(1) => FilterType::Lanczos3,
            Some(2) => FilterType::Triangle,
            _ => FilterType::CatmullRom,
        }
    }

    fn resize(&self, pixels: &RgbImage) -> RgbImage {
        let (width, height) = pixels.dimensions();
        let filter = self.filter();
        match self.config.size {
            Some(SizeSpec::Exact { height: th, width: tw }) => resize(pixels, tw, th, filter),
            Some(SizeSpec::Square(side)) => resize(pixels, side, side, filter),
            Some(SizeSpec::ShortestEdge { shortest_edge }) => match self.config.crop_pct {
                // resize to edge / crop_pct, then crop back to edge
                Some(crop_pct) if shortest_edge < 384 && crop_pct > 0.0 => {
                    let resize_edge = (f64::from(shortest_edge) / crop_pct) as u32;
                    let (tw, th) = shortest_edge_size(width, height, resize_edge);
                    let resized = resize(pixels, tw, th, filter);
                    center_crop(&resized, shortest_edge, shortest_edge)
                }
                Some(_) => resize(pixels, shortest_edge, shortest_edge, filter),
                None => {
                    let (tw, th) = shortest_edge_size(width, height, shortest_edge);
                    resize(pixels, tw, th, filter)
                }
            },
            None => pixels.clone(),
        }
    }
}

/// Output `(width, height)` with the short side at `edge`, aspect ratio kept
fn shortest_edge_size(width: u32, height: u32, edge: u32) -> (u32, u32) {
    if width <= height {
        let long = (u64::from(edge) * u64::from(height) / u64::from(width.max(1))) as u32;
        (edge, long)
    } else {
        let long = (u64::from(edge) * u64::from(width) / u64::from(height.max(1))) as u32;
        (long, edge)
    }
}

fn resize(pixels: &RgbImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    if pixels.dimensions() == (width, height) {
        return pixels.clone();
    }
    imageops::resize(pixels, width, height, filter)
}

fn center_crop(pixels: &RgbImage, height: u32, width: u32) -> RgbImage {
    let (w, h) = pixels.dimensions();
    let top = h.saturating_sub(height) / 2;
    let left = w.saturating_sub(width) / 2;
    imageops::crop_imm(pixels, left, top, width.min(w), height.min(h)).to_image()
}
