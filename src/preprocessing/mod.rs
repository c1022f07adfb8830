//! Image preprocessing
//!
//! Backend-agnostic part of the request path:
//! - MIME type validation
//! - Decoding (PNG, JPEG, GIF, BMP, WebP)
//! - Bicubic resize to the backend's input geometry
//! - Conversion to 3-channel RGB
//!
//! Normalization is owned by each backend.

mod pixels;

pub use self::pixels::{decode, is_image_mime, prepare, validate_content_type, Upload};

use serde::{Deserialize, Serialize};

/// Spatial size of the pixel grid a backend consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputGeometry {
    pub height: u32,
    pub width: u32,
}

impl InputGeometry {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub const fn pixels(&self) -> usize {
        self.height as usize * self.width as usize
    }
}

impl std::fmt::Display for InputGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}
