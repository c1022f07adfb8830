//! Decode and resize uploaded images

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

use super::InputGeometry;
use crate::error::{Result, ShapesError};

/// Raw upload as received from a client
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl Upload {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Validate the declared type and decode the bytes
    pub fn decode(&self) -> Result<DynamicImage> {
        validate_content_type(self.content_type.as_deref())?;
        decode(&self.bytes)
    }
}

/// `image/*`, ignoring parameters and case
pub fn is_image_mime(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.len() > "image/".len()
        && essence
            .get(.."image/".len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

pub fn validate_content_type(content_type: Option<&str>) -> Result<()> {
    match content_type {
        Some(ct) if is_image_mime(ct) => Ok(()),
        Some(ct) => Err(ShapesError::invalid_input(format!(
            "uploaded file is not a valid image (content type '{ct}')"
        ))),
        None => Err(ShapesError::invalid_input(
            "uploaded file is not a valid image (no content type)",
        )),
    }
}

/// Decode bytes into a pixel grid, guessing the format from its signature
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(ShapesError::invalid_input("uploaded file is empty"));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Resize to `geometry` with bicubic resampling, then force RGB.
///
/// Catmull-Rom is the a = -0.5 cubic kernel; its support widens when
/// downsampling, which is what PIL's `BICUBIC` filter does.
pub fn prepare(image: &DynamicImage, geometry: InputGeometry) -> RgbImage {
    let (width, height) = image.dimensions();
    let resized = if (height, width) == (geometry.height, geometry.width) {
        image.clone()
    } else {
        image.resize_exact(geometry.width, geometry.height, FilterType::CatmullRom)
    };
    resized.into_rgb8()
}
