//! Backend B: quantized MobileNet behind a TensorFlow Lite interpreter
//!
//! The interpreter dictates its own input contract: the geometry is read
//! from its declared input tensor `[1, H, W, 3]` once at load time.
//! Interpreters keep scratch buffers between calls, so every forward pass
//! holds the backend's mutex.

#[cfg(feature = "tflite")]
mod tflite;

#[cfg(feature = "tflite")]
pub use self::tflite::TfLiteInterpreter;

use std::path::Path;

use image::RgbImage;
use ndarray::Array4;
use parking_lot::Mutex;
use tracing::debug;

use super::{argmax, Classifier};
use crate::error::{Result, ShapesError};
use crate::preprocessing::InputGeometry;

/// Minimal surface of an interpreter-style runtime
pub trait TensorInterpreter: Send {
    /// Dimensions of the first input tensor
    fn input_shape(&self) -> Result<Vec<usize>>;

    /// Copy `data` into the first input tensor
    fn write_input(&mut self, data: &[f32]) -> Result<()>;

    /// Run one forward pass
    fn invoke(&mut self) -> Result<()>;

    /// Values of the first output tensor, widened to `f32`
    fn read_output(&self) -> Result<Vec<f32>>;
}

pub struct MobileNetClassifier {
    interpreter: Mutex<Box<dyn TensorInterpreter>>,
    geometry: InputGeometry,
}

impl std::fmt::Debug for MobileNetClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobileNetClassifier")
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl MobileNetClassifier {
    /// Wrap an interpreter, reading its input geometry
    pub fn new(interpreter: Box<dyn TensorInterpreter>) -> Result<Self> {
        let shape = interpreter.input_shape()?;
        let geometry = match shape.as_slice() {
            [1, h, w, 3] if *h > 0 && *w > 0 => {
                let height = u32::try_from(*h).map_err(ShapesError::model_load)?;
                let width = u32::try_from(*w).map_err(ShapesError::model_load)?;
                InputGeometry::new(height, width)
            }
            _ => {
                return Err(ShapesError::model_load(format!(
                    "expected an NHWC input of shape [1, H, W, 3], interpreter declares {shape:?}"
                )))
            }
        };
        Ok(Self {
            interpreter: Mutex::new(interpreter),
            geometry,
        })
    }

    /// Load a `.tflite` flatbuffer
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ShapesError::model_load(format!(
                "file not found: {}",
                path.display()
            )));
        }
        Self::open(path)
    }

    #[cfg(feature = "tflite")]
    fn open(path: &Path) -> Result<Self> {
        Self::new(Box::new(TfLiteInterpreter::from_file(path)?))
    }

    #[cfg(not(feature = "tflite"))]
    fn open(path: &Path) -> Result<Self> {
        Err(ShapesError::model_load(format!(
            "cannot open {}: built without TensorFlow Lite support (enable the `tflite` feature)",
            path.display()
        )))
    }

    /// `[1, H, W, 3]` tensor with values scaled to `[0, 1]`
    pub fn to_input_tensor(&self, pixels: &RgbImage) -> Result<Array4<f32>> {
        let (width, height) = pixels.dimensions();
        if (height, width) != (self.geometry.height, self.geometry.width) {
            return Err(ShapesError::inference(format!(
                "image is {height}x{width}, interpreter expects {}",
                self.geometry
            )));
        }
        Ok(Array4::from_shape_fn(
            (1, height as usize, width as usize, 3),
            |(_, y, x, c)| f32::from(pixels.get_pixel(x as u32, y as u32)[c]) / 255.0,
        ))
    }
}

impl Classifier for MobileNetClassifier {
    fn name(&self) -> &str {
        "mobilenet3d"
    }

    fn input_geometry(&self) -> InputGeometry {
        self.geometry
    }

    fn predict(&self, pixels: &RgbImage) -> Result<usize> {
        let tensor = self.to_input_tensor(pixels)?;
        let data = tensor
            .as_slice()
            .ok_or_else(|| ShapesError::inference("input tensor is not contiguous"))?;

        let output = {
            let mut interpreter = self.interpreter.lock();
            interpreter.write_input(data)?;
            interpreter.invoke()?;
            interpreter.read_output()?
        };
        debug!(outputs = output.len(), "MobileNet forward pass complete");

        argmax(&output).ok_or_else(|| ShapesError::inference("interpreter produced an empty output"))
    }
}
