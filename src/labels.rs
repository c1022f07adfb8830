//! Label table shared by both backends

use crate::error::{Result, ShapesError};

/// Class names in model output order
pub const LABELS: [&str; 6] = [
    "Cilindro",
    "Cone",
    "Esfera",
    "Nao definido",
    "Paralelepipedo",
    "Superficie",
];

/// Number of classes every backend must produce
pub const NUM_CLASSES: usize = LABELS.len();

/// Map a class index to its label
pub fn label_for(index: usize) -> Result<&'static str> {
    LABELS.get(index).copied().ok_or_else(|| {
        ShapesError::inference(format!(
            "class index {index} out of range for {NUM_CLASSES} labels"
        ))
    })
}
