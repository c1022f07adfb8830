//! TensorFlow Lite interpreter bound to its own flatbuffer

use std::mem::ManuallyDrop;
use std::path::Path;
use std::ptr::NonNull;

use tflite::context::ElementKind;
use tflite::ops::builtin::BuiltinOpResolver;
use tflite::{FlatBufferModel, Interpreter, InterpreterBuilder};
use tracing::info;

use super::TensorInterpreter;
use crate::error::{Result, ShapesError};

/// Owns the flatbuffer the interpreter borrows from
pub struct TfLiteInterpreter {
    interpreter: ManuallyDrop<Interpreter<'static, BuiltinOpResolver>>,
    model: NonNull<FlatBufferModel>,
}

// SAFETY: the interpreter and its model are only ever touched by one thread
// at a time; callers serialize access behind a mutex.
unsafe impl Send for TfLiteInterpreter {}

impl TfLiteInterpreter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let model = FlatBufferModel::build_from_file(path)
            .map_err(|e| ShapesError::model_load(format!("failed to read {}: {e}", path.display())))?;
        let model = NonNull::from(Box::leak(Box::new(model)));

        // SAFETY: `model` stays allocated until `Drop`, which releases the interpreter first
        let model_ref: &'static FlatBufferModel = unsafe { model.as_ref() };
        let built = InterpreterBuilder::new(model_ref, BuiltinOpResolver::default())
            .and_then(|builder| builder.build())
            .and_then(|mut interpreter| interpreter.allocate_tensors().map(|_| interpreter));

        let interpreter = match built {
            Ok(interpreter) => interpreter,
            Err(e) => {
                // SAFETY: nothing borrows the model once the builder failed
                drop(unsafe { Box::from_raw(model.as_ptr()) });
                return Err(ShapesError::model_load(format!("failed to build interpreter: {e}")));
            }
        };
        info!(
            path = %path.display(),
            inputs = interpreter.inputs().len(),
            outputs = interpreter.outputs().len(),
            "TensorFlow Lite interpreter ready"
        );

        Ok(Self {
            interpreter: ManuallyDrop::new(interpreter),
            model,
        })
    }

    fn input_index(&self) -> Result<i32> {
        self.interpreter
            .inputs()
            .first()
            .copied()
            .ok_or_else(|| ShapesError::inference("interpreter declares no inputs"))
    }

    fn output_index(&self) -> Result<i32> {
        self.interpreter
            .outputs()
            .first()
            .copied()
            .ok_or_else(|| ShapesError::inference("interpreter declares no outputs"))
    }
}

impl TensorInterpreter for TfLiteInterpreter {
    fn input_shape(&self) -> Result<Vec<usize>> {
        let index = self.input_index()?;
        let info = self
            .interpreter
            .tensor_info(index)
            .ok_or_else(|| ShapesError::model_load("input tensor has no metadata"))?;
        if info.element_kind != ElementKind::kTfLiteFloat32 {
            return Err(ShapesError::model_load(format!(
                "input tensor must be float32, found {:?}",
                info.element_kind
            )));
        }
        Ok(info.dims)
    }

    fn write_input(&mut self, data: &[f32]) -> Result<()> {
        let index = self.input_index()?;
        let tensor = self
            .interpreter
            .tensor_data_mut::<f32>(index)
            .map_err(ShapesError::inference)?;
        if tensor.len() != data.len() {
            return Err(ShapesError::inference(format!(
                "input tensor holds {} values, got {}",
                tensor.len(),
                data.len()
            )));
        }
        tensor.copy_from_slice(data);
        Ok(())
    }

    fn invoke(&mut self) -> Result<()> {
        self.interpreter.invoke().map_err(ShapesError::inference)
    }

    fn read_output(&self) -> Result<Vec<f32>> {
        let index = self.output_index()?;
        let kind = self
            .interpreter
            .tensor_info(index)
            .map(|info| info.element_kind)
            .ok_or_else(|| ShapesError::inference("output tensor has no metadata"))?;

        match kind {
            ElementKind::kTfLiteFloat32 => Ok(self
                .interpreter
                .tensor_data::<f32>(index)
                .map_err(ShapesError::inference)?
                .to_vec()),
            // quantized scores: dequantization is monotonic, argmax is unchanged
            ElementKind::kTfLiteUInt8 => Ok(self
                .interpreter
                .tensor_data::<u8>(index)
                .map_err(ShapesError::inference)?
                .iter()
                .map(|&v| f32::from(v))
                .collect()),
            other => Err(ShapesError::inference(format!(
                "unsupported output tensor type {other:?}"
            ))),
        }
    }
}

impl Drop for TfLiteInterpreter {
    fn drop(&mut self) {
        // SAFETY: the interpreter is dropped exactly once, before the model it borrows
        unsafe {
            ManuallyDrop::drop(&mut self.interpreter);
            drop(Box::from_raw(self.model.as_ptr()));
        }
    }
}
