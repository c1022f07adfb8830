//! Inteceleri Shapes - geometric shape classification over HTTP
//!
//! Two independently loaded image classifiers behind one service:
//! - a ResNet running on candle (`POST /resnet3d`)
//! - a quantized MobileNet on TensorFlow Lite (`POST /mobilenet3d`)
//!
//! # Modules
//!
//! ## Core
//! - [`labels`] - Fixed label table shared by both backends
//! - [`preprocessing`] - Upload validation, decoding and resizing
//! - [`inference`] - The two classifier backends
//! - [`registry`] - Model lifecycle (load once, unload once)
//! - [`dispatch`] - Per-request classification path
//!
//! ## Infrastructure
//! - [`config`] - Environment-driven service configuration
//! - [`monitoring`] - Per-backend latency and error metrics
//!
//! ## Services
//! - [`server`] - HTTP server
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core
pub mod labels;
pub mod preprocessing;
pub mod inference;
pub mod registry;
pub mod dispatch;

// Infrastructure
pub mod config;
pub mod monitoring;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, ShapesError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Result, ShapesError};

    pub use crate::config::{Environment, ServiceConfig};
    pub use crate::dispatch::{Dispatcher, Prediction};
    pub use crate::inference::{Classifier, InferenceConfig, MobileNetClassifier, ResNetClassifier, TensorInterpreter};
    pub use crate::labels::{label_for, LABELS};
    pub use crate::preprocessing::{InputGeometry, Upload};
    pub use crate::registry::{BackendKind, BackendStatus, LifecycleState, ModelRegistry};
    pub use crate::server::{create_router, AppState};
}
