//! Model registry and lifecycle
//!
//! One handle per backend, created by a single `load` at startup and
//! released by a single `unload` at shutdown:
//!
//! `Uninitialized -> Loading -> Ready -> ShuttingDown -> Unloaded`
//!
//! A backend that fails to load stays failed for the life of the process.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use candle_core::Device;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, ShapesError};
use crate::inference::{
    release_accelerator, select_device, Classifier, MobileNetClassifier, ResNetClassifier,
};
use crate::preprocessing::InputGeometry;

/// Backend selector, also the route and log name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    ResNet,
    MobileNet,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::ResNet, BackendKind::MobileNet];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::ResNet => "resnet3d",
            Self::MobileNet => "mobilenet3d",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = ShapesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resnet3d" | "resnet" => Ok(Self::ResNet),
            "mobilenet3d" | "mobilenet" => Ok(Self::MobileNet),
            other => Err(ShapesError::Config(format!("unknown backend: {other}"))),
        }
    }
}

impl Serialize for BackendKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Loading,
    Ready,
    ShuttingDown,
    Unloaded,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
            Self::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

enum Slot {
    Ready(Arc<dyn Classifier>),
    Failed(String),
    Released,
}

/// Per-backend entry of the health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub backend: BackendKind,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputGeometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendStatus {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Owns every loaded backend for the life of the process
pub struct ModelRegistry {
    state: RwLock<LifecycleState>,
    slots: RwLock<BTreeMap<BackendKind, Slot>>,
    device: Mutex<Option<Device>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Uninitialized),
            slots: RwLock::new(BTreeMap::new()),
            device: Mutex::new(None),
        }
    }

    /// Load both backends from the configured artifact locations
    pub fn load(&self, config: &ServiceConfig) -> Result<()> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Loading)?;
        let device = select_device(&config.inference);
        *self.device.lock() = Some(device.clone());

        let resnet_dir = config.resnet_dir();
        let mobilenet_path = config.mobilenet_path();
        self.load_slots(|kind| -> Result<Arc<dyn Classifier>> {
            match kind {
                BackendKind::ResNet => Ok(Arc::new(ResNetClassifier::load(&resnet_dir, &device)?)),
                BackendKind::MobileNet => Ok(Arc::new(MobileNetClassifier::load(&mobilenet_path)?)),
            }
        });
        Ok(())
    }

    /// Load every backend through `loader`; one failing never stops the other
    pub fn load_with<F>(&self, loader: F) -> Result<()>
    where
        F: FnMut(BackendKind) -> Result<Arc<dyn Classifier>>,
    {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Loading)?;
        self.load_slots(loader);
        Ok(())
    }

    /// Caller must already hold the `Loading` state
    fn load_slots<F>(&self, mut loader: F)
    where
        F: FnMut(BackendKind) -> Result<Arc<dyn Classifier>>,
    {
        info!("Loading models");

        let mut slots = BTreeMap::new();
        for kind in BackendKind::ALL {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| loader(kind)));
            let slot = match outcome {
                Ok(Ok(classifier)) => {
                    info!(
                        backend = %kind,
                        input = %classifier.input_geometry(),
                        "Model loaded"
                    );
                    Slot::Ready(classifier)
                }
                Ok(Err(e)) => {
                    error!(backend = %kind, error = %e, "Model failed to load");
                    Slot::Failed(e.to_string())
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(backend = %kind, reason = %reason, "Model loader panicked");
                    Slot::Failed(format!("loader panicked: {reason}"))
                }
            };
            slots.insert(kind, slot);
        }

        *self.slots.write() = slots;
        *self.state.write() = LifecycleState::Ready;

        let ready = self.status().iter().filter(|s| s.is_ready()).count();
        info!(ready, total = BackendKind::ALL.len(), "Model loading complete");
    }

    /// Shared handle to a loaded backend
    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn Classifier>> {
        let unavailable = |reason: String| ShapesError::BackendUnavailable { kind, reason };
        match self.slots.read().get(&kind) {
            Some(Slot::Ready(classifier)) => Ok(Arc::clone(classifier)),
            Some(Slot::Failed(reason)) => Err(unavailable(reason.clone())),
            Some(Slot::Released) => Err(unavailable("service is shutting down".to_string())),
            None => Err(unavailable("models have not been loaded".to_string())),
        }
    }

    pub fn is_available(&self, kind: BackendKind) -> bool {
        matches!(self.slots.read().get(&kind), Some(Slot::Ready(_)))
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// One entry per backend kind, in route order
    pub fn status(&self) -> Vec<BackendStatus> {
        let slots = self.slots.read();
        BackendKind::ALL
            .iter()
            .map(|&kind| match slots.get(&kind) {
                Some(Slot::Ready(classifier)) => BackendStatus {
                    backend: kind,
                    status: "ready",
                    input: Some(classifier.input_geometry()),
                    error: None,
                },
                Some(Slot::Failed(reason)) => BackendStatus {
                    backend: kind,
                    status: "failed",
                    input: None,
                    error: Some(reason.clone()),
                },
                Some(Slot::Released) => BackendStatus {
                    backend: kind,
                    status: "unloaded",
                    input: None,
                    error: None,
                },
                None => BackendStatus {
                    backend: kind,
                    status: "not_loaded",
                    input: None,
                    error: None,
                },
            })
            .collect()
    }

    /// Drop every handle and release accelerator memory. Runs once.
    pub fn unload(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if matches!(*state, LifecycleState::ShuttingDown | LifecycleState::Unloaded) {
                warn!(state = %*state, "Unload requested twice, ignoring");
                return Err(ShapesError::Lifecycle(format!("cannot unload from {}", *state)));
            }
            *state = LifecycleState::ShuttingDown;
        }
        info!("Unloading models");

        {
            let mut slots = self.slots.write();
            for (kind, slot) in slots.iter_mut() {
                if matches!(slot, Slot::Ready(_)) {
                    info!(backend = %kind, "Releasing model");
                }
                *slot = Slot::Released;
            }
        }

        // regardless of how loading went
        match self.device.lock().take() {
            Some(device) => release_accelerator(&device),
            None => release_accelerator(&Device::Cpu),
        }

        *self.state.write() = LifecycleState::Unloaded;
        info!("Models unloaded");
        Ok(())
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(ShapesError::Lifecycle(format!(
                "cannot move to {to} from {}",
                *state
            )));
        }
        *state = to;
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
