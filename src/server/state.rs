//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ServiceConfig;
use crate::dispatch::Dispatcher;
use crate::registry::ModelRegistry;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServiceConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServiceConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(registry)),
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.dispatcher.registry()
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }
}
