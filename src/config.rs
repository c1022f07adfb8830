//! Service configuration
//!
//! Defaults come from environment variables; the CLI overrides individual
//! fields through the builder methods.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShapesError};
use crate::inference::InferenceConfig;

/// Deployment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Default log level for this profile
    pub fn log_level(&self) -> &'static str {
        match self {
            Self::Development | Self::Testing => "debug",
            Self::Production => "info",
        }
    }

    /// Whether cross-origin requests are allowed from anywhere
    pub fn permissive_cors(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ShapesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ShapesError::Config(format!("unknown environment: {other}"))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

/// Configuration for the serving process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    /// Artifact directory holding both backends' files
    pub model_dir: PathBuf,

    /// Sub-directory of `model_dir` with the ResNet config and weights
    pub resnet_subdir: Option<String>,

    /// TensorFlow Lite flatbuffer for the MobileNet backend, relative to `model_dir`
    pub mobilenet_file: String,

    /// Request body limit in bytes
    pub max_upload_size: usize,

    /// Device selection for the graph backend
    pub inference: InferenceConfig,
}

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD: usize = 10 * 1024 * 1024;

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            model_dir: PathBuf::from("./models"),
            resnet_subdir: None,
            mobilenet_file: "mobilenet3d.tflite".to_string(),
            max_upload_size: DEFAULT_MAX_UPLOAD,
            inference: InferenceConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(env) = read_env("APP_ENV") {
            config.environment = env.parse()?;
        }
        if let Some(host) = read_env("API_HOST") {
            config.host = host;
        }
        if let Some(port) = read_env("API_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ShapesError::Config(format!("API_PORT is not a port: {port}")))?;
        }
        if let Some(dir) = read_env("MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        config.resnet_subdir = read_env("RESNET_SUBDIR");
        if let Some(file) = read_env("MOBILENET_MODEL_FILE") {
            config.mobilenet_file = file;
        }
        if let Some(size) = read_env("MAX_UPLOAD_SIZE") {
            config.max_upload_size = size.parse().map_err(|_| {
                ShapesError::Config(format!("MAX_UPLOAD_SIZE is not a byte count: {size}"))
            })?;
        }

        if let Some(flag) = read_env("USE_GPU") {
            if parse_flag(&flag)? {
                let device_id = match read_env("GPU_DEVICE_ID") {
                    Some(id) => id.parse().map_err(|_| {
                        ShapesError::Config(format!("GPU_DEVICE_ID is not a device index: {id}"))
                    })?,
                    None => 0,
                };
                config.inference = config.inference.with_gpu(device_id);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_mobilenet_file(mut self, file: impl Into<String>) -> Self {
        self.mobilenet_file = file.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ShapesError::Config("host must not be empty".to_string()));
        }
        if self.max_upload_size == 0 {
            return Err(ShapesError::Config("max upload size must be positive".to_string()));
        }
        if self.mobilenet_file.trim().is_empty() {
            return Err(ShapesError::Config("mobilenet model file must be named".to_string()));
        }
        Ok(())
    }

    /// Directory holding `config.json`, `preprocessor_config.json` and `model.safetensors`
    pub fn resnet_dir(&self) -> PathBuf {
        match &self.resnet_subdir {
            Some(sub) => self.model_dir.join(sub),
            None => self.model_dir.clone(),
        }
    }

    pub fn mobilenet_path(&self) -> PathBuf {
        self.model_dir.join(&self.mobilenet_file)
    }

    /// Default `tracing` filter directive for the active profile
    pub fn log_filter(&self) -> String {
        let level = self.environment.log_level();
        format!("inteceleri_shapes={level},tower_http={level}")
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ShapesError::Config(format!("expected a boolean flag, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_upload_size, 10 * 1024 * 1024);
        assert_eq!(config.environment, Environment::Production);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_artifact_paths() {
        let config = ServiceConfig::new()
            .with_model_dir("/srv/models")
            .with_mobilenet_file("shapes.tflite");
        assert_eq!(config.resnet_dir(), PathBuf::from("/srv/models"));
        assert_eq!(config.mobilenet_path(), PathBuf::from("/srv/models/shapes.tflite"));

        let nested = ServiceConfig {
            resnet_subdir: Some("resnet".to_string()),
            ..config
        };
        assert_eq!(nested.resnet_dir(), PathBuf::from("/srv/models/resnet"));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("TEST".parse::<Environment>().unwrap(), Environment::Testing);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_profile_log_levels() {
        let dev = ServiceConfig::new().with_environment(Environment::Development);
        assert_eq!(dev.log_filter(), "inteceleri_shapes=debug,tower_http=debug");
        assert!(dev.environment.permissive_cors());

        let prod = ServiceConfig::new();
        assert_eq!(prod.log_filter(), "inteceleri_shapes=info,tower_http=info");
        assert!(!prod.environment.permissive_cors());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_validation_rejects_empty_host() {
        let config = ServiceConfig::new().with_address("  ", 8000);
        assert!(matches!(config.validate(), Err(ShapesError::Config(_))));
    }
}
