//! Command-line interface
//!
//! `serve` runs the HTTP service; `predict` and `info` load the same
//! registry locally for one-off use.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Environment, ServiceConfig};
use crate::dispatch::Dispatcher;
use crate::preprocessing::Upload;
use crate::registry::{BackendKind, ModelRegistry};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 110, 110) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn header(title: &str) {
    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", title.white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
}

fn footer() {
    line_box_empty();
    line_box_bottom();
    println!();
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "inteceleri-shapes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Geometric shape classification service")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP service
    Serve {
        /// Bind host (default: API_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (default: API_PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Model artifact directory (default: MODEL_DIR or ./models)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        /// Profile: development, testing or production (default: APP_ENV)
        #[arg(short, long)]
        env: Option<Environment>,
    },

    /// Classify one image file locally
    Predict {
        /// Backend: resnet3d or mobilenet3d
        #[arg(short, long, default_value = "resnet3d")]
        backend: BackendKind,

        /// Image to classify
        #[arg(short, long)]
        image: PathBuf,

        #[arg(short, long)]
        model_dir: Option<PathBuf>,
    },

    /// Load both backends and report their status
    Info {
        #[arg(short, long)]
        model_dir: Option<PathBuf>,
    },
}

impl Commands {
    /// Environment configuration with this command's overrides applied
    pub fn config(&self) -> crate::Result<ServiceConfig> {
        let mut config = ServiceConfig::from_env()?;
        match self {
            Commands::Serve { host, port, model_dir, env } => {
                if let Some(host) = host {
                    config.host = host.clone();
                }
                if let Some(port) = port {
                    config.port = *port;
                }
                if let Some(dir) = model_dir {
                    config.model_dir = dir.clone();
                }
                if let Some(env) = env {
                    config.environment = *env;
                }
            }
            Commands::Predict { model_dir, .. } | Commands::Info { model_dir } => {
                if let Some(dir) = model_dir {
                    config.model_dir = dir.clone();
                }
            }
        }
        config.validate()?;
        Ok(config)
    }
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Serve {
            host: None,
            port: None,
            model_dir: None,
            env: None,
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(config: ServiceConfig) -> anyhow::Result<()> {
    use crate::server::run_server;

    let base = format!("http://{}:{}", config.host, config.port);
    header("Inteceleri Shapes");
    line_box(&kv("ResNet   ", &format!("POST {base}/resnet3d")));
    line_box(&kv("MobileNet", &format!("POST {base}/mobilenet3d")));
    line_box(&kv("Health   ", &format!("GET  {base}/health")));
    line_box(&kv("Profile  ", &config.environment.to_string()));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    footer();

    run_server(config).await
}

pub fn cmd_predict(config: &ServiceConfig, backend: BackendKind, path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)?;
    let content_type = image::ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(&bytes))
        .map(|format| format.to_mime_type())
        .ok();
    let mut upload = Upload::new(bytes, content_type);
    if let Some(name) = path.file_name() {
        upload = upload.with_file_name(name.to_string_lossy());
    }

    let registry = Arc::new(ModelRegistry::new());
    registry.load(config)?;
    let dispatcher = Dispatcher::new(Arc::clone(&registry));

    let start = Instant::now();
    let result = dispatcher.classify(backend, &upload);
    let elapsed = start.elapsed();
    registry.unload()?;

    let prediction = result?;
    header("Prediction");
    line_box(&kv("Image  ", &path.display().to_string()));
    line_box(&kv("Backend", backend.name()));
    line_box(&kv("Label  ", &format!("{}", ok(&prediction.prediction))));
    line_box(&kv("Time   ", &format!("{:.1} ms", elapsed.as_secs_f64() * 1000.0)));
    footer();
    Ok(())
}

pub fn cmd_info(config: &ServiceConfig) -> anyhow::Result<()> {
    let registry = ModelRegistry::new();
    registry.load(config)?;

    header("Model Status");
    line_box(&kv("Model dir", &config.model_dir.display().to_string()));
    line_box(&kv("Device   ", if config.inference.use_gpu { "cuda (if available)" } else { "cpu" }));
    for status in registry.status() {
        line_box_empty();
        let state = if status.is_ready() {
            format!("{}", ok(status.status))
        } else {
            format!("{}", bad(status.status))
        };
        line_box(&kv(status.backend.name(), &state));
        if let Some(input) = status.input {
            line_box(&kv("  input  ", &input.to_string()));
        }
        if let Some(error) = &status.error {
            let mut reason = error.clone();
            if reason.chars().count() > W - 12 {
                reason = reason.chars().take(W - 15).collect::<String>() + "...";
            }
            line_box(&kv("  error  ", &reason));
        }
    }
    footer();

    registry.unload()?;
    Ok(())
}
