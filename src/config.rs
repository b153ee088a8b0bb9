//! ==============================================================================
//! config.rs - Exporter Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `exporter.toml`.
//!     loads configuration from file or falls back to defaults, then lets
//!     command line flags override the handful of values operators touch.
//!
//! structure:
//!     - SerialConfig: Device path, baud rate, read buffer, pacing, framing.
//!     - HttpConfig: Listen address and endpoint paths.
//!     - MetricsConfig: Metric name prefix.
//!     - LoggingConfig: Log level and the verbose per-record diagnostics.
//!
//! ==============================================================================

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decoder::Framing;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ExporterConfig {
    pub serial: SerialConfig,
    pub http: HttpConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    pub device: PathBuf,
    pub baud: u32,
    pub read_buffer_bytes: usize,
    pub interval_ms: u64,
    pub framing: Framing,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_address: String,
    pub metrics_path: String,
    pub json_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// print every decoded record and every skipped line
    pub verbose: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyUSB0"),
            baud: 57_600,
            read_buffer_bytes: 128,
            interval_ms: 1_000,
            framing: Framing::PerChunk,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_address: ":9301".to_string(),
            metrics_path: "/metrics".to_string(),
            json_path: "/json".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { prefix: "b36".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), verbose: false }
    }
}

impl SerialConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl HttpConfig {
    /// Address to hand to the TCP listener.
    ///
    /// Accepts the bare `:port` form and binds it on every interface.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}

// ==============================================================================
// command line
// ==============================================================================

/// Serial sensor to Prometheus exporter.
#[derive(Debug, Parser, Default)]
#[command(version, about)]
pub struct Cli {
    /// the file path of the serial port
    #[arg(long = "serial")]
    pub serial: Option<PathBuf>,

    /// the address to listen on for prometheus requests
    #[arg(long = "listen-address")]
    pub listen_address: Option<String>,

    /// print raw data on the console (added on top of RUST_LOG when it is set)
    #[arg(long)]
    pub debug: bool,

    /// carry partial lines across reads instead of dropping them
    #[arg(long)]
    pub buffered: bool,

    /// explicit config file (skips the default search path)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ExporterConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: ExporterConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("exporter.toml"),
            PathBuf::from("..").join("config").join("exporter.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    /// Resolve the effective configuration for a command line.
    ///
    /// An explicit `--config` must load; the default search path may fall back.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the router or the pump cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, path) in [
            ("metrics_path", &self.http.metrics_path),
            ("json_path", &self.http.json_path),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("http.{} must start with '/', got {:?}", name, path);
            }
        }
        if self.http.metrics_path == self.http.json_path {
            anyhow::bail!(
                "http.metrics_path and http.json_path are both {:?}",
                self.http.metrics_path
            );
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(device) = &cli.serial {
            self.serial.device = device.clone();
        }
        if let Some(addr) = &cli.listen_address {
            self.http.listen_address = addr.clone();
        }
        if cli.debug {
            self.logging.verbose = true;
        }
        if cli.buffered {
            self.serial.framing = Framing::Buffered;
        }
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        tracing::info!("┌─────────────────────────────────────────┐");
        tracing::info!("│         EXPORTER CONFIGURATION          │");
        tracing::info!("├─────────────────────────────────────────┤");
        tracing::info!("│ Serial: {} @ {} baud", self.serial.device.display(), self.serial.baud);
        tracing::info!("│ Read: {} bytes every {}ms ({:?})", self.serial.read_buffer_bytes, self.serial.interval_ms, self.serial.framing);
        tracing::info!("│ Listen: {}", self.http.bind_address());
        tracing::info!("│ Paths: {} {}", self.http.metrics_path, self.http.json_path);
        tracing::info!("│ Prefix: {}", self.metrics.prefix);
        tracing::info!("│ Log Level: {} (verbose: {})", self.logging.level, self.logging.verbose);
        tracing::info!("└─────────────────────────────────────────┘");
    }
}
