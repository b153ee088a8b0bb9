//! ==============================================================================
//! main.rs - b36 serial exporter entry point
//! ==============================================================================
//!
//! purpose:
//!     reads the comma separated readings a b36 air quality monitor prints on
//!     its serial port and republishes them as prometheus gauges, plus a json
//!     snapshot of the human relevant values.
//!
//! responsibilities:
//!     - resolve configuration (exporter.toml + command line flags)
//!     - initialize logging
//!     - build the gauge registry and sensor state (shared, never torn down)
//!     - open the serial device and run the pump on a blocking thread
//!     - serve /metrics and /json
//!
//! architecture:
//!
//!     ┌──────────────┐   chunks   ┌──────────────┐
//!     │ serial (hal) │ ─────────> │ pump.rs      │  (1s cycle, blocking thread)
//!     └──────────────┘            └──────┬───────┘
//!                                        │ decode
//!                                 ┌──────┴───────┐
//!                                 │ decoder.rs   │
//!                                 └──┬────────┬──┘
//!                           set(i,v) │        │ apply(i,v)
//!                         ┌──────────┴──┐  ┌──┴───────────┐
//!                         │ registry.rs │  │ sensor.rs    │
//!                         └──────┬──────┘  └──────┬───────┘
//!                                │ read on scrape │
//!                         ┌──────┴────────────────┴──────┐
//!                         │ server.rs  /metrics  /json   │
//!                         └──────────────────────────────┘
//!
//! failure model:
//!     the process exits non-zero when the device cannot be opened, a read
//!     fails, or the listener cannot bind. bad input is skipped, never fatal.
//!
//! ==============================================================================

mod config;
mod decoder;
mod domain;
mod hal;
mod pump;
mod registry;
mod sensor;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::config::{Cli, ExporterConfig};
use crate::decoder::{Framing, RecordDecoder};
use crate::domain::REFERENCE_SCHEMA;
use crate::registry::GaugeRegistry;
use crate::sensor::{SensorState, SnapshotMapping};
use crate::server::AppState;

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // step 1: logging, then configuration (the config file may change the level)
    let log_handle = init_logging(cli.debug);
    let config = ExporterConfig::from_cli(&cli)?;
    log_handle.apply_level(&config.logging.level, config.logging.verbose);
    config.print_summary();

    if config.serial.framing == Framing::PerChunk {
        tracing::warn!(
            "[STARTUP] per-chunk framing: records split across reads are dropped (use --buffered to reassemble)"
        );
    }

    // step 2: shared state, built once
    let registry = Arc::new(
        GaugeRegistry::initialize(&config.metrics.prefix, &REFERENCE_SCHEMA)
            .context("failed to set up gauges")?,
    );
    let sensor = Arc::new(SensorState::new(SnapshotMapping::default()));
    tracing::info!("[STARTUP] Registered {} gauges", registry.schema().len());

    // step 3: open the device before anything is served
    let source = hal::SerialSource::open(&config.serial)?;
    let decoder = RecordDecoder::new(registry.clone(), sensor.clone(), config.serial.framing)
        .verbose(config.logging.verbose);
    let pump = pump::StreamPump::new(
        source,
        decoder,
        config.serial.read_buffer_bytes,
        config.serial.interval(),
    );

    // step 4: pump on a blocking thread, server on the runtime
    let mut pump_task = tokio::task::spawn_blocking(move || pump.run());
    let state = AppState { registry, sensor };

    tokio::select! {
        joined = &mut pump_task => {
            joined.context("pump thread panicked")?.context("serial pump stopped")?;
            Err(anyhow::anyhow!("serial pump stopped unexpectedly"))
        }
        served = server::run_server(state, &config.http) => {
            served?;
            Err(anyhow::anyhow!("http server stopped unexpectedly"))
        }
    }
}

// ==============================================================================
// logging
// ==============================================================================

struct LogHandle {
    reload: reload::Handle<EnvFilter, Registry>,
    env: Option<String>,
}

/// Install the subscriber before the config is known. `RUST_LOG` replaces the
/// configured level, verbose mode still widens it for this crate.
fn init_logging(debug: bool) -> LogHandle {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok().filter(|v| !v.is_empty());
    let directive = filter_directive(env.as_deref(), "info", debug);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, reload) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    LogHandle { reload, env }
}

impl LogHandle {
    fn apply_level(&self, level: &str, verbose: bool) {
        let directive = filter_directive(self.env.as_deref(), level, verbose);
        match EnvFilter::try_new(&directive) {
            Ok(filter) => {
                if let Err(e) = self.reload.reload(filter) {
                    tracing::warn!("[CONFIG] Could not apply log filter {:?}: {}", directive, e);
                }
            }
            Err(e) => tracing::warn!("[CONFIG] Invalid log filter {:?}: {}", directive, e),
        }
    }
}

fn filter_directive(env: Option<&str>, level: &str, verbose: bool) -> String {
    let base = env.unwrap_or(level);
    if verbose {
        format!("{},b36_exporter=debug", base)
    } else {
        base.to_string()
    }
}
