//! ==============================================================================
//! registry.rs - positional gauge registry
//! ==============================================================================
//!
//! purpose:
//!     owns the prometheus registry the /metrics endpoint gathers from.
//!     one IntGauge per schema entry, addressed by the field position that
//!     feeds it, plus counters describing how the decoder treated its input.
//!
//! relationships:
//!     - built by: main.rs (once, before the pump starts)
//!     - written by: decoder.rs (single writer, via the pump thread)
//!     - read by: server.rs (gather + text encode on every scrape)
//!
//! ==============================================================================

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::SchemaEntry;

/// counters for malformed-but-tolerated input
#[derive(Clone)]
pub struct DecodeCounters {
    pub records_decoded: IntCounter,
    pub records_rejected: IntCounter,
    pub fields_skipped: IntCounter,
}

pub struct GaugeRegistry {
    registry: Registry,
    schema: Vec<SchemaEntry>,
    gauges: Vec<IntGauge>,
    counters: DecodeCounters,
}

impl GaugeRegistry {
    /// Create one gauge per schema entry, in schema order.
    ///
    /// Fails if two keys produce the same metric name or a key is not a
    /// valid metric name.
    pub fn initialize(prefix: &str, schema: &[SchemaEntry]) -> Result<Self> {
        let registry = Registry::new();
        register_process_collector(&registry)?;
        let mut gauges = Vec::with_capacity(schema.len());

        for entry in schema {
            let opts = Opts::new(
                format!("{}_gauge_{}", prefix, entry.key),
                format!("{} gauge for {}", prefix, entry.label),
            );
            let gauge = IntGauge::with_opts(opts)
                .with_context(|| format!("invalid gauge for schema key {:?}", entry.key))?;
            registry
                .register(Box::new(gauge.clone()))
                .with_context(|| format!("failed to register gauge for schema key {:?}", entry.key))?;
            gauges.push(gauge);
        }

        let counters = DecodeCounters {
            records_decoded: register_counter(
                &registry,
                format!("{}_records_decoded_total", prefix),
                "records with the expected field count",
            )?,
            records_rejected: register_counter(
                &registry,
                format!("{}_records_rejected_total", prefix),
                "lines dropped for a wrong field count",
            )?,
            fields_skipped: register_counter(
                &registry,
                format!("{}_fields_skipped_total", prefix),
                "fields that did not parse as an integer",
            )?,
        };

        Ok(Self {
            registry,
            schema: schema.to_vec(),
            gauges,
            counters,
        })
    }

    /// Overwrite the gauge at `index`. Returns false for a position outside
    /// the schema.
    pub fn set(&self, index: usize, value: i64) -> bool {
        match self.gauges.get(index) {
            Some(gauge) => {
                gauge.set(value);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn value(&self, index: usize) -> Option<i64> {
        self.gauges.get(index).map(IntGauge::get)
    }

    /// Current value of every gauge, in schema order.
    #[cfg(test)]
    pub fn values(&self) -> Vec<i64> {
        self.gauges.iter().map(IntGauge::get).collect()
    }

    pub fn schema(&self) -> &[SchemaEntry] {
        &self.schema
    }

    pub fn counters(&self) -> &DecodeCounters {
        &self.counters
    }

    /// Render every registered metric in the prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output was not utf-8")
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

/// process_* metrics (cpu, resident memory, open fds, start time)
#[cfg(target_os = "linux")]
fn register_process_collector(registry: &Registry) -> Result<()> {
    use prometheus::process_collector::ProcessCollector;
    registry
        .register(Box::new(ProcessCollector::for_self()))
        .context("failed to register process collector")
}

#[cfg(not(target_os = "linux"))]
fn register_process_collector(_registry: &Registry) -> Result<()> {
    Ok(())
}

fn register_counter(registry: &Registry, name: String, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name.clone(), help)
        .with_context(|| format!("invalid counter {}", name))?;
    registry
        .register(Box::new(counter.clone()))
        .with_context(|| format!("failed to register counter {}", name))?;
    Ok(counter)
}
