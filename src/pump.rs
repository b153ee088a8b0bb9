//! read -> decode -> sleep, forever.
//!
//! runs on a blocking worker thread. the only way out is a read error, which
//! the caller treats as fatal: stale gauges are worse than no exporter.

use anyhow::{Context, Result};
use std::time::Duration;

use crate::decoder::{AppliedUpdate, RecordDecoder};
use crate::hal::ByteSource;

pub struct StreamPump<S> {
    source: S,
    decoder: RecordDecoder,
    buffer: Vec<u8>,
    interval: Duration,
}

impl<S: ByteSource> StreamPump<S> {
    pub fn new(source: S, decoder: RecordDecoder, read_buffer_bytes: usize, interval: Duration) -> Self {
        Self {
            source,
            decoder,
            buffer: vec![0u8; read_buffer_bytes.max(1)],
            interval,
        }
    }

    /// One read and decode.
    pub fn step(&mut self) -> Result<Vec<AppliedUpdate>> {
        let n = self
            .source
            .read_chunk(&mut self.buffer)
            .context("failed to read from serial device")?;
        Ok(self.decoder.decode(&self.buffer[..n]))
    }

    /// Pump until the source fails. Never returns `Ok`.
    pub fn run(mut self) -> Result<()> {
        tracing::info!("[PUMP] Reading device data every {:?}", self.interval);
        loop {
            let updates = self.step()?;
            tracing::trace!("[PUMP] applied {} updates", updates.len());
            std::thread::sleep(self.interval);
        }
    }
}
