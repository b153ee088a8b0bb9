//! ==============================================================================
//! hal.rs - Serial Byte Source Abstraction
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for reading raw bytes from the sensor.
//!     the real source is a UART opened through `rppal`, which puts the tty in
//!     raw mode at the configured line settings (57600 8N1 for the b36). tests
//!     swap in a scripted source.
//!
//! relationships:
//!     - used by: pump.rs (one read_chunk call per cycle)
//!     - uses: rppal::uart (any linux tty path, not only the Pi's own UART)
//!
//! failure model:
//!     open and read errors are returned as-is. the pump treats them as fatal,
//!     there is no reconnect.
//!
//! ==============================================================================

use anyhow::{Context, Result};
use rppal::uart::{Parity, Uart};
use std::time::Duration;

use crate::config::SerialConfig;

pub trait ByteSource: Send {
    /// Block until some bytes arrive and copy them into `buf`.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// line settings handed to the UART driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSettings {
    pub baud: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
}

impl LineSettings {
    /// 8N1 at the configured baud rate
    pub fn from_config(config: &SerialConfig) -> Self {
        Self {
            baud: config.baud,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: 1,
        }
    }
}

// ==============================================================================================
// UART IMPLEMENTATION
// ==============================================================================================
pub struct SerialSource {
    uart: Uart,
}

impl SerialSource {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let line = LineSettings::from_config(config);
        tracing::info!(
            "Opening {} at {} baud ({} data bits, parity {:?}, {} stop bit)",
            config.device.display(),
            line.baud,
            line.data_bits,
            line.parity,
            line.stop_bits
        );
        let mut uart = Uart::with_path(&config.device, line.baud, line.parity, line.data_bits, line.stop_bits)
            .with_context(|| format!("failed to open serial device {}", config.device.display()))?;
        // block until at least one byte is available, no timeout
        uart.set_read_mode(1, Duration::ZERO)
            .with_context(|| format!("failed to set read mode on {}", config.device.display()))?;
        Ok(Self { uart })
    }
}

impl ByteSource for SerialSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.uart.read(buf)?)
    }
}

// ==============================================================================================
// SCRIPTED IMPLEMENTATION (For Tests)
// ==============================================================================================
#[cfg(test)]
pub struct ScriptedSource {
    script: std::collections::VecDeque<Result<Vec<u8>>>,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<u8>>>) -> Self {
        Self { script: script.into() }
    }

    pub fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self::new(chunks.into_iter().map(|c| Ok(c.as_ref().to_vec())).collect())
    }
}

#[cfg(test)]
impl ByteSource for ScriptedSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.script.pop_front() {
            Some(Ok(chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => anyhow::bail!("scripted source exhausted"),
        }
    }
}
