use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{actuator::CallConvention, pattern::PatternSpec, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub run: RunConfig,
    /// Extra or overriding patterns merged over the standard lamp library.
    pub patterns: Vec<PatternSpec>,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Serial line settings for the field-bus controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Response timeout for a single request.
    pub timeout_ms: u64,
    /// Device address on the bus. `0` broadcasts and never waits for a reply.
    pub unit_id: u8,
    /// Write conventions tried in order when the device rejects a call shape.
    pub conventions: Vec<CallConvention>,
}

impl BusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9_600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: 3_000,
            unit_id: 1,
            conventions: vec![CallConvention::MultipleCoils, CallConvention::SingleCoils],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Timing parameters for the dispatcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// How early an event may fire relative to its deadline.
    pub tolerance_ms: u64,
    /// Pause between clock polls.
    pub poll_interval_ms: u64,
    /// How long a clock that has not started yet is waited for. `0` waits forever.
    pub start_timeout_ms: u64,
}

impl RunConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 12,
            poll_interval_ms: 3,
            start_timeout_ms: 5_000,
        }
    }
}
