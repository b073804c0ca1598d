//! Host tool configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::{
    BAUD_SWITCH_DELAY_MS, BREAK_DURATION_MS, DEFAULT_BAUD_RATE, INITIAL_BAUD_RATE,
    READ_TIMEOUT_MS, RESET_SETTLE_MS,
};
use crate::transport::LinkTiming;

/// Configuration for a shield connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Serial device path (e.g. `/dev/ttyACM0`, `COM5`).
    pub port: Option<String>,
    /// Baud rate to switch to after reset.
    pub baud: u32,
    /// Baud rate the device listens at after reset.
    pub initial_baud: u32,
    /// Receive timeout per packet, in milliseconds.
    pub read_timeout_ms: u64,
    /// Break condition length, in milliseconds.
    pub break_duration_ms: u64,
    /// Settling delay after the break, in milliseconds.
    pub reset_settle_ms: u64,
    /// Delay between the baud acknowledgment and the local switch, in milliseconds.
    pub baud_switch_delay_ms: u64,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD_RATE,
            initial_baud: INITIAL_BAUD_RATE,
            read_timeout_ms: READ_TIMEOUT_MS,
            break_duration_ms: BREAK_DURATION_MS,
            reset_settle_ms: RESET_SETTLE_MS,
            baud_switch_delay_ms: BAUD_SWITCH_DELAY_MS,
        }
    }
}

impl ShieldConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ShieldConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            break_duration: Duration::from_millis(self.break_duration_ms),
            reset_settle: Duration::from_millis(self.reset_settle_ms),
        }
    }

    pub fn baud_switch_delay(&self) -> Duration {
        Duration::from_millis(self.baud_switch_delay_ms)
    }
}
