//! Module: config
//!
//! Purpose: Tunables for the link, the persistence cache and the UART.
//!
//! Architecture:
//! - Plain structs with `Default` carrying the board defaults
//! - `serde`-derivable so the settings board can ship overrides as JSON
//! - nvs.rs: NVS-backed key/value store used by the persistence cache
//!
//! All durations are in milliseconds on the wire and in JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod nvs;

pub use nvs::{NvsError, NVS_NAMESPACE};

/// Length of fixed text items (`[Char; STRING_ITEM_LEN]`).
pub const STRING_ITEM_LEN: usize = 50;

/// Default period of heartbeat and periodic transmissions.
pub const DEFAULT_PERIOD_MS: u64 = 1000;

// ========================================
// Link
// ========================================

/// Transport manager tunables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Label used in logs and thread names.
    pub name: String,
    /// Outbound queue capacity in messages.
    pub queue_capacity: usize,
    /// Longest accepted line, in bytes, excluding the newline.
    pub max_message_len: usize,
    /// RX task polling interval.
    pub rx_tick_ms: u64,
    /// TX task polling interval.
    pub tx_tick_ms: u64,
    /// Interval of the failure-rate report.
    pub report_interval_ms: u64,
    /// Bounded wait on a per-item lock before the operation is skipped.
    pub lock_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: "link".into(),
            queue_capacity: 50,
            max_message_len: 1000,
            rx_tick_ms: 20,
            tx_tick_ms: 20,
            report_interval_ms: 5000,
            lock_timeout_ms: 10,
        }
    }
}

impl LinkConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn rx_tick(&self) -> Duration {
        Duration::from_millis(self.rx_tick_ms)
    }

    pub fn tx_tick(&self) -> Duration {
        Duration::from_millis(self.tx_tick_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

// ========================================
// Persistence
// ========================================

/// Debounce parameters of the persistence cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Minimum interval between two physical writes of one key.
    pub debounce_window_ms: u64,
    /// Extra delay added to a deferred write.
    pub buffer_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 5000,
            buffer_ms: 1000,
        }
    }
}

impl PersistConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn buffer(&self) -> Duration {
        Duration::from_millis(self.buffer_ms)
    }
}

// ========================================
// UART
// ========================================

/// Serial link wiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    pub baud_rate: u32,
    pub tx_pin: u8,
    pub rx_pin: u8,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            tx_pin: 17,
            rx_pin: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_defaults() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.queue_capacity, 50);
        assert_eq!(cfg.max_message_len, 1000);
        assert_eq!(cfg.rx_tick(), Duration::from_millis(20));
        assert_eq!(cfg.report_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: LinkConfig = serde_json::from_str(r#"{"queue_capacity":8}"#).unwrap();
        assert_eq!(cfg.queue_capacity, 8);
        assert_eq!(cfg.max_message_len, 1000);

        let persist: PersistConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(persist, PersistConfig::default());
    }
}
