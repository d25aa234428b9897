//! Engine configuration
//!
//! Plain serde types with defaulted fields; loading from YAML/JSON/TOML is
//! the embedding application's concern.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INTER_COMMAND_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_QUIET_WINDOW_MS,
    DEFAULT_RESPONSE_TIMEOUT_MS, DEFAULT_RETRY_INTERVAL_MS,
};

/// Serial line settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port path, e.g. "/dev/ttyUSB0" or "COM3"
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// 5-8 data bits
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// 1 or 2 stop bits
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// "None", "Even" or "Odd"
    #[serde(default = "default_parity")]
    pub parity: String,
}

fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_parity() -> String {
    "None".to_string()
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
        }
    }
}

/// Polling behaviour: framing timers, pacing and the explicit retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Modbus slave address of the inverter
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// Inter-chunk silence that closes a frame when no length is known
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,
    /// Overall deadline for one exchange
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Minimum spacing between exchanges; the device needs this turnaround
    #[serde(default = "default_inter_command_delay_ms")]
    pub inter_command_delay_ms: u64,
    /// Identical-exchange retries before surfacing the error (0 = none)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between retry attempts
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Hex-dump every sent/received frame at debug level
    #[serde(default)]
    pub packet_logging: bool,
}

fn default_slave_id() -> u8 {
    1
}
fn default_quiet_window_ms() -> u64 {
    DEFAULT_QUIET_WINDOW_MS
}
fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}
fn default_inter_command_delay_ms() -> u64 {
    DEFAULT_INTER_COMMAND_DELAY_MS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            slave_id: default_slave_id(),
            quiet_window_ms: default_quiet_window_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            inter_command_delay_ms: default_inter_command_delay_ms(),
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            packet_logging: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PollingConfig::default();
        assert_eq!(config.slave_id, 1);
        assert_eq!(config.quiet_window_ms, 200);
        assert_eq!(config.response_timeout_ms, 2000);
        assert_eq!(config.inter_command_delay_ms, 200);
        assert_eq!(config.max_retries, 0);

        let serial = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(serial.baud_rate, 9600);
        assert_eq!(serial.data_bits, 8);
        assert_eq!(serial.stop_bits, 1);
        assert_eq!(serial.parity, "None");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PollingConfig = serde_json::from_str(r#"{"slave_id": 3}"#).unwrap();
        assert_eq!(config.slave_id, 3);
        assert_eq!(config.quiet_window_ms, 200);
        assert!(!config.packet_logging);

        let serial: SerialConfig =
            serde_json::from_str(r#"{"port": "/dev/ttyUSB1", "baud_rate": 19200}"#).unwrap();
        assert_eq!(serial.baud_rate, 19200);
        assert_eq!(serial.parity, "None");
    }
}
