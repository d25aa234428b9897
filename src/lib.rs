//! # Solis Modbus - RTU Telemetry Engine for Solis Hybrid Inverters
//!
//! An async Modbus RTU master for polling a Solis energy-storage inverter
//! over a serial line. The engine owns the full path from register map to
//! physical units:
//!
//! - **Frame codec**: Read Input Registers (FC04) encoding and response
//!   decoding with CRC16 validation and exception handling
//! - **Response assembly**: reconstruction of frames from arbitrarily
//!   chunked serial reads, driven by expected length with a quiet-window
//!   fallback and an overall deadline
//! - **Register decoding**: a static register map with per-quantity scale,
//!   span and signedness, including two's-complement handling for signed
//!   dual-register flows
//! - **Poll sequencing**: the fixed 18-read cycle across status, PV, AC,
//!   house, grid and battery groups, with explicit pacing and retry policy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use solis_modbus::{PollingConfig, SerialConfig, SolisClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let serial = SerialConfig::new("/dev/ttyUSB0");
//!     let polling = PollingConfig::default();
//!
//!     let client = SolisClient::connect(&serial, &polling)?;
//!     let snapshot = client.read_snapshot().await?;
//!     println!(
//!         "{} pv={}W battery={}W soc={}%",
//!         snapshot.status, snapshot.pv.total_power, snapshot.battery.power, snapshot.battery.soc
//!     );
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

/// Protocol and engine constants
pub mod constants;

/// Error types and result handling
pub mod error;

/// RTU frame encoding, decoding and CRC16
pub mod frame;

/// Frame reconstruction from chunked serial reads
pub mod assembler;

/// Static register map and raw-value interpretation
pub mod registers;

/// Decoded telemetry types
pub mod types;

/// Serial and polling configuration
pub mod config;

/// Serial transport and the transport trait
pub mod transport;

/// Poll sequencer and client
pub mod client;

/// Logging initialization
pub mod logging;

// === Client API ===
pub use client::{SnapshotFailure, SolisClient, TelemetryGroup};

// === Error handling ===
pub use error::{SolisError, SolisResult};

// === Configuration ===
pub use config::{PollingConfig, SerialConfig};

// === Telemetry types ===
pub use types::{
    AcTelemetry, BatteryTelemetry, GridTelemetry, HouseTelemetry, InverterSnapshot,
    InverterStatus, PartialSnapshot, PvTelemetry,
};

// === Register map (advanced usage) ===
pub use registers::{RegisterSpec, Scale, Span, Telemetry, REGISTER_MAP};

// === Wire level (advanced usage) ===
pub use frame::{crc16, RequestFrame, ResponseFrame};
pub use transport::{ModbusTransport, SerialRtuTransport, TransportStats};
