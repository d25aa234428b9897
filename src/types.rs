//! Decoded telemetry snapshots
//!
//! One struct per logical group, plus the aggregate snapshot of a full
//! polling cycle. All values are in final physical units; snapshots are
//! immutable once produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inverter operating state, decoded from the status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InverterStatus {
    pub code: u16,
}

impl InverterStatus {
    pub fn from_code(code: u16) -> Self {
        Self { code }
    }

    pub fn text(&self) -> &'static str {
        match self.code {
            0 => "Standby",
            1 => "Checking",
            2 => "Normal",
            3 => "Fault",
            4 => "Permanent Fault",
            _ => "Unknown",
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self.code, 3 | 4)
    }
}

impl fmt::Display for InverterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text(), self.code)
    }
}

/// Solar input telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvTelemetry {
    /// String 1 voltage (V)
    pub pv1_voltage: f64,
    /// String 1 current (A)
    pub pv1_current: f64,
    /// String 2 voltage (V)
    pub pv2_voltage: f64,
    /// String 2 current (A)
    pub pv2_current: f64,
    /// Combined DC power (W)
    pub total_power: f64,
}

/// AC side telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcTelemetry {
    /// Total AC output power (W)
    pub total_power: f64,
    /// Inverter temperature (degC)
    pub temperature: f64,
    /// Line frequency (Hz). Fixed for this device/region, not a register.
    pub frequency: f64,
}

/// Household consumption telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseTelemetry {
    /// House load (W)
    pub consumption: f64,
    /// Backup circuit load (W)
    pub backup_consumption: f64,
}

/// Grid exchange telemetry. Positive active power is import, negative is
/// export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTelemetry {
    /// Instantaneous grid power (W), signed
    pub active_power: f64,
    /// Inverter AC power toward the grid (W), signed
    pub inverter_ac_power: f64,
    /// Lifetime imported energy (kWh)
    pub imported_energy: f64,
    /// Lifetime exported energy (kWh)
    pub exported_energy: f64,
}

/// Battery telemetry. Positive power is discharge, negative is charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    /// Battery power (W), signed
    pub power: f64,
    /// State of charge (%)
    pub soc: f64,
    /// Battery voltage (V)
    pub voltage: f64,
    /// Battery current (A)
    pub current: f64,
}

/// The decoded result of one full polling cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterSnapshot {
    pub status: InverterStatus,
    pub pv: PvTelemetry,
    pub ac: AcTelemetry,
    pub house: HouseTelemetry,
    pub grid: GridTelemetry,
    pub battery: BatteryTelemetry,
    /// Capture time of the cycle (UTC)
    pub captured_at: DateTime<Utc>,
}

/// What a cycle managed to read before a group failed. Groups the cycle
/// never reached, or that failed, are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialSnapshot {
    pub status: Option<InverterStatus>,
    pub pv: Option<PvTelemetry>,
    pub ac: Option<AcTelemetry>,
    pub house: Option<HouseTelemetry>,
    pub grid: Option<GridTelemetry>,
    pub battery: Option<BatteryTelemetry>,
    pub captured_at: DateTime<Utc>,
}
