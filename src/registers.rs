//! Static register map and raw-value interpretation
//!
//! The register map is the bit-exact device contract: address, span, scale
//! and signedness per physical quantity. It is data, not code paths - decode
//! logic never special-cases an address, so a future device model is a new
//! table, not new logic.
//!
//! Dual-register quantities combine high-word-first into a 32-bit value.
//! Quantities that are logically signed (grid import/export, battery
//! charge/discharge) are reinterpreted as two's-complement i32 before the
//! scale division; treating them as unsigned would turn a small negative
//! flow into a number near 4.3 billion.

use tracing::warn;

use crate::error::{SolisError, SolisResult};

/// How a raw register value maps to its physical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Raw value is already in its final unit
    Unity,
    /// Divide by 10 (voltages, currents, temperature)
    Tenths,
    /// Divide by 1000 (energy totals in kWh)
    Thousandths,
    /// AC power register: centiwatt-scaled value, divided by 100 then
    /// multiplied by 1000 to land on a round watt figure
    CentiKilowatts,
}

impl Scale {
    pub fn apply(self, raw: i64) -> f64 {
        match self {
            Scale::Unity => raw as f64,
            Scale::Tenths => raw as f64 / 10.0,
            Scale::Thousandths => raw as f64 / 1000.0,
            Scale::CentiKilowatts => raw as f64 / 100.0 * 1000.0,
        }
    }
}

/// Number of consecutive registers a quantity occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    One,
    Two,
}

impl Span {
    pub fn registers(self) -> u16 {
        match self {
            Span::One => 1,
            Span::Two => 2,
        }
    }
}

/// Every physical quantity the engine reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Telemetry {
    Status,
    Pv1Voltage,
    Pv1Current,
    Pv2Voltage,
    Pv2Current,
    PvTotalPower,
    AcTotalPower,
    Temperature,
    HouseConsumption,
    BackupConsumption,
    GridActivePower,
    InverterAcPower,
    GridImportedEnergy,
    GridExportedEnergy,
    BatteryPower,
    BatterySoc,
    BatteryVoltage,
    BatteryCurrent,
}

/// One entry of the device contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub telemetry: Telemetry,
    pub address: u16,
    pub span: Span,
    pub scale: Scale,
    pub signed: bool,
    pub unit: &'static str,
}

/// The static register map. Never derived at runtime.
pub const REGISTER_MAP: &[RegisterSpec] = &[
    RegisterSpec {
        telemetry: Telemetry::Status,
        address: 33095,
        span: Span::One,
        scale: Scale::Unity,
        signed: false,
        unit: "",
    },
    RegisterSpec {
        telemetry: Telemetry::Pv1Voltage,
        address: 33049,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "V",
    },
    RegisterSpec {
        telemetry: Telemetry::Pv1Current,
        address: 33050,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "A",
    },
    RegisterSpec {
        telemetry: Telemetry::Pv2Voltage,
        address: 33051,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "V",
    },
    RegisterSpec {
        telemetry: Telemetry::Pv2Current,
        address: 33052,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "A",
    },
    RegisterSpec {
        telemetry: Telemetry::PvTotalPower,
        address: 33057,
        span: Span::Two,
        scale: Scale::Unity,
        signed: false,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::AcTotalPower,
        address: 33079,
        span: Span::One,
        scale: Scale::CentiKilowatts,
        signed: false,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::Temperature,
        address: 33093,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "degC",
    },
    RegisterSpec {
        telemetry: Telemetry::HouseConsumption,
        address: 33147,
        span: Span::One,
        scale: Scale::Unity,
        signed: false,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::BackupConsumption,
        address: 33148,
        span: Span::One,
        scale: Scale::Unity,
        signed: false,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::GridActivePower,
        address: 33130,
        span: Span::Two,
        scale: Scale::Unity,
        signed: true,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::InverterAcPower,
        address: 33151,
        span: Span::Two,
        scale: Scale::Unity,
        signed: true,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::GridImportedEnergy,
        address: 33169,
        span: Span::Two,
        scale: Scale::Thousandths,
        signed: false,
        unit: "kWh",
    },
    RegisterSpec {
        telemetry: Telemetry::GridExportedEnergy,
        address: 33173,
        span: Span::Two,
        scale: Scale::Thousandths,
        signed: false,
        unit: "kWh",
    },
    RegisterSpec {
        telemetry: Telemetry::BatteryPower,
        address: 33149,
        span: Span::Two,
        scale: Scale::Unity,
        signed: true,
        unit: "W",
    },
    RegisterSpec {
        telemetry: Telemetry::BatterySoc,
        address: 33139,
        span: Span::One,
        scale: Scale::Unity,
        signed: false,
        unit: "%",
    },
    RegisterSpec {
        telemetry: Telemetry::BatteryVoltage,
        address: 33133,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "V",
    },
    RegisterSpec {
        telemetry: Telemetry::BatteryCurrent,
        address: 33134,
        span: Span::One,
        scale: Scale::Tenths,
        signed: false,
        unit: "A",
    },
];

/// Look up the map entry for a quantity.
///
/// The match is exhaustive over `Telemetry`, so adding a variant without a
/// map entry fails to compile instead of reading a wrong register. The
/// indices follow `REGISTER_MAP` order; the tests pin the correspondence.
pub fn spec_for(telemetry: Telemetry) -> &'static RegisterSpec {
    let index = match telemetry {
        Telemetry::Status => 0,
        Telemetry::Pv1Voltage => 1,
        Telemetry::Pv1Current => 2,
        Telemetry::Pv2Voltage => 3,
        Telemetry::Pv2Current => 4,
        Telemetry::PvTotalPower => 5,
        Telemetry::AcTotalPower => 6,
        Telemetry::Temperature => 7,
        Telemetry::HouseConsumption => 8,
        Telemetry::BackupConsumption => 9,
        Telemetry::GridActivePower => 10,
        Telemetry::InverterAcPower => 11,
        Telemetry::GridImportedEnergy => 12,
        Telemetry::GridExportedEnergy => 13,
        Telemetry::BatteryPower => 14,
        Telemetry::BatterySoc => 15,
        Telemetry::BatteryVoltage => 16,
        Telemetry::BatteryCurrent => 17,
    };
    &REGISTER_MAP[index]
}

/// Combine two registers high-word-first into a 32-bit value
pub fn compose_u32(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

/// Interpret raw register words per the map entry: compose, apply sign,
/// apply scale.
///
/// A genuinely empty register array decodes to zero - a deliberate
/// convenience for devices that answer with an empty payload, and a risky
/// one, since it can present an absent reading as a valid zero. It is logged
/// every time. An undersized (non-empty) array is always an error.
pub fn decode_value(spec: &RegisterSpec, words: &[u16]) -> SolisResult<f64> {
    if words.is_empty() {
        warn!(
            address = spec.address,
            "empty register array decoded as zero"
        );
        return Ok(0.0);
    }

    let raw: i64 = match spec.span {
        Span::One => i64::from(words[0]),
        Span::Two => {
            if words.len() < 2 {
                return Err(SolisError::malformed(format!(
                    "register {} spans two words, got {}",
                    spec.address,
                    words.len()
                )));
            }
            let combined = compose_u32(words[0], words[1]);
            if spec.signed {
                i64::from(combined as i32)
            } else {
                i64::from(combined)
            }
        }
    };

    Ok(spec.scale.apply(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_covers_every_quantity_once() {
        for spec in REGISTER_MAP {
            let matches = REGISTER_MAP
                .iter()
                .filter(|other| other.telemetry == spec.telemetry)
                .count();
            assert_eq!(matches, 1, "{:?} appears {} times", spec.telemetry, matches);
        }
        assert_eq!(REGISTER_MAP.len(), 18);
    }

    #[test]
    fn test_spec_lookup() {
        let spec = spec_for(Telemetry::BatterySoc);
        assert_eq!(spec.address, 33139);
        assert_eq!(spec.span, Span::One);
        assert_eq!(spec.scale, Scale::Unity);
    }

    #[test]
    fn test_lookup_indices_match_map_order() {
        // Every variant must resolve to its own map entry
        for spec in REGISTER_MAP {
            assert_eq!(spec_for(spec.telemetry).telemetry, spec.telemetry);
            assert_eq!(spec_for(spec.telemetry).address, spec.address);
        }
    }

    #[test]
    fn test_pv_voltage_scaling() {
        let spec = spec_for(Telemetry::Pv1Voltage);
        assert_eq!(decode_value(spec, &[2450]).unwrap(), 245.0);
    }

    #[test]
    fn test_ac_power_centiwatt_rule() {
        let spec = spec_for(Telemetry::AcTotalPower);
        // 350 raw -> 3.5 -> 3500 W
        assert_eq!(decode_value(spec, &[350]).unwrap(), 3500.0);
    }

    #[test]
    fn test_energy_total_scaling() {
        let spec = spec_for(Telemetry::GridImportedEnergy);
        // (0x0000, 0x3039) = 12345 -> 12.345 kWh
        assert_eq!(decode_value(spec, &[0x0000, 0x3039]).unwrap(), 12.345);
    }

    #[test]
    fn test_unsigned_dual_register_composition() {
        assert_eq!(compose_u32(0x0001, 0x0002), 65538);
        let spec = spec_for(Telemetry::PvTotalPower);
        assert_eq!(decode_value(spec, &[0x0001, 0x0002]).unwrap(), 65538.0);
    }

    #[test]
    fn test_signed_dual_register_composition() {
        let spec = spec_for(Telemetry::GridActivePower);
        // (0xFFFF, 0xFFFE) is -2 as two's complement, not 4294967294
        assert_eq!(decode_value(spec, &[0xFFFF, 0xFFFE]).unwrap(), -2.0);
    }

    #[test]
    fn test_battery_power_sign_cases() {
        let spec = spec_for(Telemetry::BatteryPower);
        // Discharging: positive flow
        assert_eq!(decode_value(spec, &[0x0000, 0x0384]).unwrap(), 900.0);
        // Charging: negative flow
        assert_eq!(decode_value(spec, &[0xFFFF, 0xFC18]).unwrap(), -1000.0);
        assert_eq!(decode_value(spec, &[0xFFFF, 0xFC1C]).unwrap(), -996.0);
    }

    #[test]
    fn test_undersized_dual_register_is_malformed() {
        let spec = spec_for(Telemetry::BatteryPower);
        assert!(matches!(
            decode_value(spec, &[0x0001]),
            Err(SolisError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_empty_array_defaults_to_zero() {
        let spec = spec_for(Telemetry::HouseConsumption);
        assert_eq!(decode_value(spec, &[]).unwrap(), 0.0);
    }
}
