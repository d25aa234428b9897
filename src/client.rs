//! Poll sequencer and caller-facing client
//!
//! Runs the fixed read cycle (Status, PV, AC, House, Grid, Battery - 18
//! reads) over one half-duplex transport. Exchanges are serialized behind a
//! mutex, spaced by an explicit pacing policy, and retried only per the
//! caller-configured policy. A failing read fails its logical group, not the
//! whole cycle; the aggregate accessor keeps whatever groups it already
//! obtained.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::{PollingConfig, SerialConfig};
use crate::constants::GRID_FREQUENCY_HZ;
use crate::error::{SolisError, SolisResult};
use crate::frame::RequestFrame;
use crate::registers::{decode_value, spec_for, RegisterSpec, Telemetry};
use crate::transport::{ModbusTransport, SerialRtuTransport, TransportStats};
use crate::types::{
    AcTelemetry, BatteryTelemetry, GridTelemetry, HouseTelemetry, InverterSnapshot,
    InverterStatus, PartialSnapshot, PvTelemetry,
};

/// The logical read groups of one polling cycle, in cycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryGroup {
    Status,
    Pv,
    Ac,
    House,
    Grid,
    Battery,
}

impl fmt::Display for TelemetryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TelemetryGroup::Status => "status",
            TelemetryGroup::Pv => "pv",
            TelemetryGroup::Ac => "ac",
            TelemetryGroup::House => "house",
            TelemetryGroup::Grid => "grid",
            TelemetryGroup::Battery => "battery",
        };
        f.write_str(name)
    }
}

/// A full cycle that lost one or more groups. Carries everything the cycle
/// did obtain, so callers can keep partial snapshots at their own policy.
#[derive(Debug, Error)]
#[error("{group} group read failed: {error}")]
pub struct SnapshotFailure {
    /// First group that failed
    pub group: TelemetryGroup,
    #[source]
    pub error: SolisError,
    pub partial: PartialSnapshot,
}

/// Minimum spacing between exchanges, consulted in one place by the
/// sequencer rather than scattered across reads
#[derive(Debug, Clone, Copy)]
struct PacingPolicy {
    min_gap: Duration,
}

/// Caller-configured retry behaviour; the engine adds nothing implicit
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    retry_interval: Duration,
}

struct Inner<T> {
    transport: T,
    /// Completion instant of the previous exchange, for pacing
    last_exchange: Option<Instant>,
}

/// Telemetry client for one inverter on one serial line
pub struct SolisClient<T: ModbusTransport = SerialRtuTransport> {
    inner: Mutex<Inner<T>>,
    slave_id: u8,
    pacing: PacingPolicy,
    retry: RetryPolicy,
}

impl SolisClient<SerialRtuTransport> {
    /// Open the serial port and build a ready client
    pub fn connect(serial: &SerialConfig, polling: &PollingConfig) -> SolisResult<Self> {
        let transport = SerialRtuTransport::open(serial, polling)?;
        Ok(Self::with_transport(transport, polling))
    }
}

impl<T: ModbusTransport> SolisClient<T> {
    /// Build a client over an already-open transport
    pub fn with_transport(transport: T, polling: &PollingConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                last_exchange: None,
            }),
            slave_id: polling.slave_id,
            pacing: PacingPolicy {
                min_gap: Duration::from_millis(polling.inter_command_delay_ms),
            },
            retry: RetryPolicy {
                max_retries: polling.max_retries,
                retry_interval: Duration::from_millis(polling.retry_interval_ms),
            },
        }
    }

    /// One paced, optionally-retried exchange for a single map entry
    async fn read_registers(&self, spec: &RegisterSpec) -> SolisResult<Vec<u16>> {
        let request = RequestFrame::read_input(self.slave_id, spec.address, spec.span.registers());
        let mut inner = self.inner.lock().await;
        let mut attempt: u32 = 0;

        loop {
            if let Some(last) = inner.last_exchange {
                let since = last.elapsed();
                if since < self.pacing.min_gap {
                    sleep(self.pacing.min_gap - since).await;
                }
            }

            let result = inner.transport.exchange(&request).await;
            inner.last_exchange = Some(Instant::now());

            match result {
                Ok(response) => {
                    debug!(
                        address = spec.address,
                        registers = response.registers.len(),
                        "read complete"
                    );
                    return Ok(response.registers);
                }
                Err(e) if attempt < self.retry.max_retries && !e.is_terminal() => {
                    attempt += 1;
                    warn!(
                        address = spec.address,
                        attempt,
                        max = self.retry.max_retries,
                        error = %e,
                        "exchange failed, retrying"
                    );
                    sleep(self.retry.retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_value(&self, telemetry: Telemetry) -> SolisResult<f64> {
        let spec = spec_for(telemetry);
        let registers = self.read_registers(spec).await?;
        decode_value(spec, &registers)
    }

    /// Inverter operating state
    pub async fn read_status(&self) -> SolisResult<InverterStatus> {
        let spec = spec_for(Telemetry::Status);
        let registers = self.read_registers(spec).await?;
        if registers.is_empty() {
            warn!("empty status payload decoded as code 0");
        }
        Ok(InverterStatus::from_code(
            registers.first().copied().unwrap_or_default(),
        ))
    }

    /// Solar input group (5 reads)
    pub async fn read_pv(&self) -> SolisResult<PvTelemetry> {
        Ok(PvTelemetry {
            pv1_voltage: self.read_value(Telemetry::Pv1Voltage).await?,
            pv1_current: self.read_value(Telemetry::Pv1Current).await?,
            pv2_voltage: self.read_value(Telemetry::Pv2Voltage).await?,
            pv2_current: self.read_value(Telemetry::Pv2Current).await?,
            total_power: self.read_value(Telemetry::PvTotalPower).await?,
        })
    }

    /// AC side group (2 reads; frequency is a device constant)
    pub async fn read_ac(&self) -> SolisResult<AcTelemetry> {
        Ok(AcTelemetry {
            total_power: self.read_value(Telemetry::AcTotalPower).await?,
            temperature: self.read_value(Telemetry::Temperature).await?,
            frequency: GRID_FREQUENCY_HZ,
        })
    }

    /// Household consumption group (2 reads)
    pub async fn read_house(&self) -> SolisResult<HouseTelemetry> {
        Ok(HouseTelemetry {
            consumption: self.read_value(Telemetry::HouseConsumption).await?,
            backup_consumption: self.read_value(Telemetry::BackupConsumption).await?,
        })
    }

    /// Grid exchange group (4 reads)
    pub async fn read_grid(&self) -> SolisResult<GridTelemetry> {
        Ok(GridTelemetry {
            active_power: self.read_value(Telemetry::GridActivePower).await?,
            inverter_ac_power: self.read_value(Telemetry::InverterAcPower).await?,
            imported_energy: self.read_value(Telemetry::GridImportedEnergy).await?,
            exported_energy: self.read_value(Telemetry::GridExportedEnergy).await?,
        })
    }

    /// Battery group (4 reads)
    pub async fn read_battery(&self) -> SolisResult<BatteryTelemetry> {
        Ok(BatteryTelemetry {
            power: self.read_value(Telemetry::BatteryPower).await?,
            soc: self.read_value(Telemetry::BatterySoc).await?,
            voltage: self.read_value(Telemetry::BatteryVoltage).await?,
            current: self.read_value(Telemetry::BatteryCurrent).await?,
        })
    }

    /// Run the full cycle. Every group is attempted even after a failure;
    /// on any group failure the error carries the groups that did succeed.
    pub async fn read_snapshot(&self) -> Result<InverterSnapshot, SnapshotFailure> {
        let mut failure: Option<(TelemetryGroup, SolisError)> = None;

        let status = note(self.read_status().await, TelemetryGroup::Status, &mut failure);
        let pv = note(self.read_pv().await, TelemetryGroup::Pv, &mut failure);
        let ac = note(self.read_ac().await, TelemetryGroup::Ac, &mut failure);
        let house = note(self.read_house().await, TelemetryGroup::House, &mut failure);
        let grid = note(self.read_grid().await, TelemetryGroup::Grid, &mut failure);
        let battery = note(self.read_battery().await, TelemetryGroup::Battery, &mut failure);
        let captured_at = Utc::now();

        if let Some((group, error)) = failure {
            return Err(SnapshotFailure {
                group,
                error,
                partial: PartialSnapshot {
                    status,
                    pv,
                    ac,
                    house,
                    grid,
                    battery,
                    captured_at,
                },
            });
        }

        let (Some(status), Some(pv), Some(ac), Some(house), Some(grid), Some(battery)) =
            (status, pv, ac, house, grid, battery)
        else {
            // Unreachable: no failure was recorded, so every group is Some
            return Err(SnapshotFailure {
                group: TelemetryGroup::Status,
                error: SolisError::malformed("inconsistent cycle state"),
                partial: PartialSnapshot {
                    status: None,
                    pv: None,
                    ac: None,
                    house: None,
                    grid: None,
                    battery: None,
                    captured_at,
                },
            });
        };

        Ok(InverterSnapshot {
            status,
            pv,
            ac,
            house,
            grid,
            battery,
            captured_at,
        })
    }

    /// Release the transport. Idempotent.
    pub async fn close(&self) -> SolisResult<()> {
        self.inner.lock().await.transport.close().await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.transport.is_connected()
    }

    pub async fn stats(&self) -> TransportStats {
        self.inner.lock().await.transport.stats()
    }
}

/// Record a group result, keeping the first failure for the cycle error
fn note<V>(
    result: SolisResult<V>,
    group: TelemetryGroup,
    failure: &mut Option<(TelemetryGroup, SolisError)>,
) -> Option<V> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%group, %error, "group read failed");
            if failure.is_none() {
                *failure = Some((group, error));
            }
            None
        }
    }
}
