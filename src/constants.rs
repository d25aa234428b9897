//! Modbus RTU protocol constants and engine defaults
//!
//! Frame size limits are derived from the RS485 ADU limit of 256 bytes.
//! Timing defaults match the Solis RS485 processing turnaround observed on
//! S5/S6 hybrid inverters.

// ============================================================================
// Function Codes
// ============================================================================

/// Read Input Registers (FC04) - the only function code this engine issues
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// High bit of the function code marks a device exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Valid Modbus slave address range
pub const MIN_SLAVE_ID: u8 = 1;
pub const MAX_SLAVE_ID: u8 = 247;

/// Maximum number of registers for a single FC04 read
///
/// Response PDU: function code (1) + byte count (1) + N x 2 <= 253,
/// therefore N <= 125.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Request ADU length for FC04:
/// address (1) + function (1) + start (2) + quantity (2) + CRC (2)
pub const READ_REQUEST_LEN: usize = 8;

/// Minimum decodable response ADU:
/// address (1) + function (1) + byte count or exception code (1) + CRC (2)
pub const MIN_RESPONSE_LEN: usize = 5;

/// Exception responses have a fixed length:
/// address (1) + function|0x80 (1) + exception code (1) + CRC (2)
pub const EXCEPTION_RESPONSE_LEN: usize = 5;

/// Maximum RTU ADU size per the RS485 specification
pub const MAX_RTU_FRAME_SIZE: usize = 256;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Inter-chunk quiet window used to infer end-of-frame (milliseconds)
pub const DEFAULT_QUIET_WINDOW_MS: u64 = 200;

/// Overall per-exchange response deadline (milliseconds)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2000;

/// Minimum spacing between the end of one exchange and the next request.
/// The inverter needs this turnaround to service the next read; it is a
/// correctness requirement, not an optimization knob.
pub const DEFAULT_INTER_COMMAND_DELAY_MS: u64 = 200;

/// Default retry count for a failed exchange (no implicit retries)
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Delay between retry attempts (milliseconds)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

// ============================================================================
// Device Constants
// ============================================================================

/// Line frequency for this device/region. The inverter does not expose a
/// frequency register in the input range this engine reads.
pub const GRID_FREQUENCY_HZ: f64 = 50.0;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Describe a Modbus exception code for diagnostics
pub fn describe_exception(code: u8) -> &'static str {
    match code {
        EXCEPTION_ILLEGAL_FUNCTION => "Illegal Function",
        EXCEPTION_ILLEGAL_DATA_ADDRESS => "Illegal Data Address",
        EXCEPTION_ILLEGAL_DATA_VALUE => "Illegal Data Value",
        EXCEPTION_SERVER_DEVICE_FAILURE => "Server Device Failure",
        EXCEPTION_ACKNOWLEDGE => "Acknowledge",
        EXCEPTION_SERVER_DEVICE_BUSY => "Server Device Busy",
        _ => "Unknown Exception",
    }
}
