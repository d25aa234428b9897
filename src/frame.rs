//! Modbus RTU frame encoding and decoding
//!
//! Pure functions over byte slices: no I/O, no retry. The CRC16 (Modbus
//! polynomial, reflected, init 0xFFFF) is computed over every preceding byte
//! and appended low-byte-first. Integrity is validated before any other
//! field of a response is trusted.

use crc::{Crc, CRC_16_MODBUS};

use crate::constants::{
    EXCEPTION_FLAG, FC_READ_INPUT_REGISTERS, MAX_READ_REGISTERS, MAX_SLAVE_ID, MIN_RESPONSE_LEN,
    MIN_SLAVE_ID, READ_REQUEST_LEN,
};
use crate::error::{SolisError, SolisResult};

/// CRC calculator for RTU frames
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the Modbus CRC16 over a byte slice
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// A read request, immutable once built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    pub slave_id: u8,
    pub function: u8,
    pub start_address: u16,
    pub quantity: u16,
}

impl RequestFrame {
    /// Build a Read Input Registers (FC04) request
    pub fn read_input(slave_id: u8, start_address: u16, quantity: u16) -> Self {
        Self {
            slave_id,
            function: FC_READ_INPUT_REGISTERS,
            start_address,
            quantity,
        }
    }

    /// Encode to an RTU ADU with trailing CRC
    ///
    /// Validates slave id and quantity ranges before laying out the frame;
    /// address and quantity are big-endian, the CRC is little-endian.
    pub fn encode(&self) -> SolisResult<Vec<u8>> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&self.slave_id) {
            return Err(SolisError::invalid_parameter(format!(
                "slave id {} outside {}..={}",
                self.slave_id, MIN_SLAVE_ID, MAX_SLAVE_ID
            )));
        }
        if self.quantity == 0 || self.quantity > MAX_READ_REGISTERS {
            return Err(SolisError::invalid_parameter(format!(
                "quantity {} outside 1..={}",
                self.quantity, MAX_READ_REGISTERS
            )));
        }

        let mut frame = Vec::with_capacity(READ_REQUEST_LEN);
        frame.push(self.slave_id);
        frame.push(self.function);
        frame.extend_from_slice(&self.start_address.to_be_bytes());
        frame.extend_from_slice(&self.quantity.to_be_bytes());

        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        Ok(frame)
    }

    /// Expected response ADU length for this request:
    /// address (1) + function (1) + byte count (1) + 2 x quantity + CRC (2)
    pub fn expected_response_len(&self) -> usize {
        MIN_RESPONSE_LEN + 2 * self.quantity as usize
    }
}

/// A validated response with its register payload extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub slave_id: u8,
    pub function: u8,
    pub registers: Vec<u16>,
}

impl ResponseFrame {
    /// Decode and validate an RTU response ADU
    ///
    /// Order matters: length, then CRC over all but the trailing two bytes,
    /// then the exception flag, then the byte-count/payload agreement. A
    /// frame that fails any step is rejected outright.
    pub fn decode(frame: &[u8]) -> SolisResult<Self> {
        if frame.len() < MIN_RESPONSE_LEN {
            return Err(SolisError::malformed(format!(
                "response too short: {} bytes (minimum {})",
                frame.len(),
                MIN_RESPONSE_LEN
            )));
        }

        let crc_offset = frame.len() - 2;
        let received = u16::from_le_bytes([frame[crc_offset], frame[crc_offset + 1]]);
        let computed = crc16(&frame[..crc_offset]);
        if received != computed {
            return Err(SolisError::CrcMismatch { computed, received });
        }

        let slave_id = frame[0];
        let function = frame[1];

        if function & EXCEPTION_FLAG != 0 {
            return Err(SolisError::Exception { code: frame[2] });
        }

        let byte_count = frame[2] as usize;
        let payload = &frame[3..crc_offset];
        if payload.len() != byte_count {
            return Err(SolisError::malformed(format!(
                "byte count {} does not match payload length {}",
                byte_count,
                payload.len()
            )));
        }
        if byte_count % 2 != 0 {
            return Err(SolisError::malformed(format!(
                "odd byte count {} cannot hold 16-bit registers",
                byte_count
            )));
        }

        let registers = payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self {
            slave_id,
            function,
            registers,
        })
    }
}
