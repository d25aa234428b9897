//! Serial RTU transport
//!
//! Owns the half-duplex serial line and runs one request/response exchange
//! at a time: frame gap, write, then chunked reads fed to the
//! [`ResponseAssembler`](crate::assembler::ResponseAssembler) under the
//! quiet-window and deadline timers. Exchanges take `&mut self`, so a
//! transport can never have two requests in flight; callers that share a
//! transport serialize behind a mutex.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout, Instant};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::assembler::{ChunkOutcome, ResponseAssembler};
use crate::config::{PollingConfig, SerialConfig};
use crate::constants::MAX_RTU_FRAME_SIZE;
use crate::error::{SolisError, SolisResult};
use crate::frame::{RequestFrame, ResponseFrame};

/// Transport layer statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// One request/response exchange over some byte-oriented link.
///
/// The serial implementation below is the production transport; tests run
/// the poll sequencer against in-memory implementations of this trait.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// Run a full exchange: encode, send, reassemble, validate.
    async fn exchange(&mut self, request: &RequestFrame) -> SolisResult<ResponseFrame>;

    /// Local connectivity check; does not probe the device
    fn is_connected(&self) -> bool;

    /// Release the link. Idempotent; always succeeds.
    async fn close(&mut self) -> SolisResult<()>;

    /// Communication statistics since open
    fn stats(&self) -> TransportStats;
}

/// Minimum spacing between frames on the wire: 3.5 character times at the
/// configured baud rate (11 bits per character on a serial line).
pub(crate) fn frame_gap_for(baud_rate: u32) -> Duration {
    let char_time_us = u64::from(11_000_000 / baud_rate.max(1));
    Duration::from_micros(char_time_us * 35 / 10)
}

fn parity_from(name: &str) -> Parity {
    match name {
        "Even" => Parity::Even,
        "Odd" => Parity::Odd,
        _ => Parity::None,
    }
}

fn data_bits_from(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits_from(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Modbus RTU over a serial port
pub struct SerialRtuTransport {
    port: Option<SerialStream>,
    port_name: String,
    assembler: ResponseAssembler,
    quiet_window: Duration,
    response_timeout: Duration,
    frame_gap: Duration,
    stats: TransportStats,
    packet_logging: bool,
}

impl SerialRtuTransport {
    /// Open the serial port and build a ready transport.
    ///
    /// Opening is the scoped acquisition of the session: it either yields a
    /// connected transport or an error, never a half-open state.
    pub fn open(serial: &SerialConfig, polling: &PollingConfig) -> SolisResult<Self> {
        let response_timeout = Duration::from_millis(polling.response_timeout_ms);

        let builder = tokio_serial::new(&serial.port, serial.baud_rate)
            .data_bits(data_bits_from(serial.data_bits))
            .stop_bits(stop_bits_from(serial.stop_bits))
            .parity(parity_from(&serial.parity))
            .timeout(response_timeout);

        let port = SerialStream::open(&builder)?;
        info!(
            port = %serial.port,
            baud = serial.baud_rate,
            "serial port open"
        );

        Ok(Self::from_stream(
            port,
            serial.port.clone(),
            serial.baud_rate,
            polling,
        ))
    }

    /// Wrap an already-open stream; `open` and the loopback tests share this
    fn from_stream(
        port: SerialStream,
        port_name: String,
        baud_rate: u32,
        polling: &PollingConfig,
    ) -> Self {
        Self {
            port: Some(port),
            port_name,
            assembler: ResponseAssembler::new(),
            quiet_window: Duration::from_millis(polling.quiet_window_ms),
            response_timeout: Duration::from_millis(polling.response_timeout_ms),
            frame_gap: frame_gap_for(baud_rate),
            stats: TransportStats::default(),
            packet_logging: polling.packet_logging,
        }
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Accumulate chunks until the assembler reports a complete frame, the
    /// quiet window closes one, or the overall deadline fires.
    async fn read_response(&mut self, expected_len: usize) -> SolisResult<Vec<u8>> {
        let generation = self.assembler.begin(Some(expected_len))?;
        let deadline = Instant::now() + self.response_timeout;
        let port = self.port.as_mut().ok_or(SolisError::NotConnected)?;
        let mut chunk = [0u8; MAX_RTU_FRAME_SIZE];

        loop {
            let now = Instant::now();
            if now >= deadline {
                self.assembler.deadline_elapsed(generation);
                return Err(SolisError::timeout(
                    "read response",
                    self.response_timeout.as_millis() as u64,
                ));
            }

            let window = self.quiet_window.min(deadline - now);
            match timeout(window, port.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    self.assembler.deadline_elapsed(generation);
                    return Err(SolisError::connection(format!(
                        "serial port {} closed while reading",
                        self.port_name
                    )));
                }
                Ok(Ok(n)) => {
                    if let ChunkOutcome::Complete(frame) =
                        self.assembler.push_chunk(generation, &chunk[..n])?
                    {
                        return Ok(frame);
                    }
                }
                Ok(Err(e)) => {
                    self.assembler.deadline_elapsed(generation);
                    return Err(SolisError::io(format!("serial read failed: {e}")));
                }
                Err(_) => {
                    // Quiet window elapsed. With data accumulated this closes
                    // the frame; otherwise keep waiting for the deadline.
                    if let Some(frame) = self.assembler.quiet_window_elapsed(generation) {
                        return Ok(frame);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ModbusTransport for SerialRtuTransport {
    async fn exchange(&mut self, request: &RequestFrame) -> SolisResult<ResponseFrame> {
        if self.port.is_none() {
            return Err(SolisError::NotConnected);
        }

        let frame = request.encode()?;

        // Respect the wire-level inter-frame gap before transmitting
        sleep(self.frame_gap).await;

        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        if self.packet_logging {
            debug!(slave = request.slave_id, frame = %hex::encode_upper(&frame), "send");
        }

        let port = self.port.as_mut().ok_or(SolisError::NotConnected)?;

        // A timed-out exchange can leave its late reply in the OS receive
        // buffer. FC04 responses do not echo the start address, so such a
        // frame would pass every check against the next same-quantity
        // request. Purge before transmitting.
        port.clear(ClearBuffer::Input)
            .map_err(|e| SolisError::io(format!("failed to purge input buffer: {e}")))?;

        let write = async {
            port.write_all(&frame).await?;
            port.flush().await
        };
        match timeout(self.response_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.errors += 1;
                // A failed write leaves the link in an unknown state
                self.port = None;
                return Err(SolisError::connection(format!(
                    "failed to send request on {}: {e}",
                    self.port_name
                )));
            }
            Err(_) => {
                self.stats.timeouts += 1;
                self.stats.errors += 1;
                return Err(SolisError::timeout(
                    "send request",
                    self.response_timeout.as_millis() as u64,
                ));
            }
        }

        let raw = match self.read_response(request.expected_response_len()).await {
            Ok(raw) => raw,
            Err(e) => {
                if matches!(e, SolisError::Timeout { .. }) {
                    self.stats.timeouts += 1;
                }
                self.stats.errors += 1;
                return Err(e);
            }
        };

        self.stats.responses_received += 1;
        self.stats.bytes_received += raw.len() as u64;
        if self.packet_logging {
            debug!(slave = request.slave_id, frame = %hex::encode_upper(&raw), "receive");
        }

        let response = match ResponseFrame::decode(&raw) {
            Ok(response) => response,
            Err(e) => {
                self.stats.errors += 1;
                return Err(e);
            }
        };

        if response.slave_id != request.slave_id {
            self.stats.errors += 1;
            warn!(
                expected = request.slave_id,
                received = response.slave_id,
                "response slave id mismatch"
            );
            return Err(SolisError::malformed(format!(
                "response slave id {} does not match request {}",
                response.slave_id, request.slave_id
            )));
        }

        Ok(response)
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) -> SolisResult<()> {
        if self.port.take().is_some() {
            info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::crc16;

    #[test]
    fn test_frame_gap_scales_with_baud() {
        // 9600 baud: 11 bits / 9600 = 1145us per char, x3.5 = 4007us
        assert_eq!(frame_gap_for(9600), Duration::from_micros(4007));
        // Faster line, shorter gap
        assert!(frame_gap_for(115_200) < frame_gap_for(9600));
        // Degenerate baud must not divide by zero
        assert!(frame_gap_for(0) > Duration::ZERO);
    }

    #[test]
    fn test_serial_parameter_mapping() {
        assert_eq!(parity_from("Even"), Parity::Even);
        assert_eq!(parity_from("Odd"), Parity::Odd);
        assert_eq!(parity_from("None"), Parity::None);
        assert_eq!(parity_from("garbage"), Parity::None);

        assert_eq!(data_bits_from(7), DataBits::Seven);
        assert_eq!(data_bits_from(8), DataBits::Eight);
        assert_eq!(data_bits_from(0), DataBits::Eight);

        assert_eq!(stop_bits_from(1), StopBits::One);
        assert_eq!(stop_bits_from(2), StopBits::Two);
    }

    fn fc04_response(registers: &[u16]) -> Vec<u8> {
        let mut frame = vec![0x01, 0x04, (registers.len() * 2) as u8];
        for reg in registers {
            frame.extend_from_slice(&reg.to_be_bytes());
        }
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_late_response_never_credited_to_next_request() {
        let (mut device, engine_side) = SerialStream::pair().unwrap();
        let polling = PollingConfig {
            response_timeout_ms: 100,
            quiet_window_ms: 20,
            ..PollingConfig::default()
        };
        let mut transport =
            SerialRtuTransport::from_stream(engine_side, "pty".to_string(), 115_200, &polling);

        // First exchange gets no answer within the deadline
        let first = RequestFrame::read_input(1, 33049, 1);
        assert!(matches!(
            transport.exchange(&first).await,
            Err(SolisError::Timeout { .. })
        ));

        // Its reply arrives late and lands in the OS receive buffer. Same
        // quantity as the next request, so length and CRC both check out.
        let mut request = [0u8; 8];
        device.read_exact(&mut request).await.unwrap();
        device.write_all(&fc04_response(&[2450])).await.unwrap();
        device.flush().await.unwrap();
        sleep(Duration::from_millis(20)).await;

        // The next exchange targets a different register; answer it properly
        let responder = tokio::spawn(async move {
            let mut request = [0u8; 8];
            device.read_exact(&mut request).await.unwrap();
            assert_eq!(&request[2..4], &33139u16.to_be_bytes());
            device.write_all(&fc04_response(&[87])).await.unwrap();
            device.flush().await.unwrap();
            // Keep the pty master open until the exchange completes; dropping
            // it hangs up the slave and discards the reply still in flight.
            device
        });

        let second = RequestFrame::read_input(1, 33139, 1);
        let response = transport.exchange(&second).await.unwrap();
        // The stale 2450 was purged; only the real reply is credited
        assert_eq!(response.registers, vec![87]);
        responder.await.unwrap();
    }
}
