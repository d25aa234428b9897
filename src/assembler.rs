//! Response frame reconstruction from a chunked byte stream
//!
//! RTU carries no end-of-frame delimiter, so the transport delivers bytes in
//! arbitrary chunks at arbitrary times. This module is the state machine that
//! turns those chunks back into one frame per request:
//!
//! Idle -> AwaitingResponse -> Complete / TimedOut -> Idle
//!
//! Completion is primarily length-driven: the expected response length is
//! known from the requested quantity, and exception responses have a fixed
//! five-byte length recognizable from the function-code high bit. The quiet
//! window is only the fallback when no expected length is available. The
//! overall deadline always wins and discards any partial data.
//!
//! Every request carries a generation token. Bytes arriving for a stale
//! generation (after a timeout or completion) are discarded, never credited
//! to a later request. The machine itself is free of timers; the transport
//! reports quiet-window and deadline expiry explicitly, which keeps this
//! logic unit-testable.

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::constants::{EXCEPTION_FLAG, EXCEPTION_RESPONSE_LEN, MAX_RTU_FRAME_SIZE};
use crate::error::{SolisError, SolisResult};

/// Request generation token
pub type Generation = u64;

/// What a delivered chunk did to the in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk belonged to a stale generation and was discarded
    Stale,
    /// Chunk accumulated; the frame is not complete yet
    Pending,
    /// The frame is complete; the assembler is Idle again
    Complete(Vec<u8>),
}

#[derive(Debug)]
enum State {
    Idle,
    Awaiting {
        generation: Generation,
        expected_len: Option<usize>,
        buf: BytesMut,
    },
}

/// Reassembles one response frame per request from chunked delivery
#[derive(Debug)]
pub struct ResponseAssembler {
    state: State,
    next_generation: Generation,
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            next_generation: 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Arm the assembler for one response and hand out its generation token.
    ///
    /// `expected_len` is the full ADU length derived from the requested
    /// quantity; pass `None` to rely purely on the quiet-window fallback.
    /// Only one request may be outstanding: arming while not Idle is
    /// rejected.
    pub fn begin(&mut self, expected_len: Option<usize>) -> SolisResult<Generation> {
        if !self.is_idle() {
            return Err(SolisError::invalid_parameter(
                "a request is already in flight on this transport",
            ));
        }
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        self.state = State::Awaiting {
            generation,
            expected_len,
            buf: BytesMut::with_capacity(MAX_RTU_FRAME_SIZE),
        };
        trace!(generation, ?expected_len, "assembler armed");
        Ok(generation)
    }

    /// Feed one delivered chunk.
    ///
    /// Completes immediately once the buffer reaches the expected length
    /// (or the fixed exception length when the function-code high bit is
    /// set). Trailing bytes beyond the frame are dropped as stale.
    pub fn push_chunk(&mut self, generation: Generation, chunk: &[u8]) -> SolisResult<ChunkOutcome> {
        let State::Awaiting {
            generation: current,
            expected_len,
            buf,
        } = &mut self.state
        else {
            trace!(generation, len = chunk.len(), "discarding bytes while idle");
            return Ok(ChunkOutcome::Stale);
        };

        if *current != generation {
            debug!(
                stale = generation,
                current = *current,
                len = chunk.len(),
                "discarding stale-generation bytes"
            );
            return Ok(ChunkOutcome::Stale);
        }

        buf.extend_from_slice(chunk);
        if buf.len() > MAX_RTU_FRAME_SIZE {
            let len = buf.len();
            self.state = State::Idle;
            return Err(SolisError::malformed(format!(
                "accumulated {} bytes without frame completion (max {})",
                len, MAX_RTU_FRAME_SIZE
            )));
        }

        // Exception responses are always five bytes, so their length is
        // computable even before the expected payload length applies.
        let target = if buf.len() >= 2 && buf[1] & EXCEPTION_FLAG != 0 {
            Some(EXCEPTION_RESPONSE_LEN)
        } else {
            *expected_len
        };

        if let Some(target) = target {
            if buf.len() >= target {
                let frame = buf.split_to(target).to_vec();
                let excess = buf.len();
                if excess > 0 {
                    warn!(excess, "dropping bytes past the expected frame end");
                }
                self.state = State::Idle;
                return Ok(ChunkOutcome::Complete(frame));
            }
        }

        Ok(ChunkOutcome::Pending)
    }

    /// The quiet window elapsed with no further bytes.
    ///
    /// Returns the accumulated frame if anything arrived; with an empty
    /// buffer the request keeps waiting (only the deadline ends it).
    pub fn quiet_window_elapsed(&mut self, generation: Generation) -> Option<Vec<u8>> {
        let State::Awaiting {
            generation: current,
            buf,
            ..
        } = &mut self.state
        else {
            return None;
        };
        if *current != generation || buf.is_empty() {
            return None;
        }
        let frame = buf.split().to_vec();
        debug!(generation, len = frame.len(), "quiet window closed frame");
        self.state = State::Idle;
        Some(frame)
    }

    /// The overall deadline fired; any partial data is discarded and the
    /// machine returns to Idle. Returns false for a stale generation.
    pub fn deadline_elapsed(&mut self, generation: Generation) -> bool {
        match &self.state {
            State::Awaiting {
                generation: current,
                buf,
                ..
            } if *current == generation => {
                if !buf.is_empty() {
                    debug!(
                        generation,
                        discarded = buf.len(),
                        "deadline fired with partial frame"
                    );
                }
                self.state = State::Idle;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{crc16, RequestFrame, ResponseFrame};

    fn sample_response(registers: &[u16]) -> Vec<u8> {
        let mut frame = vec![0x01, 0x04, (registers.len() * 2) as u8];
        for reg in registers {
            frame.extend_from_slice(&reg.to_be_bytes());
        }
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[test]
    fn test_whole_frame_completes_by_length() {
        let mut assembler = ResponseAssembler::new();
        let frame = sample_response(&[0x0992]);
        let generation = assembler.begin(Some(frame.len())).unwrap();

        let outcome = assembler.push_chunk(generation, &frame).unwrap();
        assert_eq!(outcome, ChunkOutcome::Complete(frame));
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_chunk_boundary_equivalence() {
        // The same frame split at every possible boundary pair must
        // reassemble to identical bytes
        let frame = sample_response(&[0x1234, 0x5678, 0x9ABC]);
        for split_a in 1..frame.len() - 1 {
            for split_b in split_a + 1..frame.len() {
                let mut assembler = ResponseAssembler::new();
                let generation = assembler.begin(Some(frame.len())).unwrap();

                assert_eq!(
                    assembler.push_chunk(generation, &frame[..split_a]).unwrap(),
                    ChunkOutcome::Pending
                );
                assert_eq!(
                    assembler
                        .push_chunk(generation, &frame[split_a..split_b])
                        .unwrap(),
                    if split_b == frame.len() {
                        ChunkOutcome::Complete(frame.clone())
                    } else {
                        ChunkOutcome::Pending
                    }
                );
                if split_b < frame.len() {
                    assert_eq!(
                        assembler.push_chunk(generation, &frame[split_b..]).unwrap(),
                        ChunkOutcome::Complete(frame.clone())
                    );
                }

                let decoded = ResponseFrame::decode(&frame).unwrap();
                assert_eq!(decoded.registers, vec![0x1234, 0x5678, 0x9ABC]);
            }
        }
    }

    #[test]
    fn test_exception_completes_at_fixed_length() {
        // Expected length for the data response is longer, but the
        // exception flag makes the real length computable immediately
        let mut exception = vec![0x01, 0x84, 0x02];
        let crc = crc16(&exception);
        exception.extend_from_slice(&crc.to_le_bytes());

        let request = RequestFrame::read_input(1, 33057, 2);
        let mut assembler = ResponseAssembler::new();
        let generation = assembler
            .begin(Some(request.expected_response_len()))
            .unwrap();

        let outcome = assembler.push_chunk(generation, &exception).unwrap();
        assert_eq!(outcome, ChunkOutcome::Complete(exception));
    }

    #[test]
    fn test_quiet_window_fallback_without_expected_length() {
        let mut assembler = ResponseAssembler::new();
        let frame = sample_response(&[0x0001]);
        let generation = assembler.begin(None).unwrap();

        assert_eq!(
            assembler.push_chunk(generation, &frame).unwrap(),
            ChunkOutcome::Pending
        );
        assert_eq!(assembler.quiet_window_elapsed(generation), Some(frame));
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_quiet_window_with_empty_buffer_keeps_waiting() {
        let mut assembler = ResponseAssembler::new();
        let generation = assembler.begin(None).unwrap();
        assert_eq!(assembler.quiet_window_elapsed(generation), None);
        assert!(!assembler.is_idle());
    }

    #[test]
    fn test_deadline_discards_partial_and_restores_idle() {
        let mut assembler = ResponseAssembler::new();
        let frame = sample_response(&[0x0001]);
        let generation = assembler.begin(Some(frame.len())).unwrap();

        assembler.push_chunk(generation, &frame[..3]).unwrap();
        assert!(assembler.deadline_elapsed(generation));
        assert!(assembler.is_idle());
        // A second report for the same generation is a no-op
        assert!(!assembler.deadline_elapsed(generation));
    }

    #[test]
    fn test_stale_generation_bytes_never_contaminate_next_request() {
        let mut assembler = ResponseAssembler::new();
        let late_frame = sample_response(&[0xDEAD]);
        let stale = assembler.begin(Some(late_frame.len())).unwrap();
        assert!(assembler.deadline_elapsed(stale));

        // Arm the next request, then deliver the late bytes tagged with the
        // stale generation: they must vanish without touching the new buffer
        let frame = sample_response(&[0xBEEF]);
        let current = assembler.begin(Some(frame.len())).unwrap();
        assert_eq!(
            assembler.push_chunk(stale, &late_frame).unwrap(),
            ChunkOutcome::Stale
        );

        let outcome = assembler.push_chunk(current, &frame).unwrap();
        let ChunkOutcome::Complete(bytes) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(
            ResponseFrame::decode(&bytes).unwrap().registers,
            vec![0xBEEF]
        );
    }

    #[test]
    fn test_second_begin_while_awaiting_is_rejected() {
        let mut assembler = ResponseAssembler::new();
        assembler.begin(Some(7)).unwrap();
        assert!(matches!(
            assembler.begin(Some(7)),
            Err(SolisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_merged_frames_drop_trailing_bytes() {
        // Two frames arriving faster than the quiet window: the expected
        // length cuts the first one exactly, the excess is discarded
        let frame = sample_response(&[0x0102]);
        let mut merged = frame.clone();
        merged.extend_from_slice(&sample_response(&[0x0304]));

        let mut assembler = ResponseAssembler::new();
        let generation = assembler.begin(Some(frame.len())).unwrap();
        assert_eq!(
            assembler.push_chunk(generation, &merged).unwrap(),
            ChunkOutcome::Complete(frame)
        );
    }

    #[test]
    fn test_oversized_accumulation_is_an_error() {
        let mut assembler = ResponseAssembler::new();
        let generation = assembler.begin(None).unwrap();
        let noise = vec![0x00u8; MAX_RTU_FRAME_SIZE + 1];
        assert!(matches!(
            assembler.push_chunk(generation, &noise),
            Err(SolisError::MalformedFrame(_))
        ));
        assert!(assembler.is_idle());
    }
}
