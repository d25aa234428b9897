//! Error types for the telemetry engine
//!
//! One taxonomy covers the whole request path: transport, framing and
//! register interpretation. Codec and assembler errors surface synchronously
//! to the caller of the failing read; a connection error is terminal for the
//! session.

use thiserror::Error;

use crate::constants::describe_exception;

/// Result type for all engine operations
pub type SolisResult<T> = std::result::Result<T, SolisError>;

/// Engine errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolisError {
    /// Serial port open failure or transport-level fault
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted without a live session
    #[error("Not connected")]
    NotConnected,

    /// No valid frame arrived within the deadline
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Frame integrity check failed; no field of the frame is trusted
    #[error("CRC mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    CrcMismatch { computed: u16, received: u16 },

    /// Device-reported protocol error (function code high bit set)
    #[error("Device exception 0x{code:02X}: {}", describe_exception(*code))]
    Exception { code: u8 },

    /// Short or garbled frame; never coerced to a default reading
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Request field outside its valid range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Underlying serial I/O failure
    #[error("IO error: {0}")]
    Io(String),
}

impl SolisError {
    pub fn connection(msg: impl Into<String>) -> Self {
        SolisError::Connection(msg.into())
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        SolisError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        SolisError::MalformedFrame(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        SolisError::InvalidParameter(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        SolisError::Io(msg.into())
    }

    /// True for errors that end the session rather than a single read
    pub fn is_terminal(&self) -> bool {
        matches!(self, SolisError::Connection(_) | SolisError::NotConnected)
    }
}

impl From<std::io::Error> for SolisError {
    fn from(err: std::io::Error) -> Self {
        SolisError::Io(err.to_string())
    }
}

impl From<tokio_serial::Error> for SolisError {
    fn from(err: tokio_serial::Error) -> Self {
        SolisError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_display_includes_description() {
        let err = SolisError::Exception { code: 0x02 };
        let rendered = err.to_string();
        assert!(rendered.contains("0x02"));
        assert!(rendered.contains("Illegal Data Address"));
    }

    #[test]
    fn test_terminal_classification() {
        assert!(SolisError::NotConnected.is_terminal());
        assert!(SolisError::connection("port vanished").is_terminal());
        assert!(!SolisError::timeout("read response", 2000).is_terminal());
        assert!(!SolisError::CrcMismatch {
            computed: 0x1234,
            received: 0x4321
        }
        .is_terminal());
    }
}
