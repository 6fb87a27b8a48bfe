//! Receiver status taxonomy carried in the status byte of every frame.

use std::fmt;

/// Outcome of a receiver operation, encoded as a single wire byte.
///
/// Workers record the last code they hit in their per-thread stats; the
/// `DONE_CMD` reply echoes the receiver's current code back to the sender.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum ErrorCode {
    /// No error.
    #[default]
    Ok = 0,
    /// Could not bind, listen, or accept on the transfer port.
    ConnError = 1,
    /// Socket read failed mid-transfer.
    SocketReadError = 2,
    /// Socket write failed mid-transfer.
    SocketWriteError = 3,
    /// Destination file could not be opened, positioned, or written.
    FileWriteError = 4,
    /// Receive buffer allocation failed.
    MemoryAllocationError = 5,
    /// The byte stream did not parse as a valid command sequence.
    ProtocolError = 6,
}

impl ErrorCode {
    /// Returns the wire byte for this code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire byte, mapping unknown values to
    /// [`ErrorCode::ProtocolError`].
    #[must_use]
    pub const fn from_wire(byte: u8) -> Self {
        match byte {
            0 => Self::Ok,
            1 => Self::ConnError,
            2 => Self::SocketReadError,
            3 => Self::SocketWriteError,
            4 => Self::FileWriteError,
            5 => Self::MemoryAllocationError,
            _ => Self::ProtocolError,
        }
    }

    /// Returns `true` for [`ErrorCode::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Short lowercase name used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::ConnError => "connection error",
            Self::SocketReadError => "socket read error",
            Self::SocketWriteError => "socket write error",
            Self::FileWriteError => "file write error",
            Self::MemoryAllocationError => "memory allocation error",
            Self::ProtocolError => "protocol error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_byte_roundtrip() {
        for code in [
            ErrorCode::Ok,
            ErrorCode::ConnError,
            ErrorCode::SocketReadError,
            ErrorCode::SocketWriteError,
            ErrorCode::FileWriteError,
            ErrorCode::MemoryAllocationError,
            ErrorCode::ProtocolError,
        ] {
            assert_eq!(ErrorCode::from_wire(code.as_u8()), code);
        }
    }

    #[test]
    fn unknown_wire_bytes_decode_as_protocol_error() {
        assert_eq!(ErrorCode::from_wire(7), ErrorCode::ProtocolError);
        assert_eq!(ErrorCode::from_wire(0xff), ErrorCode::ProtocolError);
    }

    #[test]
    fn ok_is_the_default() {
        assert!(ErrorCode::default().is_ok());
        assert!(!ErrorCode::ConnError.is_ok());
    }
}
