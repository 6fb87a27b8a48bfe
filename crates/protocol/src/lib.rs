#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `gust_protocol` defines the wire protocol spoken between a gust sender
//! and the multi-port receiver. Every command is a single frame starting
//! with a one-byte command magic:
//!
//! - [`FILE_CMD`] carries a file block: a status byte, a length-prefixed
//!   relative path, three little-endian `i64` size fields, and then the
//!   declared number of payload bytes with no separator.
//! - [`DONE_CMD`] ends a session: a status byte follows the magic, and the
//!   receiver echoes two bytes `[DONE_CMD, receiver status]` back.
//! - [`EXIT_CMD`] is a single byte with no status and no reply; it
//!   terminates the receiving process.
//!
//! # Invariants
//!
//! - A full command header never exceeds [`MAX_HEADER`] bytes, so a
//!   receiver that keeps `MAX_HEADER` contiguous bytes of buffer room can
//!   always take in the next header without reallocation.
//! - After the final `DONE_CMD` the sender half-closes its write side and
//!   then reads the reply; the receiver relies on that EOF to deliver
//!   trailing frames shorter than `MAX_HEADER`.
//!
//! # Errors
//!
//! Header parsing surfaces [`FrameError`]; the blocking read helpers
//! surface [`std::io::Error`] only when no bytes were accumulated,
//! mirroring the receiver's "error on a frame boundary" handling.

mod codec;
mod error_code;
mod framing;

pub use codec::{FileFrame, FrameError, decode_file, done_frame, encode_file, exit_frame};
pub use error_code::ErrorCode;
pub use framing::{read_at_least, read_at_most};

/// Command magic for a file block frame.
pub const FILE_CMD: u8 = b'F';

/// Command magic for the end-of-session frame.
pub const DONE_CMD: u8 = b'D';

/// Command magic for the process-termination frame.
pub const EXIT_CMD: u8 = b'E';

/// Longest identifier (relative path) a `FILE_CMD` header may carry.
pub const MAX_ID_LEN: usize = 4096;

/// Upper bound on the size of any command header: magic + status +
/// `u16` identifier length + identifier bytes + three `i64` size fields.
pub const MAX_HEADER: usize = 2 + 2 + MAX_ID_LEN + 3 * 8;
