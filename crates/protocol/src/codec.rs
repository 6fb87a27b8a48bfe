//! Encoding and decoding of command frames.
//!
//! A `FILE_CMD` header is laid out as:
//!
//! ```text
//! magic        : u8      (FILE_CMD)
//! status       : u8      (ErrorCode of the sender at encode time)
//! id_len       : u16 LE
//! id           : id_len bytes of UTF-8, a path relative to the
//!                destination root
//! source_size  : i64 LE  (payload bytes that follow this header)
//! offset       : i64 LE  (write position inside the destination file)
//! file_size    : i64 LE  (final size the file is truncated to when
//!                offset == 0)
//! ```
//!
//! The decoder only looks at bytes the caller has already buffered; it
//! never reads from a socket. Truncated input is an error rather than a
//! "need more" signal because the receive loop guarantees a full header
//! is buffered (or the stream hit EOF) before decoding.

use thiserror::Error;

use crate::{DONE_CMD, ErrorCode, EXIT_CMD, FILE_CMD, MAX_ID_LEN};

/// Decoded `FILE_CMD` header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileFrame {
    /// Destination path relative to the receiver's root directory.
    pub id: String,
    /// Number of payload bytes following the header.
    pub source_size: i64,
    /// Write offset inside the destination file.
    pub offset: i64,
    /// Declared final size of the destination file.
    pub file_size: i64,
}

/// Reasons a `FILE_CMD` header fails to parse.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FrameError {
    /// The buffered bytes end before the header does.
    #[error("file header truncated")]
    Truncated,
    /// The identifier length field exceeds [`MAX_ID_LEN`].
    #[error("identifier length {len} exceeds maximum {MAX_ID_LEN}")]
    IdTooLong {
        /// Length the header declared.
        len: usize,
    },
    /// The identifier bytes are not valid UTF-8.
    #[error("identifier is not valid UTF-8")]
    InvalidId,
    /// A size field is negative.
    #[error("negative size field {value}")]
    NegativeSize {
        /// The offending value.
        value: i64,
    },
}

/// Parses a `FILE_CMD` header from `buf`, starting just past the magic and
/// status bytes at `*off`, and advances `*off` past the consumed bytes.
///
/// `buf` must be sliced to the valid region (`&buf[..end]`); `*off` is
/// only advanced on success.
///
/// # Errors
///
/// Returns a [`FrameError`] when the header is truncated or malformed.
pub fn decode_file(buf: &[u8], off: &mut usize) -> Result<FileFrame, FrameError> {
    let mut pos = *off;

    let id_len = usize::from(take_u16(buf, &mut pos)?);
    if id_len > MAX_ID_LEN {
        return Err(FrameError::IdTooLong { len: id_len });
    }
    let id_bytes = buf
        .get(pos..pos + id_len)
        .ok_or(FrameError::Truncated)?;
    let id = std::str::from_utf8(id_bytes)
        .map_err(|_| FrameError::InvalidId)?
        .to_owned();
    pos += id_len;

    let source_size = take_i64(buf, &mut pos)?;
    let offset = take_i64(buf, &mut pos)?;
    let file_size = take_i64(buf, &mut pos)?;
    for value in [source_size, offset, file_size] {
        if value < 0 {
            return Err(FrameError::NegativeSize { value });
        }
    }

    *off = pos;
    Ok(FileFrame {
        id,
        source_size,
        offset,
        file_size,
    })
}

/// Encodes a complete `FILE_CMD` header (magic and status included).
///
/// The payload bytes are not part of the header; the sender streams them
/// immediately after.
///
/// # Errors
///
/// Returns [`FrameError::IdTooLong`] when the identifier exceeds
/// [`MAX_ID_LEN`] bytes.
pub fn encode_file(status: ErrorCode, frame: &FileFrame) -> Result<Vec<u8>, FrameError> {
    let id = frame.id.as_bytes();
    if id.len() > MAX_ID_LEN {
        return Err(FrameError::IdTooLong { len: id.len() });
    }

    let mut out = Vec::with_capacity(2 + 2 + id.len() + 3 * 8);
    out.push(FILE_CMD);
    out.push(status.as_u8());
    out.extend_from_slice(&(id.len() as u16).to_le_bytes());
    out.extend_from_slice(id);
    out.extend_from_slice(&frame.source_size.to_le_bytes());
    out.extend_from_slice(&frame.offset.to_le_bytes());
    out.extend_from_slice(&frame.file_size.to_le_bytes());
    Ok(out)
}

/// Builds the two-byte `DONE_CMD` frame (also the shape of the reply).
#[must_use]
pub const fn done_frame(status: ErrorCode) -> [u8; 2] {
    [DONE_CMD, status.as_u8()]
}

/// Builds the single-byte `EXIT_CMD` frame.
#[must_use]
pub const fn exit_frame() -> [u8; 1] {
    [EXIT_CMD]
}

fn take_u16(buf: &[u8], pos: &mut usize) -> Result<u16, FrameError> {
    let bytes = buf
        .get(*pos..*pos + 2)
        .ok_or(FrameError::Truncated)?;
    *pos += 2;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn take_i64(buf: &[u8], pos: &mut usize) -> Result<i64, FrameError> {
    let bytes = buf
        .get(*pos..*pos + 8)
        .ok_or(FrameError::Truncated)?;
    *pos += 8;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(i64::from_le_bytes(raw))
}
