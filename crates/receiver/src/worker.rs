//! Per-port receiver worker: bind/listen with retry, the accept loop, and
//! the per-connection protocol state machine.
//!
//! The inner loop keeps at most one command header plus some prefix of
//! its payload in the worker's buffer. Payload that does not fit is
//! streamed straight through the front of the buffer, and payload bytes
//! that arrived together with the *next* command's header are carried
//! over to the following iteration (the "straddle" case). The invariant
//! throughout: unconsumed input lives in `buf[off..off + num_read]`, and
//! before each header read there are at least `MAX_HEADER` contiguous
//! bytes of room starting at `off`.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gust_protocol::{
    DONE_CMD, decode_file, ErrorCode, EXIT_CMD, FILE_CMD, MAX_HEADER, read_at_least, read_at_most,
};
use tracing::{debug, error, info, trace, warn};

use crate::file_creator::FileCreator;
use crate::socket::ServerSocket;
use crate::stats::ThreadStats;

/// Snapshot of the options one worker runs with.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerConfig {
    pub buffer_size: usize,
    pub max_retries: u32,
    pub sleep_millis: u64,
    pub skip_writes: bool,
    pub joinable: bool,
}

/// How one accepted connection ended.
enum ConnectionOutcome {
    /// Accept the next connection on this port.
    Next,
    /// A `DONE_CMD` completed a joinable session; the worker is done.
    SessionDone,
}

/// Entry point of one worker thread. Any terminal condition is recorded
/// in `stats` before returning; nothing propagates across the thread
/// boundary.
pub(crate) fn receive_one(
    mut socket: ServerSocket,
    creator: Arc<FileCreator>,
    stats: Arc<ThreadStats>,
    config: WorkerConfig,
) {
    let port = socket.port();
    debug!(
        port,
        buffer_size = config.buffer_size,
        skip_writes = config.skip_writes,
        dest = %creator.root().display(),
        "receiver worker starting"
    );

    for attempt in 1..config.max_retries {
        match socket.listen() {
            Ok(()) => break,
            Err(error) if is_fatal_listen_error(&error) => {
                error!(port, %error, "listen failed fatally");
                stats.set_error_code(ErrorCode::ConnError);
                return;
            }
            Err(error) => {
                info!(port, attempt, %error, "listen failed, sleeping before retry");
                thread::sleep(Duration::from_millis(config.sleep_millis));
            }
        }
    }
    // One more (or only) try; a no-op if a retry above already succeeded.
    if let Err(error) = socket.listen() {
        error!(port, %error, "unable to listen/bind despite retries");
        stats.set_error_code(ErrorCode::ConnError);
        return;
    }

    let mut buf = Vec::new();
    if buf.try_reserve_exact(config.buffer_size).is_err() {
        error!(port, size = config.buffer_size, "receive buffer allocation failed");
        stats.set_error_code(ErrorCode::MemoryAllocationError);
        return;
    }
    buf.resize(config.buffer_size, 0);
    stats.set_error_code(ErrorCode::Ok);

    loop {
        if let Err(error) = socket.accept_next_connection() {
            info!(port, %error, "accept failed, worker exiting");
            stats.set_error_code(ErrorCode::ConnError);
            return;
        }
        match serve_connection(&mut socket, &creator, &stats, &config, &mut buf) {
            ConnectionOutcome::SessionDone => {
                info!(port, blocks = stats.num_blocks(), "receiver worker done");
                return;
            }
            ConnectionOutcome::Next => {
                debug!(port, "connection closed");
                socket.close_current_connection();
            }
        }
    }
}

/// Runs the protocol loop for one accepted connection.
fn serve_connection(
    socket: &mut ServerSocket,
    creator: &FileCreator,
    stats: &ThreadStats,
    config: &WorkerConfig,
    buf: &mut [u8],
) -> ConnectionOutcome {
    let port = socket.port();
    let buffer_size = buf.len();
    let mut num_read: usize = 0;
    let mut off: usize = 0;
    let mut dest: Option<File> = None;

    loop {
        num_read = match read_at_least(&mut *socket, &mut buf[off..], MAX_HEADER, num_read) {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                // An error on a command boundary ends the connection the
                // same way EOF does.
                debug!(port, %error, "read failed on command boundary");
                break;
            }
        };

        let old_offset = off;
        let cmd = buf[off];
        off += 1;

        if cmd == EXIT_CMD {
            if num_read != 1 {
                error!(port, num_read, "garbage after exit command");
                stats.set_error_code(ErrorCode::ProtocolError);
                break;
            }
            error!(port, "received exit command, terminating");
            std::process::exit(0);
        }

        let transfer_status = ErrorCode::from_wire(buf[off]);
        off += 1;

        if cmd == DONE_CMD {
            trace!(port, "received done command");
            if num_read != 2 {
                error!(port, off, num_read, "unexpected state for done command");
                stats.set_error_code(ErrorCode::ProtocolError);
                break;
            }
            if !transfer_status.is_ok() {
                stats.set_remote_error_code(transfer_status);
                error!(
                    port,
                    remote = %transfer_status,
                    local = %stats.error_code(),
                    "sender reported errors"
                );
            }
            // Echo the done command back with our own status in place of
            // the sender's.
            buf[off - 1] = stats.error_code().as_u8();
            if let Err(error) = socket.write_all(&buf[off - 2..off]) {
                warn!(port, %error, "failed to send done reply");
                stats.set_error_code(ErrorCode::SocketWriteError);
            }
            stats.add_header_bytes(2);
            stats.add_effective_bytes(2, 0);
            if config.joinable {
                return ConnectionOutcome::SessionDone;
            }
            // Daemon mode: this session is over, the next one starts
            // error-free on a fresh connection.
            stats.set_error_code(ErrorCode::Ok);
            break;
        }

        if cmd != FILE_CMD {
            error!(port, cmd, num_read, offset = old_offset, "unexpected command byte");
            stats.set_error_code(ErrorCode::ProtocolError);
            break;
        }
        if !transfer_status.is_ok() {
            debug!(port, status = %transfer_status, "sender is in an error state");
        }

        let end = old_offset + num_read;
        let frame = match decode_file(&buf[..end], &mut off) {
            Ok(frame) => frame,
            Err(decode_error) => {
                stats.add_header_bytes((off - old_offset) as u64);
                error!(port, %decode_error, old_offset, off, num_read, "header decode failed");
                stats.set_error_code(ErrorCode::ProtocolError);
                stats.incr_failed_attempts();
                break;
            }
        };
        let header_bytes = (off - old_offset) as u64;
        stats.add_header_bytes(header_bytes);
        let source_size = frame.source_size as u64;
        trace!(
            port,
            id = %frame.id,
            source_size,
            file_offset = frame.offset,
            off,
            num_read,
            "decoded file header"
        );

        if !config.skip_writes {
            dest = open_destination(creator, &frame, stats);
        }

        // Payload prefix that arrived together with the header.
        let mut remaining = end - off;
        let to_write = (remaining as u64).min(source_size) as usize;
        stats.add_data_bytes(to_write as u64);
        write_chunk(&mut dest, &buf[off..off + to_write], stats);
        off += to_write;
        remaining -= to_write;

        // Stream the rest of the payload through the front of the
        // buffer. Entering here means the prefix consumed every buffered
        // byte, so clobbering the buffer is safe.
        let mut received = to_write as u64;
        while received < source_size {
            let want = (source_size - received).min(buffer_size as u64) as usize;
            let n = match read_at_most(&mut *socket, buf, want) {
                Ok(0) => break,
                Ok(n) => n,
                Err(error) => {
                    warn!(port, %error, "read failed while streaming payload");
                    break;
                }
            };
            stats.add_data_bytes(n as u64);
            write_chunk(&mut dest, &buf[..n], stats);
            received += n as u64;
        }
        if received != source_size {
            // Transmission trouble; disk errors were handled above.
            warn!(port, id = %frame.id, received, source_size, "short payload");
            stats.incr_failed_attempts();
            break;
        }

        dest = None;
        stats.add_effective_bytes(header_bytes, source_size);
        stats.incr_num_blocks();
        trace!(port, id = %frame.id, off, num_read, "block complete");

        if remaining > 0 {
            // Bytes of the next command already sit at buf[off..]; keep
            // them in place unless the next header needs the room.
            num_read = remaining;
            if remaining < MAX_HEADER
                && (off > buffer_size / 2 || off + MAX_HEADER > buffer_size)
            {
                trace!(port, remaining, off, "compacting leftover bytes");
                buf.copy_within(off..off + remaining, 0);
                off = 0;
            }
        } else {
            num_read = 0;
            off = 0;
        }
    }

    if dest.is_some() {
        debug!(port, "closing dangling destination file");
    }
    ConnectionOutcome::Next
}

/// Opens and positions the destination file for one block. Failures are
/// recorded as [`ErrorCode::FileWriteError`] and leave the destination
/// closed; the caller still drains the payload to keep the stream
/// framed.
fn open_destination(
    creator: &FileCreator,
    frame: &gust_protocol::FileFrame,
    stats: &ThreadStats,
) -> Option<File> {
    let mut file = match creator.create(&frame.id) {
        Ok(file) => file,
        Err(error) => {
            error!(id = %frame.id, %error, "unable to open destination");
            stats.set_error_code(ErrorCode::FileWriteError);
            return None;
        }
    };
    if frame.offset > 0 {
        if let Err(error) = file.seek(SeekFrom::Start(frame.offset as u64)) {
            error!(id = %frame.id, offset = frame.offset, %error, "unable to seek");
            stats.set_error_code(ErrorCode::FileWriteError);
            return None;
        }
    } else if let Err(error) = creator.truncate(&file, frame.file_size as u64) {
        warn!(id = %frame.id, len = frame.file_size, %error, "unable to truncate");
    }
    Some(file)
}

/// Writes one payload chunk if a destination is open. A failed write
/// records [`ErrorCode::FileWriteError`] and closes the destination; the
/// remaining payload is drained without it.
fn write_chunk(dest: &mut Option<File>, chunk: &[u8], stats: &ThreadStats) {
    let Some(file) = dest.as_mut() else {
        return;
    };
    if let Err(error) = file.write_all(chunk) {
        error!(len = chunk.len(), %error, "destination write failed");
        stats.set_error_code(ErrorCode::FileWriteError);
        *dest = None;
    }
}

fn is_fatal_listen_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::AddrNotAvailable
            | std::io::ErrorKind::InvalidInput
    )
}
