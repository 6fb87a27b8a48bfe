//! Per-worker transfer counters.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use gust_protocol::ErrorCode;

/// Counters owned by one receiver worker.
///
/// Only the owning worker mutates them; the controller reads after the
/// worker joins. The watchdog additionally reads [`total_bytes`]
/// concurrently, which is why the fields are relaxed atomics: a slightly
/// stale sum is fine for stall detection, a torn one is not.
///
/// [`total_bytes`]: ThreadStats::total_bytes
#[derive(Debug, Default)]
pub struct ThreadStats {
    header_bytes: AtomicU64,
    data_bytes: AtomicU64,
    effective_header_bytes: AtomicU64,
    effective_data_bytes: AtomicU64,
    num_blocks: AtomicU64,
    failed_attempts: AtomicU64,
    error_code: AtomicU8,
    remote_error_code: AtomicU8,
}

impl ThreadStats {
    /// Creates zeroed counters with both error slots at [`ErrorCode::Ok`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_header_bytes(&self, count: u64) {
        self.header_bytes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_data_bytes(&self, count: u64) {
        self.data_bytes.fetch_add(count, Ordering::Relaxed);
    }

    /// Credits bytes that contributed to a completed block.
    pub(crate) fn add_effective_bytes(&self, header: u64, data: u64) {
        self.effective_header_bytes.fetch_add(header, Ordering::Relaxed);
        self.effective_data_bytes.fetch_add(data, Ordering::Relaxed);
    }

    pub(crate) fn incr_num_blocks(&self) {
        self.num_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_failed_attempts(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_error_code(&self, code: ErrorCode) {
        self.error_code.store(code.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn set_remote_error_code(&self, code: ErrorCode) {
        self.remote_error_code.store(code.as_u8(), Ordering::Relaxed);
    }

    /// Raw protocol header bytes received.
    #[must_use]
    pub fn header_bytes(&self) -> u64 {
        self.header_bytes.load(Ordering::Relaxed)
    }

    /// Raw payload bytes received.
    #[must_use]
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes.load(Ordering::Relaxed)
    }

    /// Header bytes belonging to completed blocks.
    #[must_use]
    pub fn effective_header_bytes(&self) -> u64 {
        self.effective_header_bytes.load(Ordering::Relaxed)
    }

    /// Payload bytes belonging to completed blocks.
    #[must_use]
    pub fn effective_data_bytes(&self) -> u64 {
        self.effective_data_bytes.load(Ordering::Relaxed)
    }

    /// Completed blocks.
    #[must_use]
    pub fn num_blocks(&self) -> u64 {
        self.num_blocks.load(Ordering::Relaxed)
    }

    /// Blocks that started but did not complete.
    #[must_use]
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    /// Last error recorded by the owning worker.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_wire(self.error_code.load(Ordering::Relaxed))
    }

    /// Last non-OK status the sender reported in a `DONE_CMD`.
    #[must_use]
    pub fn remote_error_code(&self) -> ErrorCode {
        ErrorCode::from_wire(self.remote_error_code.load(Ordering::Relaxed))
    }

    /// Sum of raw header and payload bytes; the watchdog's progress
    /// signal.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.header_bytes() + self.data_bytes()
    }

    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            header_bytes: self.header_bytes(),
            data_bytes: self.data_bytes(),
            effective_header_bytes: self.effective_header_bytes(),
            effective_data_bytes: self.effective_data_bytes(),
            num_blocks: self.num_blocks(),
            failed_attempts: self.failed_attempts(),
            error_code: self.error_code(),
            remote_error_code: self.remote_error_code(),
        }
    }
}

/// Plain copy of one worker's counters, taken after the worker joined.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Raw protocol header bytes received.
    pub header_bytes: u64,
    /// Raw payload bytes received.
    pub data_bytes: u64,
    /// Header bytes belonging to completed blocks.
    pub effective_header_bytes: u64,
    /// Payload bytes belonging to completed blocks.
    pub effective_data_bytes: u64,
    /// Completed blocks.
    pub num_blocks: u64,
    /// Blocks that started but did not complete.
    pub failed_attempts: u64,
    /// Last error the worker recorded.
    pub error_code: ErrorCode,
    /// Last non-OK status the sender reported.
    pub remote_error_code: ErrorCode,
}
