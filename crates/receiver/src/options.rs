//! Receiver tunables.

/// Immutable snapshot of receiver tunables, taken once at session start.
///
/// Workers and the watchdog read their copy for the lifetime of the
/// session; changing an [`Options`] value after `start` has no effect on a
/// running transfer.
#[derive(Clone, Debug)]
pub struct Options {
    /// Per-worker receive buffer size in bytes. Values below the maximum
    /// protocol header are rounded up to the next 2 KiB multiple that
    /// fits a full header.
    pub buffer_size: usize,
    /// Listen backlog for each port.
    pub backlog: u32,
    /// Bind/listen attempts before a worker gives up on its port.
    pub max_retries: u32,
    /// Sleep between bind/listen retries, in milliseconds.
    pub sleep_millis: u64,
    /// Watchdog check interval in milliseconds; negative disables the
    /// watchdog entirely.
    pub timeout_check_interval_millis: i64,
    /// Consecutive zero-progress checks tolerated before the watchdog
    /// shuts the transfer sockets down.
    pub failed_timeout_checks: u32,
    /// Drain payloads without opening or writing any destination files.
    pub skip_writes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            buffer_size: 256 * 1024,
            backlog: 1,
            max_retries: 20,
            sleep_millis: 50,
            timeout_check_interval_millis: 100,
            failed_timeout_checks: 50,
            skip_writes: false,
        }
    }
}
