//! Aggregated end-of-session report.

use std::fmt;
use std::sync::Arc;

use gust_protocol::ErrorCode;

use crate::stats::{StatsSnapshot, ThreadStats};

/// Summary of one finished session, assembled by `finish` from the
/// per-worker counters after every worker joined.
#[derive(Clone, Debug, Default)]
pub struct TransferReport {
    per_port: Vec<(u16, StatsSnapshot)>,
}

impl TransferReport {
    pub(crate) fn new(ports: &[u16], stats: &[Arc<ThreadStats>]) -> Self {
        let per_port = ports
            .iter()
            .zip(stats)
            .map(|(port, stats)| (*port, stats.snapshot()))
            .collect();
        Self { per_port }
    }

    /// Per-port snapshots in port order.
    #[must_use]
    pub fn port_stats(&self) -> &[(u16, StatsSnapshot)] {
        &self.per_port
    }

    /// Raw header bytes summed over all ports.
    #[must_use]
    pub fn total_header_bytes(&self) -> u64 {
        self.sum(|snap| snap.header_bytes)
    }

    /// Raw payload bytes summed over all ports.
    #[must_use]
    pub fn total_data_bytes(&self) -> u64 {
        self.sum(|snap| snap.data_bytes)
    }

    /// Payload bytes that ended up in completed blocks.
    #[must_use]
    pub fn effective_data_bytes(&self) -> u64 {
        self.sum(|snap| snap.effective_data_bytes)
    }

    /// Completed blocks over all ports.
    #[must_use]
    pub fn num_blocks(&self) -> u64 {
        self.sum(|snap| snap.num_blocks)
    }

    /// Failed block attempts over all ports.
    #[must_use]
    pub fn failed_attempts(&self) -> u64 {
        self.sum(|snap| snap.failed_attempts)
    }

    /// First non-OK local error recorded by any worker, port order.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        self.per_port
            .iter()
            .map(|(_, snap)| snap.error_code)
            .find(|code| !code.is_ok())
            .unwrap_or(ErrorCode::Ok)
    }

    /// First non-OK status any sender connection reported, port order.
    #[must_use]
    pub fn remote_error_code(&self) -> ErrorCode {
        self.per_port
            .iter()
            .map(|(_, snap)| snap.remote_error_code)
            .find(|code| !code.is_ok())
            .unwrap_or(ErrorCode::Ok)
    }

    /// `true` when no worker recorded a local or remote error.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error_code().is_ok() && self.remote_error_code().is_ok()
    }

    fn sum(&self, field: impl Fn(&StatsSnapshot) -> u64) -> u64 {
        self.per_port.iter().map(|(_, snap)| field(snap)).sum()
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Transfer of {} blocks ({} effective payload bytes)",
            self.num_blocks(),
            self.effective_data_bytes()
        )?;
        writeln!(
            f,
            "Received {} header bytes, {} data bytes, {} failed attempts",
            self.total_header_bytes(),
            self.total_data_bytes(),
            self.failed_attempts()
        )?;
        for (port, snap) in &self.per_port {
            writeln!(
                f,
                "  port {port}: {} blocks, {} bytes, status {}",
                snap.num_blocks,
                snap.header_bytes + snap.data_bytes,
                snap.error_code
            )?;
        }
        write!(
            f,
            "Final status: {} (remote: {})",
            self.error_code(),
            self.remote_error_code()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(code: ErrorCode, blocks: u64) -> Arc<ThreadStats> {
        let stats = ThreadStats::new();
        stats.set_error_code(code);
        for _ in 0..blocks {
            stats.incr_num_blocks();
        }
        stats.add_header_bytes(4);
        stats.add_data_bytes(16);
        Arc::new(stats)
    }

    #[test]
    fn sums_across_ports() {
        let report = TransferReport::new(
            &[9000, 9001],
            &[stats_with(ErrorCode::Ok, 2), stats_with(ErrorCode::Ok, 3)],
        );
        assert_eq!(report.num_blocks(), 5);
        assert_eq!(report.total_header_bytes(), 8);
        assert_eq!(report.total_data_bytes(), 32);
        assert!(report.succeeded());
    }

    #[test]
    fn surfaces_first_failing_port() {
        let report = TransferReport::new(
            &[9000, 9001, 9002],
            &[
                stats_with(ErrorCode::Ok, 1),
                stats_with(ErrorCode::ProtocolError, 0),
                stats_with(ErrorCode::ConnError, 0),
            ],
        );
        assert_eq!(report.error_code(), ErrorCode::ProtocolError);
        assert!(!report.succeeded());
    }

    #[test]
    fn empty_report_is_ok() {
        let report = TransferReport::default();
        assert_eq!(report.num_blocks(), 0);
        assert!(report.succeeded());
    }

    #[test]
    fn display_mentions_ports_and_status() {
        let report = TransferReport::new(&[9000], &[stats_with(ErrorCode::Ok, 1)]);
        let text = report.to_string();
        assert!(text.contains("port 9000"));
        assert!(text.contains("Final status: ok"));
    }
}
