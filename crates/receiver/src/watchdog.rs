//! Stall detection for joinable sessions.
//!
//! The watchdog never touches worker threads directly. When aggregate
//! byte counts stop moving it shuts the transfer sockets down, which
//! makes the workers' blocked `accept`/`read` calls fail; the workers
//! then record the failure and exit on their own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::receiver::SessionState;
use crate::socket::PortHandles;
use crate::stats::ThreadStats;

pub(crate) struct Watchdog {
    pub session: Arc<SessionState>,
    pub stats: Vec<Arc<ThreadStats>>,
    pub handles: Vec<Arc<PortHandles>>,
    pub check_interval_millis: i64,
    pub max_stall_checks: u32,
}

impl Watchdog {
    /// Entry point of the watchdog thread.
    pub(crate) fn run(self) {
        if self.check_interval_millis < 0 {
            debug!("progress watchdog disabled");
            return;
        }
        let interval = Duration::from_millis(self.check_interval_millis as u64);
        info!(
            interval_millis = self.check_interval_millis,
            max_checks = self.max_stall_checks,
            "progress watchdog started"
        );

        let mut previous_total: u64 = 0;
        let mut stall_count: u64 = 0;
        loop {
            if self.session.wait_finished(interval) {
                return;
            }
            let current_total: u64 = self.stats.iter().map(|stats| stats.total_bytes()).sum();
            let delta = current_total.saturating_sub(previous_total);
            previous_total = current_total;
            if delta == 0 {
                stall_count += 1;
            } else {
                stall_count = 0;
            }
            debug!(delta, stall_count, "progress check");
            if stall_count > u64::from(self.max_stall_checks) {
                info!(
                    checks = self.max_stall_checks,
                    "no progress, shutting down transfer sockets"
                );
                self.shutdown_sockets();
                return;
            }
        }
    }

    /// Shuts down every listening socket, then every accepted
    /// connection. Failures are logged and not retried; an already-dead
    /// socket is exactly the outcome wanted.
    fn shutdown_sockets(&self) {
        for (index, handles) in self.handles.iter().enumerate() {
            if let Err(error) = handles.shutdown_listener() {
                warn!(index, %error, "could not shut down listening socket");
            }
        }
        for (index, handles) in self.handles.iter().enumerate() {
            if let Err(error) = handles.shutdown_connection() {
                warn!(index, %error, "could not shut down accepted socket");
            }
        }
    }
}
