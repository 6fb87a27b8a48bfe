//! Session controller: lifecycle, thread spawn/join, and the final
//! report.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gust_protocol::MAX_HEADER;
use tracing::{error, info, warn};

use crate::file_creator::FileCreator;
use crate::options::Options;
use crate::report::TransferReport;
use crate::socket::{PortHandles, ServerSocket};
use crate::stats::ThreadStats;
use crate::watchdog::Watchdog;
use crate::worker::{receive_one, WorkerConfig};
use crate::{ReceiverError, ReceiverResult};

/// Shared session flag: `finished` starts `true`, goes `false` for the
/// duration of one session, and back to `true` in `finish`, which also
/// wakes the watchdog.
#[derive(Debug)]
pub(crate) struct SessionState {
    finished: Mutex<bool>,
    cond: Condvar,
}

impl SessionState {
    fn new() -> Self {
        Self {
            finished: Mutex::new(true),
            cond: Condvar::new(),
        }
    }

    fn is_finished(&self) -> bool {
        *self.finished.lock().expect("session mutex poisoned")
    }

    fn set_finished(&self, value: bool) {
        let mut finished = self.finished.lock().expect("session mutex poisoned");
        *finished = value;
        if value {
            self.cond.notify_all();
        }
    }

    /// Blocks for up to `timeout` (or until `finish` broadcasts) and
    /// returns the current value of the finished flag.
    pub(crate) fn wait_finished(&self, timeout: Duration) -> bool {
        let guard = self.finished.lock().expect("session mutex poisoned");
        let (guard, _timed_out) = self
            .cond
            .wait_timeout(guard, timeout)
            .expect("session mutex poisoned");
        *guard
    }
}

/// Multi-port receiver for the gust transfer protocol.
///
/// Bound at construction to a destination directory and a contiguous
/// port range. One worker thread serves each port; a progress watchdog
/// guards joinable sessions. See [`transfer_async`], [`run_forever`] and
/// [`finish`] for the lifecycle.
///
/// [`transfer_async`]: Receiver::transfer_async
/// [`run_forever`]: Receiver::run_forever
/// [`finish`]: Receiver::finish
#[derive(Debug)]
pub struct Receiver {
    ports: Vec<u16>,
    dest_dir: PathBuf,
    options: Options,
    joinable: bool,
    session: Arc<SessionState>,
    workers: Vec<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    stats: Vec<Arc<ThreadStats>>,
    handles: Vec<Arc<PortHandles>>,
}

impl Receiver {
    /// Creates a receiver serving ports `[port, port + num_ports)`,
    /// writing under `dest_dir`.
    #[must_use]
    pub fn new(port: u16, num_ports: u16, dest_dir: impl Into<PathBuf>, options: Options) -> Self {
        Self {
            ports: (0..num_ports).map(|i| port + i).collect(),
            dest_dir: dest_dir.into(),
            options,
            joinable: false,
            session: Arc::new(SessionState::new()),
            workers: Vec::new(),
            watchdog: None,
            stats: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Replaces the destination directory. Must not be called while a
    /// session is live; the next `start` picks the new value up.
    pub fn set_dir(&mut self, dest_dir: impl Into<PathBuf>) {
        debug_assert!(
            !self.has_pending_transfer(),
            "set_dir during a live session"
        );
        self.dest_dir = dest_dir.into();
    }

    /// The ports this receiver serves.
    #[must_use]
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// The current destination directory.
    #[must_use]
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// `true` while a session is running (between `start` and `finish`).
    #[must_use]
    pub fn has_pending_transfer(&self) -> bool {
        !self.session.is_finished()
    }

    /// Starts a single-shot (joinable) session and returns immediately.
    /// Pair with [`finish`](Receiver::finish) to join the workers and
    /// collect the report.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::AlreadyRunning`] when a session is live.
    pub fn transfer_async(&mut self) -> ReceiverResult<()> {
        if self.has_pending_transfer() {
            error!("a transfer is already running on this receiver");
            return Err(ReceiverError::AlreadyRunning);
        }
        self.joinable = true;
        self.start();
        Ok(())
    }

    /// Runs in daemon mode: workers serve session after session and
    /// never terminate on their own, so this blocks its caller
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// [`ReceiverError::AlreadyRunning`] when a session is live;
    /// [`ReceiverError::Interrupted`] if the workers ever stop, which
    /// only happens through external interference with the sockets.
    pub fn run_forever(&mut self) -> ReceiverResult<()> {
        if self.has_pending_transfer() {
            error!("a transfer is already running on this receiver");
            return Err(ReceiverError::AlreadyRunning);
        }
        self.joinable = false;
        self.start();
        self.finish();
        Err(ReceiverError::Interrupted)
    }

    /// Joins every worker in port order, marks the session finished,
    /// joins the watchdog, and assembles the report. A second call (or a
    /// call without a prior start) returns an empty report.
    pub fn finish(&mut self) -> TransferReport {
        if !self.joinable && !self.workers.is_empty() {
            warn!("receiver is not joinable; finish may never return");
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("receiver worker panicked");
            }
        }

        // The one place the flag flips back: no new session can start
        // until every thread of this one is accounted for.
        self.session.set_finished(true);

        if let Some(handle) = self.watchdog.take() {
            if handle.join().is_err() {
                error!("progress watchdog panicked");
            }
        }

        let report = TransferReport::new(&self.ports, &self.stats);
        info!(
            blocks = report.num_blocks(),
            data_bytes = report.total_data_bytes(),
            status = %report.error_code(),
            "receiver transfer finished"
        );
        self.stats.clear();
        self.handles.clear();
        report
    }

    /// Spawns one worker per port and, for joinable sessions, the
    /// watchdog.
    fn start(&mut self) {
        info!(
            ports = ?self.ports,
            dest = %self.dest_dir.display(),
            joinable = self.joinable,
            "starting receiver"
        );
        self.session.set_finished(false);

        let buffer_size = effective_buffer_size(self.options.buffer_size);
        let creator = Arc::new(FileCreator::new(self.dest_dir.clone()));
        let config = WorkerConfig {
            buffer_size,
            max_retries: self.options.max_retries,
            sleep_millis: self.options.sleep_millis,
            skip_writes: self.options.skip_writes,
            joinable: self.joinable,
        };

        for &port in &self.ports {
            let stats = Arc::new(ThreadStats::new());
            let handles = Arc::new(PortHandles::new());
            let socket = ServerSocket::new(port, self.options.backlog, Arc::clone(&handles));
            let worker_creator = Arc::clone(&creator);
            let worker_stats = Arc::clone(&stats);
            self.workers
                .push(thread::spawn(move || {
                    receive_one(socket, worker_creator, worker_stats, config)
                }));
            self.stats.push(stats);
            self.handles.push(handles);
        }

        if self.joinable {
            let watchdog = Watchdog {
                session: Arc::clone(&self.session),
                stats: self.stats.clone(),
                handles: self.handles.clone(),
                check_interval_millis: self.options.timeout_check_interval_millis,
                max_stall_checks: self.options.failed_timeout_checks,
            };
            self.watchdog = Some(thread::spawn(move || watchdog.run()));
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        if self.has_pending_transfer() {
            warn!("receiver dropped with an ongoing transfer, finishing it");
            self.finish();
        }
    }
}

/// Rounds a configured buffer size up to the next 2 KiB multiple that
/// holds a full protocol header.
fn effective_buffer_size(configured: usize) -> usize {
    if configured >= MAX_HEADER {
        return configured;
    }
    let rounded = 2 * 1024 * ((MAX_HEADER - 1) / (2 * 1024) + 1);
    info!(configured, using = rounded, "buffer size below max header, rounding up");
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream};
    use std::sync::atomic::{AtomicU16, Ordering};

    use gust_protocol::{done_frame, encode_file, ErrorCode, FileFrame};

    /// Global port counter for test isolation.
    static TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(37_000);

    fn allocate_test_port() -> u16 {
        loop {
            let port = TEST_PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
            if port > 47_000 {
                TEST_PORT_COUNTER.store(37_000, Ordering::SeqCst);
                continue;
            }
            if let Ok(listener) = TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
                drop(listener);
                return port;
            }
        }
    }

    fn connect_with_retries(port: u16) -> TcpStream {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            match TcpStream::connect((Ipv4Addr::LOCALHOST, port)) {
                Ok(stream) => return stream,
                Err(error) => {
                    assert!(
                        std::time::Instant::now() < deadline,
                        "could not connect to port {port}: {error}"
                    );
                    thread::sleep(Duration::from_millis(20));
                }
            }
        }
    }

    fn send_done_and_read_reply(stream: &mut TcpStream) -> [u8; 2] {
        stream
            .write_all(&done_frame(ErrorCode::Ok))
            .expect("send done");
        stream.shutdown(Shutdown::Write).expect("half close");
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).expect("read reply");
        reply
    }

    #[test]
    fn effective_buffer_size_rounds_up_to_2k() {
        assert_eq!(effective_buffer_size(1), 6 * 1024);
        assert_eq!(effective_buffer_size(MAX_HEADER - 1), 6 * 1024);
        assert_eq!(effective_buffer_size(MAX_HEADER), MAX_HEADER);
        assert_eq!(effective_buffer_size(1 << 20), 1 << 20);
    }

    #[test]
    fn finish_without_start_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut receiver = Receiver::new(allocate_test_port(), 1, dir.path(), Options::default());
        assert!(!receiver.has_pending_transfer());
        let report = receiver.finish();
        assert_eq!(report.num_blocks(), 0);
        assert!(!receiver.has_pending_transfer());
    }

    #[test]
    fn second_transfer_async_is_rejected_while_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let port = allocate_test_port();
        let mut receiver = Receiver::new(port, 1, dir.path(), Options::default());

        receiver.transfer_async().expect("first start");
        assert!(receiver.has_pending_transfer());
        assert_eq!(
            receiver.transfer_async(),
            Err(ReceiverError::AlreadyRunning)
        );

        let mut stream = connect_with_retries(port);
        assert_eq!(send_done_and_read_reply(&mut stream), done_frame(ErrorCode::Ok));
        let report = receiver.finish();
        assert!(report.succeeded());
        assert!(!receiver.has_pending_transfer());

        // The session flag is back to finished, so a new session may
        // start on the same instance.
        receiver.transfer_async().expect("second session");
        let mut stream = connect_with_retries(port);
        send_done_and_read_reply(&mut stream);
        receiver.finish();
    }

    // Daemon-mode cycle: a worker survives DONE, starts the next session
    // error-free, and serves another connection on the same port.
    #[test]
    fn daemon_worker_serves_successive_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let port = allocate_test_port();
        let mut receiver = Receiver::new(port, 1, dir.path(), Options::default());
        receiver.joinable = false;
        receiver.start();

        // First session: garbage leaves the worker in a protocol error,
        // then DONE echoes that error back and resets it.
        let mut stream = connect_with_retries(port);
        stream.write_all(b"???").expect("send garbage");
        drop(stream);

        let mut stream = connect_with_retries(port);
        let reply = send_done_and_read_reply(&mut stream);
        assert_eq!(reply, done_frame(ErrorCode::ProtocolError));
        drop(stream);

        // Second session on the same worker: clean slate, full file.
        let frame = FileFrame {
            id: String::from("second-session.bin"),
            source_size: 9,
            offset: 0,
            file_size: 9,
        };
        let mut stream = connect_with_retries(port);
        let mut bytes = encode_file(ErrorCode::Ok, &frame).expect("encode");
        bytes.extend_from_slice(b"fresh-set");
        stream.write_all(&bytes).expect("send file");
        let reply = send_done_and_read_reply(&mut stream);
        assert_eq!(reply, done_frame(ErrorCode::Ok), "new session starts error-free");
        drop(stream);

        assert_eq!(
            std::fs::read(dir.path().join("second-session.bin")).expect("read file"),
            b"fresh-set"
        );

        // Daemon workers never exit on their own; break them out the way
        // the watchdog would, then join.
        for handles in &receiver.handles {
            let _ = handles.shutdown_listener();
            let _ = handles.shutdown_connection();
        }
        let report = receiver.finish();
        assert_eq!(report.num_blocks(), 1);
        assert_eq!(report.error_code(), ErrorCode::ConnError);
    }
}
