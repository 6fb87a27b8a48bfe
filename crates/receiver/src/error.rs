//! Controller-level error type.
//!
//! Per-connection failures never surface here; workers record them in
//! their [`ThreadStats`](crate::ThreadStats) and the aggregated
//! [`TransferReport`](crate::TransferReport) carries them after join.

use thiserror::Error;

/// Result type for receiver lifecycle operations.
pub type ReceiverResult<T> = Result<T, ReceiverError>;

/// Errors returned by the receiver lifecycle methods.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReceiverError {
    /// A session is already running on this receiver instance.
    #[error("a transfer is already running on this receiver")]
    AlreadyRunning,
    /// A forever-mode receiver stopped serving; this is always an error
    /// because daemon workers are expected to run until the process ends.
    #[error("forever-mode receiver was interrupted")]
    Interrupted,
}
