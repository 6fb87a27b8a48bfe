#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `gust_receiver` is the receiving half of the gust bulk data transfer
//! system: a [`Receiver`] bound to a destination directory and a
//! contiguous range of TCP ports. Each port is served by one worker
//! thread that accepts connections, parses the command stream defined in
//! [`gust_protocol`], and reconstructs files under the destination root.
//!
//! # Design
//!
//! - [`Receiver`] owns the session lifecycle: `transfer_async` spawns the
//!   workers and returns, `finish` joins them and yields a
//!   [`TransferReport`]; `run_forever` serves sessions until the process
//!   ends.
//! - Workers communicate results exclusively through their
//!   [`ThreadStats`]; no errors cross thread boundaries.
//! - Joinable sessions are guarded by a progress watchdog. It detects a
//!   stall by watching the aggregate byte count and breaks the workers
//!   out by shutting their sockets down, which is the only cancellation
//!   mechanism in the system.
//!
//! # Examples
//!
//! ```no_run
//! use gust_receiver::{Options, Receiver};
//!
//! let mut receiver = Receiver::new(22356, 8, "/data/incoming", Options::default());
//! receiver.transfer_async().expect("no session is running");
//! // ... sender pushes files to ports 22356..22364 ...
//! let report = receiver.finish();
//! println!("{report}");
//! ```

mod error;
mod file_creator;
mod options;
mod receiver;
mod report;
mod socket;
mod stats;
mod watchdog;
mod worker;

pub use error::{ReceiverError, ReceiverResult};
pub use file_creator::FileCreator;
pub use options::Options;
pub use receiver::Receiver;
pub use report::TransferReport;
pub use stats::{StatsSnapshot, ThreadStats};
