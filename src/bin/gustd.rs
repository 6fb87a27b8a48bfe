#![deny(unsafe_code)]

//! gust receiver daemon.
//!
//! Serves the gust transfer protocol on a contiguous range of TCP ports
//! and writes incoming files under a destination directory. By default
//! it runs forever, serving session after session; `--single` accepts
//! exactly one joinable session, prints the transfer report, and exits.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{value_parser, Arg, ArgAction, Command};
use gust_receiver::{Options, Receiver};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("gustd")
        .about("gust bulk data transfer receiver")
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("First port of the receive range.")
                .value_parser(value_parser!(u16))
                .default_value("22356"),
        )
        .arg(
            Arg::new("num-ports")
                .long("num-ports")
                .help("Number of consecutive ports (and worker threads).")
                .value_parser(value_parser!(u16).range(1..))
                .default_value("8"),
        )
        .arg(
            Arg::new("dest-dir")
                .long("dest-dir")
                .short('d')
                .help("Directory incoming files are written under.")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("single")
                .long("single")
                .help("Accept one session, print the report, and exit.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-writes")
                .long("skip-writes")
                .help("Drain payloads without writing any files.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("buffer-size")
                .long("buffer-size")
                .help("Per-worker receive buffer size in bytes.")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("backlog")
                .long("backlog")
                .help("Listen backlog per port.")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .help("Bind/listen attempts before a worker gives up.")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("sleep-millis")
                .long("sleep-millis")
                .help("Sleep between bind/listen retries, in milliseconds.")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("timeout-check-interval")
                .long("timeout-check-interval")
                .help("Watchdog check interval in milliseconds; negative disables it.")
                .value_parser(value_parser!(i64)),
        )
        .arg(
            Arg::new("failed-timeout-checks")
                .long("failed-timeout-checks")
                .help("Zero-progress checks tolerated before sockets are shut down.")
                .value_parser(value_parser!(u32)),
        )
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    let mut options = Options::default();
    if let Some(value) = matches.get_one::<usize>("buffer-size") {
        options.buffer_size = *value;
    }
    if let Some(value) = matches.get_one::<u32>("backlog") {
        options.backlog = *value;
    }
    if let Some(value) = matches.get_one::<u32>("max-retries") {
        options.max_retries = *value;
    }
    if let Some(value) = matches.get_one::<u64>("sleep-millis") {
        options.sleep_millis = *value;
    }
    if let Some(value) = matches.get_one::<i64>("timeout-check-interval") {
        options.timeout_check_interval_millis = *value;
    }
    if let Some(value) = matches.get_one::<u32>("failed-timeout-checks") {
        options.failed_timeout_checks = *value;
    }
    options.skip_writes = matches.get_flag("skip-writes");

    let port = *matches.get_one::<u16>("port").expect("defaulted");
    let num_ports = *matches.get_one::<u16>("num-ports").expect("defaulted");
    let dest_dir = matches
        .get_one::<PathBuf>("dest-dir")
        .cloned()
        .expect("required");

    let mut receiver = Receiver::new(port, num_ports, dest_dir, options);

    if matches.get_flag("single") {
        if let Err(error) = receiver.transfer_async() {
            error!(%error, "could not start transfer");
            return ExitCode::FAILURE;
        }
        let report = receiver.finish();
        println!("{report}");
        if report.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    } else {
        // Never returns under normal operation.
        match receiver.run_forever() {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                error!(%error, "receiver stopped");
                ExitCode::FAILURE
            }
        }
    }
}
