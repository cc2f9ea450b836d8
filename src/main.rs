//! # domed — dome supervisor daemon
//!
//! Owns the two serial links (shutter controller, heartbeat monitor),
//! spawns their monitor threads, and parks until a shutdown signal. Does not
//! implement an RPC transport; embedding that surface is out of scope here.
//!
//! ```bash
//! domed --config /etc/domed/dome.json
//! domed -c /etc/domed/dome.json --verbose --json
//! ```

#![deny(warnings)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use domed::belt::NoBeltSensor;
use domed::logging::{LogSink, TracingLogSink};
use domed::serial::{PortIo, SerialLink};
use domed::{load_config, Supervisor};

/// domed - Astrohaven-family dome supervisor daemon
#[derive(Parser, Debug)]
#[command(name = "domed")]
#[command(version)]
#[command(about = "Supervisory daemon for an observatory dome controller and heartbeat monitor")]
#[command(long_about = None)]
struct Args {
    /// Path to the dome configuration document (JSON).
    #[arg(short, long, default_value = "/etc/domed/dome.json")]
    config: PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("domed startup failed: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("domed v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    info!(service = %config.service_name, "configuration loaded from {}", args.config.display());

    let log: Arc<dyn LogSink> = Arc::new(TracingLogSink);

    let shutter_link = Arc::new(open_link(
        "shutter",
        config.shutter_port.clone(),
        config.shutter_baud,
        config.read_timeout,
        log.clone(),
    ));
    let heartbeat_link = Arc::new(open_link(
        "heartbeat",
        config.heartbeat_port.clone(),
        config.heartbeat_baud,
        config.read_timeout,
        log.clone(),
    ));

    shutter_link.connect();
    heartbeat_link.connect();

    let supervisor = Arc::new(Supervisor::new(
        config,
        shutter_link,
        heartbeat_link,
        log.clone(),
        Arc::new(NoBeltSensor),
    ));

    let (shutter_monitor, heartbeat_monitor) = supervisor.spawn_monitors();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_for_handler.store(true, Ordering::SeqCst);
    })?;

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("domed shutting down");
    drop(shutter_monitor);
    drop(heartbeat_monitor);
    Ok(())
}

fn open_link(
    label: &'static str,
    port_path: String,
    baud: u32,
    read_timeout: f64,
    log: Arc<dyn LogSink>,
) -> SerialLink {
    let timeout = Duration::from_secs_f64(read_timeout);
    let opener = Box::new(move || {
        PortIo::open(&port_path, baud, timeout)
            .map(|p| Box::new(p) as Box<dyn domed::serial::SerialPortIo>)
    });
    SerialLink::new(label, timeout, opener, log)
}

/// Setup the tracing subscriber based on CLI arguments, matching the
/// conventional driver-binary pattern: `-v` raises verbosity, `--json`
/// switches the formatter.
fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
