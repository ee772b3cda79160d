//! `loconet-monitor`: open a LocoNet bus (real serial port, capture replay,
//! or a dummy port for dry runs), print decoded traffic, and optionally
//! mirror layout state and push JSON snapshots over TCP.
//!
//! This binary is the one place in the workspace that reads CLI/env
//! configuration; every other crate takes its configuration as plain
//! arguments from its caller (spec.md §4.3, §6.4).

use std::io::Write as _;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loconet_transport::{CaptureSink, Interface, PacingMode};

/// Command-line surface for the LocoNet monitor.
#[derive(Parser, Debug)]
#[command(name = "loconet-monitor")]
#[command(about = "Watch, capture, and replay traffic on a LocoNet bus")]
#[command(version)]
struct Args {
    /// Serial port device to open (e.g. /dev/ttyUSB0, COM3). Ignored when
    /// `--replay` or `--dummy` is set.
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(short, long, default_value_t = 16_457)]
    baud: u32,

    /// Don't open any real port; accept sends and never produce inbound
    /// traffic. Useful for dry runs of `--web-port`.
    #[arg(long, default_value_t = false)]
    dummy: bool,

    /// Replay a previously captured file instead of opening a live port.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// When replaying, sleep between frames to reproduce the original
    /// timing instead of replaying as fast as the file can be read.
    #[arg(long, default_value_t = false)]
    replay_realtime: bool,

    /// Append every frame seen (in either direction) to this file.
    #[arg(long)]
    capture: Option<PathBuf>,

    /// When capturing, prefix each frame with a `CaptureTimeStamp` so a
    /// later `--replay --replay-realtime` can reproduce inter-frame gaps.
    #[arg(long, default_value_t = false)]
    capture_timestamps: bool,

    /// If set, serve line-delimited JSON layout snapshots to any client
    /// that connects to this TCP port.
    #[arg(long)]
    web_port: Option<u16>,

    /// Log filter, e.g. "info", "loconet_monitor=debug". Overridden by
    /// `RUST_LOG` when set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let capture = args
        .capture
        .as_ref()
        .map(|path| -> anyhow::Result<Arc<CaptureSink>> {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating capture file {}", path.display()))?;
            Ok(Arc::new(CaptureSink::new(Box::new(file), args.capture_timestamps)))
        })
        .transpose()?;

    let pacing = if args.replay_realtime { PacingMode::Realtime } else { PacingMode::FastAsPossible };

    let iface = if let Some(replay_path) = &args.replay {
        tracing::info!(path = %replay_path.display(), "replaying capture file");
        Interface::open_replay(replay_path, pacing).context("opening replay file")?
    } else if args.dummy {
        tracing::info!("running with a dummy interface (no physical port)");
        Interface::open_dummy()
    } else {
        let port = args.port.as_deref().context("--port is required unless --replay or --dummy is set")?;
        tracing::info!(port, baud = args.baud, "opening serial port");
        open_serial_with_capture(port, args.baud, capture.clone())?
    };

    let scrollkeeper = loconet_scrollkeeper::Scrollkeeper::new(&iface);

    iface.register_callback(|msg| {
        tracing::info!(?msg, "frame");
    });

    if let Some(web_port) = args.web_port {
        let scrollkeeper = Arc::clone(&scrollkeeper);
        thread::spawn(move || run_web_server(web_port, &scrollkeeper));
    }

    tracing::info!("monitor running; press Ctrl+C to stop");
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

/// Open a real serial port wired straight to `Interface::open` (rather than
/// the capture-less `Interface::open_serial` convenience constructor) so a
/// `--capture` sink can be attached to the same source/sink pair.
fn open_serial_with_capture(
    path: &str,
    baud: u32,
    capture: Option<Arc<CaptureSink>>,
) -> anyhow::Result<Arc<Interface>> {
    let port = serialport::new(path, baud)
        .timeout(Duration::from_millis(200))
        .open()
        .with_context(|| format!("opening serial port {path}"))?;
    let port_clone = port.try_clone().context("cloning serial port handle")?;
    Ok(Interface::open(Box::new(port), Box::new(port_clone), capture, PacingMode::FastAsPossible))
}

/// Serve one line of JSON per connection-read-tick to every client
/// connected to `port`, each line a fresh `Scrollkeeper::to_json_snapshot`.
fn run_web_server(port: u16, scrollkeeper: &Arc<loconet_scrollkeeper::Scrollkeeper>) {
    let listener = match TcpListener::bind(("0.0.0.0", port)) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::warn!(%err, port, "failed to bind web port");
            return;
        },
    };
    tracing::info!(port, "serving JSON snapshots");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let scrollkeeper = Arc::clone(scrollkeeper);
                thread::spawn(move || serve_snapshot_client(stream, &scrollkeeper));
            },
            Err(err) => tracing::warn!(%err, "web port accept failed"),
        }
    }
}

fn serve_snapshot_client(mut stream: TcpStream, scrollkeeper: &Arc<loconet_scrollkeeper::Scrollkeeper>) {
    loop {
        let snapshot = scrollkeeper.to_json_snapshot();
        let mut line = snapshot.to_string();
        line.push('\n');
        if stream.write_all(line.as_bytes()).is_err() {
            return;
        }
        thread::sleep(Duration::from_secs(1));
    }
}
