//! `meterlink` binary: read a smart meter and print every measurement set
//! as one JSON line on stdout.
//!
//! ```text
//! meterlink --config meter.toml [--port PATH] [--protocol sml|json-efr] [--once] [-v]
//! meterlink --list-ports
//! ```
//!
//! Logs go to stderr; the filter defaults to the configured debug level and
//! can be overridden with `RUST_LOG`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use meterlink_core::{DebugLevel, Measurements, MeterConfig, ProtocolKind};
use meterlink_protocol::{AnyProtocol, ChannelSink, ProtocolStrategy};
use meterlink_transport::{AnyLink, Link, MeterSession, SerialLink};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "meterlink")]
#[command(about = "Collect readings from SML and EFR smart meters")]
#[command(version)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overrides `serial.port`
    #[arg(short, long)]
    port: Option<String>,

    /// Protocol, overrides `protocol.kind`
    #[arg(long)]
    protocol: Option<ProtocolKind>,

    /// Exit after the first measurement set
    #[arg(long)]
    once: bool,

    /// Raise the debug level (-v errors, -vv verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

impl Args {
    /// Load the configuration file (if any) and apply command line overrides.
    fn resolve_config(&self) -> Result<MeterConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => MeterConfig::default(),
        };

        if let Some(port) = &self.port {
            config.serial.port.clone_from(port);
        }
        if let Some(kind) = self.protocol {
            config.protocol.kind = kind;
        }
        let requested = DebugLevel::try_from(self.verbose.min(2))?;
        config.debug = config.debug.max(requested);

        config.validate()?;
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<MeterConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn default_filter(level: DebugLevel) -> &'static str {
    match level {
        DebugLevel::Off => "warn",
        DebugLevel::Errors => "info",
        DebugLevel::Verbose => "debug",
    }
}

fn init_logging(level: DebugLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One output line: capture time plus the measurement set.
fn format_line(measurements: &Measurements, at: chrono::DateTime<chrono::Utc>) -> Result<String> {
    let line = json!({
        "timestamp": at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "measurements": measurements,
    });
    Ok(serde_json::to_string(&line)?)
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}  usb {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Print every received set; cancel the session after the first when `once`.
async fn print_measurements(
    mut rx: mpsc::UnboundedReceiver<Measurements>,
    once: bool,
    cancel: CancellationToken,
) -> Result<()> {
    while let Some(set) = rx.recv().await {
        println!("{}", format_line(&set, chrono::Utc::now())?);
        if once {
            cancel.cancel();
            break;
        }
    }
    Ok(())
}

/// Run the session, starting a fresh one whenever a frame is rejected.
async fn run_session<L: Link, P: ProtocolStrategy>(
    session: &mut MeterSession<L, P>,
) -> meterlink_core::Result<()> {
    loop {
        match session.run().await {
            Err(error) if error.is_session_error() => {
                warn!(error = %error, "Frame rejected, restarting session");
            }
            result => return result,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_ports {
        return list_ports();
    }

    let config = args.resolve_config()?;
    init_logging(config.debug);

    let (sink, rx) = ChannelSink::new();
    let protocol = AnyProtocol::from_settings(&config.protocol, config.debug, sink);
    let link = AnyLink::from(SerialLink::new(config.serial.clone()));

    let cancel = CancellationToken::new();
    let mut session = MeterSession::new(link, protocol, config.framer.clone())
        .debug(config.debug)
        .with_cancellation(cancel.clone());

    let printer = tokio::spawn(print_measurements(rx, args.once, cancel.clone()));

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            ctrl_c.cancel();
        }
    });

    let result = run_session(&mut session).await;
    // Dropping the session closes the channel so the printer drains and ends
    drop(session);
    printer.await.context("Output task panicked")??;

    result.context("Meter session failed")
}
