//! Castlight - RGB lighting control for HyperX QuadCast S microphones.
//!
//! Sends a pre-built lighting packet file to the first supported microphone
//! found on the USB bus, optionally holding the device and resending until
//! interrupted.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use castlight_core::{IdentityTable, PacketBuffer};
use castlight_hid::sim::{SimBus, SimDevice};
use castlight_hid::{
    CancelToken, HidError, HidResult, LocatorError, RusbBus, SendOptions, Transport, TransportError,
    UsbBus, open_device, scan_devices,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod exit;
mod signals;

use config::{Config, ConfigSource, LogFormat};
use exit::ExitStatus;

#[derive(Parser, Debug)]
#[command(name = "castlight", author, version, about = "RGB lighting control for HyperX QuadCast S microphones")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a lighting packet file to the microphone
    Send(SendArgs),
    /// List supported microphones attached to this machine
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Packet file of 64-byte packets, or `-` for stdin
    packets: PathBuf,

    /// Number of packets to send (defaults to the whole file)
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Report each acknowledged packet
    #[arg(short, long)]
    verbose: bool,

    /// Keep the microphone claimed and resend until SIGINT/SIGTERM
    #[arg(long)]
    hold: bool,

    /// Talk to a simulated microphone instead of USB hardware
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, source) = match config::load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("castlight: {e:#}");
            return ExitStatus::InvalidInput.into();
        }
    };

    let verbose = matches!(&cli.command, Command::Send(args) if args.verbose);
    if let Err(e) = init_logging(&config, cli.log_level.as_deref(), verbose) {
        eprintln!("castlight: {e:#}");
        return ExitStatus::InvalidInput.into();
    }
    match &source {
        ConfigSource::File(path) => debug!(config_path = ?path, "Configuration loaded"),
        ConfigSource::Defaults(path) => info!(config_path = ?path, "Config file not found, using defaults"),
    }

    let result = match cli.command {
        Command::Send(args) => send(&config, args).await,
        Command::List { json } => list(&config, json).await,
    };

    match result {
        Ok(()) => ExitStatus::Success.into(),
        Err(e) => {
            let status = ExitStatus::from_error(&e);
            error!(error = %e, ?status, "Castlight failed");
            eprintln!("castlight: {e:#}");
            status.into()
        }
    }
}

/// Initialize logging.
///
/// `RUST_LOG` wins over the command line, which wins over the config file.
fn init_logging(config: &Config, cli_level: Option<&str>, verbose: bool) -> Result<()> {
    let level = match cli_level {
        Some(level) => level,
        None if verbose => "info",
        None => config.daemon.log_level.as_str(),
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "warn,castlight={level},castlight_hid={level},castlight_core={level}"
        ))
        .with_context(|| format!("Invalid log level: {level:?}"))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match config.daemon.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

async fn send(config: &Config, args: SendArgs) -> Result<()> {
    let bytes = read_packet_file(&args.packets).await?;
    let packets = PacketBuffer::from_bytes(&bytes)
        .map_err(HidError::from)
        .with_context(|| format!("Invalid packet file: {:?}", args.packets))?;
    let count = args.count.unwrap_or(packets.len());
    info!(packets = packets.len(), count, "Packet file loaded");

    let table = config.identity_table()?;
    let session = Session {
        table,
        transport: Transport::new(config.transport_config()),
        packets,
        count,
        hold: args.hold.then(|| config.hold_interval()),
        options: SendOptions { verbose: args.verbose, cancel: Some(CancelToken::new()) },
    };

    if let Some(cancel) = &session.options.cancel {
        signals::cancel_on_shutdown(cancel.clone())?;
    }

    // Blocking USB I/O stays on one dedicated thread for the whole session
    let simulate = args.simulate;
    let outcome = tokio::task::spawn_blocking(move || -> HidResult<usize> {
        if simulate {
            let devices = session.table.iter().take(1).map(|e| SimDevice::new(e.identity)).collect();
            session.run(&SimBus::new(devices))
        } else {
            let bus = RusbBus::new().map_err(LocatorError::EnumerationFailed)?;
            session.run(&bus)
        }
    })
    .await
    .context("Lighting session task failed")?;

    match outcome {
        Ok(sessions) => {
            info!(sessions, "Lighting updated");
            Ok(())
        }
        Err(HidError::Transport(TransportError::Cancelled { index })) => {
            info!(index, "Lighting session cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn list(config: &Config, json: bool) -> Result<()> {
    let table = config.identity_table()?;
    let found = tokio::task::spawn_blocking(move || -> HidResult<_> {
        let bus = RusbBus::new().map_err(LocatorError::EnumerationFailed)?;
        Ok(scan_devices(&bus, &table)?)
    })
    .await
    .context("Device scan task failed")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        for device in &found {
            println!(
                "{:03}:{:03}  {}  {:<10} {}",
                device.bus_number,
                device.address,
                device.entry.identity,
                device.entry.role.to_string(),
                device.entry.model
            );
        }
    }

    if found.is_empty() {
        return Err(LocatorError::NoDeviceFound.into());
    }
    Ok(())
}

async fn read_packet_file(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if path == Path::new("-") {
        tokio::io::stdin().read_to_end(&mut bytes).await.context("Failed to read packets from stdin")?;
    } else {
        bytes = tokio::fs::read(path).await.with_context(|| format!("Failed to read packet file: {path:?}"))?;
    }
    if bytes.is_empty() {
        bail!("Packet file is empty");
    }
    Ok(bytes)
}

/// Everything needed to drive the microphone for one run.
struct Session {
    table: IdentityTable,
    transport: Transport,
    packets: PacketBuffer,
    count: usize,
    /// Resend interval when holding the device
    hold: Option<Duration>,
    options: SendOptions,
}

impl Session {
    /// Claim the microphone and send the packets, repeatedly when holding.
    ///
    /// Returns the number of completed sessions. The device is released when
    /// this returns, on success and on error.
    fn run<B: UsbBus>(&self, bus: &B) -> HidResult<usize> {
        let handle = open_device(bus, &self.table)?;
        info!(identity = %handle.identity(), model = handle.model(), "Microphone claimed");

        let mut completed = 0;
        loop {
            let report = self.transport.send(&handle, &self.packets, self.count, &self.options)?;
            completed += 1;
            debug!(completed, elapsed_ms = report.elapsed.as_millis(), "Session committed");

            let Some(interval) = self.hold else {
                break;
            };
            if self.wait_cancelled(interval) {
                info!(completed, "Hold stopped");
                break;
            }
        }

        Ok(completed)
    }

    /// Sleep for `interval`, returning early with `true` if cancelled.
    fn wait_cancelled(&self, interval: Duration) -> bool {
        let Some(cancel) = &self.options.cancel else {
            std::thread::sleep(interval);
            return false;
        };

        let deadline = Instant::now() + interval;
        loop {
            if cancel.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}
