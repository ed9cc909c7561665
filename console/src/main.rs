// netsdr console -- connect to a NetSDR receiver, tune it, and capture IQ
// data to a file until Ctrl-C or a fixed duration.
//
// Usage:
//   netsdr-console --host 192.168.1.50
//   netsdr-console --host 192.168.1.50 --frequency 7074000 --duration 30
//   netsdr-console --host 192.168.1.50 --output capture.bin --bits24 -v

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use netsdr_client::capture::DEFAULT_OUTPUT_PATH;
use netsdr_client::protocol::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use netsdr_client::{CaptureConfig, ClientOptions, NetSdrClient, SampleDepth};
use netsdr_core::{Error, NetSdrEvent};

/// Capture IQ data from a NetSDR receiver.
#[derive(Parser)]
#[command(name = "netsdr-console", version, about)]
struct Cli {
    /// Receiver hostname or IP address.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// TCP control port.
    #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Receiver frequency in Hz.
    #[arg(long, default_value_t = 14_100_000)]
    frequency: u32,

    /// Local UDP port the receiver streams IQ data to.
    #[arg(long, default_value_t = DEFAULT_UDP_PORT)]
    data_port: u16,

    /// Output file for IQ payloads (overwritten).
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Request 24-bit samples instead of 16-bit.
    #[arg(long)]
    bits24: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration: Option<u64>,

    /// Command response timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            command_timeout: Duration::from_millis(self.timeout_ms),
            capture: CaptureConfig {
                port: self.data_port,
                output_path: self.output.clone(),
                ..CaptureConfig::default()
            },
            sample_depth: if self.bits24 {
                SampleDepth::Bits24
            } else {
                SampleDepth::Bits16
            },
            ..ClientOptions::default()
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let client = Arc::new(NetSdrClient::tcp(cli.client_options()));
    let printer = tokio::spawn(print_events(client.subscribe()));

    let result = run(&cli, &client).await;

    if let Err(e) = client.disconnect().await {
        tracing::warn!(error = %e, "Disconnect failed");
    }
    printer.abort();

    if let Err(e) = &result {
        if let Some(control_item) = e.downcast_ref::<Error>().and_then(Error::control_item) {
            eprintln!("Device rejected or failed control item {}", control_item);
        }
    }
    result
}

async fn run(cli: &Cli, client: &NetSdrClient) -> Result<()> {
    client
        .connect(&cli.host, cli.port)
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;

    client
        .set_frequency(cli.frequency)
        .await
        .with_context(|| format!("failed to set frequency to {} Hz", cli.frequency))?;

    client
        .start_iq_transfer()
        .await
        .context("failed to start IQ transfer")?;

    println!(
        "Capturing IQ data to {} at {} Hz",
        cli.output.display(),
        cli.frequency
    );
    match cli.duration {
        Some(secs) => {
            println!("Stopping after {} s (or Ctrl-C)", secs);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            println!("Press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
        }
    }

    let stats = client
        .stop_iq_transfer()
        .await
        .context("failed to stop IQ transfer")?;

    if let Some(stats) = stats {
        println!("Datagrams received:  {}", stats.datagrams);
        println!("Bytes written:       {}", stats.bytes_written);
        println!("Undersized skipped:  {}", stats.undersized);
        println!("Sequence gaps:       {}", stats.sequence_gaps);
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<NetSdrEvent>) {
    loop {
        match events.recv().await {
            Ok(NetSdrEvent::UnsolicitedControl { control_item, data }) => {
                println!("Unsolicited {}: {:02X?}", control_item, data);
            }
            Ok(NetSdrEvent::Connected { addr }) => println!("Connected to {}", addr),
            Ok(NetSdrEvent::Disconnected) => println!("Disconnected"),
            Ok(NetSdrEvent::CaptureStarted { .. }) => {}
            Ok(NetSdrEvent::CaptureStopped { bytes_written }) => {
                println!("Capture stopped after {} bytes", bytes_written);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
