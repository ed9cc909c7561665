//! NetSDR device client.
//!
//! [`NetSdrClient`] owns the control-channel [`Transport`] and the IQ
//! [`CapturePipeline`]. It encodes commands, performs one write and one read
//! per command, interprets NAK and unsolicited replies, and publishes
//! [`NetSdrEvent`]s on a broadcast channel.
//!
//! All session state sits behind a single async mutex. Connect, disconnect,
//! and every command exchange hold it, so at most one command is in flight
//! per client and concurrent callers are served in turn.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};

use netsdr_core::error::{CommandPhase, Error, Result};
use netsdr_core::events::NetSdrEvent;
use netsdr_core::transport::Transport;
use netsdr_core::types::ControlItem;
use netsdr_transport::TcpTransport;

use crate::capture::{CaptureConfig, CapturePipeline, CaptureStats};
use crate::commands::{self, SampleDepth};
use crate::header::{HostMessageType, TargetMessageType};
use crate::message::ControlMessage;
use crate::parser::{self, MalformedReason, ParseOutcome, ParsedMessage};
use crate::protocol::{self, DEFAULT_TCP_PORT};

/// Default command response timeout (2 seconds).
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time allowed for the capture loop to wind down (5 seconds).
const DEFAULT_CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the buffer for the single response read per command.
const RESPONSE_BUFFER_SIZE: usize = 1024;

/// Broadcast channel capacity for event subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Options for configuring a [`NetSdrClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for the response read of each command.
    pub command_timeout: Duration,
    /// Where IQ data is received and written.
    pub capture: CaptureConfig,
    /// Sample width requested when starting IQ transfer.
    pub sample_depth: SampleDepth,
    /// Deadline for the capture loop to stop after cancellation.
    pub capture_stop_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            capture: CaptureConfig::default(),
            sample_depth: SampleDepth::default(),
            capture_stop_timeout: DEFAULT_CAPTURE_STOP_TIMEOUT,
        }
    }
}

/// Field order is drop order: the capture is cancelled before the control
/// channel goes away.
struct Session {
    capture: Option<CapturePipeline>,
    transport: Box<dyn Transport>,
}

/// Client for a NetSDR receiver.
///
/// Construct with a transport and options, then [`connect`](Self::connect).
/// The client can be shared between tasks behind an `Arc`.
pub struct NetSdrClient {
    session: Mutex<Session>,

    /// Connection state flag (atomic for lock-free reads).
    connected: AtomicBool,

    /// Event broadcast channel sender.
    event_tx: broadcast::Sender<NetSdrEvent>,

    options: ClientOptions,
}

impl NetSdrClient {
    /// Create a disconnected client over the given transport.
    pub fn new(transport: impl Transport + 'static, options: ClientOptions) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session: Mutex::new(Session {
                capture: None,
                transport: Box::new(transport),
            }),
            connected: AtomicBool::new(false),
            event_tx,
            options,
        }
    }

    /// Create a disconnected client over TCP with the given options.
    pub fn tcp(options: ClientOptions) -> Self {
        Self::new(TcpTransport::new(), options)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Open the control channel to `host:port`.
    ///
    /// Fails with [`Error::InvalidParameter`] for an empty host and
    /// [`Error::AlreadyConnected`] if a session is open. Transport errors are
    /// returned as-is and leave the client disconnected.
    pub async fn connect(&self, host: &str, port: u16) -> Result<()> {
        if host.trim().is_empty() {
            return Err(Error::InvalidParameter("host must not be empty".into()));
        }

        let mut session = self.session.lock().await;
        if self.connected.load(Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }

        let addr = format!("{}:{}", host, port);
        tracing::info!(addr = %addr, "Connecting to NetSDR");

        if let Err(e) = session.transport.connect(host, port).await {
            tracing::error!(addr = %addr, error = %e, "Connection failed");
            return Err(e);
        }

        self.connected.store(true, Ordering::SeqCst);
        let _ = self.event_tx.send(NetSdrEvent::Connected { addr: addr.clone() });

        tracing::info!(addr = %addr, "Connected to NetSDR");
        Ok(())
    }

    /// Connect on the default control port (50000).
    pub async fn connect_default(&self, host: &str) -> Result<()> {
        self.connect(host, DEFAULT_TCP_PORT).await
    }

    /// Stop any running capture, then close the control channel.
    ///
    /// Disconnecting a disconnected client is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(pipeline) = session.capture.take() {
            // A failed capture shutdown must not keep the session open.
            if let Err(e) = self.finish_capture(pipeline).await {
                tracing::warn!(error = %e, "IQ capture did not stop cleanly");
            }
        }

        if !self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        tracing::debug!("Disconnecting NetSDR client");
        self.connected.store(false, Ordering::SeqCst);
        let closed = session.transport.close().await;

        let _ = self.event_tx.send(NetSdrEvent::Disconnected);
        tracing::info!("Disconnected");
        closed
    }

    /// Tune the receiver to `freq_hz`.
    pub async fn set_frequency(&self, freq_hz: u32) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_connected()?;

        tracing::info!(freq_hz, "Setting frequency");
        let command = commands::cmd_set_frequency(freq_hz)?;
        if let Err(e) = self.exchange(session.transport.as_mut(), &command).await {
            tracing::error!(freq_hz, error = %e, "Failed to set frequency");
            return Err(e);
        }
        Ok(())
    }

    /// Start IQ streaming and, if not already running, the capture pipeline.
    ///
    /// Calling this while a capture is running re-sends the command only.
    pub async fn start_iq_transfer(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_connected()?;

        tracing::info!(depth = ?self.options.sample_depth, "Starting IQ transfer");
        let command = commands::cmd_start_iq_transfer(self.options.sample_depth)?;
        if let Err(e) = self.exchange(session.transport.as_mut(), &command).await {
            tracing::error!(error = %e, "Failed to start IQ transfer");
            return Err(e);
        }

        if session.capture.is_none() {
            let mut pipeline = CapturePipeline::bind(self.options.capture.clone()).await?;
            pipeline.start().await?;

            let path = pipeline.output_path().to_path_buf();
            session.capture = Some(pipeline);
            let _ = self.event_tx.send(NetSdrEvent::CaptureStarted { path });
        }
        Ok(())
    }

    /// Stop IQ streaming and tear down the capture pipeline.
    ///
    /// Returns the final capture counters, or `None` if no capture was
    /// running. If the device rejects the command the pipeline keeps running.
    pub async fn stop_iq_transfer(&self) -> Result<Option<CaptureStats>> {
        let mut session = self.session.lock().await;
        self.ensure_connected()?;

        tracing::info!("Stopping IQ transfer");
        let command = commands::cmd_stop_iq_transfer()?;
        if let Err(e) = self.exchange(session.transport.as_mut(), &command).await {
            tracing::error!(error = %e, "Failed to stop IQ transfer");
            return Err(e);
        }

        match session.capture.take() {
            Some(pipeline) => self.finish_capture(pipeline).await.map(Some),
            None => Ok(None),
        }
    }

    /// Send a control message and interpret the device's reply.
    ///
    /// Returns the decoded reply, or `None` when the device sent nothing,
    /// something undecodable, or an unsolicited notification (which is
    /// published as [`NetSdrEvent::UnsolicitedControl`] instead).
    pub async fn send_command(
        &self,
        message: &ControlMessage<HostMessageType>,
    ) -> Result<Option<ParsedMessage>> {
        let mut session = self.session.lock().await;
        self.ensure_connected()?;
        self.exchange(session.transport.as_mut(), message).await
    }

    /// Subscribe to client events.
    ///
    /// Each receiver gets an independent copy of every event sent after it
    /// was created.
    pub fn subscribe(&self) -> broadcast::Receiver<NetSdrEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the control channel is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether a capture pipeline is running.
    pub async fn is_capturing(&self) -> bool {
        self.session.lock().await.capture.is_some()
    }

    /// Statistics of the running capture, if any.
    pub async fn capture_stats(&self) -> Option<CaptureStats> {
        self.session
            .lock()
            .await
            .capture
            .as_ref()
            .map(CapturePipeline::stats)
    }

    /// Local UDP address of the running capture, if any.
    pub async fn capture_addr(&self) -> Option<SocketAddr> {
        self.session
            .lock()
            .await
            .capture
            .as_ref()
            .map(CapturePipeline::local_addr)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// One write, one read. The caller holds the session lock.
    async fn exchange(
        &self,
        transport: &mut dyn Transport,
        message: &ControlMessage<HostMessageType>,
    ) -> Result<Option<ParsedMessage>> {
        let control_item = message.control_item();
        let frame = message.encode();
        tracing::trace!(control_item = %control_item, "Sending command: {:02X?}", frame);

        transport
            .send(&frame)
            .await
            .map_err(|e| command_failed(control_item, CommandPhase::Write, e))?;

        let mut buf = [0u8; RESPONSE_BUFFER_SIZE];
        let n = transport
            .receive(&mut buf, self.options.command_timeout)
            .await
            .map_err(|e| command_failed(control_item, CommandPhase::Read, e))?;
        let response = &buf[..n];
        tracing::trace!(control_item = %control_item, "Received response: {:02X?}", response);

        if response.is_empty() {
            return Ok(None);
        }

        if protocol::is_nak(response) {
            tracing::warn!(control_item = %control_item, "Device rejected command (NAK)");
            return Err(Error::CommandRejected { control_item });
        }

        match parser::parse_message(response) {
            ParseOutcome::Message(msg)
                if msg.header.message_type() == TargetMessageType::UnsolicitedControlItem =>
            {
                tracing::debug!(
                    control_item = %msg.control_item,
                    bytes = msg.parameters.len(),
                    "Unsolicited control item"
                );
                let _ = self.event_tx.send(NetSdrEvent::UnsolicitedControl {
                    control_item: msg.control_item,
                    data: msg.parameters,
                });
                Ok(None)
            }
            ParseOutcome::Message(msg) => Ok(Some(msg)),
            ParseOutcome::Malformed(MalformedReason::UnknownControlItem(code)) => {
                tracing::warn!(
                    control_item = format_args!("0x{:04X}", code),
                    "Dropping reply for unknown control item"
                );
                Ok(None)
            }
            ParseOutcome::Malformed(reason) => {
                tracing::debug!(?reason, "Ignoring malformed response");
                Ok(None)
            }
            ParseOutcome::Absent => Ok(None),
        }
    }

    async fn finish_capture(&self, mut pipeline: CapturePipeline) -> Result<CaptureStats> {
        let stats = pipeline.stop(self.options.capture_stop_timeout).await?;
        let _ = self.event_tx.send(NetSdrEvent::CaptureStopped {
            bytes_written: stats.bytes_written,
        });
        Ok(stats)
    }
}

impl Default for NetSdrClient {
    fn default() -> Self {
        Self::tcp(ClientOptions::default())
    }
}

/// Dropping a client cancels a running capture before the transport is
/// released. The receive loop's final flush and the release of the UDP port
/// finish on the capture task after `drop` returns; call
/// [`NetSdrClient::stop_iq_transfer`] or [`NetSdrClient::disconnect`] to
/// wait for them.
impl Drop for NetSdrClient {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if let Some(pipeline) = session.capture.take() {
            tracing::debug!(
                local_addr = %pipeline.local_addr(),
                "NetSdrClient dropped while capturing, cancelling capture"
            );
            drop(pipeline);
        }
        if self.connected.load(Ordering::SeqCst) {
            tracing::debug!("NetSdrClient dropped while connected");
        }
    }
}

fn command_failed(control_item: ControlItem, phase: CommandPhase, source: Error) -> Error {
    tracing::error!(control_item = %control_item, %phase, error = %source, "Command failed");
    Error::CommandFailed {
        control_item,
        phase,
        source: Box::new(source),
    }
}
