//! IQ capture pipeline.
//!
//! A [`CapturePipeline`] owns the UDP data socket and an output file. Once
//! started it runs a background task that receives IQ datagrams, strips the
//! 4-byte data header (frame header + sequence number), and appends the
//! payload to the file in arrival order.
//!
//! Pipelines are single-use: `Idle` → `Running` → `Stopped`. The device
//! client creates a fresh one for every start of IQ transfer.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_client::capture::{CaptureConfig, CapturePipeline};
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut pipeline = CapturePipeline::bind(CaptureConfig::default()).await?;
//! pipeline.start().await?;
//!
//! tokio::time::sleep(Duration::from_secs(10)).await;
//!
//! let stats = pipeline.stop(Duration::from_secs(5)).await?;
//! println!("wrote {} bytes", stats.bytes_written);
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use netsdr_core::error::{Error, Result};
use netsdr_transport::UdpTransport;

use crate::protocol::{self, DATA_HEADER_SIZE, DEFAULT_UDP_PORT};

/// Largest datagram the receive loop accepts without truncation.
const RECEIVE_BUFFER_SIZE: usize = 65536;

/// Default output file for captured IQ payloads.
pub const DEFAULT_OUTPUT_PATH: &str = "iq_data.bin";

/// Where to listen and where to write.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Local interface to bind the UDP socket on.
    pub bind_host: String,
    /// UDP port the device streams to (0 picks a free port).
    pub port: u16,
    /// Output file; created or truncated on start.
    pub output_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_UDP_PORT,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

/// Lifecycle state of a [`CapturePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Stopped,
}

/// Snapshot of the receive loop's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Datagrams received, including undersized ones.
    pub datagrams: u64,
    /// Payload bytes accepted for writing. File writes complete in the
    /// background, so after a write error this can include the chunk that
    /// failed.
    pub bytes_written: u64,
    /// Datagrams of 4 bytes or fewer that were skipped.
    pub undersized: u64,
    /// Packets whose sequence number did not follow the previous one.
    pub sequence_gaps: u64,
    /// Packets carrying sequence number zero.
    pub transmission_starts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams: AtomicU64,
    bytes_written: AtomicU64,
    undersized: AtomicU64,
    sequence_gaps: AtomicU64,
    transmission_starts: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            undersized: self.undersized.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            transmission_starts: self.transmission_starts.load(Ordering::Relaxed),
        }
    }
}

/// Receives IQ datagrams and writes their payloads to a file.
pub struct CapturePipeline {
    output_path: PathBuf,
    local_addr: SocketAddr,
    /// The bound socket, held until `start` moves it into the receive task.
    socket: Option<UdpTransport>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    counters: Arc<Counters>,
    state: CaptureState,
}

impl CapturePipeline {
    /// Bind the UDP socket. The pipeline is `Idle` until [`start`](Self::start).
    pub async fn bind(config: CaptureConfig) -> Result<Self> {
        let socket = UdpTransport::bind(&format!("{}:{}", config.bind_host, config.port)).await?;
        let local_addr = socket.local_addr();

        tracing::debug!(
            local_addr = %local_addr,
            path = %config.output_path.display(),
            "IQ capture pipeline bound"
        );

        Ok(Self {
            output_path: config.output_path,
            local_addr,
            socket: Some(socket),
            cancel: CancellationToken::new(),
            task: None,
            counters: Arc::new(Counters::default()),
            state: CaptureState::Idle,
        })
    }

    /// Address the UDP socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Current counters; safe to call while running.
    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }

    /// Create or truncate the output file and start the receive loop.
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Running => return Err(Error::AlreadyRunning),
            CaptureState::Stopped => return Err(Error::PipelineStopped),
            CaptureState::Idle => {}
        }

        let file = File::create(&self.output_path).await.map_err(|e| {
            tracing::error!(
                path = %self.output_path.display(),
                error = %e,
                "Failed to create IQ output file"
            );
            Error::Io(e)
        })?;
        let socket = self.socket.take().ok_or(Error::PipelineStopped)?;

        let cancel = self.cancel.clone();
        let counters = Arc::clone(&self.counters);
        self.task = Some(tokio::spawn(async move {
            receive_loop(socket, file, cancel, counters).await
        }));
        self.state = CaptureState::Running;

        tracing::info!(
            local_addr = %self.local_addr,
            path = %self.output_path.display(),
            "IQ capture started"
        );
        Ok(())
    }

    /// Cancel the receive loop and wait up to `deadline` for it to finish.
    ///
    /// A no-op on a pipeline that was never started. Returns the final
    /// counters, or the error that terminated the loop. If the deadline
    /// passes the task is aborted and [`Error::Timeout`] is returned.
    pub async fn stop(&mut self, deadline: Duration) -> Result<CaptureStats> {
        if self.state != CaptureState::Running {
            return Ok(self.stats());
        }

        tracing::debug!(local_addr = %self.local_addr, "Stopping IQ capture");
        self.cancel.cancel();
        self.state = CaptureState::Stopped;

        let Some(mut task) = self.task.take() else {
            return Ok(self.stats());
        };

        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(self.stats()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(Error::Transport(format!("capture task failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    deadline_ms = deadline.as_millis(),
                    "IQ capture did not stop in time, aborting"
                );
                task.abort();
                Err(Error::Timeout)
            }
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if self.task.is_some() {
            tracing::debug!(
                local_addr = %self.local_addr,
                "CapturePipeline dropped while running, cancelling"
            );
        }
        self.cancel.cancel();
    }
}

/// Background task: receive, validate, strip, write.
///
/// The socket and file are dropped when this returns, on every exit path.
async fn receive_loop(
    socket: UdpTransport,
    mut file: File,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) -> Result<()> {
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
    let mut last_sequence: Option<u16> = None;

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }

        let n = match socket.recv_until_cancelled(&mut buf, &cancel).await {
            Ok(Some(n)) => n,
            Ok(None) => break Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Error receiving IQ data");
                break Err(e);
            }
        };
        counters.datagrams.fetch_add(1, Ordering::Relaxed);

        let packet = &buf[..n];
        if n <= DATA_HEADER_SIZE {
            tracing::warn!(bytes = n, "Received packet too small");
            counters.undersized.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        track_sequence(packet, &mut last_sequence, &counters);

        let payload = &packet[DATA_HEADER_SIZE..];
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = file.write_all(payload) => Some(result),
        };
        match written {
            None => break Ok(()),
            Some(Ok(())) => {
                counters
                    .bytes_written
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Error writing IQ data to file");
                break Err(Error::Io(e));
            }
        }
    };

    let flushed = file.flush().await;
    drop(file);
    drop(socket);

    let stats = counters.snapshot();
    tracing::info!(
        datagrams = stats.datagrams,
        bytes_written = stats.bytes_written,
        undersized = stats.undersized,
        sequence_gaps = stats.sequence_gaps,
        "IQ capture stopped"
    );

    match (result, flushed) {
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => {
            tracing::error!(error = %e, "Failed to flush IQ output file");
            Err(Error::Io(e))
        }
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Count transmission starts and sequence discontinuities. No reordering.
fn track_sequence(packet: &[u8], last: &mut Option<u16>, counters: &Counters) {
    let Ok(sequence) = protocol::sequence_number(packet) else {
        return;
    };

    if protocol::is_start_of_transmission(packet) {
        tracing::debug!("IQ start of transmission");
        counters.transmission_starts.fetch_add(1, Ordering::Relaxed);
    } else if let Some(previous) = *last {
        // Zero only marks the first packet; the counter wraps to 1.
        let expected = if previous == u16::MAX { 1 } else { previous + 1 };
        if sequence != expected {
            tracing::debug!(expected, received = sequence, "IQ sequence discontinuity");
            counters.sequence_gaps.fetch_add(1, Ordering::Relaxed);
        }
    }

    *last = Some(sequence);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> CaptureConfig {
        CaptureConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            output_path: dir.path().join("iq.bin"),
        }
    }

    fn data_packet(sequence: u16, payload_len: usize) -> Vec<u8> {
        let mut packet = Vec::with_capacity(DATA_HEADER_SIZE + payload_len);
        let len = (DATA_HEADER_SIZE + payload_len) as u16;
        packet.extend_from_slice(&(len | 0x8000).to_le_bytes());
        packet.extend_from_slice(&sequence.to_le_bytes());
        packet.extend((0..payload_len).map(|i| (i % 256) as u8 ^ sequence as u8));
        packet
    }

    /// Poll the pipeline's counters until `done` holds or two seconds pass.
    async fn wait_for(pipeline: &CapturePipeline, done: impl Fn(&CaptureStats) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !done(&pipeline.stats()) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for capture, stats: {:?}",
                pipeline.stats()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn writes_payload_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();

        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let packet = data_packet(0, 1024);
        sender.send_to(&packet, pipeline.local_addr()).await.unwrap();

        wait_for(&pipeline, |s| s.bytes_written == 1024).await;
        let stats = pipeline.stop(Duration::from_secs(2)).await.unwrap();

        let written = std::fs::read(dir.path().join("iq.bin")).unwrap();
        assert_eq!(written.len(), 1024);
        assert_eq!(written, packet[4..]);
        assert_eq!(stats.datagrams, 1);
        assert_eq!(stats.transmission_starts, 1);
    }

    #[tokio::test]
    async fn appends_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();

        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let first = data_packet(1, 1024);
        let second = data_packet(2, 1024);
        sender.send_to(&first, pipeline.local_addr()).await.unwrap();
        wait_for(&pipeline, |s| s.datagrams == 1).await;
        sender.send_to(&second, pipeline.local_addr()).await.unwrap();

        wait_for(&pipeline, |s| s.bytes_written == 2048).await;
        let stats = pipeline.stop(Duration::from_secs(2)).await.unwrap();

        let written = std::fs::read(dir.path().join("iq.bin")).unwrap();
        assert_eq!(written.len(), 2048);
        assert_eq!(&written[..1024], &first[4..]);
        assert_eq!(&written[1024..], &second[4..]);
        assert_eq!(stats.sequence_gaps, 0);
    }

    #[tokio::test]
    async fn undersized_datagram_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();

        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&[0x02, 0x80], pipeline.local_addr())
            .await
            .unwrap();
        wait_for(&pipeline, |s| s.undersized == 1).await;

        // Header-only datagrams are undersized too.
        sender
            .send_to(&[0x04, 0x80, 0x05, 0x00], pipeline.local_addr())
            .await
            .unwrap();
        wait_for(&pipeline, |s| s.undersized == 2).await;

        // The loop keeps going afterwards.
        let packet = data_packet(3, 16);
        sender.send_to(&packet, pipeline.local_addr()).await.unwrap();
        wait_for(&pipeline, |s| s.bytes_written == 16).await;

        let stats = pipeline.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(stats.datagrams, 3);
        assert_eq!(stats.undersized, 2);

        let written = std::fs::read(dir.path().join("iq.bin")).unwrap();
        assert_eq!(written, packet[4..]);
    }

    #[tokio::test]
    async fn sequence_gaps_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();

        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        for (i, sequence) in [0u16, 1, 2, 5, 6].into_iter().enumerate() {
            sender
                .send_to(&data_packet(sequence, 8), pipeline.local_addr())
                .await
                .unwrap();
            wait_for(&pipeline, |s| s.datagrams == i as u64 + 1).await;
        }

        let stats = pipeline.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(stats.transmission_starts, 1);
        assert_eq!(stats.sequence_gaps, 1);
        assert_eq!(stats.bytes_written, 40);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();

        let result = pipeline.start().await;
        assert!(matches!(result, Err(Error::AlreadyRunning)));

        pipeline.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(pipeline.state(), CaptureState::Stopped);

        let result = pipeline.start().await;
        assert!(matches!(result, Err(Error::PipelineStopped)));
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();

        let stats = pipeline.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stats, CaptureStats::default());
        assert_eq!(pipeline.state(), CaptureState::Idle);
        assert!(!dir.path().join("iq.bin").exists());
    }

    #[tokio::test]
    async fn stop_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();

        pipeline.stop(Duration::from_secs(2)).await.unwrap();
        pipeline.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn start_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iq.bin");
        std::fs::write(&path, vec![0xEE; 4096]).unwrap();

        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        pipeline.start().await.unwrap();
        pipeline.stop(Duration::from_secs(2)).await.unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn stop_releases_the_port() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = CapturePipeline::bind(test_config(&dir)).await.unwrap();
        let addr = pipeline.local_addr();
        pipeline.start().await.unwrap();
        pipeline.stop(Duration::from_secs(2)).await.unwrap();

        let rebound = UdpTransport::bind(&addr.to_string()).await;
        assert!(rebound.is_ok(), "port should be free after stop");
    }

    #[tokio::test]
    async fn start_fails_when_output_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            output_path: dir.path().join("missing").join("iq.bin"),
            ..test_config(&dir)
        };
        let mut pipeline = CapturePipeline::bind(config).await.unwrap();

        let result = pipeline.start().await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(pipeline.state(), CaptureState::Idle);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn write_error_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig {
            output_path: PathBuf::from("/dev/full"),
            ..test_config(&dir)
        };
        let mut pipeline = CapturePipeline::bind(config).await.unwrap();
        pipeline.start().await.unwrap();

        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&data_packet(0, 1024), pipeline.local_addr())
            .await
            .unwrap();
        wait_for(&pipeline, |s| s.datagrams == 1).await;

        // The first write's failure surfaces on the next one.
        sender
            .send_to(&data_packet(1, 1024), pipeline.local_addr())
            .await
            .unwrap();
        wait_for(&pipeline, |s| s.datagrams == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        sender
            .send_to(&data_packet(2, 1024), pipeline.local_addr())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = pipeline.stop(Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Io(_))), "got: {:?}", result);
        assert_eq!(pipeline.state(), CaptureState::Stopped);

        let stats = pipeline.stats();
        assert_eq!(stats.datagrams, 2);
        assert!(stats.bytes_written <= 1024);
    }

    #[test]
    fn sequence_wraps_to_one() {
        let counters = Counters::default();
        let mut last = Some(u16::MAX);
        track_sequence(&data_packet(1, 4), &mut last, &counters);
        assert_eq!(counters.snapshot().sequence_gaps, 0);
        assert_eq!(last, Some(1));
    }
}
