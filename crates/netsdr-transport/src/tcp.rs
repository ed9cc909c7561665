//! TCP control channel.
//!
//! [`TcpTransport`] carries command frames to the receiver's control port
//! (50000 by default) and reads its replies. It starts disconnected and is
//! opened through [`Transport::connect`], so a device client can own one
//! transport across several sessions.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_transport::TcpTransport;
//! use netsdr_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut control = TcpTransport::new();
//! control.connect("192.168.1.50", 50000).await?;
//!
//! // Ask for the current receiver state.
//! control.send(&[0x04, 0x20, 0x18, 0x00]).await?;
//!
//! let mut reply = [0u8; 1024];
//! let len = control.receive(&mut reply, Duration::from_secs(2)).await?;
//! println!("{:02X?}", &reply[..len]);
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::Transport;

/// How long `connect` waits for the receiver to accept.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Control-channel transport over TCP.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// `host:port` of the current or most recent session.
    endpoint: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            stream: None,
            endpoint: String::new(),
            connect_timeout,
        }
    }

    /// `host:port` of the current or most recent session; empty before the
    /// first connect.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let endpoint = format!("{}:{}", host, port);
        tracing::debug!(
            endpoint = %endpoint,
            timeout_ms = self.connect_timeout.as_millis(),
            "Opening control channel"
        );

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Control channel connect failed");
                return Err(connect_error(e, &endpoint));
            }
            Err(_) => {
                tracing::error!(endpoint = %endpoint, "Control channel connect timed out");
                return Err(Error::Timeout);
            }
        };

        // One small frame per command; Nagle would only add latency.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(endpoint = %endpoint, error = %e, "Could not disable Nagle");
        }

        tracing::info!(endpoint = %endpoint, "Control channel open");
        self.stream = Some(stream);
        self.endpoint = endpoint;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;

        let mut written = stream.write_all(data).await;
        if written.is_ok() {
            written = stream.flush().await;
        }

        match written {
            Ok(()) => {
                tracing::trace!(endpoint = %self.endpoint, "tx {:02X?}", data);
                Ok(())
            }
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Control channel write failed");
                Err(session_error(e))
            }
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream_mut()?;

        let read = match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(read) => read,
            Err(_) => {
                tracing::trace!(
                    endpoint = %self.endpoint,
                    timeout_ms = timeout.as_millis(),
                    "No reply within timeout"
                );
                return Err(Error::Timeout);
            }
        };

        match read {
            Ok(0) => {
                tracing::warn!(endpoint = %self.endpoint, "Receiver closed the control channel");
                Ok(0)
            }
            Ok(n) => {
                tracing::trace!(endpoint = %self.endpoint, "rx {:02X?}", &buf[..n]);
                Ok(n)
            }
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Control channel read failed");
                Err(session_error(e))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        // The peer may already be gone; a failed shutdown still ends the session.
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "Shutdown failed");
        }
        tracing::info!(endpoint = %self.endpoint, "Control channel closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(endpoint = %self.endpoint, "TcpTransport dropped while open");
        }
    }
}

fn connect_error(e: std::io::Error, endpoint: &str) -> Error {
    if e.kind() == ErrorKind::ConnectionRefused {
        Error::Transport(format!("connection refused: {}", endpoint))
    } else {
        Error::Io(e)
    }
}

fn session_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const STATE_REQUEST: [u8; 4] = [0x04, 0x20, 0x18, 0x00];
    const STATE_REPLY: [u8; 8] = [0x08, 0x00, 0x18, 0x00, 0x80, 0x01, 0x00, 0x00];

    /// Accept connections and hold them open without ever answering.
    async fn silent_device() -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (port, task)
    }

    async fn open(port: u16) -> TcpTransport {
        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", port).await.unwrap();
        transport
    }

    #[tokio::test]
    async fn request_and_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4];
            stream.read_exact(&mut request).await.unwrap();
            assert_eq!(request, STATE_REQUEST);
            stream.write_all(&STATE_REPLY).await.unwrap();
        });

        let mut transport = TcpTransport::new();
        assert!(!transport.is_connected());
        assert_eq!(transport.endpoint(), "");

        transport.connect("127.0.0.1", port).await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.endpoint(), format!("127.0.0.1:{}", port));

        transport.send(&STATE_REQUEST).await.unwrap();
        let mut reply = [0u8; 1024];
        let n = transport
            .receive(&mut reply, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&reply[..n], &STATE_REPLY);

        transport.close().await.unwrap();
        device.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut transport = TcpTransport::new();
        match transport.connect("127.0.0.1", port).await {
            Err(Error::Transport(msg)) => assert!(msg.contains("connection refused"), "{msg}"),
            other => panic!("expected refused Transport error, got: {:?}", other),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (port, device) = silent_device().await;
        let mut transport = open(port).await;

        let result = transport.connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(Error::AlreadyConnected)));

        transport.close().await.unwrap();
        device.abort();
    }

    #[tokio::test]
    async fn silent_receiver_times_out() {
        let (port, device) = silent_device().await;
        let mut transport = open(port).await;

        let mut reply = [0u8; 16];
        let result = transport
            .receive(&mut reply, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        device.abort();
    }

    #[tokio::test]
    async fn hang_up_reads_as_zero_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
        });

        let mut transport = open(port).await;
        device.await.unwrap();

        let mut reply = [0u8; 16];
        let n = transport
            .receive(&mut reply, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn closed_transport_refuses_io() {
        let (port, device) = silent_device().await;
        let mut transport = open(port).await;

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        assert!(matches!(
            transport.send(&STATE_REQUEST).await,
            Err(Error::NotConnected)
        ));
        let mut reply = [0u8; 16];
        assert!(matches!(
            transport.receive(&mut reply, Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));

        device.abort();
    }

    #[tokio::test]
    async fn reopen_after_close() {
        let (port, device) = silent_device().await;
        let mut transport = open(port).await;

        transport.close().await.unwrap();
        transport.connect("127.0.0.1", port).await.unwrap();
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        device.abort();
    }
}
