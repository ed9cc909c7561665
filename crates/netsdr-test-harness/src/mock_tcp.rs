//! Scripted NetSDR device on a loopback TCP socket.
//!
//! [`MockTcpServer`] accepts a single connection and answers each expected
//! command frame with a scripted reply, so tests can exercise the client
//! through a real `TcpTransport`.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockTcpServer;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // Reject the stop command.
//! server.expect(&[0x08, 0x00, 0x18, 0x00, 0x00, 0x01, 0x00, 0x00], &[0x02, 0x00]);
//! server.start();
//!
//! let port = server.port();
//! // ... connect a client to 127.0.0.1:port and test ...
//! # Ok(())
//! # }
//! ```

use netsdr_core::error::{Error, Result};
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct TcpExpectation {
    /// The exact frame the client must send.
    request: Vec<u8>,
    /// Bytes written back; an empty reply writes nothing.
    response: Vec<u8>,
}

/// A scripted TCP peer standing in for a NetSDR receiver.
///
/// The listener is bound in [`new`](Self::new) and held until
/// [`start`](Self::start) moves it into the server task, so the port cannot
/// be taken by anyone else in between. Expectations are processed in order;
/// a mismatch ends the task with an error reported by [`wait`](Self::wait).
pub struct MockTcpServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    expectations: VecDeque<TcpExpectation>,
    close_after_script: bool,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind to a random free port on 127.0.0.1.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;

        Ok(Self {
            listener: Some(listener),
            local_addr,
            expectations: VecDeque::new(),
            close_after_script: false,
            server_handle: None,
        })
    }

    /// Add an expected request/reply pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Close the connection as soon as the script is exhausted instead of
    /// waiting for the client to hang up.
    pub fn close_after_script(&mut self) {
        self.close_after_script = true;
    }

    /// `host:port` the server listens on.
    pub fn addr(&self) -> String {
        self.local_addr.to_string()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Spawn the server task. It accepts one connection and plays the script.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();
        let close_after_script = self.close_after_script;

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                stream.read_exact(&mut buf).await.map_err(|e| {
                    format!(
                        "expectation {}: client disconnected before sending {} bytes: {}",
                        i,
                        expectation.request.len(),
                        e
                    )
                })?;

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {}: request mismatch: expected {:02X?}, got {:02X?}",
                        i, expectation.request, buf
                    ));
                }

                if !expectation.response.is_empty() {
                    stream
                        .write_all(&expectation.response)
                        .await
                        .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
                    stream
                        .flush()
                        .await
                        .map_err(|e| format!("expectation {}: flush error: {}", i, e))?;
                }
            }

            if !close_after_script {
                // Hold the connection open until the client closes it.
                let mut sink = [0u8; 64];
                loop {
                    match stream.read(&mut sink).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            return Err(format!(
                                "unexpected data after script: {:02X?}",
                                &sink[..n]
                            ));
                        }
                    }
                }
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task and report any script violation.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn plays_script_and_waits_for_close() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x04, 0x20, 0x18, 0x00], &[0x05, 0x00, 0x18, 0x00, 0x01]);
        server.start();

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        stream.write_all(&[0x04, 0x20, 0x18, 0x00]).await.unwrap();

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x00, 0x18, 0x00, 0x01]);

        drop(stream);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_mismatch() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x01, 0x02], &[0x03]);
        server.start();

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        stream.write_all(&[0x09, 0x09]).await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("mismatch"), "got: {err}");
    }

    #[tokio::test]
    async fn closes_after_script_when_asked() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x01], &[]);
        server.close_after_script();
        server.start();

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        stream.write_all(&[0x01]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        server.wait().await.unwrap();
    }
}
