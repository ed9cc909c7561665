//! UDP data channel.
//!
//! The receiver streams IQ samples as UDP datagrams to a fixed local port
//! (60000 by default). [`UdpTransport`] wraps the bound socket. It does not
//! implement [`Transport`](netsdr_core::Transport): there is no session to
//! open, only datagrams to receive.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_transport::UdpTransport;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let data = UdpTransport::bind("0.0.0.0:60000").await?;
//! let cancel = CancellationToken::new();
//!
//! let mut datagram = vec![0u8; 65536];
//! while let Some(n) = data.recv_until_cancelled(&mut datagram, &cancel).await? {
//!     println!("{} byte IQ packet", n);
//! }
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use netsdr_core::error::{Error, Result};

/// A bound UDP socket for IQ datagrams.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to `addr`, e.g. `"0.0.0.0:60000"`. Port 0 lets the OS choose.
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Could not bind data socket");
                return Err(Error::Transport(format!(
                    "failed to bind UDP socket on {}: {}",
                    addr, e
                )));
            }
        };
        let local_addr = socket.local_addr()?;

        tracing::debug!(local_addr = %local_addr, "Data socket bound");
        Ok(Self { socket, local_addr })
    }

    /// The address actually bound, with the OS-assigned port when 0 was asked.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram. Used to play the receiver in tests and tools.
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket.send_to(data, target).await.map_err(|e| {
            tracing::error!(target = %target, error = %e, "Datagram send failed");
            Error::Io(e)
        })?;
        tracing::trace!(target = %target, bytes = data.len(), "Datagram sent");
        Ok(())
    }

    /// Receive one datagram or fail with [`Error::Timeout`].
    ///
    /// Bytes beyond `buf.len()` are dropped by the OS, so size `buf` for the
    /// largest datagram expected.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        let received = tokio::time::timeout(timeout, self.socket.recv_from(buf))
            .await
            .map_err(|_| Error::Timeout)?;
        self.log_received(received)
    }

    /// Receive one datagram, or `Ok(None)` once `cancel` fires.
    ///
    /// Cancellation is checked first, so a cancelled token never yields a
    /// datagram even if one is already queued.
    pub async fn recv_until_cancelled(
        &self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<Option<usize>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            received = self.socket.recv_from(buf) => {
                self.log_received(received).map(|(n, _)| Some(n))
            }
        }
    }

    fn log_received(
        &self,
        received: std::io::Result<(usize, SocketAddr)>,
    ) -> Result<(usize, SocketAddr)> {
        match received {
            Ok((n, source)) => {
                tracing::trace!(local_addr = %self.local_addr, source = %source, bytes = n, "Datagram received");
                Ok((n, source))
            }
            Err(e) => {
                tracing::error!(local_addr = %self.local_addr, error = %e, "Datagram receive failed");
                Err(Error::Io(e))
            }
        }
    }
}
