//! Transport trait for the NetSDR control channel.
//!
//! The [`Transport`] trait abstracts over the TCP link to the device. The
//! device client operates on a `Transport` rather than directly on a socket,
//! enabling both real hardware control and deterministic unit testing with
//! `MockTransport` from the `netsdr-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level control channel to a device.
///
/// Implementations carry no protocol knowledge: framing, NAK detection, and
/// parsing are handled by the client that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection to `host:port`.
    async fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    /// Send raw bytes to the device.
    ///
    /// Completes once all bytes have been written and flushed.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes read, which is `0` when the device sent
    /// nothing further (peer closed its side). Returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if no data arrives
    /// within `timeout`.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the connection.
    ///
    /// Closing an already-closed transport is a no-op. After `close()`,
    /// `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
