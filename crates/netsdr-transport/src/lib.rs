//! Transport implementations for the NetSDR client.
//!
//! - [`TcpTransport`]: the TCP control channel, implementing the
//!   [`Transport`](netsdr_core::Transport) trait from `netsdr-core`
//! - [`UdpTransport`]: the UDP data channel carrying IQ sample datagrams
//!
//! # Example
//!
//! ```no_run
//! use netsdr_transport::TcpTransport;
//! use netsdr_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut transport = TcpTransport::new();
//! transport.connect("192.168.1.50", 50000).await?;
//!
//! // Set receiver frequency to 14.1 MHz
//! transport
//!     .send(&[0x0A, 0x00, 0x20, 0x00, 0x00, 0x20, 0x26, 0xD7, 0x00, 0x00])
//!     .await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;
