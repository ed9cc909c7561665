//! netsdr-client: NetSDR protocol codec, device client, and IQ capture.
//!
//! # Layers
//!
//! - [`header`] -- the 2-byte length/type frame prefix
//! - [`message`] -- control message framing
//! - [`protocol`] -- constants and stateless helpers (NAK, ACK, sequence numbers)
//! - [`parser`] -- best-effort decoding of received frames
//! - [`commands`] -- receiver command builders
//! - [`client`] -- [`NetSdrClient`], the command/response state machine
//! - [`capture`] -- [`CapturePipeline`], the UDP receive-and-write loop
//!
//! # Example
//!
//! ```no_run
//! use netsdr_client::{ClientOptions, NetSdrClient};
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let client = NetSdrClient::tcp(ClientOptions::default());
//! client.connect_default("192.168.1.50").await?;
//! client.set_frequency(14_100_000).await?;
//! client.start_iq_transfer().await?;
//!
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//! if let Some(stats) = client.stop_iq_transfer().await? {
//!     println!("captured {} bytes", stats.bytes_written);
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod client;
pub mod commands;
pub mod header;
pub mod message;
pub mod parser;
pub mod protocol;

pub use capture::{CaptureConfig, CapturePipeline, CaptureState, CaptureStats};
pub use client::{ClientOptions, NetSdrClient};
pub use commands::SampleDepth;
pub use header::{HostMessageType, MessageHeader, MessageType, TargetMessageType};
pub use message::ControlMessage;
pub use parser::{ParseOutcome, ParsedMessage, parse_message, try_parse};
