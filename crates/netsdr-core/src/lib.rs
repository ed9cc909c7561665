//! netsdr-core: Core traits, types, and error definitions for the NetSDR client.
//!
//! This crate defines the abstractions shared by the transport, client, and
//! test-harness crates. Applications that only inspect errors or consume
//! notifications can depend on it without pulling in any networking code.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level control channel
//! - [`ControlItem`] -- device-addressable settings
//! - [`NetSdrEvent`] -- asynchronous notifications published by the client
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{CommandPhase, Error, Result};
pub use events::NetSdrEvent;
pub use transport::Transport;
pub use types::*;
