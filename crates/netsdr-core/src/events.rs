//! Asynchronous client event types.
//!
//! Events are published by the device client through a
//! [`tokio::sync::broadcast`] channel. Front-ends subscribe to them instead of
//! registering callbacks, so no subscriber code ever runs on the command path.

use std::path::PathBuf;

use crate::types::ControlItem;

/// An event published by the device client.
///
/// Delivery is best-effort through a bounded broadcast channel; slow
/// consumers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetSdrEvent {
    /// The control channel was opened.
    Connected {
        /// `host:port` of the device.
        addr: String,
    },

    /// The control channel was closed.
    Disconnected,

    /// The device sent an unsolicited control item instead of a reply.
    UnsolicitedControl {
        /// The control item the device reported.
        control_item: ControlItem,
        /// The item's parameter bytes.
        data: Vec<u8>,
    },

    /// An IQ capture pipeline started writing to `path`.
    CaptureStarted {
        /// Output file receiving IQ payloads.
        path: PathBuf,
    },

    /// An IQ capture pipeline stopped.
    CaptureStopped {
        /// Total payload bytes written to the output file.
        bytes_written: u64,
    },
}
