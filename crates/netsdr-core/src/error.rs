//! Error types for the NetSDR client.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Codec, session, transport, and capture
//! errors are all captured here.

use std::fmt;

use crate::types::ControlItem;

/// The I/O phase of a command exchange in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    /// Writing the encoded command frame to the control channel.
    Write,
    /// Reading the response frame from the control channel.
    Read,
}

impl fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandPhase::Write => f.write_str("write"),
            CommandPhase::Read => f.write_str("read"),
        }
    }
}

/// The error type for all NetSDR operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (connection refused, socket bind failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level format error (frame too short, unknown control item).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A frame length does not fit the 13-bit header length field.
    #[error("message length {length} exceeds maximum of 8191 bytes")]
    LengthOutOfRange {
        /// The rejected length in bytes.
        length: usize,
    },

    /// Timed out waiting for the device, a connection, or a capture task.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid argument was passed to a client operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a connection is already open.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The device answered a command with a NAK.
    #[error("command failed: rejected by device (control item {control_item})")]
    CommandRejected {
        /// The control item the rejected command addressed.
        control_item: ControlItem,
    },

    /// A command exchange failed below the protocol layer.
    ///
    /// Carries the phase of the exchange and the underlying cause.
    #[error("command failed during {phase} (control item {control_item}): {source}")]
    CommandFailed {
        /// The control item the failed command addressed.
        control_item: ControlItem,
        /// Which half of the exchange failed.
        phase: CommandPhase,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// `start` was called on a capture pipeline that is already running.
    #[error("capture pipeline is already running")]
    AlreadyRunning,

    /// `start` was called on a capture pipeline that has been stopped.
    ///
    /// Pipelines are single-use; a new one is created for each start cycle.
    #[error("capture pipeline has been stopped")]
    PipelineStopped,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The control item associated with this error, if any.
    pub fn control_item(&self) -> Option<ControlItem> {
        match self {
            Error::CommandRejected { control_item } => Some(*control_item),
            Error::CommandFailed { control_item, .. } => Some(*control_item),
            _ => None,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("header too short".into());
        assert_eq!(e.to_string(), "protocol error: header too short");
    }

    #[test]
    fn error_display_length_out_of_range() {
        let e = Error::LengthOutOfRange { length: 8192 };
        assert_eq!(
            e.to_string(),
            "message length 8192 exceeds maximum of 8191 bytes"
        );
    }

    #[test]
    fn error_display_session_errors() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::AlreadyConnected.to_string(), "already connected");
        assert_eq!(
            Error::AlreadyRunning.to_string(),
            "capture pipeline is already running"
        );
    }

    #[test]
    fn rejected_message_indicates_command_failure() {
        let e = Error::CommandRejected {
            control_item: ControlItem::ReceiverFrequency,
        };
        let msg = e.to_string();
        assert!(msg.starts_with("command failed"), "got: {msg}");
        assert!(msg.contains("ReceiverFrequency"), "got: {msg}");
        assert_eq!(e.control_item(), Some(ControlItem::ReceiverFrequency));
    }

    #[test]
    fn command_failed_carries_source() {
        use std::error::Error as _;

        let e = Error::CommandFailed {
            control_item: ControlItem::ReceiverState,
            phase: CommandPhase::Read,
            source: Box::new(Error::Timeout),
        };
        assert!(e.to_string().contains("during read"));
        let source = e.source().expect("source should be set");
        assert_eq!(source.to_string(), "timeout waiting for response");
        assert_eq!(e.control_item(), Some(ControlItem::ReceiverState));
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
        assert_eq!(e.control_item(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
