//! Best-effort decoding of frames received on the control channel.
//!
//! Responses from the device may be replies, unsolicited notifications, or
//! bare sentinels such as the NAK. [`parse_message`] classifies a frame
//! without ever failing: too-short input is [`ParseOutcome::Absent`],
//! structurally inconsistent input is [`ParseOutcome::Malformed`].

use netsdr_core::ControlItem;

use crate::header::{HEADER_SIZE, MessageHeader, TargetMessageType};
use crate::message::CONTROL_PREFIX_SIZE;

/// A control message decoded from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub header: MessageHeader<TargetMessageType>,
    pub control_item: ControlItem,
    /// Exactly the parameter bytes covered by the declared header length.
    pub parameters: Vec<u8>,
}

/// Why a frame long enough to carry a control item could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// The header declares more bytes than were received.
    LengthExceedsData { declared: usize, actual: usize },
    /// The control item code is not one this client knows.
    UnknownControlItem(u16),
}

/// Result of [`parse_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Fewer than 4 bytes; there is no control message to look at.
    Absent,
    /// A control message was present but inconsistent.
    Malformed(MalformedReason),
    /// A complete control message.
    Message(ParsedMessage),
}

impl ParseOutcome {
    /// The decoded message, discarding the reason for a miss.
    pub fn into_message(self) -> Option<ParsedMessage> {
        match self {
            ParseOutcome::Message(msg) => Some(msg),
            ParseOutcome::Absent | ParseOutcome::Malformed(_) => None,
        }
    }
}

/// Classify a received frame.
///
/// Bytes beyond the declared header length are ignored. A declared length
/// below 4 yields a message with no parameters.
pub fn parse_message(data: &[u8]) -> ParseOutcome {
    if data.len() < CONTROL_PREFIX_SIZE {
        return ParseOutcome::Absent;
    }

    let header = match MessageHeader::<TargetMessageType>::decode(data) {
        Ok(header) => header,
        Err(_) => return ParseOutcome::Absent,
    };

    if header.length() > data.len() {
        return ParseOutcome::Malformed(MalformedReason::LengthExceedsData {
            declared: header.length(),
            actual: data.len(),
        });
    }

    let code = u16::from_le_bytes([data[HEADER_SIZE], data[HEADER_SIZE + 1]]);
    let Some(control_item) = ControlItem::from_code(code) else {
        return ParseOutcome::Malformed(MalformedReason::UnknownControlItem(code));
    };

    let parameters = data
        .get(CONTROL_PREFIX_SIZE..header.length())
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    ParseOutcome::Message(ParsedMessage {
        header,
        control_item,
        parameters,
    })
}

/// Decode a frame if possible; `None` means "ignore this frame".
pub fn try_parse(data: &[u8]) -> Option<ParsedMessage> {
    parse_message(data).into_message()
}
