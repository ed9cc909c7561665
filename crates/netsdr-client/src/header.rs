//! NetSDR frame header encoder/decoder.
//!
//! Every control-channel message and every UDP data packet starts with a
//! 2-byte little-endian header packing a 13-bit length and a 3-bit type:
//!
//! ```text
//!  15  14  13  12                                0
//! +---+---+---+-----------------------------------+
//! |   type    |              length               |
//! +---+---+---+-----------------------------------+
//! ```
//!
//! The same 3-bit type code means different things depending on direction,
//! so the type is modelled as two enumerations, [`HostMessageType`] for
//! frames the host sends and [`TargetMessageType`] for frames the device
//! sends, and [`MessageHeader`] is generic over the direction.

use std::fmt::Debug;

use netsdr_core::{Error, Result};

/// Largest value the 13-bit header length field can carry.
pub const MAX_MESSAGE_LENGTH: usize = 0x1FFF;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 2;

const LENGTH_MASK: u16 = 0x1FFF;
const TYPE_SHIFT: u16 = 13;
const TYPE_MASK: u8 = 0x07;

/// A 3-bit frame type for one direction of the protocol.
pub trait MessageType: Copy + Eq + Debug + Send + Sync + 'static {
    /// The 3-bit wire code.
    fn code(self) -> u8;

    /// Decode a wire code. Only the low 3 bits are considered, so every
    /// input maps to a variant.
    fn from_code(code: u8) -> Self;
}

/// Frame types sent from the host to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostMessageType {
    SetControlItem,
    RequestControlItem,
    RequestControlItemRange,
    DataItemAck,
    DataItem0,
    DataItem1,
    DataItem2,
    DataItem3,
}

/// Frame types sent from the device to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetMessageType {
    /// Reply to a set or request control item command.
    ResponseToSetOrRequest,
    /// The device reports a control item change on its own.
    UnsolicitedControlItem,
    ResponseToRange,
    DataItemAck,
    DataItem0,
    DataItem1,
    DataItem2,
    DataItem3,
}

impl MessageType for HostMessageType {
    fn code(self) -> u8 {
        match self {
            HostMessageType::SetControlItem => 0b000,
            HostMessageType::RequestControlItem => 0b001,
            HostMessageType::RequestControlItemRange => 0b010,
            HostMessageType::DataItemAck => 0b011,
            HostMessageType::DataItem0 => 0b100,
            HostMessageType::DataItem1 => 0b101,
            HostMessageType::DataItem2 => 0b110,
            HostMessageType::DataItem3 => 0b111,
        }
    }

    fn from_code(code: u8) -> Self {
        match code & TYPE_MASK {
            0b000 => HostMessageType::SetControlItem,
            0b001 => HostMessageType::RequestControlItem,
            0b010 => HostMessageType::RequestControlItemRange,
            0b011 => HostMessageType::DataItemAck,
            0b100 => HostMessageType::DataItem0,
            0b101 => HostMessageType::DataItem1,
            0b110 => HostMessageType::DataItem2,
            _ => HostMessageType::DataItem3,
        }
    }
}

impl MessageType for TargetMessageType {
    fn code(self) -> u8 {
        match self {
            TargetMessageType::ResponseToSetOrRequest => 0b000,
            TargetMessageType::UnsolicitedControlItem => 0b001,
            TargetMessageType::ResponseToRange => 0b010,
            TargetMessageType::DataItemAck => 0b011,
            TargetMessageType::DataItem0 => 0b100,
            TargetMessageType::DataItem1 => 0b101,
            TargetMessageType::DataItem2 => 0b110,
            TargetMessageType::DataItem3 => 0b111,
        }
    }

    fn from_code(code: u8) -> Self {
        match code & TYPE_MASK {
            0b000 => TargetMessageType::ResponseToSetOrRequest,
            0b001 => TargetMessageType::UnsolicitedControlItem,
            0b010 => TargetMessageType::ResponseToRange,
            0b011 => TargetMessageType::DataItemAck,
            0b100 => TargetMessageType::DataItem0,
            0b101 => TargetMessageType::DataItem1,
            0b110 => TargetMessageType::DataItem2,
            _ => TargetMessageType::DataItem3,
        }
    }
}

/// A decoded 2-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader<T> {
    length: u16,
    message_type: T,
}

impl<T: MessageType> MessageHeader<T> {
    /// Create a header, rejecting lengths that do not fit 13 bits.
    pub fn new(length: usize, message_type: T) -> Result<Self> {
        if length > MAX_MESSAGE_LENGTH {
            return Err(Error::LengthOutOfRange { length });
        }
        Ok(Self {
            length: length as u16,
            message_type,
        })
    }

    /// Total frame length in bytes, including the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// The frame type.
    pub fn message_type(&self) -> T {
        self.message_type
    }

    /// Encode into the 2-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        pack(self.length, self.message_type.code())
    }

    /// Decode the first two bytes of `bytes`.
    ///
    /// Stray high bits in the type field are truncated; decoding only fails
    /// when fewer than two bytes are supplied.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "header too short: {} bytes (need {})",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let value = u16::from_le_bytes([bytes[0], bytes[1]]);
        Ok(Self {
            length: value & LENGTH_MASK,
            message_type: T::from_code((value >> TYPE_SHIFT) as u8),
        })
    }
}

/// Pack a length and type code into the wire form.
///
/// Callers guarantee `length` fits 13 bits.
pub(crate) fn pack(length: u16, type_code: u8) -> [u8; HEADER_SIZE] {
    let value = (length & LENGTH_MASK) | (u16::from(type_code & TYPE_MASK) << TYPE_SHIFT);
    value.to_le_bytes()
}
