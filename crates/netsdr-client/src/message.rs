//! Control message framing.
//!
//! A control message is a header followed by a little-endian control item
//! code and the item's parameter bytes:
//!
//! ```text
//! byte 0-1: header (length = 4 + parameter count, type)
//! byte 2-3: control item code
//! byte 4.. : parameters
//! ```

use bytes::{Buf, BufMut, BytesMut};
use netsdr_core::{ControlItem, Error, Result};

use crate::header::{HEADER_SIZE, MessageHeader, MessageType};

/// Size of the header plus control item code.
pub const CONTROL_PREFIX_SIZE: usize = 4;

/// A framed control message.
///
/// The header length always equals `4 + parameters.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage<T> {
    header: MessageHeader<T>,
    control_item: ControlItem,
    parameters: Vec<u8>,
}

impl<T: MessageType> ControlMessage<T> {
    /// Build a message, computing the header length from the parameters.
    ///
    /// Fails with [`Error::LengthOutOfRange`] when the framed length would
    /// exceed 8191 bytes.
    pub fn new(
        message_type: T,
        control_item: ControlItem,
        parameters: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let parameters = parameters.into();
        let header = MessageHeader::new(CONTROL_PREFIX_SIZE + parameters.len(), message_type)?;
        Ok(Self {
            header,
            control_item,
            parameters,
        })
    }

    pub fn header(&self) -> MessageHeader<T> {
        self.header
    }

    pub fn message_type(&self) -> T {
        self.header.message_type()
    }

    pub fn control_item(&self) -> ControlItem {
        self.control_item
    }

    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }

    /// Encode into wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.header.length());
        buf.put_slice(&self.header.encode());
        buf.put_u16_le(self.control_item.code());
        buf.put_slice(&self.parameters);
        buf.to_vec()
    }

    /// Decode wire bytes.
    ///
    /// Everything after offset 4 is taken as parameters; the declared header
    /// length is recomputed rather than trusted. Fails with
    /// [`Error::Protocol`] when fewer than 4 bytes are supplied or the
    /// control item code is unknown.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < CONTROL_PREFIX_SIZE {
            return Err(Error::Protocol(format!(
                "control message too short: {} bytes (need {})",
                data.len(),
                CONTROL_PREFIX_SIZE
            )));
        }

        let header = MessageHeader::<T>::decode(data)?;
        let control_item = decode_control_item(&data[HEADER_SIZE..CONTROL_PREFIX_SIZE])?;

        Self::new(
            header.message_type(),
            control_item,
            &data[CONTROL_PREFIX_SIZE..],
        )
    }
}

/// Decode a little-endian control item code.
pub(crate) fn decode_control_item(mut bytes: &[u8]) -> Result<ControlItem> {
    let code = bytes.get_u16_le();
    ControlItem::from_code(code)
        .ok_or_else(|| Error::Protocol(format!("unknown control item 0x{:04X}", code)))
}
