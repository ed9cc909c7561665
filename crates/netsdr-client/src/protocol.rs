//! Protocol constants and stateless helpers over raw frames.
//!
//! Nothing here performs I/O; the client and capture pipeline call these on
//! bytes they have already read.

use netsdr_core::{Error, Result};

use crate::header::{self, HostMessageType, MessageType};

/// Default TCP control port.
pub const DEFAULT_TCP_PORT: u16 = 50000;

/// Default UDP port the device streams IQ data to.
pub const DEFAULT_UDP_PORT: u16 = 60000;

/// Bytes preceding the payload of an IQ data packet (header + sequence number).
pub const DATA_HEADER_SIZE: usize = 4;

/// The 2-byte NAK the device sends for commands it rejects.
pub const NAK: [u8; 2] = [0x02, 0x00];

/// Returns `true` if `data` is exactly the NAK sentinel.
pub fn is_nak(data: &[u8]) -> bool {
    data == NAK.as_slice()
}

/// Build the 3-byte acknowledgement for a data item.
pub fn build_ack(data_item: u8) -> [u8; 3] {
    let [lo, hi] = header::pack(3, HostMessageType::DataItemAck.code());
    [lo, hi, data_item]
}

/// Returns `true` if `data` is a data packet with sequence number zero.
pub fn is_start_of_transmission(data: &[u8]) -> bool {
    data.len() >= DATA_HEADER_SIZE && data[2] == 0x00 && data[3] == 0x00
}

/// Extract the little-endian sequence number from a data packet.
pub fn sequence_number(data: &[u8]) -> Result<u16> {
    if data.len() < DATA_HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "data packet too short for sequence number: {} bytes",
            data.len()
        )));
    }
    Ok(u16::from_le_bytes([data[2], data[3]]))
}
