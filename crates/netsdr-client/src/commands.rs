//! Receiver command builders.
//!
//! Each builder returns a [`ControlMessage`] ready to be encoded and sent.
//! All functions are pure; the client performs the I/O.

use netsdr_core::{ControlItem, Result};

use crate::header::HostMessageType;
use crate::message::ControlMessage;

/// Receiver state byte 0: complex I/Q capture mode.
const MODE_COMPLEX_IQ: u8 = 0x80;

/// Receiver state byte 1: run.
const STATE_RUN: u8 = 0x02;

/// Receiver state byte 1: stop.
const STATE_STOP: u8 = 0x01;

/// Frequency parameter byte 0: channel selector.
const CHANNEL_1: u8 = 0x00;

/// Sample width of the IQ stream requested from the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleDepth {
    #[default]
    Bits16,
    Bits24,
}

impl SampleDepth {
    /// The receiver state bit-depth flag.
    pub fn flag(self) -> u8 {
        match self {
            SampleDepth::Bits16 => 0x00,
            SampleDepth::Bits24 => 0x80,
        }
    }
}

/// Set the receiver frequency in Hz.
///
/// The device field is 40 bits wide; the top byte is always zero.
pub fn cmd_set_frequency(freq_hz: u32) -> Result<ControlMessage<HostMessageType>> {
    let [f0, f1, f2, f3] = freq_hz.to_le_bytes();
    ControlMessage::new(
        HostMessageType::SetControlItem,
        ControlItem::ReceiverFrequency,
        vec![CHANNEL_1, f0, f1, f2, f3, 0x00],
    )
}

/// Start continuous IQ capture.
pub fn cmd_start_iq_transfer(depth: SampleDepth) -> Result<ControlMessage<HostMessageType>> {
    ControlMessage::new(
        HostMessageType::SetControlItem,
        ControlItem::ReceiverState,
        vec![MODE_COMPLEX_IQ, STATE_RUN, depth.flag(), 0x00],
    )
}

/// Stop IQ capture.
pub fn cmd_stop_iq_transfer() -> Result<ControlMessage<HostMessageType>> {
    ControlMessage::new(
        HostMessageType::SetControlItem,
        ControlItem::ReceiverState,
        vec![0x00, STATE_STOP, 0x00, 0x00],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_frequency_places_le_value_at_offset_5() {
        let frame = cmd_set_frequency(14_100_000).unwrap().encode();
        assert_eq!(frame.len(), 10);
        assert_eq!(&frame[..4], &[0x0A, 0x00, 0x20, 0x00]);
        assert_eq!(frame[4], 0x00);
        let freq = u32::from_le_bytes([frame[5], frame[6], frame[7], frame[8]]);
        assert_eq!(freq, 14_100_000);
        assert_eq!(frame[9], 0x00);
    }

    #[test]
    fn set_frequency_full_range() {
        let frame = cmd_set_frequency(u32::MAX).unwrap().encode();
        assert_eq!(&frame[4..], &[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    }

    #[test]
    fn start_iq_transfer_bytes() {
        let frame = cmd_start_iq_transfer(SampleDepth::Bits16).unwrap().encode();
        assert_eq!(frame, vec![0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x00, 0x00]);

        let frame = cmd_start_iq_transfer(SampleDepth::Bits24).unwrap().encode();
        assert_eq!(frame[4], 0x80);
        assert_eq!(frame[5], 0x02);
        assert_eq!(frame[6], 0x80);
    }

    #[test]
    fn stop_iq_transfer_bytes() {
        let frame = cmd_stop_iq_transfer().unwrap().encode();
        assert_eq!(frame, vec![0x08, 0x00, 0x18, 0x00, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(frame[5], 0x01);
    }

    #[test]
    fn default_depth_is_16_bit() {
        assert_eq!(SampleDepth::default(), SampleDepth::Bits16);
        assert_eq!(SampleDepth::default().flag(), 0x00);
    }
}
