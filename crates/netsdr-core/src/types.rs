//! Shared protocol types.

use std::fmt;

/// Device-addressable settings, each identified by a fixed 16-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlItem {
    /// Receiver run/stop state and capture mode.
    ReceiverState = 0x0018,
    /// Receiver NCO frequency.
    ReceiverFrequency = 0x0020,
    /// RF filter selection.
    RfFilter = 0x0044,
    /// A/D converter modes.
    AdModes = 0x008A,
    /// IQ output data sample rate.
    IqOutputDataSampleRate = 0x00B8,
}

impl ControlItem {
    /// All known control items.
    pub const ALL: [ControlItem; 5] = [
        ControlItem::ReceiverState,
        ControlItem::ReceiverFrequency,
        ControlItem::RfFilter,
        ControlItem::AdModes,
        ControlItem::IqOutputDataSampleRate,
    ];

    /// The 16-bit wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a control item by its wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.code() == code)
    }
}

impl fmt::Display for ControlItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:04X})", self, self.code())
    }
}
