//! # Bus Frame
//!
//! Control word for a dual-channel 12-bit SPI DAC (MCP4822 layout):
//!
//! ```text
//!  15    14    13    12    11 ........................ 0
//! ┌────┬─────┬─────┬──────┬──────────────────────────────┐
//! │ A/B│  x  │ GA  │ SHDN │          D11 .. D0           │
//! └────┴─────┴─────┴──────┴──────────────────────────────┘
//!  A/B  : 0 = channel A, 1 = channel B
//!  GA   : 1 = 1x gain, 0 = 2x gain
//!  SHDN : 1 = output active, 0 = channel shut down
//! ```
//!
//! Data is masked to 12 bits first and then ORed into the header. Adding
//! instead of ORing would let an oversized value carry into the control bits.

/// Number of data bits the DAC accepts.
pub const DATA_BITS: u32 = 12;

/// Mask for the data field.
pub const DATA_MASK: u16 = (1 << DATA_BITS) - 1;

/// Smallest DAC code.
pub const RANGE_MIN: u16 = 0;

/// Largest DAC code.
pub const RANGE_MAX: u16 = DATA_MASK;

/// DAC code for a zero sample (mid-scale).
pub const MID_SCALE: i32 = 1 << (DATA_BITS - 1);

const CHANNEL_BIT: u16 = 1 << 15;
const GAIN_BIT: u16 = 1 << 13;
const POWER_BIT: u16 = 1 << 12;

/// Destination DAC channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DacChannel {
    /// Channel A.
    #[default]
    A,
    /// Channel B.
    B,
}

/// Output gain range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// `Vout = Vref * D / 4096`.
    #[default]
    X1,
    /// `Vout = 2 * Vref * D / 4096`.
    X2,
}

/// Channel power state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Power {
    /// Output driven.
    #[default]
    Active,
    /// Output disabled.
    Shutdown,
}

/// Header bits of a frame: everything except the data field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    /// Destination channel.
    pub channel: DacChannel,
    /// Gain range.
    pub gain: Gain,
    /// Power state.
    pub power: Power,
}

impl FrameHeader {
    /// Header for `channel`, 1x gain, output active.
    pub const fn new(channel: DacChannel) -> Self {
        Self {
            channel,
            gain: Gain::X1,
            power: Power::Active,
        }
    }

    /// Header bits as they appear on the wire.
    pub const fn bits(&self) -> u16 {
        let mut bits = 0;
        if let DacChannel::B = self.channel {
            bits |= CHANNEL_BIT;
        }
        if let Gain::X1 = self.gain {
            bits |= GAIN_BIT;
        }
        if let Power::Active = self.power {
            bits |= POWER_BIT;
        }
        bits
    }

    /// Frame carrying a raw DAC code (masked to 12 bits).
    #[inline(always)]
    pub const fn frame(&self, data: u16) -> BusFrame {
        BusFrame {
            header: *self,
            data: data & DATA_MASK,
        }
    }

    /// Frame carrying a signed sample, offset to mid-scale and clamped to
    /// the DAC range.
    #[inline(always)]
    pub fn frame_sample(&self, sample: i16) -> BusFrame {
        self.frame(sample_to_code(sample))
    }
}

/// One word on the shared bus: header plus data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusFrame {
    header: FrameHeader,
    data: u16,
}

impl BusFrame {
    /// Frame for `channel` with 1x gain, output active, data masked to 12 bits.
    pub const fn new(channel: DacChannel, data: u16) -> Self {
        FrameHeader::new(channel).frame(data)
    }

    /// Header part.
    pub const fn header(&self) -> FrameHeader {
        self.header
    }

    /// Data part, already masked.
    pub const fn data(&self) -> u16 {
        self.data
    }

    /// The 16-bit word to transmit.
    #[inline(always)]
    pub const fn word(&self) -> u16 {
        self.header.bits() | self.data
    }

    /// Split a received or logged word back into header and data.
    pub const fn decode(word: u16) -> Self {
        let channel = if word & CHANNEL_BIT != 0 {
            DacChannel::B
        } else {
            DacChannel::A
        };
        let gain = if word & GAIN_BIT != 0 { Gain::X1 } else { Gain::X2 };
        let power = if word & POWER_BIT != 0 {
            Power::Active
        } else {
            Power::Shutdown
        };
        Self {
            header: FrameHeader {
                channel,
                gain,
                power,
            },
            data: word & DATA_MASK,
        }
    }
}

/// Offset-binary DAC code for a signed sample, clamped to `RANGE_MIN..=RANGE_MAX`.
#[inline(always)]
pub fn sample_to_code(sample: i16) -> u16 {
    let code = i32::from(sample) + MID_SCALE;
    code.clamp(i32::from(RANGE_MIN), i32::from(RANGE_MAX)) as u16
}
