//! OPL register definitions
//!
//! The chip exposes two banks of 256 registers (the second one only on OPL3).
//! Most of them address one of 18 operators or 9 channels per bank; the rest
//! are chip-wide controls. [`Register::from_addr`] decodes a full 9-bit address
//! into what it controls, and [`RegisterFile`] keeps the last byte written to
//! every address for read-back and capture.

use std::fmt;

/// Number of addressable registers on OPL2/OPL3 (two banks)
pub const OPL_REGISTER_COUNT: usize = 0x200;

/// Number of addressable registers on ESFM in native mode
pub const ESFM_REGISTER_COUNT: usize = 0x800;

/// Operator addressed by a per-operator register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorSlot {
    /// Channel index, 0-17 (9-17 live in the second bank)
    pub channel: usize,
    /// Operator within the channel (0 = modulator, 1 = carrier)
    pub operator: usize,
}

impl OperatorSlot {
    /// Index into a flat operator arena of `channels * 2` entries
    pub fn arena_index(&self) -> usize {
        self.channel * 2 + self.operator
    }
}

/// Decoded OPL register address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// 0x101: OPL3 test register
    Test,
    /// 0x01: waveform select enable (bit 5)
    WaveformSelect,
    /// 0x02: timer 1 (80 µs) reload value
    Timer1,
    /// 0x03: timer 2 (320 µs) reload value
    Timer2,
    /// 0x04: timer start/stop, masks and IRQ reset
    TimerControl,
    /// 0x104: four-operator connection enable
    FourOpEnable,
    /// 0x105: OPL3 new mode enable
    NewMode,
    /// 0x08: composite sine mode / note select
    CswNoteSelect,
    /// 0xBD: tremolo/vibrato depth, rhythm enable and drum key-on bits
    Rhythm,
    /// 0x20-0x35: AM, vibrato, sustain type, KSR, multiple
    OperatorModulation(OperatorSlot),
    /// 0x40-0x55: key scale level, total level
    OperatorLevel(OperatorSlot),
    /// 0x60-0x75: attack rate, decay rate
    OperatorAttackDecay(OperatorSlot),
    /// 0x80-0x95: sustain level, release rate
    OperatorSustainRelease(OperatorSlot),
    /// 0xE0-0xF5: waveform select
    OperatorWaveform(OperatorSlot),
    /// 0xA0-0xA8: frequency number low byte
    ChannelFnumLow(usize),
    /// 0xB0-0xB8: key-on, block, frequency number high bits
    ChannelKeyOnBlock(usize),
    /// 0xC0-0xC8: panning, feedback, connection
    ChannelFeedback(usize),
}

impl Register {
    /// Decode a 9-bit register address
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address (0x000-0x1FF); bit 8 selects the second bank
    ///
    /// # Returns
    ///
    /// The decoded register, or `None` for unmapped addresses
    pub fn from_addr(addr: u16) -> Option<Self> {
        if addr >= OPL_REGISTER_COUNT as u16 {
            return None;
        }
        let bank = (addr >> 8) as usize;
        let low = (addr & 0xff) as u8;
        match (bank, low) {
            (0, 0x01) => Some(Register::WaveformSelect),
            (1, 0x01) => Some(Register::Test),
            (0, 0x02) => Some(Register::Timer1),
            (0, 0x03) => Some(Register::Timer2),
            (0, 0x04) => Some(Register::TimerControl),
            (1, 0x04) => Some(Register::FourOpEnable),
            (1, 0x05) => Some(Register::NewMode),
            (0, 0x08) => Some(Register::CswNoteSelect),
            (0, 0xbd) => Some(Register::Rhythm),
            (_, 0x20..=0x35) => operator_slot(bank, low).map(Register::OperatorModulation),
            (_, 0x40..=0x55) => operator_slot(bank, low).map(Register::OperatorLevel),
            (_, 0x60..=0x75) => operator_slot(bank, low).map(Register::OperatorAttackDecay),
            (_, 0x80..=0x95) => operator_slot(bank, low).map(Register::OperatorSustainRelease),
            (_, 0xe0..=0xf5) => operator_slot(bank, low).map(Register::OperatorWaveform),
            (_, 0xa0..=0xa8) => Some(Register::ChannelFnumLow(channel_index(bank, low))),
            (_, 0xb0..=0xb8) => Some(Register::ChannelKeyOnBlock(channel_index(bank, low))),
            (_, 0xc0..=0xc8) => Some(Register::ChannelFeedback(channel_index(bank, low))),
            _ => None,
        }
    }
}

/// Map the low five bits of a per-operator register to its operator
///
/// Each group of 8 offsets covers 3 channels with 2 operators; offsets 6 and 7
/// of every group are holes.
fn operator_slot(bank: usize, low: u8) -> Option<OperatorSlot> {
    let offset = (low & 0x1f) as usize;
    let within = offset & 7;
    if within >= 6 || offset >= 0x16 {
        return None;
    }
    Some(OperatorSlot {
        channel: bank * 9 + (offset >> 3) * 3 + within % 3,
        operator: within / 3,
    })
}

fn channel_index(bank: usize, low: u8) -> usize {
    bank * 9 + (low & 0x0f) as usize
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Test => write!(f, "Test"),
            Register::WaveformSelect => write!(f, "Waveform Select Enable"),
            Register::Timer1 => write!(f, "Timer 1 Reload"),
            Register::Timer2 => write!(f, "Timer 2 Reload"),
            Register::TimerControl => write!(f, "Timer Control"),
            Register::FourOpEnable => write!(f, "Four-Operator Enable"),
            Register::NewMode => write!(f, "OPL3 New Mode"),
            Register::CswNoteSelect => write!(f, "CSW / Note Select"),
            Register::Rhythm => write!(f, "Depth / Rhythm"),
            Register::OperatorModulation(s) => {
                write!(f, "Ch{} Op{} AM/VIB/EGT/KSR/MULT", s.channel, s.operator)
            }
            Register::OperatorLevel(s) => write!(f, "Ch{} Op{} KSL/TL", s.channel, s.operator),
            Register::OperatorAttackDecay(s) => {
                write!(f, "Ch{} Op{} Attack/Decay", s.channel, s.operator)
            }
            Register::OperatorSustainRelease(s) => {
                write!(f, "Ch{} Op{} Sustain/Release", s.channel, s.operator)
            }
            Register::OperatorWaveform(s) => write!(f, "Ch{} Op{} Waveform", s.channel, s.operator),
            Register::ChannelFnumLow(ch) => write!(f, "Ch{ch} F-Number Low"),
            Register::ChannelKeyOnBlock(ch) => write!(f, "Ch{ch} Key-On/Block"),
            Register::ChannelFeedback(ch) => write!(f, "Ch{ch} Feedback/Connection"),
        }
    }
}

/// Last value written to every register address
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterFile {
    values: Vec<u8>,
}

impl RegisterFile {
    /// Create a register file covering both OPL banks
    pub fn new() -> Self {
        Self::with_size(OPL_REGISTER_COUNT)
    }

    /// Create a register file with `size` addresses, all zero
    pub fn with_size(size: usize) -> Self {
        RegisterFile {
            values: vec![0; size],
        }
    }

    /// Read a register value
    ///
    /// Addresses outside the file read as 0xFF, like an undriven bus.
    pub fn read(&self, addr: u16) -> u8 {
        self.values.get(addr as usize).copied().unwrap_or(0xff)
    }

    /// Write a register value; addresses outside the file are ignored
    pub fn write(&mut self, addr: u16, value: u8) {
        if let Some(slot) = self.values.get_mut(addr as usize) {
            *slot = value;
        }
    }

    /// Number of addresses covered
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the file covers no addresses
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All register values
    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }

    /// Zero every register
    pub fn clear(&mut self) {
        self.values.fill(0);
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nonzero = self.values.iter().filter(|&&v| v != 0).count();
        f.debug_struct("RegisterFile")
            .field("len", &self.values.len())
            .field("nonzero", &nonzero)
            .finish()
    }
}
