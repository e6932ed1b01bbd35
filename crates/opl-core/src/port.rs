//! Host port decoding
//!
//! Turns byte writes and reads on the card's four I/O ports into register
//! selections. The decoder only tracks address latches and mode bits; the
//! device applies the resolved writes to timers, engine and cache.

use serde::{Deserialize, Serialize};

/// Which chip the card emulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum OplMode {
    /// Single YM3812
    Opl2,
    /// Two YM3812s, one per stereo side
    DualOpl2,
    /// YMF262
    #[default]
    Opl3,
    /// ESS ESFM in OPL3-compatible mode
    Esfm,
}

impl OplMode {
    /// Parse a mode name as used in configuration files and the CLI
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "opl2" => Some(OplMode::Opl2),
            "dualopl2" | "dual-opl2" | "dual_opl2" => Some(OplMode::DualOpl2),
            "opl3" => Some(OplMode::Opl3),
            "esfm" => Some(OplMode::Esfm),
            _ => None,
        }
    }

    /// True for the modes that expose both register banks
    pub fn is_two_bank(self) -> bool {
        !matches!(self, OplMode::Opl2)
    }
}

impl std::fmt::Display for OplMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OplMode::Opl2 => "OPL2",
            OplMode::DualOpl2 => "Dual OPL2",
            OplMode::Opl3 => "OPL3",
            OplMode::Esfm => "ESFM",
        };
        f.write_str(name)
    }
}

/// ESFM address space mask in native mode
pub const NATIVE_ADDRESS_MASK: u16 = 0x7ff;

/// Outcome of a port write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortWrite {
    /// An address latch was updated
    Latched,
    /// Data for the single chip at the latched register
    Data {
        /// Resolved register (bank 1 has bit 8 set)
        reg: u16,
        /// Written value
        value: u8,
    },
    /// Data for one or both chips of a dual-OPL2 card
    Dual {
        /// Latched register of chip 0 and chip 1; `None` if not addressed
        targets: [Option<u8>; 2],
        /// Written value
        value: u8,
    },
    /// ESFM native-mode data write at the 11-bit latch
    Native {
        /// Latched native address
        reg: u16,
        /// Written value
        value: u8,
    },
    /// ESFM left native mode
    LeftNative,
}

/// What a port read should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRead {
    /// Timer status of a chip
    Status {
        /// Chip index (1 only on the right side of a dual-OPL2 card)
        chip: usize,
        /// OR in 0x06 as the YM3812 does
        opl2_bits: bool,
    },
    /// ESFM native register readback at the latched address
    Native(u16),
    /// Constant value
    Fixed(u8),
}

/// Address latches and mode bits of the card
#[derive(Debug, Clone)]
pub struct PortDecoder {
    mode: OplMode,
    /// Latched register for single-chip modes
    normal: u16,
    /// Latched registers for the two sides of a dual-OPL2 card
    dual: [u8; 2],
    /// Sticky once 0x105 bit 0 is written
    new_mode: bool,
    /// ESFM native mode is active
    native: bool,
}

impl PortDecoder {
    /// Create a decoder in its power-on state
    pub fn new(mode: OplMode) -> Self {
        PortDecoder {
            mode,
            normal: 0,
            dual: [0; 2],
            new_mode: false,
            native: false,
        }
    }

    /// Emulated mode
    pub fn mode(&self) -> OplMode {
        self.mode
    }

    /// Is the ESFM in native mode?
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// Has OPL3 new mode been latched?
    pub fn is_new_mode(&self) -> bool {
        self.new_mode
    }

    /// Currently latched register for single-chip modes
    pub fn latched(&self) -> u16 {
        self.normal
    }

    /// Return to the power-on state
    pub fn reset(&mut self) {
        *self = PortDecoder::new(self.mode);
    }

    /// Latch an address written to an even port
    ///
    /// # Returns
    ///
    /// The resolved register for single-chip modes. Dual-OPL2 returns the
    /// register latched for the addressed side.
    pub fn write_address(&mut self, port: u16, value: u8) -> u16 {
        match self.mode {
            OplMode::Opl2 => {
                self.normal = value as u16;
                self.normal
            }
            OplMode::DualOpl2 => {
                if port & 0x08 == 0 {
                    let index = ((port & 2) >> 1) as usize;
                    self.dual[index] = value;
                    value as u16
                } else {
                    self.dual = [value; 2];
                    value as u16
                }
            }
            OplMode::Opl3 | OplMode::Esfm => {
                let mut reg = value as u16;
                if port & 2 != 0 && (reg == 0x05 || self.new_mode) {
                    reg |= 0x100;
                }
                self.normal = reg & 0x1ff;
                self.normal
            }
        }
    }

    /// Resolve a data byte written to an odd port
    pub fn write_data(&self, port: u16, value: u8) -> PortWrite {
        match self.mode {
            OplMode::DualOpl2 => {
                let targets = if port & 0x08 == 0 {
                    let index = ((port & 2) >> 1) as usize;
                    let mut targets = [None; 2];
                    targets[index] = Some(self.dual[index]);
                    targets
                } else {
                    [Some(self.dual[0]), Some(self.dual[1])]
                };
                PortWrite::Dual { targets, value }
            }
            _ => PortWrite::Data {
                reg: self.normal,
                value,
            },
        }
    }

    /// Decode one port write
    ///
    /// Only the low four bits of `port` matter, so callers can pass either
    /// the absolute port or its offset from the base.
    pub fn write(&mut self, port: u16, value: u8) -> PortWrite {
        if self.native {
            return match port & 3 {
                0 => {
                    self.native = false;
                    PortWrite::LeftNative
                }
                1 => PortWrite::Native {
                    reg: self.normal,
                    value,
                },
                2 => {
                    self.normal = (self.normal & 0x700) | value as u16;
                    PortWrite::Latched
                }
                _ => {
                    self.normal = ((value as u16 & 0x07) << 8) | (self.normal & 0xff);
                    PortWrite::Latched
                }
            };
        }
        if port & 1 != 0 {
            self.write_data(port, value)
        } else {
            self.write_address(port, value);
            PortWrite::Latched
        }
    }

    /// Track mode bits carried by a data write the timers did not consume
    ///
    /// # Returns
    ///
    /// true if this write switched an ESFM into native mode
    pub fn observe_data(&mut self, reg: u16, value: u8) -> bool {
        if reg != 0x105 {
            return false;
        }
        if value & 0x01 != 0 {
            self.new_mode = true;
        }
        if self.mode == OplMode::Esfm && value & 0x80 != 0 {
            self.native = true;
            return true;
        }
        false
    }

    /// Decode one port read
    pub fn read(&self, port: u16) -> PortRead {
        match self.mode {
            OplMode::Opl2 | OplMode::Opl3 => {
                if port & 3 == 0 {
                    PortRead::Status {
                        chip: 0,
                        opl2_bits: self.mode == OplMode::Opl2,
                    }
                } else {
                    PortRead::Fixed(0xff)
                }
            }
            OplMode::DualOpl2 => {
                if port & 1 != 0 {
                    PortRead::Fixed(0xff)
                } else {
                    PortRead::Status {
                        chip: ((port >> 1) & 1) as usize,
                        opl2_bits: true,
                    }
                }
            }
            OplMode::Esfm => match port & 3 {
                0 => PortRead::Status {
                    chip: 0,
                    opl2_bits: false,
                },
                1 if self.native => PortRead::Native(self.normal),
                1 => PortRead::Fixed(0x00),
                _ => PortRead::Fixed(0xff),
            },
        }
    }
}

/// True if a native ESFM address falls in the emulation-mode timer
/// poke-hole at 0x400 (mirrored at 0x600)
pub fn is_poke_hole(reg: u16) -> bool {
    reg & 0x500 == 0x400
}
