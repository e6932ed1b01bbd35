//! Register stream capture
//!
//! - `dro` - DOSBox Raw OPL v2.0 writer fed from the device's data writes
//! - `reader` - DRO v2.0 parser used for playback and verification
//! - `rad` - Reality AdLib Tracker instrument dump of the register cache

pub mod dro;
pub mod rad;
pub mod reader;

use num_derive::FromPrimitive;
use std::fs;
use std::path::{Path, PathBuf};

pub use dro::DroCapture;
pub use rad::save_rad;
pub use reader::{parse_dro, DroEvent, DroSong};

/// File magic of a DRO capture
pub const DRO_MAGIC: &[u8; 8] = b"DBRAWOPL";
/// Size of the v2.0 header in bytes
pub const DRO_HEADER_SIZE: usize = 26;

/// Hardware recorded in the DRO header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, FromPrimitive)]
#[repr(u8)]
pub enum DroHardware {
    /// Single OPL2
    #[default]
    Opl2 = 0,
    /// Two OPL2s, bank 1 is the right chip
    DualOpl2 = 1,
    /// OPL3
    Opl3 = 2,
}

/// DRO v2.0 file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroHeader {
    /// Major version (2)
    pub version_high: u16,
    /// Minor version (0)
    pub version_low: u16,
    /// Number of (raw, value) pairs after the table, delays included
    pub commands: u32,
    /// Song length in milliseconds
    pub milliseconds: u32,
    /// Target hardware
    pub hardware: DroHardware,
    /// Data format (0 = interleaved pairs)
    pub format: u8,
    /// Compression (0 = none)
    pub compression: u8,
    /// Raw code for a 1-256 ms delay
    pub delay256: u8,
    /// Raw code for a `(n + 1) << 8` ms delay
    pub delay_shift8: u8,
    /// Number of entries in the conversion table
    pub table_size: u8,
}

impl DroHeader {
    /// Fresh header for a table of `table_size` entries
    pub fn new(table_size: u8) -> Self {
        DroHeader {
            version_high: 2,
            version_low: 0,
            commands: 0,
            milliseconds: 0,
            hardware: DroHardware::Opl2,
            format: 0,
            compression: 0,
            delay256: table_size,
            delay_shift8: table_size.wrapping_add(1),
            table_size,
        }
    }

    /// Serialize to the little-endian on-disk layout
    pub fn to_bytes(&self) -> [u8; DRO_HEADER_SIZE] {
        let mut out = [0u8; DRO_HEADER_SIZE];
        out[0..8].copy_from_slice(DRO_MAGIC);
        out[8..10].copy_from_slice(&self.version_high.to_le_bytes());
        out[10..12].copy_from_slice(&self.version_low.to_le_bytes());
        out[12..16].copy_from_slice(&self.commands.to_le_bytes());
        out[16..20].copy_from_slice(&self.milliseconds.to_le_bytes());
        out[20] = self.hardware as u8;
        out[21] = self.format;
        out[22] = self.compression;
        out[23] = self.delay256;
        out[24] = self.delay_shift8;
        out[25] = self.table_size;
        out
    }
}

/// Mapping between register indices and DRO raw codes
#[derive(Debug, Clone)]
pub struct ConversionTable {
    to_raw: [u8; 256],
    to_reg: Vec<u8>,
}

impl ConversionTable {
    /// Build the table of every register worth recording
    ///
    /// Global registers come first, then the five per-operator groups for
    /// each operator offset, then A0/B0/C0 for each channel.
    pub fn new() -> Self {
        let mut table = ConversionTable {
            to_raw: [0xff; 256],
            to_reg: Vec::with_capacity(128),
        };
        for reg in [0x01, 0x04, 0x05, 0x08, 0xbd] {
            table.add(reg);
        }
        for i in (0u8..24).filter(|i| i & 7 < 6) {
            for group in [0x20, 0x40, 0x60, 0x80, 0xe0] {
                table.add(group + i);
            }
        }
        for i in 0u8..9 {
            for group in [0xa0, 0xb0, 0xc0] {
                table.add(group + i);
            }
        }
        table
    }

    fn add(&mut self, reg: u8) {
        self.to_raw[reg as usize] = self.to_reg.len() as u8;
        self.to_reg.push(reg);
    }

    /// Raw code of a register, `None` if it is not recorded
    pub fn raw(&self, reg: u8) -> Option<u8> {
        match self.to_raw[reg as usize] {
            0xff => None,
            raw => Some(raw),
        }
    }

    /// Table as written after the header (raw code to register)
    pub fn as_bytes(&self) -> &[u8] {
        &self.to_reg
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.to_reg.len()
    }

    /// True if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.to_reg.is_empty()
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// First unused `<stem>_NNNN.<extension>` path in `dir`
pub(crate) fn next_capture_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let mut index = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{index:04}.{extension}"));
        if !candidate.exists() || index == u32::MAX {
            return candidate;
        }
        index += 1;
    }
}

/// Create the capture directory if needed
pub(crate) fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}
