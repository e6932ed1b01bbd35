//! Reality AdLib Tracker instrument dump
//!
//! Saves the 18 two-operator voices in the register cache as RAD 1.0
//! instruments, one per channel, so a sound heard in a game can be loaded
//! into the tracker.

use std::fs;
use std::path::{Path, PathBuf};

use super::{ensure_dir, next_capture_path};
use crate::opl3::registers::RegisterFile;
use crate::Result;

/// Build the instrument file contents from a register cache
pub fn rad_instruments(cache: &RegisterFile) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + 2 + 18 * 12 + 2 + 64);
    out.extend_from_slice(b"RAD by REALiTY!!");
    // version 1.0, default speed 6, no description
    out.push(0x10);
    out.push(0x06);

    for i in 0u16..18 {
        let set = (i / 9) * 0x100;
        let base = set + ((i % 9) / 3) * 8 + i % 3;
        out.push(1 + i as u8);
        for reg in [0x23, 0x20, 0x43, 0x40, 0x63, 0x60, 0x83, 0x80] {
            out.push(cache.read(base + reg));
        }
        out.push(cache.read(set + 0xc0 + i % 9));
        out.push(cache.read(base + 0xe3));
        out.push(cache.read(base + 0xe0));
    }

    // end of instruments, one pattern, then padding for the tracker
    out.push(0);
    out.push(1);
    out.extend_from_slice(&[0u8; 64]);
    out
}

/// Write the instruments to a new `.rad` file in `dir`
///
/// # Returns
///
/// Path of the created file
pub fn save_rad<P: AsRef<Path>>(dir: P, cache: &RegisterFile) -> Result<PathBuf> {
    let dir = dir.as_ref();
    ensure_dir(dir)?;
    let path = next_capture_path(dir, "opl_instruments", "rad");
    fs::write(&path, rad_instruments(cache))?;
    log::info!("Saved OPL instruments to {}", path.display());
    Ok(path)
}
