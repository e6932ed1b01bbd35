//! DRO v2.0 capture writer
//!
//! A capture is armed first and only opens a file on the first note, so
//! programs that initialise the card long before playing do not leave
//! minutes of silence at the start. Each file begins with the register
//! cache (key bits cleared) so it plays back without the setup writes.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{ensure_dir, next_capture_path, ConversionTable, DroHardware, DroHeader};
use crate::opl3::registers::RegisterFile;
use crate::{OplError, Result};

/// Gap after which the current file is closed
pub const MAX_GAP_MS: u32 = 30_000;
/// Size of the pair buffer flushed to disk
const BUFFER_SIZE: usize = 1024;

struct OpenFile {
    file: File,
    path: PathBuf,
}

/// DRO capture writer
pub struct DroCapture {
    dir: PathBuf,
    table: ConversionTable,
    header: DroHeader,
    output: Option<OpenFile>,
    buffer: Vec<u8>,
    last_ticks: u32,
    completed: Vec<PathBuf>,
}

impl DroCapture {
    /// Arm a capture writing into `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        log::info!("Preparing to capture raw OPL output; capturing will start when OPL output starts");
        let table = ConversionTable::new();
        let header = DroHeader::new(table.len() as u8);
        DroCapture {
            dir: dir.as_ref().to_path_buf(),
            table,
            header,
            output: None,
            buffer: Vec::with_capacity(BUFFER_SIZE),
            last_ticks: 0,
            completed: Vec::new(),
        }
    }

    /// Is a file currently open?
    pub fn is_recording(&self) -> bool {
        self.output.is_some()
    }

    /// Header of the current (or last closed) file
    pub fn header(&self) -> &DroHeader {
        &self.header
    }

    /// Path of the file being written
    pub fn current_path(&self) -> Option<&Path> {
        self.output.as_ref().map(|o| o.path.as_path())
    }

    /// Files closed so far
    pub fn completed_files(&self) -> &[PathBuf] {
        &self.completed
    }

    /// Record a data write
    ///
    /// Must run before the cache is updated with `value`, so an unchanged
    /// register can be recognised and skipped.
    ///
    /// # Arguments
    ///
    /// * `reg` - Full register index (bit 8 selects bank 1)
    /// * `value` - Written value
    /// * `ticks` - Host time in milliseconds
    /// * `cache` - Device register cache before this write
    pub fn write(&mut self, reg: u16, value: u8, ticks: u32, cache: &RegisterFile) -> Result<()> {
        let low = (reg & 0xff) as u8;

        if self.output.is_some() {
            if self.table.raw(low).is_none() || cache.read(reg) == value {
                return Ok(());
            }

            let mut passed = ticks.wrapping_sub(self.last_ticks);
            self.last_ticks = ticks;
            self.header.milliseconds = self.header.milliseconds.wrapping_add(passed);

            if passed > MAX_GAP_MS {
                self.close()?;
            } else {
                while passed > 0 {
                    if passed < 257 {
                        self.push(self.header.delay256, (passed - 1) as u8)?;
                        passed = 0;
                    } else {
                        let shift = passed >> 8;
                        passed -= shift << 8;
                        self.push(self.header.delay_shift8, (shift - 1) as u8)?;
                    }
                }
                return self.add_write(reg, value, cache);
            }
        }

        let note_on = (0xb0..=0xb8).contains(&low) && value & 0x20 != 0;
        let percussion_on = low == 0xbd && (value & 0x3f) > 0x20;
        if !(note_on || percussion_on) {
            return Ok(());
        }
        self.open(ticks, cache)?;
        self.add_write(reg, value, cache)
    }

    fn open(&mut self, ticks: u32, cache: &RegisterFile) -> Result<()> {
        ensure_dir(&self.dir)?;
        let path = next_capture_path(&self.dir, "opl_capture", "dro");
        let mut file = File::create(&path).map_err(|e| {
            OplError::CaptureError(format!("Failed to create {}: {}", path.display(), e))
        })?;

        self.header = DroHeader::new(self.table.len() as u8);
        file.write_all(&self.header.to_bytes())?;
        file.write_all(self.table.as_bytes())?;
        log::info!("Capturing raw OPL output to {}", path.display());
        self.output = Some(OpenFile { file, path });
        self.buffer.clear();

        self.write_cache(cache)?;
        self.last_ticks = ticks;
        Ok(())
    }

    /// Replay the cache into the file with every key released
    fn write_cache(&mut self, cache: &RegisterFile) -> Result<()> {
        for i in 0u16..256 {
            let mut value = cache.read(i);
            if (0xb0..=0xb8).contains(&i) {
                value &= !0x20;
            }
            if i == 0xbd {
                value &= !0x1f;
            }
            if value != 0 {
                self.add_write(i, value, cache)?;
            }

            let mut value = cache.read(0x100 + i);
            if (0xb0..=0xb8).contains(&i) {
                value &= !0x20;
            }
            if value != 0 {
                self.add_write(0x100 + i, value, cache)?;
            }
        }
        Ok(())
    }

    fn add_write(&mut self, reg: u16, value: u8, cache: &RegisterFile) -> Result<()> {
        if self.header.hardware != DroHardware::Opl3
            && reg == 0x104
            && value != 0
            && cache.read(0x105) != 0
        {
            self.header.hardware = DroHardware::Opl3;
        }
        if self.header.hardware == DroHardware::Opl2 && (0x1b0..=0x1b8).contains(&reg) && value != 0 {
            self.header.hardware = DroHardware::DualOpl2;
        }

        let Some(mut raw) = self.table.raw((reg & 0xff) as u8) else {
            return Ok(());
        };
        if reg & 0x100 != 0 {
            raw |= 0x80;
        }
        self.push(raw, value)
    }

    fn push(&mut self, raw: u8, value: u8) -> Result<()> {
        self.buffer.push(raw);
        self.buffer.push(value);
        if self.buffer.len() >= BUFFER_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.file.write_all(&self.buffer)?;
            self.header.commands += (self.buffer.len() / 2) as u32;
        }
        self.buffer.clear();
        Ok(())
    }

    /// Flush and finalise the current file, if any
    ///
    /// The capture stays armed; the next note opens a new file.
    pub fn close(&mut self) -> Result<()> {
        let flushed = self.flush();
        let Some(mut output) = self.output.take() else {
            return Ok(());
        };
        flushed?;
        output.file.seek(SeekFrom::Start(0))?;
        output.file.write_all(&self.header.to_bytes())?;
        output.file.flush()?;
        self.completed.push(output.path);
        Ok(())
    }

    /// Close the current file and disarm
    ///
    /// # Returns
    ///
    /// Every file written by this capture
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.close()?;
        log::info!("Stopped capturing raw OPL output");
        Ok(std::mem::take(&mut self.completed))
    }
}

impl Drop for DroCapture {
    fn drop(&mut self) {
        if self.output.is_some() {
            if let Err(e) = self.close() {
                log::warn!("Failed to finalise OPL capture: {e}");
            }
            log::info!("Stopped capturing raw OPL output");
        }
    }
}

impl std::fmt::Debug for DroCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DroCapture")
            .field("dir", &self.dir)
            .field("header", &self.header)
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}
