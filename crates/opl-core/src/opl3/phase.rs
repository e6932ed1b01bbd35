//! Operator phase accumulator
//!
//! A 32-bit accumulator whose top 10 bits are the waveform table phase.
//! The increment depends on the channel frequency (fnum, block) and the
//! operator's frequency multiple; vibrato perturbs fnum for one sample at a
//! time without touching the stored increment.

use super::tables::{RateTables, WAVE_SH};

/// Phase accumulator of one operator
#[derive(Debug, Clone, Default)]
pub struct PhaseGenerator {
    index: u32,
    increment: u32,
    freq_mul: u32,
    fnum: u16,
    block: u8,
    vibrato: bool,
}

/// Signed fnum offset for a vibrato position
///
/// # Arguments
///
/// * `fnum` - Channel frequency number (10 bits)
/// * `position` - LFO vibrato position (0-7)
/// * `shallow` - Halve the offset (register 0xBD bit 6 clear)
pub fn vibrato_offset(fnum: u16, position: u8, shallow: bool) -> i32 {
    let mut range = ((fnum >> 7) & 7) as i32;
    if position & 3 == 0 {
        return 0;
    }
    if position & 1 != 0 {
        range >>= 1;
    }
    if shallow {
        range >>= 1;
    }
    if position & 4 != 0 {
        -range
    } else {
        range
    }
}

impl PhaseGenerator {
    /// Create a generator at phase zero with no frequency
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frequency multiple (register 0x20 bits 0-3)
    pub fn set_multiple(&mut self, multiple: u8, tables: &RateTables) {
        self.freq_mul = tables.freq_mul(multiple);
        self.update_increment();
    }

    /// Set the channel frequency
    pub fn set_frequency(&mut self, fnum: u16, block: u8) {
        self.fnum = fnum & 0x3ff;
        self.block = block & 7;
        self.update_increment();
    }

    /// Enable vibrato for this operator (register 0x20 bit 6)
    pub fn set_vibrato(&mut self, enabled: bool) {
        self.vibrato = enabled;
    }

    fn update_increment(&mut self) {
        self.increment = self.increment_for(self.fnum as i32);
    }

    #[inline]
    fn increment_for(&self, fnum: i32) -> u32 {
        let block_fnum = (fnum.max(0) as u32) << self.block;
        block_fnum.wrapping_mul(self.freq_mul)
    }

    /// Stored per-sample increment (without vibrato)
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Restart from phase zero (key-on)
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Advance one sample and return the 10-bit table phase
    #[inline]
    pub fn advance(&mut self, vibrato_position: u8, shallow: bool) -> u32 {
        let step = if self.vibrato {
            let offset = vibrato_offset(self.fnum, vibrato_position, shallow);
            if offset == 0 {
                self.increment
            } else {
                self.increment_for(self.fnum as i32 + offset)
            }
        } else {
            self.increment
        };
        self.index = self.index.wrapping_add(step);
        self.index >> WAVE_SH
    }

    /// Table phase without advancing
    #[inline]
    pub fn table_phase(&self) -> u32 {
        self.index >> WAVE_SH
    }

    /// Raw accumulator
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_scales_with_block_and_multiple() {
        let tables = RateTables::new(49716);
        let mut phase = PhaseGenerator::new();
        phase.set_multiple(1, &tables);
        phase.set_frequency(0x200, 4);
        let base = phase.increment();
        phase.set_frequency(0x200, 5);
        assert_eq!(phase.increment(), base * 2);
        phase.set_multiple(2, &tables);
        assert_eq!(phase.increment(), base * 4);
        phase.set_multiple(0, &tables);
        assert_eq!(phase.increment(), base);
    }

    #[test]
    fn test_pitch_at_native_rate() {
        // fnum 0x244 block 4 is roughly 440 Hz
        let tables = RateTables::new(49716);
        let mut phase = PhaseGenerator::new();
        phase.set_multiple(1, &tables);
        phase.set_frequency(0x244, 4);
        let cycles = phase.increment() as f64 * 49716.0 / 4_294_967_296.0;
        assert!((cycles - 440.0).abs() < 1.0, "{cycles}");
    }

    #[test]
    fn test_phase_wraps() {
        let tables = RateTables::new(49716);
        let mut phase = PhaseGenerator::new();
        phase.set_multiple(15, &tables);
        phase.set_frequency(0x3ff, 7);
        for _ in 0..100_000 {
            assert!(phase.advance(0, false) < 1024);
        }
    }

    #[test]
    fn test_vibrato_offset_table() {
        // fnum high bits 7 -> range 7
        let fnum = 0x3ff;
        let deep: Vec<i32> = (0..8).map(|p| vibrato_offset(fnum, p, false)).collect();
        assert_eq!(deep, vec![0, 3, 7, 3, 0, -3, -7, -3]);
        let shallow: Vec<i32> = (0..8).map(|p| vibrato_offset(fnum, p, true)).collect();
        assert_eq!(shallow, vec![0, 1, 3, 1, 0, -1, -3, -1]);
    }

    #[test]
    fn test_vibrato_is_not_stored() {
        let tables = RateTables::new(49716);
        let mut phase = PhaseGenerator::new();
        phase.set_multiple(1, &tables);
        phase.set_frequency(0x3ff, 3);
        phase.set_vibrato(true);
        let base = phase.increment();
        let first = phase.index();
        phase.advance(2, false);
        assert_eq!(phase.index().wrapping_sub(first), ((0x3ff + 7) << 3) * 4096);
        assert_eq!(phase.increment(), base);
    }
}
