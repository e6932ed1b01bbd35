//! Low-frequency oscillators and the rhythm noise source
//!
//! All three run off the chip's own sample clock (49716 Hz), not the host
//! output rate. [`LfoUnit`] converts output samples into chip ticks with a
//! fixed-point accumulator and steps tremolo, vibrato and noise once per tick.

use super::tables::{RateTables, LFO_SH, TREMOLO_STEPS};

const LFO_MASK: u32 = (1 << LFO_SH) - 1;

/// Chip ticks between tremolo steps
const TREMOLO_TICKS: u32 = 64;
/// Chip ticks between vibrato steps
const VIBRATO_TICKS: u32 = 1024;

const NOISE_SEED: u32 = 1;
const NOISE_BITS: u32 = 23;

/// 23-bit linear feedback shift register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseGenerator {
    value: u32,
}

impl NoiseGenerator {
    /// Create a generator in its power-on state
    pub fn new() -> Self {
        NoiseGenerator { value: NOISE_SEED }
    }

    /// Shift once
    #[inline]
    pub fn clock(&mut self) {
        let v = self.value;
        let bit = (v ^ (v >> 14) ^ (v >> 15) ^ (v >> 22)) & 1;
        self.value = (v >> 1) | (bit << (NOISE_BITS - 1));
    }

    /// Current output bit
    #[inline]
    pub fn bit(&self) -> u32 {
        self.value & 1
    }

    /// Full register contents
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Return to the power-on seed
    pub fn reset(&mut self) {
        self.value = NOISE_SEED;
    }
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// LFO outputs sampled once per output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LfoState {
    /// Attenuation added to operators with AM enabled
    pub tremolo: u8,
    /// Vibrato position (0-7)
    pub vibrato_position: u8,
    /// Shallow vibrato halves the pitch offset
    pub vibrato_shallow: bool,
    /// Noise bit for the rhythm voices
    pub noise: u32,
}

/// Shared tremolo/vibrato oscillators plus the noise register
#[derive(Debug, Clone)]
pub struct LfoUnit {
    fraction: u32,
    ticks: u32,
    tremolo_position: usize,
    vibrato_position: u8,
    deep_tremolo: bool,
    deep_vibrato: bool,
    noise: NoiseGenerator,
}

impl LfoUnit {
    /// Create an LFO unit at position zero with shallow depths
    pub fn new() -> Self {
        LfoUnit {
            fraction: 0,
            ticks: 0,
            tremolo_position: 0,
            vibrato_position: 0,
            deep_tremolo: false,
            deep_vibrato: false,
            noise: NoiseGenerator::new(),
        }
    }

    /// Set depths from register 0xBD bits 7 (tremolo) and 6 (vibrato)
    pub fn set_depth(&mut self, deep_tremolo: bool, deep_vibrato: bool) {
        self.deep_tremolo = deep_tremolo;
        self.deep_vibrato = deep_vibrato;
    }

    /// Advance by one output sample
    ///
    /// # Returns
    ///
    /// Number of chip ticks that elapsed
    pub fn advance(&mut self, clock_add: u32) -> u32 {
        self.fraction = self.fraction.wrapping_add(clock_add);
        let ticks = self.fraction >> LFO_SH;
        self.fraction &= LFO_MASK;
        for _ in 0..ticks {
            self.tick();
        }
        ticks
    }

    fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % TREMOLO_TICKS == 0 {
            self.tremolo_position = (self.tremolo_position + 1) % TREMOLO_STEPS;
        }
        if self.ticks % VIBRATO_TICKS == 0 {
            self.vibrato_position = (self.vibrato_position + 1) & 7;
        }
        self.noise.clock();
    }

    /// Sample the oscillator outputs
    pub fn state(&self, tables: &RateTables) -> LfoState {
        let shift = if self.deep_tremolo { 2 } else { 4 };
        LfoState {
            tremolo: tables.tremolo(self.tremolo_position) >> shift,
            vibrato_position: self.vibrato_position,
            vibrato_shallow: !self.deep_vibrato,
            noise: self.noise.bit(),
        }
    }

    /// Current tremolo table position
    pub fn tremolo_position(&self) -> usize {
        self.tremolo_position
    }

    /// Noise register
    pub fn noise(&self) -> &NoiseGenerator {
        &self.noise
    }

    /// Return to the power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for LfoUnit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_sequence_is_deterministic() {
        let mut a = NoiseGenerator::new();
        let mut b = NoiseGenerator::new();
        for _ in 0..10_000 {
            a.clock();
            b.clock();
            assert_eq!(a.value(), b.value());
            assert!(a.value() < 1 << 23);
        }
    }

    #[test]
    fn test_noise_first_steps() {
        let mut noise = NoiseGenerator::new();
        // bit 0 set, taps 14/15/22 clear: feedback 1 lands in bit 22
        noise.clock();
        assert_eq!(noise.value(), 1 << 22);
        // taps now read bit 22 only
        noise.clock();
        assert_eq!(noise.value(), (1 << 21) | (1 << 22));
    }

    #[test]
    fn test_noise_never_locks_up() {
        let mut noise = NoiseGenerator::new();
        let mut ones = 0;
        for _ in 0..100_000 {
            noise.clock();
            assert_ne!(noise.value(), 0);
            ones += noise.bit();
        }
        assert!(ones > 0 && ones < 100_000);
    }

    #[test]
    fn test_native_rate_ticks_once_per_sample() {
        let tables = RateTables::new(49716);
        let mut lfo = LfoUnit::new();
        let total: u32 = (0..1000).map(|_| lfo.advance(tables.clock_add())).sum();
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_tremolo_steps_every_64_ticks() {
        let tables = RateTables::new(49716);
        let mut lfo = LfoUnit::new();
        for _ in 0..63 {
            lfo.advance(tables.clock_add());
        }
        assert_eq!(lfo.tremolo_position(), 0);
        lfo.advance(tables.clock_add());
        assert_eq!(lfo.tremolo_position(), 1);
    }

    #[test]
    fn test_depth_shifts_tremolo() {
        let tables = RateTables::new(49716);
        let mut lfo = LfoUnit::new();
        for _ in 0..64 * 105 {
            lfo.advance(tables.clock_add());
        }
        assert_eq!(lfo.tremolo_position(), 105);
        assert_eq!(lfo.state(&tables).tremolo, 105 >> 4);
        lfo.set_depth(true, true);
        let state = lfo.state(&tables);
        assert_eq!(state.tremolo, 105 >> 2);
        assert!(!state.vibrato_shallow);
        assert_eq!(state.vibrato_position, (64 * 105 / 1024) as u8);
    }

    #[test]
    fn test_lower_output_rate_runs_more_ticks() {
        let tables = RateTables::new(22050);
        let mut lfo = LfoUnit::new();
        let total: u32 = (0..22050).map(|_| lfo.advance(tables.clock_add())).sum();
        assert!((49700..=49730).contains(&total));
    }
}
