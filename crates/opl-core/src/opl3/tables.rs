//! Rate, level and waveform tables
//!
//! Everything the synthesis engine looks up per sample is derived once from the
//! chip clock and the output sample rate. The result is immutable and shared
//! between chip instances through an [`Arc`].

use std::f64::consts::PI;
use std::sync::Arc;

/// Native sample rate of the chip (14.31818 MHz crystal divided by 288)
pub const OPL_RATE: f64 = 14_318_180.0 / 288.0;

/// Shift of the 32-bit phase accumulator down to the 10-bit table phase
pub const WAVE_SH: u32 = 22;

/// Fractional bits of the chip clock accumulator
pub const LFO_SH: u32 = WAVE_SH - 10;

/// Fractional bits of the envelope rate accumulator
pub const RATE_SH: u32 = 24;
/// Mask of the envelope rate accumulator fraction
pub const RATE_MASK: u32 = (1 << RATE_SH) - 1;

/// Maximum envelope attenuation (9 bits, 0.1875 dB per step)
pub const ENV_MAX: i32 = 511;
/// Attenuation at and beyond which an operator produces no audible output
pub const ENV_LIMIT: i32 = (12 * 256) >> 3;

/// Number of positions in the tremolo triangle
pub const TREMOLO_STEPS: usize = 210;

/// Number of envelope rate indices (15 * 4 + 15 key scale steps + 1)
pub const RATE_COUNT: usize = 76;

const KSL_CREATE_TABLE: [u8; 16] = [64, 32, 24, 19, 16, 12, 11, 10, 8, 6, 5, 4, 3, 2, 1, 0];

// Multiples doubled so 0.5 can be represented
const FREQ_CREATE_TABLE: [u8; 16] = [1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 20, 24, 24, 30, 30];

// Samples an attack takes at the native rate, per rate step
const ATTACK_SAMPLES_TABLE: [u8; 13] = [69, 55, 46, 40, 35, 29, 23, 20, 19, 15, 11, 10, 9];

// Envelope increase per rate step
const ENVELOPE_INCREASE_TABLE: [u8; 13] = [4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32];

/// True when an attenuation level is below audibility
#[inline]
pub fn env_silent(level: i32) -> bool {
    level >= ENV_LIMIT
}

/// Immutable lookup tables for one output sample rate
#[derive(Clone)]
pub struct RateTables {
    sample_rate: u32,
    /// Per-multiple phase increment scale (already doubled)
    freq_mul: [u32; 16],
    /// Decay and release increments per rate index
    linear_rates: [u32; RATE_COUNT],
    /// Attack increments, fitted to the native attack durations
    attack_rates: [u32; RATE_COUNT],
    /// Key-scale-level base attenuation by block and fnum high bits
    ksl: [u8; 8 * 16],
    /// -log2(sin) of half a sine period, in 1/256 steps
    log_sin: [u16; 512],
    /// 2^x mantissa, pre-shifted left once
    exp: [u16; 256],
    tremolo: [u8; TREMOLO_STEPS],
    /// Chip clock ticks per output sample in `LFO_SH` fixed point
    clock_add: u32,
}

impl RateTables {
    /// Build the tables for the given output sample rate
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Output sample rate in Hz (the native rate is 49716 Hz)
    ///
    /// # Returns
    ///
    /// Shared table set, ready to hand to any number of chips
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self::build(sample_rate.max(1)))
    }

    fn build(sample_rate: u32) -> Self {
        let scale = OPL_RATE / sample_rate as f64;

        let freq_scale = (0.5 + scale * (1u32 << (WAVE_SH - 1 - 10)) as f64) as u32;
        let mut freq_mul = [0u32; 16];
        for (mul, &factor) in freq_mul.iter_mut().zip(FREQ_CREATE_TABLE.iter()) {
            *mul = freq_scale * factor as u32;
        }

        let mut linear_rates = [0u32; RATE_COUNT];
        for (i, rate) in linear_rates.iter_mut().enumerate() {
            let (index, shift) = envelope_select(i as u8);
            let step = (ENVELOPE_INCREASE_TABLE[index as usize] as u32) << (RATE_SH - shift as u32 - 3);
            *rate = (scale * step as f64) as u32;
        }

        let mut attack_rates = [0u32; RATE_COUNT];
        for (i, rate) in attack_rates.iter_mut().enumerate().take(62) {
            *rate = fit_attack_rate(i as u8, scale);
        }
        for rate in attack_rates.iter_mut().skip(62) {
            *rate = 8 << RATE_SH;
        }

        let mut ksl = [0u8; 8 * 16];
        for oct in 0..8 {
            let base = oct as i32 * 8;
            for (i, &create) in KSL_CREATE_TABLE.iter().enumerate() {
                let val = (base - create as i32).max(0);
                ksl[oct * 16 + i] = (val * 4) as u8;
            }
        }

        let mut log_sin = [0u16; 512];
        for (i, entry) in log_sin.iter_mut().enumerate() {
            let s = ((i as f64 + 0.5) * (PI / 512.0)).sin();
            *entry = (0.5 - s.log2() * 256.0) as u16;
        }

        let mut exp = [0u16; 256];
        for (i, entry) in exp.iter_mut().enumerate() {
            let mantissa = 2.0f64.powf((255 - i) as f64 / 256.0) - 1.0;
            *entry = ((mantissa * 1024.0 + 1024.0) as u16) << 1;
        }

        let mut tremolo = [0u8; TREMOLO_STEPS];
        for (i, entry) in tremolo.iter_mut().enumerate() {
            *entry = if i < TREMOLO_STEPS / 2 { i } else { TREMOLO_STEPS - i } as u8;
        }

        RateTables {
            sample_rate,
            freq_mul,
            linear_rates,
            attack_rates,
            ksl,
            log_sin,
            exp,
            tremolo,
            clock_add: (0.5 + scale * (1u32 << LFO_SH) as f64) as u32,
        }
    }

    /// Output sample rate the tables were built for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Phase increment scale for a multiple register value (0-15)
    #[inline]
    pub fn freq_mul(&self, multiple: u8) -> u32 {
        self.freq_mul[(multiple & 0x0f) as usize]
    }

    /// Decay/release increment for a rate index
    #[inline]
    pub fn linear_rate(&self, index: u8) -> u32 {
        self.linear_rates[(index as usize).min(RATE_COUNT - 1)]
    }

    /// Attack increment for a rate index
    #[inline]
    pub fn attack_rate(&self, index: u8) -> u32 {
        self.attack_rates[(index as usize).min(RATE_COUNT - 1)]
    }

    /// Key-scale-level base attenuation for `(block << 4) | (fnum >> 6)`
    #[inline]
    pub fn ksl_base(&self, index: u16) -> u8 {
        self.ksl[(index & 0x7f) as usize]
    }

    /// Log-sine attenuation of a half-period phase (0-511)
    #[inline]
    pub fn log_sin(&self, phase: u16) -> u16 {
        self.log_sin[(phase & 0x1ff) as usize]
    }

    /// Exponential conversion of a log level into a linear magnitude
    ///
    /// Levels of 0x1000 and above saturate to silence.
    #[inline]
    pub fn exp(&self, level: u32) -> i32 {
        if level >= 0x1000 {
            return 0;
        }
        (self.exp[(level & 0xff) as usize] >> (level >> 8)) as i32
    }

    /// Tremolo attenuation at an LFO position, before depth shifting
    #[inline]
    pub fn tremolo(&self, position: usize) -> u8 {
        self.tremolo[position % TREMOLO_STEPS]
    }

    /// Chip clock ticks per output sample in `LFO_SH` fixed point
    pub fn clock_add(&self) -> u32 {
        self.clock_add
    }
}

impl std::fmt::Debug for RateTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateTables")
            .field("sample_rate", &self.sample_rate)
            .field("clock_add", &self.clock_add)
            .finish_non_exhaustive()
    }
}

/// Split a rate index into an increase-table entry and a sample shift
fn envelope_select(val: u8) -> (u8, u8) {
    if val < 13 * 4 {
        (val & 3, 12 - (val >> 2))
    } else if val < 15 * 4 {
        (val - 12 * 4, 0)
    } else {
        (12, 0)
    }
}

/// Find the attack increment whose simulated duration best matches the
/// native attack length at this sample rate
fn fit_attack_rate(rate_index: u8, scale: f64) -> u32 {
    let (index, shift) = envelope_select(rate_index);
    let original =
        ((((ATTACK_SAMPLES_TABLE[index as usize] as u32) << shift) as f64 / scale) as i64).max(1);
    let mut guess_add = (scale
        * ((ENVELOPE_INCREASE_TABLE[index as usize] as u32) << (RATE_SH - shift as u32 - 3)) as f64)
        as i64;
    let mut best_add = guess_add;
    let mut best_diff = 1i64 << 30;

    for _ in 0..16 {
        let mut volume = ENV_MAX;
        let mut samples = 0i64;
        let mut count = 0u32;
        while volume > 0 && samples < original * 2 {
            count = count.wrapping_add(guess_add as u32);
            let change = (count >> RATE_SH) as i32;
            count &= RATE_MASK;
            if change != 0 {
                volume += (!volume * change) >> 3;
            }
            samples += 1;
        }
        let diff = original - samples;
        if diff.abs() < best_diff {
            best_diff = diff.abs();
            best_add = guess_add;
            if best_diff == 0 {
                break;
            }
        }
        let mul = ((original - diff) << 12) / original;
        if diff < 0 {
            guess_add = ((guess_add * mul) >> 12) + 1;
        } else if diff > 0 {
            guess_add = ((guess_add * mul) >> 12) - 1;
        }
    }
    best_add.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_rate_freq_mul() {
        let tables = RateTables::new(49716);
        // scale ~= 1.0, multiple 1 is stored doubled
        assert_eq!(tables.freq_mul(1), 2 * 2048);
        assert_eq!(tables.freq_mul(0), 2048);
        assert_eq!(tables.freq_mul(11), tables.freq_mul(10));
    }

    #[test]
    fn test_fastest_attack_is_instant() {
        let tables = RateTables::new(44100);
        for index in 62..RATE_COUNT as u8 {
            assert_eq!(tables.attack_rate(index), 8 << RATE_SH);
        }
    }

    #[test]
    fn test_linear_rates_grow_with_index() {
        let tables = RateTables::new(44100);
        for index in 4..RATE_COUNT as u8 {
            assert!(tables.linear_rate(index) >= tables.linear_rate(index - 1));
        }
    }

    #[test]
    fn test_ksl_table_range() {
        let tables = RateTables::new(49716);
        assert_eq!(tables.ksl_base(0), 0);
        // block 7, highest fnum bits: 56 * 4
        assert_eq!(tables.ksl_base(0x7f), 224);
    }

    #[test]
    fn test_tremolo_triangle() {
        let tables = RateTables::new(49716);
        assert_eq!(tables.tremolo(0), 0);
        assert_eq!(tables.tremolo(105), 105);
        assert_eq!(tables.tremolo(209), 1);
    }

    #[test]
    fn test_exp_saturates_to_silence() {
        let tables = RateTables::new(49716);
        assert!(tables.exp(0) > 4000);
        assert_eq!(tables.exp(12 * 256), 0);
        assert_eq!(tables.exp(0x1000), 0);
        assert_eq!(tables.exp(u32::MAX), 0);
    }

    #[test]
    fn test_log_sin_peak_is_zero() {
        let tables = RateTables::new(49716);
        // sin(pi/2) = 1 -> no attenuation
        assert_eq!(tables.log_sin(255), 0);
        assert_eq!(tables.log_sin(256), 0);
        assert!(tables.log_sin(0) > 2000);
    }
}
