//! Waveform synthesis
//!
//! Every waveform is a phase mapping onto one quarter of a log-sine table,
//! followed by an exponential lookup that turns the summed log attenuation
//! into a linear 13-bit magnitude.

use super::tables::RateTables;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

/// Operator waveforms (register 0xE0 bits 0-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
pub enum Waveform {
    /// Full sine
    #[default]
    Sine = 0,
    /// Positive half of the sine, silent otherwise
    HalfSine = 1,
    /// Rectified sine
    AbsSine = 2,
    /// Rising quarter of the sine, repeated twice per period
    QuarterSine = 3,
    /// Double-speed sine in the first half period (OPL3)
    AlternatingSine = 4,
    /// Double-speed rectified sine in the first half period (OPL3)
    CamelSine = 5,
    /// Square wave (OPL3)
    Square = 6,
    /// Exponential sawtooth (OPL3)
    LogSaw = 7,
}

impl Waveform {
    /// Decode a waveform register value that has already been masked
    pub fn from_register(value: u8) -> Self {
        Waveform::from_u8(value & 7).unwrap_or_default()
    }
}

/// Maps a table phase and an attenuation to a signed sample
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveformSynthesizer {
    waveform: Waveform,
}

impl WaveformSynthesizer {
    /// Create a sine synthesizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected waveform
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Select the waveform
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Produce one sample
    ///
    /// # Arguments
    ///
    /// * `phase` - Table phase; only the low 10 bits are used
    /// * `attenuation` - Total operator attenuation in envelope units (0-511+)
    /// * `tables` - Shared log-sine and exp tables
    ///
    /// # Returns
    ///
    /// Signed sample, magnitude below 4096; exactly 0 once the level runs
    /// past the end of the exp table
    #[inline]
    pub fn sample(&self, phase: u32, attenuation: u32, tables: &RateTables) -> i32 {
        let p = (phase & 0x3ff) as u16;
        let (log, negative) = match self.waveform {
            Waveform::Sine => (tables.log_sin(p & 0x1ff) as u32, p & 0x200 != 0),
            Waveform::HalfSine => {
                if p & 0x200 != 0 {
                    return 0;
                }
                (tables.log_sin(p) as u32, false)
            }
            Waveform::AbsSine => (tables.log_sin(p & 0x1ff) as u32, false),
            Waveform::QuarterSine => {
                if p & 0x100 != 0 {
                    return 0;
                }
                (tables.log_sin(p & 0xff) as u32, false)
            }
            Waveform::AlternatingSine => {
                if p & 0x200 != 0 {
                    return 0;
                }
                (tables.log_sin((p << 1) & 0x1ff) as u32, p & 0x100 != 0)
            }
            Waveform::CamelSine => {
                if p & 0x200 != 0 {
                    return 0;
                }
                (tables.log_sin((p << 1) & 0x1ff) as u32, false)
            }
            Waveform::Square => (0, p & 0x200 != 0),
            Waveform::LogSaw => {
                let x = if p & 0x200 != 0 {
                    (p & 0x1ff) ^ 0x1ff
                } else {
                    p & 0x1ff
                };
                ((x as u32) << 3, p & 0x200 != 0)
            }
        };
        let out = tables.exp(log + (attenuation << 3));
        if negative {
            -out
        } else {
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tables() -> Arc<RateTables> {
        RateTables::new(49716)
    }

    fn period(waveform: Waveform) -> Vec<i32> {
        let tables = tables();
        let mut synth = WaveformSynthesizer::new();
        synth.set_waveform(waveform);
        (0..1024).map(|p| synth.sample(p, 0, &tables)).collect()
    }

    #[test]
    fn test_register_decoding() {
        assert_eq!(Waveform::from_register(0), Waveform::Sine);
        assert_eq!(Waveform::from_register(7), Waveform::LogSaw);
        assert_eq!(Waveform::from_register(0x0b), Waveform::QuarterSine);
    }

    #[test]
    fn test_sine_is_antisymmetric() {
        let wave = period(Waveform::Sine);
        for p in 0..512 {
            assert_eq!(wave[p], -wave[p + 512]);
        }
        assert!(wave[256] > 4000);
        assert!(wave[0] >= 0);
    }

    #[test]
    fn test_half_and_abs_sine() {
        let sine = period(Waveform::Sine);
        let half = period(Waveform::HalfSine);
        let abs = period(Waveform::AbsSine);
        for p in 0..1024 {
            assert_eq!(abs[p], sine[p].abs());
            if p < 512 {
                assert_eq!(half[p], sine[p]);
            } else {
                assert_eq!(half[p], 0);
            }
        }
    }

    #[test]
    fn test_quarter_sine_pulses() {
        let wave = period(Waveform::QuarterSine);
        assert!(wave[0..256].iter().all(|&s| s >= 0));
        assert!(wave[256..512].iter().all(|&s| s == 0));
        assert_eq!(&wave[0..256], &wave[512..768]);
    }

    #[test]
    fn test_opl3_waveforms() {
        let square = period(Waveform::Square);
        assert!(square[..512].iter().all(|&s| s == square[0] && s > 4000));
        assert!(square[512..].iter().all(|&s| s == -square[0]));

        let alternating = period(Waveform::AlternatingSine);
        assert!(alternating[128] > 4000);
        assert!(alternating[384] < -4000);
        assert!(alternating[512..].iter().all(|&s| s == 0));

        let camel = period(Waveform::CamelSine);
        assert!(camel[..512].iter().all(|&s| s >= 0));
        assert_eq!(camel[384], -alternating[384]);

        let saw = period(Waveform::LogSaw);
        assert!(saw[0] > saw[100]);
        assert!(saw[1023] < 0);
    }

    #[test]
    fn test_attenuation_reduces_and_silences() {
        let tables = tables();
        let synth = WaveformSynthesizer::new();
        let loud = synth.sample(256, 0, &tables);
        // 32 envelope units is 6 dB, half amplitude
        let half = synth.sample(256, 32, &tables);
        assert!((half - loud / 2).abs() <= 2, "{loud} {half}");
        assert_eq!(synth.sample(256, 511, &tables), 0);
        assert_eq!(synth.sample(768, 511, &tables), 0);
    }
}
