//! FM operator
//!
//! Glues a [`PhaseGenerator`], an [`EnvelopeGenerator`] and a
//! [`WaveformSynthesizer`] together and decodes the five per-operator
//! registers into their parameters.

use super::envelope::{EnvelopeGenerator, EnvelopeState};
use super::lfo::LfoState;
use super::phase::PhaseGenerator;
use super::tables::{env_silent, RateTables};
use super::waveform::{Waveform, WaveformSynthesizer};

/// Key scale level shift for register 0x40 bits 6-7 (0, 3, 1.5, 6 dB/oct)
const KSL_SHIFT: [u8; 4] = [31, 1, 2, 0];

/// Key-on source driven by the channel's 0xB0 register
pub const KEY_CHANNEL: u8 = 0x01;
/// Key-on source driven by the rhythm bits of 0xBD
pub const KEY_RHYTHM: u8 = 0x02;

/// One FM cell
#[derive(Debug, Clone, Default)]
pub struct Operator {
    phase: PhaseGenerator,
    envelope: EnvelopeGenerator,
    synth: WaveformSynthesizer,
    reg20: u8,
    reg40: u8,
    reg60: u8,
    reg80: u8,
    reg_e0: u8,
    /// TL plus key scale level, in envelope units
    total_level: i32,
    ksl_base: u8,
    keycode: u8,
    tremolo: bool,
}

impl Operator {
    /// Create a silent operator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register 0x20: AM, vibrato, sustain type, KSR, multiple
    pub fn write_modulation(&mut self, value: u8, tables: &RateTables) {
        self.reg20 = value;
        self.tremolo = value & 0x80 != 0;
        self.phase.set_vibrato(value & 0x40 != 0);
        self.phase.set_multiple(value & 0x0f, tables);
        self.envelope.set_sustain_hold(value & 0x20 != 0);
        self.update_key_scale(tables);
    }

    /// Register 0x40: key scale level, total level
    pub fn write_level(&mut self, value: u8) {
        self.reg40 = value;
        self.update_total_level();
    }

    /// Register 0x60: attack rate, decay rate
    pub fn write_attack_decay(&mut self, value: u8, tables: &RateTables) {
        self.reg60 = value;
        self.envelope.set_attack_decay(value >> 4, value & 0x0f, tables);
    }

    /// Register 0x80: sustain level, release rate
    pub fn write_sustain_release(&mut self, value: u8, tables: &RateTables) {
        self.reg80 = value;
        self.envelope.set_sustain_release(value >> 4, value & 0x0f, tables);
    }

    /// Register 0xE0: waveform select
    ///
    /// `mask` limits the selection to what the chip mode allows (0, 3 or 7).
    pub fn write_waveform(&mut self, value: u8, mask: u8) {
        self.reg_e0 = value;
        self.apply_waveform_mask(mask);
    }

    /// Re-apply the last waveform write under a new mode mask
    pub fn apply_waveform_mask(&mut self, mask: u8) {
        self.synth
            .set_waveform(Waveform::from_register(self.reg_e0 & mask));
    }

    /// Apply the channel frequency
    ///
    /// # Arguments
    ///
    /// * `fnum` - 10-bit frequency number
    /// * `block` - Octave (0-7)
    /// * `keycode` - 4-bit key code used for rate and level scaling
    pub fn set_frequency(&mut self, fnum: u16, block: u8, keycode: u8, tables: &RateTables) {
        self.phase.set_frequency(fnum, block);
        self.ksl_base = tables.ksl_base(((block as u16) << 4) | (fnum >> 6));
        self.update_total_level();
        if self.keycode != keycode {
            self.keycode = keycode;
            self.update_key_scale(tables);
        }
    }

    fn update_total_level(&mut self) {
        let tl = (self.reg40 & 0x3f) as i32;
        let shift = KSL_SHIFT[(self.reg40 >> 6) as usize];
        self.total_level = (tl << 2) + (self.ksl_base as i32 >> shift);
    }

    fn update_key_scale(&mut self, tables: &RateTables) {
        let key_scale = if self.reg20 & 0x10 != 0 {
            self.keycode
        } else {
            self.keycode >> 2
        };
        self.envelope.set_key_scale(key_scale, tables);
    }

    /// Press a key source; a new note restarts the phase
    pub fn key_on(&mut self, mask: u8) {
        if self.envelope.key_on(mask) {
            self.phase.reset();
        }
    }

    /// Release a key source
    pub fn key_off(&mut self, mask: u8) {
        self.envelope.key_off(mask);
    }

    /// True if the operator is inaudible and will stay so until keyed
    pub fn is_silent(&self) -> bool {
        env_silent(self.total_level + self.envelope.volume()) && self.envelope.is_frozen()
    }

    /// Step the envelope and return the total attenuation for this sample
    #[inline]
    pub fn forward_volume(&mut self, lfo: &LfoState) -> i32 {
        let mut level = self.envelope.advance() + self.total_level;
        if self.tremolo {
            level += lfo.tremolo as i32;
        }
        level
    }

    /// Step the phase and return the table phase for this sample
    #[inline]
    pub fn forward_phase(&mut self, lfo: &LfoState) -> u32 {
        self.phase.advance(lfo.vibrato_position, lfo.vibrato_shallow)
    }

    /// Render one sample with the given phase modulation
    #[inline]
    pub fn sample(&mut self, modulation: i32, lfo: &LfoState, tables: &RateTables) -> i32 {
        let level = self.forward_volume(lfo);
        let phase = self.forward_phase(lfo);
        if env_silent(level) {
            return 0;
        }
        self.synth
            .sample(phase.wrapping_add(modulation as u32), level as u32, tables)
    }

    /// Render the waveform at an explicit phase and level
    #[inline]
    pub fn wave_at(&self, phase: u32, level: i32, tables: &RateTables) -> i32 {
        if env_silent(level) {
            return 0;
        }
        self.synth.sample(phase, level as u32, tables)
    }

    /// Envelope state
    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    /// Current envelope attenuation (without TL/KSL/tremolo)
    pub fn envelope_volume(&self) -> i32 {
        self.envelope.volume()
    }

    /// TL plus KSL attenuation
    pub fn total_level(&self) -> i32 {
        self.total_level
    }

    /// Selected waveform
    pub fn waveform(&self) -> Waveform {
        self.synth.waveform()
    }

    /// Stored phase increment
    pub fn phase_increment(&self) -> u32 {
        self.phase.increment()
    }

    /// Raw values of registers 0x20, 0x40, 0x60, 0x80 and 0xE0
    pub fn registers(&self) -> [u8; 5] {
        [self.reg20, self.reg40, self.reg60, self.reg80, self.reg_e0]
    }
}
