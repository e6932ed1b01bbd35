//! Rhythm mode voices
//!
//! With bit 5 of 0xBD set, the six operators of channels 6-8 become five
//! fixed drum voices. The high-hat, snare and cymbal ignore their own
//! frequency settings apart from two phase bits taken from operators 14 and
//! 17, mixed with the noise generator.

use bitflags::bitflags;

use super::channel::Channel;
use super::lfo::LfoState;
use super::operator::{Operator, KEY_RHYTHM};
use super::tables::{env_silent, RateTables};

bitflags! {
    /// Depth / rhythm register (0xBD) bitflags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RhythmFlags: u8 {
        /// High-hat key-on
        const HIGH_HAT = 0x01;
        /// Top cymbal key-on
        const TOP_CYMBAL = 0x02;
        /// Tom-tom key-on
        const TOM_TOM = 0x04;
        /// Snare drum key-on
        const SNARE_DRUM = 0x08;
        /// Bass drum key-on
        const BASS_DRUM = 0x10;
        /// Rhythm mode enable
        const RHYTHM = 0x20;
        /// Deep (14 cent) vibrato
        const DEEP_VIBRATO = 0x40;
        /// Deep (4.8 dB) tremolo
        const DEEP_TREMOLO = 0x80;
    }
}

impl RhythmFlags {
    /// Create flags from raw register value
    pub fn from_register(value: u8) -> Self {
        RhythmFlags::from_bits_truncate(value)
    }

    /// Drum key bits only
    pub fn drum_keys(self) -> Self {
        self & (RhythmFlags::HIGH_HAT
            | RhythmFlags::TOP_CYMBAL
            | RhythmFlags::TOM_TOM
            | RhythmFlags::SNARE_DRUM
            | RhythmFlags::BASS_DRUM)
    }
}

/// Operator arena indices of the rhythm voices
pub const BASS_DRUM_OPS: [usize; 2] = [12, 13];
/// High-hat operator (channel 7 operator 1)
pub const HIGH_HAT_OP: usize = 14;
/// Snare drum operator (channel 7 operator 2)
pub const SNARE_DRUM_OP: usize = 15;
/// Tom-tom operator (channel 8 operator 1)
pub const TOM_TOM_OP: usize = 16;
/// Top cymbal operator (channel 8 operator 2)
pub const TOP_CYMBAL_OP: usize = 17;

/// Renders the five drum voices from channels 6-8
#[derive(Debug, Clone, Copy, Default)]
pub struct PercussionMixer;

impl PercussionMixer {
    /// Apply the drum key bits to the rhythm operators
    ///
    /// Keys already held stay held, so repeated writes do not retrigger.
    pub fn apply_keys(ops: &mut [Operator], keys: RhythmFlags) {
        let voices: [(RhythmFlags, &[usize]); 5] = [
            (RhythmFlags::BASS_DRUM, &BASS_DRUM_OPS),
            (RhythmFlags::HIGH_HAT, &[HIGH_HAT_OP]),
            (RhythmFlags::SNARE_DRUM, &[SNARE_DRUM_OP]),
            (RhythmFlags::TOM_TOM, &[TOM_TOM_OP]),
            (RhythmFlags::TOP_CYMBAL, &[TOP_CYMBAL_OP]),
        ];
        for (flag, indices) in voices {
            for &i in indices {
                if keys.contains(flag) {
                    ops[i].key_on(KEY_RHYTHM);
                } else {
                    ops[i].key_off(KEY_RHYTHM);
                }
            }
        }
    }

    /// Release every rhythm key (rhythm mode switched off)
    pub fn release_all(ops: &mut [Operator]) {
        for op in ops[BASS_DRUM_OPS[0]..=TOP_CYMBAL_OP].iter_mut() {
            op.key_off(KEY_RHYTHM);
        }
    }

    /// Render one sample of all drum voices, already doubled
    ///
    /// # Arguments
    ///
    /// * `bass_drum` - Channel 6, whose feedback and connection the bass drum uses
    /// * `ops` - Operator arena
    /// * `lfo` - LFO and noise state for this sample
    pub fn render(
        bass_drum: &mut Channel,
        ops: &mut [Operator],
        lfo: &LfoState,
        tables: &RateTables,
    ) -> i32 {
        let [bd0, bd1] = BASS_DRUM_OPS;
        let out0 = bass_drum.feedback_sample(&mut ops[bd0], lfo, tables);
        // additive bass drum drops the modulator entirely
        let modulation = if bass_drum.connection() { 0 } else { out0 };
        let mut sample = ops[bd1].sample(modulation, lfo, tables);

        let noise = lfo.noise & 1;
        let c1 = ops[HIGH_HAT_OP].forward_phase(lfo);
        let c5 = ops[TOP_CYMBAL_OP].forward_phase(lfo);
        let phase_bit = if (((c1 & 0x88) ^ ((c1 << 5) & 0x80)) | ((c5 ^ (c5 << 2)) & 0x20)) != 0 {
            2
        } else {
            0
        };

        let hh_level = ops[HIGH_HAT_OP].forward_volume(lfo);
        if !env_silent(hh_level) {
            let index = (phase_bit << 8) | (0x34 << (phase_bit ^ (noise << 1)));
            sample += ops[HIGH_HAT_OP].wave_at(index, hh_level, tables);
        }

        let sd_level = ops[SNARE_DRUM_OP].forward_volume(lfo);
        if !env_silent(sd_level) {
            let index = (0x100 + (c1 & 0x100)) ^ (noise << 8);
            sample += ops[SNARE_DRUM_OP].wave_at(index, sd_level, tables);
        }

        sample += ops[TOM_TOM_OP].sample(0, lfo, tables);

        let tc_level = ops[TOP_CYMBAL_OP].forward_volume(lfo);
        if !env_silent(tc_level) {
            let index = (1 + phase_bit) << 8;
            sample += ops[TOP_CYMBAL_OP].wave_at(index, tc_level, tables);
        }

        sample << 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opl3::envelope::EnvelopeState;

    #[test]
    fn test_flags_from_register() {
        let flags = RhythmFlags::from_register(0xff);
        assert!(flags.contains(RhythmFlags::RHYTHM | RhythmFlags::DEEP_TREMOLO));
        assert_eq!(flags.drum_keys().bits(), 0x1f);
    }

    #[test]
    fn test_key_bits_map_to_operators() {
        let tables = RateTables::new(49716);
        let mut ops = vec![Operator::new(); 36];
        for op in ops.iter_mut() {
            op.write_attack_decay(0xf0, &tables);
            op.write_sustain_release(0x0f, &tables);
        }
        let keys = RhythmFlags::BASS_DRUM | RhythmFlags::TOP_CYMBAL;
        PercussionMixer::apply_keys(&mut ops, keys);
        assert_eq!(ops[12].envelope_state(), EnvelopeState::Attack);
        assert_eq!(ops[13].envelope_state(), EnvelopeState::Attack);
        assert_eq!(ops[17].envelope_state(), EnvelopeState::Attack);
        assert_eq!(ops[14].envelope_state(), EnvelopeState::Off);
        assert_eq!(ops[16].envelope_state(), EnvelopeState::Off);

        PercussionMixer::apply_keys(&mut ops, RhythmFlags::TOP_CYMBAL);
        assert_eq!(ops[12].envelope_state(), EnvelopeState::Release);
        assert_eq!(ops[17].envelope_state(), EnvelopeState::Attack);

        PercussionMixer::release_all(&mut ops);
        assert_eq!(ops[17].envelope_state(), EnvelopeState::Release);
    }

    #[test]
    fn test_silent_drums_render_zero() {
        let tables = RateTables::new(49716);
        let mut ops = vec![Operator::new(); 36];
        let mut ch6 = Channel::new(6);
        let lfo = LfoState::default();
        for _ in 0..32 {
            assert_eq!(PercussionMixer::render(&mut ch6, &mut ops, &lfo, &tables), 0);
        }
    }
}
