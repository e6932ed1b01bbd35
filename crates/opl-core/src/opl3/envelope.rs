//! Operator envelope generator
//!
//! Five-state ADSR machine working on a 9-bit attenuation (0 = loudest,
//! 511 = silent). Rates advance a fixed-point accumulator; every whole unit
//! that falls out of it is one envelope step.

use super::tables::{RateTables, ENV_MAX, RATE_MASK, RATE_SH};
use num_derive::FromPrimitive;

/// Envelope phase
///
/// Ordering matters: it doubles as the bit index into the rate-zero mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive)]
pub enum EnvelopeState {
    /// Silent, waiting for a key-on
    Off = 0,
    /// Key released, fading out at the release rate
    Release = 1,
    /// Holding (or fading at the release rate for percussive sounds)
    Sustain = 2,
    /// Falling from full level to the sustain level
    Decay = 3,
    /// Rising to full level
    Attack = 4,
}

impl EnvelopeState {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Attenuation state machine of one operator
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    state: EnvelopeState,
    volume: i32,
    rate_index: u32,
    attack_add: u32,
    decay_add: u32,
    release_add: u32,
    sustain_level: i32,
    /// One bit per state whose rate makes no progress
    rate_zero: u8,
    /// Key-on sources: bit 0 channel key, bit 1 rhythm key
    key_on: u8,
    attack_rate: u8,
    decay_rate: u8,
    release_rate: u8,
    sustain_hold: bool,
    key_scale: u8,
}

impl EnvelopeGenerator {
    /// Create a silent envelope with all rates at zero
    pub fn new() -> Self {
        EnvelopeGenerator {
            state: EnvelopeState::Off,
            volume: ENV_MAX,
            rate_index: 0,
            attack_add: 0,
            decay_add: 0,
            release_add: 0,
            sustain_level: ENV_MAX,
            rate_zero: EnvelopeState::Off.bit()
                | EnvelopeState::Release.bit()
                | EnvelopeState::Sustain.bit()
                | EnvelopeState::Decay.bit()
                | EnvelopeState::Attack.bit(),
            key_on: 0,
            attack_rate: 0,
            decay_rate: 0,
            release_rate: 0,
            sustain_hold: false,
            key_scale: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Current attenuation (0-511)
    pub fn volume(&self) -> i32 {
        self.volume
    }

    /// Programmed sustain attenuation
    pub fn sustain_level(&self) -> i32 {
        self.sustain_level
    }

    /// True if the envelope cannot change while it stays in its current state
    pub fn is_frozen(&self) -> bool {
        self.rate_zero & self.state.bit() != 0
    }

    /// Set attack and decay rates (register 0x60 nibbles)
    pub fn set_attack_decay(&mut self, attack: u8, decay: u8, tables: &RateTables) {
        self.attack_rate = attack & 0x0f;
        self.decay_rate = decay & 0x0f;
        self.update_attack(tables);
        self.update_decay(tables);
    }

    /// Set sustain level and release rate (register 0x80 nibbles)
    pub fn set_sustain_release(&mut self, sustain: u8, release: u8, tables: &RateTables) {
        let mut sustain = sustain & 0x0f;
        // level 15 maps to the very bottom of the range
        sustain |= (sustain + 1) & 0x10;
        self.sustain_level = (sustain as i32) << 4;
        self.release_rate = release & 0x0f;
        self.update_release(tables);
    }

    /// Select sustained (true) or percussive (false) envelope type
    pub fn set_sustain_hold(&mut self, hold: bool) {
        self.sustain_hold = hold;
        if hold || self.release_add == 0 {
            self.rate_zero |= EnvelopeState::Sustain.bit();
        } else {
            self.rate_zero &= !EnvelopeState::Sustain.bit();
        }
    }

    /// Set the key scale rate offset added to every rate index
    pub fn set_key_scale(&mut self, key_scale: u8, tables: &RateTables) {
        if self.key_scale == key_scale {
            return;
        }
        self.key_scale = key_scale;
        self.update_attack(tables);
        self.update_decay(tables);
        self.update_release(tables);
    }

    fn update_attack(&mut self, tables: &RateTables) {
        if self.attack_rate != 0 {
            self.attack_add = tables.attack_rate((self.attack_rate << 2) + self.key_scale);
            self.rate_zero &= !EnvelopeState::Attack.bit();
        } else {
            self.attack_add = 0;
            self.rate_zero |= EnvelopeState::Attack.bit();
        }
    }

    fn update_decay(&mut self, tables: &RateTables) {
        if self.decay_rate != 0 {
            self.decay_add = tables.linear_rate((self.decay_rate << 2) + self.key_scale);
            self.rate_zero &= !EnvelopeState::Decay.bit();
        } else {
            self.decay_add = 0;
            self.rate_zero |= EnvelopeState::Decay.bit();
        }
    }

    fn update_release(&mut self, tables: &RateTables) {
        if self.release_rate != 0 {
            self.release_add = tables.linear_rate((self.release_rate << 2) + self.key_scale);
            self.rate_zero &= !EnvelopeState::Release.bit();
            if !self.sustain_hold {
                self.rate_zero &= !EnvelopeState::Sustain.bit();
            }
        } else {
            self.release_add = 0;
            self.rate_zero |= EnvelopeState::Release.bit();
            if !self.sustain_hold {
                self.rate_zero |= EnvelopeState::Sustain.bit();
            }
        }
    }

    /// Press a key source
    ///
    /// # Returns
    ///
    /// true if this started a new note, in which case the caller restarts
    /// the phase generator
    pub fn key_on(&mut self, mask: u8) -> bool {
        let started = self.key_on == 0;
        if started {
            self.rate_index = 0;
            self.state = EnvelopeState::Attack;
        }
        self.key_on |= mask;
        started
    }

    /// Release a key source; the envelope releases once no source holds it
    pub fn key_off(&mut self, mask: u8) {
        self.key_on &= !mask;
        if self.key_on == 0 && self.state != EnvelopeState::Off {
            self.state = EnvelopeState::Release;
        }
    }

    /// True while any key source holds the operator
    pub fn is_keyed(&self) -> bool {
        self.key_on != 0
    }

    #[inline]
    fn rate_forward(&mut self, add: u32) -> i32 {
        self.rate_index = self.rate_index.wrapping_add(add);
        let steps = (self.rate_index >> RATE_SH) as i32;
        self.rate_index &= RATE_MASK;
        steps
    }

    /// Advance one sample and return the new attenuation
    pub fn advance(&mut self) -> i32 {
        let mut vol = self.volume;
        match self.state {
            EnvelopeState::Off => return ENV_MAX,
            EnvelopeState::Attack => {
                let change = self.rate_forward(self.attack_add);
                if change == 0 {
                    return vol;
                }
                vol += (!vol * change) >> 3;
                if vol < 0 {
                    self.volume = 0;
                    self.rate_index = 0;
                    self.state = EnvelopeState::Decay;
                    return 0;
                }
            }
            EnvelopeState::Decay => {
                vol += self.rate_forward(self.decay_add);
                if vol >= self.sustain_level {
                    if vol >= ENV_MAX {
                        self.volume = ENV_MAX;
                        self.state = EnvelopeState::Off;
                        return ENV_MAX;
                    }
                    self.rate_index = 0;
                    self.state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain if self.sustain_hold => return vol,
            EnvelopeState::Sustain | EnvelopeState::Release => {
                vol += self.rate_forward(self.release_add);
                if vol >= ENV_MAX {
                    self.volume = ENV_MAX;
                    self.state = EnvelopeState::Off;
                    return ENV_MAX;
                }
            }
        }
        self.volume = vol;
        vol
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tables() -> Arc<RateTables> {
        RateTables::new(49716)
    }

    fn envelope(attack: u8, decay: u8, sustain: u8, release: u8, hold: bool) -> EnvelopeGenerator {
        let tables = tables();
        let mut env = EnvelopeGenerator::new();
        env.set_sustain_hold(hold);
        env.set_attack_decay(attack, decay, &tables);
        env.set_sustain_release(sustain, release, &tables);
        env
    }

    #[test]
    fn test_idle_envelope_is_silent() {
        let mut env = EnvelopeGenerator::new();
        assert_eq!(env.state(), EnvelopeState::Off);
        assert_eq!(env.advance(), ENV_MAX);
        assert!(env.is_frozen());
    }

    #[test]
    fn test_fastest_attack_reaches_full_level_immediately() {
        let mut env = envelope(15, 0, 0, 0, true);
        // rate index 62 and up is instant
        env.set_key_scale(2, &tables());
        assert!(env.key_on(1));
        assert_eq!(env.advance(), 0);
        assert_eq!(env.state(), EnvelopeState::Decay);
    }

    #[test]
    fn test_sustain_level_mapping() {
        let env = envelope(15, 0, 15, 0, true);
        assert_eq!(env.sustain_level(), 31 << 4);
        let env = envelope(15, 0, 3, 0, true);
        assert_eq!(env.sustain_level(), 3 << 4);
    }

    #[test]
    fn test_monotonic_within_each_state() {
        for rate in 1..16u8 {
            for key_scale in [0u8, 7, 15] {
                let tables = tables();
                let mut env = envelope(rate, rate, 8, rate, false);
                env.set_key_scale(key_scale, &tables);
                env.key_on(1);
                let mut last = env.volume();
                let mut last_state = env.state();
                for i in 0..200_000 {
                    if i == 100_000 {
                        env.key_off(1);
                        last_state = env.state();
                    }
                    let vol = env.advance();
                    let state = env.state();
                    if state == last_state {
                        match state {
                            EnvelopeState::Attack => assert!(vol <= last),
                            _ => assert!(vol >= last, "rate {rate} ksr {key_scale} {state:?}"),
                        }
                    }
                    last = vol;
                    last_state = state;
                    if state == EnvelopeState::Off {
                        break;
                    }
                }
                assert!((0..=ENV_MAX).contains(&env.volume()));
            }
        }
    }

    #[test]
    fn test_release_duration_matches_rate_table() {
        let tables = tables();
        for release in [1u8, 4, 9, 15] {
            let mut env = envelope(15, 0, 0, release, true);
            env.key_on(1);
            for _ in 0..16 {
                env.advance();
            }
            assert_eq!(env.state(), EnvelopeState::Sustain);
            env.key_off(1);

            let add = tables.linear_rate(release << 2) as u64;
            let distance = ((ENV_MAX - env.volume()) as u64) << RATE_SH;
            let expected = (distance - env.rate_index as u64).div_ceil(add);

            for _ in 0..expected - 1 {
                env.advance();
                assert_eq!(env.state(), EnvelopeState::Release);
            }
            assert!(env.volume() < ENV_MAX);
            assert_eq!(env.advance(), ENV_MAX);
            assert_eq!(env.state(), EnvelopeState::Off);
        }
    }

    #[test]
    fn test_percussive_sustain_keeps_fading() {
        let mut env = envelope(15, 0, 0, 8, false);
        env.key_on(1);
        for _ in 0..16 {
            env.advance();
        }
        assert_eq!(env.state(), EnvelopeState::Sustain);
        let before = env.volume();
        for _ in 0..10_000 {
            env.advance();
        }
        assert!(env.volume() > before);
    }

    #[test]
    fn test_retrigger_keeps_attenuation() {
        let mut env = envelope(15, 0, 0, 8, true);
        env.key_on(1);
        for _ in 0..16 {
            env.advance();
        }
        env.key_off(1);
        for _ in 0..500 {
            env.advance();
        }
        let faded = env.volume();
        assert!(faded > 0);
        assert!(env.key_on(1));
        assert_eq!(env.state(), EnvelopeState::Attack);
        assert_eq!(env.volume(), faded);
    }

    #[test]
    fn test_rhythm_and_channel_keys_combine() {
        let mut env = envelope(15, 0, 0, 4, true);
        assert!(env.key_on(1));
        assert!(!env.key_on(2));
        env.key_off(1);
        assert!(env.is_keyed());
        assert_ne!(env.state(), EnvelopeState::Release);
        env.key_off(2);
        assert_eq!(env.state(), EnvelopeState::Release);
    }
}
