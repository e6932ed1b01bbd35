//! OPL3 synthesis engine
//!
//! Owns the operator arena, the 18 channels, the LFO/noise unit and a
//! register file for read-back. Register writes update the derived operator
//! and channel state synchronously; [`Opl3::render_frame`] is the only
//! place that advances time.

use std::sync::Arc;

use super::channel::{four_op_slot, Channel, FourOpAlgorithm, SynthMode, FOUR_OP_PAIRS};
use super::lfo::LfoUnit;
use super::operator::{Operator, KEY_CHANNEL};
use super::percussion::{PercussionMixer, RhythmFlags};
use super::registers::{Register, RegisterFile};
use super::tables::RateTables;
use crate::backend::{Frame, OplBackend};

/// Number of channels across both banks
pub const CHANNEL_COUNT: usize = 18;
/// Number of operators across both banks
pub const OPERATOR_COUNT: usize = CHANNEL_COUNT * 2;

/// OPL2/OPL3 sample generator
pub struct Opl3 {
    tables: Arc<RateTables>,
    registers: RegisterFile,
    ops: [Operator; OPERATOR_COUNT],
    channels: [Channel; CHANNEL_COUNT],
    lfo: LfoUnit,
    rhythm: RhythmFlags,
    opl3: bool,
    waveform_select: bool,
    note_select: bool,
    four_op_mask: u8,
    outputs: [i32; CHANNEL_COUNT],
    muted: [bool; CHANNEL_COUNT],
}

impl Opl3 {
    /// Create an engine with its own tables for `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self::with_tables(RateTables::new(sample_rate))
    }

    /// Create an engine sharing existing tables
    pub fn with_tables(tables: Arc<RateTables>) -> Self {
        Opl3 {
            tables,
            registers: RegisterFile::new(),
            ops: std::array::from_fn(|_| Operator::new()),
            channels: std::array::from_fn(Channel::new),
            lfo: LfoUnit::new(),
            rhythm: RhythmFlags::empty(),
            opl3: false,
            waveform_select: false,
            note_select: false,
            four_op_mask: 0,
            outputs: [0; CHANNEL_COUNT],
            muted: [false; CHANNEL_COUNT],
        }
    }

    /// Shared lookup tables
    pub fn tables(&self) -> &Arc<RateTables> {
        &self.tables
    }

    /// True once 0x105 bit 0 has been set
    pub fn is_opl3(&self) -> bool {
        self.opl3
    }

    /// Current depth/rhythm register contents
    pub fn rhythm(&self) -> RhythmFlags {
        self.rhythm
    }

    /// Operator by arena index (`channel * 2 + n`)
    pub fn operator(&self, index: usize) -> Option<&Operator> {
        self.ops.get(index)
    }

    /// Channel by index (0-17)
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Engine register read-back store
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// True if no operator can produce output until the next key-on
    pub fn is_silent(&self) -> bool {
        self.ops.iter().all(Operator::is_silent)
    }

    fn waveform_mask(&self) -> u8 {
        let mut mask = 0;
        if self.waveform_select {
            mask |= 0x03;
        }
        if self.opl3 {
            mask |= 0x07;
        }
        mask
    }

    fn remask_waveforms(&mut self) {
        let mask = self.waveform_mask();
        for op in self.ops.iter_mut() {
            op.apply_waveform_mask(mask);
        }
    }

    /// Secondary channel of an enabled four-op pair
    fn is_active_secondary(&self, channel: usize) -> bool {
        matches!(self.channels[channel].mode(), SynthMode::FourOpSecondary)
    }

    fn update_frequency(&mut self, channel: usize) {
        let ch = &self.channels[channel];
        let (fnum, block) = (ch.fnum(), ch.block());
        let keycode = ch.keycode(self.note_select);
        let mode = ch.mode();

        let partner = match mode {
            SynthMode::FourOp { partner, .. } => {
                let primary = self.channels[channel].clone();
                self.channels[partner].follow(&primary);
                Some(partner)
            }
            _ => None,
        };
        for c in std::iter::once(channel).chain(partner) {
            for op in &mut self.ops[c * 2..c * 2 + 2] {
                op.set_frequency(fnum, block, keycode, &self.tables);
            }
        }
    }

    fn key_channel(&mut self, channel: usize, on: bool) {
        let partner = match self.channels[channel].mode() {
            SynthMode::FourOp { partner, .. } => Some(partner),
            _ => None,
        };
        for c in std::iter::once(channel).chain(partner) {
            for op in &mut self.ops[c * 2..c * 2 + 2] {
                if on {
                    op.key_on(KEY_CHANNEL);
                } else {
                    op.key_off(KEY_CHANNEL);
                }
            }
        }
    }

    /// Recompute every channel's synthesis mode
    ///
    /// Runs after writes to C0, 0x104, 0x105 and 0xBD.
    fn update_synth_modes(&mut self) {
        let rhythm = self.rhythm.contains(RhythmFlags::RHYTHM);
        for index in 0..CHANNEL_COUNT {
            let pair = four_op_slot(index)
                .filter(|&(k, _)| self.opl3 && self.four_op_mask & (1 << k) != 0);
            let mode = if rhythm && (6..9).contains(&index) {
                SynthMode::Rhythm
            } else if let Some((k, primary)) = pair {
                if primary {
                    let (p, s) = FOUR_OP_PAIRS[k];
                    SynthMode::FourOp {
                        algorithm: FourOpAlgorithm::from_connections(
                            self.channels[p].connection(),
                            self.channels[s].connection(),
                        ),
                        partner: s,
                    }
                } else {
                    SynthMode::FourOpSecondary
                }
            } else if self.channels[index].connection() {
                SynthMode::Am
            } else {
                SynthMode::Fm
            };
            self.channels[index].set_mode(mode);
            self.channels[index].update_pan(self.opl3);
        }

        for (k, &(primary, secondary)) in FOUR_OP_PAIRS.iter().enumerate() {
            if self.opl3 && self.four_op_mask & (1 << k) != 0 {
                let lead = self.channels[primary].clone();
                self.channels[secondary].copy_pan(&lead);
                self.update_frequency(primary);
            }
        }
    }

    fn write_rhythm(&mut self, value: u8) {
        let flags = RhythmFlags::from_register(value);
        let was_rhythm = self.rhythm.contains(RhythmFlags::RHYTHM);
        self.rhythm = flags;
        self.lfo.set_depth(
            flags.contains(RhythmFlags::DEEP_TREMOLO),
            flags.contains(RhythmFlags::DEEP_VIBRATO),
        );

        let is_rhythm = flags.contains(RhythmFlags::RHYTHM);
        if is_rhythm {
            PercussionMixer::apply_keys(&mut self.ops, flags.drum_keys());
        } else if was_rhythm {
            PercussionMixer::release_all(&mut self.ops);
        }
        if is_rhythm != was_rhythm {
            self.update_synth_modes();
        }
    }

    /// Render one frame; see [`OplBackend::generate_frame`]
    #[inline]
    pub fn render_frame(&mut self) -> Frame {
        self.lfo.advance(self.tables.clock_add());
        let lfo = self.lfo.state(&self.tables);
        let tables: &RateTables = &self.tables;

        // an OPL2 only clocks the first bank
        let active = if self.opl3 { CHANNEL_COUNT } else { CHANNEL_COUNT / 2 };
        self.outputs[active..].fill(0);

        let (mut left, mut right) = (0i32, 0i32);
        for index in 0..active {
            let out = match self.channels[index].mode() {
                SynthMode::Rhythm if index == 6 => {
                    PercussionMixer::render(&mut self.channels[6], &mut self.ops, &lfo, tables)
                }
                SynthMode::Rhythm | SynthMode::FourOpSecondary => 0,
                _ => self.channels[index].render(&mut self.ops, &lfo, tables),
            };
            self.outputs[index] = out;
            if self.muted[index] {
                continue;
            }
            // the drum sum lands on channel 6 and uses its panning
            let (to_left, to_right) = self.channels[index].pan();
            if to_left {
                left += out;
            }
            if to_right {
                right += out;
            }
        }
        Frame::new(clip(left), clip(right))
    }
}

#[inline]
fn clip(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

impl OplBackend for Opl3 {
    fn new(sample_rate: u32) -> Self {
        Opl3::new(sample_rate)
    }

    fn with_tables(tables: Arc<RateTables>) -> Self {
        Opl3::with_tables(tables)
    }

    fn reset(&mut self) {
        let muted = self.muted;
        *self = Opl3::with_tables(Arc::clone(&self.tables));
        self.muted = muted;
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        let addr = addr & 0x1ff;
        self.registers.write(addr, value);
        let Some(register) = Register::from_addr(addr) else {
            return;
        };
        match register {
            Register::WaveformSelect => {
                self.waveform_select = value & 0x20 != 0;
                self.remask_waveforms();
            }
            Register::FourOpEnable => {
                let mask = value & 0x3f;
                if mask != self.four_op_mask {
                    self.four_op_mask = mask;
                    self.update_synth_modes();
                }
            }
            Register::NewMode => {
                let opl3 = value & 0x01 != 0;
                if opl3 != self.opl3 {
                    self.opl3 = opl3;
                    self.remask_waveforms();
                    self.update_synth_modes();
                }
            }
            Register::CswNoteSelect => {
                self.note_select = value & 0x40 != 0;
                for channel in 0..CHANNEL_COUNT {
                    if !self.is_active_secondary(channel) {
                        self.update_frequency(channel);
                    }
                }
            }
            Register::Rhythm => self.write_rhythm(value),
            // Timers live in the device; the engine only keeps the bytes
            Register::Test | Register::Timer1 | Register::Timer2 | Register::TimerControl => {}
            Register::OperatorModulation(slot) => {
                self.ops[slot.arena_index()].write_modulation(value, &self.tables)
            }
            Register::OperatorLevel(slot) => self.ops[slot.arena_index()].write_level(value),
            Register::OperatorAttackDecay(slot) => {
                self.ops[slot.arena_index()].write_attack_decay(value, &self.tables)
            }
            Register::OperatorSustainRelease(slot) => {
                self.ops[slot.arena_index()].write_sustain_release(value, &self.tables)
            }
            Register::OperatorWaveform(slot) => {
                let mask = self.waveform_mask();
                self.ops[slot.arena_index()].write_waveform(value, mask);
            }
            Register::ChannelFnumLow(channel) => {
                if self.is_active_secondary(channel) {
                    return;
                }
                self.channels[channel].write_fnum_low(value);
                self.update_frequency(channel);
            }
            Register::ChannelKeyOnBlock(channel) => {
                if self.is_active_secondary(channel) {
                    return;
                }
                let key_change = self.channels[channel].write_key_block(value);
                self.update_frequency(channel);
                if let Some(on) = key_change {
                    self.key_channel(channel, on);
                }
            }
            Register::ChannelFeedback(channel) => {
                self.channels[channel].write_feedback(value, self.opl3);
                self.update_synth_modes();
            }
        }
    }

    fn read_register(&self, addr: u16) -> u8 {
        self.registers.read(addr)
    }

    fn generate_frame(&mut self) -> Frame {
        self.render_frame()
    }

    fn sample_rate(&self) -> u32 {
        self.tables.sample_rate()
    }

    fn channel_outputs(&self) -> [i32; 18] {
        self.outputs
    }

    fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if let Some(slot) = self.muted.get_mut(channel) {
            *slot = mute;
        }
    }

    fn is_channel_muted(&self, channel: usize) -> bool {
        self.muted.get(channel).copied().unwrap_or(false)
    }
}

impl std::fmt::Debug for Opl3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opl3")
            .field("sample_rate", &self.tables.sample_rate())
            .field("opl3", &self.opl3)
            .field("rhythm", &self.rhythm)
            .field("four_op_mask", &self.four_op_mask)
            .finish_non_exhaustive()
    }
}
