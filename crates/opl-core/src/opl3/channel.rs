//! Channel mixing
//!
//! A channel owns no operators; it refers to its pair in the chip's operator
//! arena by index (`channel * 2` and `channel * 2 + 1`). In four-operator
//! mode the primary channel also drives the partner's pair.

use super::lfo::LfoState;
use super::operator::Operator;
use super::tables::RateTables;

/// Four-operator connection, from the C0 connection bits of both channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FourOpAlgorithm {
    /// op1 -> op2 -> op3 -> op4
    FmFm,
    /// op1 + (op2 -> op3 -> op4)
    AmFm,
    /// (op1 -> op2) + (op3 -> op4)
    FmAm,
    /// op1 + (op2 -> op3) + op4
    AmAm,
}

impl FourOpAlgorithm {
    /// Decode from the primary and secondary connection bits
    pub fn from_connections(primary: bool, secondary: bool) -> Self {
        match (primary, secondary) {
            (false, false) => FourOpAlgorithm::FmFm,
            (true, false) => FourOpAlgorithm::AmFm,
            (false, true) => FourOpAlgorithm::FmAm,
            (true, true) => FourOpAlgorithm::AmAm,
        }
    }
}

/// How a channel produces its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SynthMode {
    /// Modulator feeds the carrier
    #[default]
    Fm,
    /// Both operators are summed
    Am,
    /// Primary of an active four-operator pair
    FourOp {
        /// Connection of the four operators
        algorithm: FourOpAlgorithm,
        /// Channel index of the secondary
        partner: usize,
    },
    /// Secondary of an active four-operator pair; silent on its own
    FourOpSecondary,
    /// Channels 6-8 while rhythm mode is on
    Rhythm,
}

/// Primary/secondary channel pairs that can be joined by register 0x104
///
/// Entry `k` is enabled by bit `k` of 0x104.
pub const FOUR_OP_PAIRS: [(usize, usize); 6] = [(0, 3), (1, 4), (2, 5), (9, 12), (10, 13), (11, 14)];

/// Four-op pair membership of a channel
///
/// # Returns
///
/// `(pair_index, is_primary)`, or `None` for channels that never pair
pub fn four_op_slot(channel: usize) -> Option<(usize, bool)> {
    FOUR_OP_PAIRS
        .iter()
        .enumerate()
        .find_map(|(k, &(primary, secondary))| {
            if channel == primary {
                Some((k, true))
            } else if channel == secondary {
                Some((k, false))
            } else {
                None
            }
        })
}

/// One chip channel
#[derive(Debug, Clone, Default)]
pub struct Channel {
    index: usize,
    reg_a0: u8,
    reg_b0: u8,
    reg_c0: u8,
    fnum: u16,
    block: u8,
    key_on: bool,
    /// Feedback shift amount (register C0 bits 1-3), 0 = off
    feedback: u8,
    connection: bool,
    pan_left: bool,
    pan_right: bool,
    /// Last two modulator outputs, oldest first
    old: [i32; 2],
    mode: SynthMode,
}

impl Channel {
    /// Create channel `index` (0-17), centred and silent
    pub fn new(index: usize) -> Self {
        Channel {
            index,
            pan_left: true,
            pan_right: true,
            ..Self::default()
        }
    }

    /// Channel index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Arena index of this channel's first operator
    #[inline]
    pub fn operator_base(&self) -> usize {
        self.index * 2
    }

    /// Register 0xA0: fnum low byte
    pub fn write_fnum_low(&mut self, value: u8) {
        self.reg_a0 = value;
        self.fnum = (self.fnum & 0x300) | value as u16;
    }

    /// Register 0xB0: key-on, block, fnum high bits
    ///
    /// # Returns
    ///
    /// The new key-on state if it changed
    pub fn write_key_block(&mut self, value: u8) -> Option<bool> {
        self.reg_b0 = value;
        self.fnum = (self.fnum & 0xff) | (((value & 3) as u16) << 8);
        self.block = (value >> 2) & 7;
        let key_on = value & 0x20 != 0;
        if key_on != self.key_on {
            self.key_on = key_on;
            Some(key_on)
        } else {
            None
        }
    }

    /// Copy frequency and key state from a four-op primary
    pub fn follow(&mut self, primary: &Channel) {
        self.fnum = primary.fnum;
        self.block = primary.block;
        self.key_on = primary.key_on;
    }

    /// Register 0xC0: panning, feedback, connection
    ///
    /// Panning only applies with OPL3 mode enabled; OPL2 output is mono.
    pub fn write_feedback(&mut self, value: u8, opl3: bool) {
        self.reg_c0 = value;
        self.feedback = (value >> 1) & 7;
        self.connection = value & 1 != 0;
        self.update_pan(opl3);
    }

    /// Re-derive panning after an OPL3 mode change
    pub fn update_pan(&mut self, opl3: bool) {
        if opl3 {
            self.pan_left = self.reg_c0 & 0x10 != 0;
            self.pan_right = self.reg_c0 & 0x20 != 0;
        } else {
            self.pan_left = true;
            self.pan_right = true;
        }
    }

    /// Four-op partners use the primary's panning
    pub fn copy_pan(&mut self, primary: &Channel) {
        self.pan_left = primary.pan_left;
        self.pan_right = primary.pan_right;
    }

    /// Key code for rate and level scaling
    ///
    /// `note_select` is register 0x08 bit 6: it picks fnum bit 8 instead of 9.
    pub fn keycode(&self, note_select: bool) -> u8 {
        let bit = if note_select {
            (self.fnum >> 8) & 1
        } else {
            (self.fnum >> 9) & 1
        };
        (self.block << 1) | bit as u8
    }

    /// Frequency number
    pub fn fnum(&self) -> u16 {
        self.fnum
    }

    /// Block (octave)
    pub fn block(&self) -> u8 {
        self.block
    }

    /// Channel key-on bit
    pub fn is_keyed(&self) -> bool {
        self.key_on
    }

    /// Connection bit (false = FM, true = AM)
    pub fn connection(&self) -> bool {
        self.connection
    }

    /// Output routing (left, right)
    pub fn pan(&self) -> (bool, bool) {
        (self.pan_left, self.pan_right)
    }

    /// Current synthesis mode
    pub fn mode(&self) -> SynthMode {
        self.mode
    }

    /// Set the synthesis mode
    pub fn set_mode(&mut self, mode: SynthMode) {
        self.mode = mode;
    }

    /// Raw values of registers A0, B0 and C0
    pub fn registers(&self) -> [u8; 3] {
        [self.reg_a0, self.reg_b0, self.reg_c0]
    }

    /// Forget the modulator history
    pub fn clear_feedback(&mut self) {
        self.old = [0; 2];
    }

    /// Render `op` with self-feedback from this channel's history
    #[inline]
    pub fn feedback_sample(&mut self, op: &mut Operator, lfo: &LfoState, tables: &RateTables) -> i32 {
        let modulation = if self.feedback == 0 {
            0
        } else {
            (self.old[0] + self.old[1]) >> (9 - self.feedback)
        };
        let out = op.sample(modulation, lfo, tables);
        self.old = [self.old[1], out];
        out
    }

    /// Render one sample for a two- or four-operator channel
    ///
    /// Rhythm and four-op secondary channels return 0; the chip renders them
    /// elsewhere.
    pub fn render(&mut self, ops: &mut [Operator], lfo: &LfoState, tables: &RateTables) -> i32 {
        let b = self.operator_base();
        match self.mode {
            SynthMode::Fm => {
                if ops[b + 1].is_silent() {
                    self.clear_feedback();
                    return 0;
                }
                let out0 = self.feedback_sample(&mut ops[b], lfo, tables);
                ops[b + 1].sample(out0, lfo, tables)
            }
            SynthMode::Am => {
                if ops[b].is_silent() && ops[b + 1].is_silent() {
                    self.clear_feedback();
                    return 0;
                }
                let out0 = self.feedback_sample(&mut ops[b], lfo, tables);
                out0 + ops[b + 1].sample(0, lfo, tables)
            }
            SynthMode::FourOp { algorithm, partner } => {
                let p = partner * 2;
                if four_op_silent(algorithm, ops, b, p) {
                    self.clear_feedback();
                    return 0;
                }
                let out0 = self.feedback_sample(&mut ops[b], lfo, tables);
                match algorithm {
                    FourOpAlgorithm::FmFm => {
                        let out1 = ops[b + 1].sample(out0, lfo, tables);
                        let out2 = ops[p].sample(out1, lfo, tables);
                        ops[p + 1].sample(out2, lfo, tables)
                    }
                    FourOpAlgorithm::AmFm => {
                        let out1 = ops[b + 1].sample(0, lfo, tables);
                        let out2 = ops[p].sample(out1, lfo, tables);
                        out0 + ops[p + 1].sample(out2, lfo, tables)
                    }
                    FourOpAlgorithm::FmAm => {
                        let out1 = ops[b + 1].sample(out0, lfo, tables);
                        let out2 = ops[p].sample(0, lfo, tables);
                        out1 + ops[p + 1].sample(out2, lfo, tables)
                    }
                    FourOpAlgorithm::AmAm => {
                        let out1 = ops[b + 1].sample(0, lfo, tables);
                        let out2 = ops[p].sample(out1, lfo, tables);
                        out0 + out2 + ops[p + 1].sample(0, lfo, tables)
                    }
                }
            }
            SynthMode::FourOpSecondary | SynthMode::Rhythm => 0,
        }
    }
}

/// True when every operator that reaches the output of a four-op algorithm
/// is silent
fn four_op_silent(algorithm: FourOpAlgorithm, ops: &[Operator], b: usize, p: usize) -> bool {
    match algorithm {
        FourOpAlgorithm::FmFm => ops[p + 1].is_silent(),
        FourOpAlgorithm::AmFm => ops[b].is_silent() && ops[p + 1].is_silent(),
        FourOpAlgorithm::FmAm => ops[b + 1].is_silent() && ops[p + 1].is_silent(),
        FourOpAlgorithm::AmAm => {
            ops[b].is_silent() && ops[p].is_silent() && ops[p + 1].is_silent()
        }
    }
}
