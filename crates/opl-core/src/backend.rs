//! Backend trait abstraction for OPL synthesis engines
//!
//! The device layer (port decoding, timers, FIFO, capture) is written against
//! [`OplBackend`] so the synthesis engine is picked once, when the device is
//! built, rather than switched on per sample.

use std::sync::Arc;

use crate::opl3::tables::RateTables;

/// One stereo output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Frame {
    /// Left sample
    pub left: i16,
    /// Right sample
    pub right: i16,
}

impl Frame {
    /// Create a frame
    pub const fn new(left: i16, right: i16) -> Self {
        Frame { left, right }
    }

    /// True if both sides are exactly zero
    pub fn is_silent(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// Common interface for OPL synthesis engines
///
/// # Example
///
/// ```
/// use opl::{OplBackend, Opl3};
///
/// fn beep<B: OplBackend>(chip: &mut B) {
///     chip.write_register(0x20, 0x01); // modulator: multiple 1
///     chip.write_register(0x23, 0x01); // carrier: multiple 1
///     chip.write_register(0x43, 0x00); // carrier at full level
///     chip.write_register(0x63, 0xF0); // fastest attack
///     chip.write_register(0xA0, 0x44); // fnum low
///     chip.write_register(0xB0, 0x32); // key on, block 4, fnum high
///
///     let frame = chip.generate_frame();
/// }
///
/// beep(&mut Opl3::new(49716));
/// ```
pub trait OplBackend: Send {
    /// Create an engine for the given output sample rate
    fn new(sample_rate: u32) -> Self
    where
        Self: Sized;

    /// Create an engine that shares already built tables
    fn with_tables(tables: Arc<RateTables>) -> Self
    where
        Self: Sized;

    /// Reset the engine to its power-on state
    ///
    /// Clears all registers and silences every voice.
    fn reset(&mut self);

    /// Write to a register
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address (0x000-0x1FF); bit 8 selects the second bank
    /// * `value` - Register value
    ///
    /// Unmapped addresses are stored but have no effect.
    fn write_register(&mut self, addr: u16, value: u8);

    /// Read back the last value written to a register
    ///
    /// Addresses outside the register space read as 0xFF.
    fn read_register(&self, addr: u16) -> u8;

    /// Advance one output sample and return it
    fn generate_frame(&mut self) -> Frame;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Generate multiple frames
    ///
    /// # Arguments
    ///
    /// * `count` - Number of frames to generate
    fn generate_frames(&mut self, count: usize) -> Vec<Frame> {
        let mut frames = vec![Frame::default(); count];
        self.generate_frames_into(&mut frames);
        frames
    }

    /// Generate frames into a caller-provided buffer
    ///
    /// This avoids per-call allocations; prefer this in hot paths.
    fn generate_frames_into(&mut self, buffer: &mut [Frame]) {
        for frame in buffer.iter_mut() {
            *frame = self.generate_frame();
        }
    }

    /// Per-channel outputs of the last frame, before panning
    ///
    /// Rhythm mode reports the combined drum output on channel 6.
    fn channel_outputs(&self) -> [i32; 18];

    /// Mute or unmute a channel
    ///
    /// A muted channel keeps running; only its contribution to the mix is
    /// dropped.
    fn set_channel_mute(&mut self, channel: usize, mute: bool);

    /// Check if a channel is muted
    fn is_channel_muted(&self, channel: usize) -> bool;
}
