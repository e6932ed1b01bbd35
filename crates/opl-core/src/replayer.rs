//! DRO capture playback
//!
//! Feeds a parsed capture into an [`OplDevice`] on a virtual millisecond
//! clock. Captured registers are already resolved, so they skip the port
//! address latch: a capture may set bank-1 registers before 0x105 enables
//! OPL3 addressing.

use crate::backend::Frame;
use crate::capture::{DroEvent, DroHardware, DroSong};
use crate::config::OplConfig;
use crate::device::OplDevice;
use crate::port::OplMode;
use crate::Result;

/// Card a capture was recorded on
pub fn mode_for_hardware(hardware: DroHardware) -> OplMode {
    match hardware {
        DroHardware::Opl2 => OplMode::Opl2,
        DroHardware::DualOpl2 => OplMode::DualOpl2,
        DroHardware::Opl3 => OplMode::Opl3,
    }
}

/// Streams a DRO capture as audio frames
#[derive(Debug)]
pub struct DroPlayer {
    song: DroSong,
    device: OplDevice,
    position: usize,
    now_ms: f64,
    /// Frames produced so far
    produced: u64,
    /// Frames owed before the next event
    pending: u64,
}

impl DroPlayer {
    /// Create a player on the card the capture was recorded on
    pub fn new(song: DroSong, sample_rate: u32) -> Result<Self> {
        let config = OplConfig::for_mode(mode_for_hardware(song.header.hardware))
            .sample_rate(sample_rate)
            .adlib_driver_defaults(false);
        Self::with_config(song, config)
    }

    /// Create a player with an explicit device configuration
    pub fn with_config(song: DroSong, config: OplConfig) -> Result<Self> {
        let device = OplDevice::new(config)?;
        Ok(DroPlayer {
            song,
            device,
            position: 0,
            now_ms: 0.0,
            produced: 0,
            pending: 0,
        })
    }

    /// Parsed capture
    pub fn song(&self) -> &DroSong {
        &self.song
    }

    /// Device the capture is played on
    pub fn device(&self) -> &OplDevice {
        &self.device
    }

    /// Mutable device (channel muting)
    pub fn device_mut(&mut self) -> &mut OplDevice {
        &mut self.device
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.device.config().sample_rate
    }

    /// Total length in frames
    pub fn total_frames(&self) -> u64 {
        self.song.duration_ms() * self.sample_rate() as u64 / 1000
    }

    /// Playback position in milliseconds
    pub fn position_ms(&self) -> f64 {
        self.now_ms
    }

    /// True once every event has been played and no frames are owed
    pub fn is_finished(&self) -> bool {
        self.position >= self.song.events.len() && self.pending == 0
    }

    /// Rewind to the start
    pub fn restart(&mut self) {
        self.device.reset();
        self.position = 0;
        self.now_ms = 0.0;
        self.produced = 0;
        self.pending = 0;
    }

    fn apply(&mut self, event: DroEvent) {
        match event {
            DroEvent::Write { reg, value } => self.device.write_register(reg, value, self.now_ms),
            DroEvent::Delay(ms) => {
                self.now_ms += ms as f64;
                let target = (self.now_ms * self.sample_rate() as f64 / 1000.0) as u64;
                self.pending = target.saturating_sub(self.produced);
            }
        }
    }

    /// Fill `out` with the next frames
    ///
    /// # Returns
    ///
    /// Number of frames written; less than `out.len()` only at the end
    pub fn fill(&mut self, out: &mut [Frame]) -> usize {
        let mut filled = 0;
        while filled < out.len() {
            if self.pending > 0 {
                let count = (self.pending as usize).min(out.len() - filled);
                self.device
                    .audio_callback_into(&mut out[filled..filled + count], self.now_ms);
                filled += count;
                self.pending -= count as u64;
                self.produced += count as u64;
                continue;
            }
            let Some(&event) = self.song.events.get(self.position) else {
                break;
            };
            self.position += 1;
            self.apply(event);
        }
        filled
    }

    /// Render the whole capture
    pub fn render_all(&mut self) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(self.total_frames() as usize);
        let mut chunk = vec![Frame::default(); 4096];
        loop {
            let n = self.fill(&mut chunk);
            frames.extend_from_slice(&chunk[..n]);
            if n < chunk.len() {
                break;
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DroHeader;

    fn song(events: Vec<DroEvent>, hardware: DroHardware) -> DroSong {
        let mut header = DroHeader::new(0);
        header.hardware = hardware;
        DroSong {
            header,
            table: Vec::new(),
            events,
        }
    }

    fn tone(reg_base: u16) -> Vec<DroEvent> {
        let mut events = Vec::new();
        for (reg, value) in [(0x23, 0x01), (0x43, 0x00), (0x63, 0xf0), (0xa0, 0x44), (0xb0, 0x32)] {
            events.push(DroEvent::Write {
                reg: reg_base | reg,
                value,
            });
        }
        events
    }

    #[test]
    fn test_renders_exact_length() {
        let mut events = tone(0);
        events.push(DroEvent::Delay(100));
        events.push(DroEvent::Delay(900));
        let mut player = DroPlayer::new(song(events, DroHardware::Opl2), 44100).unwrap();
        let frames = player.render_all();
        assert_eq!(frames.len(), 44100);
        assert!(player.is_finished());
        assert!(frames.iter().any(|f| !f.is_silent()));
    }

    #[test]
    fn test_dual_opl2_right_side() {
        let mut events = tone(0x100);
        events.push(DroEvent::Write { reg: 0x1c0, value: 0x00 });
        events.push(DroEvent::Delay(50));
        let mut player = DroPlayer::new(song(events, DroHardware::DualOpl2), 49716).unwrap();
        let frames = player.render_all();
        assert!(frames.iter().any(|f| f.right != 0));
        assert!(frames.iter().all(|f| f.left == 0));
    }

    #[test]
    fn test_restart() {
        let mut events = tone(0);
        events.push(DroEvent::Delay(20));
        let mut player = DroPlayer::new(song(events, DroHardware::Opl3), 49716).unwrap();
        let first = player.render_all();
        player.restart();
        let second = player.render_all();
        assert_eq!(first, second);
    }
}
