//! Speaker output using rodio
//!
//! The player lives behind a mutex so the main thread can report progress
//! while rodio's mixer thread pulls frames through [`PlayerSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use opl::{DroPlayer, Frame};
use parking_lot::Mutex;
use rodio::{OutputStream, Sink, Source};

/// Frames pulled from the player per lock
const CHUNK_FRAMES: usize = 2048;

/// Interleaved stereo `i16` source reading from a shared [`DroPlayer`]
pub struct PlayerSource {
    player: Arc<Mutex<DroPlayer>>,
    sample_rate: u32,
    stopped: Arc<AtomicBool>,
    chunk: Vec<Frame>,
    /// Frames of `chunk` that hold audio
    filled: usize,
    /// Next sample, counted in interleaved samples
    position: usize,
}

impl PlayerSource {
    /// Create a source; setting `stopped` ends the stream early
    pub fn new(player: Arc<Mutex<DroPlayer>>, stopped: Arc<AtomicBool>) -> Self {
        let sample_rate = player.lock().sample_rate();
        PlayerSource {
            player,
            sample_rate,
            stopped,
            chunk: vec![Frame::default(); CHUNK_FRAMES],
            filled: 0,
            position: 0,
        }
    }

    fn refill(&mut self) -> bool {
        self.filled = self.player.lock().fill(&mut self.chunk);
        self.position = 0;
        self.filled > 0
    }
}

impl Iterator for PlayerSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.stopped.load(Ordering::Relaxed) {
            return None;
        }
        if self.position >= self.filled * 2 && !self.refill() {
            return None;
        }
        let frame = self.chunk[self.position / 2];
        let sample = if self.position % 2 == 0 {
            frame.left
        } else {
            frame.right
        };
        self.position += 1;
        Some(sample)
    }
}

impl Source for PlayerSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Playback on the default output device
pub struct Speakers {
    _stream: OutputStream,
    sink: Sink,
    stopped: Arc<AtomicBool>,
}

impl Speakers {
    /// Open the default device and start playing `player`
    pub fn start(player: Arc<Mutex<DroPlayer>>) -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("Failed to open the default audio device")?;
        let sink = Sink::try_new(&handle).context("Failed to create audio sink")?;
        let stopped = Arc::new(AtomicBool::new(false));
        sink.append(PlayerSource::new(player, Arc::clone(&stopped)));
        Ok(Speakers {
            _stream: stream,
            sink,
            stopped,
        })
    }

    /// True once the source has run dry
    pub fn is_done(&self) -> bool {
        self.sink.empty()
    }

    /// End playback
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.sink.stop();
    }
}
