//! Audio export
//!
//! Renders frames or whole DRO captures to 16-bit stereo files.
//!
//! # Examples
//!
//! ```no_run
//! use opl::capture::parse_dro;
//! use opl::export::{export_dro_to_wav, ExportConfig};
//! use opl::DroPlayer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("capture.dro")?;
//! let mut player = DroPlayer::new(parse_dro(&data)?, 44100)?;
//!
//! export_dro_to_wav(&mut player, "capture.wav", ExportConfig::default().fade_out(1.5))?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "export-wav")]
mod wav;
#[cfg(feature = "export-wav")]
pub use wav::*;

use crate::backend::Frame;

/// Export configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// Scale the output so the loudest sample sits just below full scale
    pub normalize: bool,
    /// Fade out duration in seconds (0 = no fade)
    pub fade_out_duration: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            normalize: false,
            fade_out_duration: 0.0,
        }
    }
}

impl ExportConfig {
    /// Enable normalization
    pub fn normalize(mut self, enable: bool) -> Self {
        self.normalize = enable;
        self
    }

    /// Add fade out at the end
    pub fn fade_out(mut self, duration_seconds: f32) -> Self {
        self.fade_out_duration = duration_seconds;
        self
    }

    /// Apply the configured post-processing in place
    pub fn apply(&self, frames: &mut [Frame], sample_rate: u32) {
        if self.normalize {
            normalize_frames(frames);
        }
        if self.fade_out_duration > 0.0 {
            apply_fade_out(frames, self.fade_out_duration, sample_rate);
        }
    }
}

/// Scale both sides by the same factor so the peak reaches 95% of full scale
fn normalize_frames(frames: &mut [Frame]) {
    let peak = frames
        .iter()
        .map(|f| f.left.unsigned_abs().max(f.right.unsigned_abs()))
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return;
    }

    let scale = 0.95 * i16::MAX as f32 / peak as f32;
    let scale_sample = |s: i16| (s as f32 * scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    for frame in frames.iter_mut() {
        *frame = Frame::new(scale_sample(frame.left), scale_sample(frame.right));
    }
}

/// Apply a linear fade out to the end of the frames
fn apply_fade_out(frames: &mut [Frame], fade_duration: f32, sample_rate: u32) {
    if fade_duration <= 0.0 || frames.is_empty() {
        return;
    }

    let fade_frames = ((fade_duration * sample_rate as f32) as usize).max(1);
    let start_fade = frames.len().saturating_sub(fade_frames);

    for (i, frame) in frames.iter_mut().enumerate().skip(start_fade) {
        let factor = 1.0 - (i - start_fade) as f32 / fade_frames as f32;
        *frame = Frame::new(
            (frame.left as f32 * factor) as i16,
            (frame.right as f32 * factor) as i16,
        );
    }
}
