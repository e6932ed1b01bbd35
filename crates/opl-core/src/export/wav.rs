//! WAV file export functionality

use std::path::Path;

use super::ExportConfig;
use crate::backend::Frame;
use crate::replayer::DroPlayer;
use crate::{OplError, Result};

/// Write stereo frames to a 16-bit WAV file
pub fn write_wav<P: AsRef<Path>>(path: P, frames: &[Frame], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)
        .map_err(|e| OplError::AudioFileError(format!("Failed to create WAV file: {}", e)))?;

    for frame in frames {
        for sample in [frame.left, frame.right] {
            writer
                .write_sample(sample)
                .map_err(|e| OplError::AudioFileError(format!("Failed to write sample: {}", e)))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| OplError::AudioFileError(format!("Failed to finalize WAV file: {}", e)))?;
    Ok(())
}

/// Render a DRO capture to a WAV file
///
/// Plays from the player's current position to the end.
///
/// # Returns
///
/// Number of frames written
pub fn export_dro_to_wav<P: AsRef<Path>>(
    player: &mut DroPlayer,
    output_path: P,
    config: ExportConfig,
) -> Result<usize> {
    let sample_rate = player.sample_rate();
    let mut frames = player.render_all();
    config.apply(&mut frames, sample_rate);

    log::info!(
        "Writing {} frames ({:.1}s) to {}",
        frames.len(),
        frames.len() as f64 / sample_rate as f64,
        output_path.as_ref().display()
    );
    write_wav(output_path, &frames, sample_rate)?;
    Ok(frames.len())
}
