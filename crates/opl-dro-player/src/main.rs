//! DRO capture player
//!
//! Plays DOSBox raw OPL captures through the OPL emulator, either on the
//! default audio device or rendered to a WAV file.

mod args;
mod audio;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use opl::capture::parse_dro;
use opl::export::{export_dro_to_wav, ExportConfig};
use opl::replayer::mode_for_hardware;
use opl::{DroPlayer, DroSong, OplConfig};
use parking_lot::Mutex;

use args::CliArgs;
use audio::Speakers;

/// Progress line refresh interval
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

fn load_song(path: &str) -> Result<DroSong> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {path}"))?;
    parse_dro(&data).with_context(|| format!("{path} is not a DRO v2.0 capture"))
}

/// Device configuration from the config file (if any) and the flags
fn device_config(args: &CliArgs, song: &DroSong) -> Result<OplConfig> {
    let mut config = match &args.config_path {
        Some(path) => OplConfig::load(path).with_context(|| format!("Failed to load {path}"))?,
        None => OplConfig::for_mode(mode_for_hardware(song.header.hardware)),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if args.remove_dc {
        config.remove_dc_bias = true;
    }
    // captures begin with their own register setup
    config.adlib_driver_defaults = false;
    // playback never records itself
    config.capture_dir = None;
    config.validate()?;
    Ok(config)
}

fn print_song_info(path: &str, song: &DroSong, config: &OplConfig) {
    let secs = song.duration_ms() as f64 / 1000.0;
    println!("File:        {path}");
    println!("Hardware:    {:?}", song.header.hardware);
    println!("Length:      {}:{:05.2}", (secs / 60.0) as u64, secs % 60.0);
    println!("Writes:      {}", song.write_count());
    println!("Card:        {}", config.mode);
    println!("Sample rate: {} Hz\n", config.sample_rate);
}

fn render_to_wav(mut player: DroPlayer, args: &CliArgs, out: &str) -> Result<()> {
    let export = ExportConfig::default()
        .normalize(args.normalize)
        .fade_out(args.fade_out);
    let started = Instant::now();
    let frames = export_dro_to_wav(&mut player, Path::new(out), export)?;
    println!(
        "Wrote {} frames to {} in {:.2}s",
        frames,
        out,
        started.elapsed().as_secs_f32()
    );
    Ok(())
}

fn play(player: DroPlayer) -> Result<()> {
    let total_ms = player.song().duration_ms();
    let player = Arc::new(Mutex::new(player));
    let speakers = Speakers::start(Arc::clone(&player))?;

    while !speakers.is_done() {
        let position = player.lock().position_ms() as u64;
        print!(
            "\rPlaying {:>4}.{:01}s / {}.{:01}s",
            position / 1000,
            position % 1000 / 100,
            total_ms / 1000,
            total_ms % 1000 / 100
        );
        std::io::stdout().flush().ok();
        std::thread::sleep(PROGRESS_INTERVAL);
    }
    speakers.stop();
    println!("\nPlayback complete!");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    if args.show_help {
        CliArgs::print_help();
        return Ok(());
    }
    let Some(path) = args.file_path.clone() else {
        CliArgs::print_help();
        bail!("No capture file given");
    };

    let song = load_song(&path)?;
    let config = device_config(&args, &song)?;
    print_song_info(&path, &song, &config);
    log::debug!("Device configuration: {config:?}");

    let player = DroPlayer::with_config(song, config)?;
    match &args.wav_path {
        Some(out) => render_to_wav(player, &args, out),
        None => play(player),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opl::capture::DroHeader;
    use opl::{DroHardware, OplMode};

    fn song(hardware: DroHardware) -> DroSong {
        let mut header = DroHeader::new(0);
        header.hardware = hardware;
        DroSong {
            header,
            table: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_config_follows_capture_hardware() {
        let config = device_config(&CliArgs::default(), &song(DroHardware::DualOpl2)).unwrap();
        assert_eq!(config.mode, OplMode::DualOpl2);
        assert!(!config.adlib_driver_defaults);
    }

    #[test]
    fn test_flags_override_capture() {
        let args = CliArgs {
            mode: Some(OplMode::Esfm),
            sample_rate: Some(22050),
            remove_dc: true,
            ..Default::default()
        };
        let config = device_config(&args, &song(DroHardware::Opl2)).unwrap();
        assert_eq!(config.mode, OplMode::Esfm);
        assert_eq!(config.sample_rate, 22050);
        assert!(config.remove_dc_bias);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let args = CliArgs {
            sample_rate: Some(100),
            ..Default::default()
        };
        assert!(device_config(&args, &song(DroHardware::Opl3)).is_err());
    }
}
