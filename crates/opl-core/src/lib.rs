//! OPL2/OPL3 FM Synthesis Emulator
//!
//! A sample-accurate emulator of the Yamaha YM3812 (OPL2) and YMF262 (OPL3)
//! FM synthesis chips as found on AdLib and Sound Blaster cards, including
//! the dual-OPL2 layout of the Sound Blaster Pro 1 and the ESS ESFM's
//! OPL3-compatible mode.
//!
//! # Features
//! - 18 two-operator channels, four-operator pairs and rhythm mode
//! - All eight OPL3 waveforms with the OPL2 waveform-select rules
//! - Tremolo/vibrato LFO and the rhythm noise generator
//! - Timer 1/2 with status port and optional IRQ callback
//! - Port decoding for OPL2, dual OPL2, OPL3 and ESFM (native-mode addressing)
//! - Render-up-to-now FIFO so register writes land on the right sample
//! - DRO v2.0 capture and playback, RAD instrument dumps
//! - WAV rendering (feature `export-wav`)
//!
//! # Backend Trait
//! The device is written against [`OplBackend`]; [`Opl3`] is the built-in
//! engine.
//!
//! # Quick start
//! ## Engine only
//! ```
//! use opl::{Opl3, OplBackend};
//!
//! let mut chip = Opl3::new(49716);
//! chip.write_register(0x23, 0x01); // carrier: multiple 1
//! chip.write_register(0x63, 0xF0); // fastest attack
//! chip.write_register(0xA0, 0x44); // fnum low
//! chip.write_register(0xB0, 0x32); // key on, block 4
//! let frames = chip.generate_frames(512);
//! ```
//!
//! ## Port-level device
//! ```
//! use opl::{OplConfig, OplDevice};
//!
//! let mut device = OplDevice::new(OplConfig::default())?;
//! device.port_write(0x388, 0xB0, 0.0);
//! device.port_write(0x389, 0x32, 0.0);
//! let audio = device.audio_callback(1024, 20.0);
//! # Ok::<(), opl::OplError>(())
//! ```

#![warn(missing_docs)]

pub mod backend; // Backend trait abstraction
pub mod capture; // DRO / RAD capture
pub mod config;
pub mod dc_filter;
pub mod device; // Port-level card with FIFO and capture glue
pub mod export;
pub mod opl3; // FM synthesis engine (core)
pub mod port;
pub mod replayer;
pub mod timer;

/// Error types for OPL emulator operations
#[derive(thiserror::Error, Debug)]
pub enum OplError {
    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Capture could not be written
    #[error("Capture error: {0}")]
    CaptureError(String),

    /// Capture file could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Audio file output failed
    #[error("Audio file error: {0}")]
    AudioFileError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for OplError {
    /// Converts a String into `OplError::Other`.
    ///
    /// Prefer the specific variants where the kind of failure is known.
    fn from(msg: String) -> Self {
        OplError::Other(msg)
    }
}

impl From<&str> for OplError {
    /// Converts a string slice into `OplError::Other`.
    fn from(msg: &str) -> Self {
        OplError::Other(msg.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, OplError>;

// Public API exports
pub use backend::{Frame, OplBackend};
pub use capture::{parse_dro, DroCapture, DroEvent, DroHardware, DroSong};
pub use config::OplConfig;
pub use device::{OplDevice, SharedOpl};
pub use opl3::{Opl3, RateTables, RegisterFile};
pub use port::{OplMode, PortDecoder};
pub use replayer::DroPlayer;
pub use timer::{StatusFlags, TimerControl, TimerUnit};
