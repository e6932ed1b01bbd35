//! OPL FM Synthesis Domain
//!
//! Yamaha OPL2 (YM3812) and OPL3 (YMF262) synthesis engine: operators with
//! phase, envelope and waveform stages, two- and four-operator channels, the
//! rhythm section and the shared LFO/noise sources.
//!
//! Implementation:
//! - `chip` - Sample generator tying everything together behind [`crate::OplBackend`]
//! - `tables` - Sample-rate dependent lookup tables, shared through `Arc`

// Internal modules
pub mod channel;
pub mod chip;
pub mod envelope;
pub mod lfo;
pub mod operator;
pub mod percussion;
pub mod phase;
pub mod registers;
pub mod tables;
pub mod waveform;

// Re-export public API
pub use channel::{Channel, FourOpAlgorithm, SynthMode};
pub use chip::Opl3;
pub use envelope::{EnvelopeGenerator, EnvelopeState};
pub use lfo::{LfoState, LfoUnit, NoiseGenerator};
pub use operator::Operator;
pub use percussion::{PercussionMixer, RhythmFlags};
pub use phase::PhaseGenerator;
pub use registers::{Register, RegisterFile};
pub use tables::RateTables;
pub use waveform::{Waveform, WaveformSynthesizer};
