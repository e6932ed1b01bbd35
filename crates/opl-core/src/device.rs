//! OPL sound card device
//!
//! Glues the port decoder, the timers and a synthesis engine together and
//! keeps audio in step with port writes:
//!
//! - every port write first renders the frames owed up to the write's
//!   timestamp into a FIFO, so a register change lands on the right sample
//! - the audio pull drains that FIFO and synthesizes whatever is still
//!   missing, then re-syncs the render cursor to the host clock
//!
//! Timestamps are host milliseconds as `f64`, the same clock the timers use.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Frame, OplBackend};
use crate::capture::{save_rad, DroCapture};
use crate::config::OplConfig;
use crate::dc_filter::DcFilter;
use crate::opl3::registers::{RegisterFile, ESFM_REGISTER_COUNT};
use crate::opl3::Opl3;
use crate::port::{is_poke_hole, OplMode, PortDecoder, PortRead, PortWrite};
use crate::timer::{IrqCallback, TimerUnit};
use crate::{OplError, Result};

/// Operator offsets of the nine melodic modulators
const MODULATOR_OFFSETS: [u16; 9] = [0, 1, 2, 8, 9, 10, 16, 17, 18];
/// Operator offsets of the nine melodic carriers
const CARRIER_OFFSETS: [u16; 9] = [3, 4, 5, 11, 12, 13, 19, 20, 21];

/// OPL sound card: ports, timers, engine and capture
pub struct OplDevice<B: OplBackend = Opl3> {
    config: OplConfig,
    engine: B,
    decoder: PortDecoder,
    /// One timer pair per chip; only dual OPL2 uses the second
    timers: [TimerUnit; 2],
    /// Data writes as the host made them, for capture and instrument dumps
    cache: RegisterFile,
    /// ESFM native register space
    native: RegisterFile,
    fifo: VecDeque<Frame>,
    ms_per_frame: f64,
    last_rendered_ms: f64,
    dc_filters: Option<[DcFilter; 2]>,
    capture: Option<DroCapture>,
    sleep_after_frames: Option<u64>,
    silent_frames: u64,
    sleeping: bool,
}

impl OplDevice<Opl3> {
    /// Create a device using the built-in OPL3 engine
    ///
    /// # Example
    ///
    /// ```
    /// use opl::{OplConfig, OplDevice, OplMode};
    ///
    /// let mut device = OplDevice::new(OplConfig::for_mode(OplMode::Opl2))?;
    /// device.port_write(0x388, 0x04, 0.0);
    /// device.port_write(0x389, 0x60, 0.0);
    /// assert_eq!(device.port_read(0x388, 0.0), 0x06);
    /// # Ok::<(), opl::OplError>(())
    /// ```
    pub fn new(config: OplConfig) -> Result<Self> {
        Self::with_backend(config)
    }
}

impl<B: OplBackend> OplDevice<B> {
    /// Create a device around engine `B`
    pub fn with_backend(config: OplConfig) -> Result<Self> {
        config.validate()?;
        let engine = B::new(config.sample_rate);
        let mut device = OplDevice {
            engine,
            decoder: PortDecoder::new(config.mode),
            timers: [TimerUnit::new(), TimerUnit::new()],
            cache: RegisterFile::new(),
            native: RegisterFile::with_size(ESFM_REGISTER_COUNT),
            fifo: VecDeque::with_capacity(config.fifo_capacity),
            ms_per_frame: 1000.0 / config.sample_rate as f64,
            last_rendered_ms: 0.0,
            dc_filters: config.remove_dc_bias.then(|| [DcFilter::new(), DcFilter::new()]),
            capture: config.capture_dir.as_ref().map(DroCapture::new),
            sleep_after_frames: config.sleep_after_frames(),
            silent_frames: 0,
            sleeping: false,
            config,
        };
        device.power_on();
        Ok(device)
    }

    fn power_on(&mut self) {
        if self.config.mode == OplMode::DualOpl2 {
            // both banks live in one OPL3 engine
            self.engine.write_register(0x105, 0x01);
            self.cache.write(0x105, 0x01);
        }
        if self.config.adlib_driver_defaults {
            self.load_adlib_driver_voices();
        }
    }

    /// Program the AdLib driver's default piano-like voice on channels 0-8
    ///
    /// Goes straight to the engine; the cache and capture never see it.
    fn load_adlib_driver_voices(&mut self) {
        for offset in MODULATOR_OFFSETS {
            for (reg, value) in [(0x20, 0x01), (0x40, 0x4f), (0x60, 0xf1), (0x80, 0x53)] {
                self.engine.write_register(reg + offset, value);
            }
        }
        for offset in CARRIER_OFFSETS {
            for (reg, value) in [(0x20, 0x11), (0x40, 0x00), (0x60, 0xf2), (0x80, 0x74)] {
                self.engine.write_register(reg + offset, value);
            }
        }
    }

    /// Configuration the device was built with
    pub fn config(&self) -> &OplConfig {
        &self.config
    }

    /// Synthesis engine
    pub fn engine(&self) -> &B {
        &self.engine
    }

    /// Mutable synthesis engine (channel muting and such)
    pub fn engine_mut(&mut self) -> &mut B {
        &mut self.engine
    }

    /// Register cache of data writes made through the ports
    pub fn cache(&self) -> &RegisterFile {
        &self.cache
    }

    /// Port decoder state
    pub fn decoder(&self) -> &PortDecoder {
        &self.decoder
    }

    /// Timer pair of a chip (1 only exists on dual OPL2)
    pub fn timers(&self, chip: usize) -> Option<&TimerUnit> {
        self.timers.get(chip)
    }

    /// Install an IRQ callback on a chip's timers
    pub fn set_irq_callback(&mut self, chip: usize, callback: IrqCallback) {
        if let Some(timers) = self.timers.get_mut(chip) {
            timers.set_irq_callback(callback);
        }
    }

    /// Frames rendered ahead of the next audio pull
    pub fn queued_frames(&self) -> usize {
        self.fifo.len()
    }

    /// Is the device idle after a run of silence?
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Reset engine, timers, decoder and caches to power-on
    pub fn reset(&mut self) {
        self.engine.reset();
        self.decoder.reset();
        self.timers = [TimerUnit::new(), TimerUnit::new()];
        self.cache.clear();
        self.native.clear();
        self.fifo.clear();
        if let Some(filters) = self.dc_filters.as_mut() {
            filters.iter_mut().for_each(DcFilter::reset);
        }
        self.silent_frames = 0;
        self.sleeping = false;
        self.power_on();
    }

    fn render_frame(&mut self) -> Frame {
        let mut frame = self.engine.generate_frame();
        if let Some([left, right]) = self.dc_filters.as_mut() {
            frame = Frame::new(left.process(frame.left), right.process(frame.right));
        }

        if let Some(limit) = self.sleep_after_frames {
            if frame.is_silent() {
                self.silent_frames += 1;
                if self.silent_frames >= limit && !self.sleeping {
                    log::debug!("OPL output silent for {} frames, going idle", self.silent_frames);
                    self.sleeping = true;
                }
            } else {
                self.silent_frames = 0;
            }
        }
        frame
    }

    /// Render every frame owed up to `now_ms` into the FIFO
    ///
    /// An idle device only wakes up: the cursor jumps to `now_ms` and the
    /// silent gap is not rendered.
    pub fn render_up_to_now(&mut self, now_ms: f64) {
        if self.sleeping {
            log::debug!("OPL waking up at {now_ms:.3} ms");
            self.sleeping = false;
            self.silent_frames = 0;
            self.last_rendered_ms = now_ms;
            return;
        }
        while self.last_rendered_ms < now_ms {
            self.last_rendered_ms += self.ms_per_frame;
            let frame = self.render_frame();
            if self.fifo.len() >= self.config.fifo_capacity {
                self.fifo.pop_front();
                log::debug!("OPL FIFO full, dropping oldest frame");
            }
            self.fifo.push_back(frame);
            if self.sleeping {
                self.last_rendered_ms = now_ms;
                break;
            }
        }
    }

    /// Fill `out` with audio for the host mixer
    ///
    /// Queued frames are used first; the rest is synthesized on the spot.
    pub fn audio_callback_into(&mut self, out: &mut [Frame], now_ms: f64) {
        let mut filled = 0;
        while filled < out.len() {
            let Some(frame) = self.fifo.pop_front() else {
                break;
            };
            out[filled] = frame;
            filled += 1;
        }
        for slot in out[filled..].iter_mut() {
            *slot = if self.sleeping {
                Frame::default()
            } else {
                self.render_frame()
            };
        }
        self.last_rendered_ms = now_ms;
    }

    /// Pull `frames` frames of audio at host time `now_ms`
    pub fn audio_callback(&mut self, frames: usize, now_ms: f64) -> Vec<Frame> {
        let mut out = vec![Frame::default(); frames];
        self.audio_callback_into(&mut out, now_ms);
        out
    }

    /// Handle a byte written to one of the card's ports
    ///
    /// # Arguments
    ///
    /// * `port` - Absolute port (only the low four bits are decoded)
    /// * `value` - Byte written
    /// * `now_ms` - Host time in milliseconds
    pub fn port_write(&mut self, port: u16, value: u8, now_ms: f64) {
        self.render_up_to_now(now_ms);

        match self.decoder.write(port, value) {
            PortWrite::Latched => {}
            PortWrite::Data { reg, value } => self.write_data(reg, value, now_ms),
            PortWrite::Dual { targets, value } => {
                for (index, target) in targets.into_iter().enumerate() {
                    if let Some(reg) = target {
                        self.dual_write(index, reg, value, now_ms);
                    }
                }
            }
            PortWrite::Native { reg, value } => {
                if is_poke_hole(reg) && self.timers[0].write(reg & 0xff, value, now_ms) {
                    return;
                }
                self.native.write(reg, value);
            }
            PortWrite::LeftNative => log::debug!("ESFM back in legacy mode"),
        }
    }

    /// Write a register by its full address, skipping the port address latch
    ///
    /// Bit 8 of `reg` picks the second bank, or the right chip of a dual
    /// OPL2. Timer, capture and dual-OPL2 rules apply as for port writes.
    pub fn write_register(&mut self, reg: u16, value: u8, now_ms: f64) {
        self.render_up_to_now(now_ms);
        if self.config.mode == OplMode::DualOpl2 {
            self.dual_write(((reg >> 8) & 1) as usize, reg as u8, value, now_ms);
        } else {
            self.write_data(reg & 0x1ff, value, now_ms);
        }
    }

    fn write_data(&mut self, reg: u16, value: u8, now_ms: f64) {
        if self.timers[0].write(reg, value, now_ms) {
            return;
        }
        if self.decoder.observe_data(reg, value) && self.capture.is_some() {
            log::warn!("ESFM native mode has been enabled which is not supported by the raw OPL capture");
        }
        let reg = reg & 0x1ff;
        self.engine.write_register(reg, value);
        self.cache_write(reg, value, now_ms);
    }

    /// Write one side of a dual-OPL2 card
    ///
    /// Each side is an OPL2 mapped onto one bank of the engine, panned hard
    /// to its own speaker.
    fn dual_write(&mut self, index: usize, reg: u8, value: u8, now_ms: f64) {
        if reg == 0x05 {
            return;
        }
        let mut value = value;
        if reg >= 0xe0 {
            value &= 0x03;
        }
        if self.timers[index].write(reg as u16, value, now_ms) {
            return;
        }
        if (0xc0..=0xc8).contains(&reg) {
            value = (value & 0x0f) | if index == 1 { 0xa0 } else { 0x50 };
        }
        let full = reg as u16 | ((index as u16) << 8);
        self.engine.write_register(full, value);
        self.cache_write(full, value, now_ms);
    }

    fn cache_write(&mut self, reg: u16, value: u8, now_ms: f64) {
        if let Some(capture) = self.capture.as_mut() {
            if let Err(e) = capture.write(reg, value, now_ms as u32, &self.cache) {
                log::warn!("OPL capture failed, stopping it: {e}");
                self.capture = None;
            }
        }
        self.cache.write(reg, value);
    }

    /// Handle a byte read from one of the card's ports
    pub fn port_read(&mut self, port: u16, now_ms: f64) -> u8 {
        match self.decoder.read(port) {
            PortRead::Status { chip, opl2_bits } => {
                let status = self.timers[chip].status(now_ms).bits();
                if opl2_bits {
                    status | 0x06
                } else {
                    status
                }
            }
            PortRead::Native(reg) => {
                if is_poke_hole(reg) {
                    self.timers[0].readback(reg & 0xff)
                } else {
                    self.native.read(reg)
                }
            }
            PortRead::Fixed(value) => value,
        }
    }

    /// Arm DRO capture into `dir`, replacing any running capture
    pub fn start_capture<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        self.stop_capture()?;
        self.capture = Some(DroCapture::new(dir));
        Ok(())
    }

    /// Stop capturing
    ///
    /// # Returns
    ///
    /// Files written by the stopped capture
    pub fn stop_capture(&mut self) -> Result<Vec<PathBuf>> {
        match self.capture.take() {
            Some(capture) => capture.finish(),
            None => Ok(Vec::new()),
        }
    }

    /// Is a capture armed?
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Save the cached voices as RAD instruments in the capture directory
    pub fn save_instruments(&self) -> Result<PathBuf> {
        let dir = self.config.capture_dir.as_ref().ok_or_else(|| {
            OplError::CaptureError("No capture directory configured".into())
        })?;
        save_rad(dir, &self.cache)
    }
}

impl<B: OplBackend> std::fmt::Debug for OplDevice<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OplDevice")
            .field("mode", &self.config.mode)
            .field("sample_rate", &self.config.sample_rate)
            .field("queued_frames", &self.fifo.len())
            .field("last_rendered_ms", &self.last_rendered_ms)
            .field("sleeping", &self.sleeping)
            .field("capturing", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

/// Device handle shared between an emulation thread and an audio thread
pub struct SharedOpl<B: OplBackend = Opl3> {
    inner: Arc<Mutex<OplDevice<B>>>,
}

impl<B: OplBackend> SharedOpl<B> {
    /// Wrap a device
    pub fn new(device: OplDevice<B>) -> Self {
        SharedOpl {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Lock the device for a batch of operations
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, OplDevice<B>> {
        self.inner.lock()
    }

    /// See [`OplDevice::port_write`]
    pub fn port_write(&self, port: u16, value: u8, now_ms: f64) {
        self.inner.lock().port_write(port, value, now_ms);
    }

    /// See [`OplDevice::port_read`]
    pub fn port_read(&self, port: u16, now_ms: f64) -> u8 {
        self.inner.lock().port_read(port, now_ms)
    }

    /// See [`OplDevice::audio_callback_into`]
    pub fn audio_callback_into(&self, out: &mut [Frame], now_ms: f64) {
        self.inner.lock().audio_callback_into(out, now_ms);
    }
}

impl<B: OplBackend> Clone for SharedOpl<B> {
    fn clone(&self) -> Self {
        SharedOpl {
            inner: Arc::clone(&self.inner),
        }
    }
}
