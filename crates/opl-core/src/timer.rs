//! OPL Timer 1/2 Implementation
//!
//! Two 8-bit count-up timers clocked at 80 µs and 320 µs. They produce no
//! sound; programs poll the status port (or take an IRQ) to pace themselves.
//! Time is the host's millisecond clock passed in on every call, so overflow
//! is computed lazily on reads and writes rather than by stepping.

use bitflags::bitflags;

bitflags! {
    /// Status port bitflags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        /// Timer 2 (320 µs) overflowed
        const TIMER2 = 0x20;
        /// Timer 1 (80 µs) overflowed
        const TIMER1 = 0x40;
        /// Any unmasked timer overflowed
        const IRQ = 0x80;
    }
}

bitflags! {
    /// Timer control register (0x04) bitflags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TimerControl: u8 {
        /// Start timer 1
        const START1 = 0x01;
        /// Start timer 2
        const START2 = 0x02;
        /// Mask timer 2
        const MASK2 = 0x20;
        /// Mask timer 1
        const MASK1 = 0x40;
        /// Reset both overflow flags; all other bits are ignored
        const IRQ_RESET = 0x80;
    }
}

impl TimerControl {
    /// Create control flags from raw register value
    pub fn from_register(value: u8) -> Self {
        TimerControl::from_bits_truncate(value)
    }
}

/// Timer 1 tick in milliseconds
pub const TIMER1_TICK_MS: f64 = 0.080;
/// Timer 2 tick in milliseconds
pub const TIMER2_TICK_MS: f64 = 0.320;

/// One OPL timer
#[derive(Debug, Clone)]
pub struct Timer {
    /// Clock interval in milliseconds
    tick: f64,
    /// Reload value
    counter: u8,
    /// Milliseconds per overflow
    period: f64,
    start: f64,
    trigger: f64,
    enabled: bool,
    masked: bool,
    overflow: bool,
}

impl Timer {
    /// Create a stopped timer with the given tick length in milliseconds
    pub fn new(tick: f64) -> Self {
        let mut timer = Timer {
            tick,
            counter: 0,
            period: 0.0,
            start: 0.0,
            trigger: 0.0,
            enabled: false,
            masked: false,
            overflow: false,
        };
        timer.set_counter(0);
        timer
    }

    /// Bring the overflow flag up to date
    ///
    /// Re-syncs the start of the current period to `now` so that period
    /// changes and late polls do not accumulate drift.
    ///
    /// # Returns
    ///
    /// true if the timer has overflowed and the flag is still set
    pub fn update(&mut self, now: f64) -> bool {
        if self.enabled && self.period > 0.0 && now >= self.trigger {
            let into_cycle = (now - self.trigger) % self.period;
            self.start = now - into_cycle;
            self.trigger = self.start + self.period;
            if !self.masked {
                self.overflow = true;
            }
        }
        self.overflow
    }

    /// Clear the overflow flag
    pub fn reset(&mut self) {
        self.overflow = false;
    }

    /// Set the reload value; a reload of 0 counts the full 256 ticks
    pub fn set_counter(&mut self, value: u8) {
        self.counter = value;
        self.period = (256 - value as u32) as f64 * self.tick;
    }

    /// Reload value
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Mask the timer; masking also clears a pending overflow
    pub fn set_mask(&mut self, masked: bool) {
        self.masked = masked;
        if masked {
            self.overflow = false;
        }
    }

    /// Is the timer masked?
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Stop counting
    pub fn stop(&mut self) {
        self.enabled = false;
    }

    /// Start counting, aligned to the tick grid; no-op if already running
    pub fn start(&mut self, now: f64) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.overflow = false;
        self.start = now - now % self.tick;
        self.trigger = self.start + self.period;
    }

    /// Is the timer running?
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Callback fired on edges of the "any unmasked overflow" line
pub type IrqCallback = Box<dyn FnMut(bool) + Send>;

/// The pair of timers of one chip plus the status port
pub struct TimerUnit {
    timers: [Timer; 2],
    irq_line: bool,
    irq: Option<IrqCallback>,
}

impl TimerUnit {
    /// Create a unit with both timers stopped
    pub fn new() -> Self {
        TimerUnit {
            timers: [Timer::new(TIMER1_TICK_MS), Timer::new(TIMER2_TICK_MS)],
            irq_line: false,
            irq: None,
        }
    }

    /// Install a callback for IRQ edges
    pub fn set_irq_callback(&mut self, callback: IrqCallback) {
        self.irq = Some(callback);
    }

    /// Timer by index (0 = 80 µs, 1 = 320 µs)
    pub fn timer(&self, index: usize) -> Option<&Timer> {
        self.timers.get(index)
    }

    /// Handle a write if it targets a timer register
    ///
    /// # Arguments
    ///
    /// * `reg` - Register index within bank 0
    /// * `value` - Written value
    /// * `now` - Current time in milliseconds
    ///
    /// # Returns
    ///
    /// true if the write was consumed by the timers
    pub fn write(&mut self, reg: u16, value: u8, now: f64) -> bool {
        match reg {
            0x02 => {
                self.timers[0].update(now);
                self.timers[0].set_counter(value);
            }
            0x03 => {
                self.timers[1].update(now);
                self.timers[1].set_counter(value);
            }
            0x04 => {
                let control = TimerControl::from_register(value);
                if control.contains(TimerControl::IRQ_RESET) {
                    self.timers[0].reset();
                    self.timers[1].reset();
                } else {
                    if control.contains(TimerControl::START1) {
                        self.timers[0].start(now);
                    } else {
                        self.timers[0].stop();
                    }
                    if control.contains(TimerControl::START2) {
                        self.timers[1].start(now);
                    } else {
                        self.timers[1].stop();
                    }
                    self.timers[0].set_mask(control.contains(TimerControl::MASK1));
                    self.timers[1].set_mask(control.contains(TimerControl::MASK2));
                }
            }
            _ => return false,
        }
        self.signal_irq();
        true
    }

    /// Read the status byte at time `now`
    pub fn status(&mut self, now: f64) -> StatusFlags {
        let mut status = StatusFlags::empty();
        if self.timers[0].update(now) {
            status |= StatusFlags::TIMER1 | StatusFlags::IRQ;
        }
        if self.timers[1].update(now) {
            status |= StatusFlags::TIMER2 | StatusFlags::IRQ;
        }
        self.signal_irq();
        status
    }

    /// Read back a timer register through the ESFM native-mode poke-hole
    pub fn readback(&self, reg: u16) -> u8 {
        match reg {
            0x02 => self.timers[0].counter(),
            0x03 => self.timers[1].counter(),
            0x04 => {
                let mut control = TimerControl::empty();
                control.set(TimerControl::START1, self.timers[0].is_enabled());
                control.set(TimerControl::START2, self.timers[1].is_enabled());
                control.set(TimerControl::MASK1, self.timers[0].is_masked());
                control.set(TimerControl::MASK2, self.timers[1].is_masked());
                control.bits()
            }
            _ => 0,
        }
    }

    fn signal_irq(&mut self) {
        let line = self.timers.iter().any(|t| t.overflow);
        if line != self.irq_line {
            self.irq_line = line;
            if let Some(irq) = self.irq.as_mut() {
                irq(line);
            }
        }
    }
}

impl Default for TimerUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimerUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerUnit")
            .field("timers", &self.timers)
            .field("irq_line", &self.irq_line)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_timer_creation() {
        let timer = Timer::new(TIMER1_TICK_MS);
        assert!(!timer.is_enabled());
        assert_eq!(timer.counter(), 0);
    }

    #[test]
    fn test_timer_overflow_period() {
        let mut timer = Timer::new(TIMER1_TICK_MS);
        // 56 ticks of 80 µs = 4.48 ms
        timer.set_counter(200);
        timer.start(0.0);
        assert!(!timer.update(4.4));
        assert!(timer.update(4.5));
        timer.reset();
        assert!(!timer.update(4.6));
        assert!(timer.update(9.0));
    }

    #[test]
    fn test_start_aligns_to_tick_grid() {
        let mut timer = Timer::new(TIMER2_TICK_MS);
        timer.set_counter(255);
        timer.start(1.0);
        // start snaps back to 0.96, first overflow at 1.28
        assert!(!timer.update(1.27));
        assert!(timer.update(1.29));
    }

    #[test]
    fn test_mask_clears_and_blocks_overflow() {
        let mut timer = Timer::new(TIMER1_TICK_MS);
        timer.set_counter(255);
        timer.start(0.0);
        assert!(timer.update(1.0));
        timer.set_mask(true);
        assert!(!timer.update(2.0));
    }

    #[test]
    fn test_status_bits() {
        let mut unit = TimerUnit::new();
        assert!(unit.write(0x02, 0xff, 0.0));
        assert!(unit.write(0x04, 0x01, 0.0));
        assert_eq!(unit.status(0.05).bits(), 0x00);
        assert_eq!(unit.status(0.1).bits(), 0xc0);
        unit.write(0x04, 0x80, 0.1);
        assert_eq!(unit.status(0.1).bits(), 0x00);

        unit.write(0x03, 0xff, 0.2);
        unit.write(0x04, 0x02, 0.2);
        assert_eq!(unit.status(1.0).bits(), 0xa0);
    }

    #[test]
    fn test_non_timer_registers_pass_through() {
        let mut unit = TimerUnit::new();
        assert!(!unit.write(0x05, 0x01, 0.0));
        assert!(!unit.write(0x20, 0x01, 0.0));
    }

    #[test]
    fn test_readback() {
        let mut unit = TimerUnit::new();
        unit.write(0x02, 0x12, 0.0);
        unit.write(0x03, 0x34, 0.0);
        unit.write(0x04, 0x43, 0.0);
        assert_eq!(unit.readback(0x02), 0x12);
        assert_eq!(unit.readback(0x03), 0x34);
        assert_eq!(unit.readback(0x04), 0x43);
    }

    #[test]
    fn test_irq_edges() {
        let edges = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&edges);
        let mut unit = TimerUnit::new();
        unit.set_irq_callback(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        unit.write(0x02, 0xff, 0.0);
        unit.write(0x04, 0x01, 0.0);
        unit.status(1.0);
        unit.status(2.0);
        assert_eq!(edges.load(Ordering::SeqCst), 1);
        unit.write(0x04, 0x80, 2.0);
        assert_eq!(edges.load(Ordering::SeqCst), 2);
    }
}
