//! DC bias removal filter
//!
//! Some programs park the chip at a constant non-zero level, which sounds as
//! clicks when playback starts or stops. The filter subtracts the running
//! average of the last 5 ms once the signal stays above a small threshold.

use std::collections::VecDeque;

/// Rate the window length is specified at
const REFERENCE_RATE: usize = 16000;
/// Window length in samples (5 ms at the reference rate)
pub const WINDOW_SIZE: usize = REFERENCE_RATE / 200;
/// Samples below this level reset the window and pass through unchanged
pub const BIAS_THRESHOLD: i32 = 5;

/// DC bias removal using a moving average
///
/// One filter handles one side; the device keeps a pair.
#[derive(Clone)]
pub struct DcFilter {
    /// Samples currently in the averaging window
    window: VecDeque<i32>,
    /// Running sum of the window
    running_sum: i32,
}

impl DcFilter {
    /// Create a new DC filter
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_SIZE),
            running_sum: 0,
        }
    }

    /// Process a sample and return the bias-adjusted value
    ///
    /// While the window is filling the output is held at zero, so a sudden
    /// constant offset fades in as silence rather than a click.
    #[inline]
    pub fn process(&mut self, sample: i16) -> i16 {
        let sample = sample as i32;
        if sample < BIAS_THRESHOLD {
            self.reset();
            return sample as i16;
        }

        self.window.push_back(sample);
        self.running_sum += sample;
        if self.window.len() < WINDOW_SIZE {
            return 0;
        }

        let average = self.running_sum / WINDOW_SIZE as i32;
        let front = self.window.pop_front().unwrap_or_default();
        self.running_sum -= front;
        (front - average).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// Reset the filter state
    pub fn reset(&mut self) {
        self.window.clear();
        self.running_sum = 0;
    }
}

impl Default for DcFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DcFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcFilter")
            .field("filled", &self.window.len())
            .field("running_sum", &self.running_sum)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_filter_removes_offset() {
        let mut filter = DcFilter::new();
        for _ in 0..WINDOW_SIZE * 2 {
            filter.process(1000);
        }
        assert_eq!(filter.process(1000), 0);
    }

    #[test]
    fn test_dc_filter_holds_zero_while_filling() {
        let mut filter = DcFilter::new();
        for _ in 0..WINDOW_SIZE - 1 {
            assert_eq!(filter.process(2000), 0);
        }
    }

    #[test]
    fn test_low_samples_pass_through() {
        let mut filter = DcFilter::new();
        for _ in 0..WINDOW_SIZE * 2 {
            filter.process(800);
        }
        assert_eq!(filter.process(-300), -300);
        assert_eq!(filter.process(4), 4);
        // window was cleared, so the next large sample starts filling again
        assert_eq!(filter.process(800), 0);
    }

    #[test]
    fn test_dc_filter_preserves_ac() {
        let mut filter = DcFilter::new();
        for _ in 0..WINDOW_SIZE {
            filter.process(500);
        }
        for _ in 0..WINDOW_SIZE - 2 {
            filter.process(1500);
        }
        // oldest remaining 500 minus an average pulled up by the step
        let output = filter.process(1500);
        assert!(output < -900, "step should show through, got {output}");
    }
}
