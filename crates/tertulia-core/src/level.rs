//! Signal level metering.
//!
//! The bridge tracks a per-port level for each direction so applications can
//! drive VU meters. Levels are reported in `0..=255` with 255 meaning full
//! scale; the linear average is passed through the µ-law curve so the scale
//! spacing is perceptual rather than linear.

use crate::companding::linear_to_ulaw;

/// Mean absolute amplitude of a frame.
pub fn avg_signal(samples: &[i16]) -> i16 {
    if samples.is_empty() {
        return 0;
    }
    let sum: i64 = samples.iter().map(|&s| i64::from(s).abs()).sum();
    (sum / samples.len() as i64) as i16
}

/// Decayed per-direction signal meter.
///
/// Rising levels are taken immediately; falling levels decay by halving the
/// gap each frame, which keeps short bursts visible on a meter polled at
/// frame rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignalMeter {
    level: u8,
}

impl SignalMeter {
    /// Creates a meter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame of already-gain-adjusted samples.
    ///
    /// Returns the updated level.
    pub fn update(&mut self, samples: &[i16]) -> u8 {
        self.update_avg(avg_signal(samples))
    }

    /// Feeds a precomputed mean absolute amplitude.
    pub fn update_avg(&mut self, avg: i16) -> u8 {
        // The µ-law magnitude of a non-negative average spans 0..=127;
        // stretch it onto the full 0..=255 meter scale.
        let mag = u16::from(linear_to_ulaw(avg) ^ 0xFF);
        let target = (mag * 255 / 127) as u8;
        if target >= self.level {
            self.level = target;
        } else {
            self.level -= (self.level - target).div_ceil(2);
        }
        self.level
    }

    /// Resets the meter to silence.
    pub fn silent(&mut self) {
        self.level = 0;
    }

    /// The last reported level, `0..=255`.
    pub fn level(&self) -> u8 {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_of_empty_is_zero() {
        assert_eq!(avg_signal(&[]), 0);
    }

    #[test]
    fn avg_rectifies() {
        assert_eq!(avg_signal(&[-100, 100]), 100);
    }

    #[test]
    fn silence_reports_zero() {
        let mut meter = SignalMeter::new();
        assert_eq!(meter.update(&[0; 160]), 0);
    }

    #[test]
    fn full_scale_reports_max() {
        let mut meter = SignalMeter::new();
        let frame = [i16::MAX; 160];
        assert_eq!(meter.update(&frame), 255);
    }

    #[test]
    fn louder_is_higher() {
        let mut quiet = SignalMeter::new();
        let mut loud = SignalMeter::new();
        let q = quiet.update(&[500; 160]);
        let l = loud.update(&[20000; 160]);
        assert!(l > q, "expected {l} > {q}");
    }

    #[test]
    fn level_decays_after_burst() {
        let mut meter = SignalMeter::new();
        let peak = meter.update(&[20000; 160]);
        let mut last = peak;
        for _ in 0..10 {
            let now = meter.update(&[0; 160]);
            assert!(now <= last);
            last = now;
        }
        assert!(last < peak / 4, "meter failed to decay: {last} vs {peak}");
    }
}
