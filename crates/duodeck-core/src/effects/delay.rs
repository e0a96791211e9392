//! Echo stage of the per-deck effects chain

use crate::types::{StereoBuffer, SAMPLE_RATE};

/// Maximum delay time in seconds (the amount control maps 0..1 directly)
const MAX_DELAY_SECONDS: f32 = 1.0;
/// Maximum delay buffer size in samples per channel
const MAX_DELAY_SAMPLES: usize = (SAMPLE_RATE as f32 * MAX_DELAY_SECONDS) as usize;
/// Fixed feedback gain for repeating echoes
const FEEDBACK: f32 = 0.3;

/// Stereo delay line with a fixed-feedback echo path
///
/// The amount control sets the delay time: 0.0 disables the stage, 1.0 is
/// a one second echo. Echoes are summed onto the dry signal.
pub struct DelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
}

impl DelayLine {
    pub fn new() -> Self {
        Self {
            buffer_l: vec![0.0; MAX_DELAY_SAMPLES],
            buffer_r: vec![0.0; MAX_DELAY_SAMPLES],
            write_pos: 0,
            delay_samples: 0,
        }
    }

    /// Set the delay time from the 0..1 amount control (seconds)
    pub fn set_amount(&mut self, amount: f32) {
        let seconds = amount.clamp(0.0, MAX_DELAY_SECONDS);
        self.delay_samples = ((seconds * SAMPLE_RATE as f32) as usize).min(MAX_DELAY_SAMPLES - 1);
    }

    /// Whether the stage contributes anything at the current setting
    #[inline]
    pub fn is_active(&self) -> bool {
        self.delay_samples > 0
    }

    #[inline]
    fn read(&self) -> (f32, f32) {
        let read_pos = if self.write_pos >= self.delay_samples {
            self.write_pos - self.delay_samples
        } else {
            MAX_DELAY_SAMPLES - (self.delay_samples - self.write_pos)
        };
        (self.buffer_l[read_pos], self.buffer_r[read_pos])
    }

    #[inline]
    fn write(&mut self, left: f32, right: f32) {
        self.buffer_l[self.write_pos] = left;
        self.buffer_r[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % MAX_DELAY_SAMPLES;
    }

    /// Process a buffer in place, adding echoes to the dry signal
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.is_active() {
            return;
        }

        for sample in buffer.iter_mut() {
            let (delayed_l, delayed_r) = self.read();

            self.write(sample.left + delayed_l * FEEDBACK, sample.right + delayed_r * FEEDBACK);

            sample.left += delayed_l;
            sample.right += delayed_r;
        }
    }

    pub fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

impl Default for DelayLine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_zero_amount_is_inactive() {
        let mut delay = DelayLine::new();
        delay.set_amount(0.0);
        assert!(!delay.is_active());

        let mut buffer = StereoBuffer::silence(64);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        delay.process(&mut buffer);

        assert!((buffer[0].left - 1.0).abs() < 1e-6);
        assert!(buffer[32].left.abs() < 1e-6);
    }

    #[test]
    fn test_echo_appears_at_delay_time() {
        let mut delay = DelayLine::new();
        // 10ms delay = 480 samples at 48kHz
        delay.set_amount(0.01);

        let mut buffer = StereoBuffer::silence(2048);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        delay.process(&mut buffer);

        // Dry impulse passes through
        assert!((buffer[0].left - 1.0).abs() < 1e-6);
        // First echo at full level
        assert!((buffer[480].left - 1.0).abs() < 1e-6);
        // Second echo attenuated by feedback
        assert!((buffer[960].left - FEEDBACK).abs() < 1e-6);
    }

    #[test]
    fn test_amount_clamped_to_one_second() {
        let mut delay = DelayLine::new();
        delay.set_amount(5.0);
        assert_eq!(delay.delay_samples, MAX_DELAY_SAMPLES - 1);
    }

    #[test]
    fn test_reset_clears_echoes() {
        let mut delay = DelayLine::new();
        delay.set_amount(0.01);

        let mut buffer = StereoBuffer::silence(1024);
        buffer.as_mut_slice()[0] = StereoSample::new(1.0, 1.0);
        delay.process(&mut buffer);

        delay.reset();

        let mut buffer = StereoBuffer::silence(1024);
        delay.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.left.abs() < 1e-6));
    }
}
