//! Master-bus lookahead limiter
//!
//! Last stage of the master chain: deck sum → master volume → **limiter**
//! → output. A 3 ms lookahead anticipates peaks so gain reduction is in
//! place before the peak exits the delay line; the result is limiting
//! without clicks, only gain changes.
//!
//! Disabling the limiter does not rewire the chain. The threshold is
//! forced to 0 dBFS instead, so the stage stays in place (and keeps its
//! fixed latency) but no longer reduces anything below full scale.

use crate::types::{StereoBuffer, SAMPLE_RATE};

/// Maximum ring-buffer size (supports up to ~5 ms at 192 kHz)
const MAX_DELAY: usize = 1024;

/// Lookahead and attack time in seconds (3 ms, 144 samples at 48 kHz)
const LOOKAHEAD_SECS: f32 = 0.003;

/// Release time-constant in seconds
const RELEASE_SECS: f32 = 0.25;

/// Limiting ratio. Steep enough to hold peaks, shy of a brickwall clamp
const RATIO: f32 = 20.0;

/// Feed-forward lookahead limiter on the master bus
///
/// Only ever reduces gain. Below the threshold the output is bit-identical
/// to the delayed input.
pub struct MasterLimiter {
    /// Whether limiting is engaged; when false the threshold is 0 dBFS
    enabled: bool,
    /// Configured threshold in dBFS (remembered across enable/disable)
    threshold_db: f32,
    /// Active threshold in linear amplitude
    threshold: f32,
    /// Lookahead in samples
    lookahead: usize,

    /// Stereo audio delay line: `delay[channel][position]`
    delay: [[f32; MAX_DELAY]; 2],
    /// Per-sample target gain (1.0 when below threshold)
    target_gains: [f32; MAX_DELAY],
    /// Shared write cursor for both ring buffers
    write_pos: usize,

    /// Current smoothed gain applied to the output
    gain: f32,
    /// Attack coefficient: 99% convergence within the lookahead window
    attack_coeff: f32,
    /// Release coefficient: exponential decay with `RELEASE_SECS` tau
    release_coeff: f32,
}

impl MasterLimiter {
    /// Create a limiter engaged at the default threshold of -1 dBFS
    pub fn new() -> Self {
        let lookahead = (LOOKAHEAD_SECS * SAMPLE_RATE as f32).round() as usize;
        let lookahead = lookahead.clamp(1, MAX_DELAY);

        // coeff^N = 0.01  =>  coeff = exp(ln 0.01 / N)
        let attack_coeff = (-4.605_17 / lookahead as f32).exp();
        let release_coeff = (-1.0 / (RELEASE_SECS * SAMPLE_RATE as f32)).exp();

        let mut limiter = Self {
            enabled: true,
            threshold_db: -1.0,
            threshold: 1.0,
            lookahead,
            delay: [[0.0; MAX_DELAY]; 2],
            target_gains: [1.0; MAX_DELAY],
            write_pos: 0,
            gain: 1.0,
            attack_coeff,
            release_coeff,
        };
        limiter.update_threshold();
        limiter
    }

    /// Set the threshold in dBFS (takes effect only while enabled)
    pub fn set_threshold_db(&mut self, db: f32) {
        self.threshold_db = db.min(0.0);
        self.update_threshold();
    }

    /// Engage or release the limiter without removing it from the chain
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.update_threshold();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn update_threshold(&mut self) {
        let db = if self.enabled { self.threshold_db } else { 0.0 };
        self.threshold = 10.0_f32.powf(db / 20.0);
    }

    /// Latency in samples introduced by the lookahead delay
    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    /// Target gain for an input peak: hard knee, `RATIO`:1 above threshold
    #[inline]
    fn target_gain(&self, peak: f32) -> f32 {
        if peak <= self.threshold {
            return 1.0;
        }
        let over_db = 20.0 * (peak / self.threshold).log10();
        let reduction_db = (1.0 - 1.0 / RATIO) * over_db;
        10.0_f32.powf(-reduction_db / 20.0)
    }

    /// Process a stereo buffer in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let peak = sample.left.abs().max(sample.right.abs());
            self.target_gains[self.write_pos] = self.target_gain(peak);

            // Worst-case gain we must reach before the corresponding audio
            // exits the delay line
            let min_gain = self.window_min_gain();

            if min_gain < self.gain {
                self.gain = self.gain * self.attack_coeff + min_gain * (1.0 - self.attack_coeff);
            } else {
                self.gain = self.gain * self.release_coeff + min_gain * (1.0 - self.release_coeff);
            }

            let read_pos = (self.write_pos + MAX_DELAY - self.lookahead) % MAX_DELAY;
            let out_left = self.delay[0][read_pos] * self.gain;
            let out_right = self.delay[1][read_pos] * self.gain;

            self.delay[0][self.write_pos] = sample.left;
            self.delay[1][self.write_pos] = sample.right;

            sample.left = out_left;
            sample.right = out_right;

            self.write_pos = (self.write_pos + 1) % MAX_DELAY;
        }
    }

    /// Minimum target gain across the current lookahead window
    #[inline]
    fn window_min_gain(&self) -> f32 {
        let mut min = 1.0_f32;
        for i in 0..self.lookahead {
            let pos = (self.write_pos + MAX_DELAY - i) % MAX_DELAY;
            let g = self.target_gains[pos];
            if g < min {
                min = g;
            }
        }
        min
    }
}

impl Default for MasterLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn constant_buffer(level: f32, len: usize) -> StereoBuffer {
        let mut buf = StereoBuffer::silence(len);
        for s in buf.iter_mut() {
            *s = StereoSample::new(level, level);
        }
        buf
    }

    #[test]
    fn test_below_threshold_is_transparent() {
        let mut limiter = MasterLimiter::new();

        let mut warmup = constant_buffer(0.0, 256);
        limiter.process(&mut warmup);

        let level = limiter.threshold * 0.5;
        let mut buf = constant_buffer(level, 256);
        limiter.process(&mut buf);

        for i in limiter.lookahead..256 {
            let s = buf.as_slice()[i];
            assert!((s.left - level).abs() < 1e-5, "left[{}] = {}", i, s.left);
        }
    }

    #[test]
    fn test_hot_signal_is_reduced() {
        let mut limiter = MasterLimiter::new();

        let mut warmup = constant_buffer(0.0, 256);
        limiter.process(&mut warmup);

        // 6dB over threshold; at 20:1 the overshoot collapses to ~0.3dB
        let hot = limiter.threshold * 2.0;
        let mut buf = constant_buffer(hot, 1024);
        limiter.process(&mut buf);

        for i in 512..1024 {
            let s = buf.as_slice()[i];
            assert!(
                s.left <= limiter.threshold * 1.1,
                "left[{}] = {} exceeds threshold {}",
                i,
                s.left,
                limiter.threshold
            );
        }
    }

    #[test]
    fn test_disabled_limiter_forces_zero_dbfs_threshold() {
        let mut limiter = MasterLimiter::new();
        limiter.set_threshold_db(-12.0);
        limiter.set_enabled(false);

        let mut warmup = constant_buffer(0.0, 256);
        limiter.process(&mut warmup);

        // 0.5 is -6dBFS: below -12 threshold it would pass anyway, but it
        // must also pass when the stored threshold is hotter than the input
        let mut buf = constant_buffer(0.5, 512);
        limiter.process(&mut buf);

        for i in limiter.lookahead..512 {
            let s = buf.as_slice()[i];
            assert!((s.left - 0.5).abs() < 1e-5, "left[{}] = {}", i, s.left);
        }

        // Re-enabling restores the remembered threshold
        limiter.set_enabled(true);
        assert!((limiter.threshold - 10.0_f32.powf(-12.0 / 20.0)).abs() < 1e-6);
    }

    #[test]
    fn test_gain_recovers_after_transient() {
        let mut limiter = MasterLimiter::new();

        let mut warmup = constant_buffer(0.0, 256);
        limiter.process(&mut warmup);

        let hot = limiter.threshold * 2.0;
        let mut burst = constant_buffer(hot, 64);
        limiter.process(&mut burst);

        // 750ms of quiet signal is three release time-constants
        let quiet = limiter.threshold * 0.3;
        let mut tail = constant_buffer(quiet, 36000);
        limiter.process(&mut tail);

        let last = tail.as_slice()[35999];
        assert!(last.left > quiet * 0.9, "gain didn't recover: {}", last.left);
    }

    #[test]
    fn test_latency() {
        let limiter = MasterLimiter::new();
        // 3ms at 48kHz
        assert_eq!(limiter.latency_samples(), 144);
    }
}
