//! Dynamics compressor stage of the per-deck effects chain
//!
//! Feed-forward design with a soft knee. Threshold, knee, attack and
//! release are fixed; the amount control only steers the ratio, from 2:1
//! at zero up to 12:1 at full.

use crate::types::{StereoBuffer, SAMPLE_RATE};

/// Threshold in dBFS
const THRESHOLD_DB: f32 = -24.0;
/// Knee width in dB, centered on the threshold
const KNEE_DB: f32 = 30.0;
/// Attack time in seconds
const ATTACK_SECS: f32 = 0.003;
/// Release time in seconds
const RELEASE_SECS: f32 = 0.250;

/// Soft-knee feed-forward compressor
pub struct Compressor {
    ratio: f32,
    /// Smoothed gain reduction in dB (positive values reduce)
    envelope_db: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl Compressor {
    pub fn new() -> Self {
        Self {
            ratio: 2.0,
            envelope_db: 0.0,
            attack_coeff: (-1.0 / (ATTACK_SECS * SAMPLE_RATE as f32)).exp(),
            release_coeff: (-1.0 / (RELEASE_SECS * SAMPLE_RATE as f32)).exp(),
        }
    }

    /// Map the 0..1 amount control onto the compression ratio
    pub fn set_amount(&mut self, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        self.ratio = 2.0 + amount * 10.0;
    }

    /// Static gain computer: desired gain reduction in dB for an input level
    fn reduction_db(&self, level_db: f32) -> f32 {
        let over = level_db - THRESHOLD_DB;
        let half_knee = KNEE_DB / 2.0;

        if over <= -half_knee {
            0.0
        } else if over < half_knee {
            // Quadratic interpolation through the knee region
            let x = over + half_knee;
            (1.0 - 1.0 / self.ratio) * x * x / (2.0 * KNEE_DB)
        } else {
            (1.0 - 1.0 / self.ratio) * over
        }
    }

    /// Process a buffer in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let peak = sample.left.abs().max(sample.right.abs());
            let level_db = if peak > 1e-6 {
                20.0 * peak.log10()
            } else {
                -120.0
            };

            let target_db = self.reduction_db(level_db);

            // Faster coefficient when reduction is increasing (attack)
            let coeff = if target_db > self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = target_db + coeff * (self.envelope_db - target_db);

            let gain = 10.0_f32.powf(-self.envelope_db / 20.0);
            sample.left *= gain;
            sample.right *= gain;
        }
    }

    pub fn reset(&mut self) {
        self.envelope_db = 0.0;
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}
