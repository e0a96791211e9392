//! Waveshaper distortion stage of the per-deck effects chain
//!
//! The shaping curve is sampled into a lookup table and applied with
//! linear interpolation. The table is allocated once at construction and
//! rewritten in place when the amount changes, so parameter updates are
//! safe on the audio thread. At zero amount the stage is a transparent
//! passthrough.

use crate::types::StereoBuffer;

/// Number of points in the sampled shaping curve
const CURVE_RESOLUTION: usize = 44100;

/// Waveshaper distortion with an amount-controlled curve
pub struct Distortion {
    amount: f32,
    /// Pre-allocated shaping table, valid only while `active`
    curve: Vec<f32>,
    active: bool,
}

impl Distortion {
    pub fn new() -> Self {
        Self {
            amount: 0.0,
            curve: vec![0.0; CURVE_RESOLUTION],
            active: false,
        }
    }

    /// Set the drive amount; 0.0 bypasses the stage
    ///
    /// Rewrites the existing table in place, never reallocating.
    pub fn set_amount(&mut self, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        if amount == self.amount {
            return;
        }
        self.amount = amount;
        self.active = amount > 0.0;
        if self.active {
            self.fill_curve(amount);
        }
    }

    /// Whether a shaping curve is currently installed
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sample the shaping function over -1..1 into the existing table
    fn fill_curve(&mut self, amount: f32) {
        let k = amount * 100.0;
        let deg = std::f32::consts::PI / 180.0;
        for (i, v) in self.curve.iter_mut().enumerate() {
            let x = i as f32 * 2.0 / CURVE_RESOLUTION as f32 - 1.0;
            *v = ((3.0 + k) * x * 20.0 * deg) / (std::f32::consts::PI + k * x.abs());
        }
    }

    /// Look up the curve with linear interpolation, clamping input to -1..1
    #[inline]
    fn shape(curve: &[f32], x: f32) -> f32 {
        let x = x.clamp(-1.0, 1.0);
        let pos = (x + 1.0) * 0.5 * (curve.len() - 1) as f32;
        let idx = pos as usize;
        let frac = pos - idx as f32;
        if idx + 1 < curve.len() {
            curve[idx] * (1.0 - frac) + curve[idx + 1] * frac
        } else {
            curve[curve.len() - 1]
        }
    }

    /// Process a buffer in place through the shaping curve
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.active {
            return;
        }

        let curve = self.curve.as_slice();
        for sample in buffer.iter_mut() {
            sample.left = Self::shape(curve, sample.left);
            sample.right = Self::shape(curve, sample.right);
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_zero_amount_has_no_curve() {
        let mut dist = Distortion::new();
        assert!(!dist.is_active());

        dist.set_amount(0.5);
        assert!(dist.is_active());

        dist.set_amount(0.0);
        assert!(!dist.is_active());
    }

    #[test]
    fn test_inactive_passes_through() {
        let mut dist = Distortion::new();
        let mut buffer = StereoBuffer::silence(16);
        buffer.as_mut_slice()[3] = StereoSample::new(0.7, -0.7);
        dist.process(&mut buffer);
        assert!((buffer[3].left - 0.7).abs() < 1e-6);
        assert!((buffer[3].right + 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_amount_changes_reuse_table_storage() {
        let mut dist = Distortion::new();
        let ptr = dist.curve.as_ptr();
        let cap = dist.curve.capacity();

        dist.set_amount(0.5);
        dist.set_amount(0.0);
        dist.set_amount(1.0);

        assert_eq!(dist.curve.as_ptr(), ptr, "table must be rewritten in place");
        assert_eq!(dist.curve.capacity(), cap);
        assert_eq!(dist.curve.len(), CURVE_RESOLUTION);
    }

    #[test]
    fn test_curve_is_odd_symmetric() {
        let mut dist = Distortion::new();
        dist.set_amount(0.5);
        let pos = Distortion::shape(&dist.curve, 0.6);
        let neg = Distortion::shape(&dist.curve, -0.6);
        assert!((pos + neg).abs() < 1e-3, "shaping should be symmetric: {} vs {}", pos, neg);
    }

    #[test]
    fn test_drive_compresses_peaks() {
        let mut dist = Distortion::new();
        dist.set_amount(1.0);

        let mut buffer = StereoBuffer::silence(2);
        buffer.as_mut_slice()[0] = StereoSample::new(0.1, 0.1);
        buffer.as_mut_slice()[1] = StereoSample::new(1.0, 1.0);
        dist.process(&mut buffer);

        // The curve saturates: a 10x input step yields far less than 10x output
        let ratio = buffer[1].left / buffer[0].left;
        assert!(ratio < 5.0, "expected saturation, got ratio {}", ratio);
    }
}
