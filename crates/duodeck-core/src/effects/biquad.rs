//! Biquad filters for EQ and shelving stages
//!
//! Shared by the deck's 3-band EQ and the effects chain's bass/treble
//! shelves. Coefficients follow the RBJ audio EQ cookbook forms.

use crate::types::SAMPLE_RATE;

/// Biquad filter state (stereo, direct form I)
#[derive(Debug, Clone, Default)]
pub struct BiquadState {
    x1_l: f32, x2_l: f32, y1_l: f32, y2_l: f32,
    x1_r: f32, x2_r: f32, y1_r: f32, y2_r: f32,
}

impl BiquadState {
    /// Process one stereo frame through the filter
    #[inline]
    pub fn process(&mut self, input_l: f32, input_r: f32, coeffs: &BiquadCoeffs) -> (f32, f32) {
        let out_l = coeffs.b0 * input_l + coeffs.b1 * self.x1_l + coeffs.b2 * self.x2_l
            - coeffs.a1 * self.y1_l - coeffs.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input_l;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let out_r = coeffs.b0 * input_r + coeffs.b1 * self.x1_r + coeffs.b2 * self.x2_r
            - coeffs.a1 * self.y1_r - coeffs.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = input_r;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }

    /// Clear filter memory
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Biquad filter coefficients
#[derive(Debug, Clone)]
pub struct BiquadCoeffs {
    b0: f32, b1: f32, b2: f32,
    a1: f32, a2: f32,
}

impl BiquadCoeffs {
    /// Low shelf filter: boost/cut in dB below the shelf frequency
    pub fn low_shelf(freq: f32, gain_db: f32) -> Self {
        let sample_rate = SAMPLE_RATE as f32;
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    /// Peaking EQ filter
    pub fn peaking(freq: f32, gain_db: f32, q: f32) -> Self {
        let sample_rate = SAMPLE_RATE as f32;
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    /// High shelf filter: boost/cut in dB above the shelf frequency
    pub fn high_shelf(freq: f32, gain_db: f32) -> Self {
        let sample_rate = SAMPLE_RATE as f32;
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    /// Passthrough (unity gain, no filtering)
    pub fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_is_identity() {
        let coeffs = BiquadCoeffs::passthrough();
        let mut state = BiquadState::default();

        for &x in &[0.0_f32, 0.5, -0.25, 1.0] {
            let (l, r) = state.process(x, -x, &coeffs);
            assert!((l - x).abs() < 1e-6);
            assert!((r + x).abs() < 1e-6);
        }
    }

    #[test]
    fn test_low_shelf_boosts_dc() {
        // A +6dB low shelf should roughly double a DC signal once settled
        let coeffs = BiquadCoeffs::low_shelf(100.0, 6.0);
        let mut state = BiquadState::default();

        let mut out = 0.0;
        for _ in 0..48000 {
            let (l, _) = state.process(1.0, 1.0, &coeffs);
            out = l;
        }
        let expected = 10.0_f32.powf(6.0 / 20.0);
        assert!((out - expected).abs() < 0.05, "settled at {}, expected {}", out, expected);
    }

    #[test]
    fn test_high_shelf_leaves_dc_alone() {
        let coeffs = BiquadCoeffs::high_shelf(10000.0, 12.0);
        let mut state = BiquadState::default();

        let mut out = 0.0;
        for _ in 0..48000 {
            let (l, _) = state.process(1.0, 1.0, &coeffs);
            out = l;
        }
        assert!((out - 1.0).abs() < 0.05, "DC gain should stay near unity, got {}", out);
    }
}
