//! Per-deck effects chain
//!
//! Fixed stage order: bass shelf, treble shelf, distortion, delay, reverb,
//! compressor. The chain is a binary wet/dry switch: when every amount is
//! zero the buffer is not touched at all, when any amount is non-zero the
//! whole buffer runs through the chain.

pub mod biquad;
mod compressor;
mod delay;
mod distortion;
mod reverb;

use serde::{Deserialize, Serialize};

use crate::types::StereoBuffer;
use biquad::{BiquadCoeffs, BiquadState};
use compressor::Compressor;
use delay::DelayLine;
use distortion::Distortion;
use reverb::Reverb;

/// Bass shelving frequency in Hz
const BASS_SHELF_HZ: f32 = 200.0;
/// Treble shelving frequency in Hz
const TREBLE_SHELF_HZ: f32 = 3000.0;
/// Clamp range for the bass/treble boost controls in dB
const SHELF_GAIN_RANGE_DB: f32 = 30.0;

/// Effect amounts for one deck's chain
///
/// `reverb`, `delay`, `distortion` and `compression` are normalized 0..1
/// amounts where 0 disables the stage. `bass_boost` and `treble_boost` are
/// shelving gains in dB where 0 disables the stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioEffectsConfig {
    pub reverb: f32,
    pub delay: f32,
    pub bass_boost: f32,
    pub treble_boost: f32,
    pub distortion: f32,
    pub compression: f32,
}

impl Default for AudioEffectsConfig {
    fn default() -> Self {
        Self {
            reverb: 0.0,
            delay: 0.0,
            bass_boost: 0.0,
            treble_boost: 0.0,
            distortion: 0.0,
            compression: 0.0,
        }
    }
}

impl AudioEffectsConfig {
    /// Clamp every field into its legal range
    fn clamped(self) -> Self {
        Self {
            reverb: self.reverb.clamp(0.0, 1.0),
            delay: self.delay.clamp(0.0, 1.0),
            bass_boost: self.bass_boost.clamp(-SHELF_GAIN_RANGE_DB, SHELF_GAIN_RANGE_DB),
            treble_boost: self.treble_boost.clamp(-SHELF_GAIN_RANGE_DB, SHELF_GAIN_RANGE_DB),
            distortion: self.distortion.clamp(0.0, 1.0),
            compression: self.compression.clamp(0.0, 1.0),
        }
    }

    /// Whether any stage would contribute to the signal
    pub fn has_active_effects(&self) -> bool {
        self.reverb > 0.0
            || self.delay > 0.0
            || self.bass_boost != 0.0
            || self.treble_boost != 0.0
            || self.distortion > 0.0
            || self.compression > 0.0
    }
}

/// The full per-deck effects chain
pub struct EffectsChain {
    config: AudioEffectsConfig,
    bass_coeffs: BiquadCoeffs,
    bass_state: BiquadState,
    treble_coeffs: BiquadCoeffs,
    treble_state: BiquadState,
    distortion: Distortion,
    delay: DelayLine,
    reverb: Reverb,
    compressor: Compressor,
}

impl EffectsChain {
    pub fn new() -> Self {
        Self {
            config: AudioEffectsConfig::default(),
            bass_coeffs: BiquadCoeffs::passthrough(),
            bass_state: BiquadState::default(),
            treble_coeffs: BiquadCoeffs::passthrough(),
            treble_state: BiquadState::default(),
            distortion: Distortion::new(),
            delay: DelayLine::new(),
            reverb: Reverb::new(),
            compressor: Compressor::new(),
        }
    }

    /// Update all stage parameters from a config snapshot
    ///
    /// Values outside their legal range are clamped, never rejected. The
    /// new parameters take effect at the next processed block as a whole.
    pub fn apply_effects(&mut self, config: AudioEffectsConfig) {
        let config = config.clamped();
        self.config = config;

        self.bass_coeffs = if config.bass_boost != 0.0 {
            BiquadCoeffs::low_shelf(BASS_SHELF_HZ, config.bass_boost)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.treble_coeffs = if config.treble_boost != 0.0 {
            BiquadCoeffs::high_shelf(TREBLE_SHELF_HZ, config.treble_boost)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.distortion.set_amount(config.distortion);
        self.delay.set_amount(config.delay);
        self.reverb.set_amount(config.reverb);
        self.compressor.set_amount(config.compression);
    }

    /// Zero all amounts, forcing the bypass path
    pub fn reset(&mut self) {
        self.apply_effects(AudioEffectsConfig::default());
        self.bass_state.reset();
        self.treble_state.reset();
        self.delay.reset();
        self.reverb.reset();
        self.compressor.reset();
    }

    /// Current config snapshot (post-clamp)
    pub fn config(&self) -> AudioEffectsConfig {
        self.config
    }

    /// Whether the chain currently routes through the processed path
    pub fn has_active_effects(&self) -> bool {
        self.config.has_active_effects()
    }

    /// Gain of the processed path: 1.0 when active, 0.0 when bypassed
    pub fn wet_gain(&self) -> f32 {
        if self.has_active_effects() {
            1.0
        } else {
            0.0
        }
    }

    /// Whether a distortion shaping curve is installed
    pub fn distortion_curve_installed(&self) -> bool {
        self.distortion.is_active()
    }

    /// Process a buffer in place
    ///
    /// When no effect is active this returns without reading or writing a
    /// single sample.
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.has_active_effects() {
            return;
        }

        if self.config.bass_boost != 0.0 {
            for sample in buffer.iter_mut() {
                let (l, r) = self.bass_state.process(sample.left, sample.right, &self.bass_coeffs);
                sample.left = l;
                sample.right = r;
            }
        }
        if self.config.treble_boost != 0.0 {
            for sample in buffer.iter_mut() {
                let (l, r) = self
                    .treble_state
                    .process(sample.left, sample.right, &self.treble_coeffs);
                sample.left = l;
                sample.right = r;
            }
        }

        self.distortion.process(buffer);
        self.delay.process(buffer);
        self.reverb.process(buffer);

        if self.config.compression > 0.0 {
            self.compressor.process(buffer);
        }
    }
}

impl Default for EffectsChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_all_zero_config_is_bypass() {
        let mut chain = EffectsChain::new();
        chain.apply_effects(AudioEffectsConfig::default());

        assert!(!chain.has_active_effects());
        assert_eq!(chain.wet_gain(), 0.0);
        assert!(!chain.distortion_curve_installed());

        // Buffer must come back bit-identical
        let mut buffer = StereoBuffer::silence(64);
        buffer.as_mut_slice()[10] = StereoSample::new(0.5, -0.5);
        let before: Vec<_> = buffer.iter().copied().collect();
        chain.process(&mut buffer);
        for (a, b) in buffer.iter().zip(before.iter()) {
            assert_eq!(a.left.to_bits(), b.left.to_bits());
            assert_eq!(a.right.to_bits(), b.right.to_bits());
        }
    }

    #[test]
    fn test_any_nonzero_amount_activates_chain() {
        let mut chain = EffectsChain::new();

        chain.apply_effects(AudioEffectsConfig {
            reverb: 0.2,
            ..Default::default()
        });
        assert!(chain.has_active_effects());
        assert_eq!(chain.wet_gain(), 1.0);

        // A cut shelf also counts as active
        chain.apply_effects(AudioEffectsConfig {
            bass_boost: -6.0,
            ..Default::default()
        });
        assert!(chain.has_active_effects());
    }

    #[test]
    fn test_reset_forces_bypass() {
        let mut chain = EffectsChain::new();
        chain.apply_effects(AudioEffectsConfig {
            distortion: 0.8,
            delay: 0.5,
            ..Default::default()
        });
        assert!(chain.distortion_curve_installed());

        chain.reset();
        assert!(!chain.has_active_effects());
        assert!(!chain.distortion_curve_installed());
        assert_eq!(chain.config(), AudioEffectsConfig::default());
    }

    #[test]
    fn test_config_values_are_clamped() {
        let mut chain = EffectsChain::new();
        chain.apply_effects(AudioEffectsConfig {
            reverb: 3.0,
            delay: -1.0,
            bass_boost: 100.0,
            treble_boost: -100.0,
            distortion: 1.5,
            compression: 2.0,
        });

        let config = chain.config();
        assert_eq!(config.reverb, 1.0);
        assert_eq!(config.delay, 0.0);
        assert_eq!(config.bass_boost, SHELF_GAIN_RANGE_DB);
        assert_eq!(config.treble_boost, -SHELF_GAIN_RANGE_DB);
        assert_eq!(config.distortion, 1.0);
        assert_eq!(config.compression, 1.0);
    }

    #[test]
    fn test_bass_boost_raises_low_frequency_energy() {
        let mut chain = EffectsChain::new();
        chain.apply_effects(AudioEffectsConfig {
            bass_boost: 12.0,
            ..Default::default()
        });

        // 50Hz sine, well inside the shelf
        let mut buffer = StereoBuffer::silence(48000);
        for (i, s) in buffer.iter_mut().enumerate() {
            let v = (2.0 * std::f32::consts::PI * 50.0 * i as f32 / 48000.0).sin() * 0.25;
            s.left = v;
            s.right = v;
        }
        let input_peak = buffer.peak();
        chain.process(&mut buffer);

        assert!(
            buffer.peak() > input_peak * 1.5,
            "low shelf should boost a 50Hz tone: {} -> {}",
            input_peak,
            buffer.peak()
        );
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = AudioEffectsConfig {
            reverb: 0.3,
            delay: 0.25,
            bass_boost: 6.0,
            treble_boost: -3.0,
            distortion: 0.1,
            compression: 0.5,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("bassBoost"));
        let back: AudioEffectsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
