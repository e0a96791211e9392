//! Reverb stage of the per-deck effects chain
//!
//! Freeverb-style algorithmic reverb: parallel comb filters for the decay
//! tail, serial allpass filters for diffusion. The amount control is the
//! wet mix; room size and damping are fixed.

use crate::types::{StereoBuffer, SAMPLE_RATE};

/// Comb filter delay line lengths (in samples at 44.1kHz)
/// Prime-ish numbers to avoid resonances
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Scaling factor for sample rate differences from 44.1kHz
const SR_SCALE: f32 = SAMPLE_RATE as f32 / 44100.0;

/// Stereo spread offset for the right channel (in samples)
const STEREO_SPREAD: usize = 23;

/// Fixed comb feedback (decay time)
const ROOM_FEEDBACK: f32 = 0.84;
/// Fixed high-frequency damping
const DAMPING: f32 = 0.5;
/// Allpass feedback coefficient
const ALLPASS_FEEDBACK: f32 = 0.5;
/// Gain compensation for comb filter summing
const COMB_GAIN: f32 = 0.2;

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        let scaled_len = ((length as f32 * SR_SCALE) as usize).max(1);
        Self {
            buffer: vec![0.0; scaled_len],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole lowpass in the feedback path damps high frequencies
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;

        self.buffer[self.pos] = input + self.filter_state * ROOM_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        let scaled_len = ((length as f32 * SR_SCALE) as usize).max(1);
        Self {
            buffer: vec![0.0; scaled_len],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Freeverb-style stereo reverb with a single wet-mix control
pub struct Reverb {
    combs_l: Vec<CombFilter>,
    combs_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
    /// Wet mix, 0.0 (off) to 1.0 (fully wet)
    wet: f32,
}

impl Reverb {
    pub fn new() -> Self {
        let combs_l: Vec<_> = COMB_LENGTHS.iter().map(|&len| CombFilter::new(len)).collect();
        let combs_r: Vec<_> = COMB_LENGTHS
            .iter()
            .map(|&len| CombFilter::new(len + STEREO_SPREAD))
            .collect();

        let allpass_l: Vec<_> = ALLPASS_LENGTHS.iter().map(|&len| AllpassFilter::new(len)).collect();
        let allpass_r: Vec<_> = ALLPASS_LENGTHS
            .iter()
            .map(|&len| AllpassFilter::new(len + STEREO_SPREAD))
            .collect();

        Self {
            combs_l,
            combs_r,
            allpass_l,
            allpass_r,
            wet: 0.0,
        }
    }

    /// Set the wet mix from the 0..1 amount control
    pub fn set_amount(&mut self, amount: f32) {
        self.wet = amount.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.wet > 0.0
    }

    /// Process a buffer in place, blending the reverb tail per the wet mix
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.is_active() {
            return;
        }

        let wet = self.wet;
        let dry = 1.0 - wet;

        for sample in buffer.iter_mut() {
            let input = (sample.left + sample.right) * 0.5;

            let mut out_l = 0.0f32;
            let mut out_r = 0.0f32;

            for comb in &mut self.combs_l {
                out_l += comb.process(input);
            }
            for comb in &mut self.combs_r {
                out_r += comb.process(input);
            }

            out_l *= COMB_GAIN;
            out_r *= COMB_GAIN;

            for ap in &mut self.allpass_l {
                out_l = ap.process(out_l);
            }
            for ap in &mut self.allpass_r {
                out_r = ap.process(out_r);
            }

            sample.left = sample.left * dry + out_l * wet;
            sample.right = sample.right * dry + out_r * wet;
        }
    }

    pub fn reset(&mut self) {
        for comb in &mut self.combs_l {
            comb.reset();
        }
        for comb in &mut self.combs_r {
            comb.reset();
        }
        for ap in &mut self.allpass_l {
            ap.reset();
        }
        for ap in &mut self.allpass_r {
            ap.reset();
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}
