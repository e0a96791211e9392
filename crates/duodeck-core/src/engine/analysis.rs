//! Lock-free analysis taps
//!
//! Each deck and the master bus expose a tap at the end of their signal
//! chain. The audio thread writes peak and RMS levels per block; UI-side
//! readers poll them without locking. Values are f32 bits in AtomicU32.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::StereoBuffer;

/// Shared level readings from one analysis tap
pub struct AnalysisTap {
    peak: AtomicU32,
    rms: AtomicU32,
}

impl AnalysisTap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peak: AtomicU32::new(0.0_f32.to_bits()),
            rms: AtomicU32::new(0.0_f32.to_bits()),
        })
    }

    /// Measure one processed block. Called from the audio thread
    pub fn process(&self, buffer: &StereoBuffer) {
        if buffer.is_empty() {
            return;
        }

        let mut peak = 0.0_f32;
        let mut sum_squares = 0.0_f32;
        for sample in buffer.iter() {
            let p = sample.peak();
            if p > peak {
                peak = p;
            }
            sum_squares += (sample.left * sample.left + sample.right * sample.right) * 0.5;
        }
        let rms = (sum_squares / buffer.len() as f32).sqrt();

        self.peak.store(peak.to_bits(), Ordering::Relaxed);
        self.rms.store(rms.to_bits(), Ordering::Relaxed);
    }

    /// Most recent block peak, linear amplitude
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    /// Most recent block RMS, linear amplitude
    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms.load(Ordering::Relaxed))
    }
}
