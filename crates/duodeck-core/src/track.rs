//! Track metadata and decoded audio
//!
//! `Track` is the caller-owned metadata handed to the engine at load time.
//! `LoadedTrack` pairs it with fully decoded stereo audio; only a
//! `LoadedTrack` ever reaches the audio thread, so a deck's existing
//! playback is undisturbed until the new source is ready to splice in.

use std::path::PathBuf;

use basedrop::Shared;
use serde::{Deserialize, Serialize};

use crate::engine::gc::gc_handle;
use crate::types::StereoBuffer;

/// Track metadata supplied by the external show-control layer
///
/// Read-only to the engine; the engine holds it only for the duration of a
/// deck's load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Caller-assigned identifier
    pub id: String,
    /// Locator for the decodable audio source
    pub source_locator: PathBuf,
    /// Tempo in beats per minute, if analyzed
    pub bpm: Option<f64>,
    /// Musical key (e.g. "Am", "F#"), if analyzed
    pub musical_key: Option<String>,
    /// Duration in seconds
    pub duration_seconds: f64,
}

/// A track decoded and ready for playback
///
/// The sample buffer is held in `basedrop::Shared` so that dropping the
/// last reference on the audio thread defers deallocation to the GC thread.
pub struct LoadedTrack {
    /// Caller metadata
    pub track: Track,
    /// Decoded stereo audio at the source's native rate
    samples: Shared<StereoBuffer>,
    /// Sample rate the audio was decoded at
    pub sample_rate: u32,
}

impl LoadedTrack {
    /// Wrap decoded audio for playback
    pub fn new(track: Track, samples: StereoBuffer, sample_rate: u32) -> Self {
        Self {
            track,
            samples: Shared::new(&gc_handle(), samples),
            sample_rate,
        }
    }

    /// Decoded audio
    #[inline]
    pub fn samples(&self) -> &StereoBuffer {
        &self.samples
    }

    /// Track length in samples at the native rate
    #[inline]
    pub fn duration_samples(&self) -> usize {
        self.samples.len()
    }

    /// Track length in seconds, derived from the decoded audio
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// BPM from metadata, if known
    #[inline]
    pub fn bpm(&self) -> Option<f64> {
        self.track.bpm
    }
}

impl std::fmt::Debug for LoadedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedTrack")
            .field("track", &self.track)
            .field("duration_samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
