//! Deck - one independent playable channel with its processing chain
//!
//! Signal chain per deck:
//!   source -> trim gain -> EQ low/mid/high -> effects chain -> channel
//!   fader -> analysis tap -> deck output
//!
//! The deck reads its track at a variable rate (tempo x native-rate ratio).
//! With key lock on, the read block is time-stretched back to the output
//! length so pitch stays put; with key lock off, a linear-interpolating
//! varispeed read gives classic turntable pitch shift.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use signalsmith_stretch::Stretch;

use crate::effects::biquad::{BiquadCoeffs, BiquadState};
use crate::effects::{AudioEffectsConfig, EffectsChain};
use crate::track::{LoadedTrack, Track};
use crate::types::{DeckId, EqBand, PlayState, StereoBuffer, SAMPLE_RATE};

use super::analysis::AnalysisTap;
use super::beat_clock::BeatClock;
use super::MAX_BUFFER_SIZE;

/// Tempo range (playback rate multiplier)
pub const TEMPO_MIN: f64 = 0.5;
pub const TEMPO_MAX: f64 = 2.0;

/// EQ gain range in dB
pub const EQ_RANGE_DB: f32 = 30.0;

/// EQ band center/shelf frequencies in Hz
const EQ_LOW_HZ: f32 = 100.0;
const EQ_MID_HZ: f32 = 1000.0;
const EQ_HIGH_HZ: f32 = 10_000.0;
/// Q for the mid peaking band
const EQ_MID_Q: f32 = 1.0;

/// Lock-free playback state for UI access
///
/// The audio thread writes these atomics whenever the corresponding state
/// changes; UI-side readers poll them without any locking. `Relaxed` is
/// enough since only visibility matters, not ordering against other
/// memory.
pub struct DeckAtomics {
    /// Playhead position in native track samples
    pub position: AtomicU64,
    /// Playback state: 0=Stopped, 1=Playing, 2=Cued
    pub state: AtomicU8,
    /// Cue point in native track samples
    pub cue_point: AtomicU64,
}

impl DeckAtomics {
    pub fn new() -> Self {
        Self {
            position: AtomicU64::new(0),
            state: AtomicU8::new(0),
            cue_point: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state.load(Ordering::Relaxed) == 1
    }

    #[inline]
    pub fn play_state(&self) -> PlayState {
        match self.state.load(Ordering::Relaxed) {
            1 => PlayState::Playing,
            2 => PlayState::Cued,
            _ => PlayState::Stopped,
        }
    }

    #[inline]
    pub fn cue_point(&self) -> u64 {
        self.cue_point.load(Ordering::Relaxed)
    }
}

impl Default for DeckAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable deck state snapshot for the control layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckState {
    pub deck: DeckId,
    pub track: Option<Track>,
    pub play_state: PlayState,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub cue_point_seconds: f64,
    pub tempo: f64,
    pub key_lock: bool,
    pub trim_gain: f32,
    pub channel_fader: f32,
    /// Low, mid, high gains in dB
    pub eq_gains: [f32; 3],
    pub effects: AudioEffectsConfig,
    pub bpm: Option<f64>,
    /// BPM after the tempo multiplier
    pub effective_bpm: Option<f64>,
    pub beat_phase: u32,
    pub bar_count: u32,
    pub phrase_count: u64,
}

/// One deck of the dual-deck engine
pub struct DeckEngine {
    id: DeckId,
    track: Option<LoadedTrack>,
    /// Fractional playhead in native track samples
    position: f64,
    state: PlayState,
    /// Cue point in native track samples
    cue_point: f64,

    /// Playback rate multiplier, clamped to 0.5..2.0
    tempo: f64,
    /// Time-stretch (pitch held) vs varispeed (pitch follows speed)
    key_lock: bool,

    trim_gain: f32,
    channel_fader: f32,
    /// Low, mid, high gains in dB
    eq_gains: [f32; 3],
    eq_coeffs: [BiquadCoeffs; 3],
    eq_states: [BiquadState; 3],
    /// Set when eq_gains changed and coefficients need recomputing
    eq_dirty: bool,

    effects: EffectsChain,
    beat_clock: BeatClock,
    tap: Arc<AnalysisTap>,
    atomics: Arc<DeckAtomics>,

    stretcher: Stretch,
    /// Pre-allocated input block for the time-stretch path
    stretch_input: StereoBuffer,
}

impl DeckEngine {
    pub fn new(id: DeckId) -> Self {
        Self {
            id,
            track: None,
            position: 0.0,
            state: PlayState::Stopped,
            cue_point: 0.0,
            tempo: 1.0,
            // Key lock starts engaged: tempo changes hold pitch unless the
            // operator opts into varispeed
            key_lock: true,
            trim_gain: 1.0,
            channel_fader: 1.0,
            eq_gains: [0.0; 3],
            eq_coeffs: std::array::from_fn(|_| BiquadCoeffs::passthrough()),
            eq_states: std::array::from_fn(|_| BiquadState::default()),
            eq_dirty: false,
            effects: EffectsChain::new(),
            beat_clock: BeatClock::new(),
            tap: AnalysisTap::new(),
            atomics: Arc::new(DeckAtomics::new()),
            stretcher: Stretch::preset_default(2, SAMPLE_RATE),
            // Worst case input demand: max block at 2x tempo from a 96kHz
            // source on a 48kHz engine
            stretch_input: StereoBuffer::with_capacity(MAX_BUFFER_SIZE * 4),
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Lock-free state handle for UI-side readers
    pub fn atomics(&self) -> Arc<DeckAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Analysis tap at the end of this deck's chain
    pub fn analysis(&self) -> Arc<AnalysisTap> {
        Arc::clone(&self.tap)
    }

    #[inline]
    fn sync_state_atomic(&self) {
        let v = match self.state {
            PlayState::Stopped => 0,
            PlayState::Playing => 1,
            PlayState::Cued => 2,
        };
        self.atomics.state.store(v, Ordering::Relaxed);
    }

    #[inline]
    fn sync_position_atomic(&self) {
        self.atomics.position.store(self.position as u64, Ordering::Relaxed);
    }

    #[inline]
    fn sync_cue_atomic(&self) {
        self.atomics.cue_point.store(self.cue_point as u64, Ordering::Relaxed);
    }

    // ── Transport ──────────────────────────────────────────────────────

    /// Bind a new decoded track
    ///
    /// Stops playback and resets the deck to a cued state at the start.
    /// The previous track's buffer is released through the GC thread, not
    /// freed here.
    pub fn load(&mut self, track: LoadedTrack) {
        self.beat_clock.set_bpm(track.bpm());
        self.track = Some(track);
        self.position = 0.0;
        self.cue_point = 0.0;
        self.state = PlayState::Cued;
        self.stretcher.reset();

        self.sync_position_atomic();
        self.sync_state_atomic();
        self.sync_cue_atomic();
    }

    /// Drop the loaded track, returning the deck to empty
    pub fn unload(&mut self) {
        self.track = None;
        self.position = 0.0;
        self.cue_point = 0.0;
        self.state = PlayState::Stopped;
        self.beat_clock.set_bpm(None);
        self.stretcher.reset();

        self.sync_position_atomic();
        self.sync_state_atomic();
        self.sync_cue_atomic();
    }

    /// Start playback. No-op without a track
    pub fn play(&mut self) {
        if self.track.is_none() {
            return;
        }
        self.state = PlayState::Playing;
        self.sync_state_atomic();
    }

    /// Pause, keeping the playhead where it is
    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.state = PlayState::Stopped;
            self.sync_state_atomic();
        }
    }

    /// Stop and return the playhead to the cue point
    pub fn cue(&mut self) {
        if self.track.is_none() {
            return;
        }
        self.position = self.cue_point;
        self.state = PlayState::Cued;
        self.update_beat_clock();

        self.sync_position_atomic();
        self.sync_state_atomic();
    }

    /// Set the cue point at the current playhead
    pub fn set_cue(&mut self) {
        self.cue_point = self.position;
        self.sync_cue_atomic();
    }

    /// Seek to a position in seconds, clamped to the track
    pub fn seek(&mut self, seconds: f64) {
        let Some(track) = &self.track else {
            return;
        };
        let clamped = seconds.clamp(0.0, track.duration_seconds());
        self.position = clamped * track.sample_rate as f64;
        self.stretcher.reset();
        self.update_beat_clock();
        self.sync_position_atomic();
    }

    pub fn play_state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    /// Playhead position in seconds
    pub fn position_seconds(&self) -> f64 {
        match &self.track {
            Some(track) => self.position / track.sample_rate as f64,
            None => 0.0,
        }
    }

    /// Nudge the playhead by a signed offset in seconds (beat alignment)
    pub fn nudge_seconds(&mut self, offset: f64) {
        let seconds = self.position_seconds() + offset;
        self.seek(seconds);
    }

    // ── Parameters ─────────────────────────────────────────────────────

    /// Set the playback rate, clamped to 0.5..2.0
    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo.clamp(TEMPO_MIN, TEMPO_MAX);
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Flip key lock without interrupting playback
    pub fn toggle_key_lock(&mut self) {
        self.key_lock = !self.key_lock;
        // Drop any stretch tail from the previous mode
        self.stretcher.reset();
    }

    pub fn key_lock(&self) -> bool {
        self.key_lock
    }

    /// Track BPM from metadata, if known
    pub fn bpm(&self) -> Option<f64> {
        self.track.as_ref().and_then(|t| t.bpm())
    }

    /// BPM after the tempo multiplier
    pub fn effective_bpm(&self) -> Option<f64> {
        self.bpm().map(|bpm| bpm * self.tempo)
    }

    /// Musical key from metadata, if known
    pub fn musical_key(&self) -> Option<&str> {
        self.track.as_ref().and_then(|t| t.track.musical_key.as_deref())
    }

    pub fn set_channel_fader(&mut self, level: f32) {
        self.channel_fader = level.clamp(0.0, 1.0);
    }

    pub fn channel_fader(&self) -> f32 {
        self.channel_fader
    }

    pub fn set_trim_gain(&mut self, level: f32) {
        self.trim_gain = level.clamp(0.0, 1.5);
    }

    pub fn trim_gain(&self) -> f32 {
        self.trim_gain
    }

    /// Set one EQ band in dB, clamped to -30..30
    pub fn set_eq(&mut self, band: EqBand, gain_db: f32) {
        self.eq_gains[band as usize] = gain_db.clamp(-EQ_RANGE_DB, EQ_RANGE_DB);
        self.eq_dirty = true;
    }

    /// Kill shortcut: full -30dB cut on one band
    pub fn kill_eq(&mut self, band: EqBand) {
        self.set_eq(band, -EQ_RANGE_DB);
    }

    /// Return all bands to flat
    pub fn reset_eq(&mut self) {
        self.eq_gains = [0.0; 3];
        self.eq_dirty = true;
    }

    pub fn eq_gain(&self, band: EqBand) -> f32 {
        self.eq_gains[band as usize]
    }

    /// Replace the effect amounts as one snapshot
    pub fn apply_effects(&mut self, config: AudioEffectsConfig) {
        self.effects.apply_effects(config);
    }

    pub fn effects(&self) -> &EffectsChain {
        &self.effects
    }

    pub fn beat_clock(&self) -> &BeatClock {
        &self.beat_clock
    }

    /// Full state snapshot
    pub fn state(&self) -> DeckState {
        let duration = self.track.as_ref().map(|t| t.duration_seconds()).unwrap_or(0.0);
        let cue_seconds = match &self.track {
            Some(track) => self.cue_point / track.sample_rate as f64,
            None => 0.0,
        };
        DeckState {
            deck: self.id,
            track: self.track.as_ref().map(|t| t.track.clone()),
            play_state: self.state,
            position_seconds: self.position_seconds(),
            duration_seconds: duration,
            cue_point_seconds: cue_seconds,
            tempo: self.tempo,
            key_lock: self.key_lock,
            trim_gain: self.trim_gain,
            channel_fader: self.channel_fader,
            eq_gains: self.eq_gains,
            effects: self.effects.config(),
            bpm: self.bpm(),
            effective_bpm: self.effective_bpm(),
            beat_phase: self.beat_clock.beat_phase(),
            bar_count: self.beat_clock.bar_count(),
            phrase_count: self.beat_clock.phrase_count(),
        }
    }

    fn update_beat_clock(&mut self) {
        let seconds = self.position_seconds();
        self.beat_clock.update(seconds);
    }

    fn recompute_eq_coeffs(&mut self) {
        let specs = [
            (EQ_LOW_HZ, self.eq_gains[EqBand::Low as usize]),
            (EQ_MID_HZ, self.eq_gains[EqBand::Mid as usize]),
            (EQ_HIGH_HZ, self.eq_gains[EqBand::High as usize]),
        ];
        for (i, (freq, gain)) in specs.into_iter().enumerate() {
            self.eq_coeffs[i] = if gain == 0.0 {
                BiquadCoeffs::passthrough()
            } else {
                match i {
                    0 => BiquadCoeffs::low_shelf(freq, gain),
                    1 => BiquadCoeffs::peaking(freq, gain, EQ_MID_Q),
                    _ => BiquadCoeffs::high_shelf(freq, gain),
                }
            };
        }
        self.eq_dirty = false;
    }

    // ── Audio ──────────────────────────────────────────────────────────

    /// Fill one output block through the full deck chain
    ///
    /// Runs on the audio thread; no allocation, no locking.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        output.fill_silence();

        if self.state != PlayState::Playing || self.track.is_none() {
            self.tap.process(output);
            return;
        }

        if self.key_lock {
            self.render_stretched(output);
        } else {
            self.render_varispeed(output);
        }

        // Track ran out mid-block
        if self.track_ended() {
            self.state = PlayState::Stopped;
            if let Some(track) = &self.track {
                self.position = track.duration_samples() as f64;
            }
            self.sync_state_atomic();
        }

        self.update_beat_clock();
        self.sync_position_atomic();

        if self.eq_dirty {
            self.recompute_eq_coeffs();
        }

        let trim = self.trim_gain;
        for (i, coeffs) in self.eq_coeffs.iter().enumerate() {
            let state = &mut self.eq_states[i];
            if i == 0 {
                // Fold trim into the first pass over the buffer
                for sample in output.iter_mut() {
                    let (l, r) = state.process(sample.left * trim, sample.right * trim, coeffs);
                    sample.left = l;
                    sample.right = r;
                }
            } else {
                for sample in output.iter_mut() {
                    let (l, r) = state.process(sample.left, sample.right, coeffs);
                    sample.left = l;
                    sample.right = r;
                }
            }
        }

        self.effects.process(output);
        output.scale(self.channel_fader);
        self.tap.process(output);
    }

    fn track_ended(&self) -> bool {
        match &self.track {
            Some(track) => self.position >= track.duration_samples() as f64,
            None => false,
        }
    }

    /// Per-sample rate through the source: tempo times native-rate ratio
    fn read_rate(&self) -> f64 {
        let track = self.track.as_ref().map(|t| t.sample_rate).unwrap_or(SAMPLE_RATE);
        self.tempo * track as f64 / SAMPLE_RATE as f64
    }

    /// Varispeed path: linear-interpolating read, pitch follows speed
    fn render_varispeed(&mut self, output: &mut StereoBuffer) {
        let Some(track) = &self.track else {
            return;
        };
        let samples = track.samples();
        let len = samples.len();
        let rate = self.read_rate();

        let mut pos = self.position;
        for sample in output.iter_mut() {
            if pos >= len as f64 {
                break;
            }
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = if idx + 1 < len { samples[idx + 1] } else { a };

            sample.left = a.left + (b.left - a.left) * frac;
            sample.right = a.right + (b.right - a.right) * frac;
            pos += rate;
        }
        self.position = pos;
    }

    /// Key-lock path: consecutive read sized by rate, stretched back to
    /// the output length so pitch stays constant
    fn render_stretched(&mut self, output: &mut StereoBuffer) {
        let Some(track) = &self.track else {
            return;
        };
        let samples = track.samples();
        let len = samples.len();
        let rate = self.read_rate();

        let wanted = (output.len() as f64 * rate).round() as usize;
        let start = self.position as usize;
        let available = len.saturating_sub(start);
        let input_len = wanted.min(available);
        if input_len == 0 {
            self.position += wanted as f64;
            return;
        }

        self.stretch_input.set_len_from_capacity(input_len);
        self.stretch_input
            .as_mut_slice()
            .copy_from_slice(&samples.as_slice()[start..start + input_len]);

        let input_interleaved = self.stretch_input.as_interleaved();
        let output_len = output.len();
        let output_interleaved = output.as_interleaved_mut();
        output_interleaved[..output_len * 2].fill(0.0);
        self.stretcher
            .process(input_interleaved, &mut output_interleaved[..output_len * 2]);

        self.position += wanted as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Track;
    use std::path::PathBuf;

    fn test_track(bpm: Option<f64>, seconds: f64) -> LoadedTrack {
        let n = (seconds * SAMPLE_RATE as f64) as usize;
        let mut audio = StereoBuffer::silence(n);
        for (i, s) in audio.iter_mut().enumerate() {
            let v = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin() * 0.5;
            s.left = v;
            s.right = v;
        }
        LoadedTrack::new(
            Track {
                id: "t".into(),
                source_locator: PathBuf::from("/music/t.flac"),
                bpm,
                musical_key: Some("Am".into()),
                duration_seconds: seconds,
            },
            audio,
            SAMPLE_RATE,
        )
    }

    #[test]
    fn test_load_resets_transport() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(Some(120.0), 1.0));
        deck.play();
        deck.seek(0.5);
        deck.set_cue();

        deck.load(test_track(Some(128.0), 1.0));
        let state = deck.state();
        assert_eq!(state.play_state, PlayState::Cued);
        assert_eq!(state.position_seconds, 0.0);
        assert_eq!(state.cue_point_seconds, 0.0);
        assert_eq!(state.bpm, Some(128.0));

        // The snapshot carries the full track metadata
        let track = state.track.expect("loaded deck snapshot carries its track");
        assert_eq!(track.bpm, Some(128.0));
        assert_eq!(track.musical_key.as_deref(), Some("Am"));
        assert_eq!(track.source_locator, PathBuf::from("/music/t.flac"));
    }

    #[test]
    fn test_play_without_track_is_noop() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.play();
        assert_eq!(deck.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_tempo_clamped() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.set_tempo(3.0);
        assert_eq!(deck.tempo(), 2.0);
        deck.set_tempo(0.1);
        assert_eq!(deck.tempo(), 0.5);
    }

    #[test]
    fn test_eq_clamp_and_kill() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.set_eq(EqBand::Low, 100.0);
        assert_eq!(deck.eq_gain(EqBand::Low), 30.0);

        deck.kill_eq(EqBand::Low);
        assert_eq!(deck.eq_gain(EqBand::Low), -30.0);

        deck.reset_eq();
        assert_eq!(deck.eq_gain(EqBand::Low), 0.0);
    }

    #[test]
    fn test_fader_and_trim_clamped() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.set_channel_fader(2.0);
        assert_eq!(deck.channel_fader(), 1.0);
        deck.set_trim_gain(9.0);
        assert_eq!(deck.trim_gain(), 1.5);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(None, 1.0));
        deck.seek(100.0);
        assert!((deck.position_seconds() - 1.0).abs() < 1e-9);
        deck.seek(-5.0);
        assert_eq!(deck.position_seconds(), 0.0);
    }

    #[test]
    fn test_cue_returns_to_cue_point() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(None, 2.0));
        deck.seek(0.5);
        deck.set_cue();
        deck.seek(1.5);

        deck.cue();
        assert_eq!(deck.play_state(), PlayState::Cued);
        assert!((deck.position_seconds() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_varispeed_advances_by_tempo() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(None, 2.0));
        deck.toggle_key_lock(); // varispeed path
        deck.play();
        deck.set_tempo(2.0);

        let mut out = StereoBuffer::silence(4800);
        deck.process(&mut out);

        // One 0.1s block at 2x covers 0.2s of track
        assert!((deck.position_seconds() - 0.2).abs() < 1e-6);
        assert!(out.peak() > 0.0, "should produce audio");
    }

    #[test]
    fn test_stops_at_end_of_track() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(None, 0.05));
        deck.play();

        let mut out = StereoBuffer::silence(4800);
        deck.process(&mut out);
        assert_eq!(deck.play_state(), PlayState::Stopped);
        // Position pins at the end, not past it
        assert!((deck.position_seconds() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_key_lock_on_by_default() {
        let deck = DeckEngine::new(DeckId::A);
        assert!(deck.key_lock());

        let mut deck = DeckEngine::new(DeckId::A);
        deck.toggle_key_lock();
        assert!(!deck.key_lock());
    }

    #[test]
    fn test_key_lock_keeps_position_math() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(None, 2.0));
        assert!(deck.key_lock());
        deck.play();
        deck.set_tempo(1.5);

        let mut out = StereoBuffer::silence(4800);
        deck.process(&mut out);
        assert!((deck.position_seconds() - 0.15).abs() < 1e-3);
    }

    #[test]
    fn test_atomics_mirror_transport() {
        let mut deck = DeckEngine::new(DeckId::A);
        let atomics = deck.atomics();
        deck.load(test_track(None, 1.0));
        assert_eq!(atomics.play_state(), PlayState::Cued);

        deck.play();
        assert!(atomics.is_playing());

        deck.seek(0.5);
        assert_eq!(atomics.position(), (0.5 * SAMPLE_RATE as f64) as u64);
    }

    #[test]
    fn test_stopped_deck_outputs_silence() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(None, 1.0));

        let mut out = StereoBuffer::silence(256);
        for s in out.iter_mut() {
            s.left = 0.7;
        }
        deck.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_beat_clock_follows_position() {
        let mut deck = DeckEngine::new(DeckId::A);
        deck.load(test_track(Some(120.0), 10.0));
        deck.seek(2.5); // 5 beats at 120 BPM
        assert_eq!(deck.beat_clock().beat_phase(), 1);
        assert_eq!(deck.beat_clock().bar_count(), 1);
    }
}
