//! MixerEngine - owns both decks and the master chain
//!
//! Master chain: deck sum (crossfader gains applied at summing time) ->
//! master volume -> lookahead limiter -> master analysis tap -> output.
//! Crossfading is a mixer concern: the per-deck gain is applied when the
//! deck buffer is summed onto the master bus, never inside the deck.
//!
//! A separate headphone bus lets the operator pre-listen a deck, the
//! master, or a cue/master split without affecting the house output.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::types::{CrossfaderCurve, DeckId, HeadphoneCue, StereoBuffer, NUM_DECKS};

use super::analysis::AnalysisTap;
use super::command::EngineCommand;
use super::context::{ContextState, ProcessingContext};
use super::deck::{DeckEngine, DeckState};
use super::master_limiter::MasterLimiter;
use super::{sync, MAX_BUFFER_SIZE};

/// Per-deck gain for a crossfader position under a given curve law
///
/// Position 0 is full deck A, 1 is full deck B.
pub fn calculate_crossfader_gain(position: f32, deck: DeckId, curve: CrossfaderCurve) -> f32 {
    let p = position.clamp(0.0, 1.0);
    // Normalized contribution: 1.0 at this deck's end of the fader
    let normalized = match deck {
        DeckId::A => 1.0 - p,
        DeckId::B => p,
    };

    match curve {
        CrossfaderCurve::Linear => normalized,
        // Equal power: gainA^2 + gainB^2 == 1 for all positions
        CrossfaderCurve::Smooth => ((1.0 - normalized) * std::f32::consts::FRAC_PI_2).cos(),
        // Near-binary switch. Each deck ramps to zero over its half of the
        // [0.4, 0.6] window, so dead center kills both decks outright.
        CrossfaderCurve::FastCut => match deck {
            DeckId::A => {
                if p < 0.4 {
                    1.0
                } else if p < 0.5 {
                    (0.5 - p) * 10.0
                } else {
                    0.0
                }
            }
            DeckId::B => {
                if p > 0.6 {
                    1.0
                } else if p > 0.5 {
                    (p - 0.5) * 10.0
                } else {
                    0.0
                }
            }
        },
    }
}

/// Immutable mixer state snapshot for the control layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerState {
    pub crossfader_position: f32,
    pub crossfader_curve: CrossfaderCurve,
    pub master_volume: f32,
    pub master_limiter_enabled: bool,
    pub master_limiter_threshold_db: f32,
    pub headphone_cue: HeadphoneCue,
    pub headphone_mix: f32,
    pub decks_synced: bool,
    pub decks_in_key: bool,
}

/// The dual-deck mixing engine
pub struct MixerEngine {
    context: Arc<ProcessingContext>,
    decks: [DeckEngine; NUM_DECKS],
    /// Pre-allocated per-deck output buffers, sized to MAX_BUFFER_SIZE
    deck_buffers: [StereoBuffer; NUM_DECKS],

    crossfader_position: f32,
    crossfader_curve: CrossfaderCurve,
    master_volume: f32,
    limiter: MasterLimiter,
    limiter_threshold_db: f32,
    master_tap: Arc<AnalysisTap>,

    headphone_cue: HeadphoneCue,
    /// Cue/master blend for split monitoring (0 = cue, 1 = master)
    headphone_mix: f32,
}

impl MixerEngine {
    pub fn new(context: Arc<ProcessingContext>) -> Self {
        let limiter = MasterLimiter::new();
        Self {
            context,
            decks: [DeckEngine::new(DeckId::A), DeckEngine::new(DeckId::B)],
            deck_buffers: std::array::from_fn(|_| StereoBuffer::silence(MAX_BUFFER_SIZE)),
            crossfader_position: 0.5,
            crossfader_curve: CrossfaderCurve::default(),
            master_volume: 1.0,
            limiter_threshold_db: -1.0,
            limiter,
            master_tap: AnalysisTap::new(),
            headphone_cue: HeadphoneCue::default(),
            headphone_mix: 0.5,
        }
    }

    pub fn context(&self) -> &Arc<ProcessingContext> {
        &self.context
    }

    pub fn deck(&self, id: DeckId) -> &DeckEngine {
        &self.decks[id.index()]
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut DeckEngine {
        &mut self.decks[id.index()]
    }

    /// Master-bus analysis tap
    pub fn master_analysis(&self) -> Arc<AnalysisTap> {
        Arc::clone(&self.master_tap)
    }

    // ── Transport with context policy ──────────────────────────────────

    /// Start playback on a deck
    ///
    /// If the shared context is suspended, one resume attempt is made; a
    /// host-denied resume surfaces as `PlaybackDenied` rather than a
    /// silently dead deck. Never retried beyond that single attempt.
    pub fn play(&mut self, deck: DeckId) -> EngineResult<()> {
        match self.context.state() {
            ContextState::Closed => {
                return Err(EngineError::ContextUnavailable("context is closed".to_string()));
            }
            ContextState::Suspended => {
                if let Err(err) = self.context.resume() {
                    return Err(EngineError::PlaybackDenied {
                        deck,
                        reason: err.to_string(),
                    });
                }
            }
            ContextState::Running => {}
        }
        self.decks[deck.index()].play();
        Ok(())
    }

    // ── Crossfader and master controls ─────────────────────────────────

    /// Set the crossfader position, clamped to 0..1
    pub fn set_crossfader_position(&mut self, position: f32) {
        self.crossfader_position = position.clamp(0.0, 1.0);
    }

    pub fn crossfader_position(&self) -> f32 {
        self.crossfader_position
    }

    pub fn set_crossfader_curve(&mut self, curve: CrossfaderCurve) {
        self.crossfader_curve = curve;
    }

    pub fn crossfader_curve(&self) -> CrossfaderCurve {
        self.crossfader_curve
    }

    /// Current gain a deck receives at the master summing point
    pub fn deck_gain(&self, deck: DeckId) -> f32 {
        calculate_crossfader_gain(self.crossfader_position, deck, self.crossfader_curve)
    }

    pub fn crossfader_to_a(&mut self) {
        self.set_crossfader_position(0.0);
    }

    pub fn crossfader_to_center(&mut self) {
        self.set_crossfader_position(0.5);
    }

    pub fn crossfader_to_b(&mut self) {
        self.set_crossfader_position(1.0);
    }

    pub fn nudge_crossfader(&mut self, delta: f32) {
        self.set_crossfader_position(self.crossfader_position + delta);
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_limiter_enabled(&mut self, enabled: bool) {
        self.limiter.set_enabled(enabled);
    }

    pub fn set_master_limiter_threshold(&mut self, db: f32) {
        self.limiter_threshold_db = db.min(0.0);
        self.limiter.set_threshold_db(db);
    }

    pub fn set_headphone_cue(&mut self, cue: HeadphoneCue) {
        self.headphone_cue = cue;
    }

    pub fn set_headphone_mix(&mut self, mix: f32) {
        self.headphone_mix = mix.clamp(0.0, 1.0);
    }

    // ── Coordination and read models ───────────────────────────────────

    pub fn sync_decks(&mut self, source: DeckId) -> EngineResult<()> {
        sync::sync_decks(&mut self.decks, source)
    }

    pub fn align_beats(&mut self, source: DeckId) -> EngineResult<()> {
        sync::align_beats(&mut self.decks, source)
    }

    pub fn are_decks_synced(&self) -> bool {
        sync::are_decks_synced(&self.decks)
    }

    pub fn are_decks_in_key(&self) -> bool {
        sync::are_decks_in_key(&self.decks)
    }

    pub fn mixer_state(&self) -> MixerState {
        MixerState {
            crossfader_position: self.crossfader_position,
            crossfader_curve: self.crossfader_curve,
            master_volume: self.master_volume,
            master_limiter_enabled: self.limiter.is_enabled(),
            master_limiter_threshold_db: self.limiter_threshold_db,
            headphone_cue: self.headphone_cue,
            headphone_mix: self.headphone_mix,
            decks_synced: self.are_decks_synced(),
            decks_in_key: self.are_decks_in_key(),
        }
    }

    pub fn decks_state(&self) -> [DeckState; NUM_DECKS] {
        [self.decks[0].state(), self.decks[1].state()]
    }

    // ── Audio ──────────────────────────────────────────────────────────

    /// Drain pending control commands
    ///
    /// Called at the start of each block so no command's effect is
    /// observable mid-block. Wait-free on the audio thread.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply_command(cmd);
        }
    }

    fn apply_command(&mut self, cmd: EngineCommand) {
        use EngineCommand::*;
        match cmd {
            LoadTrack { deck, track } => self.decks[deck.index()].load(*track),
            UnloadTrack { deck } => self.decks[deck.index()].unload(),
            // Failures surface through the synchronous APIs and the state
            // snapshots; the callback path stays free of side effects
            Play { deck } => {
                let _ = self.play(deck);
            }
            Pause { deck } => self.decks[deck.index()].pause(),
            Cue { deck } => self.decks[deck.index()].cue(),
            SetCue { deck } => self.decks[deck.index()].set_cue(),
            Seek { deck, seconds } => self.decks[deck.index()].seek(seconds),
            SetTempo { deck, tempo } => self.decks[deck.index()].set_tempo(tempo),
            ToggleKeyLock { deck } => self.decks[deck.index()].toggle_key_lock(),
            SetChannelFader { deck, level } => self.decks[deck.index()].set_channel_fader(level),
            SetTrimGain { deck, level } => self.decks[deck.index()].set_trim_gain(level),
            SetEq { deck, band, gain_db } => self.decks[deck.index()].set_eq(band, gain_db),
            KillEq { deck, band } => self.decks[deck.index()].kill_eq(band),
            ResetEq { deck } => self.decks[deck.index()].reset_eq(),
            ApplyEffects { deck, config } => self.decks[deck.index()].apply_effects(config),
            SetCrossfader { position } => self.set_crossfader_position(position),
            NudgeCrossfader { delta } => self.nudge_crossfader(delta),
            SetCrossfaderCurve { curve } => self.set_crossfader_curve(curve),
            SetMasterVolume { volume } => self.set_master_volume(volume),
            SetMasterLimiterEnabled { enabled } => self.set_master_limiter_enabled(enabled),
            SetMasterLimiterThreshold { db } => self.set_master_limiter_threshold(db),
            SetHeadphoneCue { cue } => self.set_headphone_cue(cue),
            SetHeadphoneMix { mix } => self.set_headphone_mix(mix),
            SyncDecks { source } => {
                let _ = self.sync_decks(source);
            }
            AlignBeats { source } => {
                let _ = self.align_beats(source);
            }
        }
    }

    /// Fill one master block and one headphone block
    ///
    /// Runs on the audio thread. A non-running context produces silence on
    /// both buses without advancing any deck.
    pub fn process(&mut self, master_out: &mut StereoBuffer, cue_out: &mut StereoBuffer) {
        let buffer_len = master_out.len();
        debug_assert!(buffer_len <= MAX_BUFFER_SIZE);
        debug_assert_eq!(cue_out.len(), buffer_len);

        if !self.context.is_running() {
            master_out.fill_silence();
            cue_out.fill_silence();
            return;
        }

        for buf in &mut self.deck_buffers {
            buf.set_len_from_capacity(buffer_len);
        }

        // Decks are independent; run their chains in parallel
        self.decks
            .par_iter_mut()
            .zip(self.deck_buffers.par_iter_mut())
            .for_each(|(deck, buffer)| {
                deck.process(buffer);
            });

        // Sum to master with crossfader gains applied at the connection
        master_out.fill_silence();
        for deck_id in DeckId::ALL {
            let gain = self.deck_gain(deck_id);
            master_out.add_buffer_scaled(&self.deck_buffers[deck_id.index()], gain);
        }

        master_out.scale(self.master_volume);
        self.limiter.process(master_out);
        self.master_tap.process(master_out);

        // Headphone bus: post-fader pre-crossfader deck signal, the master
        // itself, or a cue/master blend
        cue_out.fill_silence();
        match self.headphone_cue {
            HeadphoneCue::DeckA => cue_out.add_buffer(&self.deck_buffers[0]),
            HeadphoneCue::DeckB => cue_out.add_buffer(&self.deck_buffers[1]),
            HeadphoneCue::Master => cue_out.add_buffer(master_out),
            HeadphoneCue::Split => {
                let cue_gain = 1.0 - self.headphone_mix;
                cue_out.add_buffer_scaled(&self.deck_buffers[0], cue_gain);
                cue_out.add_buffer_scaled(&self.deck_buffers[1], cue_gain);
                cue_out.add_buffer_scaled(master_out, self.headphone_mix);
            }
        }
    }
}
