//! Lock-free command queue for real-time engine control
//!
//! The control thread sends commands through a bounded `rtrb` ring buffer;
//! the audio thread drains them at the start of each processed block, so a
//! command's effect is never observable mid-block. Both sides are
//! wait-free: no mutex means a slow control thread can never starve the
//! audio callback into a dropout.

use crate::effects::AudioEffectsConfig;
use crate::track::LoadedTrack;
use crate::types::{CrossfaderCurve, DeckId, EqBand, HeadphoneCue};

/// Commands sent from the control thread to the audio thread
///
/// Each variant is one atomic operation. Parameter-carrying variants are
/// raw values; clamping happens where the value is applied.
pub enum EngineCommand {
    /// Load a decoded track onto a deck
    ///
    /// Boxed because a `LoadedTrack` carries the full decoded audio; the
    /// command enum itself must stay pointer-sized for the ring buffer.
    LoadTrack { deck: DeckId, track: Box<LoadedTrack> },
    /// Unload the track from a deck
    UnloadTrack { deck: DeckId },

    /// Start playback on a deck
    Play { deck: DeckId },
    /// Pause playback, keeping position
    Pause { deck: DeckId },
    /// Stop and return to the cue point
    Cue { deck: DeckId },
    /// Set the cue point at the current position
    SetCue { deck: DeckId },
    /// Seek to a position in seconds (clamped to the track)
    Seek { deck: DeckId, seconds: f64 },

    /// Set playback rate (clamped to 0.5..2.0)
    SetTempo { deck: DeckId, tempo: f64 },
    /// Flip between time-stretch and varispeed playback
    ToggleKeyLock { deck: DeckId },
    /// Set the post-effects channel fader (clamped to 0..1)
    SetChannelFader { deck: DeckId, level: f32 },
    /// Set the pre-EQ trim gain (clamped to 0..1.5)
    SetTrimGain { deck: DeckId, level: f32 },
    /// Set one EQ band in dB (clamped to -30..30)
    SetEq { deck: DeckId, band: EqBand, gain_db: f32 },
    /// Shortcut for setting a band to -30dB
    KillEq { deck: DeckId, band: EqBand },
    /// Return all three bands to 0dB
    ResetEq { deck: DeckId },
    /// Replace the deck's effect amounts as one snapshot
    ApplyEffects { deck: DeckId, config: AudioEffectsConfig },

    /// Set the crossfader position (0 = full A, 1 = full B)
    SetCrossfader { position: f32 },
    /// Nudge the crossfader by a delta, clamped to 0..1
    NudgeCrossfader { delta: f32 },
    /// Switch the crossfader gain law
    SetCrossfaderCurve { curve: CrossfaderCurve },
    /// Set master output volume (clamped to 0..1)
    SetMasterVolume { volume: f32 },
    /// Engage or release the master limiter
    SetMasterLimiterEnabled { enabled: bool },
    /// Set the master limiter threshold in dBFS
    SetMasterLimiterThreshold { db: f32 },
    /// Select the headphone cue source
    SetHeadphoneCue { cue: HeadphoneCue },
    /// Cue/master blend for the headphone bus (0 = cue, 1 = master)
    SetHeadphoneMix { mix: f32 },

    /// Match the other deck's effective BPM to the source deck's
    SyncDecks { source: DeckId },
    /// Nudge the other deck's position toward the source deck's beat phase
    AlignBeats { source: DeckId },
}

/// Capacity of the command queue
///
/// Control surfaces send at most a few commands per UI frame; 256 leaves
/// room for bursts like loading both decks while sweeping the crossfader.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a command channel as a `(Producer, Consumer)` pair
///
/// The producer belongs to the control thread, the consumer to the audio
/// thread.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
