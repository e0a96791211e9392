//! Engine error types
//!
//! Parameter-range violations (tempo, EQ, fader, crossfader) are never
//! errors - they are clamped silently, because those are continuously
//! adjustable real-time controls. Everything here is a genuine failure
//! that the caller must see.

use thiserror::Error;

use crate::types::DeckId;

/// Errors that can occur during engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Track source unreachable or undecodable; the deck keeps its prior state
    #[error("failed to load track on deck {deck}: {reason}")]
    Load { deck: DeckId, reason: String },

    /// Host policy blocked audio start (e.g. no prior user gesture);
    /// surfaced rather than swallowed so the caller doesn't see a silent
    /// "successful" play
    #[error("playback denied on deck {deck}: {reason}")]
    PlaybackDenied { deck: DeckId, reason: String },

    /// Shared processing context failed to initialize or was closed
    #[error("processing context unavailable: {0}")]
    ContextUnavailable(String),

    /// BPM missing on one or both decks; sync is a no-op
    #[error("cannot sync deck {target} to deck {source}: BPM unavailable")]
    SyncUnavailable { source: DeckId, target: DeckId },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
