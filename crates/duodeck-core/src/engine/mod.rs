//! Real-time engine: decks, mixer, sync, and the control command queue

pub mod analysis;
pub mod beat_clock;
pub mod command;
pub mod context;
pub mod deck;
pub mod gc;
pub mod master_limiter;
pub mod mixer;
pub mod sync;

pub use analysis::AnalysisTap;
pub use beat_clock::BeatClock;
pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use context::{ContextState, ProcessingContext};
pub use deck::{DeckAtomics, DeckEngine, DeckState};
pub use master_limiter::MasterLimiter;
pub use mixer::{calculate_crossfader_gain, MixerEngine, MixerState};
pub use sync::{align_beats, are_decks_in_key, are_decks_synced, sync_decks, SYNC_TOLERANCE_BPM};

/// Maximum block size the engine will ever be asked to fill
///
/// Pre-allocated buffers are sized to this so the audio path never
/// allocates, whatever block size the host callback uses.
pub const MAX_BUFFER_SIZE: usize = 8192;
