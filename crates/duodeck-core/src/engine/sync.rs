//! Cross-deck sync and beat alignment
//!
//! Stateless operations over the two decks: tempo-matching makes both
//! decks' effective BPM equal, beat alignment gives the lagging deck a
//! coarse positional nudge toward the source deck's beat phase.

use crate::error::{EngineError, EngineResult};
use crate::types::{DeckId, NUM_DECKS};

use super::deck::DeckEngine;

/// Effective-BPM difference below which the decks count as synced
pub const SYNC_TOLERANCE_BPM: f64 = 0.5;

/// Seconds of position nudge applied per beat of phase offset
const ALIGN_NUDGE_SECS: f64 = 0.1;

/// Match the non-source deck's effective BPM to the source deck's
///
/// Computes `target_tempo = (source_bpm / target_bpm) * source_tempo` and
/// applies it (clamped) to the other deck. Requires BPM metadata on both
/// decks; without it the operation leaves both decks untouched.
pub fn sync_decks(decks: &mut [DeckEngine; NUM_DECKS], source: DeckId) -> EngineResult<()> {
    let target = source.other();

    let source_bpm = decks[source.index()].bpm();
    let target_bpm = decks[target.index()].bpm();
    let (Some(source_bpm), Some(target_bpm)) = (source_bpm, target_bpm) else {
        return Err(EngineError::SyncUnavailable { source, target });
    };
    if target_bpm <= 0.0 {
        return Err(EngineError::SyncUnavailable { source, target });
    }

    let source_tempo = decks[source.index()].tempo();
    let target_tempo = (source_bpm / target_bpm) * source_tempo;
    decks[target.index()].set_tempo(target_tempo);
    Ok(())
}

/// Nudge the non-source deck's position toward the source's beat phase
///
/// `offset = source_beat_phase - target_beat_phase`, applied as
/// `offset * 0.1` seconds. A coarse heuristic, not phase-locked
/// correction.
pub fn align_beats(decks: &mut [DeckEngine; NUM_DECKS], source: DeckId) -> EngineResult<()> {
    let target = source.other();

    if decks[source.index()].bpm().is_none() || decks[target.index()].bpm().is_none() {
        return Err(EngineError::SyncUnavailable { source, target });
    }

    let source_phase = decks[source.index()].beat_clock().beat_phase() as f64;
    let target_phase = decks[target.index()].beat_clock().beat_phase() as f64;
    let offset = source_phase - target_phase;

    decks[target.index()].nudge_seconds(offset * ALIGN_NUDGE_SECS);
    Ok(())
}

/// Whether the two decks' effective BPMs are within the sync tolerance
pub fn are_decks_synced(decks: &[DeckEngine; NUM_DECKS]) -> bool {
    let (Some(a), Some(b)) = (decks[0].effective_bpm(), decks[1].effective_bpm()) else {
        return false;
    };
    (a - b).abs() < SYNC_TOLERANCE_BPM
}

/// Whether both decks' musical keys are known and equal
///
/// Exact-match policy only; harmonic adjacency is deliberately not
/// attempted here.
pub fn are_decks_in_key(decks: &[DeckEngine; NUM_DECKS]) -> bool {
    match (decks[0].musical_key(), decks[1].musical_key()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{LoadedTrack, Track};
    use crate::types::{StereoBuffer, SAMPLE_RATE};
    use std::path::PathBuf;

    fn loaded(bpm: Option<f64>, key: Option<&str>) -> LoadedTrack {
        LoadedTrack::new(
            Track {
                id: "t".into(),
                source_locator: PathBuf::from("/music/t.flac"),
                bpm,
                musical_key: key.map(String::from),
                duration_seconds: 60.0,
            },
            StereoBuffer::silence(60 * SAMPLE_RATE as usize),
            SAMPLE_RATE,
        )
    }

    fn deck_pair(bpm_a: Option<f64>, bpm_b: Option<f64>) -> [DeckEngine; NUM_DECKS] {
        let mut a = DeckEngine::new(DeckId::A);
        let mut b = DeckEngine::new(DeckId::B);
        if bpm_a.is_some() {
            a.load(loaded(bpm_a, Some("Am")));
        }
        if bpm_b.is_some() {
            b.load(loaded(bpm_b, Some("Am")));
        }
        [a, b]
    }

    #[test]
    fn test_sync_from_faster_deck() {
        let mut decks = deck_pair(Some(128.0), Some(120.0));
        sync_decks(&mut decks, DeckId::A).unwrap();

        // 128/120 * 1.0
        assert!((decks[1].tempo() - 1.0667).abs() < 1e-3);
        assert!(are_decks_synced(&decks));
    }

    #[test]
    fn test_sync_from_slower_deck() {
        let mut decks = deck_pair(Some(120.0), Some(128.0));
        sync_decks(&mut decks, DeckId::A).unwrap();

        // 120/128 * 1.0
        assert!((decks[1].tempo() - 0.9375).abs() < 1e-9);
    }

    #[test]
    fn test_sync_respects_source_tempo() {
        let mut decks = deck_pair(Some(128.0), Some(120.0));
        decks[0].set_tempo(0.9);
        sync_decks(&mut decks, DeckId::A).unwrap();

        assert!((decks[1].tempo() - (128.0 / 120.0) * 0.9).abs() < 1e-9);
        assert!(are_decks_synced(&decks));
    }

    #[test]
    fn test_sync_without_bpm_is_noop() {
        let mut decks = deck_pair(Some(128.0), None);
        let before = decks[1].tempo();

        let result = sync_decks(&mut decks, DeckId::A);
        assert!(matches!(result, Err(EngineError::SyncUnavailable { .. })));
        assert_eq!(decks[1].tempo(), before);
    }

    #[test]
    fn test_synced_boundary() {
        // 120 vs 120.5: difference exactly 0.5 is NOT synced
        let mut decks = deck_pair(Some(120.0), Some(120.5));
        assert!(!are_decks_synced(&decks));

        // 120 vs 120.49 is synced
        decks[1].load(loaded(Some(120.49), Some("Am")));
        assert!(are_decks_synced(&decks));
    }

    #[test]
    fn test_in_key_requires_both_known_and_equal() {
        let mut a = DeckEngine::new(DeckId::A);
        let mut b = DeckEngine::new(DeckId::B);
        assert!(!are_decks_in_key(&[a, b]));

        a = DeckEngine::new(DeckId::A);
        b = DeckEngine::new(DeckId::B);
        a.load(loaded(Some(120.0), Some("Am")));
        b.load(loaded(Some(125.0), Some("Am")));
        let decks = [a, b];
        assert!(are_decks_in_key(&decks));
    }

    #[test]
    fn test_key_mismatch() {
        let mut a = DeckEngine::new(DeckId::A);
        let mut b = DeckEngine::new(DeckId::B);
        a.load(loaded(Some(120.0), Some("Am")));
        b.load(loaded(Some(125.0), Some("F#")));
        assert!(!are_decks_in_key(&[a, b]));
    }

    #[test]
    fn test_align_nudges_target_position() {
        let mut decks = deck_pair(Some(120.0), Some(120.0));
        // A at 2.5s = beat phase 1; B at 0s = phase 0
        decks[0].seek(2.5);

        align_beats(&mut decks, DeckId::A).unwrap();
        // offset 1 beat -> 0.1s nudge
        assert!((decks[1].position_seconds() - 0.1).abs() < 1e-6);
    }
}
