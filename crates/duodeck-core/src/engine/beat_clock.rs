//! Per-deck beat phase counter
//!
//! Models a fixed 4/4 meter grouped into 8-bar phrases. Phase is derived
//! from the deck's actual playback position in track seconds rather than a
//! wall-clock timer, so it stays exact under tempo changes and never
//! drifts with scheduling jitter.

/// Beats per bar (fixed 4/4 meter)
pub const BEATS_PER_BAR: u32 = 4;
/// Bars per phrase
pub const BARS_PER_PHRASE: u32 = 8;

/// Beat/bar/phrase counter for one deck
#[derive(Debug, Clone, Default)]
pub struct BeatClock {
    bpm: Option<f64>,
    /// Total beats elapsed at the current track position
    total_beats: f64,
}

impl BeatClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the clock to a track tempo; `None` stops it entirely
    pub fn set_bpm(&mut self, bpm: Option<f64>) {
        self.bpm = bpm.filter(|b| *b > 0.0);
        self.total_beats = 0.0;
    }

    pub fn bpm(&self) -> Option<f64> {
        self.bpm
    }

    /// Duration of one beat in milliseconds, if a tempo is known
    pub fn beat_duration_ms(&self) -> Option<f64> {
        self.bpm.map(|bpm| 60_000.0 / bpm)
    }

    /// Recompute the phase from the deck's position in track seconds
    ///
    /// Track seconds are pre-tempo: a track playing at 2x covers twice the
    /// track time per wall second, which is exactly what makes the beat
    /// grid speed up with it.
    pub fn update(&mut self, track_seconds: f64) {
        if let Some(bpm) = self.bpm {
            self.total_beats = track_seconds.max(0.0) * bpm / 60.0;
        }
    }

    pub fn reset(&mut self) {
        self.total_beats = 0.0;
    }

    /// Beat within the current bar, 0..4
    pub fn beat_phase(&self) -> u32 {
        (self.total_beats as u64 % BEATS_PER_BAR as u64) as u32
    }

    /// Bar within the current phrase, 0..8
    pub fn bar_count(&self) -> u32 {
        ((self.total_beats as u64 / BEATS_PER_BAR as u64) % BARS_PER_PHRASE as u64) as u32
    }

    /// Completed 8-bar phrases since the start of the track
    pub fn phrase_count(&self) -> u64 {
        self.total_beats as u64 / (BEATS_PER_BAR * BARS_PER_PHRASE) as u64
    }

    /// Fractional position within the current beat, 0.0..1.0
    pub fn beat_fraction(&self) -> f64 {
        self.total_beats.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_bpm_means_no_phase() {
        let mut clock = BeatClock::new();
        clock.update(100.0);
        assert_eq!(clock.beat_phase(), 0);
        assert_eq!(clock.bar_count(), 0);
        assert_eq!(clock.phrase_count(), 0);
        assert!(clock.beat_duration_ms().is_none());
    }

    #[test]
    fn test_beat_duration() {
        let mut clock = BeatClock::new();
        clock.set_bpm(Some(120.0));
        assert_eq!(clock.beat_duration_ms(), Some(500.0));

        clock.set_bpm(Some(60.0));
        assert_eq!(clock.beat_duration_ms(), Some(1000.0));
    }

    #[test]
    fn test_phase_counters_nest() {
        let mut clock = BeatClock::new();
        clock.set_bpm(Some(120.0)); // 2 beats per second

        // 2.5 seconds = 5 beats: bar 1, beat 1
        clock.update(2.5);
        assert_eq!(clock.beat_phase(), 1);
        assert_eq!(clock.bar_count(), 1);
        assert_eq!(clock.phrase_count(), 0);

        // 16 seconds = 32 beats = exactly one phrase
        clock.update(16.0);
        assert_eq!(clock.beat_phase(), 0);
        assert_eq!(clock.bar_count(), 0);
        assert_eq!(clock.phrase_count(), 1);
    }

    #[test]
    fn test_position_derived_not_accumulated() {
        let mut clock = BeatClock::new();
        clock.set_bpm(Some(120.0));

        clock.update(10.0);
        let at_ten = clock.beat_phase();

        // Seeking backward rewinds the grid, it does not keep counting
        clock.update(0.5);
        assert_eq!(clock.beat_phase(), 1);
        clock.update(10.0);
        assert_eq!(clock.beat_phase(), at_ten);
    }

    #[test]
    fn test_zero_bpm_rejected() {
        let mut clock = BeatClock::new();
        clock.set_bpm(Some(0.0));
        assert!(clock.bpm().is_none());
    }
}
