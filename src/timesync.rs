//! Playback time -> highlight target.
//!
//! Every lookup is a pure function of the time and the reading. The tracker
//! only remembers its last answer to avoid repainting an unchanged highlight;
//! seeks backwards or forwards are handled by recomputing from scratch.

use crate::content::Reading;

/// Index of the last segment whose start time is `<= time`. Ties go to the
/// later segment. `None` before the first segment, for NaN times, and for
/// readings that are empty or out of order.
pub fn segment_at(time: f64, reading: &Reading) -> Option<usize> {
    if !reading.is_playable() {
        return None;
    }
    reading
        .segments()
        .partition_point(|s| s.time <= time)
        .checked_sub(1)
}

/// End of segment `index`: the next segment's start, or the media duration
/// for the last one. `None` when the duration is not known yet.
pub fn segment_end_time(reading: &Reading, index: usize, duration: f64) -> Option<f64> {
    match reading.segments().get(index + 1) {
        Some(next) => Some(next.time),
        None => duration.is_finite().then_some(duration),
    }
}

/// Word slot within a segment, assuming a constant speaking rate: the
/// interval `[start, end)` is cut into `word_count` equal slices.
///
/// `None` when there are no words, the interval is empty or inverted, or
/// `time` falls outside it; callers fall back to the whole-segment highlight.
pub fn word_at(
    time: f64,
    segment_index: usize,
    reading: &Reading,
    word_count: usize,
    segment_end_time: f64,
) -> Option<usize> {
    let start = reading.segments().get(segment_index)?.time;
    if word_count == 0 || !(segment_end_time > start) || !(time >= start && time < segment_end_time) {
        return None;
    }
    let slice = (segment_end_time - start) / word_count as f64;
    let slot = ((time - start) / slice).floor() as usize;
    Some(slot.min(word_count - 1))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightState {
    pub active_segment: Option<usize>,
    pub active_word: Option<usize>,
}

impl HighlightState {
    pub const NONE: Self = Self { active_segment: None, active_word: None };

    /// Full recomputation for `time`. `word_counts`, when given, holds the
    /// indexed word count of every segment and enables word-level targets.
    pub fn at(time: f64, reading: &Reading, word_counts: Option<&[usize]>, duration: f64) -> Self {
        let Some(segment) = segment_at(time, reading) else {
            return Self::NONE;
        };
        let active_word = word_counts.and_then(|counts| {
            let count = *counts.get(segment)?;
            let end = segment_end_time(reading, segment, duration)?;
            word_at(time, segment, reading, count, end)
        });
        Self { active_segment: Some(segment), active_word }
    }
}

/// Remembers the last painted target so unchanged ticks cost nothing.
#[derive(Debug, Default)]
pub struct HighlightTracker {
    current: HighlightState,
}

impl HighlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> HighlightState {
        self.current
    }

    /// Recompute for `time`; `Some(new)` only if the target changed.
    pub fn update(
        &mut self,
        time: f64,
        reading: &Reading,
        word_counts: Option<&[usize]>,
        duration: f64,
    ) -> Option<HighlightState> {
        let next = HighlightState::at(time, reading, word_counts, duration);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }

    pub fn reset(&mut self) {
        self.current = HighlightState::NONE;
    }
}
