//! Label resolution for signal windows.
//!
//! Pure functions: no state, no I/O. Each maps the sparse annotations that
//! fall inside a window to a single task label. When a window overlaps
//! several codes, any presence of a high-priority code wins over a majority
//! of background codes.

use std::ops::Range;

use crate::defines::{HeartBeat, HeartRate, HeartRhythm, IcentiaBeat, IcentiaRhythm};
use crate::error::WindowError;
use crate::segment::{BeatMarker, RhythmInterval};

// ---------------------------------------------------------------------------
// Complete beats
// ---------------------------------------------------------------------------

/// Index range of the beats that lie completely inside `[start, end]`.
///
/// Beat markers denote the *end* of a beat, so the first marker at or after
/// `start` closes a beat that began before the window and is dropped. Markers
/// at or before `end` are kept. `indices` must be sorted.
///
/// # Errors
///
/// [`WindowError::InvalidWindow`] if `start >= end`.
pub fn complete_beat_range(
    indices: &[usize],
    start: usize,
    end: usize,
) -> Result<Range<usize>, WindowError> {
    if start >= end {
        return Err(WindowError::InvalidWindow { start, end });
    }
    let first = indices.partition_point(|&i| i < start) + 1;
    let last = indices.partition_point(|&i| i <= end);
    Ok(first.min(last)..last)
}

/// Beat indices lying completely inside `[start, end]`.
///
/// ```rust
/// use ecg_sampler::labels::complete_beats;
///
/// let beats = [100, 300, 500, 700, 900];
/// assert_eq!(complete_beats(&beats, 200, 800).unwrap(), &[500, 700]);
/// assert!(complete_beats(&beats, 800, 800).is_err());
/// ```
pub fn complete_beats(indices: &[usize], start: usize, end: usize) -> Result<&[usize], WindowError> {
    let range = complete_beat_range(indices, start, end)?;
    Ok(&indices[range])
}

/// Beat markers lying completely inside `[start, end]`.
pub fn complete_beat_markers(
    markers: &[BeatMarker],
    start: usize,
    end: usize,
) -> Result<&[BeatMarker], WindowError> {
    if start >= end {
        return Err(WindowError::InvalidWindow { start, end });
    }
    let first = markers.partition_point(|m| m.index < start) + 1;
    let last = markers.partition_point(|m| m.index <= end);
    Ok(&markers[first.min(last)..last])
}

/// Position of the first maximum.
fn argmax_first<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

// ---------------------------------------------------------------------------
// Rhythm
// ---------------------------------------------------------------------------

/// Resolve a rhythm label from interval durations and their codes.
///
/// Durations are summed per code. The longest high-priority rhythm wins if
/// its total is non-zero; otherwise the longest low-priority rhythm; with no
/// duration at all the label is [`HeartRhythm::Noise`]. Ties go to the
/// earlier code in the priority list. Extra entries in the longer slice are
/// ignored.
pub fn resolve_rhythm_label(durations: &[usize], labels: &[IcentiaRhythm]) -> HeartRhythm {
    let mut summed = [0usize; IcentiaRhythm::ALL.len()];
    for (&d, &code) in durations.iter().zip(labels) {
        summed[code as usize] += d;
    }
    for group in [&IcentiaRhythm::HIGH_PRIORITY[..], &IcentiaRhythm::LOW_PRIORITY[..]] {
        let totals: Vec<usize> = group.iter().map(|&c| summed[c as usize]).collect();
        if let Some(best) = argmax_first(&totals) {
            if totals[best] > 0 {
                return HeartRhythm::from(group[best]);
            }
        }
    }
    HeartRhythm::Noise
}

/// Clip rhythm intervals to the window `[start, end)`, returning the
/// overlapping durations with their codes.
///
/// # Errors
///
/// [`WindowError::InvalidWindow`] if `start >= end`.
pub fn window_rhythm_durations(
    intervals: &[RhythmInterval],
    start: usize,
    end: usize,
) -> Result<(Vec<usize>, Vec<IcentiaRhythm>), WindowError> {
    if start >= end {
        return Err(WindowError::InvalidWindow { start, end });
    }
    Ok(intervals
        .iter()
        .filter_map(|iv| {
            let lo = iv.start.max(start);
            let hi = iv.end.min(end);
            (hi > lo).then_some((hi - lo, iv.code))
        })
        .unzip())
}

/// Rhythm label of the window `[start, end)` given a segment's intervals.
pub fn resolve_window_rhythm(
    intervals: &[RhythmInterval],
    start: usize,
    end: usize,
) -> Result<HeartRhythm, WindowError> {
    let (durations, codes) = window_rhythm_durations(intervals, start, end)?;
    Ok(resolve_rhythm_label(&durations, &codes))
}

// ---------------------------------------------------------------------------
// Beat
// ---------------------------------------------------------------------------

/// Resolve a beat label from the beat codes inside a window.
///
/// Any PAC or PVC present wins (the more frequent of the two, PAC on a tie);
/// otherwise the more frequent of normal and undefined; with no beats the
/// label is [`HeartBeat::Noise`].
pub fn resolve_beat_label(labels: &[IcentiaBeat]) -> HeartBeat {
    let mut counts = [0usize; IcentiaBeat::ALL.len()];
    for &code in labels {
        counts[code as usize] += 1;
    }
    for group in [&IcentiaBeat::HIGH_PRIORITY[..], &IcentiaBeat::LOW_PRIORITY[..]] {
        let totals: Vec<usize> = group.iter().map(|&c| counts[c as usize]).collect();
        if let Some(best) = argmax_first(&totals) {
            if totals[best] > 0 {
                return HeartBeat::from(group[best]);
            }
        }
    }
    HeartBeat::from(IcentiaBeat::Undefined)
}

// ---------------------------------------------------------------------------
// Heart rate
// ---------------------------------------------------------------------------

/// Resolve a heart-rate bucket from beat positions.
///
/// Positions are sample indices when `sampling_rate` is given, seconds
/// otherwise. Fewer than two beats, or a non-positive mean interval, yield
/// [`HeartRate::Noise`].
pub fn resolve_heart_rate_label(beat_positions: &[f64], sampling_rate: Option<f64>) -> HeartRate {
    if beat_positions.len() < 2 {
        return HeartRate::Noise;
    }
    let n = beat_positions.len() - 1;
    let span: f64 = beat_positions.windows(2).map(|w| w[1] - w[0]).sum();
    let mut mean_rr = span / n as f64;
    if let Some(fs) = sampling_rate {
        mean_rr /= fs;
    }
    if !mean_rr.is_finite() || mean_rr <= 0.0 {
        return HeartRate::Noise;
    }
    HeartRate::from_bpm(60.0 / mean_rr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
