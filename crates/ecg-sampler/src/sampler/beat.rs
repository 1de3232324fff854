//! Class-stratified beat windows with RR context.
//!
//! Each emitted window is three `frame_size` windows stacked along time: the
//! window around the selected beat, shifted back by the local mean RR
//! interval, the window itself, and the window shifted forward by the same
//! amount. Output shape is `[3 * frame_size, channels]`.

use ndarray::{concatenate, s, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace};

use super::{PlannedWindow, WindowPlanner};
use crate::defines::{HeartBeat, IcentiaBeat, BEAT_TARGETS};
use crate::error::DatasetError;
use crate::segment::PatientRecord;

/// Beat markers ignored at each end of a segment.
pub const BEAT_PADDING: usize = 20;

/// Segments whose share of normal beats is below this are skipped.
pub const NORMAL_FRACTION_THRESHOLD: f64 = 0.25;

/// Look-back / look-ahead around the window when estimating RR, in seconds.
const RR_WINDOW_SECS: f64 = 15.0;
/// Shortest RR interval accepted, in seconds (exclusive).
const RR_MIN_SECS: f64 = 0.6;
/// Longest RR interval accepted, in seconds (exclusive).
const RR_MAX_SECS: f64 = 2.0;

/// Draws beat-centred windows evenly across [`BEAT_TARGETS`].
#[derive(Debug, Clone)]
pub struct BeatPlanner {
    frame_size: usize,
    per_class: Vec<usize>,
    rr_window: usize,
    rr_min: usize,
    rr_max: usize,
}

impl BeatPlanner {
    /// `per_class[i]` beats are drawn (without replacement) for `BEAT_TARGETS[i]`.
    pub fn new(frame_size: usize, sampling_rate: usize, per_class: Vec<usize>) -> Self {
        let fs = sampling_rate as f64;
        BeatPlanner {
            frame_size,
            per_class,
            rr_window: (RR_WINDOW_SECS * fs) as usize,
            rr_min: (RR_MIN_SECS * fs) as usize,
            rr_max: (RR_MAX_SECS * fs) as usize,
        }
    }

    /// Per-class allocation.
    pub fn per_class(&self) -> &[usize] {
        &self.per_class
    }

    /// Mean of the plausible RR intervals among the beats around
    /// `[start, end)`, or `None` if there are none.
    pub fn local_rr(&self, beat_indices: &[usize], start: usize, end: usize) -> Option<usize> {
        let lo = start.saturating_sub(self.rr_window);
        let hi = end + self.rr_window;
        let xs = beat_indices.partition_point(|&i| i < lo);
        let xe = beat_indices.partition_point(|&i| i < hi);
        if xe <= xs {
            return None;
        }
        let context = &beat_indices[xs..(xe + 1).min(beat_indices.len())];
        let valid: Vec<usize> = context
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|&rr| rr > self.rr_min && rr < self.rr_max)
            .collect();
        if valid.is_empty() {
            return None;
        }
        Some(valid.iter().sum::<usize>() / valid.len())
    }
}

/// Whether the beat at `i` qualifies as a target of its own class.
fn qualifies(code: IcentiaBeat, prev: IcentiaBeat, next: IcentiaBeat) -> bool {
    if code == IcentiaBeat::Normal {
        prev == IcentiaBeat::Normal && next == IcentiaBeat::Normal
    } else {
        prev != IcentiaBeat::Undefined && next != IcentiaBeat::Undefined
    }
}

impl WindowPlanner for BeatPlanner {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn output_width(&self) -> usize {
        3 * self.frame_size
    }

    fn plan(&self, record: &PatientRecord, rng: &mut StdRng) -> Result<Vec<PlannedWindow>, DatasetError> {
        // (segment index, beat sample index) per target class
        let mut buckets: Vec<Vec<(usize, usize)>> = vec![Vec::new(); BEAT_TARGETS.len()];
        for (seg_idx, segment) in record.segments().iter().enumerate() {
            let beats = segment.beat_labels();
            if beats.is_empty() {
                continue;
            }
            let normal = beats.iter().filter(|b| b.code == IcentiaBeat::Normal).count();
            if (normal as f64) / (beats.len() as f64) < NORMAL_FRACTION_THRESHOLD {
                debug!(segment = segment.key(), normal, total = beats.len(), "Skipping noisy segment");
                continue;
            }
            if beats.len() <= 2 * BEAT_PADDING {
                continue;
            }
            for i in BEAT_PADDING..beats.len() - BEAT_PADDING {
                let code = beats[i].code;
                let Some(target) = BEAT_TARGETS.iter().position(|&c| c == code) else {
                    continue;
                };
                if qualifies(code, beats[i - 1].code, beats[i + 1].code) {
                    buckets[target].push((seg_idx, beats[i].index));
                }
            }
        }

        let mut windows = Vec::new();
        for (target, bucket) in buckets.iter().enumerate() {
            let k = self.per_class.get(target).copied().unwrap_or(0).min(bucket.len());
            let label = u32::from(HeartBeat::from(BEAT_TARGETS[target]));
            for &(segment, beat) in bucket.choose_multiple(rng, k) {
                let offset = (rng.gen_range(0.4..0.6) * self.frame_size as f64) as usize;
                windows.push(PlannedWindow { segment, start: beat.saturating_sub(offset), label });
            }
        }
        windows.shuffle(rng);
        Ok(windows)
    }

    fn extract(
        &self,
        record: &PatientRecord,
        window: &PlannedWindow,
    ) -> Result<Option<Array2<f32>>, DatasetError> {
        let segment = &record.segments()[window.segment];
        let start = window.start;
        let end = start + self.frame_size;

        let Some(avg_rr) = self.local_rr(segment.beat_indices(), start, end) else {
            trace!(segment = segment.key(), start, "No valid RR context");
            return Ok(None);
        };
        if start < avg_rr || end + avg_rr >= segment.len() {
            trace!(segment = segment.key(), start, avg_rr, "RR context leaves segment");
            return Ok(None);
        }

        let span = segment.read_signal(start - avg_rr, end + avg_rr)?;
        let f = self.frame_size;
        let stacked = concatenate(
            Axis(0),
            &[
                span.slice(s![0..f, ..]),
                span.slice(s![avg_rr..avg_rr + f, ..]),
                span.slice(s![2 * avg_rr..2 * avg_rr + f, ..]),
            ],
        )
        .map_err(|e| DatasetError::malformed(segment.key(), e.to_string()))?;
        Ok(Some(stacked.mapv(|v| if v.is_finite() { v } else { 0.0 })))
    }
}
