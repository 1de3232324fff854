//! Class-stratified rhythm windows.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use super::{PlannedWindow, WindowPlanner};
use crate::defines::{HeartRhythm, RHYTHM_TARGETS};
use crate::error::DatasetError;
use crate::segment::PatientRecord;

/// Draws rhythm windows evenly across [`RHYTHM_TARGETS`].
///
/// Per class, qualifying intervals (at least `frame_size` long) are drawn
/// with replacement weighted by duration, which approximates drawing
/// uniformly over time. A window is then placed uniformly inside each drawn
/// interval. The patient's windows are shuffled before emission.
#[derive(Debug, Clone)]
pub struct RhythmPlanner {
    frame_size: usize,
    per_class: Vec<usize>,
}

impl RhythmPlanner {
    /// `per_class[i]` windows are drawn for `RHYTHM_TARGETS[i]`; missing
    /// entries count as zero.
    pub fn new(frame_size: usize, per_class: Vec<usize>) -> Self {
        RhythmPlanner { frame_size, per_class }
    }

    /// Per-class allocation.
    pub fn per_class(&self) -> &[usize] {
        &self.per_class
    }
}

/// Qualifying interval: `(segment index, start, clipped end)`.
type Candidate = (usize, usize, usize);

impl WindowPlanner for RhythmPlanner {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn plan(&self, record: &PatientRecord, rng: &mut StdRng) -> Result<Vec<PlannedWindow>, DatasetError> {
        let mut buckets: Vec<Vec<Candidate>> = vec![Vec::new(); RHYTHM_TARGETS.len()];
        for (seg_idx, segment) in record.segments().iter().enumerate() {
            let len = segment.len();
            for iv in segment.rhythm_intervals() {
                let Some(target) = RHYTHM_TARGETS.iter().position(|&c| c == iv.code) else {
                    continue;
                };
                // Annotations may run past the recorded signal.
                let end = iv.end.min(len);
                if end < iv.start + self.frame_size {
                    continue;
                }
                buckets[target].push((seg_idx, iv.start, end));
            }
        }

        let mut windows = Vec::new();
        for (target, bucket) in buckets.iter().enumerate() {
            let k = self.per_class.get(target).copied().unwrap_or(0);
            if k == 0 {
                continue;
            }
            if bucket.is_empty() {
                debug!(patient_id = record.patient_id(), class = ?RHYTHM_TARGETS[target], "No qualifying rhythm intervals");
                continue;
            }
            let dist = match WeightedIndex::new(bucket.iter().map(|&(_, s, e)| e - s)) {
                Ok(d) => d,
                Err(e) => {
                    warn!(patient_id = record.patient_id(), "Cannot weight rhythm intervals: {e}");
                    continue;
                }
            };
            let label = u32::from(HeartRhythm::from(RHYTHM_TARGETS[target]));
            for _ in 0..k {
                let (segment, start, end) = bucket[dist.sample(rng)];
                let start = rng.gen_range(start..=end - self.frame_size);
                windows.push(PlannedWindow { segment, start, label });
            }
        }
        windows.shuffle(rng);
        Ok(windows)
    }
}
