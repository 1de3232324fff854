//! Heart-rate bucket windows at random positions.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

use super::{PlannedWindow, WindowPlanner};
use crate::error::DatasetError;
use crate::labels::{complete_beats, resolve_heart_rate_label};
use crate::segment::PatientRecord;

/// Draws `samples` windows per patient, each from a random segment at a
/// random centre, labelled from the complete beats in a label window sharing
/// that centre.
///
/// A draw whose segment is not longer than the larger of the two windows is
/// skipped, not retried.
#[derive(Debug, Clone)]
pub struct HeartRatePlanner {
    frame_size: usize,
    label_frame_size: usize,
    sampling_rate: usize,
    samples: usize,
}

impl HeartRatePlanner {
    /// Planner with separate signal and label windows.
    pub fn new(frame_size: usize, label_frame_size: usize, sampling_rate: usize, samples: usize) -> Self {
        HeartRatePlanner { frame_size, label_frame_size, sampling_rate, samples }
    }
}

impl WindowPlanner for HeartRatePlanner {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn plan(&self, record: &PatientRecord, rng: &mut StdRng) -> Result<Vec<PlannedWindow>, DatasetError> {
        let segments = record.segments();
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        let max_frame = self.frame_size.max(self.label_frame_size);
        let mut windows = Vec::with_capacity(self.samples);
        for _ in 0..self.samples {
            let seg_idx = rng.gen_range(0..segments.len());
            let segment = &segments[seg_idx];
            if segment.len() <= max_frame {
                trace!(segment = segment.key(), len = segment.len(), "Segment shorter than frame");
                continue;
            }
            let center = rng.gen_range(0..segment.len() - max_frame) + max_frame / 2;
            let start = center - self.frame_size / 2;
            let label_start = center - self.label_frame_size / 2;
            let beats = complete_beats(
                segment.beat_indices(),
                label_start,
                label_start + self.label_frame_size,
            )?;
            let positions: Vec<f64> = beats.iter().map(|&i| i as f64).collect();
            let label = resolve_heart_rate_label(&positions, Some(self.sampling_rate as f64));
            windows.push(PlannedWindow { segment: seg_idx, start, label: u32::from(label) });
        }
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defines::HeartRate;
    use crate::segment::Segment;
    use ndarray::Array2;
    use rand::SeedableRng;

    #[test]
    fn regular_60_bpm_beats_label_normal() {
        let len = 10_000;
        let beats: Vec<i64> = (0..40).flat_map(|k| [k * 250, 1]).collect();
        let bl = Array2::from_shape_vec((40, 2), beats).unwrap();
        let seg = Segment::from_arrays("s00", Array2::zeros((len, 1)), bl.view(), Array2::<i64>::zeros((0, 2)).view())
            .unwrap();
        let rec = PatientRecord::new(1, vec![seg]);
        let planner = HeartRatePlanner::new(1000, 1000, 250, 8);
        let mut rng = StdRng::seed_from_u64(4);
        let plan = planner.plan(&rec, &mut rng).unwrap();
        assert_eq!(plan.len(), 8);
        for w in plan {
            assert!(w.start + 1000 <= len);
            assert_eq!(w.label, u32::from(HeartRate::Normal));
        }
    }

    #[test]
    fn short_segments_are_skipped() {
        let seg = Segment::from_arrays(
            "s00",
            Array2::zeros((100, 1)),
            Array2::<i64>::zeros((0, 2)).view(),
            Array2::<i64>::zeros((0, 2)).view(),
        )
        .unwrap();
        let rec = PatientRecord::new(1, vec![seg]);
        let planner = HeartRatePlanner::new(100, 100, 250, 5);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(planner.plan(&rec, &mut rng).unwrap().is_empty());
    }
}
