//! Unlabelled windows at random positions.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;

use super::{PlannedWindow, SampleStream, WindowPlanner};
use crate::error::DatasetError;
use crate::patient::PatientItem;
use crate::segment::PatientRecord;

/// Draws `samples` windows per patient from random segments. Segments not
/// longer than `frame_size` are skipped for that draw.
#[derive(Debug, Clone)]
pub struct SignalPlanner {
    frame_size: usize,
    samples: usize,
}

impl SignalPlanner {
    /// Planner drawing `samples` windows of `frame_size` per patient.
    pub fn new(frame_size: usize, samples: usize) -> Self {
        SignalPlanner { frame_size, samples }
    }
}

impl WindowPlanner for SignalPlanner {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn plan(&self, record: &PatientRecord, rng: &mut StdRng) -> Result<Vec<PlannedWindow>, DatasetError> {
        let segments = record.segments();
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        Ok((0..self.samples)
            .filter_map(|_| {
                let segment = rng.gen_range(0..segments.len());
                let len = segments[segment].len();
                (len > self.frame_size).then(|| PlannedWindow {
                    segment,
                    start: rng.gen_range(0..len - self.frame_size),
                    label: 0,
                })
            })
            .collect())
    }
}

/// Stream of bare signal windows.
pub struct SignalSampler<P>(SampleStream<P, SignalPlanner>);

impl<P: Iterator<Item = PatientItem>> SignalSampler<P> {
    /// Draw `samples` windows of `frame_size` per patient.
    pub fn new(patients: P, frame_size: usize, samples: usize, seed: u64) -> Self {
        SignalSampler(SampleStream::new(patients, SignalPlanner::new(frame_size, samples), seed))
    }
}

impl<P: Iterator<Item = PatientItem>> Iterator for SignalSampler<P> {
    type Item = Result<Array2<f32>, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|r| r.map(|s| s.signal))
    }
}
