//! Task sample generators.
//!
//! Every generator is a [`SampleStream`]: it pulls one patient at a time from
//! a patient stream, asks a [`WindowPlanner`] which windows to draw from that
//! patient, and then reads the windows lazily as the consumer pulls. Only the
//! current patient's record is held; it is dropped as soon as its plan is
//! drained.
//!
//! | planner               | label space          | window width      |
//! |-----------------------|----------------------|-------------------|
//! | [`RhythmPlanner`]     | [`HeartRhythm`]      | `frame_size`      |
//! | [`BeatPlanner`]       | [`HeartBeat`]        | `3 * frame_size`  |
//! | [`HeartRatePlanner`]  | [`HeartRate`]        | `frame_size`      |
//! | [`SignalPlanner`]     | none                 | `frame_size`      |
//!
//! Patients lacking qualifying data for a class contribute fewer samples;
//! that is never an error. A stream built on a repeating patient stream whose
//! patients never qualify will keep pulling patients.
//!
//! [`HeartRhythm`]: crate::defines::HeartRhythm
//! [`HeartBeat`]: crate::defines::HeartBeat
//! [`HeartRate`]: crate::defines::HeartRate

mod beat;
mod heart_rate;
mod rhythm;
mod signal;

pub use beat::{BeatPlanner, BEAT_PADDING, NORMAL_FRACTION_THRESHOLD};
pub use heart_rate::HeartRatePlanner;
pub use rhythm::RhythmPlanner;
pub use signal::{SignalPlanner, SignalSampler};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::error::DatasetError;
use crate::patient::PatientItem;
use crate::segment::{PatientId, PatientRecord};

// ---------------------------------------------------------------------------
// EcgSample
// ---------------------------------------------------------------------------

/// One signal window paired with its task label.
#[derive(Debug, Clone, PartialEq)]
pub struct EcgSample {
    /// Patient the window was drawn from.
    pub patient_id: PatientId,
    /// Key of the source segment.
    pub segment: String,
    /// First sample of the window in its segment (the centre window for beats).
    pub start: usize,
    /// Signal, shape `[width, channels]`.
    pub signal: Array2<f32>,
    /// Task label index.
    pub label: u32,
}

/// Item yielded by every sample stream.
pub type SampleItem = Result<EcgSample, DatasetError>;

// ---------------------------------------------------------------------------
// WindowPlanner
// ---------------------------------------------------------------------------

/// A window chosen for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWindow {
    /// Index into [`PatientRecord::segments`].
    pub segment: usize,
    /// First sample of the window.
    pub start: usize,
    /// Task label index.
    pub label: u32,
}

/// Per-task policy: which windows to draw from a patient and how to read them.
pub trait WindowPlanner {
    /// Base window length in samples.
    fn frame_size(&self) -> usize;

    /// Width of the emitted windows in samples.
    fn output_width(&self) -> usize {
        self.frame_size()
    }

    /// Choose the windows to draw from `record`, in emission order.
    fn plan(&self, record: &PatientRecord, rng: &mut StdRng) -> Result<Vec<PlannedWindow>, DatasetError>;

    /// Read a planned window. `Ok(None)` skips it.
    fn extract(
        &self,
        record: &PatientRecord,
        window: &PlannedWindow,
    ) -> Result<Option<Array2<f32>>, DatasetError> {
        let segment = &record.segments()[window.segment];
        segment
            .read_signal(window.start, window.start + self.frame_size())
            .map(Some)
    }
}

// ---------------------------------------------------------------------------
// SampleStream
// ---------------------------------------------------------------------------

struct PatientPlan {
    patient_id: PatientId,
    record: PatientRecord,
    queue: VecDeque<PlannedWindow>,
}

/// Pull-based `(window, label)` stream over a patient stream.
pub struct SampleStream<P, W> {
    patients: P,
    planner: W,
    rng: StdRng,
    current: Option<PatientPlan>,
    skipped: usize,
}

/// Rhythm-task sample stream.
pub type RhythmSampler<P> = SampleStream<P, RhythmPlanner>;
/// Beat-task sample stream.
pub type BeatSampler<P> = SampleStream<P, BeatPlanner>;
/// Heart-rate-task sample stream.
pub type HeartRateSampler<P> = SampleStream<P, HeartRatePlanner>;

impl<P, W> SampleStream<P, W>
where
    P: Iterator<Item = PatientItem>,
    W: WindowPlanner,
{
    /// Wrap `patients` with `planner`, seeding the sampling RNG with `seed`.
    pub fn new(patients: P, planner: W, seed: u64) -> Self {
        SampleStream { patients, planner, rng: StdRng::seed_from_u64(seed), current: None, skipped: 0 }
    }

    /// The planner driving this stream.
    pub fn planner(&self) -> &W {
        &self.planner
    }

    /// Width of the emitted windows.
    pub fn output_width(&self) -> usize {
        self.planner.output_width()
    }

    /// Planned windows dropped at extraction so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<P, W> Iterator for SampleStream<P, W>
where
    P: Iterator<Item = PatientItem>,
    W: WindowPlanner,
{
    type Item = SampleItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(plan) = self.current.as_mut() {
                if let Some(window) = plan.queue.pop_front() {
                    match self.planner.extract(&plan.record, &window) {
                        Ok(Some(signal)) => {
                            let segment = plan.record.segments()[window.segment].key().to_string();
                            return Some(Ok(EcgSample {
                                patient_id: plan.patient_id,
                                segment,
                                start: window.start,
                                signal,
                                label: window.label,
                            }));
                        }
                        Ok(None) => {
                            self.skipped += 1;
                            continue;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                self.current = None;
            }

            let (patient_id, record) = match self.patients.next()? {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            let windows = match self.planner.plan(&record, &mut self.rng) {
                Ok(w) => w,
                Err(e) => return Some(Err(e)),
            };
            if windows.is_empty() {
                debug!(patient_id, "No qualifying windows for patient");
            } else {
                trace!(patient_id, windows = windows.len(), "Planned patient windows");
            }
            self.current = Some(PatientPlan { patient_id, record, queue: windows.into() });
        }
    }
}

// ---------------------------------------------------------------------------
// TaskSampler
// ---------------------------------------------------------------------------

/// A sample stream for whichever task was selected at run time.
pub enum TaskSampler<P> {
    /// Rhythm task.
    Rhythm(RhythmSampler<P>),
    /// Beat task.
    Beat(BeatSampler<P>),
    /// Heart-rate task.
    HeartRate(HeartRateSampler<P>),
}

impl<P: Iterator<Item = PatientItem>> TaskSampler<P> {
    /// Width of the emitted windows.
    pub fn output_width(&self) -> usize {
        match self {
            TaskSampler::Rhythm(s) => s.output_width(),
            TaskSampler::Beat(s) => s.output_width(),
            TaskSampler::HeartRate(s) => s.output_width(),
        }
    }
}

impl<P: Iterator<Item = PatientItem>> Iterator for TaskSampler<P> {
    type Item = SampleItem;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            TaskSampler::Rhythm(s) => s.next(),
            TaskSampler::Beat(s) => s.next(),
            TaskSampler::HeartRate(s) => s.next(),
        }
    }
}
