//! Patient stream generators.
//!
//! Both streams yield `(patient_id, record)` pairs opened from a
//! [`SegmentStore`]. Each record is opened when it is yielded and released
//! when the consumer drops it, so a consumer that stops pulling early holds
//! nothing beyond the record it last received.
//!
//! - [`UniformPatientStream`] walks the id set in passes, optionally
//!   shuffling each pass and optionally repeating forever.
//! - [`RandomPatientStream`] draws ids i.i.d. with replacement from a weight
//!   vector (uniform when none is given). It never ends.
//!
//! A missing patient is yielded as `Err(DatasetError::PatientNotFound)` for
//! that draw; the stream itself keeps going.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, DatasetError};
use crate::segment::{PatientId, PatientRecord};
use crate::store::SegmentStore;

/// Item yielded by every patient stream.
pub type PatientItem = Result<(PatientId, PatientRecord), DatasetError>;

fn open_patient(store: &dyn SegmentStore, patient_id: PatientId) -> PatientItem {
    store.open(patient_id).map(|record| (patient_id, record))
}

// ---------------------------------------------------------------------------
// UniformPatientStream
// ---------------------------------------------------------------------------

/// Iteration state of a [`UniformPatientStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// More patients remain (always the case in repeat mode with a non-empty id set).
    Iterating,
    /// The single pass is complete; every further `next()` returns `None`.
    Exhausted,
}

/// Pass-based stream over a fixed id set.
pub struct UniformPatientStream {
    store: Arc<dyn SegmentStore>,
    ids: Vec<PatientId>,
    cursor: usize,
    shuffle: bool,
    repeat: bool,
    rng: StdRng,
    state: StreamState,
    passes: usize,
}

impl UniformPatientStream {
    /// Create a stream over `patient_ids`.
    ///
    /// With `repeat = false` the stream ends after one traversal. With
    /// `repeat = true` it restarts (re-shuffling if `shuffle`) at every
    /// exhaustion; an empty id set still ends immediately.
    pub fn new(
        store: Arc<dyn SegmentStore>,
        patient_ids: Vec<PatientId>,
        shuffle: bool,
        repeat: bool,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ids = patient_ids;
        if shuffle {
            ids.shuffle(&mut rng);
        }
        let state = if ids.is_empty() { StreamState::Exhausted } else { StreamState::Iterating };
        UniformPatientStream { store, ids, cursor: 0, shuffle, repeat, rng, state, passes: 0 }
    }

    /// Current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether another `next()` will yield an item.
    pub fn has_next(&self) -> bool {
        self.state == StreamState::Iterating
    }

    /// Number of completed passes over the id set.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Ids in the order of the current pass.
    pub fn current_order(&self) -> &[PatientId] {
        &self.ids
    }

    fn advance_pass(&mut self) {
        self.passes += 1;
        if self.repeat {
            if self.shuffle {
                self.ids.shuffle(&mut self.rng);
            }
            self.cursor = 0;
            debug!(pass = self.passes, "Patient stream restarting");
        } else {
            self.state = StreamState::Exhausted;
        }
    }
}

impl Iterator for UniformPatientStream {
    type Item = PatientItem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == StreamState::Exhausted {
            return None;
        }
        let patient_id = self.ids[self.cursor];
        self.cursor += 1;
        if self.cursor >= self.ids.len() {
            self.advance_pass();
        }
        Some(open_patient(self.store.as_ref(), patient_id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match (self.state, self.repeat) {
            (StreamState::Exhausted, _) => (0, Some(0)),
            (StreamState::Iterating, true) => (usize::MAX, None),
            (StreamState::Iterating, false) => {
                let left = self.ids.len() - self.cursor;
                (left, Some(left))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RandomPatientStream
// ---------------------------------------------------------------------------

/// Unbounded i.i.d. draws of patient ids.
pub struct RandomPatientStream {
    store: Arc<dyn SegmentStore>,
    ids: Vec<PatientId>,
    weights: Option<WeightedIndex<f64>>,
    rng: StdRng,
}

impl RandomPatientStream {
    /// Create a stream drawing from `patient_ids` according to `weights`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if the id set is empty, the weight
    /// vector length differs from the id count, or the weights are negative,
    /// non-finite, or all zero.
    pub fn new(
        store: Arc<dyn SegmentStore>,
        patient_ids: Vec<PatientId>,
        weights: Option<&[f64]>,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if patient_ids.is_empty() {
            return Err(ConfigError::invalid_value("patient_ids", "cannot draw from an empty patient set"));
        }
        let weights = match weights {
            None => None,
            Some(w) if w.len() != patient_ids.len() => {
                return Err(ConfigError::invalid_value(
                    "weights",
                    format!("{} weights for {} patients", w.len(), patient_ids.len()),
                ))
            }
            Some(w) => Some(
                WeightedIndex::new(w.iter().copied())
                    .map_err(|e| ConfigError::invalid_value("weights", e.to_string()))?,
            ),
        };
        Ok(RandomPatientStream { store, ids: patient_ids, weights, rng: StdRng::seed_from_u64(seed) })
    }

    fn draw(&mut self) -> PatientId {
        let idx = match &self.weights {
            Some(w) => w.sample(&mut self.rng),
            None => self.rng.gen_range(0..self.ids.len()),
        };
        self.ids[idx]
    }
}

impl Iterator for RandomPatientStream {
    type Item = PatientItem;

    fn next(&mut self) -> Option<Self::Item> {
        let patient_id = self.draw();
        Some(open_patient(self.store.as_ref(), patient_id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
