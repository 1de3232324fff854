//! Patient records and their annotated segments.
//!
//! A [`PatientRecord`] is the storage-agnostic view of one patient that the
//! samplers consume: an ordered set of [`Segment`]s, each exposing a
//! range-readable signal plus its beat and rhythm annotation tables.
//!
//! Annotation tables arrive as `[N, 2]` integer arrays of
//! `(sample_index, code)` rows. They are decoded and validated once, when the
//! segment is built, so that corrupt upstream data is reported as
//! [`DatasetError::MalformedAnnotation`] instead of being silently mis-windowed.
//!
//! # Rhythm table layout
//!
//! After dropping noise-coded rows, rows pair up: row `2k` opens an interval
//! carrying its code and row `2k + 1` closes it, giving the half-open range
//! `[rows[2k].index, rows[2k + 1].index)`.

use ndarray::{s, Array2, ArrayView2};
use std::sync::Arc;

use crate::defines::{IcentiaBeat, IcentiaRhythm};
use crate::error::DatasetError;
use crate::store::NpySignal;

/// Dataset-wide patient identifier.
pub type PatientId = u32;

// ---------------------------------------------------------------------------
// Annotation rows
// ---------------------------------------------------------------------------

/// A single beat marker: the sample index at which a beat ends, and its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatMarker {
    /// Sample index within the segment.
    pub index: usize,
    /// Beat morphology code.
    pub code: IcentiaBeat,
}

/// A raw rhythm table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhythmMarker {
    /// Sample index within the segment.
    pub index: usize,
    /// Rhythm code.
    pub code: IcentiaRhythm,
}

/// A half-open rhythm interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhythmInterval {
    /// First sample of the interval.
    pub start: usize,
    /// One past the last sample of the interval.
    pub end: usize,
    /// Rhythm carried by the interval.
    pub code: IcentiaRhythm,
}

impl RhythmInterval {
    /// Interval length in samples.
    pub fn duration(&self) -> usize {
        self.end - self.start
    }
}

// ---------------------------------------------------------------------------
// Signal storage
// ---------------------------------------------------------------------------

/// Backing storage for a segment's signal.
///
/// Both variants are cheap to clone; file handles are shared and closed when
/// the last clone is dropped.
#[derive(Debug, Clone)]
pub enum SignalData {
    /// Fully resident samples, shape `[T, C]`.
    Memory(Arc<Array2<f32>>),
    /// An `.npy` file read window by window.
    Npy(Arc<NpySignal>),
}

impl SignalData {
    fn len(&self) -> usize {
        match self {
            SignalData::Memory(a) => a.nrows(),
            SignalData::Npy(n) => n.len(),
        }
    }

    fn num_channels(&self) -> usize {
        match self {
            SignalData::Memory(a) => a.ncols(),
            SignalData::Npy(n) => n.num_channels(),
        }
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One contiguous recorded stretch of a patient's signal with its annotations.
#[derive(Debug, Clone)]
pub struct Segment {
    key: String,
    signal: SignalData,
    beats: Arc<[BeatMarker]>,
    beat_indices: Arc<[usize]>,
    rhythms: Arc<[RhythmMarker]>,
    intervals: Arc<[RhythmInterval]>,
}

impl Segment {
    /// Build a segment from already-decoded parts, validating the annotation
    /// invariants.
    ///
    /// # Errors
    ///
    /// [`DatasetError::MalformedAnnotation`] if beat indices decrease, the
    /// non-noise rhythm rows do not pair up, or an interval ends before it starts.
    pub fn from_parts(
        key: impl Into<String>,
        signal: SignalData,
        beats: Vec<BeatMarker>,
        rhythms: Vec<RhythmMarker>,
    ) -> Result<Self, DatasetError> {
        let key = key.into();
        if let Some(w) = beats.windows(2).find(|w| w[1].index < w[0].index) {
            return Err(DatasetError::malformed(
                &key,
                format!("beat indices decrease ({} after {})", w[1].index, w[0].index),
            ));
        }
        let intervals = pair_rhythm_intervals(&key, &rhythms)?;
        let beat_indices: Arc<[usize]> = beats.iter().map(|b| b.index).collect();

        Ok(Segment {
            key,
            signal,
            beats: beats.into(),
            beat_indices,
            rhythms: rhythms.into(),
            intervals: intervals.into(),
        })
    }

    /// Build an in-memory segment from a `[T, C]` signal and raw `[N, 2]`
    /// integer label tables.
    ///
    /// # Errors
    ///
    /// [`DatasetError::MalformedAnnotation`] for unknown codes, negative
    /// indices, wrong column counts, or any invariant checked by
    /// [`Segment::from_parts`].
    pub fn from_arrays(
        key: impl Into<String>,
        signal: Array2<f32>,
        beat_labels: ArrayView2<'_, i64>,
        rhythm_labels: ArrayView2<'_, i64>,
    ) -> Result<Self, DatasetError> {
        let key = key.into();
        let beats = parse_beat_table(&key, beat_labels)?;
        let rhythms = parse_rhythm_table(&key, rhythm_labels)?;
        Segment::from_parts(key, SignalData::Memory(Arc::new(signal)), beats, rhythms)
    }

    /// Segment key, unique within its patient.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of samples in the signal.
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    /// Returns `true` when the signal holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of signal channels.
    pub fn num_channels(&self) -> usize {
        self.signal.num_channels()
    }

    /// Read samples `[start, end)` as a `[end - start, C]` array.
    ///
    /// # Errors
    ///
    /// [`DatasetError::WindowOutOfBounds`] if the range is empty or leaves the
    /// segment; I/O errors from file-backed signals.
    pub fn read_signal(&self, start: usize, end: usize) -> Result<Array2<f32>, DatasetError> {
        let len = self.len();
        if start >= end || end > len {
            return Err(DatasetError::WindowOutOfBounds { start, end, len });
        }
        match &self.signal {
            SignalData::Memory(a) => Ok(a.slice(s![start..end, ..]).to_owned()),
            SignalData::Npy(n) => n.read_range(start, end),
        }
    }

    /// Decoded beat markers in index order.
    pub fn beat_labels(&self) -> &[BeatMarker] {
        &self.beats
    }

    /// Beat marker sample indices in order.
    pub fn beat_indices(&self) -> &[usize] {
        &self.beat_indices
    }

    /// Raw rhythm rows, noise rows included.
    pub fn rhythm_labels(&self) -> &[RhythmMarker] {
        &self.rhythms
    }

    /// Rhythm intervals paired from the non-noise rows.
    pub fn rhythm_intervals(&self) -> &[RhythmInterval] {
        &self.intervals
    }

    /// Whether any rhythm row carries a high-priority (AFIB/AFL) code.
    pub fn has_high_priority_rhythm(&self) -> bool {
        self.rhythms.iter().any(|r| r.code.is_high_priority())
    }
}

// ---------------------------------------------------------------------------
// Table decoding
// ---------------------------------------------------------------------------

fn check_table_shape(key: &str, table: &ArrayView2<'_, i64>, name: &str) -> Result<(), DatasetError> {
    if table.nrows() > 0 && table.ncols() != 2 {
        return Err(DatasetError::malformed(
            key,
            format!("{name} table must have 2 columns, got {}", table.ncols()),
        ));
    }
    Ok(())
}

fn decode_index(key: &str, value: i64) -> Result<usize, DatasetError> {
    usize::try_from(value)
        .map_err(|_| DatasetError::malformed(key, format!("negative sample index {value}")))
}

/// Decode a `[N, 2]` beat table into [`BeatMarker`]s.
pub fn parse_beat_table(
    key: &str,
    table: ArrayView2<'_, i64>,
) -> Result<Vec<BeatMarker>, DatasetError> {
    check_table_shape(key, &table, "beat")?;
    table
        .outer_iter()
        .map(|row| {
            let index = decode_index(key, row[0])?;
            let code = IcentiaBeat::from_code(row[1])
                .ok_or_else(|| DatasetError::malformed(key, format!("unknown beat code {}", row[1])))?;
            Ok(BeatMarker { index, code })
        })
        .collect()
}

/// Decode a `[N, 2]` rhythm table into [`RhythmMarker`]s.
pub fn parse_rhythm_table(
    key: &str,
    table: ArrayView2<'_, i64>,
) -> Result<Vec<RhythmMarker>, DatasetError> {
    check_table_shape(key, &table, "rhythm")?;
    table
        .outer_iter()
        .map(|row| {
            let index = decode_index(key, row[0])?;
            let code = IcentiaRhythm::from_code(row[1]).ok_or_else(|| {
                DatasetError::malformed(key, format!("unknown rhythm code {}", row[1]))
            })?;
            Ok(RhythmMarker { index, code })
        })
        .collect()
}

/// Drop noise rows and pair the remainder into intervals.
fn pair_rhythm_intervals(
    key: &str,
    rhythms: &[RhythmMarker],
) -> Result<Vec<RhythmInterval>, DatasetError> {
    let marks: Vec<&RhythmMarker> =
        rhythms.iter().filter(|r| r.code != IcentiaRhythm::Noise).collect();
    if marks.len() % 2 != 0 {
        return Err(DatasetError::malformed(
            key,
            format!("odd number of non-noise rhythm rows ({})", marks.len()),
        ));
    }
    marks
        .chunks_exact(2)
        .map(|pair| {
            let (open, close) = (pair[0], pair[1]);
            if close.index < open.index {
                return Err(DatasetError::malformed(
                    key,
                    format!("rhythm interval ends at {} before it starts at {}", close.index, open.index),
                ));
            }
            Ok(RhythmInterval { start: open.index, end: close.index, code: open.code })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PatientRecord
// ---------------------------------------------------------------------------

/// All segments of one patient, ordered by segment key.
///
/// Dropping the record releases every store resource it holds.
#[derive(Debug, Clone)]
pub struct PatientRecord {
    patient_id: PatientId,
    segments: Vec<Segment>,
}

impl PatientRecord {
    /// Build a record; segments are sorted by key.
    pub fn new(patient_id: PatientId, segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut segments: Vec<Segment> = segments.into_iter().collect();
        segments.sort_by(|a, b| a.key.cmp(&b.key));
        PatientRecord { patient_id, segments }
    }

    /// Patient identifier.
    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` when the patient has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in key order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segment keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(Segment::key)
    }

    /// Look up a segment by key.
    pub fn get(&self, key: &str) -> Option<&Segment> {
        self.segments
            .binary_search_by(|s| s.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.segments[i])
    }

    /// Whether any segment carries a high-priority rhythm code.
    pub fn has_high_priority_rhythm(&self) -> bool {
        self.segments.iter().any(Segment::has_high_priority_rhythm)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
