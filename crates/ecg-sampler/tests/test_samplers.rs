//! Integration tests for the task sample generators.
//!
//! Patients are synthetic and held in a [`MemoryStore`]. Signals carry their
//! own sample index as value (`signal[t] == t`) so a window's position can be
//! read back from its first sample.

use ndarray::Array2;
use std::collections::HashSet;
use std::sync::Arc;

use ecg_sampler::config::{DatasetConfig, SamplesPerPatient};
use ecg_sampler::dataset::IcentiaDataset;
use ecg_sampler::defines::{HeartBeat, HeartRhythm, HeartTask};
use ecg_sampler::error::DatasetError;
use ecg_sampler::patient::{RandomPatientStream, UniformPatientStream};
use ecg_sampler::sampler::{BeatPlanner, RhythmPlanner, SampleStream, SignalSampler, TaskSampler};
use ecg_sampler::segment::{PatientId, PatientRecord, Segment};
use ecg_sampler::store::{MemoryStore, SegmentStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ramp(len: usize) -> Array2<f32> {
    Array2::from_shape_fn((len, 1), |(t, _)| t as f32)
}

fn table(rows: &[(i64, i64)]) -> Array2<i64> {
    let flat: Vec<i64> = rows.iter().flat_map(|&(i, c)| [i, c]).collect();
    Array2::from_shape_vec((rows.len(), 2), flat).unwrap()
}

fn segment(key: &str, len: usize, beats: &[(i64, i64)], rhythms: &[(i64, i64)]) -> Segment {
    Segment::from_arrays(key, ramp(len), table(beats).view(), table(rhythms).view()).unwrap()
}

/// Beats every 250 samples (60 BPM at 250 Hz) with codes from `code_at`.
fn regular_beats(n: usize, code_at: impl Fn(usize) -> i64) -> Vec<(i64, i64)> {
    (1..=n).map(|k| ((k * 250) as i64, code_at(k))).collect()
}

fn store_of(records: Vec<PatientRecord>) -> Arc<dyn SegmentStore> {
    let mut store = MemoryStore::new();
    for r in records {
        store.insert(r);
    }
    Arc::new(store)
}

fn single_pass(store: &Arc<dyn SegmentStore>, ids: Vec<PatientId>) -> UniformPatientStream {
    UniformPatientStream::new(Arc::clone(store), ids, false, false, 0)
}

// ---------------------------------------------------------------------------
// Rhythm
// ---------------------------------------------------------------------------

/// One AFIB interval, N requested AFIB samples: exactly N windows, all inside
/// the interval, all labelled AFIB.
#[test]
fn rhythm_afib_only_patient_yields_requested_windows() {
    let seg = segment("s00", 5000, &[], &[(1000, 2), (3000, 4)]);
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    let planner = RhythmPlanner::new(500, vec![0, 25, 0]);
    let samples: Vec<_> = SampleStream::new(single_pass(&store, vec![0]), planner, 7)
        .collect::<Result<_, _>>()
        .expect("no store errors");

    assert_eq!(samples.len(), 25);
    for s in &samples {
        assert_eq!(s.label, u32::from(HeartRhythm::Afib));
        assert!(s.start >= 1000 && s.start + 500 <= 3000, "window at {} leaves the interval", s.start);
        assert_eq!(s.signal.shape(), &[500, 1]);
        assert_eq!(s.signal[[0, 0]], s.start as f32, "window content must match its start");
    }
}

/// A total is split evenly over the three rhythm classes; absent classes
/// contribute nothing.
#[test]
fn rhythm_total_is_split_across_classes() {
    let seg = segment("s00", 4000, &[], &[(0, 1), (2000, 4), (2000, 2), (4000, 4)]);
    let store = store_of(vec![PatientRecord::new(3, vec![seg])]);
    let cfg = DatasetConfig { frame_size: 250, ..DatasetConfig::default() };
    let ds = IcentiaDataset::new(Arc::clone(&store), cfg).unwrap();
    let samples: Vec<_> = ds
        .rhythm_data_generator(single_pass(&store, vec![3]), &SamplesPerPatient::Total(12), 1)
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(samples.len(), 8, "4 normal + 4 afib, aflut absent");
    let afib = samples.iter().filter(|s| s.label == u32::from(HeartRhythm::Afib)).count();
    assert_eq!(afib, 4);
    assert!(samples.iter().all(|s| s.patient_id == 3));
}

/// Per-patient output is shuffled: with many draws of two classes the labels
/// are not emitted as two contiguous runs.
#[test]
fn rhythm_patient_output_is_shuffled() {
    let seg = segment("s00", 4000, &[], &[(0, 1), (2000, 4), (2000, 2), (4000, 4)]);
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    let planner = RhythmPlanner::new(100, vec![50, 50, 0]);
    let labels: Vec<u32> = SampleStream::new(single_pass(&store, vec![0]), planner, 11)
        .map(|r| r.unwrap().label)
        .collect();
    let switches = labels.windows(2).filter(|w| w[0] != w[1]).count();
    assert!(switches > 1, "labels came out in class order: {switches} switches");
}

#[test]
fn rhythm_windows_span_segments() {
    let a = segment("s00", 1000, &[], &[(0, 2), (1000, 4)]);
    let b = segment("s01", 1000, &[], &[(0, 2), (1000, 4)]);
    let store = store_of(vec![PatientRecord::new(0, vec![a, b])]);
    let planner = RhythmPlanner::new(100, vec![0, 200, 0]);
    let segments: HashSet<String> = SampleStream::new(single_pass(&store, vec![0]), planner, 2)
        .map(|r| r.unwrap().segment)
        .collect();
    assert_eq!(segments.len(), 2, "equal-length intervals must both be drawn");
}

// ---------------------------------------------------------------------------
// Beat
// ---------------------------------------------------------------------------

fn beat_store(codes: impl Fn(usize) -> i64, n: usize) -> Arc<dyn SegmentStore> {
    let len = (n + 10) * 250;
    let seg = segment("s00", len, &regular_beats(n, codes), &[]);
    store_of(vec![PatientRecord::new(0, vec![seg])])
}

/// Alternating normal/PAC beats: no normal beat has two normal neighbours,
/// so no normal window may be produced; PAC windows are.
#[test]
fn beat_normal_with_ectopic_neighbour_is_never_selected() {
    let store = beat_store(|k| if k % 2 == 0 { 2 } else { 1 }, 200);
    let planner = BeatPlanner::new(100, 250, vec![50, 50, 50]);
    let samples: Vec<_> = SampleStream::new(single_pass(&store, vec![0]), planner, 3)
        .map(|r| r.unwrap())
        .collect();

    assert!(!samples.is_empty(), "PAC beats must be drawn");
    assert!(samples.iter().all(|s| s.label == u32::from(HeartBeat::Pac)));
}

/// Every PVC follows an undefined marker, so none may be produced; PACs with
/// defined neighbours still are.
#[test]
fn beat_ectopic_with_undefined_neighbour_is_never_selected() {
    let store = beat_store(
        |k| match k % 8 {
            3 => 0,
            4 => 4,
            6 => 2,
            _ => 1,
        },
        200,
    );
    let planner = BeatPlanner::new(100, 250, vec![0, 50, 50]);
    let samples: Vec<_> = SampleStream::new(single_pass(&store, vec![0]), planner, 4)
        .map(|r| r.unwrap())
        .collect();

    assert!(!samples.is_empty(), "PAC beats with defined neighbours must be drawn");
    assert!(
        samples.iter().all(|s| s.label != u32::from(HeartBeat::Pvc)),
        "a PVC next to an undefined marker was selected"
    );
}

/// Output is three stacked frames shifted by the mean RR interval.
#[test]
fn beat_window_stacks_rr_context() {
    let store = beat_store(|_| 1, 200);
    let planner = BeatPlanner::new(100, 250, vec![10, 0, 0]);
    let samples: Vec<_> = SampleStream::new(single_pass(&store, vec![0]), planner, 5)
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(samples.len(), 10);
    for s in &samples {
        assert_eq!(s.signal.shape(), &[300, 1]);
        assert_eq!(s.label, u32::from(HeartBeat::Normal));
        let start = s.start as f32;
        assert_eq!(s.signal[[0, 0]], start - 250.0, "first frame shifted back by RR");
        assert_eq!(s.signal[[100, 0]], start, "middle frame at the beat window");
        assert_eq!(s.signal[[200, 0]], start + 250.0, "last frame shifted forward by RR");
    }
}

#[test]
fn beat_segments_dominated_by_undefined_are_skipped() {
    // one normal beat in five
    let store = beat_store(|k| if k % 5 == 0 { 1 } else { 0 }, 200);
    let planner = BeatPlanner::new(100, 250, vec![10, 10, 10]);
    assert_eq!(SampleStream::new(single_pass(&store, vec![0]), planner, 5).count(), 0);
}

#[test]
fn beat_without_plausible_rr_is_skipped() {
    // 2000-sample gaps are far above the 2 s limit at 250 Hz
    let beats: Vec<(i64, i64)> = (1..=60).map(|k| (k * 2000, 1)).collect();
    let seg = segment("s00", 130_000, &beats, &[]);
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    let planner = BeatPlanner::new(100, 250, vec![5, 0, 0]);
    let mut stream = SampleStream::new(single_pass(&store, vec![0]), planner, 5);
    assert!(stream.next().is_none());
    assert_eq!(stream.skipped(), 5);
}

#[test]
fn beat_non_finite_samples_become_zero() {
    let len = 210 * 250;
    let mut signal = Array2::from_elem((len, 1), f32::NAN);
    signal[[0, 0]] = 1.0;
    let beats = table(&regular_beats(200, |_| 1));
    let seg = Segment::from_arrays("s00", signal, beats.view(), Array2::<i64>::zeros((0, 2)).view()).unwrap();
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    let planner = BeatPlanner::new(100, 250, vec![3, 0, 0]);
    for s in SampleStream::new(single_pass(&store, vec![0]), planner, 5) {
        assert!(s.unwrap().signal.iter().all(|v| *v == 0.0));
    }
}

// ---------------------------------------------------------------------------
// Heart rate and signal
// ---------------------------------------------------------------------------

#[test]
fn heart_rate_task_through_dataset() {
    let seg = segment("s00", 20_000, &regular_beats(70, |_| 1), &[]);
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    let cfg = DatasetConfig {
        task: HeartTask::Hrv,
        frame_size: 1000,
        samples_per_patient: SamplesPerPatient::Total(6),
        ..DatasetConfig::default()
    };
    let ds = IcentiaDataset::new(Arc::clone(&store), cfg).unwrap();
    let sampler = ds.task_data_generator(single_pass(&store, vec![0]), &SamplesPerPatient::Total(6), 0);
    assert!(matches!(sampler, TaskSampler::HeartRate(_)));
    assert_eq!(sampler.output_width(), 1000);
    let samples: Vec<_> = sampler.map(|r| r.unwrap()).collect();
    assert_eq!(samples.len(), 6);
    for s in samples {
        assert!(s.start + 1000 <= 20_000);
        assert_eq!(s.signal.nrows(), 1000);
    }
}

#[test]
fn signal_sampler_yields_plain_windows() {
    let store = store_of(vec![
        PatientRecord::new(0, vec![segment("s00", 800, &[], &[])]),
        PatientRecord::new(1, vec![segment("s00", 50, &[], &[])]),
    ]);
    let windows: Vec<_> = SignalSampler::new(single_pass(&store, vec![0, 1]), 100, 4, 0)
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(windows.len(), 4, "the 50-sample patient is too short for any window");
    assert!(windows.iter().all(|w| w.shape() == [100, 1]));
}

// ---------------------------------------------------------------------------
// Errors and patient streams
// ---------------------------------------------------------------------------

/// A missing patient surfaces as an error item; later patients still flow.
#[test]
fn missing_patient_is_reported_to_consumer() {
    let seg = segment("s00", 2000, &[], &[(0, 1), (2000, 4)]);
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    let planner = RhythmPlanner::new(100, vec![2, 0, 0]);
    let items: Vec<_> = SampleStream::new(single_pass(&store, vec![42, 0]), planner, 0).collect();

    assert_eq!(items.len(), 3);
    assert!(matches!(items[0], Err(DatasetError::PatientNotFound { patient_id: 42, .. })));
    assert!(items[1..].iter().all(|r| r.is_ok()));
}

#[test]
fn weighted_stream_feeds_sampler() {
    let afib = segment("s00", 2000, &[], &[(0, 2), (2000, 4)]);
    let normal = segment("s00", 2000, &[], &[(0, 1), (2000, 4)]);
    let store = store_of(vec![PatientRecord::new(0, vec![afib]), PatientRecord::new(1, vec![normal])]);
    let patients = RandomPatientStream::new(Arc::clone(&store), vec![0, 1], Some(&[1.0, 0.0]), 8).unwrap();
    let planner = RhythmPlanner::new(100, vec![1, 1, 1]);
    for s in SampleStream::new(patients, planner, 0).take(20) {
        let s = s.unwrap();
        assert_eq!(s.patient_id, 0);
        assert_eq!(s.label, u32::from(HeartRhythm::Afib));
    }
}

/// Every window of every task lies inside its segment.
#[test]
fn windows_never_leave_their_segment() {
    let beats = regular_beats(100, |k| [1, 1, 1, 2, 1, 4][k % 6]);
    let seg = segment("s00", 101 * 250, &beats, &[(0, 1), (10_000, 4), (10_000, 2), (25_250, 4)]);
    let len = seg.len();
    let store = store_of(vec![PatientRecord::new(0, vec![seg])]);
    for task in [HeartTask::Arrhythmia, HeartTask::Beat, HeartTask::Hrv] {
        let cfg = DatasetConfig { task, frame_size: 500, ..DatasetConfig::default() };
        let ds = IcentiaDataset::new(Arc::clone(&store), cfg).unwrap();
        let sampler = ds.task_data_generator(single_pass(&store, vec![0]), &SamplesPerPatient::Total(30), 9);
        let width = sampler.output_width();
        for s in sampler {
            let s = s.unwrap();
            assert_eq!(s.signal.nrows(), width);
            let first = s.signal[[0, 0]] as usize;
            let last = s.signal[[width - 1, 0]] as usize;
            assert!(first + 500 <= len, "{task}: first frame at {first} exceeds {len}");
            assert!(last < len, "{task}: last sample {last} outside segment of {len}");
            assert!(s.start + 500 <= len);
        }
    }
}
