//! Integration tests for [`ecg_sampler::store::NpyStore`].
//!
//! Every test writes a small store into a [`tempfile::TempDir`] with
//! `ndarray-npy` and reads it back through the [`SegmentStore`] trait.

use ndarray::{array, Array1, Array2};
use ndarray_npy::WriteNpyExt;
use std::fs::File;
use std::path::Path;
use tempfile::TempDir;

use ecg_sampler::defines::{IcentiaBeat, IcentiaRhythm};
use ecg_sampler::error::DatasetError;
use ecg_sampler::store::{patient_key, NpyStore, SegmentStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write<A: WriteNpyExt>(path: &Path, array: &A) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    array.write_npy(File::create(path).unwrap()).unwrap();
}

fn segment_dir(root: &Path, patient: u32, key: &str) -> std::path::PathBuf {
    root.join(patient_key(patient)).join(key)
}

fn ramp(len: usize, channels: usize) -> Array2<f32> {
    Array2::from_shape_fn((len, channels), |(t, c)| (t * 10 + c) as f32)
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

#[test]
fn open_reads_segments_in_key_order() {
    let tmp = TempDir::new().unwrap();
    for key in ["s01", "s00"] {
        let dir = segment_dir(tmp.path(), 7, key);
        write(&dir.join("data.npy"), &ramp(100, 1));
        write(&dir.join("blabels.npy"), &array![[10_i32, 1], [20, 2]]);
        write(&dir.join("rlabels.npy"), &array![[0_i64, 1], [50, 4], [50, 2], [100, 4]]);
    }

    let store = NpyStore::new(tmp.path()).unwrap();
    let record = store.open(7).expect("patient 7 exists");
    assert_eq!(record.patient_id(), 7);
    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["s00", "s01"]);

    let seg = record.get("s00").unwrap();
    assert_eq!(seg.len(), 100);
    assert_eq!(seg.num_channels(), 1);
    assert_eq!(seg.beat_indices(), &[10, 20]);
    assert_eq!(seg.beat_labels()[1].code, IcentiaBeat::Pac);
    assert_eq!(seg.rhythm_intervals().len(), 2);
    assert_eq!(seg.rhythm_intervals()[1].code, IcentiaRhythm::Afib);
    assert!(record.has_high_priority_rhythm());
}

#[test]
fn missing_patient_is_patient_not_found() {
    let tmp = TempDir::new().unwrap();
    let store = NpyStore::new(tmp.path()).unwrap();
    match store.open(3) {
        Err(DatasetError::PatientNotFound { patient_id, path }) => {
            assert_eq!(patient_id, 3);
            assert!(path.ends_with("p00003"), "unexpected path {}", path.display());
        }
        other => panic!("expected PatientNotFound, got {other:?}"),
    }
}

#[test]
fn label_files_are_optional() {
    let tmp = TempDir::new().unwrap();
    write(&segment_dir(tmp.path(), 0, "s00").join("data.npy"), &ramp(10, 1));
    let record = NpyStore::new(tmp.path()).unwrap().open(0).unwrap();
    let seg = &record.segments()[0];
    assert!(seg.beat_labels().is_empty());
    assert!(seg.rhythm_intervals().is_empty());
}

#[test]
fn available_patients_lists_patient_dirs() {
    let tmp = TempDir::new().unwrap();
    for id in [12, 3, 40] {
        write(&segment_dir(tmp.path(), id, "s00").join("data.npy"), &ramp(4, 1));
    }
    std::fs::create_dir_all(tmp.path().join("not-a-patient")).unwrap();
    let store = NpyStore::new(tmp.path()).unwrap();
    assert_eq!(store.available_patients().unwrap(), vec![3, 12, 40]);
}

// ---------------------------------------------------------------------------
// Range reads
// ---------------------------------------------------------------------------

#[test]
fn range_read_matches_written_samples() {
    let tmp = TempDir::new().unwrap();
    let data = ramp(500, 2);
    write(&segment_dir(tmp.path(), 1, "s00").join("data.npy"), &data);

    let record = NpyStore::new(tmp.path()).unwrap().open(1).unwrap();
    let seg = &record.segments()[0];
    assert_eq!(seg.num_channels(), 2);
    let window = seg.read_signal(123, 223).unwrap();
    assert_eq!(window, data.slice(ndarray::s![123..223, ..]).to_owned());
}

#[test]
fn one_dimensional_signal_is_single_channel() {
    let tmp = TempDir::new().unwrap();
    let data: Array1<f32> = (0..64).map(|v| v as f32).collect();
    write(&segment_dir(tmp.path(), 2, "s00").join("data.npy"), &data);

    let record = NpyStore::new(tmp.path()).unwrap().open(2).unwrap();
    let window = record.segments()[0].read_signal(60, 64).unwrap();
    assert_eq!(window.shape(), &[4, 1]);
    assert_eq!(window.column(0).to_vec(), vec![60.0, 61.0, 62.0, 63.0]);
}

#[test]
fn out_of_range_read_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write(&segment_dir(tmp.path(), 1, "s00").join("data.npy"), &ramp(50, 1));
    let record = NpyStore::new(tmp.path()).unwrap().open(1).unwrap();
    assert!(matches!(
        record.segments()[0].read_signal(40, 51),
        Err(DatasetError::WindowOutOfBounds { start: 40, end: 51, len: 50 })
    ));
}

// ---------------------------------------------------------------------------
// Format and annotation validation
// ---------------------------------------------------------------------------

#[test]
fn float64_signal_is_invalid_format() {
    let tmp = TempDir::new().unwrap();
    write(&segment_dir(tmp.path(), 1, "s00").join("data.npy"), &Array2::<f64>::zeros((8, 1)));
    let err = NpyStore::new(tmp.path()).unwrap().open(1).unwrap_err();
    assert!(matches!(err, DatasetError::InvalidFormat { .. }), "got {err:?}");
}

#[test]
fn odd_rhythm_table_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let dir = segment_dir(tmp.path(), 1, "s00");
    write(&dir.join("data.npy"), &ramp(100, 1));
    write(&dir.join("rlabels.npy"), &array![[0_i64, 1], [50, 4], [60, 2]]);
    let err = NpyStore::new(tmp.path()).unwrap().open(1).unwrap_err();
    assert!(matches!(err, DatasetError::MalformedAnnotation { .. }), "got {err:?}");
}

#[test]
fn three_column_beat_table_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let dir = segment_dir(tmp.path(), 1, "s00");
    write(&dir.join("data.npy"), &ramp(100, 1));
    write(&dir.join("blabels.npy"), &array![[0_i64, 1, 0]]);
    let err = NpyStore::new(tmp.path()).unwrap().open(1).unwrap_err();
    assert!(matches!(err, DatasetError::MalformedAnnotation { .. }), "got {err:?}");
}

#[test]
fn missing_root_is_directory_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = NpyStore::new(tmp.path().join("absent")).unwrap_err();
    assert!(matches!(err, DatasetError::DirectoryNotFound { .. }));
}
