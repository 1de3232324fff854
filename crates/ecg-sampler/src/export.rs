//! Collecting sample streams into arrays, and caching them as `.npy` files.
//!
//! A [`SampleSet`] stores `x` as `[N, width, channels]` float32 and `y` as
//! `[N]` uint32. On disk it is a directory holding `x.npy` and `y.npy`.

use ndarray::{s, Array1, Array3};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use crate::dataset::IcentiaDataset;
use crate::error::{DatasetError, SamplerError, SamplerResult};
use crate::sampler::SampleItem;
use crate::segment::PatientId;

/// File name of the signal tensor.
pub const X_FILE: &str = "x.npy";
/// File name of the label vector.
pub const Y_FILE: &str = "y.npy";

/// A materialised set of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    /// Signals, `[N, width, channels]`.
    pub x: Array3<f32>,
    /// Labels, `[N]`.
    pub y: Array1<u32>,
}

impl SampleSet {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Returns `true` if the set holds no samples.
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Sample count per label.
    pub fn label_histogram(&self) -> BTreeMap<u32, usize> {
        label_histogram(self.y.iter().copied())
    }

    /// Write `x.npy` and `y.npy` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), DatasetError> {
        std::fs::create_dir_all(dir).map_err(|e| DatasetError::io_error(dir, e))?;
        let x_path = dir.join(X_FILE);
        let y_path = dir.join(Y_FILE);
        let writer = |p: &Path| File::create(p).map(BufWriter::new).map_err(|e| DatasetError::io_error(p, e));
        self.x
            .write_npy(writer(&x_path)?)
            .map_err(|e| DatasetError::npy_read(&x_path, e.to_string()))?;
        self.y
            .write_npy(writer(&y_path)?)
            .map_err(|e| DatasetError::npy_read(&y_path, e.to_string()))?;
        Ok(())
    }

    /// Read `x.npy` and `y.npy` from `dir`.
    ///
    /// # Errors
    ///
    /// [`DatasetError::InvalidFormat`] if the sample counts disagree.
    pub fn load(dir: &Path) -> Result<Self, DatasetError> {
        let x_path = dir.join(X_FILE);
        let y_path = dir.join(Y_FILE);
        let reader = |p: &Path| File::open(p).map(BufReader::new).map_err(|e| DatasetError::io_error(p, e));
        let x = Array3::<f32>::read_npy(reader(&x_path)?)
            .map_err(|e| DatasetError::npy_read(&x_path, e.to_string()))?;
        let y = Array1::<u32>::read_npy(reader(&y_path)?)
            .map_err(|e| DatasetError::npy_read(&y_path, e.to_string()))?;
        if x.len_of(ndarray::Axis(0)) != y.len() {
            return Err(DatasetError::invalid_format(
                dir,
                format!("x holds {} samples but y holds {}", x.len_of(ndarray::Axis(0)), y.len()),
            ));
        }
        Ok(SampleSet { x, y })
    }

    /// Whether `dir` holds a saved set.
    pub fn exists(dir: &Path) -> bool {
        dir.join(X_FILE).is_file() && dir.join(Y_FILE).is_file()
    }
}

/// Count occurrences of each label.
pub fn label_histogram(labels: impl IntoIterator<Item = u32>) -> BTreeMap<u32, usize> {
    let mut hist = BTreeMap::new();
    for label in labels {
        *hist.entry(label).or_insert(0) += 1;
    }
    hist
}

/// Pull exactly `n` samples from `stream` into a [`SampleSet`].
///
/// # Errors
///
/// The first error the stream yields; [`SamplerError::StreamExhausted`] if it
/// ends early; [`DatasetError::InvalidFormat`] if window shapes differ.
pub fn collect_samples<I>(stream: I, n: usize) -> SamplerResult<SampleSet>
where
    I: Iterator<Item = SampleItem>,
{
    let mut x: Option<Array3<f32>> = None;
    let mut y = Array1::<u32>::zeros(n);
    let mut produced = 0;
    for item in stream.take(n) {
        let sample = item?;
        let (width, channels) = sample.signal.dim();
        let x = x.get_or_insert_with(|| Array3::zeros((n, width, channels)));
        if x.dim().1 != width || x.dim().2 != channels {
            return Err(DatasetError::invalid_format(
                format!("patient {}", sample.patient_id),
                format!("window shape [{width}, {channels}] differs from [{}, {}]", x.dim().1, x.dim().2),
            )
            .into());
        }
        x.slice_mut(s![produced, .., ..]).assign(&sample.signal);
        y[produced] = sample.label;
        produced += 1;
    }
    if produced < n {
        return Err(SamplerError::StreamExhausted { produced, requested: n });
    }
    Ok(SampleSet { x: x.unwrap_or_else(|| Array3::zeros((0, 0, 0))), y })
}

/// Load the validation set cached in `config.val_file`, or draw
/// `config.val_size` samples from the validation stream over
/// `val_patient_ids` and cache them there.
///
/// Without `val_size` the set is `val_patient_ids.len()` times the per-patient
/// validation sample count.
pub fn materialize_validation_set(
    dataset: &IcentiaDataset,
    val_patient_ids: Vec<PatientId>,
) -> SamplerResult<SampleSet> {
    let config = dataset.config();
    if let Some(dir) = config.val_file.as_deref() {
        if SampleSet::exists(dir) {
            info!("Loading validation set from {}", dir.display());
            return Ok(SampleSet::load(dir)?);
        }
    }
    if val_patient_ids.is_empty() {
        return Err(SamplerError::EmptyPatientSet("validation"));
    }
    let n = config.val_size.unwrap_or_else(|| {
        val_patient_ids.len() * config.val_samples_per_patient.total(config.task.num_target_classes())
    });
    info!(samples = n, patients = val_patient_ids.len(), "Collecting validation set");
    let set = collect_samples(dataset.val_samples(val_patient_ids), n)?;
    if let Some(dir) = config.val_file.as_deref() {
        set.save(dir)?;
        info!("Saved validation set to {}", dir.display());
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::EcgSample;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn sample(label: u32, width: usize) -> SampleItem {
        Ok(EcgSample {
            patient_id: 0,
            segment: "s00".into(),
            start: 0,
            signal: Array2::from_elem((width, 1), label as f32),
            label,
        })
    }

    #[test]
    fn collect_stacks_windows() {
        let set = collect_samples(vec![sample(0, 4), sample(2, 4), sample(1, 4)].into_iter(), 3).unwrap();
        assert_eq!(set.x.dim(), (3, 4, 1));
        assert_eq!(set.y.to_vec(), vec![0, 2, 1]);
        assert_eq!(set.x[[1, 3, 0]], 2.0);
        assert_eq!(set.label_histogram()[&1], 1);
    }

    #[test]
    fn collect_reports_short_stream() {
        let err = collect_samples(vec![sample(0, 4)].into_iter(), 2).unwrap_err();
        assert!(matches!(err, SamplerError::StreamExhausted { produced: 1, requested: 2 }));
    }

    #[test]
    fn collect_rejects_mixed_widths() {
        assert!(collect_samples(vec![sample(0, 4), sample(0, 5)].into_iter(), 2).is_err());
    }

    #[test]
    fn save_then_load() {
        let tmp = tempdir().unwrap();
        let set = collect_samples(vec![sample(1, 3), sample(2, 3)].into_iter(), 2).unwrap();
        assert!(!SampleSet::exists(tmp.path()));
        set.save(tmp.path()).unwrap();
        assert!(SampleSet::exists(tmp.path()));
        assert_eq!(SampleSet::load(tmp.path()).unwrap(), set);
    }
}
