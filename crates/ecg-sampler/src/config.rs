//! Dataset configuration.
//!
//! [`DatasetConfig`] carries every knob the samplers, partitioner and CLI
//! read. It is serializable via [`serde`] so a run can be described by a JSON
//! file; missing fields take their defaults.
//!
//! # Example
//!
//! ```rust
//! use ecg_sampler::config::{DatasetConfig, SamplesPerPatient};
//!
//! let cfg = DatasetConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.frame_size, 1250);
//! assert_eq!(cfg.samples_per_patient, SamplesPerPatient::Total(1000));
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::defines::HeartTask;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// SamplesPerPatient
// ---------------------------------------------------------------------------

/// How many samples to draw from each patient.
///
/// Serialized untagged: a bare integer is a total, a list is a per-class
/// allocation in the task's target-class order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplesPerPatient {
    /// A total split evenly across target classes (at least one each).
    Total(usize),
    /// An explicit count per target class.
    PerClass(Vec<usize>),
}

impl SamplesPerPatient {
    /// Concrete per-class allocation for a task with `num_classes` targets.
    ///
    /// ```rust
    /// use ecg_sampler::config::SamplesPerPatient;
    ///
    /// assert_eq!(SamplesPerPatient::Total(10).resolve(3), vec![3, 3, 3]);
    /// assert_eq!(SamplesPerPatient::Total(2).resolve(3), vec![1, 1, 1]);
    /// assert_eq!(SamplesPerPatient::PerClass(vec![5, 0, 2]).resolve(3), vec![5, 0, 2]);
    /// ```
    pub fn resolve(&self, num_classes: usize) -> Vec<usize> {
        match self {
            SamplesPerPatient::Total(n) => {
                let classes = num_classes.max(1);
                vec![(n / classes).max(1); classes]
            }
            SamplesPerPatient::PerClass(v) => v.clone(),
        }
    }

    /// Sum over classes of the resolved allocation.
    pub fn total(&self, num_classes: usize) -> usize {
        self.resolve(num_classes).iter().sum()
    }
}

impl Default for SamplesPerPatient {
    fn default() -> Self {
        SamplesPerPatient::Total(1000)
    }
}

impl From<usize> for SamplesPerPatient {
    fn from(n: usize) -> Self {
        SamplesPerPatient::Total(n)
    }
}

// ---------------------------------------------------------------------------
// DatasetConfig
// ---------------------------------------------------------------------------

/// Complete configuration for one sample-generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    // -----------------------------------------------------------------------
    // Data
    // -----------------------------------------------------------------------
    /// Root of the segment store. Default: **`datasets/icentia11k`**.
    pub ds_path: PathBuf,

    /// Task the generated labels belong to. Default: **arrhythmia**.
    pub task: HeartTask,

    /// Signal window length in samples. Default: **1250** (5 s at 250 Hz).
    pub frame_size: usize,

    /// Signal sampling rate in Hz. Default: **250**.
    pub sampling_rate: usize,

    /// Label window used by the heart-rate task. Defaults to `frame_size`.
    pub label_frame_size: Option<usize>,

    // -----------------------------------------------------------------------
    // Sampling
    // -----------------------------------------------------------------------
    /// Training samples per patient. Default: **1000**.
    pub samples_per_patient: SamplesPerPatient,

    /// Validation samples per patient. Default: **1000**.
    pub val_samples_per_patient: SamplesPerPatient,

    /// Training patients to keep: a fraction in `(0, 1)` or a count.
    pub train_patients: Option<f64>,

    /// Validation patients: a fraction of the pool in `(0, 1)` or a count.
    /// Default: **0.2** of the pool when unset.
    pub val_patients: Option<f64>,

    /// Number of validation samples to materialise.
    pub val_size: Option<usize>,

    /// Directory caching the materialised validation set.
    pub val_file: Option<PathBuf>,

    // -----------------------------------------------------------------------
    // Infrastructure
    // -----------------------------------------------------------------------
    /// Worker threads for the rare-rhythm patient scan. Default: CPU count.
    pub data_parallelism: usize,

    /// Master seed for every RNG in the pipeline. Default: **42**.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            ds_path: PathBuf::from("datasets/icentia11k"),
            task: HeartTask::Arrhythmia,
            frame_size: 1250,
            sampling_rate: 250,
            label_frame_size: None,
            samples_per_patient: SamplesPerPatient::default(),
            val_samples_per_patient: SamplesPerPatient::default(),
            train_patients: None,
            val_patients: None,
            val_size: None,
            val_file: None,
            data_parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            seed: 42,
        }
    }
}

impl DatasetConfig {
    /// Load a [`DatasetConfig`] from a JSON file at `path` and validate it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed, and any
    /// [`ConfigError::InvalidValue`] from [`DatasetConfig::validate`].
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
        let cfg: DatasetConfig = serde_json::from_str(&contents)
            .map_err(|source| ConfigError::ParseError { path: path.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as pretty-printed JSON, creating parent
    /// directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| ConfigError::FileRead { path: parent.to_path_buf(), source })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
        Ok(())
    }

    /// Effective heart-rate label window.
    pub fn label_frame_size(&self) -> usize {
        self.label_frame_size.unwrap_or(self.frame_size)
    }

    /// Validate all fields and return the first problem found.
    ///
    /// # Validated invariants
    ///
    /// - `frame_size`, `sampling_rate` and the label window are non-zero.
    /// - Per-class lists have one entry per target class, and are not used
    ///   with the heart-rate task.
    /// - Totals are non-zero.
    /// - Patient amounts are finite and positive.
    /// - `data_parallelism` is at least 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_size == 0 {
            return Err(ConfigError::invalid_value("frame_size", "must be > 0"));
        }
        if self.sampling_rate == 0 {
            return Err(ConfigError::invalid_value("sampling_rate", "must be > 0"));
        }
        if self.label_frame_size() == 0 {
            return Err(ConfigError::invalid_value("label_frame_size", "must be > 0"));
        }

        validate_samples(self.task, "samples_per_patient", &self.samples_per_patient)?;
        validate_samples(self.task, "val_samples_per_patient", &self.val_samples_per_patient)?;

        for (field, amount) in [("train_patients", self.train_patients), ("val_patients", self.val_patients)] {
            if let Some(a) = amount {
                if !a.is_finite() || a <= 0.0 {
                    return Err(ConfigError::invalid_value(field, format!("must be positive, got {a}")));
                }
            }
        }

        if self.val_size == Some(0) {
            return Err(ConfigError::invalid_value("val_size", "must be > 0 when set"));
        }
        if self.data_parallelism == 0 {
            return Err(ConfigError::invalid_value("data_parallelism", "must be >= 1"));
        }
        Ok(())
    }
}

fn validate_samples(
    task: HeartTask,
    field: &'static str,
    samples: &SamplesPerPatient,
) -> Result<(), ConfigError> {
    match samples {
        SamplesPerPatient::Total(0) => Err(ConfigError::invalid_value(field, "must be > 0")),
        SamplesPerPatient::Total(_) => Ok(()),
        SamplesPerPatient::PerClass(_) if task == HeartTask::Hrv => Err(ConfigError::invalid_value(
            field,
            "per-class counts are not supported for the hrv task",
        )),
        SamplesPerPatient::PerClass(v) if v.len() != task.num_target_classes() => {
            Err(ConfigError::invalid_value(
                field,
                format!("expected {} per-class counts for {task}, got {}", task.num_target_classes(), v.len()),
            ))
        }
        SamplesPerPatient::PerClass(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        DatasetConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn json_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut original = DatasetConfig::default();
        original.samples_per_patient = SamplesPerPatient::PerClass(vec![10, 20, 30]);
        original.to_json(&path).expect("serialization should succeed");

        let loaded = DatasetConfig::from_json(&path).expect("deserialization should succeed");
        assert_eq!(loaded, original);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg: DatasetConfig = serde_json::from_str(r#"{"task": "beat", "samples_per_patient": 9}"#).unwrap();
        assert_eq!(cfg.task, HeartTask::Beat);
        assert_eq!(cfg.samples_per_patient, SamplesPerPatient::Total(9));
        assert_eq!(cfg.frame_size, 1250);
    }

    #[test]
    fn per_class_list_length_is_checked() {
        let mut cfg = DatasetConfig::default();
        cfg.samples_per_patient = SamplesPerPatient::PerClass(vec![1, 2]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn per_class_list_rejected_for_hrv() {
        let mut cfg = DatasetConfig::default();
        cfg.task = HeartTask::Hrv;
        cfg.val_samples_per_patient = SamplesPerPatient::PerClass(vec![1]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_parallelism_is_invalid() {
        let mut cfg = DatasetConfig::default();
        cfg.data_parallelism = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn label_window_defaults_to_frame() {
        let mut cfg = DatasetConfig::default();
        assert_eq!(cfg.label_frame_size(), 1250);
        cfg.label_frame_size = Some(2500);
        assert_eq!(cfg.label_frame_size(), 2500);
    }
}
