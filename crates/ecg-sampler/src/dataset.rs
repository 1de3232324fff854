//! The Icentia11k dataset facade.
//!
//! [`IcentiaDataset`] binds a [`SegmentStore`] to a [`DatasetConfig`] and
//! exposes the full pipeline: patient populations, partitioning, patient
//! streams and the task sample generators.
//!
//! # Example – in-memory store
//!
//! ```rust
//! use std::sync::Arc;
//! use ecg_sampler::config::DatasetConfig;
//! use ecg_sampler::dataset::IcentiaDataset;
//! use ecg_sampler::store::MemoryStore;
//!
//! let ds = IcentiaDataset::new(Arc::new(MemoryStore::new()), DatasetConfig::default()).unwrap();
//! assert_eq!(ds.patient_ids().len(), 11_000);
//! assert_eq!(ds.test_patient_ids().len(), 1_000);
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::info;

use crate::config::{DatasetConfig, SamplesPerPatient};
use crate::defines::HeartTask;
use crate::error::{ConfigError, SamplerError, SamplerResult};
use crate::patient::{PatientItem, RandomPatientStream, UniformPatientStream};
use crate::sampler::{
    BeatPlanner, BeatSampler, HeartRatePlanner, HeartRateSampler, RhythmPlanner, RhythmSampler,
    SampleStream, SignalSampler, TaskSampler,
};
use crate::segment::PatientId;
use crate::split::{stratified_split, subsample_patients, train_test_split, PatientSplit};
use crate::store::{NpyStore, SegmentStore};

/// Size of the full patient population.
pub const NUM_PATIENTS: PatientId = 11_000;

/// Patients with ids at or above this are reserved for testing.
pub const TEST_PATIENT_START: PatientId = 10_000;

/// Held-out share of the training pool when `val_patients` is unset.
pub const DEFAULT_VAL_PATIENTS: f64 = 0.2;

/// Stream seed offsets, so train and validation draws never share an RNG.
const TRAIN_STREAM: u64 = 1;
const VAL_STREAM: u64 = 2;
const SPLIT_STREAM: u64 = 3;

/// Dataset facade over a segment store.
pub struct IcentiaDataset {
    store: Arc<dyn SegmentStore>,
    config: DatasetConfig,
    patient_ids: Vec<PatientId>,
    arrhythmia_patients: OnceLock<HashSet<PatientId>>,
}

impl IcentiaDataset {
    /// Create a dataset over `store` with the default population `0..11000`.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from [`DatasetConfig::validate`].
    pub fn new(store: Arc<dyn SegmentStore>, config: DatasetConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(IcentiaDataset {
            store,
            config,
            patient_ids: (0..NUM_PATIENTS).collect(),
            arrhythmia_patients: OnceLock::new(),
        })
    }

    /// Open an [`NpyStore`] at `config.ds_path`.
    pub fn open(config: DatasetConfig) -> SamplerResult<Self> {
        let store = NpyStore::new(&config.ds_path)?;
        info!("Opened segment store {}", store.name());
        Ok(Self::new(Arc::new(store), config)?)
    }

    /// Replace the patient population (drops any cached patient index).
    pub fn with_patient_ids(mut self, patient_ids: Vec<PatientId>) -> Self {
        self.patient_ids = patient_ids;
        self.arrhythmia_patients = OnceLock::new();
        self
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Selected task.
    pub fn task(&self) -> HeartTask {
        self.config.task
    }

    /// Full patient population.
    pub fn patient_ids(&self) -> &[PatientId] {
        &self.patient_ids
    }

    /// Patients available for training and validation.
    pub fn train_patient_ids(&self) -> Vec<PatientId> {
        self.patient_ids.iter().copied().filter(|&id| id < TEST_PATIENT_START).collect()
    }

    /// Patients reserved for testing.
    pub fn test_patient_ids(&self) -> Vec<PatientId> {
        self.patient_ids.iter().copied().filter(|&id| id >= TEST_PATIENT_START).collect()
    }

    // -----------------------------------------------------------------------
    // Rare-rhythm patient index
    // -----------------------------------------------------------------------

    /// Patients with any AFIB/AFL rhythm row, if already computed.
    pub fn arrhythmia_patients(&self) -> Option<&HashSet<PatientId>> {
        self.arrhythmia_patients.get()
    }

    /// Scan the whole population for AFIB/AFL carriers, once.
    ///
    /// Patients are opened independently on a rayon pool of
    /// `data_parallelism` threads. The result is cached for the lifetime of
    /// this dataset; later calls return it without touching the store.
    ///
    /// # Errors
    ///
    /// The first store error encountered by any worker.
    pub fn ensure_arrhythmia_index(&self) -> SamplerResult<&HashSet<PatientId>> {
        if let Some(index) = self.arrhythmia_patients.get() {
            return Ok(index);
        }
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.data_parallelism)
            .build()
            .map_err(|e| ConfigError::invalid_value("data_parallelism", e.to_string()))?;
        let store = self.store.as_ref();
        let flags = pool.install(|| {
            self.patient_ids
                .par_iter()
                .map(|&id| store.open(id).map(|record| (id, record.has_high_priority_rhythm())))
                .collect::<Result<Vec<_>, _>>()
        })?;
        let index: HashSet<PatientId> =
            flags.into_iter().filter_map(|(id, has)| has.then_some(id)).collect();
        info!(
            carriers = index.len(),
            patients = self.patient_ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Indexed arrhythmia patients"
        );
        Ok(self.arrhythmia_patients.get_or_init(|| index))
    }

    // -----------------------------------------------------------------------
    // Partitioning
    // -----------------------------------------------------------------------

    /// Split `patient_ids` holding out `test_size` (fraction or count).
    ///
    /// For the arrhythmia task carriers and non-carriers are split
    /// separately; this triggers [`IcentiaDataset::ensure_arrhythmia_index`].
    pub fn split_train_test_patients(
        &self,
        patient_ids: &[PatientId],
        test_size: f64,
        rng: &mut StdRng,
    ) -> SamplerResult<PatientSplit> {
        if self.config.task == HeartTask::Arrhythmia {
            let index = self.ensure_arrhythmia_index()?;
            Ok(stratified_split(patient_ids, index, test_size, rng)?)
        } else {
            Ok(train_test_split(patient_ids, test_size, rng)?)
        }
    }

    /// Train/validation split of the training pool per the configuration:
    /// optional subsampling by `train_patients`, then holding out
    /// `val_patients` (default 20 %).
    pub fn train_val_split(&self) -> SamplerResult<PatientSplit> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(SPLIT_STREAM));
        let mut pool = self.train_patient_ids();
        if pool.is_empty() {
            return Err(SamplerError::EmptyPatientSet("train"));
        }
        if let Some(amount) = self.config.train_patients {
            pool = subsample_patients(&pool, amount, "train_patients", &mut rng)?;
        }
        let val = self.config.val_patients.unwrap_or(DEFAULT_VAL_PATIENTS);
        let split = self.split_train_test_patients(&pool, val, &mut rng)?;
        info!(train = split.train.len(), val = split.test.len(), task = %self.config.task, "Split patients");
        Ok(split)
    }

    // -----------------------------------------------------------------------
    // Patient streams
    // -----------------------------------------------------------------------

    /// Pass-based patient stream over `patient_ids`.
    pub fn uniform_patient_stream(
        &self,
        patient_ids: Vec<PatientId>,
        shuffle: bool,
        repeat: bool,
        seed: u64,
    ) -> UniformPatientStream {
        UniformPatientStream::new(Arc::clone(&self.store), patient_ids, shuffle, repeat, seed)
    }

    /// Weighted i.i.d. patient stream over `patient_ids`.
    pub fn random_patient_stream(
        &self,
        patient_ids: Vec<PatientId>,
        weights: Option<&[f64]>,
        seed: u64,
    ) -> Result<RandomPatientStream, ConfigError> {
        RandomPatientStream::new(Arc::clone(&self.store), patient_ids, weights, seed)
    }

    // -----------------------------------------------------------------------
    // Sample generators
    // -----------------------------------------------------------------------

    /// Rhythm-task samples from `patients`.
    pub fn rhythm_data_generator<P: Iterator<Item = PatientItem>>(
        &self,
        patients: P,
        samples_per_patient: &SamplesPerPatient,
        seed: u64,
    ) -> RhythmSampler<P> {
        let per_class = samples_per_patient.resolve(HeartTask::Arrhythmia.num_target_classes());
        SampleStream::new(patients, RhythmPlanner::new(self.config.frame_size, per_class), seed)
    }

    /// Beat-task samples from `patients`.
    pub fn beat_data_generator<P: Iterator<Item = PatientItem>>(
        &self,
        patients: P,
        samples_per_patient: &SamplesPerPatient,
        seed: u64,
    ) -> BeatSampler<P> {
        let per_class = samples_per_patient.resolve(HeartTask::Beat.num_target_classes());
        let planner = BeatPlanner::new(self.config.frame_size, self.config.sampling_rate, per_class);
        SampleStream::new(patients, planner, seed)
    }

    /// Heart-rate-task samples from `patients`.
    pub fn heart_rate_data_generator<P: Iterator<Item = PatientItem>>(
        &self,
        patients: P,
        samples_per_patient: &SamplesPerPatient,
        seed: u64,
    ) -> HeartRateSampler<P> {
        let planner = HeartRatePlanner::new(
            self.config.frame_size,
            self.config.label_frame_size(),
            self.config.sampling_rate,
            samples_per_patient.total(HeartTask::Hrv.num_target_classes()),
        );
        SampleStream::new(patients, planner, seed)
    }

    /// Unlabelled windows from `patients`.
    pub fn signal_generator<P: Iterator<Item = PatientItem>>(
        &self,
        patients: P,
        samples_per_patient: usize,
        seed: u64,
    ) -> SignalSampler<P> {
        SignalSampler::new(patients, self.config.frame_size, samples_per_patient, seed)
    }

    /// Samples for the configured task.
    pub fn task_data_generator<P: Iterator<Item = PatientItem>>(
        &self,
        patients: P,
        samples_per_patient: &SamplesPerPatient,
        seed: u64,
    ) -> TaskSampler<P> {
        match self.config.task {
            HeartTask::Arrhythmia => {
                TaskSampler::Rhythm(self.rhythm_data_generator(patients, samples_per_patient, seed))
            }
            HeartTask::Beat => TaskSampler::Beat(self.beat_data_generator(patients, samples_per_patient, seed)),
            HeartTask::Hrv => {
                TaskSampler::HeartRate(self.heart_rate_data_generator(patients, samples_per_patient, seed))
            }
        }
    }

    /// Endless shuffled training stream over `patient_ids`.
    pub fn train_samples(&self, patient_ids: Vec<PatientId>) -> TaskSampler<UniformPatientStream> {
        let seed = self.config.seed.wrapping_add(TRAIN_STREAM);
        let patients = self.uniform_patient_stream(patient_ids, true, true, seed);
        self.task_data_generator(patients, &self.config.samples_per_patient, seed)
    }

    /// Endless shuffled validation stream over `patient_ids`.
    pub fn val_samples(&self, patient_ids: Vec<PatientId>) -> TaskSampler<UniformPatientStream> {
        let seed = self.config.seed.wrapping_add(VAL_STREAM);
        let patients = self.uniform_patient_stream(patient_ids, true, true, seed);
        self.task_data_generator(patients, &self.config.val_samples_per_patient, seed)
    }
}

impl std::fmt::Debug for IcentiaDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcentiaDataset")
            .field("store", &self.store.name())
            .field("task", &self.config.task)
            .field("patients", &self.patient_ids.len())
            .field("arrhythmia_indexed", &self.arrhythmia_patients.get().is_some())
            .finish()
    }
}
