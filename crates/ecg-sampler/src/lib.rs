//! # ECG training-sample generation
//!
//! This crate turns a large, segment-structured archive of long-term
//! single-lead ECG recordings (Icentia11k layout) into pull-based streams of
//! fixed-size signal windows paired with task labels. Streams are
//! patient-isolated, class-stratified, and never load a patient's full
//! signal into memory.
//!
//! ## Architecture
//!
//! ```text
//! DatasetConfig ──► IcentiaDataset ──► split (train / val patient ids)
//!                         │
//!                    SegmentStore (NpyStore | MemoryStore)
//!                         │
//!         UniformPatientStream | RandomPatientStream
//!                         │
//!      SampleStream<_, RhythmPlanner | BeatPlanner | HeartRatePlanner>
//!                         │
//!                      labels (complete beats, priority resolution)
//!                         │
//!                 (window, label) ──► export::collect_samples
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ecg_sampler::config::DatasetConfig;
//! use ecg_sampler::dataset::IcentiaDataset;
//!
//! let config = DatasetConfig::default();
//! let dataset = IcentiaDataset::open(config).expect("store exists");
//!
//! let split = dataset.train_val_split().expect("split patients");
//! for sample in dataset.train_samples(split.train).take(8) {
//!     let sample = sample.expect("sample");
//!     println!("patient {} label {} shape {:?}", sample.patient_id, sample.label, sample.signal.shape());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dataset;
pub mod defines;
pub mod error;
pub mod export;
pub mod labels;
pub mod patient;
pub mod sampler;
pub mod segment;
pub mod split;
pub mod store;

// Convenient re-exports at the crate root.
pub use config::{DatasetConfig, SamplesPerPatient};
pub use dataset::IcentiaDataset;
pub use defines::{HeartBeat, HeartRate, HeartRhythm, HeartTask, IcentiaBeat, IcentiaRhythm};
pub use error::{ConfigError, DatasetError, SamplerError, SamplerResult, WindowError};
pub use patient::{RandomPatientStream, UniformPatientStream};
pub use sampler::{EcgSample, SampleStream, TaskSampler, WindowPlanner};
pub use segment::{PatientId, PatientRecord, Segment};
pub use store::{MemoryStore, NpyStore, SegmentStore};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
