//! Error types for the ECG sample-generation pipeline.
//!
//! Every module imports its error type from here rather than defining it
//! inline, so the hierarchy stays in one place.
//!
//! ## Hierarchy
//!
//! ```text
//! SamplerError (top-level)
//! ├── ConfigError   (config validation / file loading)
//! └── DatasetError  (segment store access, annotation integrity, I/O)
//!     └── WindowError   (pure windowing utilities)
//! ```
//!
//! Data sparsity (a patient without qualifying intervals or beats for a class)
//! is not an error anywhere in this crate: it only shows up as fewer samples.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// SamplerResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type SamplerResult<T> = Result<T, SamplerError>;

// ---------------------------------------------------------------------------
// SamplerError: top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for the sample-generation pipeline.
///
/// Lower-level functions return their module-specific error types, which
/// coerce into `SamplerError` via [`From`].
#[derive(Debug, Error)]
pub enum SamplerError {
    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A segment store or annotation error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// The requested patient population is empty.
    #[error("Patient set `{0}` is empty")]
    EmptyPatientSet(&'static str),

    /// A finite sample stream ended before the requested number of samples.
    #[error("Sample stream exhausted after {produced} of {requested} samples")]
    StreamExhausted {
        /// Samples collected before the stream ended.
        produced: usize,
        /// Samples requested.
        requested: usize,
    },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`DatasetConfig`].
///
/// [`DatasetConfig`]: crate::config::DatasetConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// DatasetError
// ---------------------------------------------------------------------------

/// Errors produced while opening patients or reading segment data.
///
/// These are fatal to a draw and are always reported to the consumer. A
/// missing patient is never skipped silently: doing so would change the
/// sampling distribution the caller asked for.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The requested patient has no backing record in the store.
    #[error("Patient {patient_id} not found at `{path}`")]
    PatientNotFound {
        /// Requested patient id.
        patient_id: u32,
        /// Location that was expected to hold the record.
        path: PathBuf,
    },

    /// A rhythm or beat label table violates its structural invariants.
    #[error("Malformed annotation in segment `{segment}`: {message}")]
    MalformedAnnotation {
        /// Segment key (or file path) of the offending table.
        segment: String,
        /// Description of the violation.
        message: String,
    },

    /// A signal range read fell outside the segment.
    #[error("Signal window [{start}, {end}) outside segment of length {len}")]
    WindowOutOfBounds {
        /// First requested sample.
        start: usize,
        /// One past the last requested sample.
        end: usize,
        /// Number of samples in the segment.
        len: usize,
    },

    /// A file was found but its format or shape is wrong.
    #[error("Invalid data format in `{path}`: {message}")]
    InvalidFormat {
        /// Path of the malformed file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A numpy array file could not be parsed.
    #[error("NumPy read error in `{path}`: {message}")]
    NpyReadError {
        /// Path of the `.npy` file.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// A low-level I/O error while reading a data file.
    #[error("I/O error reading `{path}`: {source}")]
    IoError {
        /// Path being read when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The store root directory does not exist.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: String,
    },

    /// A windowing utility rejected its arguments.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// An I/O error that carries no path context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    /// Construct a [`DatasetError::PatientNotFound`].
    pub fn patient_not_found(patient_id: u32, path: impl Into<PathBuf>) -> Self {
        DatasetError::PatientNotFound { patient_id, path: path.into() }
    }

    /// Construct a [`DatasetError::MalformedAnnotation`].
    pub fn malformed<S: Into<String>, M: Into<String>>(segment: S, msg: M) -> Self {
        DatasetError::MalformedAnnotation { segment: segment.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::InvalidFormat`].
    pub fn invalid_format<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::InvalidFormat { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::IoError`].
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::IoError { path: path.into(), source }
    }

    /// Construct a [`DatasetError::NpyReadError`].
    pub fn npy_read<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::NpyReadError { path: path.into(), message: msg.into() }
    }
}

// ---------------------------------------------------------------------------
// WindowError
// ---------------------------------------------------------------------------

/// Errors produced by the pure windowing utilities in [`crate::labels`].
///
/// These indicate a programming error in the caller and are never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    /// `start >= end`.
    #[error("Invalid window: end ({end}) must be greater than start ({start})")]
    InvalidWindow {
        /// Window start sample.
        start: usize,
        /// Window end sample.
        end: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_errors_reach_the_top_through_dataset() {
        fn resolve() -> SamplerResult<()> {
            let read: Result<(), DatasetError> = Err(WindowError::InvalidWindow { start: 5, end: 5 }.into());
            read?;
            Ok(())
        }
        match resolve() {
            Err(SamplerError::Dataset(DatasetError::Window(w))) => {
                assert_eq!(w, WindowError::InvalidWindow { start: 5, end: 5 })
            }
            other => panic!("expected a dataset window error, got {other:?}"),
        }
    }
}
