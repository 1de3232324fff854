//! Segment stores: where patient records come from.
//!
//! The [`SegmentStore`] trait is the single seam between the samplers and
//! storage. Two implementations are provided:
//!
//! - [`NpyStore`]: a directory tree of `.npy` files, one directory per
//!   patient and one sub-directory per segment:
//!
//!   ```text
//!   <root>/
//!     p00000/
//!       s00/
//!         data.npy      float32, shape [T] or [T, C]
//!         blabels.npy   int32/int64, shape [N, 2]  (optional)
//!         rlabels.npy   int32/int64, shape [M, 2]  (optional)
//!       s01/ ...
//!     p00001/ ...
//!   ```
//!
//!   Only the `data.npy` header is parsed when a patient is opened; signal
//!   windows are read on demand with a seek and a range read.
//!
//! - [`MemoryStore`]: fully resident records, for tests and small synthetic sets.

use ndarray::{Array2, ArrayD, Ix2};
use ndarray_npy::ReadNpyExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::segment::{parse_beat_table, parse_rhythm_table, PatientId, PatientRecord, Segment, SignalData};

/// Directory / key name for a patient: `p` followed by the id zero-padded to five digits.
pub fn patient_key(patient_id: PatientId) -> String {
    format!("p{patient_id:05}")
}

// ---------------------------------------------------------------------------
// SegmentStore trait
// ---------------------------------------------------------------------------

/// A source of patient records.
///
/// Implementations must be cheap to share across threads; the arrhythmia
/// patient scan opens patients from a rayon pool.
pub trait SegmentStore: Send + Sync {
    /// Open every segment of `patient_id`.
    ///
    /// The returned record owns whatever resources the store acquired; they
    /// are released when it is dropped.
    ///
    /// # Errors
    ///
    /// [`DatasetError::PatientNotFound`] if the store has no such patient.
    /// Any read or annotation error is returned as-is.
    fn open(&self, patient_id: PatientId) -> Result<PatientRecord, DatasetError>;

    /// Human-readable store name, used in log lines.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// NpySignal
// ---------------------------------------------------------------------------

/// A little-endian float32 `.npy` signal read window by window.
#[derive(Debug)]
pub struct NpySignal {
    path: PathBuf,
    file: Mutex<File>,
    data_offset: u64,
    len: usize,
    channels: usize,
}

impl NpySignal {
    /// Open `path` and parse its header.
    ///
    /// # Errors
    ///
    /// [`DatasetError::InvalidFormat`] unless the array is C-ordered `<f4`
    /// with one or two dimensions.
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path).map_err(|e| DatasetError::io_error(path, e))?;
        let header = read_npy_header(&file, path)?;
        if header.descr != "<f4" {
            return Err(DatasetError::invalid_format(
                path,
                format!("expected little-endian float32 (<f4), found {}", header.descr),
            ));
        }
        if header.fortran_order {
            return Err(DatasetError::invalid_format(path, "fortran-ordered arrays are not supported"));
        }
        let (len, channels) = match header.shape.as_slice() {
            [t] => (*t, 1),
            [t, c] => (*t, *c),
            other => {
                return Err(DatasetError::invalid_format(
                    path,
                    format!("expected shape [T] or [T, C], found {other:?}"),
                ))
            }
        };
        Ok(NpySignal {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            data_offset: header.data_offset,
            len,
            channels,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the file holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of channels (1 for a 1-D array).
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Read samples `[start, end)`. Bounds are checked by the caller.
    pub(crate) fn read_range(&self, start: usize, end: usize) -> Result<Array2<f32>, DatasetError> {
        const ITEM: usize = std::mem::size_of::<f32>();
        let rows = end - start;
        let mut buf = vec![0u8; rows * self.channels * ITEM];
        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| DatasetError::npy_read(&self.path, "file handle lock poisoned"))?;
            let offset = self.data_offset + (start * self.channels * ITEM) as u64;
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| DatasetError::io_error(&self.path, e))?;
            file.read_exact(&mut buf)
                .map_err(|e| DatasetError::io_error(&self.path, e))?;
        }
        let values: Vec<f32> = buf
            .chunks_exact(ITEM)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Array2::from_shape_vec((rows, self.channels), values)
            .map_err(|e| DatasetError::npy_read(&self.path, e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// NPY header parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct NpyHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
    data_offset: u64,
}

/// Parse the NPY preamble: magic, version, header length and the header dict.
fn read_npy_header(file: &File, path: &Path) -> Result<NpyHeader, DatasetError> {
    let mut reader = BufReader::new(file);
    let io = |e: std::io::Error| DatasetError::io_error(path, e);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic).map_err(io)?;
    if &magic != b"\x93NUMPY" {
        return Err(DatasetError::invalid_format(path, "not a valid NPY file"));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version).map_err(io)?;

    // Header length field: 2 bytes in v1, 4 bytes in v2/v3.
    let (header_len, preamble) = if version[0] == 1 {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).map_err(io)?;
        (u16::from_le_bytes(buf) as usize, 10)
    } else {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).map_err(io)?;
        (u32::from_le_bytes(buf) as usize, 12)
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header).map_err(io)?;
    let text = String::from_utf8_lossy(&header);
    let mut parsed = parse_header_dict(&text)
        .ok_or_else(|| DatasetError::invalid_format(path, format!("cannot parse NPY header {text:?}")))?;
    parsed.data_offset = (preamble + header_len) as u64;
    Ok(parsed)
}

/// Parse `{'descr': '<f4', 'fortran_order': False, 'shape': (300, 2), }`.
fn parse_header_dict(text: &str) -> Option<NpyHeader> {
    let descr = {
        let rest = &text[text.find("'descr':")? + "'descr':".len()..];
        let open = rest.find('\'')?;
        let rest = &rest[open + 1..];
        rest[..rest.find('\'')?].to_string()
    };
    let fortran_order = {
        let rest = text[text.find("'fortran_order':")? + "'fortran_order':".len()..].trim_start();
        rest.starts_with("True")
    };
    let shape = {
        let rest = &text[text.find("'shape':")? + "'shape':".len()..];
        let rest = &rest[rest.find('(')? + 1..];
        rest[..rest.find(')')?]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()?
    };
    Some(NpyHeader { descr, fortran_order, shape, data_offset: 0 })
}

/// Load an `[N, 2]` label table stored as int64 or int32.
///
/// A zero-length 1-D array is accepted as an empty table.
fn load_label_table(path: &Path, segment: &str) -> Result<Array2<i64>, DatasetError> {
    let open = || File::open(path).map_err(|e| DatasetError::io_error(path, e));
    let arr: ArrayD<i64> = match ArrayD::<i64>::read_npy(open()?) {
        Ok(a) => a,
        Err(_) => ArrayD::<i32>::read_npy(open()?)
            .map_err(|e| DatasetError::npy_read(path, e.to_string()))?
            .mapv(i64::from),
    };
    if arr.ndim() == 1 && arr.is_empty() {
        return Ok(Array2::zeros((0, 2)));
    }
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix2>().map_err(|_| {
        DatasetError::malformed(segment, format!("label table {} has shape {shape:?}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// NpyStore
// ---------------------------------------------------------------------------

/// Directory-backed store of `.npy` segments.
#[derive(Debug, Clone)]
pub struct NpyStore {
    root: PathBuf,
    name: String,
}

impl NpyStore {
    /// File holding a segment's signal.
    pub const DATA_FILE: &'static str = "data.npy";
    /// File holding a segment's beat table.
    pub const BEAT_FILE: &'static str = "blabels.npy";
    /// File holding a segment's rhythm table.
    pub const RHYTHM_FILE: &'static str = "rlabels.npy";

    /// Create a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`DatasetError::DirectoryNotFound`] if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DatasetError::DirectoryNotFound { path: root.display().to_string() });
        }
        let name = format!("npy:{}", root.display());
        Ok(NpyStore { root, name })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List patient ids present under the root, sorted.
    ///
    /// Entries not matching `p<digits>` are ignored.
    pub fn available_patients(&self) -> Result<Vec<PatientId>, DatasetError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(|e| DatasetError::io_error(&self.root, e))? {
            let entry = entry.map_err(|e| DatasetError::io_error(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(|n| n.strip_prefix('p')).and_then(|d| d.parse().ok()) {
                Some(id) => ids.push(id),
                None => debug!("Skipping non-patient entry {:?}", name),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn open_segment(&self, dir: &Path, key: &str) -> Result<Segment, DatasetError> {
        let signal = NpySignal::open(&dir.join(Self::DATA_FILE))?;
        let beat_path = dir.join(Self::BEAT_FILE);
        let rhythm_path = dir.join(Self::RHYTHM_FILE);
        let blabels = if beat_path.is_file() {
            load_label_table(&beat_path, key)?
        } else {
            Array2::zeros((0, 2))
        };
        let rlabels = if rhythm_path.is_file() {
            load_label_table(&rhythm_path, key)?
        } else {
            Array2::zeros((0, 2))
        };
        let beats = parse_beat_table(key, blabels.view())?;
        let rhythms = parse_rhythm_table(key, rlabels.view())?;
        Segment::from_parts(key, SignalData::Npy(Arc::new(signal)), beats, rhythms)
    }
}

impl SegmentStore for NpyStore {
    fn open(&self, patient_id: PatientId) -> Result<PatientRecord, DatasetError> {
        let dir = self.root.join(patient_key(patient_id));
        if !dir.is_dir() {
            return Err(DatasetError::patient_not_found(patient_id, dir));
        }

        let mut segment_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| DatasetError::io_error(&dir, e))? {
            let entry = entry.map_err(|e| DatasetError::io_error(&dir, e))?;
            let path = entry.path();
            if !path.join(Self::DATA_FILE).is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(key) => segment_dirs.push((key, path)),
                Err(name) => warn!("Skipping segment with non-UTF-8 name {:?}", name),
            }
        }

        let segments = segment_dirs
            .iter()
            .map(|(key, path)| self.open_segment(path, key))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(patient_id, segments = segments.len(), "Opened patient");
        Ok(PatientRecord::new(patient_id, segments))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Resident patient records keyed by id.
///
/// ```rust
/// use ecg_sampler::store::{MemoryStore, SegmentStore};
/// use ecg_sampler::segment::PatientRecord;
///
/// let store = MemoryStore::new().with_patient(PatientRecord::new(3, vec![]));
/// assert!(store.open(3).is_ok());
/// assert!(store.open(4).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    patients: HashMap<PatientId, PatientRecord>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a record.
    pub fn insert(&mut self, record: PatientRecord) {
        self.patients.insert(record.patient_id(), record);
    }

    /// Builder form of [`MemoryStore::insert`].
    pub fn with_patient(mut self, record: PatientRecord) -> Self {
        self.insert(record);
        self
    }

    /// Stored patient ids, sorted.
    pub fn available_patients(&self) -> Vec<PatientId> {
        let mut ids: Vec<PatientId> = self.patients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl SegmentStore for MemoryStore {
    fn open(&self, patient_id: PatientId) -> Result<PatientRecord, DatasetError> {
        self.patients
            .get(&patient_id)
            .cloned()
            .ok_or_else(|| DatasetError::patient_not_found(patient_id, patient_key(patient_id)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
