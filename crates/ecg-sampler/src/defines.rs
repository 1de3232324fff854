//! Label alphabets and task selectors.
//!
//! Two families of codes live here:
//!
//! - **Source codes** ([`IcentiaRhythm`], [`IcentiaBeat`]) are the integers
//!   stored in the segment annotation tables. Each family carries two static
//!   priority sets used to break ties when a window overlaps several labels.
//! - **Task labels** ([`HeartRhythm`], [`HeartBeat`], [`HeartRate`]) are the
//!   output alphabets emitted alongside each signal window.
//!
//! The `From` impls between the two families are the fixed source-to-task
//! mappings.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Task selector
// ---------------------------------------------------------------------------

/// Which supervised task a sample stream produces labels for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartTask {
    /// Rhythm classification (normal / atrial fibrillation-or-flutter).
    Arrhythmia,
    /// Beat morphology classification (normal / PAC / PVC).
    Beat,
    /// Heart-rate bucket classification.
    Hrv,
}

impl HeartTask {
    /// Number of stratified target classes the task's generator draws per patient.
    pub fn num_target_classes(self) -> usize {
        match self {
            HeartTask::Arrhythmia => RHYTHM_TARGETS.len(),
            HeartTask::Beat => BEAT_TARGETS.len(),
            HeartTask::Hrv => 1,
        }
    }
}

impl fmt::Display for HeartTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeartTask::Arrhythmia => "arrhythmia",
            HeartTask::Beat => "beat",
            HeartTask::Hrv => "hrv",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for HeartTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arrhythmia" => Ok(HeartTask::Arrhythmia),
            "beat" => Ok(HeartTask::Beat),
            "hrv" => Ok(HeartTask::Hrv),
            other => Err(format!("unknown task `{other}` (expected arrhythmia, beat or hrv)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Task labels
// ---------------------------------------------------------------------------

/// Rhythm task labels.
///
/// Atrial flutter is folded into [`HeartRhythm::Afib`] by the Icentia mapping;
/// the `Aflut` slot is kept so label indices stay stable across datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum HeartRhythm {
    /// Normal sinus rhythm.
    Normal = 0,
    /// Atrial fibrillation (or flutter).
    Afib = 1,
    /// Atrial flutter (unused by Icentia).
    Aflut = 2,
    /// Noise / no usable rhythm.
    Noise = 3,
}

/// Beat morphology labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum HeartBeat {
    /// Normal beat.
    Normal = 0,
    /// Premature atrial contraction (supraventricular ectopic).
    Pac = 1,
    /// Premature ventricular contraction (ventricular ectopic).
    Pvc = 2,
    /// Undefined / noise.
    Noise = 3,
}

/// Heart-rate bucket labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum HeartRate {
    /// 60–100 BPM.
    Normal = 0,
    /// Above 100 BPM.
    Tachycardia = 1,
    /// Below 60 BPM.
    Bradycardia = 2,
    /// Too few beats in the window to estimate a rate.
    Noise = 3,
}

impl HeartRate {
    /// Bucket a rate in beats per minute.
    pub fn from_bpm(bpm: f64) -> Self {
        if bpm < 60.0 {
            HeartRate::Bradycardia
        } else if bpm <= 100.0 {
            HeartRate::Normal
        } else {
            HeartRate::Tachycardia
        }
    }
}

macro_rules! label_index {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for u32 {
                fn from(label: $ty) -> u32 {
                    label as u32
                }
            }
        )+
    };
}

label_index!(HeartRhythm, HeartBeat, HeartRate);

// ---------------------------------------------------------------------------
// Icentia source codes
// ---------------------------------------------------------------------------

/// Rhythm codes stored in a segment's `rhythm_labels` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum IcentiaRhythm {
    /// Noise / unannotated.
    Noise = 0,
    /// Normal sinus rhythm.
    Normal = 1,
    /// Atrial fibrillation.
    Afib = 2,
    /// Atrial flutter.
    Aflut = 3,
    /// End-of-interval marker.
    End = 4,
    /// Unknown rhythm.
    Unknown = 5,
}

impl IcentiaRhythm {
    /// All codes, ordered by value.
    pub const ALL: [IcentiaRhythm; 6] = [
        IcentiaRhythm::Noise,
        IcentiaRhythm::Normal,
        IcentiaRhythm::Afib,
        IcentiaRhythm::Aflut,
        IcentiaRhythm::End,
        IcentiaRhythm::Unknown,
    ];

    /// Clinically significant codes; any presence wins over background rhythm.
    pub const HIGH_PRIORITY: [IcentiaRhythm; 2] = [IcentiaRhythm::Afib, IcentiaRhythm::Aflut];

    /// Background codes, consulted only when no high-priority code is present.
    pub const LOW_PRIORITY: [IcentiaRhythm; 4] = [
        IcentiaRhythm::Noise,
        IcentiaRhythm::Normal,
        IcentiaRhythm::End,
        IcentiaRhythm::Unknown,
    ];

    /// Decode a raw table value.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| *r as i64 == code)
    }

    /// Whether this code is one of [`IcentiaRhythm::HIGH_PRIORITY`].
    pub fn is_high_priority(self) -> bool {
        Self::HIGH_PRIORITY.contains(&self)
    }
}

/// Beat codes stored in a segment's `beat_labels` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum IcentiaBeat {
    /// Undefined beat (detection gap / noise).
    Undefined = 0,
    /// Normal beat.
    Normal = 1,
    /// Premature atrial contraction.
    Pac = 2,
    /// Aberrated beat. Present in the archive, never targeted, no priority.
    Aberrated = 3,
    /// Premature ventricular contraction.
    Pvc = 4,
}

impl IcentiaBeat {
    /// All codes, ordered by value.
    pub const ALL: [IcentiaBeat; 5] = [
        IcentiaBeat::Undefined,
        IcentiaBeat::Normal,
        IcentiaBeat::Pac,
        IcentiaBeat::Aberrated,
        IcentiaBeat::Pvc,
    ];

    /// Ectopic codes; any presence overrides a majority vote.
    pub const HIGH_PRIORITY: [IcentiaBeat; 2] = [IcentiaBeat::Pac, IcentiaBeat::Pvc];

    /// Background codes.
    pub const LOW_PRIORITY: [IcentiaBeat; 2] = [IcentiaBeat::Undefined, IcentiaBeat::Normal];

    /// Decode a raw table value.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| *b as i64 == code)
    }
}

// ---------------------------------------------------------------------------
// Source → task mappings
// ---------------------------------------------------------------------------

impl From<IcentiaRhythm> for HeartRhythm {
    fn from(code: IcentiaRhythm) -> Self {
        match code {
            IcentiaRhythm::Normal => HeartRhythm::Normal,
            IcentiaRhythm::Afib | IcentiaRhythm::Aflut => HeartRhythm::Afib,
            IcentiaRhythm::Noise | IcentiaRhythm::End | IcentiaRhythm::Unknown => {
                HeartRhythm::Noise
            }
        }
    }
}

impl From<IcentiaBeat> for HeartBeat {
    fn from(code: IcentiaBeat) -> Self {
        match code {
            IcentiaBeat::Normal => HeartBeat::Normal,
            IcentiaBeat::Pac => HeartBeat::Pac,
            IcentiaBeat::Pvc => HeartBeat::Pvc,
            IcentiaBeat::Undefined | IcentiaBeat::Aberrated => HeartBeat::Noise,
        }
    }
}

/// Rhythm classes the arrhythmia generator stratifies over, in draw order.
pub const RHYTHM_TARGETS: [IcentiaRhythm; 3] =
    [IcentiaRhythm::Normal, IcentiaRhythm::Afib, IcentiaRhythm::Aflut];

/// Beat classes the beat generator stratifies over, in draw order.
pub const BEAT_TARGETS: [IcentiaBeat; 3] =
    [IcentiaBeat::Normal, IcentiaBeat::Pac, IcentiaBeat::Pvc];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rhythm_codes_round_trip_through_from_code() {
        for code in IcentiaRhythm::ALL {
            assert_eq!(IcentiaRhythm::from_code(code as i64), Some(code));
        }
        assert_eq!(IcentiaRhythm::from_code(6), None);
        assert_eq!(IcentiaRhythm::from_code(-1), None);
    }

    #[test]
    fn beat_codes_include_aberrated() {
        assert_eq!(IcentiaBeat::from_code(3), Some(IcentiaBeat::Aberrated));
        assert_eq!(IcentiaBeat::from_code(5), None);
        assert!(!IcentiaBeat::HIGH_PRIORITY.contains(&IcentiaBeat::Aberrated));
        assert!(!IcentiaBeat::LOW_PRIORITY.contains(&IcentiaBeat::Aberrated));
    }

    #[test]
    fn flutter_maps_to_afib_label() {
        assert_eq!(HeartRhythm::from(IcentiaRhythm::Aflut), HeartRhythm::Afib);
        assert_eq!(HeartRhythm::from(IcentiaRhythm::End), HeartRhythm::Noise);
        assert_eq!(u32::from(HeartRhythm::Afib), 1);
    }

    #[test]
    fn bpm_buckets() {
        assert_eq!(HeartRate::from_bpm(40.0), HeartRate::Bradycardia);
        assert_eq!(HeartRate::from_bpm(60.0), HeartRate::Normal);
        assert_eq!(HeartRate::from_bpm(100.0), HeartRate::Normal);
        assert_eq!(HeartRate::from_bpm(100.5), HeartRate::Tachycardia);
    }

    #[test]
    fn task_parses_from_str() {
        assert_eq!("beat".parse::<HeartTask>(), Ok(HeartTask::Beat));
        assert!("segmentation".parse::<HeartTask>().is_err());
        assert_eq!(HeartTask::Hrv.to_string(), "hrv");
    }
}
