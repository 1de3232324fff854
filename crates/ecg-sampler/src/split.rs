//! Patient partitioning.
//!
//! All splits are inter-patient: a patient lands wholly on one side. The
//! stratified split keeps the share of flagged patients (for the rhythm task,
//! carriers of atrial fibrillation or flutter) equal on both sides up to
//! rounding.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::error::ConfigError;
use crate::segment::PatientId;

/// Two disjoint patient sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientSplit {
    /// Training patients.
    pub train: Vec<PatientId>,
    /// Held-out (validation or test) patients.
    pub test: Vec<PatientId>,
}

/// Number of items a size amount selects out of `n`.
///
/// An amount in `(0, 1)` is a fraction, rounded up; an amount `>= 1` is a
/// count, capped at `n`.
///
/// # Errors
///
/// [`ConfigError::InvalidValue`] for non-finite or non-positive amounts.
pub fn resolve_amount(field: &'static str, amount: f64, n: usize) -> Result<usize, ConfigError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ConfigError::invalid_value(field, format!("must be positive, got {amount}")));
    }
    // Products like 0.2 * 15 land a hair above the integer.
    let count = if amount < 1.0 {
        (amount * n as f64 - 1e-9).ceil().max(0.0) as usize
    } else {
        amount as usize
    };
    Ok(count.min(n))
}

/// Shuffle `ids` and hold out `test_size` of them.
///
/// ```rust
/// use ecg_sampler::split::train_test_split;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let ids: Vec<u32> = (0..10).collect();
/// let split = train_test_split(&ids, 0.25, &mut rng).unwrap();
/// assert_eq!(split.test.len(), 3);
/// assert_eq!(split.train.len(), 7);
/// ```
pub fn train_test_split<R: Rng + ?Sized>(
    ids: &[PatientId],
    test_size: f64,
    rng: &mut R,
) -> Result<PatientSplit, ConfigError> {
    let n_test = resolve_amount("test_size", test_size, ids.len())?;
    let mut shuffled = ids.to_vec();
    shuffled.shuffle(rng);
    let train = shuffled.split_off(n_test);
    Ok(PatientSplit { train, test: shuffled })
}

/// Split flagged and unflagged patients independently at `test_size`, then
/// merge and shuffle each side.
///
/// A count `test_size` is first converted to its fraction of `ids`, so both
/// groups are held out at the same rate and the total matches the count up
/// to rounding.
pub fn stratified_split<R: Rng + ?Sized>(
    ids: &[PatientId],
    flagged: &HashSet<PatientId>,
    test_size: f64,
    rng: &mut R,
) -> Result<PatientSplit, ConfigError> {
    let n_test = resolve_amount("test_size", test_size, ids.len())?;
    let fraction = if test_size < 1.0 || ids.is_empty() {
        test_size
    } else {
        n_test as f64 / ids.len() as f64
    };
    let (carriers, others): (Vec<PatientId>, Vec<PatientId>) =
        ids.iter().copied().partition(|id| flagged.contains(id));
    let others = split_at_fraction(others, fraction, rng);
    let carriers = split_at_fraction(carriers, fraction, rng);

    let mut train = others.train;
    train.extend(carriers.train);
    let mut test = others.test;
    test.extend(carriers.test);
    train.shuffle(rng);
    test.shuffle(rng);
    Ok(PatientSplit { train, test })
}

/// Shuffle `ids` and hold out `ceil(fraction * len)` of them; `fraction`
/// lies in `(0, 1]`.
fn split_at_fraction<R: Rng + ?Sized>(mut ids: Vec<PatientId>, fraction: f64, rng: &mut R) -> PatientSplit {
    let n = ids.len();
    let n_test = ((fraction * n as f64 - 1e-9).ceil().max(0.0) as usize).min(n);
    ids.shuffle(rng);
    let train = ids.split_off(n_test);
    PatientSplit { train, test: ids }
}

/// Keep a random `amount` of `ids` (fraction or count, see [`resolve_amount`]).
pub fn subsample_patients<R: Rng + ?Sized>(
    ids: &[PatientId],
    amount: f64,
    field: &'static str,
    rng: &mut R,
) -> Result<Vec<PatientId>, ConfigError> {
    let k = resolve_amount(field, amount, ids.len())?;
    Ok(ids.choose_multiple(rng, k).copied().collect())
}
