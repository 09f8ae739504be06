//! Seeded train / held-out split.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::SamplingError;

/// Row indices of the two splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded generator and hold out `ceil(n * test_fraction)` rows.
///
/// # Errors
/// Returns `EmptySplit` when either side would be empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<SplitIndices, SamplingError> {
    let test_len = (n as f64 * test_fraction).ceil() as usize;
    if n == 0 || test_len == 0 || test_len >= n {
        return Err(SamplingError::EmptySplit { rows: n, test_fraction });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(test_len);
    Ok(SplitIndices { train, test: indices })
}
