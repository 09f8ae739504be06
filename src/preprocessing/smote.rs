//! SMOTE: synthetic minority oversampling.
//!
//! Balances a binary training set by interpolating between a minority sample
//! and one of its nearest minority-class neighbours until both classes have
//! the same count. Only ever applied to the training split.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::SamplingError;

/// SMOTE parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmoteConfig {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for SmoteConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }
}

/// Class counts of a binary label vector: (zeros, ones).
#[must_use]
pub fn class_counts(labels: &[u8]) -> (usize, usize) {
    let ones = labels.iter().filter(|&&y| y == 1).count();
    (labels.len() - ones, ones)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Seeded SMOTE oversampler.
#[derive(Debug, Clone)]
pub struct Smote {
    config: SmoteConfig,
}

impl Smote {
    #[must_use]
    pub fn new(config: SmoteConfig) -> Self {
        Self { config }
    }

    /// Return the input rows followed by synthetic minority rows, with matching labels.
    ///
    /// # Errors
    /// Returns `DegenerateTarget` if only one class is present and
    /// `TooFewMinority` if the minority class has fewer than two samples.
    pub fn fit_resample(
        &self,
        x: &[Vec<f64>],
        y: &[u8],
    ) -> Result<(Vec<Vec<f64>>, Vec<u8>), SamplingError> {
        if x.len() != y.len() {
            return Err(SamplingError::LengthMismatch {
                rows: x.len(),
                labels: y.len(),
            });
        }

        let (zeros, ones) = class_counts(y);
        if zeros == 0 || ones == 0 {
            return Err(SamplingError::DegenerateTarget { zeros, ones });
        }
        if zeros == ones {
            return Ok((x.to_vec(), y.to_vec()));
        }

        let (minority_label, needed) = if ones < zeros {
            (1u8, zeros - ones)
        } else {
            (0u8, ones - zeros)
        };
        let minority: Vec<&[f64]> = x
            .iter()
            .zip(y)
            .filter(|(_, &label)| label == minority_label)
            .map(|(row, _)| row.as_slice())
            .collect();

        if minority.len() < 2 {
            return Err(SamplingError::TooFewMinority {
                count: minority.len(),
            });
        }

        let k = self.config.k_neighbors.min(minority.len() - 1);
        let neighbors = nearest_neighbors(&minority, k);

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut x_out = x.to_vec();
        let mut y_out = y.to_vec();
        x_out.reserve(needed);
        y_out.reserve(needed);

        for _ in 0..needed {
            let i = rng.gen_range(0..minority.len());
            let j = neighbors[i][rng.gen_range(0..k)];
            let gap: f64 = rng.gen();

            let base = minority[i];
            let other = minority[j];
            let synthetic: Vec<f64> = base
                .iter()
                .zip(other)
                .map(|(a, b)| a + gap * (b - a))
                .collect();

            x_out.push(synthetic);
            y_out.push(minority_label);
        }

        tracing::debug!(
            "SMOTE generated {} synthetic samples for class {} (k={})",
            needed,
            minority_label,
            k
        );

        Ok((x_out, y_out))
    }
}

/// For each sample, indices of its `k` nearest other samples (ties broken by index).
fn nearest_neighbors(samples: &[&[f64]], k: usize) -> Vec<Vec<usize>> {
    samples
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut dists: Vec<(f64, usize)> = samples
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, b)| (squared_distance(a, b), j))
                .collect();
            dists.sort_by(|p, q| p.0.total_cmp(&q.0).then(p.1.cmp(&q.1)));
            dists.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn imbalanced() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            x.push(vec![f64::from(i), 0.0]);
            y.push(0);
        }
        for i in 0..4 {
            x.push(vec![100.0 + f64::from(i), 10.0]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn test_balances_classes() {
        let (x, y) = imbalanced();
        let (xr, yr) = Smote::new(SmoteConfig::default())
            .fit_resample(&x, &y)
            .expect("Should resample");
        assert_eq!(class_counts(&yr), (20, 20));
        assert_eq!(xr.len(), 40);
        assert_eq!(&xr[..24], &x[..]);
    }

    #[test]
    fn test_synthetic_points_lie_between_minority_samples() {
        let (x, y) = imbalanced();
        let (xr, _) = Smote::new(SmoteConfig::default())
            .fit_resample(&x, &y)
            .expect("Should resample");
        for row in &xr[24..] {
            assert!((100.0..=103.0).contains(&row[0]));
            assert!((row[1] - 10.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_is_deterministic() {
        let (x, y) = imbalanced();
        let smote = Smote::new(SmoteConfig::default());
        assert_eq!(
            smote.fit_resample(&x, &y).expect("Should resample"),
            smote.fit_resample(&x, &y).expect("Should resample")
        );
    }

    #[test]
    fn test_degenerate_inputs() {
        let smote = Smote::new(SmoteConfig::default());
        assert!(matches!(
            smote.fit_resample(&[vec![1.0], vec![2.0]], &[0, 0]),
            Err(SamplingError::DegenerateTarget { .. })
        ));
        assert!(matches!(
            smote.fit_resample(&[vec![1.0], vec![2.0], vec![3.0]], &[0, 0, 1]),
            Err(SamplingError::TooFewMinority { count: 1 })
        ));
    }

    #[test]
    fn test_balanced_input_is_unchanged() {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![0, 1];
        let (xr, yr) = Smote::new(SmoteConfig::default())
            .fit_resample(&x, &y)
            .expect("Should resample");
        assert_eq!(xr, x);
        assert_eq!(yr, y);
    }

    proptest! {
        #[test]
        fn minority_count_never_decreases(
            majority in 2usize..40,
            minority in 2usize..40,
            seed in any::<u64>(),
        ) {
            let mut x = Vec::new();
            let mut y = Vec::new();
            for i in 0..majority {
                x.push(vec![i as f64, 1.0]);
                y.push(0u8);
            }
            for i in 0..minority {
                x.push(vec![i as f64 * 3.0, -1.0]);
                y.push(1u8);
            }
            let smote = Smote::new(SmoteConfig { k_neighbors: 5, seed });
            let (_, yr) = smote.fit_resample(&x, &y).expect("Should resample");
            let (zeros, ones) = class_counts(&yr);
            prop_assert!(zeros >= majority && ones >= minority);
            prop_assert_eq!(zeros, ones);
            prop_assert_eq!(&yr[..y.len()], &y[..]);
        }
    }
}
