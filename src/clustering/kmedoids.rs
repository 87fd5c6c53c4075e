//! Partitioning around medoids with alternating refinement.
//!
//! The initial medoids are the `k` rows with the smallest total distance to
//! every other row; the seed only orders rows whose totals tie. Each round
//! then assigns every row to its nearest medoid and moves each medoid to the
//! member with the smallest total distance to its cluster. Rounds stop when
//! no medoid moves or after `max_iter` rounds.

use ndarray::{Array2, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::distance::pairwise;
use crate::error::ParameterViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMedoidsOptions {
    pub seed: u64,
    pub max_iter: usize,
}

impl Default for KMedoidsOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iter: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMedoidsFit {
    /// Cluster `c` is represented by row `medoids[c]`.
    pub labels: Vec<i32>,
    pub medoids: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

pub fn fit_kmedoids(
    matrix: &Array2<f64>,
    k: usize,
    options: &KMedoidsOptions,
) -> Result<KMedoidsFit, ParameterViolation> {
    let n = matrix.nrows();
    if k == 0 {
        return Err(ParameterViolation::InvalidK { k });
    }
    if k > n {
        return Err(ParameterViolation::KExceedsRows { k, rows: n });
    }

    let dist = pairwise(matrix);
    let mut medoids = seed_medoids(&dist, k, options.seed);
    let mut labels = assign(&dist, &medoids);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iter {
        iterations += 1;
        let mut moved = false;

        for (c, medoid) in medoids.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c as i32).collect();
            let cost = |candidate: usize| -> f64 {
                members.iter().map(|&m| dist[[candidate, m]]).sum()
            };

            let mut best = *medoid;
            let mut best_cost = cost(best);
            for &candidate in &members {
                let candidate_cost = cost(candidate);
                if candidate_cost < best_cost {
                    best = candidate;
                    best_cost = candidate_cost;
                }
            }

            if best != *medoid {
                *medoid = best;
                moved = true;
            }
        }

        if !moved {
            converged = true;
            break;
        }
        labels = assign(&dist, &medoids);
    }

    if converged {
        debug!(k, iterations, "K-medoids converged");
    } else {
        warn!(k, iterations, "K-medoids stopped at the iteration limit");
    }

    Ok(KMedoidsFit {
        labels,
        medoids,
        iterations,
        converged,
    })
}

/// The `k` most central rows, ordered by their distance totals.
fn seed_medoids(dist: &Array2<f64>, k: usize, seed: u64) -> Vec<usize> {
    let totals = dist.sum_axis(Axis(1));
    let mut order: Vec<usize> = (0..dist.nrows()).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    // Stable sort: equal totals keep their shuffled order.
    order.sort_by(|&a, &b| totals[a].total_cmp(&totals[b]));
    order.truncate(k);
    order
}

/// Nearest-medoid assignment; a medoid always belongs to its own cluster and
/// ties go to the lowest cluster index.
fn assign(dist: &Array2<f64>, medoids: &[usize]) -> Vec<i32> {
    (0..dist.nrows())
        .map(|i| {
            if let Some(c) = medoids.iter().position(|&m| m == i) {
                return c as i32;
            }
            let mut best = 0;
            for c in 1..medoids.len() {
                if dist[[i, medoids[c]]] < dist[[i, medoids[best]]] {
                    best = c;
                }
            }
            best as i32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeSet;

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.05, 0.02],
            [0.02, 0.06],
            [0.5, 0.5],
            [0.52, 0.47],
            [0.48, 0.53],
            [1.0, 1.0],
            [0.97, 0.95],
            [0.95, 1.0],
        ]
    }

    #[test]
    fn test_three_blobs_three_labels() {
        let fit = fit_kmedoids(&blobs(), 3, &KMedoidsOptions::default()).unwrap();

        let distinct: BTreeSet<i32> = fit.labels.iter().copied().collect();
        assert_eq!(distinct, BTreeSet::from([0, 1, 2]));
        assert!(fit.converged);
        // Each blob lands in a single cluster.
        for blob in fit.labels.chunks(3) {
            assert!(blob.iter().all(|l| *l == blob[0]));
        }
    }

    #[test]
    fn test_every_cluster_non_empty_with_duplicates() {
        let m = array![[0.0], [0.0], [0.0], [0.0]];
        let fit = fit_kmedoids(&m, 3, &KMedoidsOptions::default()).unwrap();
        let distinct: BTreeSet<i32> = fit.labels.iter().copied().collect();
        assert_eq!(distinct.len(), 3);
        assert!(fit.labels.iter().all(|l| *l >= 0));
    }

    #[test]
    fn test_k_exceeds_rows() {
        let m = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let err = fit_kmedoids(&m, 10, &KMedoidsOptions::default()).unwrap_err();
        assert_eq!(err, ParameterViolation::KExceedsRows { k: 10, rows: 5 });
    }

    #[test]
    fn test_deterministic_for_seed() {
        let options = KMedoidsOptions { seed: 7, max_iter: 300 };
        let a = fit_kmedoids(&blobs(), 3, &options).unwrap();
        let b = fit_kmedoids(&blobs(), 3, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seeds_are_the_most_central_rows() {
        // Distance totals: 16, 13, 12, 13, 34.
        let m = array![[0.0], [1.0], [2.0], [3.0], [10.0]];
        let dist = pairwise(&m);

        assert_eq!(seed_medoids(&dist, 1, 42), vec![2]);
        let seeds = seed_medoids(&dist, 3, 42);
        assert_eq!(seeds[0], 2);
        assert_eq!(
            seeds[1..].iter().copied().collect::<BTreeSet<_>>(),
            BTreeSet::from([1, 3])
        );
    }

    #[test]
    fn test_seed_breaks_ties_between_equal_totals() {
        let m = array![[0.0], [1.0], [2.0], [3.0], [10.0]];
        let dist = pairwise(&m);

        let second: BTreeSet<usize> = (0..32)
            .map(|seed| seed_medoids(&dist, 2, seed)[1])
            .collect();
        assert_eq!(second, BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_refines_from_central_seeds() {
        // Rows 2 and 3 are the seeds; refinement moves them to each group's centre.
        let m = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let fit = fit_kmedoids(&m, 2, &KMedoidsOptions::default()).unwrap();

        let mut medoids = fit.medoids.clone();
        medoids.sort();
        assert_eq!(medoids, vec![1, 4]);
        assert!(fit.converged);
        assert!(fit.labels[..3].iter().all(|l| *l == fit.labels[0]));
        assert!(fit.labels[3..].iter().all(|l| *l == fit.labels[3]));
        assert_ne!(fit.labels[0], fit.labels[3]);
    }

    #[test]
    fn test_k_equals_rows() {
        let m = array![[0.0], [1.0], [5.0]];
        let fit = fit_kmedoids(&m, 3, &KMedoidsOptions::default()).unwrap();
        let mut medoids = fit.medoids.clone();
        medoids.sort();
        assert_eq!(medoids, vec![0, 1, 2]);
    }
}
