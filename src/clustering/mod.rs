//! Clustering engine over the scaled feature matrix.
//!
//! Two algorithms share one entry point, [`fit`]. K-medoids always yields
//! exactly `k` clusters; DBSCAN discovers its own cluster count and marks
//! unreachable rows with [`NOISE`].

pub mod dbscan;
pub mod distance;
pub mod kmedoids;
pub mod scaler;

pub use kmedoids::KMedoidsOptions;
pub use scaler::min_max_scale;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ParameterViolation;

/// Label reserved for rows outside every dense region.
pub const NOISE: i32 = -1;

/// Algorithm choice together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Algorithm {
    KMedoids { k: usize },
    Dbscan { epsilon: f64, min_points: usize },
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::KMedoids { .. } => "K-Medoids",
            Algorithm::Dbscan { .. } => "DBSCAN",
        }
    }

    /// Checks parameters that are invalid regardless of the data.
    pub fn validate(&self) -> Result<(), ParameterViolation> {
        match *self {
            Algorithm::KMedoids { k } if k == 0 => Err(ParameterViolation::InvalidK { k }),
            Algorithm::Dbscan { epsilon, .. } if !epsilon.is_finite() || epsilon <= 0.0 => {
                Err(ParameterViolation::InvalidEpsilon { epsilon })
            }
            Algorithm::Dbscan { min_points, .. } if min_points < 2 => {
                Err(ParameterViolation::InvalidMinPoints { min_points })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::KMedoids { k } => write!(f, "K-Medoids (k={k})"),
            Algorithm::Dbscan {
                epsilon,
                min_points,
            } => write!(f, "DBSCAN (eps={epsilon}, min_points={min_points})"),
        }
    }
}

/// Labels of a finished fit plus what each algorithm reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ClusterRun {
    KMedoids {
        k: usize,
        labels: Vec<i32>,
        /// Row index of each cluster's medoid.
        medoids: Vec<usize>,
        iterations: usize,
        converged: bool,
    },
    Dbscan {
        epsilon: f64,
        min_points: usize,
        labels: Vec<i32>,
        clusters: usize,
        noise: usize,
    },
}

impl ClusterRun {
    pub fn labels(&self) -> &[i32] {
        match self {
            ClusterRun::KMedoids { labels, .. } | ClusterRun::Dbscan { labels, .. } => labels,
        }
    }

    /// Number of non-noise clusters.
    pub fn cluster_count(&self) -> usize {
        match self {
            ClusterRun::KMedoids { k, .. } => *k,
            ClusterRun::Dbscan { clusters, .. } => *clusters,
        }
    }

    pub fn noise_count(&self) -> usize {
        match self {
            ClusterRun::KMedoids { .. } => 0,
            ClusterRun::Dbscan { noise, .. } => *noise,
        }
    }
}

/// Fits `algorithm` on an already scaled matrix.
pub fn fit(
    scaled: &Array2<f64>,
    algorithm: &Algorithm,
    options: &KMedoidsOptions,
) -> Result<ClusterRun, ParameterViolation> {
    algorithm.validate()?;
    match *algorithm {
        Algorithm::KMedoids { k } => {
            let fit = kmedoids::fit_kmedoids(scaled, k, options)?;
            Ok(ClusterRun::KMedoids {
                k,
                labels: fit.labels,
                medoids: fit.medoids,
                iterations: fit.iterations,
                converged: fit.converged,
            })
        }
        Algorithm::Dbscan {
            epsilon,
            min_points,
        } => {
            let fit = dbscan::fit_dbscan(scaled, epsilon, min_points)?;
            Ok(ClusterRun::Dbscan {
                epsilon,
                min_points,
                labels: fit.labels,
                clusters: fit.clusters,
                noise: fit.noise,
            })
        }
    }
}
