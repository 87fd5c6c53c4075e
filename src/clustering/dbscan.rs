//! Density-based clustering through `linfa_clustering::Dbscan`.
//!
//! A row is a core point when at least `min_points` rows (itself included)
//! lie within `epsilon`. Cluster ids are renumbered contiguously from 0 in
//! order of first appearance; rows reached by no core point stay at
//! [`NOISE`].

use linfa::prelude::*;
use linfa_clustering::Dbscan;
use ndarray::Array2;
use std::collections::HashMap;

use super::NOISE;
use crate::error::ParameterViolation;

#[derive(Debug, Clone, PartialEq)]
pub struct DbscanFit {
    pub labels: Vec<i32>,
    pub clusters: usize,
    pub noise: usize,
}

pub fn fit_dbscan(
    matrix: &Array2<f64>,
    epsilon: f64,
    min_points: usize,
) -> Result<DbscanFit, ParameterViolation> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(ParameterViolation::InvalidEpsilon { epsilon });
    }
    if min_points < 2 {
        return Err(ParameterViolation::InvalidMinPoints { min_points });
    }

    let memberships = Dbscan::params(min_points)
        .tolerance(epsilon)
        .check()
        .map_err(|_| ParameterViolation::InvalidEpsilon { epsilon })?
        .transform(matrix);

    let mut renumbered: HashMap<usize, i32> = HashMap::new();
    let labels: Vec<i32> = memberships
        .iter()
        .map(|membership| match membership {
            Some(id) => {
                let next = renumbered.len() as i32;
                *renumbered.entry(*id).or_insert(next)
            }
            None => NOISE,
        })
        .collect();

    let noise = labels.iter().filter(|l| **l == NOISE).count();
    Ok(DbscanFit {
        labels,
        clusters: renumbered.len(),
        noise,
    })
}
