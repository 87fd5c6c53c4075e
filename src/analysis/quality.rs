//! Silhouette scoring of a cluster assignment.
//!
//! Noise rows are left out before scoring. The overall score comes from
//! linfa's `SilhouetteScore`; the per-sample values behind the silhouette
//! export are computed here as `(b - a) / max(a, b)`, where `a` is the mean
//! distance to the rest of the sample's cluster and `b` the smallest mean
//! distance to another cluster. Samples in singleton clusters score 0.

use linfa::DatasetBase;
use linfa::metrics::SilhouetteScore;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::collections::BTreeMap;

use super::utility::mean;
use crate::clustering::NOISE;
use crate::clustering::distance::pairwise;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SilhouetteSample {
    /// Index of the row in the clustered matrix.
    pub row: usize,
    pub cluster: i32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Quality {
    Score {
        score: f64,
        samples: Vec<SilhouetteSample>,
    },
    NotApplicable {
        reason: String,
    },
}

impl Quality {
    pub fn score(&self) -> Option<f64> {
        match self {
            Quality::Score { score, .. } => Some(*score),
            Quality::NotApplicable { .. } => None,
        }
    }

    /// Score with three decimals, or "N/A".
    pub fn display(&self) -> String {
        match self {
            Quality::Score { score, .. } => format!("{score:.3}"),
            Quality::NotApplicable { .. } => "N/A".into(),
        }
    }

    /// Samples grouped by cluster, each group sorted by descending value.
    pub fn sorted_samples(&self) -> Vec<SilhouetteSample> {
        let Quality::Score { samples, .. } = self else {
            return Vec::new();
        };
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| {
            a.cluster
                .cmp(&b.cluster)
                .then(b.value.total_cmp(&a.value))
        });
        sorted
    }
}

pub fn evaluate(matrix: &Array2<f64>, labels: &[i32]) -> Quality {
    let kept: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] != NOISE).collect();

    let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (pos, &row) in kept.iter().enumerate() {
        members.entry(labels[row]).or_default().push(pos);
    }
    if members.len() < 2 {
        return Quality::NotApplicable {
            reason: format!(
                "silhouette needs at least 2 clusters, found {}",
                members.len()
            ),
        };
    }

    let records = matrix.select(Axis(0), &kept);
    let dist = pairwise(&records);
    let mean_to = |pos: usize, group: &[usize]| -> f64 {
        let values: Vec<f64> = group
            .iter()
            .filter(|&&other| other != pos)
            .map(|&other| dist[[pos, other]])
            .collect();
        mean(&values)
    };

    let samples: Vec<SilhouetteSample> = kept
        .iter()
        .enumerate()
        .map(|(pos, &row)| {
            let cluster = labels[row];
            let own = &members[&cluster];
            let value = if own.len() == 1 {
                0.0
            } else {
                let a = mean_to(pos, own);
                let b = members
                    .iter()
                    .filter(|(c, _)| **c != cluster)
                    .map(|(_, group)| mean_to(pos, group))
                    .fold(f64::INFINITY, f64::min);
                let denom = a.max(b);
                if denom > 0.0 { (b - a) / denom } else { 0.0 }
            };
            SilhouetteSample {
                row,
                cluster,
                value,
            }
        })
        .collect();

    let targets: Array1<usize> = kept.iter().map(|&row| labels[row] as usize).collect();
    match DatasetBase::new(records, targets).silhouette_score() {
        Ok(score) if score.is_finite() => Quality::Score { score, samples },
        Ok(_) => Quality::NotApplicable {
            reason: "silhouette is undefined when every row coincides".into(),
        },
        Err(e) => Quality::NotApplicable {
            reason: format!("silhouette could not be computed: {e}"),
        },
    }
}

/// Describes a silhouette score.
///
/// | Range   | Meaning   |
/// |---------|-----------|
/// | >= 0.7  | excellent |
/// | >= 0.5  | good      |
/// | >= 0.3  | fair      |
/// | < 0.3   | poor      |
pub fn interpret(score: f64) -> String {
    match score {
        s if s >= 0.7 => "excellent".into(),
        s if s >= 0.5 => "good".into(),
        s if s >= 0.3 => "fair".into(),
        _ => "poor".into(),
    }
}
