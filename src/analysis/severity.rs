//! Maps cluster labels to ordered severity categories.
//!
//! Clusters are ranked by the mean of their per-feature means, computed on
//! the raw feature values, and named from a vocabulary sized to the number of
//! non-noise clusters. Noise is always [`OUTLIER`].

use serde::Serialize;
use std::collections::BTreeMap;

use super::utility::mean;
use crate::clustering::NOISE;
use crate::model::{FEATURE_COUNT, ImpactFeatures, Observation};

pub const OUTLIER: &str = "Outlier";

/// Category names from least to most severe for `clusters` clusters.
///
/// Sizes outside 2..=7 fall back to `Cluster 0`, `Cluster 1`, ...
pub fn vocabulary(clusters: usize) -> Vec<String> {
    let names: &[&str] = match clusters {
        2 => &["Low", "High"],
        3 => &["Low", "Medium", "High"],
        4 => &["Very Low", "Low", "Medium", "High"],
        5 => &["Very Low", "Low", "Medium", "High", "Very High"],
        6 => &["Very Low", "Low", "Fairly Low", "Medium", "High", "Very High"],
        7 => &[
            "Very Low",
            "Low",
            "Fairly Low",
            "Medium",
            "Fairly High",
            "High",
            "Very High",
        ],
        n => return (0..n).map(|i| format!("Cluster {i}")).collect(),
    };
    names.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: i32,
    pub category: String,
    pub members: usize,
    /// Per-feature means over the cluster's raw values.
    pub means: ImpactFeatures,
    pub aggregate_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Categorization {
    /// Category of each row, aligned with the input rows.
    pub categories: Vec<String>,
    pub mapping: BTreeMap<i32, String>,
    /// One entry per cluster, least severe first; noise last if present.
    pub summary: Vec<ClusterSummary>,
}

pub fn categorize(rows: &[Observation], labels: &[i32]) -> Categorization {
    let mut groups: BTreeMap<i32, Vec<[f64; FEATURE_COUNT]>> = BTreeMap::new();
    for (row, &label) in rows.iter().zip(labels) {
        groups
            .entry(label)
            .or_default()
            .push(row.features.to_array());
    }

    let summaries: Vec<ClusterSummary> = groups
        .iter()
        .map(|(&cluster, values)| {
            let means = ImpactFeatures::from_array(std::array::from_fn(|f| {
                mean(&values.iter().map(|v| v[f]).collect::<Vec<_>>())
            }));
            ClusterSummary {
                cluster,
                category: String::new(),
                members: values.len(),
                aggregate_score: mean(&means.to_array()),
                means,
            }
        })
        .collect();

    let (mut ranked, noise): (Vec<_>, Vec<_>) =
        summaries.into_iter().partition(|s| s.cluster != NOISE);
    ranked.sort_by(|a, b| {
        a.aggregate_score
            .total_cmp(&b.aggregate_score)
            .then(a.cluster.cmp(&b.cluster))
    });

    let names = vocabulary(ranked.len());
    for (summary, name) in ranked.iter_mut().zip(names) {
        summary.category = name;
    }
    let mut summary = ranked;
    for mut outliers in noise {
        outliers.category = OUTLIER.into();
        summary.push(outliers);
    }

    let mapping: BTreeMap<i32, String> = summary
        .iter()
        .map(|s| (s.cluster, s.category.clone()))
        .collect();
    let categories = labels.iter().map(|l| mapping[l].clone()).collect();

    Categorization {
        categories,
        mapping,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(level: f64) -> Observation {
        Observation {
            sub_district: format!("S{level}"),
            features: ImpactFeatures::from_array([level; FEATURE_COUNT]),
            demographics: None,
        }
    }

    #[test]
    fn test_vocabulary_sizes() {
        assert_eq!(vocabulary(2), vec!["Low", "High"]);
        assert_eq!(vocabulary(3), vec!["Low", "Medium", "High"]);
        assert_eq!(vocabulary(5)[4], "Very High");
        assert_eq!(vocabulary(7)[4], "Fairly High");
        for n in 2..=7 {
            assert_eq!(vocabulary(n).len(), n);
        }
        assert_eq!(
            vocabulary(8),
            (0..8).map(|i| format!("Cluster {i}")).collect::<Vec<_>>()
        );
        assert_eq!(vocabulary(1), vec!["Cluster 0"]);
    }

    #[test]
    fn test_categories_follow_aggregate_score() {
        let rows = vec![obs(100.0), obs(1.0), obs(50.0), obs(2.0), obs(110.0)];
        let labels = [2, 0, 1, 0, 2];
        let result = categorize(&rows, &labels);

        assert_eq!(result.mapping[&0], "Low");
        assert_eq!(result.mapping[&1], "Medium");
        assert_eq!(result.mapping[&2], "High");
        assert_eq!(
            result.categories,
            vec!["High", "Low", "Medium", "Low", "High"]
        );
        assert_eq!(result.summary[0].members, 2);
        assert_eq!(result.summary[0].aggregate_score, 1.5);
        for pair in result.summary.windows(2) {
            assert!(pair[0].aggregate_score <= pair[1].aggregate_score);
        }
    }

    #[test]
    fn test_label_order_is_irrelevant() {
        // Cluster 0 is the most severe here.
        let rows = vec![obs(9.0), obs(1.0)];
        let result = categorize(&rows, &[0, 1]);
        assert_eq!(result.categories, vec!["High", "Low"]);
    }

    #[test]
    fn test_noise_is_outlier_and_not_counted() {
        let rows = vec![obs(1.0), obs(2.0), obs(10.0), obs(500.0)];
        let result = categorize(&rows, &[0, 0, 1, NOISE]);

        assert_eq!(result.categories[3], OUTLIER);
        assert_eq!(result.mapping[&0], "Low");
        assert_eq!(result.mapping[&1], "High");
        assert_eq!(result.summary.last().map(|s| s.cluster), Some(NOISE));
    }

    #[test]
    fn test_ties_broken_by_label() {
        let rows = vec![obs(5.0), obs(5.0)];
        let result = categorize(&rows, &[1, 0]);
        assert_eq!(result.mapping[&0], "Low");
        assert_eq!(result.mapping[&1], "High");
    }
}
