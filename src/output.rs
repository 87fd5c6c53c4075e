//! Output formatting and persistence for clustering results.
//!
//! Supports console tables, CSV and JSON exports, and a CSV run log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled, settings::Style};
use tracing::{debug, info};

use crate::analysis::quality::interpret;
use crate::analysis::utility::percentage;
use crate::pipeline::ClusteringResult;

/// One sub-district with its assignment.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct AssignmentRow {
    #[tabled(rename = "Sub-district")]
    pub sub_district: String,
    #[tabled(rename = "Cluster")]
    pub cluster: i32,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Population", display_with = "display_count")]
    pub population: Option<u64>,
    #[tabled(rename = "Disabled", display_with = "display_count")]
    pub disabled_population: Option<u64>,
    #[tabled(rename = "Elderly", display_with = "display_count")]
    pub elderly_population: Option<u64>,
}

/// Per-cluster means of the raw features.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Cluster")]
    pub cluster: i32,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Members")]
    pub members: usize,
    #[tabled(rename = "RW", display_with = "display_mean")]
    pub affected_rw_count: f64,
    #[tabled(rename = "Households", display_with = "display_mean")]
    pub affected_household_count: f64,
    #[tabled(rename = "People", display_with = "display_mean")]
    pub affected_population_count: f64,
    #[tabled(rename = "MeanHeight", display_with = "display_mean")]
    pub mean_water_height: f64,
    #[tabled(rename = "MaxHeight", display_with = "display_mean")]
    pub max_water_height: f64,
    #[tabled(rename = "Score", display_with = "display_mean")]
    pub aggregate_score: f64,
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct DistributionRow {
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Sub-districts")]
    pub sub_districts: usize,
    #[tabled(rename = "Share", display_with = "display_percent")]
    pub share: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SilhouetteRow {
    pub cluster: i32,
    pub sub_district: String,
    pub silhouette: f64,
}

/// One line of the run log.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub scope: String,
    pub algorithm: String,
    pub parameters: String,
    pub rows: usize,
    pub clusters: usize,
    pub noise: usize,
    pub silhouette: Option<f64>,
    pub fingerprint: String,
}

fn display_count(v: &Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
}

fn display_mean(v: &f64) -> String {
    format!("{v:.2}")
}

fn display_percent(v: &f64) -> String {
    format!("{v:.1}%")
}

pub fn assignment_rows(result: &ClusteringResult) -> Vec<AssignmentRow> {
    result
        .assignments()
        .map(|(row, cluster, category)| AssignmentRow {
            sub_district: row.sub_district.clone(),
            cluster,
            category: category.to_string(),
            population: row.demographics.map(|d| d.population),
            disabled_population: row.demographics.map(|d| d.disabled_population),
            elderly_population: row.demographics.map(|d| d.elderly_population),
        })
        .collect()
}

pub fn summary_rows(result: &ClusteringResult) -> Vec<SummaryRow> {
    result
        .summary
        .iter()
        .map(|s| SummaryRow {
            cluster: s.cluster,
            category: s.category.clone(),
            members: s.members,
            affected_rw_count: s.means.affected_rw_count,
            affected_household_count: s.means.affected_household_count,
            affected_population_count: s.means.affected_population_count,
            mean_water_height: s.means.mean_water_height,
            max_water_height: s.means.max_water_height,
            aggregate_score: s.aggregate_score,
        })
        .collect()
}

/// Sub-districts per category, in severity order.
pub fn distribution_rows(result: &ClusteringResult) -> Vec<DistributionRow> {
    let total = result.rows.len();
    result
        .summary
        .iter()
        .map(|s| DistributionRow {
            category: s.category.clone(),
            sub_districts: s.members,
            share: percentage(s.members, total),
        })
        .collect()
}

/// Silhouette values grouped by cluster, best first within each cluster.
pub fn silhouette_rows(result: &ClusteringResult) -> Vec<SilhouetteRow> {
    result
        .quality
        .sorted_samples()
        .into_iter()
        .map(|s| SilhouetteRow {
            cluster: s.cluster,
            sub_district: result.rows[s.row].sub_district.clone(),
            silhouette: s.value,
        })
        .collect()
}

pub fn run_record(result: &ClusteringResult) -> RunRecord {
    RunRecord {
        timestamp: result.computed_at,
        scope: result.params.scope.to_string(),
        algorithm: result.params.algorithm.name().to_string(),
        parameters: result.params.algorithm.to_string(),
        rows: result.rows.len(),
        clusters: result.run.cluster_count(),
        noise: result.run.noise_count(),
        silhouette: result.quality.score(),
        fingerprint: result.fingerprint.clone(),
    }
}

pub fn render_table<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return "(no rows)".into();
    }
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Human-readable report of a result: header, summary and distribution.
pub fn render_report(result: &ClusteringResult) -> String {
    let mut out = format!(
        "{} | {} | {} sub-districts\n",
        result.params.scope,
        result.params.algorithm,
        result.rows.len()
    );
    match result.quality.score() {
        Some(score) => out.push_str(&format!(
            "Silhouette: {} ({})\n",
            result.quality.display(),
            interpret(score)
        )),
        None => out.push_str("Silhouette: N/A\n"),
    }
    let medoids = result.medoid_names();
    if !medoids.is_empty() {
        out.push_str(&format!("Medoids: {}\n", medoids.join(", ")));
    }
    if result.run.noise_count() > 0 {
        out.push_str(&format!("Noise points: {}\n", result.run.noise_count()));
    }
    for notice in &result.notices {
        out.push_str(&format!("Note: {notice}\n"));
    }

    out.push('\n');
    out.push_str(&render_table(&summary_rows(result)));
    out.push_str("\n\n");
    out.push_str(&render_table(&distribution_rows(result)));
    out.push('\n');
    out
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes every export of `result` into `dir` and appends it to `runs.csv`.
#[tracing::instrument(skip(result), fields(dir = %dir.display()))]
pub fn export_result(dir: &Path, result: &ClusteringResult) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::new();

    let path = dir.join("assignments.csv");
    write_csv(&path, &assignment_rows(result))?;
    written.push(path);

    let path = dir.join("clusters.csv");
    write_csv(&path, &summary_rows(result))?;
    written.push(path);

    let silhouettes = silhouette_rows(result);
    if !silhouettes.is_empty() {
        let path = dir.join("silhouette.csv");
        write_csv(&path, &silhouettes)?;
        written.push(path);
    }

    let path = dir.join("result.json");
    write_json(&path, result)?;
    written.push(path);

    append_record(&dir.join("runs.csv"), &run_record(result))?;

    info!(files = written.len(), "Result exported");
    Ok(written)
}
