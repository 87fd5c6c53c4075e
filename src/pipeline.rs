//! One clustering run from scope selection to a committed session result.
//!
//! fingerprint -> load -> scale -> fit -> evaluate + categorize -> commit.

use anyhow::Result;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::quality::{self, Quality};
use crate::analysis::severity::{self, ClusterSummary};
use crate::clustering::{self, Algorithm, ClusterRun, KMedoidsOptions, min_max_scale};
use crate::config::Settings;
use crate::error::{ParameterViolation, PipelineError};
use crate::fingerprint::FingerprintService;
use crate::loader::{DataLoader, Loaded};
use crate::model::{FEATURE_NAMES, IncidentRecord, Observation, Scope, feature_matrix};
use crate::session::Session;
use crate::store::{FloodStore, TableChecksum, UpdateReport, UpdateStatus, with_timeout};

/// Everything that identifies a clustering request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunParams {
    pub scope: Scope,
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusteringResult {
    pub params: RunParams,
    pub fingerprint: String,
    pub rows: Vec<Observation>,
    #[serde(skip)]
    pub scaled: Array2<f64>,
    pub run: ClusterRun,
    /// Severity category per row.
    pub categories: Vec<String>,
    pub mapping: BTreeMap<i32, String>,
    pub quality: Quality,
    pub summary: Vec<ClusterSummary>,
    /// Conditions worth showing next to the result, e.g. a single DBSCAN cluster.
    pub notices: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl ClusteringResult {
    pub fn labels(&self) -> &[i32] {
        self.run.labels()
    }

    /// Sub-districts chosen as medoids, in cluster order. Empty for DBSCAN.
    pub fn medoid_names(&self) -> Vec<&str> {
        match &self.run {
            ClusterRun::KMedoids { medoids, .. } => medoids
                .iter()
                .map(|&m| self.rows[m].sub_district.as_str())
                .collect(),
            ClusterRun::Dbscan { .. } => Vec::new(),
        }
    }

    /// `(sub_district, cluster, category)` per row.
    pub fn assignments(&self) -> impl Iterator<Item = (&Observation, i32, &str)> {
        self.rows
            .iter()
            .zip(self.labels())
            .zip(&self.categories)
            .map(|((row, &label), category)| (row, label, category.as_str()))
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Arc<ClusteringResult>),
    /// The scope has no rows to cluster.
    Empty,
}

pub struct Pipeline<S: FloodStore> {
    store: S,
    fingerprints: FingerprintService,
    loader: DataLoader,
    kmedoids: KMedoidsOptions,
    timeout: Duration,
}

impl<S: FloodStore> Pipeline<S> {
    pub fn new(store: S, settings: &Settings) -> Self {
        Self {
            store,
            fingerprints: FingerprintService::new(
                settings.fingerprint_ttl,
                settings.store_timeout,
                settings.fallback_alert,
            ),
            loader: DataLoader::new(settings.data_ttl, settings.store_timeout),
            kmedoids: settings.kmedoids,
            timeout: settings.store_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn fingerprint(&mut self, scope: Scope) -> String {
        self.fingerprints.compute(&self.store, scope).await
    }

    /// Runs the full pipeline for `params` and commits the result to `session`.
    ///
    /// A stored result for different parameters is discarded first; on error
    /// the session is left without a result for `params`.
    #[tracing::instrument(skip(self, session, params), fields(scope = %params.scope, algorithm = %params.algorithm))]
    pub async fn run(
        &mut self,
        session: &mut Session,
        params: &RunParams,
    ) -> Result<RunOutcome, PipelineError> {
        session.select(params);

        let fingerprint = self.fingerprints.compute(&self.store, params.scope).await;
        let rows = match self
            .loader
            .load(&self.store, params.scope, &fingerprint)
            .await
            .map_err(PipelineError::Store)?
        {
            Loaded::Rows(rows) => rows,
            Loaded::Empty => {
                info!("No rows for scope");
                return Ok(RunOutcome::Empty);
            }
        };

        let matrix = feature_matrix(&rows);
        if let Some(((row, col), bad)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::Computation(format!(
                "non-finite {} ({bad}) for {}",
                FEATURE_NAMES[col], rows[row].sub_district
            )));
        }
        let scaled = min_max_scale(&matrix);

        let run = clustering::fit(&scaled, &params.algorithm, &self.kmedoids)?;
        let mut notices = Vec::new();
        match &run {
            ClusterRun::Dbscan { clusters: 0, .. } => {
                return Err(ParameterViolation::AllNoise { rows: rows.len() }.into());
            }
            ClusterRun::Dbscan { clusters: 1, .. } => {
                notices.push(
                    "only one cluster formed, quality cannot be scored; \
                     adjust epsilon or min_points"
                        .to_string(),
                );
            }
            ClusterRun::KMedoids {
                converged: false,
                iterations,
                ..
            } => {
                notices.push(format!(
                    "k-medoids stopped after {iterations} iterations without converging"
                ));
            }
            _ => {}
        }

        let quality = quality::evaluate(&scaled, run.labels());
        let categorization = severity::categorize(&rows, run.labels());

        info!(
            rows = rows.len(),
            clusters = run.cluster_count(),
            noise = run.noise_count(),
            silhouette = %quality.display(),
            "Clustering complete"
        );

        let result = Arc::new(ClusteringResult {
            params: params.clone(),
            fingerprint,
            rows,
            scaled,
            run,
            categories: categorization.categories,
            mapping: categorization.mapping,
            quality,
            summary: categorization.summary,
            notices,
            computed_at: Utc::now(),
        });
        session.commit(result.clone());
        Ok(RunOutcome::Completed(result))
    }

    /// Bulk-updates `year` and drops every cached fingerprint and data load,
    /// so the next run reads the new values.
    #[tracing::instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn update_year(
        &mut self,
        year: u16,
        rows: &[IncidentRecord],
    ) -> Result<Vec<UpdateReport>> {
        let reports = with_timeout(self.timeout, "update", self.store.update_year(year, rows)).await;
        // The store may have applied part of the upload before failing.
        self.fingerprints.invalidate();
        self.loader.invalidate();

        let reports = reports?;
        let skipped = reports
            .iter()
            .filter(|r| r.status == UpdateStatus::Skipped)
            .count();
        if skipped > 0 {
            warn!(skipped, "Uploaded rows without a matching sub-district");
        }
        Ok(reports)
    }

    /// Row count and checksum of every supported year.
    pub async fn year_checksums(&self) -> Result<Vec<(u16, TableChecksum)>> {
        let mut out = Vec::new();
        for year in Scope::Aggregated.years() {
            let sum = with_timeout(self.timeout, "checksum", self.store.checksum_year(year)).await?;
            out.push((year, sum));
        }
        Ok(out)
    }
}
