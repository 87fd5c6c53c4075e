//! Backing store for the per-year incident tables.
//!
//! [`FloodStore`] is the async trait the pipeline reads from and the bulk
//! updater writes to. [`CsvDirStore`] keeps one CSV file per year on disk;
//! [`MemoryStore`] keeps the tables in process.

mod csv_dir;
mod memory;

pub use csv_dir::{CsvDirStore, read_records};
pub use memory::MemoryStore;

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::model::{IncidentRecord, normalize_name};

/// Checksum of one table: the sum of every impact feature plus the row count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TableChecksum {
    pub checksum: f64,
    pub row_count: u64,
}

impl TableChecksum {
    pub fn from_records(records: &[IncidentRecord]) -> Self {
        Self {
            checksum: records.iter().map(IncidentRecord::checksum).sum(),
            row_count: records.len() as u64,
        }
    }

    /// Combines the checksums of several tables.
    pub fn merge(self, other: TableChecksum) -> Self {
        Self {
            checksum: self.checksum + other.checksum,
            row_count: self.row_count + other.row_count,
        }
    }
}

/// Outcome of applying one uploaded row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Updated,
    /// The sub-district does not exist in the target table.
    Skipped,
    NotUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub sub_district: String,
    pub status: UpdateStatus,
    pub rows_affected: usize,
}

/// Row source and bulk-update target keyed by year.
#[async_trait::async_trait]
pub trait FloodStore: Send + Sync {
    /// All rows of `year`, ordered by sub-district ascending.
    async fn fetch_year(&self, year: u16) -> Result<Vec<IncidentRecord>>;

    /// Checksum of `year` without materializing the ordered rows.
    async fn checksum_year(&self, year: u16) -> Result<TableChecksum> {
        let rows = self.fetch_year(year).await?;
        Ok(TableChecksum::from_records(&rows))
    }

    /// Overwrites every field of the rows whose normalized name matches an
    /// uploaded row, one uploaded row at a time.
    async fn update_year(&self, year: u16, rows: &[IncidentRecord]) -> Result<Vec<UpdateReport>>;
}

/// Bounds a store call; an elapsed limit is reported as a store failure.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "store {operation} timed out after {}s",
            limit.as_secs_f64()
        )),
    }
}

/// Applies uploaded rows to a table in upload order.
///
/// Names are matched after normalization; a row whose stored values already
/// equal the upload is reported as [`UpdateStatus::NotUpdated`].
pub(crate) fn apply_update(
    table: &mut [IncidentRecord],
    uploads: &[IncidentRecord],
) -> Vec<UpdateReport> {
    let known: HashSet<String> = table
        .iter()
        .map(|r| normalize_name(&r.sub_district))
        .collect();

    uploads
        .iter()
        .map(|upload| {
            let key = normalize_name(&upload.sub_district);
            if !known.contains(&key) {
                return UpdateReport {
                    sub_district: upload.sub_district.clone(),
                    status: UpdateStatus::Skipped,
                    rows_affected: 0,
                };
            }

            let mut rows_affected = 0;
            for row in table
                .iter_mut()
                .filter(|r| normalize_name(&r.sub_district) == key)
            {
                let updated = IncidentRecord {
                    sub_district: row.sub_district.clone(),
                    ..upload.clone()
                };
                if *row != updated {
                    *row = updated;
                    rows_affected += 1;
                }
            }

            UpdateReport {
                sub_district: upload.sub_district.clone(),
                status: if rows_affected > 0 {
                    UpdateStatus::Updated
                } else {
                    UpdateStatus::NotUpdated
                },
                rows_affected,
            }
        })
        .collect()
}
