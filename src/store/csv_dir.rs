use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{FloodStore, TableChecksum, UpdateReport, apply_update};
use crate::model::IncidentRecord;

/// Stores each year as `<root>/incidents_<year>.csv`.
///
/// A missing root directory means the store is unreachable. A missing year
/// file is read as an empty table. File I/O runs on tokio's blocking pool so
/// callers can bound it with [`super::with_timeout`].
pub struct CsvDirStore {
    root: PathBuf,
}

impl CsvDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn year_path(&self, year: u16) -> PathBuf {
        self.root.join(format!("incidents_{year}.csv"))
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("store task panicked")?
}

fn ensure_reachable(root: &Path) -> Result<()> {
    if !root.is_dir() {
        anyhow::bail!("data directory '{}' is not reachable", root.display());
    }
    Ok(())
}

fn read_year(root: &Path, path: &Path) -> Result<Vec<IncidentRecord>> {
    ensure_reachable(root)?;
    if !path.exists() {
        debug!(path = %path.display(), "No table for year");
        return Ok(Vec::new());
    }

    read_records(path)
}

fn write_year(path: &Path, rows: &[IncidentRecord]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");

    {
        let mut writer = WriterBuilder::new().has_headers(true).from_path(&tmp)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Reads incident rows from a CSV file with an `IncidentRecord` header.
///
/// Empty cells are read as missing values.
pub fn read_records(path: &Path) -> Result<Vec<IncidentRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let record: IncidentRecord = result.with_context(|| format!("reading {}", path.display()))?;
        rows.push(record);
    }
    Ok(rows)
}

#[async_trait::async_trait]
impl FloodStore for CsvDirStore {
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    async fn fetch_year(&self, year: u16) -> Result<Vec<IncidentRecord>> {
        let (root, path) = (self.root.clone(), self.year_path(year));
        let mut rows = blocking(move || read_year(&root, &path)).await?;
        rows.sort_by(|a, b| a.sub_district.cmp(&b.sub_district));
        debug!(rows = rows.len(), "Year table read");
        Ok(rows)
    }

    async fn checksum_year(&self, year: u16) -> Result<TableChecksum> {
        let (root, path) = (self.root.clone(), self.year_path(year));
        let rows = blocking(move || read_year(&root, &path)).await?;
        Ok(TableChecksum::from_records(&rows))
    }

    #[tracing::instrument(skip(self, rows), fields(uploaded = rows.len()))]
    async fn update_year(&self, year: u16, rows: &[IncidentRecord]) -> Result<Vec<UpdateReport>> {
        let (root, path) = (self.root.clone(), self.year_path(year));
        let uploads = rows.to_vec();

        let reports = blocking(move || {
            let mut table = read_year(&root, &path)?;
            if table.is_empty() {
                anyhow::bail!("no table for year {year} in '{}'", root.display());
            }
            let reports = apply_update(&mut table, &uploads);
            write_year(&path, &table)?;
            Ok(reports)
        })
        .await?;

        info!(year, "Year table rewritten");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UpdateStatus;

    const HEADER: &str = "sub_district,affected_rw_count,affected_household_count,affected_population_count,mean_water_height,max_water_height,population,disabled_population,elderly_population\n";

    fn store_with(year: u16, body: &str) -> (tempfile::TempDir, CsvDirStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(format!("incidents_{year}.csv")),
            format!("{HEADER}{body}"),
        )
        .unwrap();
        let store = CsvDirStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_fetch_orders_by_name_and_reads_nulls() {
        let (_dir, store) = store_with(
            2019,
            "Tebet,3,10,40,0.5,1.2,,,\nCilandak,1,,12,0.2,0.4,900,4,70\n",
        );

        let rows = store.fetch_year(2019).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sub_district, "Cilandak");
        assert_eq!(rows[0].affected_household_count, None);
        assert_eq!(rows[0].population, Some(900));
        assert_eq!(rows[1].population, None);
    }

    #[tokio::test]
    async fn test_missing_year_is_empty() {
        let (_dir, store) = store_with(2019, "");
        assert!(store.fetch_year(2020).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_error() {
        let store = CsvDirStore::new("/definitely/not/a/flood/dir");
        assert!(store.fetch_year(2019).await.is_err());
        assert!(store.checksum_year(2019).await.is_err());
    }

    #[tokio::test]
    async fn test_update_of_missing_year_is_error() {
        let (_dir, store) = store_with(2019, "Tebet,3,10,40,0.5,1.2,,,\n");
        let upload = vec![IncidentRecord {
            sub_district: "Tebet".into(),
            ..Default::default()
        }];

        let err = store.update_year(2020, &upload).await.unwrap_err();
        assert!(err.to_string().contains("no table for year 2020"));
        assert!(!store.year_path(2020).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_read_is_bounded_by_timeout() {
        use crate::store::with_timeout;
        use std::time::{Duration, Instant};

        let (dir, store) = store_with(2018, "");
        // A FIFO without a writer blocks `open` until one appears.
        let fifo = dir.path().join("incidents_2019.csv");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success());

        let started = Instant::now();
        let err = with_timeout(
            Duration::from_millis(100),
            "fetch",
            store.fetch_year(2019),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));

        // Release the blocked reader so the runtime can shut down.
        fs::write(&fifo, HEADER).unwrap();
    }

    #[tokio::test]
    async fn test_update_rewrites_file() {
        let (_dir, store) = store_with(2019, "Tebet,3,10,40,0.5,1.2,,,\n");
        let upload = vec![IncidentRecord {
            sub_district: "tebet".into(),
            affected_rw_count: Some(8.0),
            ..Default::default()
        }];

        let reports = store.update_year(2019, &upload).await.unwrap();
        assert_eq!(reports[0].status, UpdateStatus::Updated);

        let rows = store.fetch_year(2019).await.unwrap();
        assert_eq!(rows[0].sub_district, "Tebet");
        assert_eq!(rows[0].affected_rw_count, Some(8.0));
        assert_eq!(rows[0].max_water_height, None);
    }
}
