use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{FloodStore, TableChecksum, UpdateReport, apply_update};
use crate::model::IncidentRecord;

/// In-process tables keyed by year.
///
/// Counts reads so callers can observe cache behaviour, and can be switched
/// offline to simulate an unreachable store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<u16, Vec<IncidentRecord>>>,
    fetches: AtomicUsize,
    checksums: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(self, year: u16, rows: Vec<IncidentRecord>) -> Self {
        self.insert_year(year, rows);
        self
    }

    pub fn insert_year(&self, year: u16, rows: Vec<IncidentRecord>) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.insert(year, rows);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `fetch_year` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `checksum_year` calls served so far.
    pub fn checksum_count(&self) -> usize {
        self.checksums.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("store is offline");
        }
        Ok(())
    }

    fn snapshot(&self, year: u16) -> Vec<IncidentRecord> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(&year).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl FloodStore for MemoryStore {
    async fn fetch_year(&self, year: u16) -> Result<Vec<IncidentRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let mut rows = self.snapshot(year);
        rows.sort_by(|a, b| a.sub_district.cmp(&b.sub_district));
        Ok(rows)
    }

    async fn checksum_year(&self, year: u16) -> Result<TableChecksum> {
        self.checksums.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(TableChecksum::from_records(&self.snapshot(year)))
    }

    async fn update_year(&self, year: u16, rows: &[IncidentRecord]) -> Result<Vec<UpdateReport>> {
        self.check_online()?;
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        match tables.get_mut(&year) {
            Some(table) if !table.is_empty() => Ok(apply_update(table, rows)),
            _ => anyhow::bail!("no table for year {year} in memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_reads() {
        let store = MemoryStore::new().with_year(
            2020,
            vec![IncidentRecord {
                sub_district: "B".into(),
                ..Default::default()
            }],
        );

        store.fetch_year(2020).await.unwrap();
        store.checksum_year(2020).await.unwrap();
        store.checksum_year(2021).await.unwrap();

        assert_eq!(store.fetch_count(), 1);
        assert_eq!(store.checksum_count(), 2);
    }

    #[tokio::test]
    async fn test_update_of_missing_year_is_error() {
        let store = MemoryStore::new().with_year(2020, Vec::new());
        let upload = vec![IncidentRecord {
            sub_district: "B".into(),
            ..Default::default()
        }];

        for year in [2020, 2021] {
            let err = store.update_year(year, &upload).await.unwrap_err();
            assert!(err.to_string().contains(&format!("no table for year {year}")));
        }
        assert!(store.fetch_year(2021).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_fails() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.fetch_year(2020).await.is_err());
    }
}
