//! Loads the observation rows for a scope.
//!
//! Single-year scopes read one table. The aggregated scope unions every
//! supported year per sub-district: counts are summed, `mean_water_height`
//! is averaged over the years that report it and `max_water_height` takes
//! the maximum. Demographics come from the most recent year, joined by
//! normalized name.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::model::{
    Demographics, ImpactFeatures, IncidentRecord, Observation, Scope, normalize_name,
};
use crate::store::{FloodStore, with_timeout};

/// Result of a load: rows to cluster, or nothing to cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    Rows(Vec<Observation>),
    Empty,
}

pub struct DataLoader {
    cache: TtlCache<(Scope, String), Loaded>,
    timeout: Duration,
}

impl DataLoader {
    pub fn new(ttl: Duration, timeout: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            timeout,
        }
    }

    /// Rows for `scope`.
    ///
    /// `fingerprint` only keys the cache: the same fingerprint reuses the
    /// previous load within the TTL, a new one forces a fresh read.
    #[tracing::instrument(skip(self, store), fields(scope = %scope))]
    pub async fn load(
        &mut self,
        store: &dyn FloodStore,
        scope: Scope,
        fingerprint: &str,
    ) -> Result<Loaded> {
        let key = (scope, fingerprint.to_string());
        if let Some(hit) = self.cache.get(&key) {
            debug!("Data cache hit");
            return Ok(hit);
        }

        let loaded = if !scope.is_supported() {
            info!("Scope outside supported years");
            Loaded::Empty
        } else {
            let rows = match scope {
                Scope::Year(year) => self.load_year(store, year).await?,
                Scope::Aggregated => self.load_aggregated(store).await?,
            };
            if rows.is_empty() {
                Loaded::Empty
            } else {
                info!(rows = rows.len(), "Observations loaded");
                Loaded::Rows(rows)
            }
        };

        // Entries for older fingerprints of this scope can never be hit again.
        self.cache.retain(|(s, _)| *s != scope);
        self.cache.insert(key, loaded.clone());
        Ok(loaded)
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    async fn fetch(&self, store: &dyn FloodStore, year: u16) -> Result<Vec<IncidentRecord>> {
        with_timeout(self.timeout, "fetch", store.fetch_year(year)).await
    }

    async fn load_year(&self, store: &dyn FloodStore, year: u16) -> Result<Vec<Observation>> {
        let mut rows: Vec<Observation> = self
            .fetch(store, year)
            .await?
            .into_iter()
            .map(|r| Observation {
                sub_district: r.sub_district.trim().to_string(),
                features: r.features(),
                demographics: r.demographics(),
            })
            .collect();
        rows.sort_by(|a, b| a.sub_district.cmp(&b.sub_district));
        Ok(rows)
    }

    async fn load_aggregated(&self, store: &dyn FloodStore) -> Result<Vec<Observation>> {
        let mut tables = Vec::new();
        let mut demographics: HashMap<String, Demographics> = HashMap::new();
        for year in Scope::Aggregated.years() {
            let table = self.fetch(store, year).await?;
            if year == Scope::latest_year() {
                demographics = table
                    .iter()
                    .filter_map(|r| Some((normalize_name(&r.sub_district), r.demographics()?)))
                    .collect();
            }
            tables.push(table);
        }

        Ok(aggregate(tables.iter().flatten(), &demographics))
    }
}

#[derive(Default)]
struct Acc {
    rw: f64,
    households: f64,
    people: f64,
    mean_height_sum: f64,
    mean_height_n: usize,
    max_height: Option<f64>,
}

/// Groups rows of several years by sub-district, ordered by name.
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a IncidentRecord>,
    demographics: &HashMap<String, Demographics>,
) -> Vec<Observation> {
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();

    for r in records {
        let acc = groups
            .entry(r.sub_district.trim().to_string())
            .or_default();
        acc.rw += r.affected_rw_count.unwrap_or(0.0);
        acc.households += r.affected_household_count.unwrap_or(0.0);
        acc.people += r.affected_population_count.unwrap_or(0.0);
        if let Some(h) = r.mean_water_height {
            acc.mean_height_sum += h;
            acc.mean_height_n += 1;
        }
        if let Some(h) = r.max_water_height {
            acc.max_height = Some(acc.max_height.map_or(h, |m| m.max(h)));
        }
    }

    groups
        .into_iter()
        .map(|(name, acc)| {
            let mean_water_height = if acc.mean_height_n == 0 {
                0.0
            } else {
                acc.mean_height_sum / acc.mean_height_n as f64
            };
            Observation {
                demographics: demographics.get(&normalize_name(&name)).copied(),
                sub_district: name,
                features: ImpactFeatures {
                    affected_rw_count: acc.rw,
                    affected_household_count: acc.households,
                    affected_population_count: acc.people,
                    mean_water_height,
                    max_water_height: acc.max_height.unwrap_or(0.0),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn row(name: &str, rw: f64, mean: Option<f64>, max: Option<f64>) -> IncidentRecord {
        IncidentRecord {
            sub_district: name.into(),
            affected_rw_count: Some(rw),
            affected_household_count: Some(rw * 10.0),
            affected_population_count: Some(rw * 30.0),
            mean_water_height: mean,
            max_water_height: max,
            ..Default::default()
        }
    }

    fn loader() -> DataLoader {
        DataLoader::new(Duration::from_secs(600), Duration::from_secs(5))
    }

    #[test]
    fn test_aggregate_sums_averages_and_maxes() {
        let records = vec![
            row("X", 2.0, Some(0.4), Some(1.0)),
            row("X", 3.0, None, Some(2.5)),
            row("X", 0.0, Some(0.8), None),
            row("A", 1.0, None, None),
        ];
        let out = aggregate(&records, &HashMap::new());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sub_district, "A");
        assert_eq!(out[0].features.mean_water_height, 0.0);
        assert_eq!(out[0].features.max_water_height, 0.0);

        let x = &out[1];
        assert_eq!(x.features.affected_rw_count, 5.0);
        assert_eq!(x.features.affected_household_count, 50.0);
        assert!((x.features.mean_water_height - 0.6).abs() < 1e-12);
        assert_eq!(x.features.max_water_height, 2.5);
    }

    #[tokio::test]
    async fn test_aggregated_scope_joins_latest_demographics() {
        let mut latest = row(" x", 0.0, None, None);
        latest.population = Some(500);
        latest.disabled_population = Some(5);
        latest.elderly_population = Some(50);

        let store = MemoryStore::new()
            .with_year(2018, vec![row("X", 2.0, Some(0.3), Some(0.5))])
            .with_year(2019, vec![row("X", 3.0, Some(0.5), Some(0.9))])
            .with_year(2025, vec![latest]);

        let Loaded::Rows(rows) = loader().load(&store, Scope::Aggregated, "fp").await.unwrap()
        else {
            panic!("expected rows");
        };

        let upper = rows.iter().find(|r| r.sub_district == "X").unwrap();
        assert_eq!(upper.features.affected_rw_count, 5.0);
        assert_eq!(upper.demographics.map(|d| d.population), Some(500));
        assert_eq!(store.fetch_count(), 8);
    }

    #[tokio::test]
    async fn test_empty_year_and_unsupported_year() {
        let store = MemoryStore::new();
        let mut loader = loader();

        assert_eq!(
            loader.load(&store, Scope::Year(2020), "fp").await.unwrap(),
            Loaded::Empty
        );
        assert_eq!(
            loader.load(&store, Scope::Year(1999), "fp").await.unwrap(),
            Loaded::Empty
        );
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_same_fingerprint_reuses_rows() {
        let store = MemoryStore::new().with_year(2020, vec![row("A", 1.0, None, None)]);
        let mut loader = loader();

        loader.load(&store, Scope::Year(2020), "fp-1").await.unwrap();
        loader.load(&store, Scope::Year(2020), "fp-1").await.unwrap();
        assert_eq!(store.fetch_count(), 1);

        loader.load(&store, Scope::Year(2020), "fp-2").await.unwrap();
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(loader().load(&store, Scope::Year(2020), "fp").await.is_err());
    }
}
