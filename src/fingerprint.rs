//! Dataset fingerprints used to bust the data cache.
//!
//! A fingerprint is the md5 hex digest of `"{checksum}_{row_count}"` over the
//! scope's tables. Retrieval failures never surface: the service falls back to
//! a digest of the current Unix time, which callers read as "data changed".

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::cache::TtlCache;
use crate::model::Scope;
use crate::store::{FloodStore, TableChecksum, with_timeout};

pub struct FingerprintService {
    cache: TtlCache<Scope, String>,
    timeout: Duration,
    fallback_alert: u32,
    consecutive_fallbacks: u32,
}

impl FingerprintService {
    /// `fallback_alert` is the number of consecutive fallbacks after which
    /// each further fallback is logged as an error.
    pub fn new(ttl: Duration, timeout: Duration, fallback_alert: u32) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            timeout,
            fallback_alert,
            consecutive_fallbacks: 0,
        }
    }

    /// Fingerprint of `scope`, served from cache within the TTL.
    #[tracing::instrument(skip(self, store), fields(scope = %scope))]
    pub async fn compute(&mut self, store: &dyn FloodStore, scope: Scope) -> String {
        if let Some(hit) = self.cache.get(&scope) {
            debug!(fingerprint = %hit, "Fingerprint cache hit");
            return hit;
        }

        let fingerprint = match self.checksum(store, scope).await {
            Ok(sum) => {
                self.consecutive_fallbacks = 0;
                fingerprint_of(&sum)
            }
            Err(e) => {
                self.consecutive_fallbacks += 1;
                let failures = self.consecutive_fallbacks;
                if failures >= self.fallback_alert {
                    error!(error = %e, failures, "Fingerprint store keeps failing, using time-based fallback");
                } else {
                    warn!(error = %e, failures, "Fingerprint query failed, using time-based fallback");
                }
                fallback_fingerprint()
            }
        };

        self.cache.insert(scope, fingerprint.clone());
        fingerprint
    }

    /// Consecutive computations that fell back since the last success.
    pub fn consecutive_fallbacks(&self) -> u32 {
        self.consecutive_fallbacks
    }

    /// Forgets every cached fingerprint, e.g. after a bulk update.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    async fn checksum(&self, store: &dyn FloodStore, scope: Scope) -> Result<TableChecksum> {
        let mut total = TableChecksum::default();
        for year in scope.years() {
            let sum = with_timeout(self.timeout, "checksum", store.checksum_year(year)).await?;
            total = total.merge(sum);
        }
        Ok(total)
    }
}

pub fn fingerprint_of(sum: &TableChecksum) -> String {
    digest(&format!("{}_{}", sum.checksum, sum.row_count))
}

pub fn fallback_fingerprint() -> String {
    digest(&Utc::now().timestamp().to_string())
}

fn digest(value: &str) -> String {
    format!("{:x}", md5::compute(value.as_bytes()))
}
