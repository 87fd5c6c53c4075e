//! Runtime settings read from the environment.
//!
//! Every value has a default; a variable that is set but does not parse is
//! an error rather than being silently ignored.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::clustering::KMedoidsOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding `incidents_<year>.csv`.
    pub data_dir: PathBuf,
    pub fingerprint_ttl: Duration,
    pub data_ttl: Duration,
    pub store_timeout: Duration,
    pub kmedoids: KMedoidsOptions,
    /// Consecutive fingerprint fallbacks before they are logged as errors.
    pub fallback_alert: u32,
    pub log_file_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            fingerprint_ttl: Duration::from_secs(60),
            data_ttl: Duration::from_secs(600),
            store_timeout: Duration::from_secs(30),
            kmedoids: KMedoidsOptions::default(),
            fallback_alert: 3,
            log_file_path: PathBuf::from("logs/flood_cluster.log"),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| -> Result<Duration> {
            Ok(Duration::from_secs(parse(&lookup, name, default.as_secs())?))
        };

        Ok(Self {
            data_dir: lookup("FLOOD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            fingerprint_ttl: secs("FINGERPRINT_TTL_SECS", defaults.fingerprint_ttl)?,
            data_ttl: secs("DATA_TTL_SECS", defaults.data_ttl)?,
            store_timeout: secs("STORE_TIMEOUT_SECS", defaults.store_timeout)?,
            kmedoids: KMedoidsOptions {
                seed: parse(&lookup, "KMEDOIDS_SEED", defaults.kmedoids.seed)?,
                max_iter: parse(&lookup, "KMEDOIDS_MAX_ITER", defaults.kmedoids.max_iter)?,
            },
            fallback_alert: parse(
                &lookup,
                "FINGERPRINT_FALLBACK_ALERT",
                defaults.fallback_alert,
            )?,
            log_file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file_path),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {raw:?} for {name}")),
        None => Ok(default),
    }
}
