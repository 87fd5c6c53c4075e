//! Retrieval of auxiliary resources such as sub-district boundaries.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::debug;

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads `source` from a local path, or over HTTP(S) when it is a URL.
#[tracing::instrument(skip(client))]
pub async fn fetch_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if is_url(source) {
        fetch_bytes(client, source)
            .await
            .with_context(|| format!("failed to download {source}"))?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read {source}"))?
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.org/kecamatan.geojson"));
        assert!(is_url("http://localhost:8080/a"));
        assert!(!is_url("data/http_boundaries.geojson"));
    }

    #[tokio::test]
    async fn test_fetch_source_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundaries.geojson");
        std::fs::write(&path, br#"{"type":"FeatureCollection","features":[]}"#).unwrap();

        let client = BasicClient::new(Duration::from_secs(5)).unwrap();
        let bytes = fetch_source(&client, path.to_str().unwrap()).await.unwrap();
        assert!(bytes.starts_with(b"{\"type\""));
    }

    #[tokio::test]
    async fn test_fetch_source_missing_file_names_path() {
        let client = BasicClient::new(Duration::from_secs(5)).unwrap();
        let err = fetch_source(&client, "no/such/file.geojson")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no/such/file.geojson"));
    }
}
