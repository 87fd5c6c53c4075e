//! Choropleth layer: joins a clustering result onto sub-district boundaries.
//!
//! Features are matched on a name property after trimming and upper-casing,
//! and gain `cluster`, `category` and `fill` properties. Features without a
//! matching row keep their geometry and are filled grey.

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::model::normalize_name;
use crate::pipeline::ClusteringResult;

/// Property holding the sub-district name in the boundary file.
pub const DEFAULT_NAME_PROPERTY: &str = "kecamatan";

pub const PALETTE: [&str; 10] = [
    "#e41a1c", "#377eb8", "#4daf4a", "#984ea3", "#ff7f00", "#ffff33", "#a65628", "#f781bf",
    "#999999", "#66c2a5",
];

/// Fill for noise and for features without a matching row.
pub const UNMATCHED_FILL: &str = "#cccccc";

pub fn cluster_color(cluster: i32) -> &'static str {
    if cluster < 0 {
        return UNMATCHED_FILL;
    }
    PALETTE[cluster as usize % PALETTE.len()]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChoroplethSummary {
    pub matched: usize,
    /// Boundary names with no row in the result.
    pub unmatched: Vec<String>,
}

/// Parses a FeatureCollection, transparently gunzipping it.
pub fn load_geojson(bytes: &[u8]) -> Result<Value> {
    let value: Value = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut text = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut text)
            .context("failed to decompress boundaries")?;
        serde_json::from_str(&text)?
    } else {
        serde_json::from_slice(bytes)?
    };

    if value.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        bail!("boundaries are not a GeoJSON FeatureCollection");
    }
    Ok(value)
}

/// Writes the cluster and category of every row onto matching features.
pub fn annotate(
    collection: &mut Value,
    result: &ClusteringResult,
    name_property: &str,
) -> Result<ChoroplethSummary> {
    let by_name: HashMap<String, (i32, &str)> = result
        .assignments()
        .map(|(row, label, category)| (normalize_name(&row.sub_district), (label, category)))
        .collect();

    let features = collection
        .get_mut("features")
        .and_then(Value::as_array_mut)
        .context("FeatureCollection has no features array")?;

    let mut summary = ChoroplethSummary::default();
    for feature in features.iter_mut() {
        let Some(properties) = feature
            .get_mut("properties")
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        let name = properties
            .get(name_property)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match by_name.get(&normalize_name(&name)) {
            Some(&(cluster, category)) => {
                properties.insert("cluster".into(), json!(cluster));
                properties.insert("category".into(), json!(category));
                properties.insert("fill".into(), json!(cluster_color(cluster)));
                summary.matched += 1;
            }
            None => {
                properties.insert("cluster".into(), Value::Null);
                properties.insert("category".into(), Value::Null);
                properties.insert("fill".into(), json!(UNMATCHED_FILL));
                summary.unmatched.push(name);
            }
        }
    }

    if !summary.unmatched.is_empty() {
        warn!(
            unmatched = summary.unmatched.len(),
            "Boundary features without clustering rows"
        );
    }
    debug!(matched = summary.matched, "Boundaries annotated");
    Ok(summary)
}

/// Writes the layer as JSON, gzip-compressed when `gzip` is set.
pub fn write_geojson(path: &Path, collection: &Value, gzip: bool) -> Result<()> {
    let body = serde_json::to_vec(collection)?;
    let body = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        encoder.finish()?
    } else {
        body
    };
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::NOISE;

    #[test]
    fn test_cluster_color() {
        assert_eq!(cluster_color(0), "#e41a1c");
        assert_eq!(cluster_color(9), "#66c2a5");
        assert_eq!(cluster_color(10), "#e41a1c");
        assert_eq!(cluster_color(NOISE), UNMATCHED_FILL);
    }

    #[test]
    fn test_load_geojson_rejects_other_objects() {
        assert!(load_geojson(br#"{"type":"Feature"}"#).is_err());
        assert!(load_geojson(b"not json").is_err());
    }

    #[test]
    fn test_gzip_written_layer_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.geojson.gz");
        let layer = json!({"type": "FeatureCollection", "features": []});

        write_geojson(&path, &layer, true).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(load_geojson(&bytes).unwrap(), layer);
    }
}
