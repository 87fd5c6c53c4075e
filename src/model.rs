//! Flood-incident records, scopes and the feature matrix derived from them.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Years with an incident table in the store.
pub const SUPPORTED_YEARS: RangeInclusive<u16> = 2018..=2025;

/// Number of impact features used for clustering.
pub const FEATURE_COUNT: usize = 5;

/// Column names of the impact features, in matrix order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "affected_rw_count",
    "affected_household_count",
    "affected_population_count",
    "mean_water_height",
    "max_water_height",
];

/// The set of rows participating in a clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Year(u16),
    /// Every supported year, grouped by sub-district.
    Aggregated,
}

impl Scope {
    /// Years whose tables are read for this scope.
    pub fn years(&self) -> Vec<u16> {
        match self {
            Scope::Year(year) => vec![*year],
            Scope::Aggregated => SUPPORTED_YEARS.collect(),
        }
    }

    pub fn is_supported(&self) -> bool {
        match self {
            Scope::Year(year) => SUPPORTED_YEARS.contains(year),
            Scope::Aggregated => true,
        }
    }

    /// Most recent year, the source of demographic attributes for aggregated runs.
    pub fn latest_year() -> u16 {
        *SUPPORTED_YEARS.end()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Year(year) => write!(f, "{year}"),
            Scope::Aggregated => write!(
                f,
                "aggregated {}-{}",
                SUPPORTED_YEARS.start(),
                SUPPORTED_YEARS.end()
            ),
        }
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "total" | "aggregated" => Ok(Scope::Aggregated),
            other => other
                .parse::<u16>()
                .map(Scope::Year)
                .map_err(|_| anyhow::anyhow!("invalid scope '{s}': expected a year or 'aggregated'")),
        }
    }
}

/// One stored row of a per-year incident table.
///
/// Every numeric column is optional because the upstream tables allow nulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub sub_district: String,
    pub affected_rw_count: Option<f64>,
    pub affected_household_count: Option<f64>,
    pub affected_population_count: Option<f64>,
    pub mean_water_height: Option<f64>,
    pub max_water_height: Option<f64>,
    pub population: Option<u64>,
    pub disabled_population: Option<u64>,
    pub elderly_population: Option<u64>,
}

impl IncidentRecord {
    /// Impact features with missing values read as 0.
    pub fn features(&self) -> ImpactFeatures {
        ImpactFeatures {
            affected_rw_count: self.affected_rw_count.unwrap_or(0.0),
            affected_household_count: self.affected_household_count.unwrap_or(0.0),
            affected_population_count: self.affected_population_count.unwrap_or(0.0),
            mean_water_height: self.mean_water_height.unwrap_or(0.0),
            max_water_height: self.max_water_height.unwrap_or(0.0),
        }
    }

    /// Sum of the five impact features, the per-row contribution to a fingerprint.
    pub fn checksum(&self) -> f64 {
        self.features().to_array().iter().sum()
    }

    /// Demographics, present only when all three columns are filled.
    pub fn demographics(&self) -> Option<Demographics> {
        Some(Demographics {
            population: self.population?,
            disabled_population: self.disabled_population?,
            elderly_population: self.elderly_population?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactFeatures {
    pub affected_rw_count: f64,
    pub affected_household_count: f64,
    pub affected_population_count: f64,
    pub mean_water_height: f64,
    pub max_water_height: f64,
}

impl ImpactFeatures {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.affected_rw_count,
            self.affected_household_count,
            self.affected_population_count,
            self.mean_water_height,
            self.max_water_height,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [rw, household, population, mean_height, max_height] = values;
        Self {
            affected_rw_count: rw,
            affected_household_count: household,
            affected_population_count: population,
            mean_water_height: mean_height,
            max_water_height: max_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub population: u64,
    pub disabled_population: u64,
    pub elderly_population: u64,
}

/// A sub-district ready for clustering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub sub_district: String,
    pub features: ImpactFeatures,
    pub demographics: Option<Demographics>,
}

/// Normalized sub-district key used for every name-matched join.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Builds the unscaled `rows x FEATURE_COUNT` matrix in row order.
pub fn feature_matrix(rows: &[Observation]) -> Array2<f64> {
    let mut matrix = Array2::zeros((rows.len(), FEATURE_COUNT));
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row.features.to_array().into_iter().enumerate() {
            matrix[[i, j]] = value;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> IncidentRecord {
        IncidentRecord {
            sub_district: name.to_string(),
            affected_rw_count: Some(2.0),
            affected_household_count: None,
            affected_population_count: Some(10.0),
            mean_water_height: Some(0.5),
            max_water_height: Some(1.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("2019".parse::<Scope>().unwrap(), Scope::Year(2019));
        assert_eq!("Aggregated".parse::<Scope>().unwrap(), Scope::Aggregated);
        assert_eq!("total".parse::<Scope>().unwrap(), Scope::Aggregated);
        assert!("next-year".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_years() {
        assert_eq!(Scope::Year(2020).years(), vec![2020]);
        assert_eq!(Scope::Aggregated.years().len(), 8);
        assert!(!Scope::Year(2017).is_supported());
        assert!(Scope::Year(2025).is_supported());
    }

    #[test]
    fn test_missing_features_read_as_zero() {
        let features = record("Cilandak").features();
        assert_eq!(features.affected_household_count, 0.0);
        assert_eq!(record("Cilandak").checksum(), 14.0);
    }

    #[test]
    fn test_demographics_require_all_columns() {
        let mut r = record("Cilandak");
        r.population = Some(1000);
        r.disabled_population = Some(12);
        assert!(r.demographics().is_none());

        r.elderly_population = Some(80);
        assert_eq!(
            r.demographics(),
            Some(Demographics {
                population: 1000,
                disabled_population: 12,
                elderly_population: 80,
            })
        );
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Kebayoran Baru "), "KEBAYORAN BARU");
    }

    #[test]
    fn test_feature_matrix_shape() {
        let rows: Vec<Observation> = ["A", "B"]
            .iter()
            .map(|n| Observation {
                sub_district: n.to_string(),
                features: record(n).features(),
                demographics: None,
            })
            .collect();
        let m = feature_matrix(&rows);
        assert_eq!(m.dim(), (2, FEATURE_COUNT));
        assert_eq!(m[[1, 4]], 1.5);
    }
}
