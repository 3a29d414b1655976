//! The ordered feature-column contract shared by training and inference.
//!
//! Persisted as `{"feat_list": [...], "in_dim": N}`. The training pipeline
//! writes it next to the models; the engine reads it back and every vector fed
//! to a model follows its order exactly.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path};

use crate::error::{PredictError, Result};
use crate::types::Weather;

/// Computed columns in canonical order, before the weather one-hots.
pub const BASE_COLUMNS: [&str; 14] = [
    "lot_id",
    "hour_of_day",
    "day_of_week",
    "is_weekend",
    "is_exam_week",
    "temperature",
    "capacity",
    "hour_sin",
    "hour_cos",
    "day_sin",
    "day_cos",
    "prev_hour_occupancy",
    "prev_2hour_occupancy",
    "rolling_avg_occupancy",
];

pub const WEATHER_PREFIX: &str = "weather_";

pub fn weather_column(category: &str) -> String {
    format!("{WEATHER_PREFIX}{category}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    feat_list: Vec<String>,
    in_dim: Option<usize>,
}

impl FeatureSchema {
    /// Schema from an explicit ordered list. Validated.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let schema = Self {
            in_dim: Some(columns.len()),
            feat_list: columns,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Base columns followed by one weather column per category, sorted.
    pub fn with_weather_categories<I, S>(categories: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cats: Vec<String> = categories.into_iter().map(|c| c.as_ref().to_string()).collect();
        cats.sort();
        cats.dedup();

        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(cats.iter().map(|c| weather_column(c)));
        Self::new(columns)
    }

    /// The schema produced by a log covering every known weather category.
    pub fn canonical() -> Self {
        let cats = Weather::KNOWN.map(|w| w.label().to_string());
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut sorted = cats.to_vec();
        sorted.sort();
        columns.extend(sorted.iter().map(|c| weather_column(c)));
        Self {
            in_dim: Some(columns.len()),
            feat_list: columns,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.feat_list
    }

    pub fn len(&self) -> usize {
        self.feat_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feat_list.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.feat_list.iter().position(|c| c == column)
    }

    /// One-hot columns for categories outside the closed weather set.
    /// They always encode as 0 at inference.
    pub fn unmatched_weather_columns(&self) -> Vec<&str> {
        self.feat_list
            .iter()
            .filter_map(|c| c.strip_prefix(WEATHER_PREFIX).map(|cat| (c, cat)))
            .filter(|(_, cat)| Weather::parse(cat).known_label() != Some(*cat))
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// Rejects anything the encoder cannot give a meaning to.
    pub fn validate(&self) -> Result<()> {
        if self.feat_list.is_empty() {
            return Err(PredictError::SchemaMismatch("feature schema is empty".into()));
        }
        if let Some(dim) = self.in_dim {
            if dim != self.feat_list.len() {
                return Err(PredictError::SchemaMismatch(format!(
                    "in_dim ({}) != feat_list.len() ({})",
                    dim,
                    self.feat_list.len()
                )));
            }
        }
        let mut seen = HashSet::with_capacity(self.feat_list.len());
        for col in &self.feat_list {
            if !seen.insert(col.as_str()) {
                return Err(PredictError::SchemaMismatch(format!("duplicate column {col:?}")));
            }
            let known = BASE_COLUMNS.contains(&col.as_str())
                || col.strip_prefix(WEATHER_PREFIX).is_some_and(|cat| !cat.is_empty());
            if !known {
                return Err(PredictError::SchemaMismatch(format!(
                    "column {col:?} has no encoder counterpart"
                )));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path).map_err(|e| PredictError::artifact(path, e))?;
        let schema: FeatureSchema =
            serde_json::from_str(&txt).map_err(|e| PredictError::artifact(path, e))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let txt = serde_json::to_string_pretty(self)?;
        fs::write(path, txt).map_err(|e| PredictError::artifact(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let schema = FeatureSchema::canonical();
        assert_eq!(schema.len(), 17);
        assert_eq!(schema.columns()[0], "lot_id");
        assert_eq!(schema.columns()[13], "rolling_avg_occupancy");
        assert_eq!(
            &schema.columns()[14..],
            &["weather_cloudy", "weather_rainy", "weather_sunny"]
        );
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_weather_categories_sorted_and_deduped() {
        let schema = FeatureSchema::with_weather_categories(["sunny", "rainy", "sunny"]).unwrap();
        assert_eq!(&schema.columns()[14..], &["weather_rainy", "weather_sunny"]);
    }

    #[test]
    fn test_rejects_duplicates_and_foreign_columns() {
        let dup = FeatureSchema::new(vec!["lot_id".into(), "lot_id".into()]);
        assert!(matches!(dup, Err(PredictError::SchemaMismatch(_))));

        let foreign = FeatureSchema::new(vec!["lot_id".into(), "wind_speed".into()]);
        assert!(matches!(foreign, Err(PredictError::SchemaMismatch(_))));

        assert!(FeatureSchema::new(vec![]).is_err());
    }

    #[test]
    fn test_in_dim_must_agree() {
        let schema: FeatureSchema =
            serde_json::from_str(r#"{"feat_list": ["lot_id", "capacity"], "in_dim": 3}"#).unwrap();
        assert!(matches!(schema.validate(), Err(PredictError::SchemaMismatch(_))));
    }

    #[test]
    fn test_unknown_weather_category_is_tolerated() {
        let schema = FeatureSchema::with_weather_categories(["sunny", "snowy"]).unwrap();
        assert_eq!(schema.unmatched_weather_columns(), vec!["weather_snowy"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_columns.json");
        let schema = FeatureSchema::canonical();
        schema.save(&path).unwrap();
        assert_eq!(FeatureSchema::load(&path).unwrap(), schema);
    }

    #[test]
    fn test_load_missing_file_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FeatureSchema::load(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.kind(), "artifact");
    }
}
