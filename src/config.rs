use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ensemble::{BoostingParams, ForestParams};
use crate::error::{PredictError, Result};

pub const CONFIG_ENV: &str = "PARKING_CONFIG";
pub const MODEL_DIR_ENV: &str = "MODEL_DIR";
pub const DEFAULT_MODEL_DIR: &str = "ml_models/saved_models";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub model_dir: PathBuf,
    pub training: TrainingConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            training: TrainingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of events held out for evaluation.
    pub test_size: f64,
    pub seed: u64,
    pub rolling_window: usize,
    pub occupancy: BoostingParams,
    pub search_time: ForestParams,
    /// Missing fields fall back to the classifier preset, not the forest default.
    #[serde(deserialize_with = "classifier_params")]
    pub classifier: ForestParams,
}

/// Overlay the given fields on `ForestParams::classifier()`.
fn classifier_params<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ForestParams, D::Error> {
    let patch = serde_json::Value::deserialize(d)?;
    let serde_json::Value::Object(fields) = patch else {
        return Err(D::Error::custom("classifier must be an object"));
    };
    let mut base = serde_json::to_value(ForestParams::classifier()).map_err(D::Error::custom)?;
    if let Some(obj) = base.as_object_mut() {
        obj.extend(fields);
    }
    serde_json::from_value(base).map_err(D::Error::custom)
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            rolling_window: 3,
            occupancy: BoostingParams::default(),
            search_time: ForestParams::default(),
            classifier: ForestParams::classifier(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PredictError::Training(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.rolling_window == 0 {
            return Err(PredictError::Training("rolling_window must be positive".into()));
        }
        Ok(())
    }
}

impl PredictorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Defaults, then the file named by `PARKING_CONFIG`, then `MODEL_DIR`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(dir) = std::env::var_os(MODEL_DIR_ENV) {
            cfg.model_dir = PathBuf::from(dir);
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::MaxFeatures;

    #[test]
    fn test_defaults_mirror_reference_hyperparameters() {
        let cfg = PredictorConfig::default();
        assert_eq!(cfg.model_dir, PathBuf::from("ml_models/saved_models"));
        assert_eq!(cfg.training.occupancy.n_estimators, 200);
        assert_eq!(cfg.training.occupancy.max_depth, 5);
        assert_eq!(cfg.training.search_time.n_estimators, 100);
        assert_eq!(cfg.training.search_time.max_depth, 10);
        assert_eq!(cfg.training.classifier.max_features, MaxFeatures::Sqrt);
        assert_eq!(cfg.training.seed, 42);
        assert!(cfg.training.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"model_dir": "/srv/models", "training": {"occupancy": {"n_estimators": 10}}}"#,
        )
        .unwrap();

        let cfg = PredictorConfig::load(&path).unwrap();
        assert_eq!(cfg.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(cfg.training.occupancy.n_estimators, 10);
        assert_eq!(cfg.training.occupancy.learning_rate, 0.1);
        assert_eq!(cfg.training.classifier.max_features, MaxFeatures::Sqrt);
    }

    #[test]
    fn test_partial_classifier_block_keeps_sqrt_features() {
        let cfg: PredictorConfig =
            serde_json::from_str(r#"{"training": {"classifier": {"n_estimators": 50}}}"#).unwrap();
        assert_eq!(cfg.training.classifier.n_estimators, 50);
        assert_eq!(cfg.training.classifier.max_features, MaxFeatures::Sqrt);
        assert_eq!(cfg.training.classifier.max_depth, 10);
        assert_eq!(cfg.training.search_time.max_features, MaxFeatures::All);

        let cfg: PredictorConfig =
            serde_json::from_str(r#"{"training": {"classifier": {"max_features": "all"}}}"#).unwrap();
        assert_eq!(cfg.training.classifier.max_features, MaxFeatures::All);

        assert!(serde_json::from_str::<PredictorConfig>(r#"{"training": {"classifier": 3}}"#).is_err());
    }

    #[test]
    fn test_invalid_test_size() {
        let cfg = TrainingConfig {
            test_size: 1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(PredictorConfig::load(Path::new("/definitely/not/here.json")).is_err());
    }
}
