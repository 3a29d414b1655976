use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

use crate::ensemble::{Classifier, RandomForestClassifier, Regressor, RegressorModel};
use crate::error::{PredictError, Result};
use crate::schema::FeatureSchema;

pub const OCCUPANCY_MODEL_FILE: &str = "occupancy_model.json";
pub const SEARCH_TIME_MODEL_FILE: &str = "search_time_model.json";
pub const CLASSIFIER_FILE: &str = "parking_classifier.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";

/// The three fitted models plus the schema they were fitted on.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifacts {
    pub schema: FeatureSchema,
    pub occupancy: RegressorModel,
    pub search_time: RegressorModel,
    pub classifier: RandomForestClassifier,
}

impl ModelArtifacts {
    /// Bundle the triple, refusing any model whose input width is not the schema's.
    pub fn new(
        schema: FeatureSchema,
        occupancy: RegressorModel,
        search_time: RegressorModel,
        classifier: RandomForestClassifier,
    ) -> Result<Self> {
        let artifacts = Self {
            schema,
            occupancy,
            search_time,
            classifier,
        };
        artifacts.validate()?;
        Ok(artifacts)
    }

    /// Every model must be well formed and fitted on exactly the schema's
    /// columns, in the schema's order.
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()?;
        let width = self.schema.len();
        let models: [(&str, usize, &[String], Result<()>); 3] = [
            (
                OCCUPANCY_MODEL_FILE,
                self.occupancy.n_features(),
                self.occupancy.feat_list(),
                Regressor::validate(&self.occupancy),
            ),
            (
                SEARCH_TIME_MODEL_FILE,
                self.search_time.n_features(),
                self.search_time.feat_list(),
                Regressor::validate(&self.search_time),
            ),
            (
                CLASSIFIER_FILE,
                self.classifier.n_features(),
                self.classifier.feat_list(),
                Classifier::validate(&self.classifier),
            ),
        ];
        for (file, n, feat_list, structure) in models {
            if n != width {
                return Err(PredictError::SchemaMismatch(format!(
                    "{} expects {} features, schema has {}",
                    file, n, width
                )));
            }
            structure.map_err(|e| PredictError::artifact(file, e))?;
            if let Some(pos) = feat_list.iter().zip(self.schema.columns()).position(|(a, b)| a != b) {
                return Err(PredictError::SchemaMismatch(format!(
                    "{} was fitted with {:?} at position {}, schema has {:?}",
                    file,
                    feat_list[pos],
                    pos,
                    self.schema.columns()[pos]
                )));
            }
        }
        Ok(())
    }

    /// Load all four artifacts from `dir`. Any missing or corrupt file fails the whole load.
    pub fn load(dir: &Path) -> Result<Self> {
        let schema = FeatureSchema::load(&dir.join(FEATURE_COLUMNS_FILE))?;
        let occupancy = read_json(&dir.join(OCCUPANCY_MODEL_FILE))?;
        let search_time = read_json(&dir.join(SEARCH_TIME_MODEL_FILE))?;
        let classifier = read_json(&dir.join(CLASSIFIER_FILE))?;
        Self::new(schema, occupancy, search_time, classifier)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| PredictError::artifact(dir, e))?;
        write_json(&dir.join(OCCUPANCY_MODEL_FILE), &self.occupancy)?;
        write_json(&dir.join(SEARCH_TIME_MODEL_FILE), &self.search_time)?;
        write_json(&dir.join(CLASSIFIER_FILE), &self.classifier)?;
        self.schema.save(&dir.join(FEATURE_COLUMNS_FILE))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let txt = fs::read_to_string(path).map_err(|e| PredictError::artifact(path, e))?;
    serde_json::from_str(&txt).map_err(|e| PredictError::artifact(path, e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let txt = serde_json::to_string(value)?;
    fs::write(path, txt).map_err(|e| PredictError::artifact(path, e))
}
