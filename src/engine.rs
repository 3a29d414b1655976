//! Prediction engine and its load-or-fail lifecycle.
//!
//! `Predictor` starts `Uninitialized` and moves exactly once to `Ready` or
//! `Failed`. A failed load never takes the process down; every prediction
//! against it returns `ModelUnavailable`.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::{path::Path, sync::Arc};

use crate::ensemble::{Classifier, Regressor};
use crate::error::{PredictError, Result};
use crate::features::{self, FeatureRow, FeatureVector};
use crate::model::ModelArtifacts;
use crate::schema::FeatureSchema;
use crate::types::{format_timestamp, PredictionInput, PredictionRecord, PredictionRequest};

pub const LOG_PRED_ENV: &str = "LOG_PRED";

/// Round to a fixed number of decimals for presentation stability.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ---------- Engine ----------

/// Immutable model triple and schema; safe to share across threads.
#[derive(Debug)]
pub struct PredictionEngine {
    artifacts: ModelArtifacts,
    log_vectors: bool,
}

impl PredictionEngine {
    pub fn new(artifacts: ModelArtifacts) -> Result<Self> {
        artifacts.validate()?;
        let unmatched = artifacts.schema.unmatched_weather_columns();
        if !unmatched.is_empty() {
            tracing::warn!(
                "schema has weather columns outside the known categories; they always encode as 0: {:?}",
                unmatched
            );
        }
        Ok(Self {
            artifacts,
            log_vectors: std::env::var(LOG_PRED_ENV).ok().as_deref() == Some("1"),
        })
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let engine = Self::new(ModelArtifacts::load(dir)?)?;
        let schema = engine.schema();
        tracing::info!(
            "loaded models from {}; feat_list[{}]: {:?}",
            dir.display(),
            schema.len(),
            schema.columns()
        );
        Ok(engine)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.artifacts.schema
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    pub fn encode(&self, input: &PredictionInput) -> FeatureVector<'_> {
        features::encode(self.schema(), input)
    }

    pub fn predict_request(&self, request: &PredictionRequest) -> Result<PredictionRecord> {
        let input = request.validate()?;
        self.predict(&input)
    }

    pub fn predict(&self, input: &PredictionInput) -> Result<PredictionRecord> {
        input.check()?;
        let ts = input.timestamp.unwrap_or_else(features::now);
        self.predict_at(input, ts)
    }

    fn predict_at(&self, input: &PredictionInput, ts: NaiveDateTime) -> Result<PredictionRecord> {
        let vector = FeatureRow::from_input(input, ts).encode(self.schema());
        if self.log_vectors {
            tracing::info!("lot={} {}", input.lot_id, vector.summary());
        }
        let x = vector.values();

        let occupancy = self.guard(self.artifacts.occupancy.predict(x))?.clamp(0.0, 1.0);
        let search_time = self.guard(self.artifacts.search_time.predict(x))?.max(0.0);
        let parking_available = self.guard(self.artifacts.classifier.predict(x))?;
        let confidence = self.guard(self.artifacts.classifier.predict_proba(x))?;

        let occupancy_rate = round_to(occupancy, 3);
        let record = PredictionRecord {
            lot_id: input.lot_id,
            timestamp: format_timestamp(&ts),
            occupancy_rate,
            availability: round_to(1.0 - occupancy_rate, 3),
            search_time_minutes: round_to(search_time, 1),
            parking_available,
            confidence: round_to(confidence, 3),
        };
        tracing::debug!(?record, "prediction");
        Ok(record)
    }

    /// Schema drift reaching a model is an invariant violation; say so loudly.
    fn guard<T>(&self, r: Result<T>) -> Result<T> {
        if let Err(PredictError::SchemaMismatch(msg)) = &r {
            tracing::error!("encoder/model drift: {}", msg);
        }
        r
    }
}

// ---------- Lifecycle ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorStatus {
    Uninitialized,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
enum State {
    Uninitialized,
    Ready(Arc<PredictionEngine>),
    Failed { reason: String },
}

/// Handle the surrounding service holds; cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Predictor {
    state: State,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl Predictor {
    pub fn uninitialized() -> Self {
        Self {
            state: State::Uninitialized,
        }
    }

    /// Load from `dir`, landing in `Ready` or `Failed`.
    pub fn load(dir: &Path) -> Self {
        Self::uninitialized().initialize(|| PredictionEngine::load(dir))
    }

    pub fn from_engine(engine: PredictionEngine) -> Self {
        Self::uninitialized().initialize(|| Ok(engine))
    }

    /// The one transition out of `Uninitialized`. Already settled predictors
    /// are returned untouched.
    pub fn initialize<F>(self, load: F) -> Self
    where
        F: FnOnce() -> Result<PredictionEngine>,
    {
        if !matches!(self.state, State::Uninitialized) {
            tracing::warn!("predictor already initialized; ignoring reload");
            return self;
        }
        let state = match load() {
            Ok(engine) => State::Ready(Arc::new(engine)),
            Err(e) => {
                tracing::warn!("Could not load ML predictor: {}", e);
                State::Failed { reason: e.to_string() }
            }
        };
        Self { state }
    }

    pub fn status(&self) -> PredictorStatus {
        match self.state {
            State::Uninitialized => PredictorStatus::Uninitialized,
            State::Ready(_) => PredictorStatus::Ready,
            State::Failed { .. } => PredictorStatus::Failed,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            State::Failed { reason } => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn engine(&self) -> Result<&PredictionEngine> {
        match &self.state {
            State::Ready(engine) => Ok(engine.as_ref()),
            State::Uninitialized => Err(PredictError::ModelUnavailable {
                reason: "models were never loaded".into(),
            }),
            State::Failed { reason } => Err(PredictError::ModelUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionRecord> {
        self.engine()?.predict_request(request)
    }

    pub fn predict_input(&self, input: &PredictionInput) -> Result<PredictionRecord> {
        self.engine()?.predict(input)
    }
}
