use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the encoder, the engine and the training pipeline.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The model triple failed to load or was never loaded.
    #[error("ML predictor not available: {reason}")]
    ModelUnavailable { reason: String },

    /// Encoded vector and model input disagree in width or meaning.
    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Caller error, rejected before encoding.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// One of the four persisted artifacts is missing or corrupt.
    #[error("artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model file parsed but its trees do not form a usable ensemble.
    #[error("malformed model: {0}")]
    MalformedModel(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("event log: {0}")]
    Data(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl PredictError {
    pub(crate) fn artifact<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PredictError::Artifact {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Stable tag for callers that need to tell failures apart.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ModelUnavailable { .. } => "model_unavailable",
            PredictError::SchemaMismatch(_) => "schema_mismatch",
            PredictError::InvalidInput(_) => "invalid_input",
            PredictError::Artifact { .. } => "artifact",
            PredictError::MalformedModel(_) => "malformed_model",
            PredictError::Training(_) => "training",
            PredictError::Data(_) => "data",
            PredictError::Io(_) => "io",
            PredictError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_distinct_for_request_failures() {
        let unavailable = PredictError::ModelUnavailable {
            reason: "missing".into(),
        };
        let mismatch = PredictError::SchemaMismatch("width 3 != 17".into());
        let invalid = PredictError::InvalidInput("lot_id is required".into());

        assert_eq!(unavailable.kind(), "model_unavailable");
        assert_eq!(mismatch.kind(), "schema_mismatch");
        assert_eq!(invalid.kind(), "invalid_input");
        assert!(unavailable.to_string().contains("not available"));
    }

    #[test]
    fn test_artifact_error_names_the_file() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PredictError::artifact("models/occupancy_model.json", io);
        let msg = err.to_string();
        assert!(msg.contains("occupancy_model.json"));
        assert!(msg.contains("gone"));
    }
}
