//! Campus parking prediction core.
//!
//! Raw context (lot, time, weather, temperature, capacity, recent occupancy)
//! is encoded into a fixed, schema-ordered feature vector and evaluated by
//! three tree-ensemble models: an occupancy regressor, a search-time
//! regressor and an availability classifier.
//!
//! ```no_run
//! use parking_predictor::{Predictor, PredictionRequest};
//! use std::path::Path;
//!
//! let predictor = Predictor::load(Path::new("ml_models/saved_models"));
//! let req = PredictionRequest::new(1, 150)
//!     .timestamp("2024-03-11T09:30:00")
//!     .weather("rainy")
//!     .temperature(45.0);
//! match predictor.predict(&req) {
//!     Ok(rec) => println!("{} -> {:.3}", rec.lot_id, rec.occupancy_rate),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod schema;
pub mod training;
pub mod tree;
pub mod types;

pub use crate::config::{PredictorConfig, TrainingConfig};
pub use crate::engine::{PredictionEngine, Predictor, PredictorStatus};
pub use crate::error::{PredictError, Result};
pub use crate::features::{encode, FeatureRow, FeatureVector};
pub use crate::model::ModelArtifacts;
pub use crate::schema::FeatureSchema;
pub use crate::types::{
    OccupancyContext, PredictionInput, PredictionRecord, PredictionRequest, TrainingEvent, Weather,
};
