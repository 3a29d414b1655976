//! Offline training: event log -> engineered features -> model triple + schema.
//!
//! This is where the column order is decided. The schema written here is the
//! one the engine replays at inference time.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use std::{collections::BTreeSet, fs::File, io::Read, path::Path};

use crate::config::{PredictorConfig, TrainingConfig};
use crate::ensemble::{
    Classifier, GradientBoostedRegressor, RandomForestClassifier, RandomForestRegressor, Regressor,
};
use crate::error::{PredictError, Result};
use crate::features::FeatureRow;
use crate::metrics::{self, ClassificationReport};
use crate::model::ModelArtifacts;
use crate::schema::FeatureSchema;
use crate::tree::Matrix;
use crate::types::{TrainingEvent, NEUTRAL_OCCUPANCY};

// ---------- Loading ----------

pub fn load_events(path: &Path) -> Result<Vec<TrainingEvent>> {
    let file = File::open(path)?;
    read_events(file)
}

pub fn read_events<R: Read>(reader: R) -> Result<Vec<TrainingEvent>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut events = Vec::new();
    for row in rdr.deserialize() {
        events.push(row?);
    }
    Ok(events)
}

// ---------- Feature engineering ----------

/// Feature rows and targets in (lot, time) order, plus the schema they imply.
#[derive(Debug, Clone)]
pub struct EngineeredDataset {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
    pub occupancy: Vec<f64>,
    pub search_time: Vec<f64>,
    pub found_parking: Vec<bool>,
}

impl EngineeredDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows encoded in schema order.
    pub fn matrix(&self) -> Result<Matrix> {
        let encoded: Vec<Vec<f64>> = self
            .rows
            .iter()
            .map(|r| r.encode(&self.schema).into_values())
            .collect();
        Matrix::from_rows(&encoded)
    }
}

fn mean_or_neutral(values: &[Option<f64>]) -> f64 {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        NEUTRAL_OCCUPANCY
    } else {
        metrics::mean(&present)
    }
}

/// Lag and rolling features per lot over chronologically sorted events.
/// Lags missing at the start of a series take the column mean.
pub fn engineer_features(events: &[TrainingEvent], rolling_window: usize) -> Result<EngineeredDataset> {
    if events.is_empty() {
        return Err(PredictError::Training("event log is empty".into()));
    }
    if rolling_window == 0 {
        return Err(PredictError::Training("rolling_window must be positive".into()));
    }

    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&i| (events[i].lot_id, events[i].timestamp));

    let n = order.len();
    let mut prev_1: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut prev_2: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut rolling: Vec<f64> = Vec::with_capacity(n);

    let mut series_start = 0;
    for (pos, &i) in order.iter().enumerate() {
        if pos > 0 && events[order[pos - 1]].lot_id != events[i].lot_id {
            series_start = pos;
        }
        let back = |k: usize| (pos >= series_start + k).then(|| events[order[pos - k]].occupancy_rate);
        prev_1.push(back(1));
        prev_2.push(back(2));

        let from = pos.saturating_sub(rolling_window - 1).max(series_start);
        let window: Vec<f64> = order[from..=pos].iter().map(|&j| events[j].occupancy_rate).collect();
        rolling.push(metrics::mean(&window));
    }

    let fill_1 = mean_or_neutral(&prev_1);
    let fill_2 = mean_or_neutral(&prev_2);

    // A blank weather cell is the implicit "other" category: no column of its own.
    let categories: BTreeSet<&str> = events
        .iter()
        .map(|e| e.weather.trim())
        .filter(|w| !w.is_empty())
        .collect();
    let schema = FeatureSchema::with_weather_categories(categories)?;

    let mut rows = Vec::with_capacity(n);
    let mut occupancy = Vec::with_capacity(n);
    let mut search_time = Vec::with_capacity(n);
    let mut found_parking = Vec::with_capacity(n);
    for (pos, &i) in order.iter().enumerate() {
        let e = &events[i];
        rows.push(FeatureRow::from_event(
            e,
            prev_1[pos].unwrap_or(fill_1),
            prev_2[pos].unwrap_or(fill_2),
            rolling[pos],
        ));
        occupancy.push(e.occupancy_rate);
        search_time.push(e.search_time_minutes);
        found_parking.push(e.found_parking);
    }

    Ok(EngineeredDataset {
        schema,
        rows,
        occupancy,
        search_time,
        found_parking,
    })
}

// ---------- Split ----------

/// Seeded shuffle split; `ceil(test_size * n)` rows are held out.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PredictError::Training(format!(
            "cannot hold out {} of {} events",
            n_test, n
        )));
    }
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    let test = idx.split_off(n - n_test);
    Ok((idx, test))
}

// ---------- Report ----------

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub n_events: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub feature_columns: Vec<String>,
    pub occupancy_mae: f64,
    pub occupancy_rmse: f64,
    pub occupancy_mean_actual: f64,
    pub search_time_mae: f64,
    pub search_time_mean_actual: f64,
    pub classifier: ClassificationReport,
    /// Occupancy model importances, highest first, at most ten.
    pub top_features: Vec<(String, f64)>,
}

impl TrainingReport {
    /// `(1 - MAE) * 100` for the occupancy model.
    pub fn occupancy_accuracy_pct(&self) -> f64 {
        (1.0 - self.occupancy_mae) * 100.0
    }

    pub fn log(&self) {
        tracing::info!(
            "trained on {} events ({} train / {} test), {} features",
            self.n_events,
            self.n_train,
            self.n_test,
            self.feature_columns.len()
        );
        tracing::info!(
            "occupancy: MAE={:.3} RMSE={:.3} mean_actual={:.3} accuracy={:.1}%",
            self.occupancy_mae,
            self.occupancy_rmse,
            self.occupancy_mean_actual,
            self.occupancy_accuracy_pct()
        );
        tracing::info!(
            "search_time: MAE={:.2} min mean_actual={:.2} min",
            self.search_time_mae,
            self.search_time_mean_actual
        );
        let c = &self.classifier;
        tracing::info!(
            "parking_available: accuracy={:.1}% pos(p={:.2} r={:.2} f1={:.2} n={}) neg(p={:.2} r={:.2} f1={:.2} n={})",
            c.accuracy * 100.0,
            c.positive.precision,
            c.positive.recall,
            c.positive.f1,
            c.positive.support,
            c.negative.precision,
            c.negative.recall,
            c.negative.f1,
            c.negative.support
        );
        for (name, imp) in &self.top_features {
            tracing::info!("importance {:<24} {:.4}", name, imp);
        }
    }
}

// ---------- Fitting ----------

fn pick<T: Copy>(values: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| values[i]).collect()
}

/// Fit the triple on a shared split and evaluate it on the held-out rows.
pub fn train(events: &[TrainingEvent], config: &TrainingConfig) -> Result<(ModelArtifacts, TrainingReport)> {
    config.validate()?;
    let data = engineer_features(events, config.rolling_window)?;
    let x = data.matrix()?;
    let columns = data.schema.columns().to_vec();
    let (train_idx, test_idx) = train_test_split(data.len(), config.test_size, config.seed)?;
    let x_train = x.select(&train_idx);
    let x_test = x.select(&test_idx);

    tracing::info!("fitting occupancy regressor ({} rows)", x_train.n_rows());
    let occupancy = GradientBoostedRegressor::fit(
        &x_train,
        &pick(&data.occupancy, &train_idx),
        &config.occupancy,
        config.seed,
    )?
    .with_feat_list(columns.clone())?;
    tracing::info!("fitting search-time regressor");
    let search_time = RandomForestRegressor::fit(
        &x_train,
        &pick(&data.search_time, &train_idx),
        &config.search_time,
        config.seed,
    )?
    .with_feat_list(columns.clone())?;
    tracing::info!("fitting availability classifier");
    let classifier = RandomForestClassifier::fit(
        &x_train,
        &pick(&data.found_parking, &train_idx),
        &config.classifier,
        config.seed,
    )?
    .with_feat_list(columns)?;

    let rows_test: Vec<&[f64]> = (0..x_test.n_rows()).map(|i| x_test.row(i)).collect();
    let predict_all = |m: &dyn Regressor| -> Result<Vec<f64>> {
        rows_test.iter().map(|r| m.predict(r)).collect()
    };
    let occ_pred = predict_all(&occupancy)?;
    let search_pred = predict_all(&search_time)?;
    let found_pred = rows_test
        .iter()
        .map(|r| classifier.predict(r))
        .collect::<Result<Vec<bool>>>()?;

    let occ_actual = pick(&data.occupancy, &test_idx);
    let search_actual = pick(&data.search_time, &test_idx);
    let found_actual = pick(&data.found_parking, &test_idx);

    let mut ranked: Vec<(String, f64)> = data
        .schema
        .columns()
        .iter()
        .cloned()
        .zip(occupancy.feature_importances())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(10);

    let report = TrainingReport {
        n_events: data.len(),
        n_train: train_idx.len(),
        n_test: test_idx.len(),
        feature_columns: data.schema.columns().to_vec(),
        occupancy_mae: metrics::mean_absolute_error(&occ_actual, &occ_pred),
        occupancy_rmse: metrics::root_mean_squared_error(&occ_actual, &occ_pred),
        occupancy_mean_actual: metrics::mean(&occ_actual),
        search_time_mae: metrics::mean_absolute_error(&search_actual, &search_pred),
        search_time_mean_actual: metrics::mean(&search_actual),
        classifier: metrics::classification_report(&found_actual, &found_pred),
        top_features: ranked,
    };

    let artifacts = ModelArtifacts::new(data.schema, occupancy.into(), search_time.into(), classifier)?;
    Ok((artifacts, report))
}

/// Train from a CSV log and persist the four artifacts under `config.model_dir`.
pub fn run(csv_path: &Path, config: &PredictorConfig) -> Result<TrainingReport> {
    let events = load_events(csv_path)?;
    tracing::info!("loaded {} records from {}", events.len(), csv_path.display());

    let (artifacts, report) = train(&events, &config.training)?;
    report.log();

    artifacts.save(&config.model_dir)?;
    tracing::info!("models saved to {}", config.model_dir.display());
    Ok(report)
}
