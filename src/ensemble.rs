//! Tree ensembles behind the three prediction heads.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};
use crate::tree::{Matrix, RegressionTree, TreeParams};

// ---------- Evaluation traits ----------

pub trait Regressor {
    /// Input width the model was fitted on.
    fn n_features(&self) -> usize;

    /// Columns the model was fitted on, in input order.
    fn feat_list(&self) -> &[String];

    /// Structural check run before the model is trusted with a request.
    fn validate(&self) -> Result<()>;

    fn predict(&self, x: &[f64]) -> Result<f64>;
}

pub trait Classifier {
    fn n_features(&self) -> usize;

    fn feat_list(&self) -> &[String];

    fn validate(&self) -> Result<()>;

    /// Probability of the positive class.
    fn predict_proba(&self, x: &[f64]) -> Result<f64>;

    /// Decision at the argmax of the class probabilities; ties go negative.
    fn predict(&self, x: &[f64]) -> Result<bool> {
        Ok(self.predict_proba(x)? > 0.5)
    }
}

fn check_width(expected: usize, x: &[f64]) -> Result<()> {
    if x.len() != expected {
        return Err(PredictError::SchemaMismatch(format!(
            "feature length mismatch: got {}, expected {}",
            x.len(),
            expected
        )));
    }
    Ok(())
}

fn check_feat_list(n_features: usize, feat_list: &[String]) -> Result<()> {
    if feat_list.len() != n_features {
        return Err(PredictError::SchemaMismatch(format!(
            "feat_list has {} columns, model expects {}",
            feat_list.len(),
            n_features
        )));
    }
    Ok(())
}

fn check_trees(n_features: usize, feat_list: &[String], trees: &[RegressionTree]) -> Result<()> {
    if feat_list.len() != n_features {
        return Err(PredictError::MalformedModel(format!(
            "feat_list has {} columns, model expects {}",
            feat_list.len(),
            n_features
        )));
    }
    if trees.is_empty() {
        return Err(PredictError::MalformedModel("ensemble has no trees".into()));
    }
    for (i, tree) in trees.iter().enumerate() {
        if let Some(defect) = tree.defect(n_features) {
            return Err(PredictError::MalformedModel(format!("tree {i}: {defect}")));
        }
    }
    Ok(())
}

fn check_training_set(x: &Matrix, y: &[f64]) -> Result<()> {
    if x.n_rows() == 0 {
        return Err(PredictError::Training("empty training set".into()));
    }
    if x.n_rows() != y.len() {
        return Err(PredictError::Training(format!(
            "{} rows but {} targets",
            x.n_rows(),
            y.len()
        )));
    }
    Ok(())
}

/// Normalised total split gain per feature.
fn importances<'a>(n_features: usize, trees: impl Iterator<Item = &'a RegressionTree>) -> Vec<f64> {
    let mut total = vec![0.0; n_features];
    for tree in trees {
        for (acc, g) in total.iter_mut().zip(tree.gains()) {
            *acc += g;
        }
    }
    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        total.iter_mut().for_each(|v| *v /= sum);
    }
    total
}

// ---------- Hyperparameters ----------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub lambda: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.1,
            max_depth: 5,
            lambda: 1.0,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> Option<usize> {
        match self {
            MaxFeatures::All => None,
            MaxFeatures::Sqrt => Some(((n_features as f64).sqrt() as usize).max(1)),
            MaxFeatures::Count(k) => Some(k.clamp(1, n_features.max(1))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            max_features: MaxFeatures::All,
            bootstrap: true,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl ForestParams {
    pub fn classifier() -> Self {
        Self {
            max_features: MaxFeatures::Sqrt,
            ..Self::default()
        }
    }
}

// ---------- Gradient boosting ----------

/// Squared-error gradient boosting: mean base score plus shrunken residual trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    n_features: usize,
    feat_list: Vec<String>,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    pub fn fit(x: &Matrix, y: &[f64], params: &BoostingParams, seed: u64) -> Result<Self> {
        check_training_set(x, y)?;
        if params.n_estimators == 0 {
            return Err(PredictError::Training("n_estimators must be positive".into()));
        }
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            lambda: params.lambda,
            max_features: None,
        };
        let base_score = y.iter().sum::<f64>() / y.len() as f64;
        let all: Vec<usize> = (0..x.n_rows()).collect();
        let mut pred = vec![base_score; y.len()];
        let mut residual = vec![0.0; y.len()];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            for i in 0..y.len() {
                residual[i] = y[i] - pred[i];
            }
            let tree = RegressionTree::fit(x, &residual, &all, &tree_params, &mut rng)?;
            for (i, p) in pred.iter_mut().enumerate() {
                *p += params.learning_rate * tree.predict(x.row(i));
            }
            trees.push(tree);
        }

        Ok(Self {
            n_features: x.n_cols(),
            feat_list: Vec::new(),
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    /// Name the fitted columns; the list must match the fitted width.
    pub fn with_feat_list(mut self, feat_list: Vec<String>) -> Result<Self> {
        check_feat_list(self.n_features, &feat_list)?;
        self.feat_list = feat_list;
        Ok(self)
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        importances(self.n_features, self.trees.iter())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostedRegressor {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feat_list(&self) -> &[String] {
        &self.feat_list
    }

    fn validate(&self) -> Result<()> {
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(PredictError::MalformedModel(
                "base_score and learning_rate must be finite".into(),
            ));
        }
        check_trees(self.n_features, &self.feat_list, &self.trees)
    }

    fn predict(&self, x: &[f64]) -> Result<f64> {
        check_width(self.n_features, x)?;
        Ok(self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(x)).sum::<f64>())
    }
}

// ---------- Random forests ----------

fn fit_forest(x: &Matrix, y: &[f64], params: &ForestParams, seed: u64) -> Result<Vec<RegressionTree>> {
    check_training_set(x, y)?;
    if params.n_estimators == 0 {
        return Err(PredictError::Training("n_estimators must be positive".into()));
    }
    let tree_params = TreeParams {
        max_depth: params.max_depth,
        min_samples_split: params.min_samples_split,
        min_samples_leaf: params.min_samples_leaf,
        lambda: 0.0,
        max_features: params.max_features.resolve(x.n_cols()),
    };
    let n = x.n_rows();

    // Per-tree seeds keep the result independent of thread scheduling.
    (0..params.n_estimators)
        .into_par_iter()
        .map(|t| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
            let sample: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            RegressionTree::fit(x, y, &sample, &tree_params, &mut rng)
        })
        .collect()
}

fn forest_mean(trees: &[RegressionTree], x: &[f64]) -> f64 {
    trees.iter().map(|t| t.predict(x)).sum::<f64>() / trees.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_features: usize,
    feat_list: Vec<String>,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn fit(x: &Matrix, y: &[f64], params: &ForestParams, seed: u64) -> Result<Self> {
        let trees = fit_forest(x, y, params, seed)?;
        Ok(Self {
            n_features: x.n_cols(),
            feat_list: Vec::new(),
            trees,
        })
    }

    /// Name the fitted columns; the list must match the fitted width.
    pub fn with_feat_list(mut self, feat_list: Vec<String>) -> Result<Self> {
        check_feat_list(self.n_features, &feat_list)?;
        self.feat_list = feat_list;
        Ok(self)
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        importances(self.n_features, self.trees.iter())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForestRegressor {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feat_list(&self) -> &[String] {
        &self.feat_list
    }

    fn validate(&self) -> Result<()> {
        check_trees(self.n_features, &self.feat_list, &self.trees)
    }

    fn predict(&self, x: &[f64]) -> Result<f64> {
        check_width(self.n_features, x)?;
        Ok(forest_mean(&self.trees, x))
    }
}

/// Binary forest classifier. Trees regress the 0/1 label, so each leaf holds
/// the positive-class fraction and the forest mean is the class probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_features: usize,
    feat_list: Vec<String>,
    trees: Vec<RegressionTree>,
}

impl RandomForestClassifier {
    pub fn fit(x: &Matrix, labels: &[bool], params: &ForestParams, seed: u64) -> Result<Self> {
        let y: Vec<f64> = labels.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        let trees = fit_forest(x, &y, params, seed)?;
        Ok(Self {
            n_features: x.n_cols(),
            feat_list: Vec::new(),
            trees,
        })
    }

    /// Name the fitted columns; the list must match the fitted width.
    pub fn with_feat_list(mut self, feat_list: Vec<String>) -> Result<Self> {
        check_feat_list(self.n_features, &feat_list)?;
        self.feat_list = feat_list;
        Ok(self)
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        importances(self.n_features, self.trees.iter())
    }
}

impl Classifier for RandomForestClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feat_list(&self) -> &[String] {
        &self.feat_list
    }

    fn validate(&self) -> Result<()> {
        check_trees(self.n_features, &self.feat_list, &self.trees)
    }

    fn predict_proba(&self, x: &[f64]) -> Result<f64> {
        check_width(self.n_features, x)?;
        Ok(forest_mean(&self.trees, x).clamp(0.0, 1.0))
    }
}

// ---------- Serialised regressor slot ----------

/// Either regressor family, tagged by `kind` in the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorModel {
    GradientBoosted(GradientBoostedRegressor),
    RandomForest(RandomForestRegressor),
}

impl RegressorModel {
    pub fn feature_importances(&self) -> Vec<f64> {
        match self {
            RegressorModel::GradientBoosted(m) => m.feature_importances(),
            RegressorModel::RandomForest(m) => m.feature_importances(),
        }
    }
}

impl Regressor for RegressorModel {
    fn n_features(&self) -> usize {
        match self {
            RegressorModel::GradientBoosted(m) => m.n_features(),
            RegressorModel::RandomForest(m) => m.n_features(),
        }
    }

    fn feat_list(&self) -> &[String] {
        match self {
            RegressorModel::GradientBoosted(m) => m.feat_list(),
            RegressorModel::RandomForest(m) => m.feat_list(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            RegressorModel::GradientBoosted(m) => m.validate(),
            RegressorModel::RandomForest(m) => m.validate(),
        }
    }

    fn predict(&self, x: &[f64]) -> Result<f64> {
        match self {
            RegressorModel::GradientBoosted(m) => m.predict(x),
            RegressorModel::RandomForest(m) => m.predict(x),
        }
    }
}

impl From<GradientBoostedRegressor> for RegressorModel {
    fn from(m: GradientBoostedRegressor) -> Self {
        RegressorModel::GradientBoosted(m)
    }
}

impl From<RandomForestRegressor> for RegressorModel {
    fn from(m: RandomForestRegressor) -> Self {
        RegressorModel::RandomForest(m)
    }
}
