//! Binary CART trees on dense rows.
//!
//! Splits maximise the drop in squared error with optional L2 leaf shrinkage:
//! a node scores `sum^2 / (count + lambda)` and its leaf value is
//! `sum / (count + lambda)`. With `lambda = 0` this is plain variance
//! reduction; on 0/1 targets it picks the same splits as Gini and the leaf
//! value is the positive-class fraction.

use rand::{rngs::StdRng, seq::index};
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};

const MIN_GAIN: f64 = 1e-12;

/// Row-major feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(PredictError::SchemaMismatch(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n_cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            n_rows: rows.len(),
            n_cols,
            data,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_cols + j]
    }

    /// New matrix holding the given rows, in that order.
    pub fn select(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.n_cols);
        for &i in rows {
            data.extend_from_slice(self.row(i));
        }
        Self {
            n_rows: rows.len(),
            n_cols: self.n_cols,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// L2 shrinkage on leaf values.
    pub lambda: f64,
    /// Features drawn per node; `None` considers all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 0.0,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    /// Total split gain per feature.
    gains: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Builder<'a> {
    x: &'a Matrix,
    y: &'a [f64],
    params: &'a TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

impl RegressionTree {
    /// Fit on the rows named by `sample` (repeats allowed, as in a bootstrap).
    pub fn fit(x: &Matrix, y: &[f64], sample: &[usize], params: &TreeParams, rng: &mut StdRng) -> Result<Self> {
        if x.n_rows() != y.len() {
            return Err(PredictError::Training(format!(
                "{} rows but {} targets",
                x.n_rows(),
                y.len()
            )));
        }
        if sample.is_empty() {
            return Err(PredictError::Training("cannot fit a tree on zero rows".into()));
        }
        let mut b = Builder {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
            gains: vec![0.0; x.n_cols()],
        };
        let mut idx = sample.to_vec();
        b.grow(&mut idx, 0);
        Ok(Self {
            nodes: b.nodes,
            gains: b.gains,
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// First structural defect that would make `predict` misbehave on
    /// `n_features`-wide rows, if any. Children must follow their parent.
    pub fn defect(&self, n_features: usize) -> Option<String> {
        if self.nodes.is_empty() {
            return Some("tree has no nodes".into());
        }
        if self.gains.len() != n_features {
            return Some(format!(
                "tree records gains for {} features, model has {}",
                self.gains.len(),
                n_features
            ));
        }
        let len = self.nodes.len();
        for (at, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Some(format!("node {at}: leaf value {value} is not finite"));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Some(format!("node {at}: feature {feature} out of range for {n_features} columns"));
                    }
                    if !threshold.is_finite() {
                        return Some(format!("node {at}: threshold {threshold} is not finite"));
                    }
                    for child in [left, right] {
                        if child <= at || child >= len {
                            return Some(format!("node {at}: child {child} out of range {}..{len}", at + 1));
                        }
                    }
                }
            }
        }
        None
    }

    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl Builder<'_> {
    fn score(&self, sum: f64, count: usize) -> f64 {
        sum * sum / (count as f64 + self.params.lambda)
    }

    fn grow(&mut self, idx: &mut [usize], depth: usize) -> usize {
        let sum: f64 = idx.iter().map(|&i| self.y[i]).sum();
        let n = idx.len();
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: sum / (n as f64 + self.params.lambda),
        });

        if depth >= self.params.max_depth || n < self.params.min_samples_split.max(2) {
            return id;
        }
        let Some(split) = self.best_split(idx, sum) else {
            return id;
        };

        // Partition in place: rows going left first.
        let mut k = 0;
        for j in 0..idx.len() {
            if self.x.get(idx[j], split.feature) <= split.threshold {
                idx.swap(j, k);
                k += 1;
            }
        }
        let (l, r) = idx.split_at_mut(k);
        let left = self.grow(l, depth + 1);
        let right = self.grow(r, depth + 1);

        self.gains[split.feature] += split.gain;
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n = self.x.n_cols();
        match self.params.max_features {
            Some(k) if k > 0 && k < n => index::sample(&mut *self.rng, n, k).into_vec(),
            _ => (0..n).collect(),
        }
    }

    fn best_split(&mut self, idx: &[usize], total: f64) -> Option<Split> {
        let n = idx.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent = self.score(total, n);
        let mut best: Option<Split> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for f in self.candidate_features() {
            pairs.clear();
            pairs.extend(idx.iter().map(|&i| (self.x.get(i, f), self.y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += pairs[i].1;
                let n_left = i + 1;
                let n_right = n - n_left;
                if pairs[i].0 == pairs[i + 1].0 || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let gain = self.score(left_sum, n_left) + self.score(total - left_sum, n_right) - parent;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let (lo, hi) = (pairs[i].0, pairs[i + 1].0);
                    let mid = lo + (hi - lo) / 2.0;
                    best = Some(Split {
                        feature: f,
                        threshold: if mid < hi { mid } else { lo },
                        gain,
                    });
                }
            }
        }
        best
    }
}
