//! Evaluation metrics for the held-out split.

use serde::Serialize;

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum::<f64>() / actual.len() as f64
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let mse = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum::<f64>() / actual.len() as f64;
    mse.sqrt()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn accuracy_score(actual: &[bool], predicted: &[bool]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let hits = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    hits as f64 / actual.len() as f64
}

/// Per-class precision / recall / F1, zero where undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub negative: ClassScores,
    pub positive: ClassScores,
    pub accuracy: f64,
}

fn scores_for(class: bool, actual: &[bool], predicted: &[bool]) -> ClassScores {
    let pairs = || actual.iter().zip(predicted);
    let tp = pairs().filter(|(a, p)| **a == class && **p == class).count() as f64;
    let predicted_pos = pairs().filter(|(_, p)| **p == class).count() as f64;
    let support = pairs().filter(|(a, _)| **a == class).count();

    let ratio = |n: f64, d: f64| if d > 0.0 { n / d } else { 0.0 };
    let precision = ratio(tp, predicted_pos);
    let recall = ratio(tp, support as f64);
    ClassScores {
        precision,
        recall,
        f1: ratio(2.0 * precision * recall, precision + recall),
        support,
    }
}

pub fn classification_report(actual: &[bool], predicted: &[bool]) -> ClassificationReport {
    ClassificationReport {
        negative: scores_for(false, actual, predicted),
        positive: scores_for(true, actual, predicted),
        accuracy: accuracy_score(actual, predicted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_regression_metrics() {
        let actual = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let predicted = vec![12.0, 18.0, 33.0, 37.0, 52.0];

        assert_abs_diff_eq!(mean_absolute_error(&actual, &predicted), 2.4, epsilon = 1e-9);
        assert_abs_diff_eq!(root_mean_squared_error(&actual, &predicted), 6.0_f64.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(mean(&actual), 30.0);
        assert!(mean_absolute_error(&actual, &predicted[..2]).is_nan());
    }

    #[test]
    fn test_classification_report() {
        let actual = [true, false, true, true, false, true, false, true];
        let predicted = [true, false, false, true, false, true, true, true];

        let report = classification_report(&actual, &predicted);
        assert_abs_diff_eq!(report.accuracy, 0.75);
        // positives: tp=4, predicted=5, support=5
        assert_abs_diff_eq!(report.positive.precision, 0.8);
        assert_abs_diff_eq!(report.positive.recall, 0.8);
        assert_eq!(report.positive.support, 5);
        // negatives: tp=2, predicted=3, support=3
        assert_abs_diff_eq!(report.negative.precision, 2.0 / 3.0);
        assert_eq!(report.negative.support, 3);
    }

    #[test]
    fn test_undefined_scores_are_zero() {
        let report = classification_report(&[true, true], &[true, true]);
        assert_eq!(report.negative.precision, 0.0);
        assert_eq!(report.negative.f1, 0.0);
        assert_eq!(report.positive.f1, 1.0);
    }
}
