//! Метрики бинарной классификации

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Метрика, по которой ранжируются кандидаты при поиске
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scoring {
    #[default]
    Accuracy,
    Precision,
    Recall,
    F1,
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scoring::Accuracy => "accuracy",
            Scoring::Precision => "precision",
            Scoring::Recall => "recall",
            Scoring::F1 => "f1",
        };
        f.write_str(name)
    }
}

impl Scoring {
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>, positive: f64) -> Result<f64> {
        let metrics = EvaluationMetrics::compute(y_true, y_pred, positive)?;
        Ok(metrics.get(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl EvaluationMetrics {
    /// Метрики относительно класса `positive`; деление на ноль даёт 0
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, positive: f64) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(Error::InvalidParameter {
                name: "y_pred".to_string(),
                reason: format!("expected {} predictions, got {}", y_true.len(), y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(Error::InsufficientData("no samples to evaluate".to_string()));
        }

        let (mut tp, mut fp, mut fn_, mut correct) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t == p {
                correct += 1;
            }
            match (t == positive, p == positive) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            accuracy: ratio(correct, y_true.len()),
            precision,
            recall,
            f1,
        })
    }

    pub fn get(&self, scoring: Scoring) -> f64 {
        match scoring {
            Scoring::Accuracy => self.accuracy,
            Scoring::Precision => self.precision,
            Scoring::Recall => self.recall,
            Scoring::F1 => self.f1,
        }
    }

    pub fn as_pairs(&self) -> [(&'static str, f64); 4] {
        [
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1", self.f1),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_binary_metrics() {
        let y_true = array![1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let y_pred = array![1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let m = EvaluationMetrics::compute(&y_true, &y_pred, 1.0).unwrap();

        assert_relative_eq!(m.accuracy, 4.0 / 6.0);
        assert_relative_eq!(m.precision, 2.0 / 3.0);
        assert_relative_eq!(m.recall, 2.0 / 3.0);
        assert_relative_eq!(m.f1, 2.0 / 3.0);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let y_true = array![1.0, 0.0];
        let y_pred = array![0.0, 0.0];
        let m = EvaluationMetrics::compute(&y_true, &y_pred, 1.0).unwrap();

        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn test_positive_label_changes_precision() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0];
        assert_relative_eq!(Scoring::Precision.score(&y_true, &y_pred, 0.0).unwrap(), 1.0);
        assert_relative_eq!(Scoring::Recall.score(&y_true, &y_pred, 0.0).unwrap(), 0.5);
    }

    #[test]
    fn test_scoring_selects_metric() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0];
        assert_relative_eq!(Scoring::Accuracy.score(&y_true, &y_pred, 1.0).unwrap(), 0.75);
        assert_relative_eq!(Scoring::Recall.score(&y_true, &y_pred, 1.0).unwrap(), 1.0);
        assert_relative_eq!(Scoring::Precision.score(&y_true, &y_pred, 1.0).unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = EvaluationMetrics::compute(&array![1.0], &array![1.0, 0.0], 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_scoring_names() {
        let s: Scoring = serde_yaml::from_str("f1").unwrap();
        assert_eq!(s, Scoring::F1);
        assert_eq!(Scoring::default().to_string(), "accuracy");
    }
}
