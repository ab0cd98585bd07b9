//! Градиентный бустинг над гистограммными деревьями (бинарная классификация)

#![allow(non_snake_case)]

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::histogram::{BinnedMatrix, SplitParams, MAX_BIN};
use super::tree::{RegressionTree, TreeParams};
use crate::error::{Error, Result};

const MIN_CHILD_WEIGHT: f64 = 1e-3;
const MIN_HESSIAN: f64 = 1e-16;
const PROB_EPS: f64 = 1e-15;

// Доли выборки GOSS
const GOSS_TOP_RATE: f64 = 0.2;
const GOSS_OTHER_RATE: f64 = 0.1;

/// Стратегия отбора строк для очередного дерева
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostingType {
    /// Все строки
    Gbdt,
    /// Gradient-based one-side sampling
    Goss,
}

impl fmt::Display for BoostingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoostingType::Gbdt => f.write_str("gbdt"),
            BoostingType::Goss => f.write_str("goss"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// <= 0 - глубина не ограничена
    pub max_depth: i64,
    pub num_leaves: usize,
    pub boosting_type: BoostingType,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub random_state: u64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: -1,
            num_leaves: 31,
            boosting_type: BoostingType::Gbdt,
            min_child_samples: 20,
            reg_lambda: 0.0,
            random_state: 42,
        }
    }
}

impl HyperParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, reason: &str| Error::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate", "must be positive and finite"));
        }
        if self.num_leaves < 2 {
            return Err(invalid("num_leaves", "must be at least 2"));
        }
        if !(self.reg_lambda >= 0.0) {
            return Err(invalid("reg_lambda", "must be non-negative"));
        }
        Ok(())
    }

    /// Плоское представление для логирования и трекинга
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("n_estimators".to_string(), self.n_estimators.to_string());
        map.insert("learning_rate".to_string(), self.learning_rate.to_string());
        map.insert("max_depth".to_string(), self.max_depth.to_string());
        map.insert("num_leaves".to_string(), self.num_leaves.to_string());
        map.insert("boosting_type".to_string(), self.boosting_type.to_string());
        map.insert("min_child_samples".to_string(), self.min_child_samples.to_string());
        map.insert("reg_lambda".to_string(), self.reg_lambda.to_string());
        map.insert("random_state".to_string(), self.random_state.to_string());
        map
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            num_leaves: self.num_leaves,
            max_depth: if self.max_depth > 0 {
                Some(self.max_depth as usize)
            } else {
                None
            },
            learning_rate: self.learning_rate,
            split: SplitParams {
                reg_lambda: self.reg_lambda,
                min_child_samples: self.min_child_samples,
                min_child_weight: MIN_CHILD_WEIGHT,
                min_split_gain: 0.0,
            },
        }
    }
}

/// Бинарный классификатор: логистическая потеря, ньютоновские шаги,
/// деревья растут по листьям.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: HyperParams,
    init_score: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
    is_trained: bool,
}

impl GradientBoostingClassifier {
    pub fn new(params: HyperParams) -> Self {
        Self {
            params,
            init_score: 0.0,
            trees: Vec::new(),
            n_features: 0,
            is_trained: false,
        }
    }

    /// Метки - 0/1
    pub fn fit(&mut self, X: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.params.validate()?;
        let n_samples = X.nrows();
        if n_samples == 0 {
            return Err(Error::InsufficientData("empty training set for boosting".to_string()));
        }
        if y.len() != n_samples {
            return Err(Error::InsufficientData(format!(
                "{} rows but {} labels",
                n_samples,
                y.len()
            )));
        }
        for (row, &label) in y.iter().enumerate() {
            if label != 0.0 && label != 1.0 {
                return Err(Error::InvalidLabel {
                    row,
                    value: label,
                    reason: "binary classifier expects labels 0 or 1",
                });
            }
        }

        let base_rate = (y.sum() / n_samples as f64).clamp(PROB_EPS, 1.0 - PROB_EPS);
        self.init_score = (base_rate / (1.0 - base_rate)).ln();
        self.n_features = X.ncols();
        self.trees.clear();

        let binned = BinnedMatrix::from_array(X, MAX_BIN);
        let tree_params = self.params.tree_params();
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.random_state);
        // Первые 1/lr итераций GOSS работает на всех строках
        let goss_warmup = (1.0 / self.params.learning_rate) as usize;

        let mut raw = vec![self.init_score; n_samples];
        let mut grad = vec![0.0; n_samples];
        let mut hess = vec![0.0; n_samples];

        for iteration in 0..self.params.n_estimators {
            for i in 0..n_samples {
                let p = sigmoid(raw[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let tree = if self.params.boosting_type == BoostingType::Goss && iteration >= goss_warmup {
                let (rows, g, h) = goss_sample(&grad, &hess, &mut rng);
                RegressionTree::grow(&binned, &g, &h, rows, &tree_params)
            } else {
                RegressionTree::grow(&binned, &grad, &hess, (0..n_samples).collect(), &tree_params)
            };

            if tree.is_stump() {
                tracing::debug!("No further splits at iteration {}, stopping", iteration);
                break;
            }

            for (i, score) in raw.iter_mut().enumerate() {
                *score += tree.predict_row(X.row(i));
            }
            self.trees.push(tree);
        }

        self.is_trained = true;
        tracing::debug!(
            "Gradient boosting fitted: {} trees, {} features",
            self.trees.len(),
            self.n_features
        );
        Ok(())
    }

    /// Сырые оценки (логиты)
    pub fn decision_function(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_trained {
            return Err(Error::NotFitted);
        }
        if X.ncols() != self.n_features {
            return Err(Error::InvalidParameter {
                name: "X".to_string(),
                reason: format!("expected {} features, got {}", self.n_features, X.ncols()),
            });
        }

        Ok(X
            .rows()
            .into_iter()
            .map(|row| self.init_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>())
            .collect())
    }

    /// Вероятность класса 1
    pub fn predict_proba(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(X)?.mapv(sigmoid))
    }

    pub fn predict(&self, X: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(X)?
            .mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Верхние 20% по |g| плюс случайные 10% остальных с весом (1 - a) / b
fn goss_sample(grad: &[f64], hess: &[f64], rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<f64>, Vec<f64>) {
    let n = grad.len();
    let top_n = ((n as f64 * GOSS_TOP_RATE) as usize).max(1).min(n);
    let other_n = ((n as f64 * GOSS_OTHER_RATE) as usize).min(n - top_n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| grad[b].abs().total_cmp(&grad[a].abs()));

    let mut g = grad.to_vec();
    let mut h = hess.to_vec();
    let mut rows: Vec<usize> = order[..top_n].to_vec();

    let rest = &order[top_n..];
    let amplify = (1.0 - GOSS_TOP_RATE) / GOSS_OTHER_RATE;
    for pos in index::sample(rng, rest.len(), other_n).into_iter() {
        let row = rest[pos];
        g[row] *= amplify;
        h[row] *= amplify;
        rows.push(row);
    }

    rows.sort_unstable();
    (rows, g, h)
}
