//! Случайный лес для оценки важности признаков

#![allow(non_snake_case)]

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Бэггинг деревьев решений (Gini) с бутстрэп-выборками.
/// Каждое дерево видит случайное подмножество из ceil(sqrt(p)) признаков.
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: u64,
    feature_importances: Option<Array1<f64>>,
    n_trees: usize,
}

impl RandomForest {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            max_depth: None,
            seed,
            feature_importances: None,
            n_trees: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn fit(&mut self, X: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        let n_samples = X.nrows();
        let n_features = X.ncols();
        if n_samples == 0 || n_features == 0 {
            return Err(Error::InsufficientData("empty training set for random forest".to_string()));
        }

        // Сиды деревьев берутся из одного потока: результат не зависит от числа потоков
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let tree_seeds: Vec<u64> = (0..self.n_estimators).map(|_| rng.gen()).collect();
        let max_depth = self.max_depth;
        let max_features = max_features(n_features);

        let importances = tree_seeds
            .par_iter()
            .map(|&seed| fit_tree_importance(X, y, max_depth, max_features, seed))
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let mut total = Array1::zeros(n_features);
        for tree in &importances {
            for (acc, &value) in total.iter_mut().zip(tree.iter()) {
                *acc += value;
            }
        }
        total /= importances.len() as f64;

        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }

        self.n_trees = importances.len();
        self.feature_importances = Some(total);
        tracing::debug!("Random forest fitted with {} trees", self.n_trees);
        Ok(())
    }

    /// Нормированные важности признаков (сумма = 1, если было хоть одно разбиение)
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}

fn max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features.max(1))
}

/// Важности одного дерева в индексах полной матрицы признаков
fn fit_tree_importance(
    X: &Array2<f64>,
    y: &Array1<usize>,
    max_depth: Option<usize>,
    max_features: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    let n_samples = X.nrows();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let bootstrap: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
    let mut features = sample(&mut rng, X.ncols(), max_features).into_vec();
    features.sort_unstable();

    let subset = X.select(Axis(1), &features);
    let dataset = Dataset::new(subset.select(Axis(0), &bootstrap), y.select(Axis(0), &bootstrap));
    let tree = DecisionTree::<f64, usize>::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(max_depth)
        .fit(&dataset)
        .map_err(|e| Error::Fit(e.to_string()))?;

    let mut importances = vec![0.0; X.ncols()];
    for (&feature, value) in features.iter().zip(tree.feature_importance()) {
        importances[feature] = if value.is_finite() { value } else { 0.0 };
    }
    Ok(importances)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Первый признак определяет класс, второй - шум
    fn informative_data(n: usize) -> (Array2<f64>, Array1<usize>) {
        let X = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => i as f64,
            1 => ((i * 7) % 5) as f64,
            _ => 1.0,
        });
        let y = Array1::from_shape_fn(n, |i| usize::from(i >= n / 2));
        (X, y)
    }

    #[test]
    fn test_informative_feature_ranks_first() {
        let (X, y) = informative_data(60);
        let mut forest = RandomForest::new(100, 42);
        forest.fit(&X, &y).unwrap();

        let importances = forest.feature_importances().unwrap();
        assert_eq!(importances.len(), 3);
        assert!(importances[0] > importances[1]);
        assert!(importances[0] > importances[2]);
        assert_eq!(importances[2], 0.0);
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        assert_eq!(forest.n_trees(), 100);
    }

    #[test]
    fn test_correlated_copy_shares_importance() {
        // Признаки 0 и 1 совпадают, 2 и 3 - шум
        let n = 60;
        let X = Array2::from_shape_fn((n, 4), |(i, j)| match j {
            0 | 1 => i as f64,
            2 => ((i * 7) % 5) as f64,
            _ => ((i * 11) % 3) as f64,
        });
        let y = Array1::from_shape_fn(n, |i| usize::from(i >= n / 2));

        let mut forest = RandomForest::new(40, 42);
        forest.fit(&X, &y).unwrap();
        let importances = forest.feature_importances().unwrap();

        assert!(importances[0] > 0.0);
        assert!(importances[1] > 0.0);
        assert!(importances[0] < 0.9);
    }

    #[test]
    fn test_max_features_is_sqrt() {
        assert_eq!(max_features(1), 1);
        assert_eq!(max_features(4), 2);
        assert_eq!(max_features(12), 4);
    }

    #[test]
    fn test_seeded_forest_is_reproducible() {
        let (X, y) = informative_data(40);
        let mut a = RandomForest::new(8, 3);
        let mut b = RandomForest::new(8, 3);
        a.fit(&X, &y).unwrap();
        b.fit(&X, &y).unwrap();
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_empty_input_rejected() {
        let mut forest = RandomForest::new(5, 42);
        let err = forest.fit(&Array2::zeros((0, 3)), &Array1::zeros(0)).unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
    }
}
