//! Случайный поиск гиперпараметров с кросс-валидацией

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::gradient_boosting::{GradientBoostingClassifier, HyperParams};
use crate::config::{ParamDistribution, SearchConfig};
use crate::error::{Error, Result};
use crate::preprocessing::smote::class_indices;

impl ParamDistribution {
    /// Один кандидат; `random_state` фиксирован для всех кандидатов
    pub fn sample<R: Rng>(&self, rng: &mut R, random_state: u64) -> HyperParams {
        let n_estimators = rng.gen_range(self.n_estimators.low..self.n_estimators.high);
        let max_depth = rng.gen_range(self.max_depth.low..self.max_depth.high);
        let learning_rate = rng.gen_range(self.learning_rate.low..=self.learning_rate.high);
        let num_leaves = rng.gen_range(self.num_leaves.low..self.num_leaves.high);
        let boosting_type = self.boosting_type[rng.gen_range(0..self.boosting_type.len())];

        HyperParams {
            n_estimators: n_estimators.max(1) as usize,
            learning_rate,
            max_depth,
            num_leaves: num_leaves.max(2) as usize,
            boosting_type,
            min_child_samples: self.min_child_samples,
            reg_lambda: self.reg_lambda,
            random_state,
        }
    }
}

/// Стратифицированное разбиение на K фолдов без перемешивания.
/// Внутри класса строки идут в фолды подряд, в исходном порядке.
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Пары (train, test) индексов строк
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        let n = self.n_splits;
        if n < 2 {
            return Err(Error::InvalidParameter {
                name: "cv".to_string(),
                reason: "at least 2 folds are required".to_string(),
            });
        }
        let groups = class_indices(y)?;
        let largest = groups.values().map(Vec::len).max().unwrap_or(0);
        if largest < n {
            return Err(Error::InsufficientData(format!(
                "cannot split into {} folds: largest class has {} samples",
                n, largest
            )));
        }
        if let Some((class, members)) = groups.iter().find(|(_, m)| m.len() < n) {
            tracing::warn!(
                "Class {} has only {} samples, fewer than {} folds",
                class,
                members.len(),
                n
            );
        }

        // Размеры фолдов по классам: позиции отсортированных меток раздаются по кругу
        let mut allocation = vec![vec![0usize; groups.len()]; n];
        let mut position = 0;
        for (c, members) in groups.values().enumerate() {
            for _ in members {
                allocation[position % n][c] += 1;
                position += 1;
            }
        }

        let mut test_fold = vec![0usize; y.len()];
        for (c, members) in groups.values().enumerate() {
            let mut rows = members.iter();
            for (fold, sizes) in allocation.iter().enumerate() {
                for &row in rows.by_ref().take(sizes[c]) {
                    test_fold[row] = fold;
                }
            }
        }

        Ok((0..n)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..y.len()).partition(|&row| test_fold[row] == fold);
                (train, test)
            })
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: HyperParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

pub struct SearchResult {
    pub best_index: usize,
    pub best_params: HyperParams,
    pub best_score: f64,
    /// Лучшая модель, переобученная на всей выборке
    pub model: GradientBoostingClassifier,
    pub cv_results: Vec<CandidateResult>,
}

pub struct RandomizedSearch {
    distribution: ParamDistribution,
    config: SearchConfig,
}

impl RandomizedSearch {
    pub fn new(distribution: ParamDistribution, config: SearchConfig) -> Self {
        Self { distribution, config }
    }

    pub fn candidates(&self) -> Vec<HyperParams> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);
        (0..self.config.n_iter)
            .map(|_| self.distribution.sample(&mut rng, self.config.random_state))
            .collect()
    }

    /// Метрика на всех фолдах считается относительно одного `positive_label`
    pub fn fit(&self, X: &Array2<f64>, y: &Array1<f64>, positive_label: f64) -> Result<SearchResult> {
        if self.config.n_iter == 0 {
            return Err(Error::InvalidParameter {
                name: "n_iter".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let candidates = self.candidates();
        let folds = StratifiedKFold::new(self.config.cv).split(y)?;
        let tasks: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();

        let threads = if self.config.n_jobs <= 0 { 0 } else { self.config.n_jobs as usize };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Fit(e.to_string()))?;

        tracing::info!(
            "Randomized search: {} candidates x {} folds on {} threads",
            candidates.len(),
            folds.len(),
            pool.current_num_threads()
        );

        let scoring = self.config.scoring;
        let scores: Vec<f64> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, f)| {
                    let (train, test) = &folds[f];
                    let mut model = GradientBoostingClassifier::new(candidates[c].clone());
                    model.fit(&X.select(Axis(0), train), &y.select(Axis(0), train))?;

                    let y_test = y.select(Axis(0), test);
                    let y_pred = model.predict(&X.select(Axis(0), test))?;
                    scoring.score(&y_test, &y_pred, positive_label)
                })
                .collect::<Result<Vec<f64>>>()
        })?;

        let cv_results: Vec<CandidateResult> = candidates
            .into_iter()
            .zip(scores.chunks(folds.len()))
            .map(|(params, fold_scores)| CandidateResult {
                mean_score: fold_scores.iter().sum::<f64>() / fold_scores.len() as f64,
                fold_scores: fold_scores.to_vec(),
                params,
            })
            .collect();

        // Первый кандидат со строго наибольшим средним
        let mut best_index = 0;
        for (i, result) in cv_results.iter().enumerate() {
            tracing::debug!("Candidate {}: mean {} = {:.4}", i, scoring, result.mean_score);
            if result.mean_score > cv_results[best_index].mean_score {
                best_index = i;
            }
        }

        let best = &cv_results[best_index];
        tracing::info!("Best candidate {} with cv {} = {:.4}", best_index, scoring, best.mean_score);

        let mut model = GradientBoostingClassifier::new(best.params.clone());
        model.fit(X, y)?;

        Ok(SearchResult {
            best_index,
            best_params: best.params.clone(),
            best_score: best.mean_score,
            model,
            cv_results,
        })
    }
}
