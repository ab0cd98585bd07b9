//! Отбор признаков по важности в случайном лесе

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::RandomForest;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

pub struct FeatureSelector {
    n_features: usize,
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: u64,
}

impl FeatureSelector {
    pub fn new(n_features: usize, n_estimators: usize, seed: u64) -> Self {
        Self {
            n_features,
            n_estimators,
            max_depth: None,
            seed,
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Ранжирование признаков (без метки) по убыванию важности.
    /// Сортировка стабильная: при равенстве сохраняется исходный порядок колонок.
    pub fn rank(&self, table: &Table, label: &str) -> Result<Vec<FeatureImportance>> {
        let (features, target) = table.split_column(label)?;
        let y = target
            .iter()
            .enumerate()
            .map(|(row, &value)| {
                if value >= 0.0 && value.fract() == 0.0 {
                    Ok(value as usize)
                } else {
                    Err(Error::InvalidLabel {
                        row,
                        value,
                        reason: "class labels must be non-negative integers",
                    })
                }
            })
            .collect::<Result<ndarray::Array1<usize>>>()?;

        let mut forest = RandomForest::new(self.n_estimators, self.seed).with_max_depth(self.max_depth);
        forest.fit(&features.data, &y)?;
        let importances = forest.feature_importances().ok_or(Error::NotFitted)?;

        let mut ranking: Vec<FeatureImportance> = features
            .columns
            .iter()
            .zip(importances.iter())
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranking.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Ok(ranking)
    }

    /// Верхние K признаков плюс метка, в порядке ранжирования
    pub fn selected_columns(&self, ranking: &[FeatureImportance], label: &str) -> Vec<String> {
        if ranking.len() < self.n_features {
            tracing::warn!(
                "Requested {} features but only {} are available, keeping all",
                self.n_features,
                ranking.len()
            );
        }

        let mut columns: Vec<String> = ranking
            .iter()
            .take(self.n_features)
            .map(|f| f.feature.clone())
            .collect();
        columns.push(label.to_string());
        columns
    }
}
