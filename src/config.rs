//! Конфигурация пайплайна (YAML)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::gradient_boosting::BoostingType;
use crate::models::metrics::Scoring;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub data_processing: DataProcessingConfig,
    #[serde(default)]
    pub model_training: ModelTrainingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub raw_train: PathBuf,
    pub raw_test: PathBuf,
    pub processed_train: PathBuf,
    pub processed_test: PathBuf,
    pub model_output: PathBuf,
    #[serde(default = "default_tracking_dir")]
    pub tracking_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProcessingConfig {
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    pub skewness_threshold: f64,
    pub no_of_features: usize,
    #[serde(default = "default_k_neighbors")]
    pub smote_k_neighbors: usize,
    #[serde(default = "default_selector_estimators")]
    pub selector_estimators: usize,
    #[serde(default)]
    pub selector_max_depth: Option<usize>,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTrainingConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub param_distribution: ParamDistribution,
    /// Код метки, относительно которого считаются precision/recall/F1.
    /// 0 - `Canceled` при лексикографическом кодировании `booking_status`.
    #[serde(default)]
    pub positive_label: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    #[serde(default = "default_cv")]
    pub cv: usize,
    /// <= 0 - все ядра
    #[serde(default = "default_n_jobs")]
    pub n_jobs: i32,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: default_n_iter(),
            cv: default_cv(),
            n_jobs: default_n_jobs(),
            scoring: Scoring::default(),
            random_state: default_random_state(),
        }
    }
}

/// Целочисленный диапазон [low, high)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntRange {
    pub low: i64,
    pub high: i64,
}

/// Непрерывный диапазон [low, high]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub low: f64,
    pub high: f64,
}

/// Распределение гиперпараметров для случайного поиска
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDistribution {
    pub n_estimators: IntRange,
    pub max_depth: IntRange,
    pub learning_rate: FloatRange,
    pub num_leaves: IntRange,
    pub boosting_type: Vec<BoostingType>,
    #[serde(default = "default_min_child_samples")]
    pub min_child_samples: usize,
    #[serde(default)]
    pub reg_lambda: f64,
}

impl Default for ParamDistribution {
    fn default() -> Self {
        Self {
            n_estimators: IntRange { low: 100, high: 500 },
            max_depth: IntRange { low: 5, high: 50 },
            learning_rate: FloatRange {
                low: 0.01,
                high: 0.21,
            },
            num_leaves: IntRange { low: 20, high: 100 },
            boosting_type: vec![BoostingType::Gbdt, BoostingType::Goss],
            min_child_samples: default_min_child_samples(),
            reg_lambda: 0.0,
        }
    }
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from("mlruns")
}

fn default_label_column() -> String {
    "booking_status".to_string()
}

fn default_id_columns() -> Vec<String> {
    vec!["Unnamed: 0".to_string(), "Booking_ID".to_string()]
}

fn default_k_neighbors() -> usize {
    5
}

fn default_selector_estimators() -> usize {
    100
}

fn default_random_state() -> u64 {
    42
}

fn default_n_iter() -> usize {
    4
}

fn default_cv() -> usize {
    2
}

fn default_n_jobs() -> i32 {
    -1
}

fn default_min_child_samples() -> usize {
    20
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        tracing::info!("Loaded configuration from {}", path.as_ref().display());
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.data_processing.validate()?;
        self.model_training.validate()
    }
}

impl DataProcessingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.no_of_features == 0 {
            return Err(invalid("no_of_features", "must be positive"));
        }
        if self.smote_k_neighbors == 0 {
            return Err(invalid("smote_k_neighbors", "must be at least 1"));
        }
        if self.selector_estimators == 0 {
            return Err(invalid("selector_estimators", "must be at least 1"));
        }
        if !self.skewness_threshold.is_finite() {
            return Err(invalid("skewness_threshold", "must be finite"));
        }
        if self.label_column.is_empty() {
            return Err(invalid("label_column", "must not be empty"));
        }
        Ok(())
    }
}

impl ModelTrainingConfig {
    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if search.n_iter == 0 {
            return Err(invalid("n_iter", "must be at least 1"));
        }
        if search.cv < 2 {
            return Err(invalid("cv", "must be at least 2"));
        }
        if self.positive_label != 0.0 && self.positive_label != 1.0 {
            return Err(invalid("positive_label", format!("expected 0 or 1, got {}", self.positive_label)));
        }

        let dist = &self.param_distribution;
        for (name, range) in [
            ("n_estimators", dist.n_estimators),
            ("max_depth", dist.max_depth),
            ("num_leaves", dist.num_leaves),
        ] {
            if range.low >= range.high {
                return Err(invalid(name, format!("empty range [{}, {})", range.low, range.high)));
            }
        }
        if dist.n_estimators.low < 1 {
            return Err(invalid("n_estimators", "must be at least 1"));
        }
        if dist.num_leaves.low < 2 {
            return Err(invalid("num_leaves", "must be at least 2"));
        }
        let lr = dist.learning_rate;
        if !(lr.low > 0.0 && lr.low <= lr.high && lr.high.is_finite()) {
            return Err(invalid("learning_rate", format!("invalid range [{}, {}]", lr.low, lr.high)));
        }
        if dist.boosting_type.is_empty() {
            return Err(invalid("boosting_type", "at least one choice is required"));
        }
        if dist.reg_lambda < 0.0 {
            return Err(invalid("reg_lambda", "must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
paths:
  raw_train: artifacts/raw/train.csv
  raw_test: artifacts/raw/test.csv
  processed_train: artifacts/processed/processed_train.csv
  processed_test: artifacts/processed/processed_test.csv
  model_output: artifacts/models/lgbm_model.json
data_processing:
  categorical_columns: [type_of_meal_plan, room_type_reserved, booking_status]
  numerical_columns: [lead_time, avg_price_per_room]
  skewness_threshold: 5
  no_of_features: 10
"#;

    #[test]
    fn test_defaults_applied() {
        let config = PipelineConfig::from_yaml_str(CONFIG).unwrap();

        assert_eq!(config.data_processing.label_column, "booking_status");
        assert_eq!(config.data_processing.id_columns, vec!["Unnamed: 0", "Booking_ID"]);
        assert_eq!(config.data_processing.random_state, 42);
        assert_eq!(config.model_training.search.n_iter, 4);
        assert_eq!(config.model_training.search.cv, 2);
        assert_eq!(config.model_training.search.scoring, Scoring::Accuracy);
        assert_eq!(config.paths.tracking_dir, PathBuf::from("mlruns"));
        assert_eq!(config.model_training.param_distribution.boosting_type.len(), 2);
        assert_eq!(config.model_training.positive_label, 0.0);
    }

    #[test]
    fn test_rejects_non_binary_positive_label() {
        let yaml = format!("{}model_training:\n  positive_label: 2\n", CONFIG);
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "positive_label"));
    }

    #[test]
    fn test_rejects_zero_features() {
        let yaml = CONFIG.replace("no_of_features: 10", "no_of_features: 0");
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "no_of_features"));
    }

    #[test]
    fn test_rejects_single_fold() {
        let yaml = format!("{}model_training:\n  search:\n    cv: 1\n", CONFIG);
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "cv"));
    }

    #[test]
    fn test_missing_section_is_yaml_error() {
        let err = PipelineConfig::from_yaml_str("paths: {}").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }
}
