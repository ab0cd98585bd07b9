//! Типы ошибок пайплайна

use std::fmt;

use thiserror::Error;

/// Несоответствие таблицы ожидаемой схеме
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("column '{column}' not found")]
    MissingColumn { column: String },

    #[error("column '{column}' has non-numeric value '{value}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("table has no rows")]
    EmptyTable,
}

/// Причина сбоя внутри отдельного шага
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("category '{value}' in column '{column}' was not seen during fitting")]
    UnseenCategory { column: String, value: String },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid label {value} in row {row}: {reason}")]
    InvalidLabel {
        row: usize,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("model fitting failed: {0}")]
    Fit(String),

    #[error("model not fitted")]
    NotFitted,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Шаги feature engineering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStep {
    Load,
    Clean,
    Encode,
    Skew,
    Balance,
    Select,
    Save,
}

impl fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStep::Load => "load",
            ProcessingStep::Clean => "clean",
            ProcessingStep::Encode => "encode",
            ProcessingStep::Skew => "skew",
            ProcessingStep::Balance => "balance",
            ProcessingStep::Select => "select",
            ProcessingStep::Save => "save",
        };
        f.write_str(name)
    }
}

/// Сбой feature engineering: шаг + исходная причина
#[derive(Debug, Error)]
#[error("feature engineering failed at step '{step}': {source}")]
pub struct ProcessingError {
    pub step: ProcessingStep,
    #[source]
    pub source: Error,
}

impl ProcessingError {
    pub fn new(step: ProcessingStep, source: impl Into<Error>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// Шаги обучения модели
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStep {
    Split,
    Search,
    Evaluate,
    Persist,
    Log,
}

impl fmt::Display for TrainingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainingStep::Split => "split",
            TrainingStep::Search => "search",
            TrainingStep::Evaluate => "evaluate",
            TrainingStep::Persist => "persist",
            TrainingStep::Log => "log",
        };
        f.write_str(name)
    }
}

/// Сбой обучения: шаг + исходная причина
#[derive(Debug, Error)]
#[error("model training failed at step '{step}': {source}")]
pub struct TrainingError {
    pub step: TrainingStep,
    #[source]
    pub source: Error,
}

impl TrainingError {
    pub fn new(step: TrainingStep, source: impl Into<Error>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// Привязка `Result` к шагу пайплайна
pub trait StepContext<T> {
    fn at_step(self, step: ProcessingStep) -> std::result::Result<T, ProcessingError>;
    fn at_training_step(self, step: TrainingStep) -> std::result::Result<T, TrainingError>;
}

impl<T, E: Into<Error>> StepContext<T> for std::result::Result<T, E> {
    fn at_step(self, step: ProcessingStep) -> std::result::Result<T, ProcessingError> {
        self.map_err(|e| ProcessingError::new(step, e))
    }

    fn at_training_step(self, step: TrainingStep) -> std::result::Result<T, TrainingError> {
        self.map_err(|e| TrainingError::new(step, e))
    }
}
