//! Подбор, оценка и сохранение модели отмены бронирований

#![allow(non_snake_case)]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gradient_boosting::{GradientBoostingClassifier, HyperParams};
use super::metrics::EvaluationMetrics;
use super::search::{CandidateResult, RandomizedSearch};
use crate::config::{ModelTrainingConfig, PathsConfig};
use crate::error::{Error, Result, StepContext, TrainingError, TrainingStep};
use crate::table::{staging_path, Table};
use crate::tracking::{ExperimentTracker, RunStatus};

/// Сериализуемый снимок обученной модели
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub params: HyperParams,
    pub cv_score: f64,
    pub model: GradientBoostingClassifier,
}

impl ModelArtifact {
    /// Атомарная запись: временный файл рядом с целевым, затем переименование.
    /// При ошибке прежний артефакт остаётся нетронутым.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staged = staging_path(path);
        let written = serde_json::to_vec(self)
            .map_err(Error::from)
            .and_then(|bytes| fs::write(&staged, bytes).map_err(Error::from))
            .and_then(|_| fs::rename(&staged, path).map_err(Error::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        tracing::info!("Model saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Предсказание по таблице: колонки берутся по именам признаков модели
    pub fn predict(&self, table: &Table) -> Result<Array1<f64>> {
        let features = table.select_columns(&self.feature_names)?;
        self.model.predict(&features.data)
    }
}

/// Состояние запуска обучения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Started,
    Split,
    Searched,
    Evaluated,
    Persisted,
    Logged,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Started => "STARTED",
            RunState::Split => "SPLIT",
            RunState::Searched => "SEARCHED",
            RunState::Evaluated => "EVALUATED",
            RunState::Persisted => "PERSISTED",
            RunState::Logged => "LOGGED",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Итог запуска: `run` никогда не возвращает ошибку, она лежит здесь
#[derive(Debug)]
pub struct RunSummary {
    pub state: RunState,
    /// Последнее успешно пройденное состояние
    pub last_completed: RunState,
    pub failure: Option<TrainingError>,
    pub metrics: Option<EvaluationMetrics>,
    pub best_params: Option<HyperParams>,
    pub model_path: Option<PathBuf>,
    pub run_id: Option<Uuid>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub metrics: EvaluationMetrics,
    pub cv_results: Vec<CandidateResult>,
}

pub struct ModelSelector {
    config: ModelTrainingConfig,
    label_column: String,
}

impl ModelSelector {
    pub fn new(config: ModelTrainingConfig, label_column: impl Into<String>) -> Self {
        Self {
            config,
            label_column: label_column.into(),
        }
    }

    /// Split -> Search -> Evaluate -> Persist
    pub fn train(
        &self,
        train: &Table,
        test: &Table,
        model_path: &Path,
    ) -> std::result::Result<TrainingOutcome, TrainingError> {
        let mut state = RunState::Started;
        self.train_tracked(train, test, model_path, &mut state)
    }

    fn train_tracked(
        &self,
        train: &Table,
        test: &Table,
        model_path: &Path,
        state: &mut RunState,
    ) -> std::result::Result<TrainingOutcome, TrainingError> {
        let (train_x, y_train) = train.split_column(&self.label_column).at_training_step(TrainingStep::Split)?;
        let (test_x, y_test) = test.split_column(&self.label_column).at_training_step(TrainingStep::Split)?;
        let test_x = test_x
            .select_columns(&train_x.columns)
            .at_training_step(TrainingStep::Split)?;
        advance(state, RunState::Split);
        tracing::info!(
            "Split: train {}x{}, test {}x{}",
            train_x.n_rows(),
            train_x.n_cols(),
            test_x.n_rows(),
            test_x.n_cols()
        );

        let search = RandomizedSearch::new(
            self.config.param_distribution.clone(),
            self.config.search.clone(),
        );
        let result = search
            .fit(&train_x.data, &y_train, self.config.positive_label)
            .at_training_step(TrainingStep::Search)?;
        advance(state, RunState::Searched);
        tracing::info!("Best parameters: {:?}", result.best_params.to_map());

        let metrics = evaluate(&result.model, &test_x.data, &y_test, self.config.positive_label)
            .at_training_step(TrainingStep::Evaluate)?;
        advance(state, RunState::Evaluated);
        for (name, value) in metrics.as_pairs() {
            tracing::info!("{}: {:.4}", name, value);
        }

        let artifact = ModelArtifact {
            feature_names: train_x.columns.clone(),
            params: result.best_params,
            cv_score: result.best_score,
            model: result.model,
        };
        artifact.save(model_path).at_training_step(TrainingStep::Persist)?;
        advance(state, RunState::Persisted);

        Ok(TrainingOutcome {
            artifact,
            metrics,
            cv_results: result.cv_results,
        })
    }

    /// Полный запуск по путям из конфигурации; ошибки не пробрасываются.
    /// Запуск в журнале экспериментов открывается до обучения, упавший запуск
    /// записывается со статусом `failed`.
    pub fn run(&self, paths: &PathsConfig) -> RunSummary {
        let mut state = RunState::Started;
        let mut summary = RunSummary {
            state: RunState::Started,
            last_completed: RunState::Started,
            failure: None,
            metrics: None,
            best_params: None,
            model_path: None,
            run_id: None,
        };

        let mut tracker = ExperimentTracker::start(&paths.tracking_dir);
        match &tracker {
            Ok(t) => summary.run_id = Some(t.run_id()),
            Err(e) => tracing::warn!("Experiment tracking unavailable: {}", e),
        }

        let steps = self.run_steps(paths, &mut state, &mut summary, tracker.as_mut().ok());
        let result = match steps {
            // Модель уже сохранена: сбой журнала её не откатывает
            Ok(()) => finish_tracking(tracker, &mut state),
            Err(e) => {
                if let Ok(tracker) = tracker {
                    record_failure(tracker, &e);
                }
                Err(e)
            }
        };

        summary.last_completed = state;
        match result {
            Ok(()) => {
                advance(&mut state, RunState::Done);
                summary.state = RunState::Done;
                tracing::info!("Model training completed");
            }
            Err(e) => {
                summary.state = RunState::Failed;
                tracing::error!(
                    "Training run failed after {}: {} (caused by: {:?})",
                    summary.last_completed,
                    e,
                    std::error::Error::source(&e).map(|s| s.to_string())
                );
                summary.failure = Some(e);
            }
        }
        summary
    }

    fn run_steps(
        &self,
        paths: &PathsConfig,
        state: &mut RunState,
        summary: &mut RunSummary,
        mut tracker: Option<&mut ExperimentTracker>,
    ) -> std::result::Result<(), TrainingError> {
        let train = Table::from_csv(&paths.processed_train).at_training_step(TrainingStep::Split)?;
        let test = Table::from_csv(&paths.processed_test).at_training_step(TrainingStep::Split)?;
        if let Some(tracker) = tracker.as_mut() {
            tracker.log_param("scoring", self.config.search.scoring);
            tracker.log_param("positive_label", self.config.positive_label);
            tracker
                .log_artifact(&paths.processed_train, "datasets")
                .and_then(|_| tracker.log_artifact(&paths.processed_test, "datasets"))
                .at_training_step(TrainingStep::Log)?;
        }

        let outcome = self.train_tracked(&train, &test, &paths.model_output, state)?;
        summary.metrics = Some(outcome.metrics);
        summary.best_params = Some(outcome.artifact.params.clone());
        summary.model_path = Some(paths.model_output.clone());

        if let Some(tracker) = tracker.as_mut() {
            tracker.log_params(&outcome.artifact.params.to_map());
            tracker.log_metric("cv_score", outcome.artifact.cv_score);
            for (name, value) in outcome.metrics.as_pairs() {
                tracker.log_metric(name, value);
            }
            tracker
                .log_artifact(&paths.model_output, "model")
                .at_training_step(TrainingStep::Log)?;
        }
        Ok(())
    }
}

fn finish_tracking(
    tracker: Result<ExperimentTracker>,
    state: &mut RunState,
) -> std::result::Result<(), TrainingError> {
    tracker
        .and_then(|t| t.finish(RunStatus::Finished))
        .at_training_step(TrainingStep::Log)?;
    advance(state, RunState::Logged);
    Ok(())
}

fn record_failure(mut tracker: ExperimentTracker, error: &TrainingError) {
    tracker.log_param("failed_step", error.step);
    tracker.log_param("error", error);
    if let Err(e) = tracker.finish(RunStatus::Failed) {
        tracing::warn!("Could not record failed run: {}", e);
    }
}

fn advance(state: &mut RunState, next: RunState) {
    tracing::debug!("Training run: {} -> {}", state, next);
    *state = next;
}

fn evaluate(
    model: &GradientBoostingClassifier,
    X: &ndarray::Array2<f64>,
    y: &Array1<f64>,
    positive_label: f64,
) -> Result<EvaluationMetrics> {
    let y_pred = model.predict(X)?;
    EvaluationMetrics::compute(y, &y_pred, positive_label)
}
