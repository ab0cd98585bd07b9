//! Сквозные тесты: сырые CSV -> feature engineering -> подбор модели

use std::fs;
use std::path::Path;

use reservation_ml::config::{
    DataProcessingConfig, FloatRange, IntRange, ModelTrainingConfig, ParamDistribution, PathsConfig, SearchConfig,
};
use reservation_ml::error::{Error, ProcessingStep, SchemaError, TrainingStep};
use reservation_ml::preprocessing::smote::class_counts;
use reservation_ml::tracking::{read_runs, RunStatus};
use reservation_ml::{BoostingType, FeatureEngineer, ModelArtifact, ModelSelector, RunState, Scoring, Table};
use tempfile::{tempdir, TempDir};

const HEADER: &str = "Booking_ID,type_of_meal_plan,room_type_reserved,lead_time,arrival_month,avg_price_per_room,no_of_special_requests,booking_status";
const MEALS: [&str; 3] = ["Meal Plan 1", "Meal Plan 2", "Not Selected"];
const ROOMS: [&str; 2] = ["Room_Type 1", "Room_Type 4"];

fn booking(i: usize, canceled: bool) -> String {
    format!(
        "INN{:05},{},{},{},{},{}.25,{},{}",
        i,
        MEALS[i % 3],
        ROOMS[i % 2],
        i + if canceled { 1000 } else { 0 },
        1 + i % 12,
        80 + (i * 7) % 50,
        if canceled { 0 } else { 1 + i % 3 },
        if canceled { "Canceled" } else { "Not_Canceled" },
    )
}

/// 500 строк: 300 Canceled (код 0), 200 Not_Canceled (код 1)
fn write_raw_train(path: &Path) {
    let mut lines = vec![HEADER.to_string()];
    lines.extend((0..500).map(|i| booking(i, i % 5 < 3)));
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn write_raw_test(path: &Path) {
    let mut lines = vec![HEADER.to_string()];
    lines.extend((0..100).map(|i| booking(i, i % 2 == 0)));
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn processing_config() -> DataProcessingConfig {
    DataProcessingConfig {
        label_column: "booking_status".into(),
        id_columns: vec!["Booking_ID".into()],
        categorical_columns: vec![
            "type_of_meal_plan".into(),
            "room_type_reserved".into(),
            "booking_status".into(),
        ],
        numerical_columns: vec![
            "lead_time".into(),
            "arrival_month".into(),
            "avg_price_per_room".into(),
            "no_of_special_requests".into(),
        ],
        skewness_threshold: 5.0,
        no_of_features: 3,
        smote_k_neighbors: 5,
        selector_estimators: 10,
        selector_max_depth: Some(6),
        random_state: 42,
    }
}

fn training_config() -> ModelTrainingConfig {
    ModelTrainingConfig {
        search: SearchConfig {
            n_iter: 2,
            cv: 2,
            n_jobs: -1,
            scoring: Scoring::Accuracy,
            random_state: 42,
        },
        param_distribution: ParamDistribution {
            n_estimators: IntRange { low: 5, high: 15 },
            max_depth: IntRange { low: 3, high: 6 },
            learning_rate: FloatRange { low: 0.05, high: 0.2 },
            num_leaves: IntRange { low: 4, high: 8 },
            boosting_type: vec![BoostingType::Gbdt, BoostingType::Goss],
            min_child_samples: 10,
            reg_lambda: 0.0,
        },
        positive_label: 0.0,
    }
}

fn workspace() -> (TempDir, PathsConfig) {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("raw")).unwrap();
    let paths = PathsConfig {
        raw_train: root.join("raw/train.csv"),
        raw_test: root.join("raw/test.csv"),
        processed_train: root.join("processed/processed_train.csv"),
        processed_test: root.join("processed/processed_test.csv"),
        model_output: root.join("models/lgbm_model.json"),
        tracking_dir: root.join("mlruns"),
    };
    write_raw_train(&paths.raw_train);
    write_raw_test(&paths.raw_test);
    (dir, paths)
}

#[test]
fn test_feature_engineering_shapes() {
    let (_dir, paths) = workspace();
    let processed = FeatureEngineer::new(processing_config()).run(&paths).unwrap();

    assert_eq!(processed.train.n_rows(), 600);
    assert_eq!(processed.train.n_cols(), 4);
    assert_eq!(processed.test.n_rows(), 100);
    assert_eq!(processed.test.columns, processed.train.columns);

    let counts = class_counts(&processed.train.column("booking_status").unwrap()).unwrap();
    assert_eq!(counts[&0], 300);
    assert_eq!(counts[&1], 300);

    // Файлы на диске совпадают с результатом
    let train = Table::from_csv(&paths.processed_train).unwrap();
    let test = Table::from_csv(&paths.processed_test).unwrap();
    assert_eq!(train, processed.train);
    assert_eq!(test, processed.test);
}

#[test]
fn test_full_pipeline_run() {
    let (_dir, paths) = workspace();
    FeatureEngineer::new(processing_config()).run(&paths).unwrap();

    let summary = ModelSelector::new(training_config(), "booking_status").run(&paths);
    assert!(summary.is_success(), "run failed: {:?}", summary.failure);
    assert_eq!(summary.state, RunState::Done);
    assert_eq!(summary.last_completed, RunState::Logged);

    let metrics = summary.metrics.unwrap();
    for value in [metrics.accuracy, metrics.precision, metrics.recall, metrics.f1] {
        assert!((0.0..=1.0).contains(&value));
    }
    assert!(metrics.accuracy > 0.8);

    let runs = read_runs(&paths.tracking_dir).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(Some(runs[0].run_id), summary.run_id);
    assert_eq!(runs[0].metrics["accuracy"], metrics.accuracy);
    assert!(runs[0].params.contains_key("num_leaves"));

    let run_dir = paths.tracking_dir.join(runs[0].run_id.to_string());
    assert!(run_dir.join("artifacts/datasets/processed_train.csv").exists());
    assert!(run_dir.join("artifacts/datasets/processed_test.csv").exists());
    assert!(run_dir.join("artifacts/model/lgbm_model.json").exists());
}

#[test]
fn test_search_is_reproducible() {
    let (_dir, paths) = workspace();
    let processed = FeatureEngineer::new(processing_config()).run(&paths).unwrap();

    let selector = ModelSelector::new(training_config(), "booking_status");
    let a = selector
        .train(&processed.train, &processed.test, &paths.model_output)
        .unwrap();
    let b = selector
        .train(&processed.train, &processed.test, &paths.model_output)
        .unwrap();

    assert_eq!(a.artifact.params, b.artifact.params);
    assert_eq!(a.artifact.cv_score, b.artifact.cv_score);
    assert_eq!(a.metrics, b.metrics);
}

#[test]
fn test_persisted_model_predicts_identically() {
    let (_dir, paths) = workspace();
    let processed = FeatureEngineer::new(processing_config()).run(&paths).unwrap();

    let outcome = ModelSelector::new(training_config(), "booking_status")
        .train(&processed.train, &processed.test, &paths.model_output)
        .unwrap();
    let reloaded = ModelArtifact::load(&paths.model_output).unwrap();

    assert_eq!(reloaded.params, outcome.artifact.params);
    assert_eq!(
        reloaded.predict(&processed.test).unwrap(),
        outcome.artifact.predict(&processed.test).unwrap()
    );
}

#[test]
fn test_failed_training_keeps_previous_model() {
    let (_dir, paths) = workspace();
    FeatureEngineer::new(processing_config()).run(&paths).unwrap();
    let selector = ModelSelector::new(training_config(), "booking_status");
    assert!(selector.run(&paths).is_success());
    let before = fs::read(&paths.model_output).unwrap();

    // Без метки в тестовой выборке обучение падает на разделении
    let test = Table::from_csv(&paths.processed_test).unwrap();
    test.drop_column("booking_status")
        .unwrap()
        .to_csv(&paths.processed_test)
        .unwrap();

    let summary = selector.run(&paths);
    assert_eq!(summary.state, RunState::Failed);
    let failure = summary.failure.unwrap();
    assert_eq!(failure.step, TrainingStep::Split);
    assert!(matches!(failure.source, Error::Schema(SchemaError::MissingColumn { .. })));
    assert_eq!(fs::read(&paths.model_output).unwrap(), before);

    // Упавший запуск тоже попадает в журнал
    let runs = read_runs(&paths.tracking_dir).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status, RunStatus::Finished);
    assert_eq!(runs[1].status, RunStatus::Failed);
    assert_eq!(Some(runs[1].run_id), summary.run_id);
    assert!(runs[1].metrics.is_empty());
    let run_dir = paths.tracking_dir.join(runs[1].run_id.to_string());
    assert!(run_dir.join("artifacts/datasets/processed_train.csv").exists());
}

#[test]
fn test_tracking_failure_keeps_persisted_model() {
    let (dir, mut paths) = workspace();
    FeatureEngineer::new(processing_config()).run(&paths).unwrap();
    // Каталог журнала занят обычным файлом
    paths.tracking_dir = dir.path().join("mlruns.txt");
    fs::write(&paths.tracking_dir, "not a directory").unwrap();

    let summary = ModelSelector::new(training_config(), "booking_status").run(&paths);
    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.last_completed, RunState::Persisted);
    assert_eq!(summary.failure.as_ref().map(|e| e.step), Some(TrainingStep::Log));
    assert!(summary.metrics.is_some());
    assert_eq!(summary.run_id, None);

    let artifact = ModelArtifact::load(&paths.model_output).unwrap();
    assert_eq!(Some(artifact.params), summary.best_params);
}

#[test]
fn test_missing_id_column_aborts_before_writing() {
    let (_dir, paths) = workspace();
    let mut config = processing_config();
    config.id_columns.push("Unnamed: 0".into());

    let err = FeatureEngineer::new(config).run(&paths).unwrap_err();
    assert_eq!(err.step, ProcessingStep::Clean);
    assert!(!paths.processed_train.exists());
    assert!(!paths.processed_test.exists());
}
