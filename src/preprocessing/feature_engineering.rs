//! Feature engineering для модели отмены бронирований

use std::fs;
use std::path::Path;

use ndarray::{concatenate, Axis};

use super::encoding::{CategoryEncoder, EncodingMap};
use super::feature_selection::{FeatureImportance, FeatureSelector};
use super::skewness::SkewCorrector;
use super::smote::{class_counts, Smote};
use crate::config::{DataProcessingConfig, PathsConfig};
use crate::error::{Error, ProcessingError, ProcessingStep, SchemaError, StepContext};
use crate::table::{backup_path, RawTable, Table};

/// Результат обработки вместе с данными для наблюдаемости
#[derive(Debug, Clone)]
pub struct ProcessedDatasets {
    pub train: Table,
    pub test: Table,
    pub encodings: Vec<EncodingMap>,
    pub skewed_columns: Vec<String>,
    pub ranking: Vec<FeatureImportance>,
}

pub struct FeatureEngineer {
    config: DataProcessingConfig,
}

impl FeatureEngineer {
    pub fn new(config: DataProcessingConfig) -> Self {
        Self { config }
    }

    /// Clean -> Encode -> Skew -> Balance (только train) -> Select.
    /// Ничего не пишет на диск.
    pub fn process(&self, raw_train: &RawTable, raw_test: &RawTable) -> Result<ProcessedDatasets, ProcessingError> {
        let label = self.config.label_column.as_str();

        // Clean
        let train = self.clean(raw_train).at_step(ProcessingStep::Clean)?;
        let test = self.clean(raw_test).at_step(ProcessingStep::Clean)?;
        tracing::info!(
            "Cleaned data: train {} rows, test {} rows",
            train.n_rows(),
            test.n_rows()
        );

        // Encode: словарь строится по train и применяется к обеим выборкам
        let mut encoder = CategoryEncoder::new();
        encoder
            .fit(&train, &self.config.categorical_columns)
            .at_step(ProcessingStep::Encode)?;
        let train = encoder.transform(&train).at_step(ProcessingStep::Encode)?;
        let test = encoder.transform(&test).at_step(ProcessingStep::Encode)?;
        let train = Table::from_raw(&train).at_step(ProcessingStep::Encode)?;
        let test = Table::from_raw(&test).at_step(ProcessingStep::Encode)?;

        // Skew
        let mut corrector = SkewCorrector::new(self.config.skewness_threshold);
        let train = corrector
            .fit_transform(&train, &self.config.numerical_columns)
            .at_step(ProcessingStep::Skew)?;
        let test = corrector.transform(&test).at_step(ProcessingStep::Skew)?;

        // Balance
        let (features, y) = train.split_column(label).at_step(ProcessingStep::Balance)?;
        tracing::info!(
            "Class counts before balancing: {:?}",
            class_counts(&y).at_step(ProcessingStep::Balance)?
        );
        let resampled = Smote::new(self.config.smote_k_neighbors, self.config.random_state)
            .fit_resample(&features.data, &y)
            .at_step(ProcessingStep::Balance)?;
        tracing::info!(
            "Class counts after balancing: {:?} (synthetic: {:?})",
            class_counts(&resampled.y).at_step(ProcessingStep::Balance)?,
            resampled.n_synthetic
        );

        let mut columns = features.columns;
        columns.push(label.to_string());
        let data = concatenate(Axis(1), &[resampled.x.view(), resampled.y.view().insert_axis(Axis(1))])
            .map_err(|e| Error::Fit(e.to_string()))
            .at_step(ProcessingStep::Balance)?;
        let balanced = Table::new(columns, data).at_step(ProcessingStep::Balance)?;

        // Select
        let selector = FeatureSelector::new(
            self.config.no_of_features,
            self.config.selector_estimators,
            self.config.random_state,
        )
        .with_max_depth(self.config.selector_max_depth);
        let ranking = selector.rank(&balanced, label).at_step(ProcessingStep::Select)?;
        let selected = selector.selected_columns(&ranking, label);
        tracing::info!("Selected features: {:?}", &selected[..selected.len() - 1]);

        let train = balanced.select_columns(&selected).at_step(ProcessingStep::Select)?;
        let test = test.select_columns(&selected).at_step(ProcessingStep::Select)?;

        Ok(ProcessedDatasets {
            train,
            test,
            encodings: encoder.into_maps(),
            skewed_columns: corrector.columns().to_vec(),
            ranking,
        })
    }

    fn clean(&self, raw: &RawTable) -> Result<RawTable, SchemaError> {
        raw.column_index(&self.config.label_column)?;
        let dropped = raw.drop_columns(&self.config.id_columns)?;
        let deduped = dropped.drop_duplicates();
        if deduped.n_rows() < dropped.n_rows() {
            tracing::info!("Dropped {} duplicate rows", dropped.n_rows() - deduped.n_rows());
        }
        if deduped.n_rows() == 0 {
            return Err(SchemaError::EmptyTable);
        }
        Ok(deduped)
    }

    /// Загрузка, обработка и запись обеих выборок.
    /// Файлы появляются только если обработаны и записаны обе.
    pub fn run(&self, paths: &PathsConfig) -> Result<ProcessedDatasets, ProcessingError> {
        let raw_train = RawTable::from_csv(&paths.raw_train).at_step(ProcessingStep::Load)?;
        let raw_test = RawTable::from_csv(&paths.raw_test).at_step(ProcessingStep::Load)?;

        let processed = self.process(&raw_train, &raw_test)?;

        let staged_train = processed
            .train
            .stage_csv(&paths.processed_train)
            .at_step(ProcessingStep::Save)?;
        let staged_test = match processed.test.stage_csv(&paths.processed_test) {
            Ok(path) => path,
            Err(e) => {
                let _ = fs::remove_file(&staged_train);
                return Err(ProcessingError::new(ProcessingStep::Save, e));
            }
        };
        let committed = commit_pair(
            (staged_train.as_path(), paths.processed_train.as_path()),
            (staged_test.as_path(), paths.processed_test.as_path()),
        );
        if let Err(e) = committed {
            let _ = fs::remove_file(&staged_train);
            let _ = fs::remove_file(&staged_test);
            return Err(ProcessingError::new(ProcessingStep::Save, e));
        }

        tracing::info!(
            "Processed data saved: {} ({} rows), {} ({} rows)",
            paths.processed_train.display(),
            processed.train.n_rows(),
            paths.processed_test.display(),
            processed.test.n_rows()
        );
        Ok(processed)
    }
}

/// Переименовывает обе подготовленные выборки на место.
/// Если второе переименование не удалось, прежний train возвращается из резервной копии.
fn commit_pair(
    (staged_train, train): (&Path, &Path),
    (staged_test, test): (&Path, &Path),
) -> crate::error::Result<()> {
    let backup = backup_path(train);
    let had_previous = train.is_file();
    if had_previous {
        fs::rename(train, &backup)?;
    }

    if let Err(e) = fs::rename(staged_train, train) {
        if had_previous {
            let _ = fs::rename(&backup, train);
        }
        return Err(e.into());
    }
    if let Err(e) = fs::rename(staged_test, test) {
        if had_previous {
            let _ = fs::rename(&backup, train);
        } else {
            let _ = fs::remove_file(train);
        }
        return Err(e.into());
    }

    if had_previous {
        let _ = fs::remove_file(&backup);
    }
    Ok(())
}
