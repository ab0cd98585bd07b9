//! Локальный трекинг экспериментов: параметры, метрики и артефакты запуска

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

const RUNS_LOG: &str = "runs.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Запись о запуске; одна строка `runs.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Пути относительно каталога запуска
    pub artifacts: Vec<PathBuf>,
}

pub struct ExperimentTracker {
    root: PathBuf,
    record: RunRecord,
}

impl ExperimentTracker {
    /// Новый запуск: каталог `<root>/<run_id>/artifacts`
    pub fn start(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let run_id = Uuid::new_v4();
        fs::create_dir_all(root.join(run_id.to_string()).join("artifacts"))?;

        tracing::info!("Started tracking run {} in {}", run_id, root.display());
        Ok(Self {
            root,
            record: RunRecord {
                run_id,
                started_at: Utc::now(),
                finished_at: None,
                status: RunStatus::Running,
                params: BTreeMap::new(),
                metrics: BTreeMap::new(),
                artifacts: Vec::new(),
            },
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.record.run_id
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(self.record.run_id.to_string())
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) {
        self.record.params.insert(key.to_string(), value.to_string());
    }

    pub fn log_params(&mut self, params: &BTreeMap<String, String>) {
        for (key, value) in params {
            self.record.params.insert(key.clone(), value.clone());
        }
    }

    pub fn log_metric(&mut self, key: &str, value: f64) {
        self.record.metrics.insert(key.to_string(), value);
    }

    /// Копирует файл в `artifacts/<subdir>/`
    pub fn log_artifact(&mut self, path: impl AsRef<Path>, subdir: &str) -> Result<PathBuf> {
        let path = path.as_ref();
        let relative = Path::new("artifacts")
            .join(subdir)
            .join(path.file_name().unwrap_or(path.as_os_str()));
        let target = self.run_dir().join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &target)?;

        tracing::debug!("Logged artifact {} -> {}", path.display(), target.display());
        self.record.artifacts.push(relative);
        Ok(target)
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Закрывает запуск и дописывает его в журнал
    pub fn finish(mut self, status: RunStatus) -> Result<RunRecord> {
        self.record.status = status;
        self.record.finished_at = Some(Utc::now());

        fs::write(
            self.run_dir().join("run.json"),
            serde_json::to_string_pretty(&self.record)?,
        )?;

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(RUNS_LOG))?;
        writeln!(log, "{}", serde_json::to_string(&self.record)?)?;

        tracing::info!(
            "Finished tracking run {} ({} params, {} metrics, {} artifacts)",
            self.record.run_id,
            self.record.params.len(),
            self.record.metrics.len(),
            self.record.artifacts.len()
        );
        Ok(self.record)
    }
}

/// Все завершённые запуски из журнала
pub fn read_runs(root: impl AsRef<Path>) -> Result<Vec<RunRecord>> {
    let path = root.as_ref().join(RUNS_LOG);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            runs.push(serde_json::from_str(&line)?);
        }
    }
    Ok(runs)
}
