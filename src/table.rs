//! Табличные данные и CSV ввод/вывод

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Axis};

use crate::error::{Result, SchemaError};

/// Сырые данные: строковые ячейки как в исходном CSV
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> std::result::Result<Self, SchemaError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SchemaError::RaggedRow {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(String::from).collect());
        }

        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            rows.len(),
            columns.len(),
            path.as_ref().display()
        );
        Ok(Self::new(columns, rows)?)
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> std::result::Result<usize, SchemaError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SchemaError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Значения одной колонки
    pub fn column(&self, name: &str) -> std::result::Result<Vec<&str>, SchemaError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Удаляет колонки; отсутствующая колонка - ошибка схемы
    pub fn drop_columns(&self, names: &[String]) -> std::result::Result<RawTable, SchemaError> {
        let mut drop = HashSet::new();
        for name in names {
            drop.insert(self.column_index(name)?);
        }

        let keep: Vec<usize> = (0..self.columns.len()).filter(|i| !drop.contains(i)).collect();
        Ok(RawTable {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Удаляет точные дубликаты строк, оставляя первое вхождение
    pub fn drop_duplicates(&self) -> RawTable {
        let mut seen: HashSet<&[String]> = HashSet::new();
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            if seen.insert(row.as_slice()) {
                rows.push(row.clone());
            }
        }
        RawTable {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Полностью числовая таблица
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub data: Array2<f64>,
}

impl Table {
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> std::result::Result<Self, SchemaError> {
        if columns.len() != data.ncols() {
            return Err(SchemaError::RaggedRow {
                row: 0,
                expected: columns.len(),
                found: data.ncols(),
            });
        }
        Ok(Self { columns, data })
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn column_index(&self, name: &str) -> std::result::Result<usize, SchemaError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SchemaError::MissingColumn {
                column: name.to_string(),
            })
    }

    pub fn column(&self, name: &str) -> std::result::Result<Array1<f64>, SchemaError> {
        let idx = self.column_index(name)?;
        Ok(self.data.column(idx).to_owned())
    }

    /// Проекция на колонки в заданном порядке
    pub fn select_columns(&self, names: &[String]) -> std::result::Result<Table, SchemaError> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Table {
            columns: names.to_vec(),
            data: self.data.select(Axis(1), &indices),
        })
    }

    /// Отделяет колонку от остальных: (остальные, колонка)
    pub fn split_column(&self, name: &str) -> std::result::Result<(Table, Array1<f64>), SchemaError> {
        let idx = self.column_index(name)?;
        let rest: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, c)| c.clone())
            .collect();
        let target = self.data.column(idx).to_owned();
        Ok((self.select_columns(&rest)?, target))
    }

    pub fn drop_column(&self, name: &str) -> std::result::Result<Table, SchemaError> {
        Ok(self.split_column(name)?.0)
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let raw = RawTable::from_csv(path)?;
        Ok(Self::from_raw(&raw)?)
    }

    /// Разбор всех ячеек как f64
    pub fn from_raw(raw: &RawTable) -> std::result::Result<Self, SchemaError> {
        let mut data = Array2::zeros((raw.n_rows(), raw.columns.len()));
        for (i, row) in raw.rows.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                data[[i, j]] = parse_number(cell).ok_or_else(|| SchemaError::NonNumeric {
                    column: raw.columns[j].clone(),
                    row: i,
                    value: cell.clone(),
                })?;
            }
        }
        Ok(Self {
            columns: raw.columns.clone(),
            data,
        })
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(&self.columns)?;
        for row in self.data.rows() {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Запись через временный файл и переименование
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let staged = self.stage_csv(path.as_ref())?;
        fs::rename(&staged, path.as_ref())?;
        tracing::info!("Saved {} rows to {}", self.n_rows(), path.as_ref().display());
        Ok(())
    }

    /// Пишет таблицу рядом с `path` во временный файл и возвращает его путь
    pub fn stage_csv(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staged = staging_path(path);
        if let Err(e) = self.write_csv(&staged) {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }
        Ok(staged)
    }
}

pub(crate) fn staging_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

pub(crate) fn backup_path(path: &Path) -> PathBuf {
    sibling_path(path, ".bak")
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

pub(crate) fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    match trimmed {
        "True" | "true" => Some(1.0),
        "False" | "false" => Some(0.0),
        _ => trimmed.parse::<f64>().ok(),
    }
}
