//! Коррекция асимметрии распределений

use ndarray::ArrayView1;

use crate::error::SchemaError;
use crate::table::Table;

/// Выборочная асимметрия (скорректированный коэффициент Фишера-Пирсона).
/// `None` при n < 3, 0 для константной колонки.
pub fn sample_skewness(values: ArrayView1<f64>) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }

    let n_f = n as f64;
    let mean = values.sum() / n_f;
    let (m2, m3) = values.iter().fold((0.0, 0.0), |(m2, m3), &x| {
        let d = x - mean;
        (m2 + d * d, m3 + d * d * d)
    });
    let m2 = m2 / n_f;
    let m3 = m3 / n_f;

    // Константная колонка
    if m2.sqrt() <= 1e-12 * mean.abs().max(1.0) {
        return Some(0.0);
    }

    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n_f * (n_f - 1.0)).sqrt() / (n_f - 2.0))
}

/// Решает, какие числовые колонки логарифмировать, и применяет log(1+x)
#[derive(Debug, Clone)]
pub struct SkewCorrector {
    threshold: f64,
    columns: Vec<String>,
    is_fitted: bool,
}

impl SkewCorrector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            columns: Vec::new(),
            is_fitted: false,
        }
    }

    /// Колонки с |skew| > threshold по текущим значениям таблицы
    pub fn fit(&mut self, table: &Table, numerical: &[String]) -> Result<&[String], SchemaError> {
        let mut selected = Vec::new();
        for name in numerical {
            let idx = table.column_index(name)?;
            let skew = sample_skewness(table.data.column(idx));
            tracing::debug!("Skewness of {}: {:?}", name, skew);

            if let Some(skew) = skew {
                if skew.abs() > self.threshold {
                    selected.push(name.clone());
                }
            }
        }

        self.columns = selected;
        self.is_fitted = true;
        Ok(&self.columns)
    }

    pub fn transform(&self, table: &Table) -> Result<Table, SchemaError> {
        let mut out = table.clone();
        for name in &self.columns {
            let idx = out.column_index(name)?;
            out.data.column_mut(idx).mapv_inplace(f64::ln_1p);
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, table: &Table, numerical: &[String]) -> Result<Table, SchemaError> {
        self.fit(table, numerical)?;
        self.transform(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
