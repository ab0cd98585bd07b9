//! SMOTE: балансировка классов синтетическими примерами

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};

/// Результат балансировки
#[derive(Debug, Clone)]
pub struct Resampled {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Синтетических строк по классам
    pub n_synthetic: BTreeMap<i64, usize>,
}

pub struct Smote {
    k_neighbors: usize,
    seed: u64,
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            k_neighbors: k_neighbors.max(1),
            seed,
        }
    }

    /// Дополняет каждый класс до размера наибольшего.
    /// Синтетические строки идут после исходных.
    pub fn fit_resample(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Resampled> {
        let groups = class_indices(y)?;
        if groups.len() < 2 {
            return Err(Error::InsufficientData(format!(
                "need at least 2 classes for balancing, found {}",
                groups.len()
            )));
        }

        let target = groups.values().map(Vec::len).max().unwrap_or(0);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<f64> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        // BTreeMap: порядок классов фиксирован, генерация воспроизводима
        for (&class, members) in &groups {
            let n_to_generate = target - members.len();
            n_synthetic.insert(class, n_to_generate);
            if n_to_generate == 0 {
                continue;
            }
            if members.len() < 2 {
                return Err(Error::InsufficientData(format!(
                    "class {} has {} sample(s), at least 2 are needed to interpolate",
                    class,
                    members.len()
                )));
            }

            let k = self.k_neighbors.min(members.len() - 1);
            let neighbors = nearest_neighbors(x, members, k);

            for _ in 0..n_to_generate {
                let pick = rng.gen_range(0..members.len() * k);
                let (row, nn) = (pick / k, pick % k);
                let gap: f64 = rng.gen();

                let base = x.row(members[row]);
                let neighbor = x.row(members[neighbors[row][nn]]);
                synthetic_x.push(
                    base.iter()
                        .zip(neighbor.iter())
                        .map(|(&b, &n)| b + gap * (n - b))
                        .collect(),
                );
                synthetic_y.push(class as f64);
            }
        }

        let n_original = x.nrows();
        let n_total = n_original + synthetic_x.len();
        let result_x = Array2::from_shape_fn((n_total, x.ncols()), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[i - n_original][j]
            }
        });

        let mut all_y = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(Resampled {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

/// Индексы строк по классам; метки обязаны быть целыми
pub fn class_indices(y: &Array1<f64>) -> Result<BTreeMap<i64, Vec<usize>>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        if !label.is_finite() || label.fract() != 0.0 {
            return Err(Error::InvalidLabel {
                row: i,
                value: label,
                reason: "class labels must be integers",
            });
        }
        groups.entry(label as i64).or_default().push(i);
    }
    Ok(groups)
}

pub fn class_counts(y: &Array1<f64>) -> Result<BTreeMap<i64, usize>> {
    Ok(class_indices(y)?
        .into_iter()
        .map(|(class, idx)| (class, idx.len()))
        .collect())
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// k ближайших соседей внутри класса (позиции в `members`).
/// Сама точка исключается по индексу, равные расстояния - по порядку строк.
fn nearest_neighbors(x: &Array2<f64>, members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .enumerate()
        .map(|(pos, &row)| {
            let point = x.row(row);
            let mut dists: Vec<(f64, usize)> = members
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != pos)
                .map(|(other, &other_row)| (squared_distance(point, x.row(other_row)), other))
                .collect();
            dists.sort_by(|a, b| a.0.total_cmp(&b.0));
            dists.into_iter().take(k).map(|(_, other)| other).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced(n_major: usize, n_minor: usize) -> (Array2<f64>, Array1<f64>) {
        let n = n_major + n_minor;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| (i * (j + 1)) as f64 + 0.5 * j as f64);
        let y = Array1::from_shape_fn(n, |i| if i < n_major { 0.0 } else { 1.0 });
        (x, y)
    }

    #[test]
    fn test_balances_to_majority_count() {
        let (x, y) = imbalanced(30, 12);
        let result = Smote::new(5, 42).fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y).unwrap();
        assert_eq!(counts[&0], 30);
        assert_eq!(counts[&1], 30);
        assert_eq!(result.x.nrows(), 60);
        assert_eq!(result.n_synthetic[&1], 18);
        assert_eq!(result.n_synthetic[&0], 0);
    }

    #[test]
    fn test_originals_kept_in_front() {
        let (x, y) = imbalanced(10, 4);
        let result = Smote::new(3, 7).fit_resample(&x, &y).unwrap();
        assert_eq!(result.x.slice(ndarray::s![..14, ..]), x);
        assert_eq!(result.y.slice(ndarray::s![..14]), y);
    }

    #[test]
    fn test_synthetic_rows_lie_between_minority_samples() {
        let (x, y) = imbalanced(20, 5);
        let result = Smote::new(5, 1).fit_resample(&x, &y).unwrap();

        let minority = x.slice(ndarray::s![20.., ..]);
        for row in result.x.slice(ndarray::s![25.., ..]).rows() {
            for j in 0..3 {
                let col = minority.column(j);
                let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                assert!(row[j] >= lo && row[j] <= hi);
            }
        }
    }

    #[test]
    fn test_same_seed_same_samples() {
        let (x, y) = imbalanced(25, 6);
        let a = Smote::new(5, 42).fit_resample(&x, &y).unwrap();
        let b = Smote::new(5, 42).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_already_balanced_is_unchanged() {
        let (x, y) = imbalanced(8, 8);
        let result = Smote::new(5, 42).fit_resample(&x, &y).unwrap();
        assert_eq!(result.x, x);
        assert_eq!(result.y, y);
    }

    #[test]
    fn test_single_class_rejected() {
        let (x, _) = imbalanced(5, 0);
        let y = Array1::zeros(5);
        assert!(matches!(
            Smote::new(5, 42).fit_resample(&x, &y),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_fractional_label_rejected() {
        let (x, mut y) = imbalanced(5, 2);
        y[3] = 0.5;
        assert!(matches!(
            Smote::new(5, 42).fit_resample(&x, &y),
            Err(Error::InvalidLabel { row: 3, .. })
        ));
    }
}
