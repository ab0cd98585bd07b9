//! Биннинг признаков и гистограммы градиентов для поиска разбиений

#![allow(non_snake_case)]

use ndarray::{Array2, ArrayView1};

/// Максимум бинов на признак
pub const MAX_BIN: usize = 255;

/// Признаки, дискретизированные по верхним границам бинов.
/// Строка попадает в бин `b`, если `x <= upper[b]` и `x > upper[b - 1]`.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    bins: Vec<Vec<u16>>,
    upper_bounds: Vec<Vec<f64>>,
    n_rows: usize,
}

impl BinnedMatrix {
    pub fn from_array(X: &Array2<f64>, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, u16::MAX as usize);
        let mut bins = Vec::with_capacity(X.ncols());
        let mut upper_bounds = Vec::with_capacity(X.ncols());

        for column in X.columns() {
            let bounds = bin_upper_bounds(column, max_bin);
            let last = bounds.len().saturating_sub(1);
            let column_bins = column
                .iter()
                .map(|&x| bounds.partition_point(|&u| u < x).min(last) as u16)
                .collect();
            bins.push(column_bins);
            upper_bounds.push(bounds);
        }

        Self {
            bins,
            upper_bounds,
            n_rows: X.nrows(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.bins.len()
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.upper_bounds[feature].len()
    }

    #[inline]
    pub fn bin(&self, feature: usize, row: usize) -> usize {
        self.bins[feature][row] as usize
    }

    /// Порог разбиения «бин <= b» в исходных единицах
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.upper_bounds[feature][bin]
    }
}

/// Различные значения, если их не больше `max_bin`, иначе квантили по частоте
fn bin_upper_bounds(values: ArrayView1<f64>, max_bin: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut distinct = sorted.clone();
    distinct.dedup();
    if distinct.len() <= max_bin {
        return distinct;
    }

    let n = sorted.len();
    let mut bounds: Vec<f64> = (1..=max_bin).map(|b| sorted[b * n / max_bin - 1]).collect();
    bounds.dedup();
    bounds
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinStats {
    pub grad: f64,
    pub hess: f64,
    pub count: usize,
}

impl BinStats {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }
}

/// Ограничения на разбиение
#[derive(Debug, Clone)]
pub struct SplitParams {
    pub reg_lambda: f64,
    pub min_child_samples: usize,
    pub min_child_weight: f64,
    pub min_split_gain: f64,
}

impl SplitParams {
    #[inline]
    fn score(&self, grad: f64, hess: f64) -> f64 {
        grad * grad / (hess + self.reg_lambda)
    }

    pub fn leaf_value(&self, grad: f64, hess: f64) -> f64 {
        let denom = hess + self.reg_lambda;
        if denom <= 0.0 {
            0.0
        } else {
            -grad / denom
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitInfo {
    pub feature: usize,
    pub bin: usize,
    pub threshold: f64,
    pub gain: f64,
    pub left: BinStats,
    pub right: BinStats,
}

/// Гистограмма градиентов узла: признак -> бин -> суммы
#[derive(Debug, Clone)]
pub struct Histogram {
    features: Vec<Vec<BinStats>>,
}

impl Histogram {
    pub fn build(binned: &BinnedMatrix, rows: &[usize], grad: &[f64], hess: &[f64]) -> Self {
        let features = (0..binned.n_features())
            .map(|f| {
                let mut stats = vec![BinStats::default(); binned.n_bins(f)];
                for &row in rows {
                    stats[binned.bin(f, row)].add(grad[row], hess[row]);
                }
                stats
            })
            .collect();
        Self { features }
    }

    /// Гистограмма соседа: родитель минус построенный потомок
    pub fn subtract(&self, child: &Histogram) -> Histogram {
        let features = self
            .features
            .iter()
            .zip(child.features.iter())
            .map(|(parent, child)| {
                parent
                    .iter()
                    .zip(child.iter())
                    .map(|(p, c)| BinStats {
                        grad: p.grad - c.grad,
                        hess: p.hess - c.hess,
                        count: p.count - c.count,
                    })
                    .collect()
            })
            .collect();
        Histogram { features }
    }

    /// Лучшее разбиение; при равном выигрыше остаётся первое найденное
    pub fn best_split(&self, binned: &BinnedMatrix, total: BinStats, params: &SplitParams) -> Option<SplitInfo> {
        let parent_score = params.score(total.grad, total.hess);
        let mut best: Option<SplitInfo> = None;

        for (feature, stats) in self.features.iter().enumerate() {
            let mut left = BinStats::default();
            // Последний бин не может быть левой частью: справа ничего не останется
            for (bin, bin_stats) in stats.iter().enumerate().take(stats.len().saturating_sub(1)) {
                left.grad += bin_stats.grad;
                left.hess += bin_stats.hess;
                left.count += bin_stats.count;

                let right = BinStats {
                    grad: total.grad - left.grad,
                    hess: total.hess - left.hess,
                    count: total.count - left.count,
                };
                if left.count < params.min_child_samples || right.count < params.min_child_samples {
                    continue;
                }
                if left.hess < params.min_child_weight || right.hess < params.min_child_weight {
                    continue;
                }

                let gain = params.score(left.grad, left.hess) + params.score(right.grad, right.hess) - parent_score;
                if gain <= params.min_split_gain {
                    continue;
                }
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitInfo {
                        feature,
                        bin,
                        threshold: binned.threshold(feature, bin),
                        gain,
                        left,
                        right,
                    });
                }
            }
        }

        best
    }
}
