//! Дерево регрессии для бустинга (рост по листьям)

#![allow(non_snake_case)]

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::histogram::{BinStats, BinnedMatrix, Histogram, SplitInfo, SplitParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub num_leaves: usize,
    /// None - без ограничения
    pub max_depth: Option<usize>,
    pub learning_rate: f64,
    pub split: SplitParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct Candidate {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    histogram: Histogram,
    split: Option<SplitInfo>,
}

impl RegressionTree {
    /// Жадный рост: на каждом шаге делится лист с наибольшим выигрышем,
    /// пока листьев меньше `num_leaves`.
    pub fn grow(binned: &BinnedMatrix, grad: &[f64], hess: &[f64], rows: Vec<usize>, params: &TreeParams) -> Self {
        let total = rows.iter().fold(BinStats::default(), |mut acc, &r| {
            acc.grad += grad[r];
            acc.hess += hess[r];
            acc.count += 1;
            acc
        });

        let mut nodes = vec![TreeNode::Leaf {
            value: params.learning_rate * params.split.leaf_value(total.grad, total.hess),
        }];
        let histogram = Histogram::build(binned, &rows, grad, hess);
        let mut candidates = vec![Self::candidate(binned, 0, rows, 0, histogram, total, params)];
        let mut n_leaves = 1;

        while n_leaves < params.num_leaves {
            let mut best: Option<(usize, f64)> = None;
            for (i, candidate) in candidates.iter().enumerate() {
                if let Some(split) = &candidate.split {
                    if best.map_or(true, |(_, gain)| split.gain > gain) {
                        best = Some((i, split.gain));
                    }
                }
            }
            let Some((idx, _)) = best else { break };

            let parent = candidates.remove(idx);
            let Some(split) = parent.split else { break };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = parent
                .rows
                .iter()
                .partition(|&&r| binned.bin(split.feature, r) <= split.bin);

            let left = nodes.len();
            let right = left + 1;
            nodes[parent.node] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            nodes.push(TreeNode::Leaf {
                value: params.learning_rate * params.split.leaf_value(split.left.grad, split.left.hess),
            });
            nodes.push(TreeNode::Leaf {
                value: params.learning_rate * params.split.leaf_value(split.right.grad, split.right.hess),
            });

            // Гистограмма строится для меньшего потомка, большая - вычитанием
            let (left_hist, right_hist) = if left_rows.len() <= right_rows.len() {
                let small = Histogram::build(binned, &left_rows, grad, hess);
                let large = parent.histogram.subtract(&small);
                (small, large)
            } else {
                let small = Histogram::build(binned, &right_rows, grad, hess);
                let large = parent.histogram.subtract(&small);
                (large, small)
            };

            let depth = parent.depth + 1;
            candidates.push(Self::candidate(binned, left, left_rows, depth, left_hist, split.left, params));
            candidates.push(Self::candidate(binned, right, right_rows, depth, right_hist, split.right, params));
            n_leaves += 1;
        }

        Self { nodes }
    }

    fn candidate(
        binned: &BinnedMatrix,
        node: usize,
        rows: Vec<usize>,
        depth: usize,
        histogram: Histogram,
        total: BinStats,
        params: &TreeParams,
    ) -> Candidate {
        let can_split = params.max_depth.map_or(true, |d| depth < d)
            && rows.len() >= 2 * params.split.min_child_samples.max(1);
        let split = if can_split {
            histogram.best_split(binned, total, &params.split)
        } else {
            None
        };
        Candidate {
            node,
            rows,
            depth,
            histogram,
            split,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn is_stump(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }
}
