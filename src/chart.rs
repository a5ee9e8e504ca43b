//! Dense charts over node pairs.
//!
//! Every table of the DP is indexed by a pair of postorder ids, so it is
//! stored row-major in a flat vector: row `i` is a node of the first tree,
//! column `j` a node of the second. Entries start at the absorbing zero.

use crate::semiring::Semiring;
use crate::tree::NodeId;

/// One value per node pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Chart<S: Semiring> {
    rows: usize,
    cols: usize,
    values: Vec<S>,
}

impl<S: Semiring> Chart<S> {
    /// Create a chart filled with `S::zero()`.
    pub fn new(rows: usize, cols: usize) -> Self {
        Chart {
            rows,
            cols,
            values: vec![S::zero(); rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, i: NodeId, j: NodeId) -> &S {
        &self.values[i * self.cols + j]
    }

    pub fn set(&mut self, i: NodeId, j: NodeId, value: S) {
        self.values[i * self.cols + j] = value;
    }

    /// Aggregate `delta` into the entry, returning the new value.
    pub fn add(&mut self, i: NodeId, j: NodeId, delta: S) -> S {
        let slot = &mut self.values[i * self.cols + j];
        *slot = slot.clone() + delta;
        slot.clone()
    }

    pub fn row(&self, i: NodeId) -> &[S] {
        &self.values[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterate over `(i, j, value)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId, &S)> {
        let cols = self.cols.max(1);
        self.values
            .iter()
            .enumerate()
            .map(move |(k, v)| (k / cols, k % cols, v))
    }

    /// Number of entries that are not the absorbing zero.
    pub fn support(&self) -> usize {
        self.values.iter().filter(|v| !v.is_zero()).count()
    }
}

/// One value per node pair and case label.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelTensor<S: Semiring> {
    rows: usize,
    cols: usize,
    labels: usize,
    values: Vec<S>,
}

impl<S: Semiring> LabelTensor<S> {
    pub fn new(rows: usize, cols: usize, labels: usize) -> Self {
        LabelTensor {
            rows,
            cols,
            labels,
            values: vec![S::zero(); rows * cols * labels],
        }
    }

    /// `(rows, cols, labels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.labels)
    }

    fn offset(&self, i: NodeId, j: NodeId) -> usize {
        (i * self.cols + j) * self.labels
    }

    pub fn get(&self, i: NodeId, j: NodeId, label: usize) -> &S {
        &self.values[self.offset(i, j) + label]
    }

    pub fn add(&mut self, i: NodeId, j: NodeId, label: usize, delta: S) {
        let k = self.offset(i, j) + label;
        self.values[k] = self.values[k].clone() + delta;
    }

    /// All label entries of one node pair.
    pub fn cell(&self, i: NodeId, j: NodeId) -> &[S] {
        let start = self.offset(i, j);
        &self.values[start..start + self.labels]
    }
}
