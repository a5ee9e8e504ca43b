//! Per-case marginals.
//!
//! `W[i][j][label]` aggregates, over the rule instances applicable at
//! `(i, j)` whose case label is `label`, the inside weight of the instance
//! times the outside value of its left-hand class. Summed over the labels of
//! one class it gives back `C[c][i][j] * B[c][i][j]`.

use crate::chart::{Chart, LabelTensor};
use crate::forward::{map_level, Evaluator, Tables};
use crate::grammar::CostClass;
use crate::label::{CaseLabel, LabelIndex};
use crate::model::ScoringModel;
use crate::semiring::{Float, Semiring};
use crate::tree::NodeId;
use std::fmt;

/// A case label no rule instance produced for the given trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnreachableLabel {
    pub index: usize,
    pub label: CaseLabel,
}

impl fmt::Display for UnreachableLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case {} is never produced", self.label)
    }
}

/// The label tensor of one solve.
#[derive(Clone, Debug)]
pub struct MarginalTensor<S: Semiring> {
    tensor: LabelTensor<S>,
    unreachable: Vec<UnreachableLabel>,
    instances: usize,
}

impl<S: Semiring> MarginalTensor<S> {
    pub fn get(&self, i: NodeId, j: NodeId, label: usize) -> &S {
        self.tensor.get(i, j, label)
    }

    pub fn cell(&self, i: NodeId, j: NodeId) -> &[S] {
        self.tensor.cell(i, j)
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.tensor.shape()
    }

    pub fn tensor(&self) -> &LabelTensor<S> {
        &self.tensor
    }

    /// Labels with no applicable instance at any node pair.
    pub fn unreachable(&self) -> &[UnreachableLabel] {
        &self.unreachable
    }

    /// Number of rule instances that contributed.
    pub fn instances(&self) -> usize {
        self.instances
    }

    /// Aggregate of the entries whose label rewrites `class`.
    pub fn class_weight(&self, labels: &LabelIndex, i: NodeId, j: NodeId, class: CostClass) -> S {
        let cell = self.cell(i, j);
        labels
            .class_labels(class)
            .into_iter()
            .fold(S::zero(), |acc, k| acc + cell[k].clone())
    }
}

impl MarginalTensor<Float> {
    /// Probability that each node pair is in `class`, given the partition
    /// function `total`.
    pub fn class_probabilities(
        &self,
        labels: &LabelIndex,
        class: CostClass,
        total: Float,
    ) -> Chart<Float> {
        let (rows, cols, _) = self.shape();
        let mut probabilities = Chart::new(rows, cols);
        if total.is_zero() {
            return probabilities;
        }
        let class_labels = labels.class_labels(class);
        for i in 0..rows {
            for j in 0..cols {
                let cell = self.cell(i, j);
                let weight: f64 = class_labels.iter().map(|&k| cell[k].value()).sum();
                probabilities.set(i, j, Float::new(weight / total.value()));
            }
        }
        probabilities
    }
}

/// Combine complete inside and outside tables into the label tensor.
pub(crate) fn combine<S, M>(
    eval: &Evaluator<'_, S, M>,
    labels: &LabelIndex,
    inside: &Tables<S>,
    outside: &Tables<S>,
    parallel: bool,
) -> MarginalTensor<S>
where
    S: Semiring,
    M: ScoringModel<S>,
{
    let (tree1, tree2) = (eval.tree1(), eval.tree2());
    let grammar = eval.grammar();
    let rows: Vec<NodeId> = tree1.postorder().collect();

    let contributions = map_level(&rows, parallel, |i| {
        let mut entries: Vec<(NodeId, usize, S)> = Vec::new();
        for j in tree2.postorder() {
            if !eval.is_valid(i, j) {
                continue;
            }
            for (rule_id, rule) in grammar.rules() {
                let lookup =
                    |c: CostClass, a: NodeId, b: NodeId| inside[c.index()].get(a, b).clone();
                if let Some(value) = eval.candidate(rule, i, j, lookup) {
                    let weight = value * outside[rule.lhs.index()].get(i, j).clone();
                    entries.push((j, labels.label_of(rule_id), weight));
                }
            }
        }
        entries
    });

    let mut tensor = LabelTensor::new(tree1.len(), tree2.len(), labels.len());
    let mut produced = vec![false; labels.len()];
    let mut instances = 0;
    for (&i, entries) in rows.iter().zip(contributions) {
        for (j, label, weight) in entries {
            produced[label] = true;
            instances += 1;
            tensor.add(i, j, label, weight);
        }
    }

    let unreachable = produced
        .iter()
        .enumerate()
        .filter(|(_, &seen)| !seen)
        .map(|(index, _)| UnreachableLabel {
            index,
            label: labels.get(index).clone(),
        })
        .collect();

    MarginalTensor {
        tensor,
        unreachable,
        instances,
    }
}
