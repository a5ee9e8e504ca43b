//! Outside rules.
//!
//! Every occurrence of a class `d` as destination `k` of a rule
//! `lhs -> d_0 ... d_n` yields one outside rule for `d`: the outside value
//! of `d` at a node pair receives the outside value of `lhs` at the pair
//! the rule was applied to (the origin), times the inside values of the
//! other destinations (the siblings), the rule's cost atoms and its
//! rescaling factor at the origin.
//!
//! The derivation is purely structural. Along each tree, the hole's slot in
//! the rule tells how the origin relates to the current node, and every
//! sibling slot is re-expressed relative to the current node.

use crate::grammar::{CostClass, Grammar, RuleId, Slot};
use crate::tree::{NodeId, RecTree};
use std::fmt;

/// How the origin of a rule instance relates to the current node on one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lift {
    /// The hole was at `v`: the origin is the current node.
    Stay,
    /// The hole was at `va`: the origin is the parent, entered from its left child.
    FromLeft,
    /// The hole was at `vb`: the origin is the parent, entered from its right child.
    FromRight,
}

impl Lift {
    pub fn of(slot: Slot) -> Self {
        match slot {
            Slot::Current => Lift::Stay,
            Slot::Left => Lift::FromLeft,
            Slot::Right => Lift::FromRight,
        }
    }

    /// The origin node, if the current node sits where the hole requires.
    pub fn origin(self, tree: &RecTree, node: NodeId) -> Option<NodeId> {
        match self {
            Lift::Stay => Some(node),
            Lift::FromLeft if tree.is_left_child(node) => tree.parent(node),
            Lift::FromRight if tree.is_right_child(node) => tree.parent(node),
            _ => None,
        }
    }
}

/// A node relative to the current node of one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relative {
    Current,
    LeftChild,
    RightChild,
    Parent,
    Sibling,
}

impl Relative {
    /// Re-express `slot` (relative to the origin) from the current node.
    pub fn rebase(lift: Lift, slot: Slot) -> Self {
        match (lift, slot) {
            (Lift::Stay, Slot::Current) => Relative::Current,
            (Lift::Stay, Slot::Left) => Relative::LeftChild,
            (Lift::Stay, Slot::Right) => Relative::RightChild,
            (Lift::FromLeft, Slot::Left) | (Lift::FromRight, Slot::Right) => Relative::Current,
            (Lift::FromLeft, Slot::Right) | (Lift::FromRight, Slot::Left) => Relative::Sibling,
            (_, Slot::Current) => Relative::Parent,
        }
    }

    pub fn locate(self, tree: &RecTree, node: NodeId) -> Option<NodeId> {
        match self {
            Relative::Current => Some(node),
            Relative::LeftChild => tree.left(node),
            Relative::RightChild => tree.right(node),
            Relative::Parent => tree.parent(node),
            Relative::Sibling => tree.sibling(node),
        }
    }

    fn token(self, axis: u8) -> String {
        let suffix = match self {
            Relative::Current => "",
            Relative::LeftChild => "a",
            Relative::RightChild => "b",
            Relative::Parent => "p",
            Relative::Sibling => "s",
        };
        format!("v{axis}{suffix}")
    }
}

/// An inside value read by an outside rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SiblingTerm {
    pub class: CostClass,
    pub rel1: Relative,
    pub rel2: Relative,
}

/// Outside recursion for one destination occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutsideRule {
    /// Class whose outside value this rule contributes to.
    pub target: CostClass,
    /// The grammar rule the destination occurs in.
    pub rule: RuleId,
    /// Position of the destination in the rule.
    pub position: usize,
    /// The rule's left-hand class, read from the outside table at the origin.
    pub origin_class: CostClass,
    pub lift1: Lift,
    pub lift2: Lift,
    pub siblings: Vec<SiblingTerm>,
}

impl OutsideRule {
    pub fn origin(
        &self,
        tree1: &RecTree,
        v1: NodeId,
        tree2: &RecTree,
        v2: NodeId,
    ) -> Option<(NodeId, NodeId)> {
        Some((self.lift1.origin(tree1, v1)?, self.lift2.origin(tree2, v2)?))
    }

    /// Whether the origin is the current cell itself.
    pub fn is_same_cell(&self) -> bool {
        self.lift1 == Lift::Stay && self.lift2 == Lift::Stay
    }
}

impl fmt::Display for OutsideRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = |lift: Lift, axis: u8| match lift {
            Lift::Stay => format!("v{axis}"),
            _ => format!("v{axis}p"),
        };
        write!(f, "b{}(v1,v2) += ", self.target.index())?;
        for sib in &self.siblings {
            write!(f, "{}({},{}) + ", sib.class, sib.rel1.token(1), sib.rel2.token(2))?;
        }
        write!(
            f,
            "b{}({},{}) [rule {}, position {}]",
            self.origin_class.index(),
            origin(self.lift1, 1),
            origin(self.lift2, 2),
            self.rule,
            self.position
        )
    }
}

/// Derive the outside rules of both classes, in the order of
/// [`Grammar::incoming_rules_of`].
pub fn derive_outside_rules(grammar: &Grammar) -> [Vec<OutsideRule>; 2] {
    CostClass::ALL.map(|target| {
        grammar
            .incoming_rules_of(target)
            .iter()
            .map(|&(rule_id, position)| {
                let rule = grammar.rule(rule_id);
                let hole = rule.destinations[position];
                let lift1 = Lift::of(hole.slot1);
                let lift2 = Lift::of(hole.slot2);
                let siblings = rule
                    .destinations
                    .iter()
                    .enumerate()
                    .filter(|&(k, _)| k != position)
                    .map(|(_, dest)| SiblingTerm {
                        class: dest.class,
                        rel1: Relative::rebase(lift1, dest.slot1),
                        rel2: Relative::rebase(lift2, dest.slot2),
                    })
                    .collect();
                OutsideRule {
                    target,
                    rule: rule_id,
                    position,
                    origin_class: rule.lhs,
                    lift1,
                    lift2,
                    siblings,
                }
            })
            .collect()
    })
}
