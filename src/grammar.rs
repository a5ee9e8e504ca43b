//! Grammar model for the pair-of-trees DP.
//!
//! A rule rewrites a cost class at a node pair `(v1, v2)` into a product of
//! destinations (cost classes at the same pair or at children of either
//! node) and cost atoms. It only applies when the reconciliation events of
//! `v1` and `v2` belong to its guard.

use crate::label::CaseLabel;
use crate::tree::{Event, NodeId, RecTree};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Index of a rule in its [`Grammar`], in insertion order.
pub type RuleId = usize;

/// Error raised when a rule or a whole grammar cannot be evaluated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("rule for {class} has an empty guard on tree {tree}")]
    EmptyGuard { class: CostClass, tree: u8 },

    #[error("dangling cost class c{0}")]
    DanglingClass(usize),

    #[error("rule for {0} references {0}(v1,v2) and would depend on itself")]
    SelfReference(CostClass),

    #[error("c0 and c1 reference each other at the same node pair")]
    CyclicClasses,
}

/// The two cost classes of a node pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CostClass {
    /// The two genes are not adjacent (`c0`).
    NonAdjacent = 0,
    /// The two genes are adjacent (`c1`).
    Adjacent = 1,
}

impl CostClass {
    pub const ALL: [CostClass; 2] = [CostClass::NonAdjacent, CostClass::Adjacent];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self, GrammarError> {
        match index {
            0 => Ok(CostClass::NonAdjacent),
            1 => Ok(CostClass::Adjacent),
            other => Err(GrammarError::DanglingClass(other)),
        }
    }

    pub fn other(self) -> Self {
        match self {
            CostClass::NonAdjacent => CostClass::Adjacent,
            CostClass::Adjacent => CostClass::NonAdjacent,
        }
    }
}

impl fmt::Display for CostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.index())
    }
}

/// Position of a destination relative to the node of one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Current,
    Left,
    Right,
}

impl Slot {
    /// Grammar spelling on the given tree axis (1 or 2), e.g. `v1a`.
    pub fn token(self, axis: u8) -> String {
        let suffix = match self {
            Slot::Current => "",
            Slot::Left => "a",
            Slot::Right => "b",
        };
        format!("v{axis}{suffix}")
    }

    pub fn locate(self, tree: &RecTree, node: NodeId) -> Option<NodeId> {
        match self {
            Slot::Current => Some(node),
            Slot::Left => tree.left(node),
            Slot::Right => tree.right(node),
        }
    }
}

/// A cost class evaluated at a slot of each tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    pub class: CostClass,
    pub slot1: Slot,
    pub slot2: Slot,
}

impl Destination {
    pub fn new(class: CostClass, slot1: Slot, slot2: Slot) -> Self {
        Destination {
            class,
            slot1,
            slot2,
        }
    }

    /// Whether this destination is the very cell being computed.
    pub fn is_same_cell(&self) -> bool {
        self.slot1 == Slot::Current && self.slot2 == Slot::Current
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{})",
            self.class,
            self.slot1.token(1),
            self.slot2.token(2)
        )
    }
}

/// Admissible reconciliation events at `v1` and `v2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Guard {
    pub tree1: BTreeSet<Event>,
    pub tree2: BTreeSet<Event>,
}

impl Guard {
    pub fn new(
        tree1: impl IntoIterator<Item = Event>,
        tree2: impl IntoIterator<Item = Event>,
    ) -> Self {
        Guard {
            tree1: tree1.into_iter().collect(),
            tree2: tree2.into_iter().collect(),
        }
    }

    pub fn admits(&self, event1: Event, event2: Event) -> bool {
        self.tree1.contains(&event1) && self.tree2.contains(&event2)
    }

    /// Whether either tree's event set contains `event`.
    pub fn mentions(&self, event: Event) -> bool {
        self.tree1.contains(&event) || self.tree2.contains(&event)
    }
}

/// Extra multiplicative term of a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CostAtom {
    /// The identity of the product.
    Zero,
    /// Cost of gaining an adjacency.
    AdjGain,
    /// Cost of breaking an adjacency.
    AdjBreak,
    /// Identity if the two extant genes are adjacent, absorbing otherwise.
    IsAdj,
    /// Identity if the two extant genes are not adjacent, absorbing otherwise.
    IsntAdj,
}

impl CostAtom {
    pub fn name(self) -> &'static str {
        match self {
            CostAtom::Zero => "ZERO",
            CostAtom::AdjGain => "AdjGain",
            CostAtom::AdjBreak => "AdjBreak",
            CostAtom::IsAdj => "IsAdj",
            CostAtom::IsntAdj => "IsntAdj",
        }
    }
}

impl fmt::Display for CostAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CostAtom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "ZERO" => Ok(CostAtom::Zero),
            "G" | "AdjGain" => Ok(CostAtom::AdjGain),
            "B" | "AdjBreak" => Ok(CostAtom::AdjBreak),
            "IsAdj" => Ok(CostAtom::IsAdj),
            "IsntAdj" => Ok(CostAtom::IsntAdj),
            other => Err(other.to_string()),
        }
    }
}

/// One grammar case: `lhs(v1,v2) = dest * ... * atom * ... ; guard1 ; guard2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub lhs: CostClass,
    pub destinations: Vec<Destination>,
    pub guard: Guard,
    pub extra: Vec<CostAtom>,
}

impl Rule {
    pub fn new(
        lhs: CostClass,
        destinations: Vec<Destination>,
        guard: Guard,
        extra: Vec<CostAtom>,
    ) -> Self {
        Rule {
            lhs,
            destinations,
            guard,
            extra,
        }
    }

    /// A rule with no destinations.
    pub fn is_base(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Canonical case label of this rule.
    pub fn label(&self) -> CaseLabel {
        CaseLabel::of(self)
    }

    fn validate(&self) -> Result<(), GrammarError> {
        if self.guard.tree1.is_empty() {
            return Err(GrammarError::EmptyGuard {
                class: self.lhs,
                tree: 1,
            });
        }
        if self.guard.tree2.is_empty() {
            return Err(GrammarError::EmptyGuard {
                class: self.lhs,
                tree: 2,
            });
        }
        if self
            .destinations
            .iter()
            .any(|d| d.class == self.lhs && d.is_same_cell())
        {
            return Err(GrammarError::SelfReference(self.lhs));
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(v1,v2) = ", self.lhs)?;
        let mut terms: Vec<String> = self.destinations.iter().map(|d| d.to_string()).collect();
        terms.extend(self.extra.iter().map(|a| a.to_string()));
        if terms.is_empty() {
            terms.push(CostAtom::Zero.to_string());
        }
        write!(f, "{}", terms.join(" + "))?;
        for events in [&self.guard.tree1, &self.guard.tree2] {
            write!(f, " ;")?;
            for event in events {
                write!(f, " {}", event)?;
            }
        }
        Ok(())
    }
}

/// Reverse index: for each class, every `(rule, position)` whose destination
/// at `position` is that class.
#[derive(Clone, Debug, Default)]
pub struct IncomingIndex([Vec<(RuleId, usize)>; 2]);

impl IncomingIndex {
    pub fn get(&self, class: CostClass) -> &[(RuleId, usize)] {
        &self.0[class.index()]
    }
}

/// An ordered collection of rules.
#[derive(Clone, Debug, Default)]
pub struct Grammar {
    rules: Vec<Rule>,
    by_class: [Vec<RuleId>; 2],
    incoming: OnceLock<IncomingIndex>,
}

impl Grammar {
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Validate and append a rule.
    pub fn add_rule(&mut self, rule: Rule) -> Result<RuleId, GrammarError> {
        rule.validate()?;
        let id = self.rules.len();
        self.by_class[rule.lhs.index()].push(id);
        self.rules.push(rule);
        self.incoming = OnceLock::new();
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules.iter().enumerate()
    }

    /// Rules whose left-hand side is `class`, in insertion order.
    pub fn rules_of(&self, class: CostClass) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.by_class[class.index()]
            .iter()
            .map(move |&id| (id, &self.rules[id]))
    }

    /// Every `(rule, position)` pair with `class` as destination. Built on
    /// first use and cached.
    pub fn incoming_rules_of(&self, class: CostClass) -> &[(RuleId, usize)] {
        self.incoming
            .get_or_init(|| self.build_incoming_index())
            .get(class)
    }

    fn build_incoming_index(&self) -> IncomingIndex {
        let mut index = IncomingIndex::default();
        for (rule_id, rule) in self.rules() {
            for (pos, dest) in rule.destinations.iter().enumerate() {
                index.0[dest.class.index()].push((rule_id, pos));
            }
        }
        index
    }

    /// Order in which the classes of one cell must be evaluated: a class
    /// referenced at `(v1,v2)` by the other class comes first.
    pub fn class_order(&self) -> Result<[CostClass; 2], GrammarError> {
        let depends_on_other = |class: CostClass| {
            self.rules_of(class).any(|(_, rule)| {
                rule.destinations
                    .iter()
                    .any(|d| d.class != class && d.is_same_cell())
            })
        };
        let c0_needs_c1 = depends_on_other(CostClass::NonAdjacent);
        let c1_needs_c0 = depends_on_other(CostClass::Adjacent);
        match (c0_needs_c1, c1_needs_c0) {
            (true, true) => Err(GrammarError::CyclicClasses),
            (true, false) => Ok([CostClass::Adjacent, CostClass::NonAdjacent]),
            _ => Ok([CostClass::NonAdjacent, CostClass::Adjacent]),
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
