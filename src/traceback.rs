//! Best-rule record and scenario reconstruction.
//!
//! During the forward pass the evaluator remembers, for every cell and
//! class, the last rule whose candidate changed the aggregate. For the
//! optimisation semirings that is an optimal rule, so following the record
//! from the root pair rebuilds one optimal scenario. Stochastic sampling
//! instead draws rules in proportion to their inside weight.
//!
//! [`ScenarioLister`] enumerates derivations from complete inside tables,
//! either all of them or only the co-optimal ones, up to a cap.

use crate::forward::{Evaluator, Tables};
use crate::grammar::{CostClass, Grammar, RuleId};
use crate::label::CaseLabel;
use crate::model::ScoringModel;
use crate::semiring::Semiring;
use crate::tree::{NodeId, RecTree};
use rustc_hash::FxHashMap;

/// Default cap on the number of listed co-optimal scenarios.
pub const MAX_CO_OPTIMAL: usize = 1000;

/// Per-cell best rule for both cost classes.
#[derive(Clone, Debug, PartialEq)]
pub struct Traceback {
    cols: usize,
    best: [Vec<Option<RuleId>>; 2],
}

impl Traceback {
    pub fn new(rows: usize, cols: usize) -> Self {
        Traceback {
            cols,
            best: [vec![None; rows * cols], vec![None; rows * cols]],
        }
    }

    pub fn record(&mut self, class: CostClass, i: NodeId, j: NodeId, rule: Option<RuleId>) {
        self.best[class.index()][i * self.cols + j] = rule;
    }

    pub fn best(&self, class: CostClass, i: NodeId, j: NodeId) -> Option<RuleId> {
        self.best[class.index()][i * self.cols + j]
    }

    /// Follow the record from `(class, i, j)`. `None` if some cell on the
    /// way has no recorded rule.
    pub fn scenario(
        &self,
        grammar: &Grammar,
        tree1: &RecTree,
        tree2: &RecTree,
        class: CostClass,
        i: NodeId,
        j: NodeId,
    ) -> Option<Scenario> {
        let rule_id = self.best(class, i, j)?;
        let rule = grammar.rule(rule_id);
        let mut children = Vec::with_capacity(rule.destinations.len());
        for dest in &rule.destinations {
            let a = dest.slot1.locate(tree1, i)?;
            let b = dest.slot2.locate(tree2, j)?;
            children.push(self.scenario(grammar, tree1, tree2, dest.class, a, b)?);
        }
        Some(Scenario {
            class,
            v1: i,
            v2: j,
            rule: rule_id,
            label: rule.label(),
            children,
        })
    }
}

/// A derivation tree: one rule instance per node pair visited.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub class: CostClass,
    pub v1: NodeId,
    pub v2: NodeId,
    pub rule: RuleId,
    pub label: CaseLabel,
    pub children: Vec<Scenario>,
}

impl Scenario {
    /// Node pairs the scenario declares adjacent, in preorder.
    pub fn adjacencies(&self) -> Vec<(NodeId, NodeId)> {
        let mut pairs = Vec::new();
        self.walk(&mut |s| {
            if s.class == CostClass::Adjacent {
                pairs.push((s.v1, s.v2));
            }
        });
        pairs
    }

    /// Number of rule instances in the derivation.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Scenario::size).sum::<usize>()
    }

    fn walk<F: FnMut(&Scenario)>(&self, visit: &mut F) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Which rule instances a scenario listing follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Listing {
    /// Every instance whose value ties the cell value. Meaningful for
    /// idempotent semirings such as `MinPlus`.
    CoOptimal,
    /// Every instance with a non-absorbing value.
    All,
}

/// Enumerates scenarios from complete inside tables. Results are memoised
/// per cell and truncated to `limit` at every cell.
pub struct ScenarioLister<'e, 'a, S: Semiring, M> {
    eval: &'e Evaluator<'a, S, M>,
    inside: &'e Tables<S>,
    listing: Listing,
    limit: usize,
    memo: FxHashMap<(CostClass, NodeId, NodeId), Vec<Scenario>>,
}

impl<'e, 'a, S: Semiring, M: ScoringModel<S>> ScenarioLister<'e, 'a, S, M> {
    pub fn new(
        eval: &'e Evaluator<'a, S, M>,
        inside: &'e Tables<S>,
        listing: Listing,
        limit: usize,
    ) -> Self {
        ScenarioLister {
            eval,
            inside,
            listing,
            limit,
            memo: FxHashMap::default(),
        }
    }

    fn keeps(&self, value: &S, target: &S) -> bool {
        if value.is_zero() {
            return false;
        }
        match self.listing {
            Listing::All => true,
            Listing::CoOptimal => (target.clone() + value.clone()).approx_eq(value),
        }
    }

    /// Scenarios rooted at the root pair, over both classes.
    pub fn roots(&mut self) -> Vec<Scenario> {
        let (i, j) = (self.eval.tree1().root(), self.eval.tree2().root());
        let total = CostClass::ALL.into_iter().fold(S::zero(), |acc, class| {
            acc + self.inside[class.index()].get(i, j).clone()
        });
        let mut scenarios = Vec::new();
        for class in CostClass::ALL {
            if !self.keeps(self.inside[class.index()].get(i, j), &total) {
                continue;
            }
            let remaining = self.limit.saturating_sub(scenarios.len());
            scenarios.extend(self.cell(class, i, j).into_iter().take(remaining));
        }
        scenarios
    }

    /// Scenarios of `class` rooted at `(i, j)`.
    pub fn cell(&mut self, class: CostClass, i: NodeId, j: NodeId) -> Vec<Scenario> {
        if let Some(found) = self.memo.get(&(class, i, j)) {
            return found.clone();
        }
        let target = self.inside[class.index()].get(i, j).clone();
        let (tree1, tree2) = (self.eval.tree1(), self.eval.tree2());
        let mut scenarios = Vec::new();

        for (rule_id, value) in self.eval.candidates(class, i, j, self.inside) {
            if scenarios.len() >= self.limit {
                break;
            }
            if !self.keeps(&value, &target) {
                continue;
            }
            let rule = self.eval.grammar().rule(rule_id);
            let mut partial: Vec<Vec<Scenario>> = vec![Vec::new()];
            for dest in &rule.destinations {
                let (Some(a), Some(b)) = (dest.slot1.locate(tree1, i), dest.slot2.locate(tree2, j))
                else {
                    partial.clear();
                    break;
                };
                let options = self.cell(dest.class, a, b);
                partial = partial
                    .into_iter()
                    .flat_map(|prefix| {
                        options.iter().map(move |option| {
                            let mut children = prefix.clone();
                            children.push(option.clone());
                            children
                        })
                    })
                    .take(self.limit)
                    .collect();
                if partial.is_empty() {
                    break;
                }
            }
            let remaining = self.limit - scenarios.len();
            scenarios.extend(partial.into_iter().take(remaining).map(|children| Scenario {
                class,
                v1: i,
                v2: j,
                rule: rule_id,
                label: rule.label(),
                children,
            }));
        }

        self.memo.insert((class, i, j), scenarios.clone());
        scenarios
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::fill_inside;
    use crate::model::tests::FixedCosts;
    use crate::parser::parse_grammar;
    use crate::tree::tests::cherry;
    use crate::tree::Event;

    #[test]
    fn test_record_and_follow() {
        let grammar = parse_grammar(
            "c0 = 0 ; Extant ; Extant\n\
             c1 = c1(v1a,v2a) + c0(v1b,v2b) + B ; Spec ; Spec\n\
             c1 = IsAdj ; Extant ; Extant",
        )
        .unwrap();
        let t1 = cherry("1");
        let t2 = cherry("2");
        let mut record = Traceback::new(3, 3);
        record.record(CostClass::Adjacent, 2, 2, Some(1));
        record.record(CostClass::Adjacent, 0, 0, Some(2));
        record.record(CostClass::NonAdjacent, 1, 1, Some(0));

        let scenario = record
            .scenario(&grammar, &t1, &t2, CostClass::Adjacent, 2, 2)
            .unwrap();
        assert_eq!(scenario.size(), 3);
        assert_eq!(scenario.label.as_str(), "C1_SPEC_SPEC_C0V1BV2B_C1V1AV2A");
        assert_eq!(scenario.adjacencies(), vec![(2, 2), (0, 0)]);

        record.record(CostClass::NonAdjacent, 1, 1, None);
        assert!(record
            .scenario(&grammar, &t1, &t2, CostClass::Adjacent, 2, 2)
            .is_none());
    }

    #[test]
    fn test_listing_follows_same_cell_rules() {
        let grammar = parse_grammar(
            "c0 = 0 ; Extant ; Extant\n\
             c1 = c0(v1,v2) + G ; Extant ; Extant",
        )
        .unwrap();
        let model = FixedCosts {
            gain: 2.0,
            ..Default::default()
        };
        let mut b = RecTree::builder();
        let l = b.leaf("a", "A", Event::Extant);
        let t1 = b.build(l).unwrap();
        let t2 = t1.clone();
        let eval = Evaluator::new(&grammar, &model, &t1, &t2);
        let inside = fill_inside(&eval, grammar.class_order().unwrap(), false, false).tables;

        let all = ScenarioLister::new(&eval, &inside, Listing::All, 10).roots();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].class, CostClass::Adjacent);
        assert_eq!(all[1].children[0].class, CostClass::NonAdjacent);
        assert_eq!(all[1].size(), 2);

        // 1 + 2 is not a tie for the real-valued sum
        let best = ScenarioLister::new(&eval, &inside, Listing::CoOptimal, 10).roots();
        assert!(best.is_empty());
    }
}
