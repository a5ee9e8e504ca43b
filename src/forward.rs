//! Rule evaluation and the forward (inside) pass.
//!
//! `C[c][i][j]` aggregates, over every rule of class `c` that applies at
//! `(i, j)`, the product of its destinations' inside values, its cost atoms
//! and its rescaling factor. Cells are filled in postorder of both trees, so
//! every destination is final before it is read. Destinations at the very
//! same cell are read from the class evaluated just before.

use crate::chart::Chart;
use crate::grammar::{CostClass, Grammar, Rule, RuleId};
use crate::model::{ScoringModel, Site};
use crate::semiring::Semiring;
use crate::traceback::Traceback;
use crate::tree::{NodeId, RecTree};
use std::marker::PhantomData;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One chart per cost class, indexed by [`CostClass::index`].
pub type Tables<S> = [Chart<S>; 2];

pub(crate) fn empty_tables<S: Semiring>(rows: usize, cols: usize) -> Tables<S> {
    [Chart::new(rows, cols), Chart::new(rows, cols)]
}

/// Evaluates grammar rules at node pairs of two fixed trees.
pub struct Evaluator<'a, S, M> {
    grammar: &'a Grammar,
    model: &'a M,
    tree1: &'a RecTree,
    tree2: &'a RecTree,
    _semiring: PhantomData<fn() -> S>,
}

/// Result of evaluating both classes of one cell.
#[derive(Clone, Debug)]
pub(crate) struct CellUpdate<S> {
    pub values: [S; 2],
    pub best: [Option<RuleId>; 2],
    pub applied: usize,
}

impl<'a, S: Semiring, M: ScoringModel<S>> Evaluator<'a, S, M> {
    pub fn new(
        grammar: &'a Grammar,
        model: &'a M,
        tree1: &'a RecTree,
        tree2: &'a RecTree,
    ) -> Self {
        Evaluator {
            grammar,
            model,
            tree1,
            tree2,
            _semiring: PhantomData,
        }
    }

    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }

    pub fn tree1(&self) -> &'a RecTree {
        self.tree1
    }

    pub fn tree2(&self) -> &'a RecTree {
        self.tree2
    }

    pub fn site(&self, v1: NodeId, v2: NodeId) -> Site<'a> {
        Site::new(self.tree1, v1, self.tree2, v2)
    }

    /// Node pairs whose genes live in different species admit no rule.
    pub fn is_valid(&self, v1: NodeId, v2: NodeId) -> bool {
        self.tree1.species(v1) == self.tree2.species(v2)
    }

    /// Product of the rule's cost atoms and its rescaling factor at `site`.
    pub fn rule_weight(&self, rule: &Rule, site: &Site<'_>) -> S {
        let mut weight = S::one();
        for &atom in &rule.extra {
            weight = weight * self.model.atom(atom, site);
        }
        weight * self.model.rescaling(rule, site)
    }

    /// Value of one rule instance, or `None` if the guard rejects the pair
    /// or a destination's node does not exist.
    pub fn candidate<F>(&self, rule: &Rule, v1: NodeId, v2: NodeId, lookup: F) -> Option<S>
    where
        F: Fn(CostClass, NodeId, NodeId) -> S,
    {
        let site = self.site(v1, v2);
        if !rule.guard.admits(site.event1(), site.event2()) {
            return None;
        }
        let mut value = S::one();
        for dest in &rule.destinations {
            let a = dest.slot1.locate(self.tree1, v1)?;
            let b = dest.slot2.locate(self.tree2, v2)?;
            value = value * lookup(dest.class, a, b);
        }
        Some(value * self.rule_weight(rule, &site))
    }

    /// Applicable rules of `class` at `(v1, v2)` and their values, read from
    /// complete inside tables.
    pub fn candidates(
        &self,
        class: CostClass,
        v1: NodeId,
        v2: NodeId,
        inside: &Tables<S>,
    ) -> Vec<(RuleId, S)> {
        if !self.is_valid(v1, v2) {
            return Vec::new();
        }
        self.grammar
            .rules_of(class)
            .filter_map(|(id, rule)| {
                self.candidate(rule, v1, v2, |c, a, b| inside[c.index()].get(a, b).clone())
                    .map(|value| (id, value))
            })
            .collect()
    }

    /// Evaluate both classes of cell `(i, j)` in `order`.
    pub(crate) fn inside_cell(
        &self,
        order: [CostClass; 2],
        i: NodeId,
        j: NodeId,
        inside: &Tables<S>,
    ) -> CellUpdate<S> {
        let mut values = [S::zero(), S::zero()];
        let mut best = [None, None];
        let mut applied = 0;
        if !self.is_valid(i, j) {
            return CellUpdate {
                values,
                best,
                applied,
            };
        }

        for class in order {
            let mut acc = S::zero();
            let mut winner = None;
            for (rule_id, rule) in self.grammar.rules_of(class) {
                let lookup = |c: CostClass, a: NodeId, b: NodeId| {
                    if (a, b) == (i, j) {
                        values[c.index()].clone()
                    } else {
                        inside[c.index()].get(a, b).clone()
                    }
                };
                if let Some(candidate) = self.candidate(rule, i, j, lookup) {
                    applied += 1;
                    if S::improves(&candidate, &acc) {
                        winner = Some(rule_id);
                    }
                    acc = acc + candidate;
                }
            }
            values[class.index()] = acc;
            best[class.index()] = winner;
        }

        CellUpdate {
            values,
            best,
            applied,
        }
    }
}

/// Output of the forward pass.
#[derive(Clone, Debug)]
pub struct Inside<S: Semiring> {
    pub tables: Tables<S>,
    pub traceback: Option<Traceback>,
    pub valid_cells: usize,
    pub applications: usize,
}

impl<S: Semiring> Inside<S> {
    fn new(rows: usize, cols: usize, record: bool) -> Self {
        Inside {
            tables: empty_tables(rows, cols),
            traceback: record.then(|| Traceback::new(rows, cols)),
            valid_cells: 0,
            applications: 0,
        }
    }

    fn apply(&mut self, i: NodeId, j: NodeId, update: CellUpdate<S>, valid: bool) {
        let CellUpdate {
            values,
            best,
            applied,
        } = update;
        for (class, value) in CostClass::ALL.into_iter().zip(values) {
            self.tables[class.index()].set(i, j, value);
            if let Some(traceback) = self.traceback.as_mut() {
                traceback.record(class, i, j, best[class.index()]);
            }
        }
        self.valid_cells += usize::from(valid);
        self.applications += applied;
    }
}

/// Evaluate `f` at every node of one level, on the rayon pool when
/// `parallel` is set. Results keep the level's order.
#[cfg(feature = "parallel")]
pub(crate) fn map_level<T, F>(level: &[NodeId], parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(NodeId) -> T + Sync + Send,
{
    if parallel {
        level.par_iter().map(|&node| f(node)).collect()
    } else {
        level.iter().map(|&node| f(node)).collect()
    }
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn map_level<T, F>(level: &[NodeId], _parallel: bool, f: F) -> Vec<T>
where
    F: Fn(NodeId) -> T,
{
    level.iter().map(|&node| f(node)).collect()
}

/// Fill the inside tables row by row. Within a row, the cells of second-tree
/// nodes of equal height never read each other and form one level.
pub(crate) fn fill_inside<S, M>(
    eval: &Evaluator<'_, S, M>,
    order: [CostClass; 2],
    record: bool,
    parallel: bool,
) -> Inside<S>
where
    S: Semiring,
    M: ScoringModel<S>,
{
    let (rows, cols) = (eval.tree1.len(), eval.tree2.len());
    let mut inside = Inside::new(rows, cols, record);
    let levels = eval.tree2.height_levels();

    for i in eval.tree1.postorder() {
        for level in &levels {
            let tables = &inside.tables;
            let updates = map_level(level, parallel, |j| eval.inside_cell(order, i, j, tables));
            for (&j, update) in level.iter().zip(updates) {
                inside.apply(i, j, update, eval.is_valid(i, j));
            }
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::FixedCosts;
    use crate::model::{AdjacencyCosts, Adjacencies, Parsimony};
    use crate::parser::{parse_grammar, DECO_GRAMMAR};
    use crate::semiring::{Float, MinPlus};
    use crate::tree::tests::cherry;
    use crate::tree::Event;

    fn leaf(label: &str, species: &str) -> RecTree {
        let mut b = RecTree::builder();
        let l = b.leaf(label, species, Event::Extant);
        b.build(l).unwrap()
    }

    fn run<S: Semiring, M: ScoringModel<S>>(
        grammar: &Grammar,
        model: &M,
        t1: &RecTree,
        t2: &RecTree,
    ) -> Inside<S> {
        let eval = Evaluator::new(grammar, model, t1, t2);
        fill_inside(&eval, grammar.class_order().unwrap(), true, false)
    }

    #[test]
    fn test_leaf_base_case() {
        let grammar = parse_grammar("c0(v1,v2) = 0 ; Extant ; Extant").unwrap();
        let model = Parsimony::default();
        let (t1, t2) = (leaf("a", "A"), leaf("b", "A"));
        let inside: Inside<MinPlus> = run(&grammar, &model, &t1, &t2);

        assert_eq!(inside.tables[0].get(0, 0), &MinPlus::one());
        assert!(inside.tables[1].get(0, 0).is_zero());
        assert_eq!(inside.valid_cells, 1);
    }

    #[test]
    fn test_same_cell_destination() {
        let grammar = parse_grammar(
            "c0(v1,v2) = 0 ; Extant ; Extant\n\
             c1(v1,v2) = c0(v1,v2) + G ; Extant ; Extant",
        )
        .unwrap();
        let model = FixedCosts {
            gain: 2.0,
            ..Default::default()
        };
        let (t1, t2) = (leaf("a", "A"), leaf("b", "A"));
        let inside: Inside<Float> = run(&grammar, &model, &t1, &t2);

        assert_eq!(inside.tables[0].get(0, 0), &Float::new(1.0));
        assert_eq!(inside.tables[1].get(0, 0), &Float::new(2.0));
        let traceback = inside.traceback.unwrap();
        assert_eq!(traceback.best(CostClass::Adjacent, 0, 0), Some(1));
    }

    #[test]
    fn test_species_mismatch_is_absorbing() {
        let grammar = parse_grammar("c0(v1,v2) = 0 ; Extant ; Extant").unwrap();
        let model = Parsimony::default();
        let (t1, t2) = (leaf("a", "A"), leaf("b", "B"));
        let inside: Inside<MinPlus> = run(&grammar, &model, &t1, &t2);

        assert!(inside.tables[0].get(0, 0).is_zero());
        assert_eq!(inside.valid_cells, 0);
        assert_eq!(inside.applications, 0);
    }

    #[test]
    fn test_deco_parsimony_on_cherries() {
        let grammar = parse_grammar(DECO_GRAMMAR).unwrap();
        let (t1, t2) = (cherry("1"), cherry("2"));

        let both: Adjacencies = [("1a", "2a"), ("1b", "2b")].into_iter().collect();
        let model = Parsimony::new(AdjacencyCosts::default(), both);
        let inside: Inside<MinPlus> = run(&grammar, &model, &t1, &t2);
        assert_eq!(inside.tables[1].get(2, 2), &MinPlus::new(0.0));
        assert_eq!(inside.tables[0].get(2, 2), &MinPlus::new(2.0));
        // a and b live in different species
        assert!(inside.tables[1].get(0, 1).is_zero());

        let one: Adjacencies = [("1a", "2a")].into_iter().collect();
        let model = Parsimony::new(AdjacencyCosts::default(), one);
        let inside: Inside<MinPlus> = run(&grammar, &model, &t1, &t2);
        assert_eq!(inside.tables[1].get(2, 2), &MinPlus::new(1.0));
        assert_eq!(inside.tables[0].get(2, 2), &MinPlus::new(1.0));
        assert_eq!(inside.tables[1].get(1, 1), &MinPlus::zero());
        assert_eq!(inside.tables[0].get(1, 1), &MinPlus::one());
    }

    #[test]
    fn test_candidates_match_cell_value() {
        let grammar = parse_grammar(DECO_GRAMMAR).unwrap();
        let (t1, t2) = (cherry("1"), cherry("2"));
        let model = Parsimony::new(AdjacencyCosts::default(), [("1a", "2a")].into_iter().collect());
        let inside: Inside<MinPlus> = run(&grammar, &model, &t1, &t2);
        let eval = Evaluator::new(&grammar, &model, &t1, &t2);

        for class in CostClass::ALL {
            let total = eval
                .candidates(class, 2, 2, &inside.tables)
                .into_iter()
                .fold(MinPlus::zero(), |acc, (_, v)| acc + v);
            assert_eq!(&total, inside.tables[class.index()].get(2, 2));
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_serial() {
        let grammar = parse_grammar(DECO_GRAMMAR).unwrap();
        let (t1, t2) = (cherry("1"), cherry("2"));
        let model = Parsimony::new(AdjacencyCosts::default(), [("1b", "2b")].into_iter().collect());
        let eval = Evaluator::new(&grammar, &model, &t1, &t2);
        let order = grammar.class_order().unwrap();

        let serial: Inside<MinPlus> = fill_inside(&eval, order, true, false);
        let parallel: Inside<MinPlus> = fill_inside(&eval, order, true, true);
        assert_eq!(serial.tables, parallel.tables);
        assert_eq!(serial.traceback, parallel.traceback);
        assert_eq!(serial.applications, parallel.applications);
    }
}
