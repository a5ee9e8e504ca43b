//! Inside/outside solver over a pair of reconciled trees.
//!
//! The solver owns a validated grammar and a scoring model. Everything that
//! depends only on the grammar (case labels, outside rules, the evaluation
//! order of the two classes inside one cell) is built once in
//! [`Solver::new`]; [`Solver::solve`] then runs the passes for one tree pair.

use crate::backward::fill_outside;
use crate::chart::Chart;
use crate::forward::{fill_inside, Evaluator, Tables};
use crate::grammar::{CostClass, Grammar, GrammarError, RuleId};
use crate::label::LabelIndex;
use crate::marginal::{combine, MarginalTensor};
use crate::model::ScoringModel;
use crate::outside::{derive_outside_rules, OutsideRule};
use crate::semiring::{Float, Semiring};
use crate::traceback::{Listing, Scenario, ScenarioLister, Traceback};
use crate::tree::{NodeId, RecTree};
use rand::Rng;
use std::marker::PhantomData;
use tracing::{debug, info_span, warn};

/// Configuration for the solver.
#[derive(Debug, Clone, Default)]
pub struct SolverConfig {
    /// Run the backward pass and build the label tensor.
    pub outside: bool,
    /// Keep the best rule of every cell for [`Solver::backtrack`].
    pub traceback: bool,
    /// Evaluate independent cells on the rayon pool (needs the `parallel` feature).
    pub parallel: bool,
}

/// Statistics about one solve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub cells: usize,
    pub valid_cells: usize,
    pub rule_applications: usize,
    pub outside_applications: usize,
    pub marginal_instances: usize,
}

/// Tables produced by one solve.
#[derive(Debug, Clone)]
pub struct Solution<S: Semiring> {
    inside: Tables<S>,
    outside: Option<Tables<S>>,
    marginals: Option<MarginalTensor<S>>,
    traceback: Option<Traceback>,
    stats: SolverStats,
    root: (NodeId, NodeId),
}

impl<S: Semiring> Solution<S> {
    pub fn inside(&self, class: CostClass) -> &Chart<S> {
        &self.inside[class.index()]
    }

    pub fn outside(&self, class: CostClass) -> Option<&Chart<S>> {
        self.outside.as_ref().map(|tables| &tables[class.index()])
    }

    pub fn marginals(&self) -> Option<&MarginalTensor<S>> {
        self.marginals.as_ref()
    }

    pub fn traceback(&self) -> Option<&Traceback> {
        self.traceback.as_ref()
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// The pair of tree roots.
    pub fn root(&self) -> (NodeId, NodeId) {
        self.root
    }

    pub fn root_value(&self, class: CostClass) -> &S {
        let (i, j) = self.root;
        self.inside(class).get(i, j)
    }

    /// Both classes aggregated at the root pair: the optimal cost, the
    /// partition function or the scenario count, depending on `S`.
    pub fn total(&self) -> S {
        CostClass::ALL
            .into_iter()
            .fold(S::zero(), |acc, class| acc + self.root_value(class).clone())
    }

    /// The root class a traceback starts from; `None` if both are absorbing.
    pub fn best_root_class(&self) -> Option<CostClass> {
        let mut acc = S::zero();
        let mut best = None;
        for class in CostClass::ALL {
            let value = self.root_value(class);
            if S::improves(value, &acc) {
                best = Some(class);
            }
            acc = acc + value.clone();
        }
        best
    }
}

/// Grammar-driven DP engine for one scoring model.
pub struct Solver<S: Semiring, M> {
    grammar: Grammar,
    model: M,
    labels: LabelIndex,
    outside_rules: [Vec<OutsideRule>; 2],
    class_order: [CostClass; 2],
    config: SolverConfig,
    _semiring: PhantomData<fn() -> S>,
}

impl<S: Semiring, M: ScoringModel<S>> Solver<S, M> {
    /// Validate the grammar and derive everything that does not depend on the trees.
    pub fn new(grammar: Grammar, model: M) -> Result<Self, GrammarError> {
        let class_order = grammar.class_order()?;
        let labels = LabelIndex::new(&grammar);
        let outside_rules = derive_outside_rules(&grammar);
        debug!(
            rules = grammar.len(),
            labels = labels.len(),
            outside_rules = outside_rules[0].len() + outside_rules[1].len(),
            "grammar prepared"
        );

        Ok(Solver {
            grammar,
            model,
            labels,
            outside_rules,
            class_order,
            config: SolverConfig::default(),
            _semiring: PhantomData,
        })
    }

    /// Create a solver with custom configuration.
    pub fn with_config(
        grammar: Grammar,
        model: M,
        config: SolverConfig,
    ) -> Result<Self, GrammarError> {
        let mut solver = Self::new(grammar, model)?;
        solver.config = config;
        Ok(solver)
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn outside_rules(&self, class: CostClass) -> &[OutsideRule] {
        &self.outside_rules[class.index()]
    }

    /// Order in which the two classes of a cell are computed by the forward pass.
    pub fn class_order(&self) -> [CostClass; 2] {
        self.class_order
    }

    /// Run the configured passes on a tree pair.
    pub fn solve(&self, tree1: &RecTree, tree2: &RecTree) -> Solution<S> {
        let span = info_span!("solve", tree1 = tree1.len(), tree2 = tree2.len());
        let _enter = span.enter();

        let parallel = self.config.parallel;
        let eval = Evaluator::new(&self.grammar, &self.model, tree1, tree2);

        let inside = fill_inside(&eval, self.class_order, self.config.traceback, parallel);
        let mut stats = SolverStats {
            cells: tree1.len() * tree2.len(),
            valid_cells: inside.valid_cells,
            rule_applications: inside.applications,
            ..Default::default()
        };
        debug!(
            valid_cells = stats.valid_cells,
            applications = stats.rule_applications,
            "inside pass complete"
        );

        let (outside, marginals) = if self.config.outside {
            let outside = fill_outside(
                &eval,
                &self.outside_rules,
                self.class_order,
                &inside.tables,
                parallel,
            );
            stats.outside_applications = outside.applications;
            debug!(applications = outside.applications, "outside pass complete");

            let marginals =
                combine(&eval, &self.labels, &inside.tables, &outside.tables, parallel);
            stats.marginal_instances = marginals.instances();
            for unreachable in marginals.unreachable() {
                warn!(label = %unreachable.label, "case label never produced");
            }
            debug!(instances = marginals.instances(), "label tensor complete");
            (Some(outside.tables), Some(marginals))
        } else {
            (None, None)
        };

        Solution {
            inside: inside.tables,
            outside,
            marginals,
            traceback: inside.traceback,
            stats,
            root: (tree1.root(), tree2.root()),
        }
    }

    /// Rebuild one optimal scenario from the traceback record. `None` if the
    /// solve kept no record or every root value is absorbing.
    pub fn backtrack(
        &self,
        solution: &Solution<S>,
        tree1: &RecTree,
        tree2: &RecTree,
    ) -> Option<Scenario> {
        let record = solution.traceback()?;
        let class = solution.best_root_class()?;
        let (i, j) = solution.root();
        record.scenario(&self.grammar, tree1, tree2, class, i, j)
    }

    /// Every co-optimal scenario, at most `limit` of them. Ties are judged
    /// by the semiring's aggregate, so this is meant for `MinPlus`.
    pub fn co_optimal_scenarios(
        &self,
        solution: &Solution<S>,
        tree1: &RecTree,
        tree2: &RecTree,
        limit: usize,
    ) -> Vec<Scenario> {
        self.list(solution, tree1, tree2, Listing::CoOptimal, limit)
    }

    /// Every scenario with a non-absorbing value, at most `limit` of them.
    pub fn all_scenarios(
        &self,
        solution: &Solution<S>,
        tree1: &RecTree,
        tree2: &RecTree,
        limit: usize,
    ) -> Vec<Scenario> {
        self.list(solution, tree1, tree2, Listing::All, limit)
    }

    fn list(
        &self,
        solution: &Solution<S>,
        tree1: &RecTree,
        tree2: &RecTree,
        listing: Listing,
        limit: usize,
    ) -> Vec<Scenario> {
        let eval = Evaluator::new(&self.grammar, &self.model, tree1, tree2);
        let scenarios = ScenarioLister::new(&eval, &solution.inside, listing, limit).roots();
        debug!(?listing, scenarios = scenarios.len(), "scenarios listed");
        scenarios
    }
}

impl<M: ScoringModel<Float>> Solver<Float, M> {
    /// Draw a scenario with probability proportional to its Boltzmann weight.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        solution: &Solution<Float>,
        tree1: &RecTree,
        tree2: &RecTree,
        rng: &mut R,
    ) -> Option<Scenario> {
        let roots: Vec<(CostClass, Float)> = CostClass::ALL
            .into_iter()
            .map(|class| (class, *solution.root_value(class)))
            .collect();
        let class = pick(&roots, rng)?;
        let eval = Evaluator::new(&self.grammar, &self.model, tree1, tree2);
        let (i, j) = solution.root();
        self.sample_cell(&eval, &solution.inside, class, i, j, rng)
    }

    fn sample_cell<R: Rng + ?Sized>(
        &self,
        eval: &Evaluator<'_, Float, M>,
        inside: &Tables<Float>,
        class: CostClass,
        i: NodeId,
        j: NodeId,
        rng: &mut R,
    ) -> Option<Scenario> {
        let candidates: Vec<(RuleId, Float)> = eval.candidates(class, i, j, inside);
        let rule_id = pick(&candidates, rng)?;
        let rule = self.grammar.rule(rule_id);
        let mut children = Vec::with_capacity(rule.destinations.len());
        for dest in &rule.destinations {
            let a = dest.slot1.locate(eval.tree1(), i)?;
            let b = dest.slot2.locate(eval.tree2(), j)?;
            children.push(self.sample_cell(eval, inside, dest.class, a, b, rng)?);
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

/// Choose an item with probability proportional to its weight.
fn pick<T: Copy, R: Rng + ?Sized>(weighted: &[(T, Float)], rng: &mut R) -> Option<T> {
    let total: f64 = weighted.iter().map(|(_, w)| w.value()).sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for &(item, weight) in weighted {
        cumulative += weight.value();
        if target < cumulative {
            return Some(item);
        }
    }
    weighted
        .iter()
        .rev()
        .find(|(_, w)| w.value() > 0.0)
        .map(|&(item, _)| item)
}

/// Builder for a configured [`Solver`].
pub struct SolverBuilder<S: Semiring, M> {
    grammar: Grammar,
    model: M,
    config: SolverConfig,
    _semiring: PhantomData<fn() -> S>,
}

impl<S: Semiring, M: ScoringModel<S>> SolverBuilder<S, M> {
    pub fn new(grammar: Grammar, model: M) -> Self {
        SolverBuilder {
            grammar,
            model,
            config: SolverConfig::default(),
            _semiring: PhantomData,
        }
    }

    pub fn config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn outside(mut self, enabled: bool) -> Self {
        self.config.outside = enabled;
        self
    }

    pub fn traceback(mut self, enabled: bool) -> Self {
        self.config.traceback = enabled;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.config.parallel = enabled;
        self
    }

    pub fn build(self) -> Result<Solver<S, M>, GrammarError> {
        Solver::with_config(self.grammar, self.model, self.config)
    }
}
