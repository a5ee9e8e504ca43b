//! Scoring models.
//!
//! A [`ScoringModel`] gives the semiring value of every cost atom at a node
//! pair and the rescaling factor applied to each rule instance. The
//! rescaling exponent is chosen by a [`RescalingWeight`], so alternative
//! weightings can be plugged in without touching the DP.

use crate::grammar::{CostAtom, Rule};
use crate::semiring::{CoOptimal, Count, Float, MinPlus, Semiring};
use crate::tree::{Event, NodeId, RecTree};
use rustc_hash::FxHashSet;
use std::fmt::Debug;

/// The node pair a rule is evaluated at.
#[derive(Clone, Copy, Debug)]
pub struct Site<'a> {
    pub tree1: &'a RecTree,
    pub v1: NodeId,
    pub tree2: &'a RecTree,
    pub v2: NodeId,
}

impl<'a> Site<'a> {
    pub fn new(tree1: &'a RecTree, v1: NodeId, tree2: &'a RecTree, v2: NodeId) -> Self {
        Site { tree1, v1, tree2, v2 }
    }

    pub fn event1(&self) -> Event {
        self.tree1.event(self.v1)
    }

    pub fn event2(&self) -> Event {
        self.tree2.event(self.v2)
    }

    /// Whether the two genes are adjacent in the extant genomes.
    pub fn is_adjacent(&self, adjacencies: &Adjacencies) -> bool {
        adjacencies.contains(self.tree1.gene_name(self.v1), self.tree2.gene_name(self.v2))
    }
}

/// Unordered set of extant gene adjacencies.
#[derive(Clone, Debug, Default)]
pub struct Adjacencies(FxHashSet<(String, String)>);

impl Adjacencies {
    pub fn new() -> Self {
        Adjacencies::default()
    }

    pub fn insert(&mut self, gene1: impl Into<String>, gene2: impl Into<String>) {
        let (a, b) = (gene1.into(), gene2.into());
        if a <= b {
            self.0.insert((a, b));
        } else {
            self.0.insert((b, a));
        }
    }

    pub fn contains(&self, gene1: &str, gene2: &str) -> bool {
        let key = if gene1 <= gene2 {
            (gene1.to_string(), gene2.to_string())
        } else {
            (gene2.to_string(), gene1.to_string())
        };
        self.0.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read whitespace-separated gene pairs, one adjacency per line.
    /// Blank lines and `#` comments are skipped; extra columns are ignored.
    pub fn parse(input: &str) -> Self {
        let mut adjacencies = Adjacencies::new();
        for line in input.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            if let (Some(a), Some(b)) = (fields.next(), fields.next()) {
                adjacencies.insert(a, b);
            }
        }
        adjacencies
    }
}

impl<A: Into<String>, B: Into<String>> FromIterator<(A, B)> for Adjacencies {
    fn from_iter<I: IntoIterator<Item = (A, B)>>(iter: I) -> Self {
        let mut adjacencies = Adjacencies::new();
        for (a, b) in iter {
            adjacencies.insert(a, b);
        }
        adjacencies
    }
}

/// Exponent of the rescaling factor of a rule instance.
pub trait RescalingWeight: Debug + Send + Sync {
    fn exponent(&self, rule: &Rule, site: &Site<'_>) -> i32;
}

/// Default weighting: a duplication shares the factor of the speciation
/// that follows it, and a loss accounts for every non-duplication node
/// below the pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct DuplicationSharing;

impl RescalingWeight for DuplicationSharing {
    fn exponent(&self, rule: &Rule, site: &Site<'_>) -> i32 {
        if rule.guard.mentions(Event::GLos) {
            let count = site.tree1.non_dup_count(site.v1) + site.tree2.non_dup_count(site.v2);
            return i32::try_from(count).unwrap_or(i32::MAX) - 1;
        }
        if site.event1() == Event::GDup || site.event2() == Event::GDup {
            0
        } else {
            1
        }
    }
}

/// Semiring values of cost atoms and rescaling factors.
pub trait ScoringModel<S: Semiring>: Send + Sync {
    fn atom(&self, atom: CostAtom, site: &Site<'_>) -> S;

    fn rescaling(&self, _rule: &Rule, _site: &Site<'_>) -> S {
        S::one()
    }
}

/// Costs of the two adjacency events.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjacencyCosts {
    pub gain: f64,
    pub breakage: f64,
}

impl Default for AdjacencyCosts {
    fn default() -> Self {
        AdjacencyCosts {
            gain: 1.0,
            breakage: 1.0,
        }
    }
}

impl AdjacencyCosts {
    fn of(&self, atom: CostAtom) -> Option<f64> {
        match atom {
            CostAtom::AdjGain => Some(self.gain),
            CostAtom::AdjBreak => Some(self.breakage),
            _ => None,
        }
    }
}

/// Value shared by every model for atoms that do not carry a cost.
fn indicator<S: Semiring>(atom: CostAtom, site: &Site<'_>, adjacencies: &Adjacencies) -> S {
    let holds = match atom {
        CostAtom::IsAdj => site.is_adjacent(adjacencies),
        CostAtom::IsntAdj => !site.is_adjacent(adjacencies),
        _ => true,
    };
    if holds {
        S::one()
    } else {
        S::zero()
    }
}

/// Minimum number of adjacency gains and breaks.
#[derive(Clone, Debug, Default)]
pub struct Parsimony {
    pub costs: AdjacencyCosts,
    pub adjacencies: Adjacencies,
}

impl Parsimony {
    pub fn new(costs: AdjacencyCosts, adjacencies: Adjacencies) -> Self {
        Parsimony { costs, adjacencies }
    }
}

impl ScoringModel<MinPlus> for Parsimony {
    fn atom(&self, atom: CostAtom, site: &Site<'_>) -> MinPlus {
        match self.costs.of(atom) {
            Some(cost) => MinPlus::new(cost),
            None => indicator(atom, site, &self.adjacencies),
        }
    }
}

/// Boltzmann weights `exp(-cost / kT)` with a rescaling factor against
/// underflow on large trees.
#[derive(Debug)]
pub struct Boltzmann {
    pub costs: AdjacencyCosts,
    pub adjacencies: Adjacencies,
    pub kt: f64,
    pub scaling_factor: f64,
    weighting: Box<dyn RescalingWeight>,
}

impl Boltzmann {
    pub fn new(costs: AdjacencyCosts, adjacencies: Adjacencies, kt: f64) -> Self {
        Boltzmann {
            costs,
            adjacencies,
            kt,
            scaling_factor: 1.0,
            weighting: Box::new(DuplicationSharing),
        }
    }

    pub fn with_scaling_factor(mut self, factor: f64) -> Self {
        self.scaling_factor = factor;
        self
    }

    pub fn with_weighting(mut self, weighting: impl RescalingWeight + 'static) -> Self {
        self.weighting = Box::new(weighting);
        self
    }
}

impl ScoringModel<Float> for Boltzmann {
    fn atom(&self, atom: CostAtom, site: &Site<'_>) -> Float {
        match self.costs.of(atom) {
            Some(cost) => Float::new((-cost / self.kt).exp()),
            None => indicator(atom, site, &self.adjacencies),
        }
    }

    fn rescaling(&self, rule: &Rule, site: &Site<'_>) -> Float {
        Float::new(self.scaling_factor.powi(self.weighting.exponent(rule, site)))
    }
}

/// Every valid scenario counts once.
#[derive(Clone, Debug, Default)]
pub struct Counting {
    pub adjacencies: Adjacencies,
}

impl Counting {
    pub fn new(adjacencies: Adjacencies) -> Self {
        Counting { adjacencies }
    }
}

impl ScoringModel<Count> for Counting {
    fn atom(&self, atom: CostAtom, site: &Site<'_>) -> Count {
        indicator(atom, site, &self.adjacencies)
    }
}

/// Parsimony cost together with the number of scenarios reaching it.
///
/// Counts can be multiplied by an integer `scaling_factor` raised to the
/// rescaling exponent of each rule instance. Negative exponents leave the
/// count unchanged.
#[derive(Debug)]
pub struct CoOptimalCounting {
    pub costs: AdjacencyCosts,
    pub adjacencies: Adjacencies,
    pub scaling_factor: u64,
    weighting: Box<dyn RescalingWeight>,
}

impl Default for CoOptimalCounting {
    fn default() -> Self {
        CoOptimalCounting::new(AdjacencyCosts::default(), Adjacencies::new())
    }
}

impl CoOptimalCounting {
    pub fn new(costs: AdjacencyCosts, adjacencies: Adjacencies) -> Self {
        CoOptimalCounting {
            costs,
            adjacencies,
            scaling_factor: 1,
            weighting: Box::new(DuplicationSharing),
        }
    }

    pub fn with_scaling_factor(mut self, factor: u64) -> Self {
        self.scaling_factor = factor;
        self
    }

    pub fn with_weighting(mut self, weighting: impl RescalingWeight + 'static) -> Self {
        self.weighting = Box::new(weighting);
        self
    }
}

impl ScoringModel<CoOptimal> for CoOptimalCounting {
    fn atom(&self, atom: CostAtom, site: &Site<'_>) -> CoOptimal {
        match self.costs.of(atom) {
            Some(cost) => CoOptimal::unit(cost),
            None => indicator(atom, site, &self.adjacencies),
        }
    }

    fn rescaling(&self, rule: &Rule, site: &Site<'_>) -> CoOptimal {
        let exponent = u32::try_from(self.weighting.exponent(rule, site)).unwrap_or(0);
        CoOptimal::new(0.0, self.scaling_factor.saturating_pow(exponent))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::grammar::{CostClass, Guard};
    use crate::tree::tests::cherry;

    /// Exact real-valued costs: `AdjGain` and `AdjBreak` map to fixed
    /// factors, adjacency indicators follow `adjacencies`.
    #[derive(Debug, Default)]
    pub(crate) struct FixedCosts {
        pub gain: f64,
        pub breakage: f64,
        pub adjacencies: Adjacencies,
    }

    impl ScoringModel<Float> for FixedCosts {
        fn atom(&self, atom: CostAtom, site: &Site<'_>) -> Float {
            match atom {
                CostAtom::AdjGain => Float::new(self.gain),
                CostAtom::AdjBreak => Float::new(self.breakage),
                _ => indicator(atom, site, &self.adjacencies),
            }
        }
    }

    fn rule(guard: Guard) -> Rule {
        Rule::new(CostClass::Adjacent, vec![], guard, vec![])
    }

    #[test]
    fn test_adjacencies_are_unordered() {
        let adjacencies = Adjacencies::parse("# pairs\nb a\n\nc d extra\n");
        assert_eq!(adjacencies.len(), 2);
        assert!(adjacencies.contains("a", "b"));
        assert!(adjacencies.contains("b", "a"));
        assert!(adjacencies.contains("d", "c"));
        assert!(!adjacencies.contains("a", "c"));
    }

    #[test]
    fn test_indicator_atoms() {
        let t1 = cherry("1");
        let t2 = cherry("2");
        let model = Parsimony::new(
            AdjacencyCosts::default(),
            [("1a", "2a")].into_iter().collect(),
        );
        let adjacent = Site::new(&t1, 0, &t2, 0);
        let apart = Site::new(&t1, 1, &t2, 1);

        assert_eq!(model.atom(CostAtom::IsAdj, &adjacent), MinPlus::one());
        assert!(model.atom(CostAtom::IsAdj, &apart).is_zero());
        assert!(model.atom(CostAtom::IsntAdj, &adjacent).is_zero());
        assert_eq!(model.atom(CostAtom::Zero, &apart), MinPlus::one());
        assert_eq!(model.atom(CostAtom::AdjBreak, &apart), MinPlus::new(1.0));
    }

    #[test]
    fn test_boltzmann_weights() {
        let t1 = cherry("1");
        let t2 = cherry("2");
        let costs = AdjacencyCosts {
            gain: 2.0,
            breakage: 1.0,
        };
        let model = Boltzmann::new(costs, Adjacencies::new(), 0.5).with_scaling_factor(2.0);
        let site = Site::new(&t1, 2, &t2, 2);

        let gain = model.atom(CostAtom::AdjGain, &site);
        assert!(gain.approx_eq(&Float::new((-4.0f64).exp())));

        let spec = rule(Guard::new([Event::Spec], [Event::Spec]));
        assert_eq!(model.rescaling(&spec, &site), Float::new(2.0));
    }

    #[test]
    fn test_duplication_sharing_exponent() {
        let mut b = RecTree::builder();
        let l1 = b.leaf("l1", "A", Event::Extant);
        let l2 = b.leaf("l2", "A", Event::Extant);
        let dup = b.node("d", "A", Event::GDup, &[l1, l2]);
        let dup_tree = b.build(dup).unwrap();
        let spec_tree = cherry("");

        let weight = DuplicationSharing;
        let any = rule(Guard::new(Event::ALL, Event::ALL));
        let loss = rule(Guard::new([Event::GLos], [Event::Spec]));

        assert_eq!(weight.exponent(&any, &Site::new(&spec_tree, 2, &spec_tree, 2)), 1);
        assert_eq!(weight.exponent(&any, &Site::new(&dup_tree, 2, &spec_tree, 2)), 0);
        // two extant leaves + three speciation-tree nodes - 1
        assert_eq!(weight.exponent(&loss, &Site::new(&dup_tree, 2, &spec_tree, 2)), 4);
    }

    #[test]
    fn test_custom_weighting() {
        #[derive(Debug)]
        struct Flat;
        impl RescalingWeight for Flat {
            fn exponent(&self, _rule: &Rule, _site: &Site<'_>) -> i32 {
                3
            }
        }

        let t = cherry("");
        let model = Boltzmann::new(AdjacencyCosts::default(), Adjacencies::new(), 1.0)
            .with_scaling_factor(2.0)
            .with_weighting(Flat);
        let r = rule(Guard::new([Event::Spec], [Event::Spec]));
        assert_eq!(model.rescaling(&r, &Site::new(&t, 2, &t, 2)), Float::new(8.0));
    }

    #[test]
    fn test_cooptimal_atoms() {
        let t = cherry("");
        let model = CoOptimalCounting::default();
        let site = Site::new(&t, 0, &t, 0);
        assert_eq!(model.atom(CostAtom::AdjGain, &site), CoOptimal::new(1.0, 1));
        assert!(model.atom(CostAtom::IsAdj, &site).is_zero());
        assert_eq!(Counting::default().atom(CostAtom::IsntAdj, &site), Count::one());
    }

    #[test]
    fn test_cooptimal_rescaling() {
        let t = cherry("");
        let site = Site::new(&t, 2, &t, 2);
        let spec = rule(Guard::new([Event::Spec], [Event::Spec]));

        assert_eq!(CoOptimalCounting::default().rescaling(&spec, &site), CoOptimal::one());
        let scaled = CoOptimalCounting::default().with_scaling_factor(3);
        assert_eq!(scaled.rescaling(&spec, &site), CoOptimal::new(0.0, 3));

        // the loss exponent at a leaf pair is 1 + 1 - 1
        let loss = rule(Guard::new([Event::GLos], [Event::Extant]));
        let leaves = Site::new(&t, 0, &t, 0);
        assert_eq!(scaled.rescaling(&loss, &leaves), CoOptimal::new(0.0, 3));
    }
}
