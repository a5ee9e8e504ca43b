//! adjtree-dp: grammar-driven dynamic programming over pairs of reconciled
//! gene trees.
//!
//! This crate provides:
//! - Semirings for optimisation, partition functions and counting
//! - Reconciled binary trees with per-node events
//! - A small grammar of cases over two cost classes, and its text format
//! - Forward (inside) and backward (outside) passes
//! - Per-case marginals, optimal tracebacks and stochastic sampling

pub mod backward;
pub mod chart;
pub mod forward;
pub mod grammar;
pub mod label;
pub mod marginal;
pub mod model;
pub mod outside;
pub mod parser;
pub mod semiring;
pub mod solver;
pub mod traceback;
pub mod tree;

// Re-exports for convenience
pub use chart::{Chart, LabelTensor};
pub use forward::{Evaluator, Tables};
pub use grammar::{
    CostAtom, CostClass, Destination, Grammar, GrammarError, Guard, Rule, RuleId, Slot,
};
pub use label::{CaseLabel, LabelIndex};
pub use marginal::{MarginalTensor, UnreachableLabel};
pub use model::{
    Adjacencies, AdjacencyCosts, Boltzmann, CoOptimalCounting, Counting, DuplicationSharing,
    Parsimony, RescalingWeight, ScoringModel, Site,
};
pub use outside::{derive_outside_rules, OutsideRule};
pub use parser::{parse_grammar, ParseError, DECO_GRAMMAR};
pub use semiring::{CoOptimal, Count, Float, MinPlus, Semiring};
pub use solver::{Solution, Solver, SolverBuilder, SolverConfig, SolverStats};
pub use traceback::{Listing, Scenario, ScenarioLister, Traceback, MAX_CO_OPTIMAL};
pub use tree::{Event, Handle, NodeId, RecTree, RecTreeBuilder, TreeError};
