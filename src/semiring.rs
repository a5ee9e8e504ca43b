//! Semiring trait and the scoring algebras used by the adjacency DP.
//!
//! The DP is written once against [`Semiring`]. `Add` is the aggregation
//! over alternative derivations and `Mul` combines the terms of a single
//! derivation. The instances here correspond to the run modes of the
//! engine:
//! - [`MinPlus`]: parsimony, the cost of a most parsimonious scenario
//! - [`Float`]: Boltzmann ensemble, the partition function
//! - [`Count`]: number of valid scenarios
//! - [`CoOptimal`]: parsimony cost together with the number of co-optimal scenarios

use ordered_float::OrderedFloat;
use std::fmt::Debug;
use std::ops::{Add, Mul};

/// A commutative semiring with an absorbing zero.
///
/// `zero()` marks an impossible configuration: it annihilates under `Mul`
/// and is neutral under `Add`. `one()` is the neutral element of `Mul`.
pub trait Semiring:
    Clone + Debug + PartialEq + Send + Sync + Add<Output = Self> + Mul<Output = Self>
{
    /// The absorbing element.
    fn zero() -> Self;

    /// The multiplicative identity.
    fn one() -> Self;

    fn is_zero(&self) -> bool;

    /// Check if two values are approximately equal.
    fn approx_eq(&self, other: &Self) -> bool;

    /// Whether aggregating `candidate` into `incumbent` changes the result.
    fn improves(candidate: &Self, incumbent: &Self) -> bool {
        incumbent.clone() + candidate.clone() != *incumbent
    }
}

/// Float semiring: real numbers with + and *.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Float(pub f64);

impl Float {
    pub fn new(x: f64) -> Self {
        Float(x)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Semiring for Float {
    fn zero() -> Self {
        Float(0.0)
    }

    fn one() -> Self {
        Float(1.0)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    fn approx_eq(&self, other: &Self) -> bool {
        let scale = self.0.abs().max(other.0.abs()).max(1.0);
        (self.0 - other.0).abs() <= 1e-9 * scale
    }
}

impl Add for Float {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Float(self.0 + other.0)
    }
}

impl Mul for Float {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Float(self.0 * other.0)
    }
}

impl From<f64> for Float {
    fn from(x: f64) -> Self {
        Float(x)
    }
}

impl From<Float> for f64 {
    fn from(x: Float) -> Self {
        x.0
    }
}

/// MinPlus (tropical) semiring: min and +.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MinPlus(pub OrderedFloat<f64>);

impl MinPlus {
    pub fn new(x: f64) -> Self {
        MinPlus(OrderedFloat(x))
    }

    pub fn infinity() -> Self {
        MinPlus(OrderedFloat(f64::INFINITY))
    }

    pub fn value(&self) -> f64 {
        self.0.into_inner()
    }
}

impl Semiring for MinPlus {
    fn zero() -> Self {
        MinPlus::infinity()
    }

    fn one() -> Self {
        MinPlus::new(0.0)
    }

    fn is_zero(&self) -> bool {
        self.0.is_infinite() && self.0.is_sign_positive()
    }

    fn approx_eq(&self, other: &Self) -> bool {
        if self.is_zero() || other.is_zero() {
            return self.is_zero() == other.is_zero();
        }
        (self.0.into_inner() - other.0.into_inner()).abs() < 1e-10
    }
}

impl Add for MinPlus {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        MinPlus(self.0.min(other.0))
    }
}

impl Mul for MinPlus {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        MinPlus(OrderedFloat(self.0.into_inner() + other.0.into_inner()))
    }
}

/// Counting semiring: natural numbers with + and *.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Count(pub u64);

impl Count {
    pub fn new(x: u64) -> Self {
        Count(x)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Semiring for Count {
    fn zero() -> Self {
        Count(0)
    }

    fn one() -> Self {
        Count(1)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn approx_eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Add for Count {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Count(self.0.saturating_add(other.0))
    }
}

impl Mul for Count {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Count(self.0.saturating_mul(other.0))
    }
}

/// Minimum cost paired with the number of derivations reaching it.
///
/// Aggregation keeps the cheaper side and sums the counts on ties;
/// combination adds costs and multiplies counts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoOptimal {
    pub cost: OrderedFloat<f64>,
    pub count: u64,
}

impl CoOptimal {
    pub fn new(cost: f64, count: u64) -> Self {
        CoOptimal {
            cost: OrderedFloat(cost),
            count,
        }
    }

    /// A single derivation of the given cost.
    pub fn unit(cost: f64) -> Self {
        CoOptimal::new(cost, 1)
    }

    pub fn cost(&self) -> f64 {
        self.cost.into_inner()
    }
}

impl Semiring for CoOptimal {
    fn zero() -> Self {
        CoOptimal::new(f64::INFINITY, 0)
    }

    fn one() -> Self {
        CoOptimal::new(0.0, 1)
    }

    fn is_zero(&self) -> bool {
        self.count == 0 || (self.cost.is_infinite() && self.cost.is_sign_positive())
    }

    fn approx_eq(&self, other: &Self) -> bool {
        if self.is_zero() || other.is_zero() {
            return self.is_zero() == other.is_zero();
        }
        (self.cost() - other.cost()).abs() < 1e-10 && self.count == other.count
    }
}

impl Add for CoOptimal {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        if self.is_zero() {
            return other;
        }
        if other.is_zero() {
            return self;
        }
        match self.cost.cmp(&other.cost) {
            std::cmp::Ordering::Less => self,
            std::cmp::Ordering::Greater => other,
            std::cmp::Ordering::Equal => CoOptimal {
                cost: self.cost,
                count: self.count.saturating_add(other.count),
            },
        }
    }
}

impl Mul for CoOptimal {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return CoOptimal::zero();
        }
        CoOptimal {
            cost: OrderedFloat(self.cost() + other.cost()),
            count: self.count.saturating_mul(other.count),
        }
    }
}
