//! Cooperative game over coalitions of providers.
//!
//! The characteristic function is stored as a flat array of length `2^N`
//! indexed by the coalition id, the bitmask of the member players. The empty
//! coalition has id 0 and value 0; the grand coalition has id `2^N - 1`.

use std::collections::BTreeMap;

use good_lp::{default_solver, variable, variables, Expression, ResolutionError, SolverModel, Variable};
use thiserror::Error;

use crate::core::common::PlayerId;
use crate::core::math::{definitely_less, essentially_equal};

/// Bitmask identifying a coalition: bit `p` is set iff player `p` is a member.
pub type CoalitionId = usize;

/// Returns the id of the coalition formed by the given players.
pub fn coalition_id(members: &[PlayerId]) -> CoalitionId {
    members.iter().fold(0, |acc, &p| acc | 1 << p)
}

/// Errors produced by the core feasibility test.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("core feasibility check failed: {0}")]
    Solver(String),
}

/// The rule used to divide a coalition's value among its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoffRule {
    Banzhaf,
    NormBanzhaf,
    Shapley,
}

impl std::str::FromStr for PayoffRule {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, String> {
        match tag {
            "banzhaf" => Ok(Self::Banzhaf),
            "norm-banzhaf" => Ok(Self::NormBanzhaf),
            "shapley" => Ok(Self::Shapley),
            other => Err(format!("unknown coalition value division category '{other}'")),
        }
    }
}

impl std::fmt::Display for PayoffRule {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Banzhaf => "banzhaf",
            Self::NormBanzhaf => "norm-banzhaf",
            Self::Shapley => "shapley",
        })
    }
}

/// A transferable-utility cooperative game with an explicit characteristic
/// function.
#[derive(Debug, Clone)]
pub struct CooperativeGame {
    num_players: usize,
    values: Vec<f64>,
}

impl CooperativeGame {
    /// Creates a game where every coalition initially has value 0.
    pub fn new(num_players: usize) -> Self {
        Self {
            num_players,
            values: vec![0.0; 1 << num_players],
        }
    }

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// Iterator over player ids.
    pub fn players(&self) -> std::ops::Range<PlayerId> {
        0..self.num_players
    }

    pub fn grand_coalition(&self) -> CoalitionId {
        (1 << self.num_players) - 1
    }

    pub fn value(&self, coalition: CoalitionId) -> f64 {
        self.values[coalition]
    }

    pub fn set_value(&mut self, coalition: CoalitionId, value: f64) {
        self.values[coalition] = value;
    }

    /// The members of a coalition, in ascending player order.
    pub fn members(&self, coalition: CoalitionId) -> Vec<PlayerId> {
        self.players().filter(|&p| coalition >> p & 1 == 1).collect()
    }

    /// Divides the value of `coalition` among its members with the given rule,
    /// looking only at the sub-game restricted to the coalition.
    pub fn payoffs(&self, coalition: CoalitionId, rule: PayoffRule) -> BTreeMap<PlayerId, f64> {
        match rule {
            PayoffRule::Banzhaf => self.banzhaf_value(coalition),
            PayoffRule::NormBanzhaf => self.norm_banzhaf_value(coalition),
            PayoffRule::Shapley => self.shapley_value(coalition),
        }
    }

    /// The Shapley value of the sub-game restricted to `coalition`: each
    /// member's marginal contribution averaged over all join orders.
    pub fn shapley_value(&self, coalition: CoalitionId) -> BTreeMap<PlayerId, f64> {
        let members = self.members(coalition);
        let size = members.len();
        let orders = factorial(size);
        let mut payoffs = BTreeMap::new();
        for &p in &members {
            let rest = coalition & !(1 << p);
            let mut phi = 0.0;
            for t in submasks(rest) {
                let k = t.count_ones() as usize;
                let weight = factorial(k) * factorial(size - k - 1) / orders;
                phi += weight * (self.value(t | 1 << p) - self.value(t));
            }
            payoffs.insert(p, phi);
        }
        payoffs
    }

    /// The Banzhaf value of the sub-game restricted to `coalition`: each
    /// member's marginal contribution averaged uniformly over sub-coalitions.
    pub fn banzhaf_value(&self, coalition: CoalitionId) -> BTreeMap<PlayerId, f64> {
        let members = self.members(coalition);
        let scale = 1.0 / (1u64 << (members.len() - 1)) as f64;
        let mut payoffs = BTreeMap::new();
        for &p in &members {
            let rest = coalition & !(1 << p);
            let mut beta = 0.0;
            for t in submasks(rest) {
                beta += self.value(t | 1 << p) - self.value(t);
            }
            payoffs.insert(p, scale * beta);
        }
        payoffs
    }

    /// The Banzhaf value rescaled so that the payoffs sum to the coalition
    /// value.
    pub fn norm_banzhaf_value(&self, coalition: CoalitionId) -> BTreeMap<PlayerId, f64> {
        let mut payoffs = self.banzhaf_value(coalition);
        let total: f64 = payoffs.values().sum();
        let scale = self.value(coalition) / total;
        for payoff in payoffs.values_mut() {
            *payoff *= scale;
        }
        payoffs
    }

    /// Tests whether the core of the sub-game restricted to `coalition` is
    /// non-empty: feasibility of the LP
    /// `{x >= 0, sum_{p in S} x_p = v(S), sum_{p in T} x_p >= v(T) for T < S}`.
    pub fn core_non_empty(&self, coalition: CoalitionId) -> Result<bool, GameError> {
        let members = self.members(coalition);
        let mut vars = variables!();
        let x: BTreeMap<PlayerId, Variable> = members
            .iter()
            .map(|&p| (p, vars.add(variable().min(0.0))))
            .collect();
        let mut objective = Expression::with_capacity(members.len());
        for var in x.values() {
            objective.add_mul(1.0, *var);
        }
        let mut problem = vars.minimise(objective).using(default_solver);
        let mut total = Expression::with_capacity(members.len());
        for var in x.values() {
            total.add_mul(1.0, *var);
        }
        problem = problem.with(total.eq(self.value(coalition)));
        for t in submasks(coalition) {
            if t == 0 || t == coalition {
                continue;
            }
            let mut sum = Expression::with_capacity(members.len());
            for (&p, var) in &x {
                if t >> p & 1 == 1 {
                    sum.add_mul(1.0, *var);
                }
            }
            problem = problem.with(sum.geq(self.value(t)));
        }
        match problem.solve() {
            Ok(_) => Ok(true),
            Err(ResolutionError::Infeasible) => Ok(false),
            Err(other) => Err(GameError::Solver(other.to_string())),
        }
    }

    /// Tests whether the given payoff vector lies in the core of the sub-game
    /// restricted to `coalition`.
    pub fn payoffs_in_core(&self, coalition: CoalitionId, payoffs: &BTreeMap<PlayerId, f64>) -> bool {
        let total: f64 = self
            .members(coalition)
            .iter()
            .map(|p| payoffs.get(p).copied().unwrap_or(f64::NAN))
            .sum();
        if !essentially_equal(total, self.value(coalition)) {
            return false;
        }
        for t in submasks(coalition) {
            if t == 0 || t == coalition {
                continue;
            }
            let sum: f64 = self
                .members(t)
                .iter()
                .map(|p| payoffs.get(p).copied().unwrap_or(f64::NAN))
                .sum();
            if definitely_less(sum, self.value(t)) {
                return false;
            }
        }
        true
    }
}

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, i| acc * i as f64)
}

/// Iterates over all submasks of `mask`, including `mask` itself and 0.
fn submasks(mask: CoalitionId) -> Submasks {
    Submasks {
        mask,
        next: Some(mask),
    }
}

struct Submasks {
    mask: CoalitionId,
    next: Option<CoalitionId>,
}

impl Iterator for Submasks {
    type Item = CoalitionId;

    fn next(&mut self) -> Option<CoalitionId> {
        let current = self.next?;
        self.next = if current == 0 {
            None
        } else {
            Some((current - 1) & self.mask)
        };
        Some(current)
    }
}
