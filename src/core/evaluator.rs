//! Evaluation of every coalition of providers.
//!
//! Sweeps all non-empty subsets of the player set, solves the placement
//! problem for each pooled coalition and fills in the characteristic function
//! of the cooperative game, the payoff division and the core tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use thiserror::Error;
use threadpool::ThreadPool;

use crate::core::combinatorics::LexicographicSubsets;
use crate::core::common::{CoalitionPool, PlayerId};
use crate::core::game::{coalition_id, CoalitionId, CooperativeGame, GameError, PayoffRule};
use crate::core::placement::{find_optimal_allocation, AllocationSolution, PlacementError, SolverSettings};
use crate::core::scenario::Scenario;

/// Fatal errors raised while evaluating coalitions. An infeasible placement
/// is not fatal: the coalition is marked non-viable instead.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Everything the analyzer knows about one coalition.
#[derive(Debug, Clone)]
pub struct CoalitionInfo {
    pub cid: CoalitionId,
    pub allocation: AllocationSolution,
    /// Characteristic value v(S): hourly profit minus the optimal allocation
    /// cost, or `-f64::MIN_POSITIVE` when the coalition is non-viable.
    pub value: f64,
    pub core_empty: bool,
    pub payoffs: BTreeMap<PlayerId, f64>,
    pub payoffs_in_core: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    pub payoff_rule: PayoffRule,
    pub solver: SolverSettings,
    /// Number of worker threads for the placement solves; 1 runs inline.
    pub threads: usize,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            payoff_rule: PayoffRule::Shapley,
            solver: SolverSettings::default(),
            threads: 1,
        }
    }
}

type SolveOutcome = (Vec<PlayerId>, Result<AllocationSolution, PlacementError>);

/// Evaluates every non-empty coalition of the scenario's providers.
///
/// Returns the cooperative game holding the characteristic function and the
/// per-coalition info map with exactly `2^N - 1` entries.
pub fn evaluate_coalitions(
    scenario: &Scenario,
    options: &EvaluationOptions,
) -> Result<(CooperativeGame, BTreeMap<CoalitionId, CoalitionInfo>), EvaluationError> {
    let num_players = scenario.num_cips;
    let solves = if options.threads > 1 {
        solve_all_parallel(scenario, options)
    } else {
        solve_all(scenario, options)
    };

    let mut game = CooperativeGame::new(num_players);
    let mut coalitions = BTreeMap::new();
    for (cid, (members, result)) in solves {
        let allocation = result?;
        let revenue = CoalitionPool::revenue(scenario, &members);
        let value = if allocation.solved {
            revenue - allocation.cost
        } else {
            // Worse than any finite value: a non-viable coalition never wins
            // an ordering comparison against a viable one.
            -f64::MIN_POSITIVE
        };
        if allocation.solved && !allocation.optimal {
            warn!("allocation for coalition {cid} is feasible but not proven optimal");
        }
        debug!(
            "coalition {cid}: revenue {revenue}, cost {}, value {value}",
            allocation.cost
        );
        game.set_value(cid, value);
        coalitions.insert(
            cid,
            CoalitionInfo {
                cid,
                allocation,
                value,
                core_empty: true,
                payoffs: BTreeMap::new(),
                payoffs_in_core: false,
            },
        );
    }

    // Payoff division and core tests need the full characteristic function,
    // so they run after every coalition has been valued.
    for info in coalitions.values_mut() {
        if !info.allocation.solved {
            continue;
        }
        info.core_empty = !game.core_non_empty(info.cid)?;
        info.payoffs = game.payoffs(info.cid, options.payoff_rule);
        info.payoffs_in_core = !info.core_empty && game.payoffs_in_core(info.cid, &info.payoffs);
    }

    Ok((game, coalitions))
}

fn solve_all(
    scenario: &Scenario,
    options: &EvaluationOptions,
) -> BTreeMap<CoalitionId, SolveOutcome> {
    let mut solves = BTreeMap::new();
    for members in LexicographicSubsets::new(scenario.num_cips, false) {
        let cid = coalition_id(&members);
        let pool = CoalitionPool::from_members(scenario, &members);
        let result = find_optimal_allocation(scenario, &pool, &options.solver);
        solves.insert(cid, (members, result));
    }
    solves
}

fn solve_all_parallel(
    scenario: &Scenario,
    options: &EvaluationOptions,
) -> BTreeMap<CoalitionId, SolveOutcome> {
    let scenario = Arc::new(scenario.clone());
    let results = Arc::new(Mutex::new(BTreeMap::new()));
    let workers = ThreadPool::new(options.threads);
    for members in LexicographicSubsets::new(scenario.num_cips, false) {
        let cid = coalition_id(&members);
        let scenario = Arc::clone(&scenario);
        let results = Arc::clone(&results);
        let settings = options.solver;
        workers.execute(move || {
            let pool = CoalitionPool::from_members(&scenario, &members);
            let result = find_optimal_allocation(&scenario, &pool, &settings);
            results.lock().unwrap().insert(cid, (members, result));
        });
    }
    workers.join();
    Arc::try_unwrap(results).unwrap().into_inner().unwrap()
}
