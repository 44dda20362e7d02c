//! Coalition formation: selecting the stable or optimal partitions.
//!
//! Every selector walks the full set of partitions of the player set in
//! restricted-growth order and keeps the ones passing its criterion. The
//! payoffs a partition carries are inherited coalition-wise from the
//! evaluation; a member of a non-viable coalition inherits NaN.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::combinatorics::{LexicographicPartitions, LexicographicSubsets};
use crate::core::common::PlayerId;
use crate::core::evaluator::CoalitionInfo;
use crate::core::game::{coalition_id, CoalitionId, CooperativeGame};
use crate::core::math::{definitely_greater, definitely_less, essentially_equal};

/// The criterion used to accept partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormationCriterion {
    /// No subgroup gains by splitting off and no group of coalitions gains by
    /// merging (D_hp stability).
    MergeSplitStable,
    /// No player gains by unilaterally moving to another coalition of the
    /// partition or to the empty coalition.
    NashStable,
    /// Monotone filter against a running best-payoff vector. Weaker than the
    /// textbook Pareto frontier: each candidate is compared against the
    /// per-player maxima seen so far, not against every kept partition.
    ParetoOptimal,
    /// Partitions maximizing the sum of coalition values.
    SocialOptimum,
}

impl std::str::FromStr for FormationCriterion {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, String> {
        match tag {
            "merge-split" => Ok(Self::MergeSplitStable),
            "nash" => Ok(Self::NashStable),
            "pareto" => Ok(Self::ParetoOptimal),
            "social" => Ok(Self::SocialOptimum),
            other => Err(format!("unknown coalition formation category '{other}'")),
        }
    }
}

impl std::fmt::Display for FormationCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::MergeSplitStable => "merge-split",
            Self::NashStable => "nash",
            Self::ParetoOptimal => "pareto",
            Self::SocialOptimum => "social",
        })
    }
}

/// A partition of the players together with its inherited payoffs.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionInfo {
    pub coalitions: BTreeSet<CoalitionId>,
    pub payoffs: BTreeMap<PlayerId, f64>,
}

/// Returns the partitions accepted by the chosen criterion, in enumeration
/// order. The list may be empty.
pub fn select_partitions(
    game: &CooperativeGame,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
    criterion: FormationCriterion,
) -> Vec<PartitionInfo> {
    match criterion {
        FormationCriterion::MergeSplitStable => merge_split_stable(game, coalitions),
        FormationCriterion::NashStable => nash_stable(game, coalitions),
        FormationCriterion::ParetoOptimal => pareto_optimal(game, coalitions),
        FormationCriterion::SocialOptimum => social_optimum(game, coalitions),
    }
}

fn candidate(
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
    blocks: &[Vec<PlayerId>],
) -> PartitionInfo {
    let mut part = PartitionInfo {
        coalitions: BTreeSet::new(),
        payoffs: BTreeMap::new(),
    };
    for block in blocks {
        let cid = coalition_id(block);
        part.coalitions.insert(cid);
        let info = &coalitions[&cid];
        for &p in block {
            part.payoffs
                .insert(p, info.payoffs.get(&p).copied().unwrap_or(f64::NAN));
        }
    }
    part
}

fn merge_split_stable(
    game: &CooperativeGame,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
) -> Vec<PartitionInfo> {
    let mut accepted = Vec::new();
    for blocks in LexicographicPartitions::new(game.num_players()) {
        let part = candidate(coalitions, &blocks);
        let mut stable = true;
        // No block may be worth less than one of its own partitions.
        'split: for block in &blocks {
            let block_value = coalitions[&coalition_id(block)].value;
            for sub_blocks in LexicographicPartitions::new(block.len()) {
                let split_value: f64 = sub_blocks
                    .iter()
                    .map(|piece| {
                        let members: Vec<PlayerId> = piece.iter().map(|&i| block[i]).collect();
                        coalitions[&coalition_id(&members)].value
                    })
                    .sum();
                if definitely_less(block_value, split_value) {
                    stable = false;
                    break 'split;
                }
            }
        }
        // No family of blocks may be worth less than its union.
        if stable {
            let cids: Vec<CoalitionId> = blocks.iter().map(|block| coalition_id(block)).collect();
            for family in LexicographicSubsets::new(cids.len(), false) {
                let family_value: f64 = family.iter().map(|&i| coalitions[&cids[i]].value).sum();
                let union = family.iter().fold(0, |acc, &i| acc | cids[i]);
                if definitely_less(family_value, coalitions[&union].value) {
                    stable = false;
                    break;
                }
            }
        }
        if stable {
            accepted.push(part);
        }
    }
    accepted
}

fn nash_stable(
    game: &CooperativeGame,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
) -> Vec<PartitionInfo> {
    let mut accepted = Vec::new();
    for blocks in LexicographicPartitions::new(game.num_players()) {
        let part = candidate(coalitions, &blocks);
        let mut stable = true;
        'players: for p in game.players() {
            let current = part.payoffs[&p];
            let mut in_singleton = false;
            for block in &blocks {
                if block.contains(&p) {
                    in_singleton = block.len() == 1;
                    continue;
                }
                // Would p prefer to join this block?
                let augmented = coalition_id(block) | 1 << p;
                match coalitions[&augmented].payoffs.get(&p) {
                    Some(&payoff) if !definitely_greater(payoff, current) => {}
                    _ => {
                        stable = false;
                        break 'players;
                    }
                }
            }
            // The move to the empty coalition, i.e. going it alone.
            if !in_singleton {
                let singleton = 1 << p;
                if !part.coalitions.contains(&singleton) {
                    match coalitions[&singleton].payoffs.get(&p) {
                        Some(&payoff) if !definitely_greater(payoff, current) => {}
                        _ => {
                            stable = false;
                            break 'players;
                        }
                    }
                }
            }
        }
        if stable {
            accepted.push(part);
        }
    }
    accepted
}

fn pareto_optimal(
    game: &CooperativeGame,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
) -> Vec<PartitionInfo> {
    let mut accepted = Vec::new();
    let mut best_payoffs = vec![f64::NAN; game.num_players()];
    for blocks in LexicographicPartitions::new(game.num_players()) {
        let part = candidate(coalitions, &blocks);
        let mut optimal = true;
        for p in game.players() {
            let payoff = part.payoffs[&p];
            if best_payoffs[p].is_nan() || payoff > best_payoffs[p] {
                best_payoffs[p] = payoff;
            } else {
                optimal = false;
                break;
            }
        }
        if optimal {
            accepted.push(part);
        }
    }
    accepted
}

fn social_optimum(
    game: &CooperativeGame,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
) -> Vec<PartitionInfo> {
    let mut accepted: Vec<PartitionInfo> = Vec::new();
    let mut best_value = 0.0;
    for blocks in LexicographicPartitions::new(game.num_players()) {
        let part = candidate(coalitions, &blocks);
        let value: f64 = part.coalitions.iter().map(|cid| coalitions[cid].value).sum();
        if accepted.is_empty() || definitely_greater(value, best_value) {
            accepted.clear();
            accepted.push(part);
            best_value = value;
        } else if essentially_equal(value, best_value) {
            accepted.push(part);
        }
    }
    accepted
}
