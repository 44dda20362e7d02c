//! Random perturbation of scenario workload parameters.
//!
//! Every perturbed cell owns its own generator, seeded once from a master
//! generator in a fixed order, so enabling one feature never shifts the
//! random stream of another and repeated runs with the same seed reproduce
//! the same sequence of scenarios.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64;

use crate::core::scenario::Scenario;

const HOUR: f64 = 3600.0;
/// Mean and s.d. of a PM sleep/wake transition, in hours (300 us, 50 us).
const TRANSITION_MEAN: f64 = 3.0e-4 / HOUR;
const TRANSITION_SD: f64 = 5.0e-5 / HOUR;
/// Mean and s.d. of the migration time of the smallest VM type, in hours;
/// both double for each successive VM type.
const MIGRATION_MEAN: f64 = 277.0 / HOUR;
const MIGRATION_SD: f64 = 61.0 / HOUR;
/// Upload cost of 0.00001 $/MB at 12.5 MB/s, amortized over a 12-hour
/// consolidation period.
const TRANSFER_COST_RATE: f64 = 1e-5 * 12.5 * HOUR / 12.0;

/// Which scenario parameters are redrawn before each iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOptions {
    /// Redraw the VM counts uniformly in `[0, base_count]`.
    pub gen_vms: bool,
    /// Redraw the initial PM power states as fair coin flips.
    pub gen_pm_power_states: bool,
    /// Redraw the PM switch-on/off costs.
    pub gen_pm_on_off_costs: bool,
    /// Redraw the provider-to-provider VM migration costs.
    pub gen_vm_migration_costs: bool,
}

/// One generator per perturbed cell, all seeded from one feature-level
/// generator drawn from the master.
fn rng_grid(master: &mut Pcg64, rows: usize, cols: usize, enabled: bool) -> Vec<Vec<Pcg64>> {
    if !enabled {
        return Vec::new();
    }
    let mut feature = Pcg64::seed_from_u64(master.gen());
    (0..rows)
        .map(|_| (0..cols).map(|_| Pcg64::seed_from_u64(feature.gen())).collect())
        .collect()
}

/// Derives perturbed copies of a base scenario.
pub struct WorkloadGenerator {
    options: RandomOptions,
    vm_rngs: Vec<Vec<Pcg64>>,
    power_state_rngs: Vec<Vec<Pcg64>>,
    on_off_cost_rngs: Vec<Vec<Pcg64>>,
    migration_cost_rngs: Vec<Vec<Vec<Pcg64>>>,
}

impl WorkloadGenerator {
    pub fn new(scenario: &Scenario, options: RandomOptions, seed: u64) -> Self {
        let n = scenario.num_cips;
        let t = scenario.num_pm_types;
        let v = scenario.num_vm_types;
        let mut master = Pcg64::seed_from_u64(seed);
        let vm_rngs = rng_grid(&mut master, n, v, options.gen_vms);
        let power_state_rngs = rng_grid(&mut master, n, t, options.gen_pm_power_states);
        let on_off_cost_rngs = rng_grid(&mut master, n, t, options.gen_pm_on_off_costs);
        let migration_cost_rngs = if options.gen_vm_migration_costs {
            let mut feature = Pcg64::seed_from_u64(master.gen());
            (0..n)
                .map(|_| {
                    (0..n)
                        .map(|_| (0..v).map(|_| Pcg64::seed_from_u64(feature.gen())).collect())
                        .collect()
                })
                .collect()
        } else {
            Vec::new()
        };
        Self {
            options,
            vm_rngs,
            power_state_rngs,
            on_off_cost_rngs,
            migration_cost_rngs,
        }
    }

    /// Returns a copy of `base` with the enabled parameters redrawn. Cell
    /// generators advance across calls, so successive iterations see fresh
    /// draws.
    pub fn perturb(&mut self, base: &Scenario) -> Scenario {
        let mut scenario = base.clone();
        if self.options.gen_vms {
            for c in 0..base.num_cips {
                for v in 0..base.num_vm_types {
                    let ceiling = base.cip_num_vms[c][v];
                    scenario.cip_num_vms[c][v] = self.vm_rngs[c][v].gen_range(0..=ceiling);
                }
            }
        }
        if self.options.gen_pm_power_states {
            for c in 0..base.num_cips {
                let mut states = Vec::with_capacity(base.num_pms_of(c));
                for (p, &count) in base.cip_num_pms[c].iter().enumerate() {
                    for _ in 0..count {
                        states.push(self.power_state_rngs[c][p].gen_bool(0.5));
                    }
                }
                scenario.cip_pm_power_states[c] = states;
            }
        }
        if self.options.gen_pm_on_off_costs {
            // A transition is costed at the PM's peak power and the owner's
            // electricity price; switch-on and switch-off are assumed equal.
            let transition = Normal::new(TRANSITION_MEAN, TRANSITION_SD)
                .expect("transition time distribution parameters");
            for c in 0..base.num_cips {
                for p in 0..base.num_pm_types {
                    let rate = base.pm_power_models[p].max_power() * 1e-3
                        * base.cip_electricity_costs[c];
                    let cost = (transition.sample(&mut self.on_off_cost_rngs[c][p]) * rate).max(0.0);
                    scenario.cip_pm_asleep_costs[c][p] = cost;
                    scenario.cip_pm_awake_costs[c][p] = cost;
                }
            }
        }
        if self.options.gen_vm_migration_costs {
            for src in 0..base.num_cips {
                for dst in 0..base.num_cips {
                    if src == dst {
                        // Migrating between hosts of the same provider is free.
                        scenario.cip_to_cip_vm_migration_costs[src][dst] =
                            vec![0.0; base.num_vm_types];
                        continue;
                    }
                    let mut mean = MIGRATION_MEAN;
                    let mut sd = MIGRATION_SD;
                    for v in 0..base.num_vm_types {
                        let migration = Normal::new(mean, sd)
                            .expect("migration time distribution parameters");
                        let draw = migration.sample(&mut self.migration_cost_rngs[src][dst][v]);
                        scenario.cip_to_cip_vm_migration_costs[src][dst][v] =
                            (draw * TRANSFER_COST_RATE).max(0.0);
                        mean *= 2.0;
                        sd *= 2.0;
                    }
                }
            }
        }
        scenario
    }
}
