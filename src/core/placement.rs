//! Cost-optimal VM placement for a pooled coalition.
//!
//! The placement is a mixed-integer program over binary on/off states `x_h`,
//! binary assignments `y_{vh}` and continuous CPU utilizations `s_h`:
//!
//! * every VM is placed on exactly one PM;
//! * a powered-off PM hosts nothing;
//! * RAM shares on a PM sum to at most 1, CPU shares sum to `s_h <= 1`;
//! * the objective charges electricity for the consumed watts, switch-on/off
//!   transitions against the initial power states, and inter-provider VM
//!   migrations.
//!
//! Electricity prices are $/kWh and power is in watts, hence the `1e-3`
//! factor converting to $/Wh over the one-hour accounting window.

use good_lp::{default_solver, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable};
use log::warn;
use thiserror::Error;

use crate::core::common::CoalitionPool;
use crate::core::scenario::Scenario;

/// Knobs forwarded to the optimization back-end.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    /// Relative MIP gap in [0, 1]; 0 demands a proven optimum.
    pub relative_gap: f64,
    /// Time limit in seconds; non-positive means no limit.
    pub time_limit: f64,
    /// Minimize raw watts instead of monetary cost.
    pub min_power: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            relative_gap: 0.0,
            time_limit: -1.0,
            min_power: false,
        }
    }
}

/// Errors from the optimization back-end. Infeasibility is not an error and
/// is reported through [`AllocationSolution::solved`] instead.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("optimization back-end failed: {0}")]
    Backend(String),
}

/// The outcome of a placement solve.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSolution {
    /// Whether a feasible allocation was found.
    pub solved: bool,
    /// Whether the allocation was proven optimal.
    pub optimal: bool,
    /// Objective value: monetary cost, or watts in min-power mode.
    pub objective: f64,
    /// Monetary cost of the allocation ($ over the one-hour window).
    pub cost: f64,
    /// Energy drawn by the powered-on PMs (kWh over the one-hour window).
    pub kwatt: f64,
    /// Resulting power state per PM.
    pub pm_power_states: Vec<bool>,
    /// Assignment matrix: `pm_vm_allocations[h][v]` is true iff VM `v` runs
    /// on PM `h`.
    pub pm_vm_allocations: Vec<Vec<bool>>,
}

impl AllocationSolution {
    fn unsolved() -> Self {
        Self {
            solved: false,
            optimal: false,
            objective: f64::INFINITY,
            cost: f64::INFINITY,
            kwatt: f64::INFINITY,
            pm_power_states: Vec::new(),
            pm_vm_allocations: Vec::new(),
        }
    }

    fn empty() -> Self {
        Self {
            solved: true,
            optimal: true,
            objective: 0.0,
            cost: 0.0,
            kwatt: 0.0,
            pm_power_states: Vec::new(),
            pm_vm_allocations: Vec::new(),
        }
    }
}

/// Finds the allocation of the pooled VMs onto the pooled PMs that minimizes
/// the coalition's cost (or consumed power in min-power mode).
pub fn find_optimal_allocation(
    scenario: &Scenario,
    pool: &CoalitionPool,
    settings: &SolverSettings,
) -> Result<AllocationSolution, PlacementError> {
    let npms = pool.pms.len();
    let nvms = pool.vms.len();
    if npms == 0 {
        // Nothing to place VMs on; an empty workload is trivially optimal.
        return Ok(if nvms == 0 {
            AllocationSolution::empty()
        } else {
            AllocationSolution::unsolved()
        });
    }
    if settings.min_power {
        warn!("power optimization does not work well when PM switch-on/off costs and VM migration costs are not zero");
    }

    let mut vars = variables!();
    let x: Vec<Variable> = (0..npms).map(|_| vars.add(variable().binary())).collect();
    let y: Vec<Vec<Variable>> = (0..nvms)
        .map(|_| (0..npms).map(|_| vars.add(variable().binary())).collect())
        .collect();
    let s: Vec<Variable> = (0..npms)
        .map(|_| vars.add(variable().min(0.0).max(1.0)))
        .collect();

    // Constant objective terms (a powered-on PM that stays on incurs no
    // transition cost, one that goes off incurs the switch-off cost) do not
    // change the argmin and are accounted for in the post-processing only.
    let mut objective = Expression::with_capacity(npms * 2 + npms * nvms);
    for (h, pm) in pool.pms.iter().enumerate() {
        let model = &scenario.pm_power_models[pm.pm_type];
        let delta = model.max_power() - model.min_power();
        if settings.min_power {
            objective.add_mul(model.min_power(), x[h]);
            objective.add_mul(delta, s[h]);
        } else {
            let wcost = scenario.cip_electricity_costs[pm.owner] * 1e-3;
            objective.add_mul(model.min_power() * wcost, x[h]);
            objective.add_mul(delta * wcost, s[h]);
            let awake = scenario.cip_pm_awake_costs[pm.owner][pm.pm_type];
            let asleep = scenario.cip_pm_asleep_costs[pm.owner][pm.pm_type];
            if pm.is_on {
                objective.add_mul(-asleep, x[h]);
            } else {
                objective.add_mul(awake, x[h]);
            }
            for (v, vm) in pool.vms.iter().enumerate() {
                let migration = scenario.cip_to_cip_vm_migration_costs[vm.owner][pm.owner][vm.vm_type];
                if migration != 0. {
                    objective.add_mul(migration, y[v][h]);
                }
            }
        }
    }

    let mut problem = vars.minimise(objective).using(default_solver);

    // Every VM is placed on exactly one PM.
    for v in 0..nvms {
        let mut placed = Expression::with_capacity(npms);
        for h in 0..npms {
            placed.add_mul(1.0, y[v][h]);
        }
        problem = problem.with(placed.eq(1.0));
    }
    for h in 0..npms {
        let pm = &pool.pms[h];
        // A powered-off PM hosts nothing.
        if nvms > 0 {
            let mut hosted = Expression::with_capacity(nvms + 1);
            for v in 0..nvms {
                hosted.add_mul(1.0, y[v][h]);
            }
            hosted.add_mul(-(nvms as f64), x[h]);
            problem = problem.with(hosted.leq(0.0));
        }
        // RAM shares fit into a powered-on PM.
        let mut ram = Expression::with_capacity(nvms + 1);
        for (v, vm) in pool.vms.iter().enumerate() {
            ram.add_mul(scenario.vm_spec_rams[vm.vm_type][pm.pm_type], y[v][h]);
        }
        ram.add_mul(-1.0, x[h]);
        problem = problem.with(ram.leq(0.0));
        // CPU shares define the utilization.
        let mut cpu = Expression::with_capacity(nvms + 1);
        for (v, vm) in pool.vms.iter().enumerate() {
            cpu.add_mul(scenario.vm_spec_cpus[vm.vm_type][pm.pm_type], y[v][h]);
        }
        cpu.add_mul(-1.0, s[h]);
        problem = problem.with(cpu.eq(0.0));
        // An off PM has zero utilization.
        problem = problem.with((s[h] - x[h]).leq(0.0));
    }

    let solved = match problem.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => return Ok(AllocationSolution::unsolved()),
        Err(other) => return Err(PlacementError::Backend(other.to_string())),
    };

    // The binary decisions must come back integral from the back-end.
    for &var in x.iter().chain(y.iter().flatten()) {
        let value = solved.value(var);
        if (value - value.round()).abs() > 1e-4 {
            return Err(PlacementError::Backend(format!(
                "non-integral value {value} for a binary variable"
            )));
        }
    }

    let pm_power_states: Vec<bool> = x.iter().map(|&var| solved.value(var) > 0.5).collect();
    let pm_vm_allocations: Vec<Vec<bool>> = (0..npms)
        .map(|h| (0..nvms).map(|v| solved.value(y[v][h]) > 0.5).collect())
        .collect();

    // Post-processing: consumed watts per PM and the cost decomposition are
    // recomputed from the rounded decisions.
    let mut electricity = 0.0;
    let mut transitions = 0.0;
    let mut migrations = 0.0;
    let mut watts = 0.0;
    for (h, pm) in pool.pms.iter().enumerate() {
        let on = pm_power_states[h];
        if on != pm.is_on {
            transitions += if on {
                scenario.cip_pm_awake_costs[pm.owner][pm.pm_type]
            } else {
                scenario.cip_pm_asleep_costs[pm.owner][pm.pm_type]
            };
        }
        if !on {
            continue;
        }
        let model = &scenario.pm_power_models[pm.pm_type];
        let mut cpu_load = 0.0;
        for (v, vm) in pool.vms.iter().enumerate() {
            if pm_vm_allocations[h][v] {
                cpu_load += scenario.vm_spec_cpus[vm.vm_type][pm.pm_type];
                migrations += scenario.cip_to_cip_vm_migration_costs[vm.owner][pm.owner][vm.vm_type];
            }
        }
        let power = model.power(cpu_load);
        watts += power;
        electricity += power * scenario.cip_electricity_costs[pm.owner] * 1e-3;
    }

    let (objective, cost) = if settings.min_power {
        (watts, electricity)
    } else {
        let total = electricity + transitions + migrations;
        (total, total)
    };

    Ok(AllocationSolution {
        solved: true,
        optimal: true,
        objective,
        cost,
        kwatt: watts * 1e-3,
        pm_power_states,
        pm_vm_allocations,
    })
}
