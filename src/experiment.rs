//! Experiment driver: the perturbation loop over coalition analysis runs.

use std::fmt;

use log::warn;
use thiserror::Error;

use crate::core::evaluator::{evaluate_coalitions, EvaluationError, EvaluationOptions};
use crate::core::formation::{select_partitions, FormationCriterion};
use crate::core::game::PayoffRule;
use crate::core::math::definitely_greater;
use crate::core::placement::SolverSettings;
use crate::core::report::print_report;
use crate::core::scenario::Scenario;
use crate::extensions::csv_export::export_coalitions;
use crate::extensions::workload_gen::{RandomOptions, WorkloadGenerator};

/// Everything configurable about an experiment.
#[derive(Debug, Clone)]
pub struct ExperimentOptions {
    pub formation: FormationCriterion,
    pub payoff_rule: PayoffRule,
    pub solver: SolverSettings,
    /// Worker threads for the per-coalition solves; 1 runs them inline.
    pub threads: usize,
    /// Export the coalition table of every iteration to this CSV file.
    pub csv_path: Option<String>,
    pub random: RandomOptions,
    pub seed: u64,
    /// Number of iterations; only effective with random VM generation.
    pub num_iterations: usize,
}

impl Default for ExperimentOptions {
    fn default() -> Self {
        Self {
            formation: FormationCriterion::NashStable,
            payoff_rule: PayoffRule::Shapley,
            solver: SolverSettings::default(),
            threads: 1,
            csv_path: None,
            random: RandomOptions::default(),
            seed: 5489,
            num_iterations: 1,
        }
    }
}

impl fmt::Display for ExperimentOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "relative-gap: {}, time_limit: {}, coalition_formation: {}, \
             coalition_value_division: {}, csv_file_name: {}, random_gen_vms: {}, \
             random_gen_pm_power_states: {}, random_gen_pm_on_off_costs: {}, \
             random_gen_vm_migration_costs: {}, random_seed: {}, random_num_iters: {}",
            self.solver.relative_gap,
            self.solver.time_limit,
            self.formation,
            self.payoff_rule,
            self.csv_path.as_deref().unwrap_or(""),
            self.random.gen_vms,
            self.random.gen_pm_power_states,
            self.random.gen_pm_on_off_costs,
            self.random.gen_vm_migration_costs,
            self.seed,
            self.num_iterations,
        )
    }
}

/// Fatal experiment failures; per-coalition infeasibilities are handled
/// inside the evaluation and do not surface here.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("cannot export CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// A scenario plus options, runnable one or more times.
pub struct Experiment {
    scenario: Scenario,
    options: ExperimentOptions,
}

impl Experiment {
    pub fn new(scenario: Scenario, options: ExperimentOptions) -> Self {
        Self { scenario, options }
    }

    /// Runs the configured number of iterations: perturb, evaluate every
    /// coalition, select the best partitions, report, export.
    pub fn run(&self) -> Result<(), ExperimentError> {
        if definitely_greater(self.options.solver.relative_gap, 0.0)
            || self.options.solver.time_limit > 0.0
        {
            warn!("the embedded solver always solves to optimality; the relative gap and time limit settings are ignored");
        }
        let iterations = if self.options.random.gen_vms {
            self.options.num_iterations.max(1)
        } else {
            1
        };
        let mut generator =
            WorkloadGenerator::new(&self.scenario, self.options.random, self.options.seed);
        let eval_options = EvaluationOptions {
            payoff_rule: self.options.payoff_rule,
            solver: self.options.solver,
            threads: self.options.threads,
        };

        for iteration in 1..=iterations {
            println!("Iteration #{iteration}");
            let scenario = generator.perturb(&self.scenario);
            println!("Scenario: {scenario}");
            println!("Options: {}", self.options);
            println!("Analyzing coalitions...");

            let (game, coalitions) = evaluate_coalitions(&scenario, &eval_options)?;
            let best = select_partitions(&game, &coalitions, self.options.formation);
            print_report(scenario.num_cips, &coalitions, &best);

            if let Some(path) = &self.options.csv_path {
                export_coalitions(path, scenario.num_cips, &coalitions, iteration > 1)?;
            }
        }
        println!("DONE!");
        Ok(())
    }
}
