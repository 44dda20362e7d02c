use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use cloudfed::core::formation::FormationCriterion;
use cloudfed::core::game::PayoffRule;
use cloudfed::core::placement::SolverSettings;
use cloudfed::core::scenario::Scenario;
use cloudfed::experiment::{Experiment, ExperimentOptions};
use cloudfed::extensions::workload_gen::RandomOptions;

fn init_logger() {
    use env_logger::{Builder, Env};
    use std::io::Write;
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format(|buf, record| writeln!(buf, "({}) {}", record.level().as_str().chars().next().unwrap_or('?'), record.args()))
        .init();
}

/// Coalition formation analysis for federations of cloud providers.
#[derive(Parser, Debug)]
#[clap(name = "sim", about, long_about = None)]
struct Args {
    /// Path to the file describing the scenario to analyze
    #[clap(long)]
    scenario: Option<String>,

    /// Export all the analyzed coalitions to a CSV file
    #[clap(long)]
    csv: Option<String>,

    /// Coalition formation criterion: merge-split, nash, pareto or social
    #[clap(long, default_value = "nash")]
    formation: String,

    /// Coalition value division rule: banzhaf, norm-banzhaf or shapley
    #[clap(long, default_value = "shapley")]
    payoff: String,

    /// Relative gap in [0, 1] accepted from the optimal solver
    #[clap(long, default_value_t = 0.0)]
    opt_relgap: f64,

    /// Time limit in seconds for each solver run (negative: no limit)
    #[clap(long, default_value_t = -1.0, allow_hyphen_values = true)]
    opt_tilim: f64,

    /// Generate the number of VMs of each CIP at random
    #[clap(long)]
    rnd_genvms: bool,

    /// Generate the PM power states of each CIP at random
    #[clap(long)]
    rnd_genpmsonoff: bool,

    /// Generate the PM switch-on/off costs of each CIP and PM type at random
    #[clap(long)]
    rnd_genpmsonoffcosts: bool,

    /// Generate the CIP-to-CIP VM migration costs at random
    #[clap(long)]
    rnd_genvmsmigrcosts: bool,

    /// Number of times the scenario is run (effective with --rnd-genvms)
    #[clap(long, default_value_t = 1)]
    rnd_numit: usize,

    /// Seed for random number generation
    #[clap(long, default_value_t = 5489)]
    rnd_seed: u64,

    /// Number of worker threads for the per-coalition solves
    #[clap(long, default_value_t = 1)]
    threads: usize,
}

fn main() {
    init_logger();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => -1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let Some(scenario_path) = args.scenario else {
        eprintln!("(E) Scenario file not specified");
        let _ = Args::command().print_help();
        std::process::exit(-1);
    };
    let formation: FormationCriterion = match args.formation.parse() {
        Ok(formation) => formation,
        Err(message) => {
            eprintln!("(E) {message}");
            std::process::exit(-1);
        }
    };
    let payoff_rule: PayoffRule = match args.payoff.parse() {
        Ok(rule) => rule,
        Err(message) => {
            eprintln!("(E) {message}");
            std::process::exit(-1);
        }
    };
    let scenario = match Scenario::from_file(&scenario_path) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("(E) {err}");
            std::process::exit(-1);
        }
    };

    let options = ExperimentOptions {
        formation,
        payoff_rule,
        solver: SolverSettings {
            relative_gap: args.opt_relgap,
            time_limit: args.opt_tilim,
            min_power: false,
        },
        threads: args.threads.max(1),
        csv_path: args.csv,
        random: RandomOptions {
            gen_vms: args.rnd_genvms,
            gen_pm_power_states: args.rnd_genpmsonoff,
            gen_pm_on_off_costs: args.rnd_genpmsonoffcosts,
            gen_vm_migration_costs: args.rnd_genvmsmigrcosts,
        },
        seed: args.rnd_seed,
        num_iterations: args.rnd_numit,
    };

    if let Err(err) = Experiment::new(scenario, options).run() {
        eprintln!("(E) {err}");
        std::process::exit(-1);
    }
}
