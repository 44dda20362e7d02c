use std::collections::BTreeSet;

use cloudfed::core::evaluator::{evaluate_coalitions, EvaluationOptions};
use cloudfed::core::formation::{select_partitions, FormationCriterion};
use cloudfed::core::game::PayoffRule;
use cloudfed::core::scenario::Scenario;
use cloudfed::experiment::{Experiment, ExperimentOptions};
use cloudfed::extensions::csv_export::export_coalitions;
use cloudfed::extensions::workload_gen::{RandomOptions, WorkloadGenerator};

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0), "{a} != {b}");
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cloudfed-{}-{name}", std::process::id()))
}

const SYMMETRIC: &str = "
num_cips = 2
num_pm_types = 1
num_vm_types = 1
cip_num_pms = [[1] [1]]
cip_pm_power_states = [[1] [1]]
pm_spec_min_powers = [100]
pm_spec_max_powers = [200]
cip_num_vms = [[1] [1]]
vm_spec_cpus = [[0.5]]
vm_spec_rams = [[0.5]]
cip_revenues = [[1] [1]]
cip_electricity_costs = [1 1]
";

#[test]
fn consolidation_gain_makes_the_grand_coalition_nash_stable() {
    let scenario = Scenario::parse(SYMMETRIC).unwrap();
    let (game, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();

    assert_eq!(coalitions.len(), 3);
    assert!(coalitions.keys().all(|&cid| (1..=3).contains(&cid)));
    assert_close(coalitions[&1].value, 0.85);
    assert_close(coalitions[&2].value, 0.85);
    assert_close(coalitions[&3].value, 1.8);
    assert!(coalitions[&3].value > coalitions[&1].value + coalitions[&2].value);

    // Symmetric players split the surplus equally.
    assert_close(coalitions[&3].payoffs[&0], 0.9);
    assert_close(coalitions[&3].payoffs[&1], 0.9);
    let budget: f64 = coalitions[&3].payoffs.values().sum();
    assert_close(budget, game.value(3));
    assert!(!coalitions[&3].core_empty);
    assert!(coalitions[&3].payoffs_in_core);

    let stable = select_partitions(&game, &coalitions, FormationCriterion::NashStable);
    assert_eq!(stable.len(), 1);
    assert_eq!(stable[0].coalitions, BTreeSet::from([3]));

    // The other criteria agree on this scenario.
    for criterion in [
        FormationCriterion::MergeSplitStable,
        FormationCriterion::ParetoOptimal,
        FormationCriterion::SocialOptimum,
    ] {
        let best = select_partitions(&game, &coalitions, criterion);
        assert_eq!(best.len(), 1, "{criterion}");
        assert_eq!(best[0].coalitions, BTreeSet::from([3]), "{criterion}");
    }
}

#[test]
fn migration_fees_keep_the_providers_alone() {
    let with_migration = format!(
        "{SYMMETRIC}\ncip_to_cip_vm_migration_costs = [[[0] [10]] [[10] [0]]]\n"
    );
    let scenario = Scenario::parse(&with_migration).unwrap();
    let (game, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();

    // Consolidation is no longer profitable: the grand coalition is worth no
    // more than the providers on their own.
    assert_close(coalitions[&3].value, coalitions[&1].value + coalitions[&2].value);

    let stable = select_partitions(&game, &coalitions, FormationCriterion::NashStable);
    assert!(stable
        .iter()
        .any(|part| part.coalitions == BTreeSet::from([1, 2])));
    let social = select_partitions(&game, &coalitions, FormationCriterion::SocialOptimum);
    assert!(social
        .iter()
        .any(|part| part.coalitions == BTreeSet::from([1, 2])));
}

#[test]
fn symmetric_additive_game_pays_everyone_its_stand_alone_value() {
    // Machines that draw no power: every coalition is worth 2 per member.
    let scenario = Scenario::parse(
        "
num_cips = 3
num_pm_types = 1
num_vm_types = 1
cip_num_pms = [[1] [1] [1]]
pm_spec_min_powers = [0]
pm_spec_max_powers = [0]
cip_num_vms = [[1] [1] [1]]
vm_spec_cpus = [[0.5]]
vm_spec_rams = [[0.5]]
cip_revenues = [[2] [2] [2]]
cip_electricity_costs = [1 1 1]
",
    )
    .unwrap();
    let (game, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();

    assert_eq!(coalitions.len(), 7);
    for (cid, info) in &coalitions {
        assert_close(info.value, 2.0 * cid.count_ones() as f64);
    }
    for p in 0..3 {
        assert_close(coalitions[&7].payoffs[&p], 2.0);
    }
    assert!(!coalitions[&7].core_empty);
    assert!(coalitions[&7].payoffs_in_core);

    let stable = select_partitions(&game, &coalitions, FormationCriterion::NashStable);
    assert!(stable
        .iter()
        .any(|part| part.coalitions == BTreeSet::from([7])));
}

#[test]
fn non_viable_coalitions_get_the_sentinel_value_and_empty_core() {
    // Provider 1 cannot host its own two VMs, so every coalition containing
    // it is infeasible while provider 0 remains analyzable.
    let scenario = Scenario::parse(
        "
num_cips = 2
num_pm_types = 1
num_vm_types = 1
cip_num_pms = [[1] [1]]
cip_pm_power_states = [[1] [1]]
pm_spec_min_powers = [100]
pm_spec_max_powers = [200]
cip_num_vms = [[1] [2]]
vm_spec_cpus = [[0.6]]
vm_spec_rams = [[0.6]]
cip_revenues = [[1] [1]]
cip_electricity_costs = [1 1]
",
    )
    .unwrap();
    let (game, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();

    assert!(coalitions[&1].allocation.solved);
    assert_close(coalitions[&1].value, 0.84);
    assert!(!coalitions[&1].payoffs.is_empty());

    for cid in [2usize, 3] {
        let info = &coalitions[&cid];
        assert!(!info.allocation.solved);
        assert_eq!(info.value, -f64::MIN_POSITIVE);
        assert!(info.core_empty);
        assert!(info.payoffs.is_empty());
        assert!(!info.payoffs_in_core);
    }

    // No partition survives: every arrangement gives some player an
    // unvalued deviation or membership.
    let stable = select_partitions(&game, &coalitions, FormationCriterion::NashStable);
    assert!(stable.is_empty());
}

#[test]
fn single_provider_has_one_partition_under_every_criterion() {
    let scenario = Scenario::parse(
        "
num_cips = 1
num_pm_types = 1
num_vm_types = 1
cip_num_pms = [[1]]
cip_pm_power_states = [[1]]
pm_spec_min_powers = [100]
pm_spec_max_powers = [200]
cip_num_vms = [[1]]
vm_spec_cpus = [[0.5]]
vm_spec_rams = [[0.5]]
cip_revenues = [[1]]
cip_electricity_costs = [1]
",
    )
    .unwrap();
    let (game, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();
    assert_eq!(coalitions.len(), 1);
    assert_close(coalitions[&1].value, 0.85);

    for criterion in [
        FormationCriterion::MergeSplitStable,
        FormationCriterion::NashStable,
        FormationCriterion::ParetoOptimal,
        FormationCriterion::SocialOptimum,
    ] {
        let best = select_partitions(&game, &coalitions, criterion);
        assert_eq!(best.len(), 1, "{criterion}");
        assert_eq!(best[0].coalitions, BTreeSet::from([1]), "{criterion}");
        assert_close(best[0].payoffs[&0], 0.85);
    }
}

#[test]
fn sample_scenario_federates_and_saves_energy() {
    let scenario = Scenario::from_file("demos/sample.scenario").unwrap();
    let (game, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();

    assert_eq!(coalitions.len(), 7);
    assert_close(coalitions[&7].value, 2.83);

    let stable = select_partitions(&game, &coalitions, FormationCriterion::NashStable);
    assert!(stable
        .iter()
        .any(|part| part.coalitions == BTreeSet::from([7])));

    // Pooling the machines beats everyone running their own.
    let singleton_kwatt: f64 = [1usize, 2, 4]
        .iter()
        .map(|cid| coalitions[cid].allocation.kwatt)
        .sum();
    assert!(coalitions[&7].allocation.kwatt < singleton_kwatt);
    assert_close(coalitions[&7].allocation.kwatt, 0.375);
    assert_close(singleton_kwatt, 0.475);
}

#[test]
fn parallel_evaluation_matches_the_sequential_one() {
    let scenario = Scenario::from_file("demos/sample.scenario").unwrap();
    let sequential = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();
    let parallel = evaluate_coalitions(
        &scenario,
        &EvaluationOptions {
            threads: 4,
            ..EvaluationOptions::default()
        },
    )
    .unwrap();

    for (cid, info) in &sequential.1 {
        let other = &parallel.1[cid];
        assert_eq!(info.value, other.value);
        assert_eq!(info.payoffs, other.payoffs);
        assert_eq!(info.core_empty, other.core_empty);
    }
}

#[test]
fn banzhaf_payoffs_need_not_be_budget_balanced() {
    let scenario = Scenario::parse(SYMMETRIC).unwrap();
    let options = EvaluationOptions {
        payoff_rule: PayoffRule::Banzhaf,
        ..EvaluationOptions::default()
    };
    let (game, coalitions) = evaluate_coalitions(&scenario, &options).unwrap();
    // beta_p = ((v({p}) - 0) + (v(S) - v({q}))) / 2 = (0.85 + 0.95) / 2.
    assert_close(coalitions[&3].payoffs[&0], 0.9);
    // Here the Banzhaf total happens to match v(S); the normalized variant
    // guarantees it.
    let norm_options = EvaluationOptions {
        payoff_rule: PayoffRule::NormBanzhaf,
        ..EvaluationOptions::default()
    };
    let (_, norm_coalitions) = evaluate_coalitions(&scenario, &norm_options).unwrap();
    let total: f64 = norm_coalitions[&3].payoffs.values().sum();
    assert_close(total, game.value(3));
}

#[test]
fn csv_export_round_trips_and_separates_blocks() {
    let scenario = Scenario::parse(SYMMETRIC).unwrap();
    let (_, coalitions) = evaluate_coalitions(&scenario, &EvaluationOptions::default()).unwrap();

    let path = temp_path("roundtrip.csv");
    let path_str = path.to_str().unwrap();
    export_coalitions(path_str, scenario.num_cips, &coalitions, false).unwrap();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(&path)
        .unwrap();
    let header = reader.headers().unwrap().clone();
    assert_eq!(
        header.iter().collect::<Vec<_>>(),
        vec!["Coalition ID", "Payoff(CIP 0)", "Payoff(CIP 1)", "Value(Coalition)"]
    );
    let mut seen = Vec::new();
    for record in reader.records() {
        let record = record.unwrap();
        let cid: usize = record[0].parse().unwrap();
        let info = &coalitions[&cid];
        for p in 0..scenario.num_cips {
            let cell = &record[1 + p];
            match info.payoffs.get(&p) {
                Some(&payoff) => assert_eq!(cell.parse::<f64>().unwrap(), payoff),
                None => assert!(cell.is_empty()),
            }
        }
        seen.push(cid);
    }
    assert_eq!(seen, vec![1, 2, 3]);

    // Appending adds a blank separator row and no second header.
    export_coalitions(path_str, scenario.num_cips, &coalitions, true).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[4], ",,");
    assert_eq!(lines[1], lines[5]);
    assert_eq!(text.matches("Coalition ID").count(), 1);

    std::fs::remove_file(&path).ok();
}

#[test]
fn workload_generation_is_deterministic_per_seed() {
    let base = Scenario::from_file("demos/sample.scenario").unwrap();
    let options = RandomOptions {
        gen_vms: true,
        gen_pm_power_states: true,
        gen_pm_on_off_costs: true,
        gen_vm_migration_costs: true,
    };

    let mut first = WorkloadGenerator::new(&base, options, 5489);
    let mut second = WorkloadGenerator::new(&base, options, 5489);
    for _ in 0..3 {
        assert_eq!(first.perturb(&base), second.perturb(&base));
    }

    // Perturbation respects the scenario's own invariants.
    let mut generator = WorkloadGenerator::new(&base, options, 7);
    let perturbed = generator.perturb(&base);
    for c in 0..base.num_cips {
        for v in 0..base.num_vm_types {
            assert!(perturbed.cip_num_vms[c][v] <= base.cip_num_vms[c][v]);
        }
        assert_eq!(perturbed.cip_pm_power_states[c].len(), base.num_pms_of(c));
        for src in 0..base.num_cips {
            assert_eq!(perturbed.cip_to_cip_vm_migration_costs[src][src], vec![0.0; 3]);
            for t in 0..base.num_pm_types {
                assert!(perturbed.cip_pm_asleep_costs[c][t] >= 0.0);
            }
        }
    }
}

#[test]
fn repeated_experiments_produce_identical_csv() {
    let scenario = Scenario::parse(SYMMETRIC).unwrap();
    let first = temp_path("repeat-a.csv");
    let second = temp_path("repeat-b.csv");

    for path in [&first, &second] {
        let options = ExperimentOptions {
            csv_path: Some(path.to_str().unwrap().to_string()),
            random: RandomOptions {
                gen_vms: true,
                gen_pm_power_states: true,
                ..RandomOptions::default()
            },
            num_iterations: 2,
            ..ExperimentOptions::default()
        };
        Experiment::new(scenario.clone(), options).run().unwrap();
    }

    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);

    std::fs::remove_file(&first).ok();
    std::fs::remove_file(&second).ok();
}
