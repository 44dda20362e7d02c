//! Human-readable report on the formed coalitions.

use std::collections::BTreeMap;

use crate::core::evaluator::CoalitionInfo;
use crate::core::formation::PartitionInfo;
use crate::core::game::CoalitionId;

fn fmt_payoffs(payoffs: &BTreeMap<usize, f64>) -> String {
    let entries: Vec<String> = payoffs
        .iter()
        .map(|(pid, value)| format!("{pid} => {value}"))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

/// Prints the report for one analysis run: the best partitions, the grand
/// coalition and the singleton partition.
pub fn print_report(
    num_cips: usize,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
    best_partitions: &[PartitionInfo],
) {
    let grand_cid: CoalitionId = (1 << num_cips) - 1;

    println!("################################################################################");
    println!("### Report on Formed Coalitions:");
    println!("################################################################################");

    println!("- Best Partitions:");
    if best_partitions.is_empty() {
        println!(" * NOT AVAILABLE");
    }
    for part in best_partitions {
        let mut part_value = 0.0;
        let mut part_kwatt = 0.0;

        let payoff_blocks: Vec<String> = part
            .coalitions
            .iter()
            .map(|cid| {
                let info = &coalitions[cid];
                part_kwatt += info.allocation.kwatt;
                part_value += info.payoffs.values().sum::<f64>();
                fmt_payoffs(&info.payoffs)
            })
            .collect();
        println!(" * Payoffs: {{{}}}", payoff_blocks.join(", "));
        println!(" * Value: {part_value}");
        println!(" * Energy Consumption: {part_kwatt}");

        let core_flags: Vec<String> = part
            .coalitions
            .iter()
            .map(|cid| (!coalitions[cid].core_empty).to_string())
            .collect();
        println!(" * Core exists?: {{{}}}", core_flags.join(", "));

        let in_core_flags: Vec<String> = part
            .coalitions
            .iter()
            .map(|cid| coalitions[cid].payoffs_in_core.to_string())
            .collect();
        println!(" * Value inside the Core?: {{{}}}", in_core_flags.join(", "));

        let grand = &coalitions[&grand_cid];
        let mut grand_value = 0.0;
        let grand_increments: Vec<String> = part
            .coalitions
            .iter()
            .map(|cid| {
                let entries: Vec<String> = coalitions[cid]
                    .payoffs
                    .iter()
                    .map(|(pid, value)| {
                        let reference = grand.payoffs.get(pid).copied().unwrap_or(f64::NAN);
                        grand_value += reference;
                        format!("{pid} => {}%", (value / reference - 1.0) * 100.0)
                    })
                    .collect();
                format!("{{{}}}", entries.join(", "))
            })
            .collect();
        println!(
            " * Payoff increments wrt Grand-Coalition: {{{}}}",
            grand_increments.join(", ")
        );
        println!(
            " * Value increments wrt Grand-Coalition: {}%",
            (part_value / grand_value - 1.0) * 100.0
        );

        let mut singleton_value = 0.0;
        let mut singleton_kwatt = 0.0;
        let singleton_increments: Vec<String> = part
            .coalitions
            .iter()
            .map(|cid| {
                let entries: Vec<String> = coalitions[cid]
                    .payoffs
                    .iter()
                    .map(|(pid, value)| {
                        let singleton = &coalitions[&(1 << pid)];
                        let reference = singleton.payoffs.get(pid).copied().unwrap_or(f64::NAN);
                        singleton_value += reference;
                        singleton_kwatt += singleton.allocation.kwatt;
                        format!("{pid} => {}%", (value / reference - 1.0) * 100.0)
                    })
                    .collect();
                format!("{{{}}}", entries.join(", "))
            })
            .collect();
        println!(
            " * Payoff increments wrt Singleton Coalitions: {{{}}}",
            singleton_increments.join(", ")
        );
        println!(
            " * Value increments wrt Singleton Coalitions: {}%",
            (part_value / singleton_value - 1.0) * 100.0
        );
        println!(
            " * Energy savings wrt Singleton Coalitions: {}%",
            (1.0 - part_kwatt / singleton_kwatt) * 100.0
        );
    }

    println!("- Grand Coalition:");
    match coalitions.get(&grand_cid) {
        Some(info) => {
            if !info.allocation.solved {
                println!(" * Infeasible allocation (empty core)");
            }
            println!(" * Payoffs: {}", fmt_payoffs(&info.payoffs));
            println!(" * Value: {}", info.payoffs.values().sum::<f64>());
            println!(" * Core exists?: {{{}}}", !info.core_empty);
            println!(" * Value inside the Core?: {{{}}}", info.payoffs_in_core);
        }
        None => println!(" * NOT AVAILABLE"),
    }

    println!("- Singleton Coalitions:");
    let mut singleton_value = 0.0;
    let mut singleton_kwatt = 0.0;
    let payoffs: Vec<String> = (0..num_cips)
        .map(|pid| {
            let info = &coalitions[&(1 << pid)];
            let payoff = info.payoffs.get(&pid).copied().unwrap_or(f64::NAN);
            singleton_value += payoff;
            singleton_kwatt += info.allocation.kwatt;
            format!("{{{pid} => {payoff}}}")
        })
        .collect();
    println!(" * Payoffs: {{{}}}", payoffs.join(", "));
    println!(" * Value: {singleton_value}");
    println!(" * Energy Consumption: {singleton_kwatt}");
    let core_flags: Vec<String> = (0..num_cips)
        .map(|pid| format!("{{{}}}", !coalitions[&(1 << pid)].core_empty))
        .collect();
    println!(" * Core exists?: {{{}}}", core_flags.join(", "));
    let in_core_flags: Vec<String> = (0..num_cips)
        .map(|pid| format!("{{{}}}", coalitions[&(1 << pid)].payoffs_in_core))
        .collect();
    println!(" * Value inside the Core?: {{{}}}", in_core_flags.join(", "));
}
