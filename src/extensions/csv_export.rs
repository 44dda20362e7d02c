//! CSV export of the coalition table.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};

use crate::core::evaluator::CoalitionInfo;
use crate::core::game::CoalitionId;

/// Writes one block of the coalition table to `path`, one row per coalition
/// id in ascending order. Columns are the coalition id, one payoff per
/// provider (blank for non-members) and the sum of the emitted payoffs.
///
/// The first block carries the header; an appended block is preceded by a
/// blank separator row instead.
pub fn export_coalitions(
    path: &str,
    num_cips: usize,
    coalitions: &BTreeMap<CoalitionId, CoalitionInfo>,
    append: bool,
) -> Result<(), csv::Error> {
    let file = if append {
        OpenOptions::new().append(true).create(true).open(path)?
    } else {
        File::create(path)?
    };
    // Separator rows are one field shorter than data rows.
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

    if append {
        writer.write_record(vec![""; num_cips + 1])?;
    } else {
        let mut header = vec!["Coalition ID".to_string()];
        header.extend((0..num_cips).map(|p| format!("Payoff(CIP {p})")));
        header.push("Value(Coalition)".to_string());
        writer.write_record(&header)?;
    }

    for (cid, info) in coalitions {
        let mut record = vec![cid.to_string()];
        let mut value = 0.0;
        for p in 0..num_cips {
            match info.payoffs.get(&p) {
                Some(&payoff) => {
                    value += payoff;
                    record.push(payoff.to_string());
                }
                None => record.push(String::new()),
            }
        }
        record.push(value.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
