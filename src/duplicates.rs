use polars::prelude::*;

use crate::error::HarmonizeError;
use crate::frame::records_to_frame;
use crate::record::Record;
use crate::run_log::{RunLog, Stage};
use crate::schema::record::{CELL_KEY_COLUMNS, VALUE};

const ROW: &str = "row";
const CELL_COUNT: &str = "cell_count";

/// Outcome of a duplicate check.
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// Records whose cell key occurs exactly once.
    pub clean: Vec<Record>,
    /// Every record of a cell key reported with conflicting values.
    pub duplicates: Vec<Record>,
    /// Value-identical repeats collapsed into their first occurrence.
    pub exact_removed: usize,
}

impl DuplicateReport {
    /// Rows dropped from the input in total.
    pub fn removed(&self) -> usize {
        self.exact_removed + self.duplicates.len()
    }
}

fn cell_key() -> Vec<Expr> {
    CELL_KEY_COLUMNS.iter().map(|c| col(*c)).collect()
}

/// Input row positions in input order, each with the number of rows sharing its cell key.
fn count_cells(rows: LazyFrame) -> Result<Vec<(usize, usize)>, HarmonizeError> {
    let counts = rows.clone().group_by(cell_key()).agg([len().alias(CELL_COUNT)]);
    let counted = rows
        .join(counts, cell_key(), cell_key(), JoinArgs::new(JoinType::Left))
        .select([
            col(ROW).cast(DataType::Int64),
            col(CELL_COUNT).cast(DataType::Int64),
        ])
        .sort([ROW], SortMultipleOptions::default())
        .collect()?;

    let positions = counted.column(ROW)?.i64()?;
    let counts = counted.column(CELL_COUNT)?.i64()?;
    Ok(positions
        .into_iter()
        .zip(counts)
        .filter_map(|(row, n)| Some((row? as usize, n? as usize)))
        .collect())
}

fn indexed(records: &[Record]) -> Result<LazyFrame, HarmonizeError> {
    let frame = records_to_frame(records)?.with_row_index(ROW.into(), None)?;
    // -0.0 and 0.0 are the same reported value
    Ok(frame.lazy().with_column(col(VALUE) + lit(0.0)))
}

/// Collapse exact repeats, then set aside every cell reported with more than one value.
///
/// No winner is picked for a conflict; all of its records leave the clean set.
/// Input order is preserved in both partitions.
pub fn check_duplicates(records: &[Record], log: &mut RunLog) -> Result<DuplicateReport, HarmonizeError> {
    let mut exact_key = cell_key();
    exact_key.push(col(VALUE));
    // First occurrence of each (cell, value); NaN values group together
    let distinct = indexed(records)?
        .group_by(exact_key)
        .agg([col(ROW).min()]);
    let cells = count_cells(distinct)?;

    let mut report = DuplicateReport {
        exact_removed: records.len() - cells.len(),
        ..DuplicateReport::default()
    };
    for (row, n) in cells {
        let record = records[row].clone();
        if n == 1 {
            report.clean.push(record);
        } else {
            report.duplicates.push(record);
        }
    }

    log.info(
        Stage::Duplicates,
        format!("found {} duplicated entries", report.removed()),
    );
    log.info(
        Stage::Duplicates,
        format!("...{} of them have conflicting values", report.duplicates.len()),
    );
    Ok(report)
}

/// Drop every record whose cell key occurs more than once, keeping none of them.
pub fn drop_ambiguous(records: Vec<Record>) -> Result<(Vec<Record>, usize), HarmonizeError> {
    let cells = count_cells(indexed(&records)?)?;
    let before = records.len();
    let mut single = vec![false; before];
    for (row, n) in cells {
        single[row] = n == 1;
    }
    let kept: Vec<Record> = records
        .into_iter()
        .zip(single)
        .filter_map(|(r, keep)| keep.then_some(r))
        .collect();
    let dropped = before - kept.len();
    Ok((kept, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rec(scenario: &str, year: i64, value: f64) -> Record {
        Record::new("X", scenario, "WLD", "PROD", "CRP", "t", year, value)
    }

    #[test]
    fn exact_repeats_collapse_to_one() {
        let input = vec![rec("BAU", 2020, 1.0), rec("BAU", 2020, 1.0), rec("BAU", 2030, 2.0)];
        let report = check_duplicates(&input, &mut RunLog::new("t")).unwrap();
        assert_eq!(report.clean.len(), 2);
        assert!(report.duplicates.is_empty());
        assert_eq!(report.exact_removed, 1);
    }

    #[test]
    fn conflicting_values_remove_every_copy() {
        let input = vec![
            rec("BAU", 2020, 1.0),
            rec("BAU", 2020, 2.0),
            rec("BAU", 2020, 2.0),
            rec("ELM", 2020, 3.0),
        ];
        let report = check_duplicates(&input, &mut RunLog::new("t")).unwrap();
        assert_eq!(report.clean, vec![rec("ELM", 2020, 3.0)]);
        assert_eq!(report.duplicates, vec![rec("BAU", 2020, 1.0), rec("BAU", 2020, 2.0)]);
        assert_eq!(report.removed(), 3);
    }

    #[test]
    fn partitions_are_disjoint_and_cover_the_distinct_input() {
        let input = vec![
            rec("BAU", 2020, 1.0),
            rec("BAU", 2020, 1.0),
            rec("BAU", 2025, 1.0),
            rec("BAU", 2025, 9.0),
            rec("ELM", 2030, f64::NAN),
            rec("ELM", 2030, f64::NAN),
        ];
        let report = check_duplicates(&input, &mut RunLog::new("t")).unwrap();

        let clean: HashSet<_> = report.clean.iter().map(Record::exact_key).collect();
        let dups: HashSet<_> = report.duplicates.iter().map(Record::exact_key).collect();
        assert!(clean.is_disjoint(&dups));

        let distinct: HashSet<_> = input.iter().map(Record::exact_key).collect();
        let union: HashSet<_> = clean.union(&dups).cloned().collect();
        assert_eq!(union, distinct);
    }

    #[test]
    fn signed_zeros_are_the_same_value() {
        let input = vec![rec("BAU", 2020, 0.0), rec("BAU", 2020, -0.0)];
        let report = check_duplicates(&input, &mut RunLog::new("t")).unwrap();
        assert_eq!(report.clean.len(), 1);
        assert_eq!(report.exact_removed, 1);
    }

    #[test]
    fn empty_input_yields_empty_outputs() {
        let report = check_duplicates(&[], &mut RunLog::new("t")).unwrap();
        assert!(report.clean.is_empty());
        assert!(report.duplicates.is_empty());
        assert_eq!(report.removed(), 0);
    }

    #[test]
    fn drop_ambiguous_keeps_none_of_a_repeated_key() {
        let (kept, dropped) = drop_ambiguous(vec![
            rec("BAU", 2020, 1.0),
            rec("BAU", 2020, 1.0),
            rec("ELM", 2020, 1.0),
        ])
        .unwrap();
        assert_eq!(kept, vec![rec("ELM", 2020, 1.0)]);
        assert_eq!(dropped, 2);
    }
}
