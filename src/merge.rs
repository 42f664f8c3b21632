//! Folding several submissions into one dataset.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::duplicates::{check_duplicates, drop_ambiguous};
use crate::error::HarmonizeError;
use crate::frame::read_canonical_csv;
use crate::reader::RecordReader;
use crate::record::{normalize_scenario, Record};
use crate::run_log::{RunLog, Stage};

/// Replace every model present in `new` wholesale.
///
/// Records whose 7-field key repeats within their own set are dropped first.
/// The result is `new` followed by the rows of `old` whose model `new` lacks.
pub fn update_dataset(old: Vec<Record>, new: Vec<Record>) -> Result<Vec<Record>, HarmonizeError> {
    let (old, _) = drop_ambiguous(uppercase_scenarios(old))?;
    let (new, _) = drop_ambiguous(uppercase_scenarios(new))?;

    let replaced: HashSet<&str> = new.iter().map(|r| r.model.as_str()).collect();
    let remainder: Vec<Record> = old
        .into_iter()
        .filter(|r| !replaced.contains(r.model.as_str()))
        .collect();

    let mut merged = new;
    merged.extend(remainder);
    Ok(merged)
}

fn uppercase_scenarios(mut records: Vec<Record>) -> Vec<Record> {
    for r in &mut records {
        r.scenario = normalize_scenario(&r.scenario);
    }
    records
}

/// Read raw submissions one after another, each updating the dataset built so far.
///
/// The first file is taken as read; every later file folds in through
/// [`update_dataset`]. With `drop_duplicates`, keys that still repeat in the
/// result are discarded at the end.
pub fn merge_raw(
    paths: &[PathBuf],
    reader: &dyn RecordReader,
    drop_duplicates: bool,
    log: &mut RunLog,
) -> Result<Vec<Record>, HarmonizeError> {
    let mut merged: Option<Vec<Record>> = None;
    for path in paths {
        let records = reader.read(path)?;
        log.info(
            Stage::Merge,
            format!("{}: read {} records", path.display(), records.len()),
        );
        check_duplicates(&records, log)?;
        merged = Some(match merged {
            None => records,
            Some(old) => update_dataset(old, records)?,
        });
    }
    let mut merged = merged.unwrap_or_default();
    if drop_duplicates {
        let (kept, dropped) = drop_ambiguous(merged)?;
        log.info(Stage::Merge, format!("dropped {dropped} ambiguous records"));
        merged = kept;
    }
    log.info(Stage::Merge, format!("merged dataset holds {} records", merged.len()));
    Ok(merged)
}

/// Concatenate canonical CSV files (with header).
///
/// With `drop_duplicates`, every record whose 7-field key occurs more than once
/// across the inputs is discarded.
pub fn merge_files<P: AsRef<Path>>(
    paths: &[P],
    drop_duplicates: bool,
    log: &mut RunLog,
) -> Result<Vec<Record>, HarmonizeError> {
    let mut merged = Vec::new();
    for path in paths {
        merged.extend(uppercase_scenarios(read_canonical_csv(path.as_ref())?));
    }
    if drop_duplicates {
        let (kept, dropped) = drop_ambiguous(merged)?;
        log.info(Stage::Merge, format!("dropped {dropped} ambiguous records"));
        merged = kept;
    }
    log.info(
        Stage::Merge,
        format!("concatenated {} files into {} records", paths.len(), merged.len()),
    );
    Ok(merged)
}

/// Default output name for [`merge_raw`].
pub fn default_raw_merge_name(date: NaiveDate) -> String {
    format!("merged_{}.csv", date.format("%y%m%d"))
}

/// Default output name for [`merge_files`]; `base_dir` is the name of the
/// directory holding the first input.
pub fn default_merge_name(base_dir: &str, date: NaiveDate, duplicates_dropped: bool) -> String {
    let date = date.format("%y%m%d");
    if duplicates_dropped {
        format!("merged-{base_dir}_duplicates-dropped_{date}.csv")
    } else {
        format!("merged-{base_dir}_{date}.csv")
    }
}
