//! Percent and absolute differences of every (scenario, year) cell against the
//! baseline at the reference year, the baseline at the same year, and the
//! alternate scenario at the same year.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::config::{PipelineConfig, DEFAULT_ALTERNATE_SCENARIO, DEFAULT_BASELINE_SCENARIO, DEFAULT_BASE_YEAR};
use crate::error::{HarmonizeError, SoftError};
use crate::frame::{file_stem, read_canonical_csv, write_augmented};
use crate::interpolation::interpolate_years;
use crate::metrics::percent_change;
use crate::record::{normalize_scenario, GroupKey, Record};
use crate::run_log::{Level, RunLog, Stage};
use crate::schema::pc_diff as cols;

/// Derived fields attached to a record; `None` means the reference was missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub percent_change_bau_ref_year: Option<f64>,
    pub diff_bau_ref_year: Option<f64>,
    pub reference_year_used: Option<i64>,
    pub percent_change_bau: Option<f64>,
    pub diff_bau: Option<f64>,
    pub percent_change_elm: Option<f64>,
    pub diff_elm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedRecord {
    pub record: Record,
    pub metrics: Metrics,
    /// Synthesized at the base year rather than reported.
    pub interpolated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentChangeOptions {
    pub base_year: i64,
    pub baseline_scenario: String,
    pub alternate_scenario: String,
    pub interpolate_base_year: bool,
}

impl Default for PercentChangeOptions {
    fn default() -> Self {
        Self {
            base_year: DEFAULT_BASE_YEAR,
            baseline_scenario: DEFAULT_BASELINE_SCENARIO.to_string(),
            alternate_scenario: DEFAULT_ALTERNATE_SCENARIO.to_string(),
            interpolate_base_year: true,
        }
    }
}

impl From<&PipelineConfig> for PercentChangeOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            base_year: config.base_year,
            baseline_scenario: normalize_scenario(&config.baseline_scenario),
            alternate_scenario: normalize_scenario(&config.alternate_scenario),
            interpolate_base_year: config.interpolate_base_year,
        }
    }
}

/// Percent change and absolute difference of one value against one reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub percent_change: f64,
    pub diff: f64,
}

impl Comparison {
    pub fn new(reference: f64, value: f64) -> Self {
        Self {
            percent_change: percent_change(reference, value),
            diff: value - reference,
        }
    }
}

/// Run the engine over every group of `records`.
///
/// Groups are emitted in key order; within a group, reported rows keep their
/// input order and synthesized base-year rows follow them.
pub fn pc_diff(records: &[Record], options: &PercentChangeOptions, log: &mut RunLog) -> Vec<AugmentedRecord> {
    let mut groups: BTreeMap<GroupKey, Vec<Record>> = BTreeMap::new();
    for r in records {
        groups.entry(r.group_key()).or_default().push(r.clone());
    }

    let failures_before = log.count(Level::Error);
    let mut out = Vec::with_capacity(records.len());
    for (key, rows) in &groups {
        out.extend(pc_diff_group(key, rows, options, log));
    }

    let interpolated = out.iter().filter(|r| r.interpolated).count();
    log.info(
        Stage::PercentChange,
        format!(
            "computed {} rows over {} groups ({} interpolated at {}, {} soft failures)",
            out.len(),
            groups.len(),
            interpolated,
            options.base_year,
            log.count(Level::Error) - failures_before
        ),
    );
    out
}

/// Engine for one (model, variable, item, region, unit) group.
///
/// Every failure is absorbed per cell; the group is always fully emitted.
pub fn pc_diff_group(
    key: &GroupKey,
    rows: &[Record],
    options: &PercentChangeOptions,
    log: &mut RunLog,
) -> Vec<AugmentedRecord> {
    let mut cells: Vec<(Record, bool)> = rows.iter().cloned().map(|r| (r, false)).collect();
    // Only a group with no row at all at the base year is interpolated
    let base_year_reported = rows.iter().any(|r| r.year == options.base_year);
    if options.interpolate_base_year && !base_year_reported {
        let synthesized = synthesize_base_year(key, rows, options.base_year, log);
        cells.extend(synthesized.into_iter().map(|r| (r, true)));
    }

    let mut lookup: HashMap<(&str, i64), f64> = HashMap::with_capacity(cells.len());
    for (r, _) in &cells {
        lookup.entry((r.scenario.as_str(), r.year)).or_insert(r.value);
    }
    let reference = resolve_reference(&cells, options);

    let mut out = Vec::with_capacity(cells.len());
    for (record, interpolated) in &cells {
        let context = format!("{key},{},{}", record.scenario, record.year);
        let mut metrics = Metrics::default();

        match &reference {
            Ok((year, value)) => {
                let c = Comparison::new(*value, record.value);
                metrics.percent_change_bau_ref_year = Some(c.percent_change);
                metrics.diff_bau_ref_year = Some(c.diff);
                metrics.reference_year_used = Some(*year);
            }
            Err(err) => log.soft(Stage::PercentChange, &context, err),
        }

        match same_year(&lookup, &options.baseline_scenario, record.year, cols::PERCENT_CHANGE_BAU) {
            Ok(reference) => {
                let c = Comparison::new(reference, record.value);
                metrics.percent_change_bau = Some(c.percent_change);
                metrics.diff_bau = Some(c.diff);
            }
            Err(err) => log.soft(Stage::PercentChange, &context, &err),
        }

        match same_year(&lookup, &options.alternate_scenario, record.year, cols::PERCENT_CHANGE_ELM) {
            Ok(reference) => {
                let c = Comparison::new(reference, record.value);
                metrics.percent_change_elm = Some(c.percent_change);
                metrics.diff_elm = Some(c.diff);
            }
            Err(err) => log.soft(Stage::PercentChange, &context, &err),
        }

        out.push(AugmentedRecord {
            record: record.clone(),
            metrics,
            interpolated: *interpolated,
        });
    }
    out
}

/// `<stem>_pc-diff_interp-<base_year>.csv`
pub fn pc_diff_file_name(stem: &str, base_year: i64) -> String {
    format!("{stem}_pc-diff_interp-{base_year}.csv")
}

/// Run the engine over a canonical CSV file and write the augmented rows into
/// `output_dir`. Returns the written path.
pub fn pc_diff_file(
    input: &Path,
    output_dir: &Path,
    options: &PercentChangeOptions,
    log: &mut RunLog,
) -> Result<PathBuf, HarmonizeError> {
    let stem = file_stem(input)?;
    let records = read_canonical_csv(input)?;
    log.info(
        Stage::PercentChange,
        format!("processing {stem}: {} records", records.len()),
    );
    let rows = pc_diff(&records, options, log);
    let output = output_dir.join(pc_diff_file_name(&stem, options.base_year));
    write_augmented(&rows, &output)?;
    log.info(Stage::PercentChange, format!("saved {}", output.display()));
    Ok(output)
}

/// Interpolate the base year for every scenario of a group that lacks it entirely.
fn synthesize_base_year(key: &GroupKey, rows: &[Record], base_year: i64, log: &mut RunLog) -> Vec<Record> {
    let mut by_scenario: Vec<(&str, Vec<Record>)> = Vec::new();
    for r in rows {
        match by_scenario.iter_mut().find(|(s, _)| *s == r.scenario) {
            Some((_, series)) => series.push(r.clone()),
            None => by_scenario.push((r.scenario.as_str(), vec![r.clone()])),
        }
    }

    let mut synthesized = Vec::new();
    for (scenario, series) in by_scenario {
        if series.iter().any(|r| r.year == base_year) {
            continue;
        }
        match interpolate_years(&series, &[base_year]) {
            Ok(points) => {
                log.info(
                    Stage::Interpolation,
                    format!("{key},{scenario}: interpolated {base_year}"),
                );
                synthesized.extend(points);
            }
            Err(err) => log.soft(
                Stage::Interpolation,
                key,
                &SoftError::Interpolation {
                    scenario: scenario.to_string(),
                    year: base_year,
                    reason: err.to_string(),
                },
            ),
        }
    }
    synthesized
}

/// Baseline value at the base year, or at the baseline year nearest to it
/// (earlier year on a tie).
fn resolve_reference(cells: &[(Record, bool)], options: &PercentChangeOptions) -> Result<(i64, f64), SoftError> {
    cells
        .iter()
        .map(|(r, _)| r)
        .filter(|r| r.scenario == options.baseline_scenario)
        .min_by_key(|r| ((r.year - options.base_year).abs(), r.year))
        .map(|r| (r.year, r.value))
        .ok_or_else(|| SoftError::ReferenceNotFound {
            scenario: options.baseline_scenario.clone(),
            year: options.base_year,
            metric: cols::PERCENT_CHANGE_BAU_REF_YEAR,
        })
}

fn same_year<'a>(
    lookup: &HashMap<(&'a str, i64), f64>,
    scenario: &'a str,
    year: i64,
    metric: &'static str,
) -> Result<f64, SoftError> {
    lookup
        .get(&(scenario, year))
        .copied()
        .ok_or_else(|| SoftError::ReferenceNotFound {
            scenario: scenario.to_string(),
            year,
            metric,
        })
}
