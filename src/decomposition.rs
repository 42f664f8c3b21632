//! Splitting the baseline-to-alternate change into the contribution of one
//! driver, the change of everything but that driver, and their interaction.
//!
//! Driver scenarios are named `<baseline>_<DRIVER>` (baseline plus the driver
//! alone) and `<alternate>_<DRIVER>` (alternate without the driver).

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;

use crate::error::{HarmonizeError, SoftError};
use crate::metrics::percent_change;
use crate::percent_change::PercentChangeOptions;
use crate::record::{normalize_scenario, GroupKey, Record};
use crate::run_log::{RunLog, Stage};
use crate::schema::{decomposition as cols, record};

#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionOptions {
    pub baseline_scenario: String,
    pub alternate_scenario: String,
    /// Divide the individual and total effects by `full - baseline`.
    pub normalized: bool,
}

impl Default for DecompositionOptions {
    fn default() -> Self {
        let pc = PercentChangeOptions::default();
        Self {
            baseline_scenario: pc.baseline_scenario,
            alternate_scenario: pc.alternate_scenario,
            normalized: false,
        }
    }
}

/// Effect of one driver on one (model, variable, item, region, unit, year) cell.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverEffect {
    pub key: GroupKey,
    pub year: i64,
    pub driver: String,
    pub normalized: bool,
    pub baseline: f64,
    pub full: f64,
    pub driver_only: f64,
    pub all_but_driver: f64,
    /// `<alternate>_MITI`, NaN when the cell lacks it.
    pub mitigation: f64,
    pub individual: f64,
    pub total: f64,
    pub interaction: f64,
    pub percent_change_individual: f64,
    pub percent_change_total: f64,
    pub percent_change_interaction: f64,
}

/// Decompose the records of one cell for `driver`.
///
/// All records must share the group key and year of the first one; the cell
/// must report the baseline, the alternate, and both driver scenarios.
pub fn decompose_driver_effect(
    cell: &[Record],
    driver: &str,
    options: &DecompositionOptions,
) -> Result<DriverEffect, HarmonizeError> {
    let first = cell
        .first()
        .ok_or_else(|| HarmonizeError::InvalidGroup("cannot decompose an empty cell".into()))?;
    let key = first.group_key();
    if let Some(other) = cell.iter().find(|r| r.group_key() != key || r.year != first.year) {
        return Err(HarmonizeError::InvalidGroup(format!(
            "cell {key} {} also holds {} {}",
            first.year,
            other.group_key(),
            other.year
        )));
    }
    effect_for(&key, first.year, cell, driver, options)
        .map_err(|err| HarmonizeError::InvalidGroup(format!("{key} {}: {err}", first.year)))
}

fn effect_for(
    key: &GroupKey,
    year: i64,
    cell: &[Record],
    driver: &str,
    options: &DecompositionOptions,
) -> Result<DriverEffect, SoftError> {
    let driver = normalize_scenario(driver);
    let find = |scenario: &str, metric: &'static str| -> Result<f64, SoftError> {
        cell.iter()
            .find(|r| r.scenario == scenario)
            .map(|r| r.value)
            .ok_or_else(|| SoftError::ReferenceNotFound {
                scenario: scenario.to_string(),
                year,
                metric,
            })
    };

    let baseline = find(&options.baseline_scenario, cols::BAU)?;
    let full = find(&options.alternate_scenario, cols::ELM)?;
    let driver_only = find(&format!("{}_{driver}", options.baseline_scenario), cols::BAU_DRIVER)?;
    let all_but_driver = find(&format!("{}_{driver}", options.alternate_scenario), cols::ELM_DRIVER)?;

    let mitigation = find(
        &format!("{}_{}", options.alternate_scenario, cols::MITIGATION_SUFFIX),
        cols::EL2,
    )
    .unwrap_or(f64::NAN);

    let mut individual = driver_only - baseline;
    let mut total = full - all_but_driver;
    if options.normalized {
        let span = full - baseline;
        if span == 0.0 {
            individual = f64::NAN;
            total = f64::NAN;
        } else {
            individual /= span;
            total /= span;
        }
    }
    let interaction = total - individual;

    Ok(DriverEffect {
        key: key.clone(),
        year,
        driver,
        normalized: options.normalized,
        baseline,
        full,
        driver_only,
        all_but_driver,
        mitigation,
        individual,
        total,
        interaction,
        percent_change_individual: percent_change(baseline, individual),
        percent_change_total: percent_change(baseline, total),
        percent_change_interaction: percent_change(baseline, interaction),
    })
}

/// Driver names found in `<baseline>_<DRIVER>` or `<alternate>_<DRIVER>` scenarios, sorted.
/// The mitigation-only alternate is not a driver.
pub fn discover_drivers(records: &[Record], options: &DecompositionOptions) -> Vec<String> {
    let prefixes = [
        format!("{}_", options.baseline_scenario),
        format!("{}_", options.alternate_scenario),
    ];
    records
        .iter()
        .filter_map(|r| {
            prefixes
                .iter()
                .find_map(|p| r.scenario.strip_prefix(p.as_str()))
                .filter(|d| !d.is_empty() && *d != cols::MITIGATION_SUFFIX)
                .map(str::to_string)
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Decompose every cell for every driver. Cells missing one of the four
/// scenarios are logged and skipped.
pub fn decompose_all(
    records: &[Record],
    drivers: &[String],
    options: &DecompositionOptions,
    log: &mut RunLog,
) -> Vec<DriverEffect> {
    let mut cells: BTreeMap<(GroupKey, i64), Vec<Record>> = BTreeMap::new();
    for r in records {
        cells.entry((r.group_key(), r.year)).or_default().push(r.clone());
    }

    let mut effects = Vec::new();
    for ((key, year), cell) in &cells {
        for driver in drivers {
            match effect_for(key, *year, cell, driver, options) {
                Ok(effect) => effects.push(effect),
                Err(err) => log.soft(Stage::Decomposition, format!("{key},{year},{driver}"), &err),
            }
        }
    }
    log.info(
        Stage::Decomposition,
        format!(
            "decomposed {} of {} cells x {} drivers",
            effects.len(),
            cells.len(),
            drivers.len()
        ),
    );
    effects
}

pub fn effects_to_frame(effects: &[DriverEffect]) -> Result<DataFrame, HarmonizeError> {
    let number = |f: fn(&DriverEffect) -> f64| -> Vec<f64> { effects.iter().map(f).collect() };
    let years: Vec<i64> = effects.iter().map(|e| e.year).collect();
    let normalized: Vec<bool> = effects.iter().map(|e| e.normalized).collect();

    Ok(DataFrame::new(vec![
        Column::new(record::MODEL.into(), &text(effects, |e| e.key.model.as_str())),
        Column::new(record::REGION.into(), &text(effects, |e| e.key.region.as_str())),
        Column::new(record::VARIABLE.into(), &text(effects, |e| e.key.variable.as_str())),
        Column::new(record::ITEM.into(), &text(effects, |e| e.key.item.as_str())),
        Column::new(record::UNIT.into(), &text(effects, |e| e.key.unit.as_str())),
        Column::new(record::YEAR.into(), &years),
        Column::new(cols::DRIVER.into(), &text(effects, |e| e.driver.as_str())),
        Column::new(cols::NORMALIZED.into(), &normalized),
        Column::new(cols::BAU.into(), &number(|e| e.baseline)),
        Column::new(cols::ELM.into(), &number(|e| e.full)),
        Column::new(cols::BAU_DRIVER.into(), &number(|e| e.driver_only)),
        Column::new(cols::ELM_DRIVER.into(), &number(|e| e.all_but_driver)),
        Column::new(cols::EL2.into(), &number(|e| e.mitigation)),
        Column::new(cols::INDIVIDUAL.into(), &number(|e| e.individual)),
        Column::new(cols::TOTAL.into(), &number(|e| e.total)),
        Column::new(cols::INTERACTION.into(), &number(|e| e.interaction)),
        Column::new(cols::PERCENT_CHANGE_INDIVIDUAL.into(), &number(|e| e.percent_change_individual)),
        Column::new(cols::PERCENT_CHANGE_TOTAL.into(), &number(|e| e.percent_change_total)),
        Column::new(cols::PERCENT_CHANGE_INTERACTION.into(), &number(|e| e.percent_change_interaction)),
    ])?)
}

fn text<'a>(effects: &'a [DriverEffect], f: fn(&DriverEffect) -> &str) -> Vec<&'a str> {
    effects.iter().map(f).collect()
}
