//! DataFrame interchange: CSV reading and writing, and conversion between
//! frames and typed records.

use std::fs::{self, File};
use std::path::Path;

use polars::prelude::*;

use crate::error::HarmonizeError;
use crate::percent_change::{AugmentedRecord, Metrics};
use crate::record::{parse_value, parse_year, Record, SeriesKey};
use crate::schema::{pc_diff, record};

const WHITESPACE: &str = " \t\r\n";

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names.
pub fn read_csv_as_strings(
    path: &Path,
    has_header: bool,
    separator: u8,
) -> Result<DataFrame, HarmonizeError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(has_header)
        .with_infer_schema_length(Some(0)) // all columns as String
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;

    Ok(df)
}

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), HarmonizeError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(HarmonizeError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

/// Keep only the canonical columns, in canonical order, with surrounding
/// whitespace stripped from every cell.
pub fn select_canonical(df: DataFrame) -> Result<DataFrame, HarmonizeError> {
    require_columns(&df, &record::ALL)?;
    let exprs: Vec<Expr> = record::ALL
        .iter()
        .map(|name| {
            col(*name)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(WHITESPACE))
        })
        .collect();
    Ok(df.lazy().select(exprs).collect()?)
}

/// Convert a frame holding the canonical columns into records.
///
/// Columns may be strings or already typed. Years must be integral; empty or
/// NA-like values read as NaN.
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<Record>, HarmonizeError> {
    require_columns(df, &record::ALL)?;
    let text: Vec<StringChunked> = record::ALL
        .iter()
        .map(|name| string_column(df, name))
        .collect::<Result<_, _>>()?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let cell = |c: usize| text[c].get(i).unwrap_or("").trim();

        let year = parse_year(cell(6)).ok_or_else(|| {
            HarmonizeError::MalformedInput(format!("row {i}: year '{}' is not an integer", cell(6)))
        })?;
        let value = parse_value(cell(7)).ok_or_else(|| {
            HarmonizeError::MalformedInput(format!("row {i}: value '{}' is not a number", cell(7)))
        })?;

        records.push(Record::new(
            cell(0),
            cell(1),
            cell(2),
            cell(3),
            cell(4),
            cell(5),
            year,
            value,
        ));
    }
    Ok(records)
}

pub fn records_to_frame(records: &[Record]) -> Result<DataFrame, HarmonizeError> {
    Ok(DataFrame::new(canonical_columns(records.iter()))?)
}

pub fn augmented_to_frame(rows: &[AugmentedRecord]) -> Result<DataFrame, HarmonizeError> {
    let mut columns = canonical_columns(rows.iter().map(|r| &r.record));

    let metric = |f: fn(&Metrics) -> Option<f64>| -> Vec<Option<f64>> {
        rows.iter().map(|r| f(&r.metrics)).collect()
    };
    columns.push(Column::new(
        pc_diff::PERCENT_CHANGE_BAU_REF_YEAR.into(),
        &metric(|m| m.percent_change_bau_ref_year),
    ));
    columns.push(Column::new(
        pc_diff::DIFF_BAU_REF_YEAR.into(),
        &metric(|m| m.diff_bau_ref_year),
    ));
    let ref_years: Vec<Option<i64>> = rows.iter().map(|r| r.metrics.reference_year_used).collect();
    columns.push(Column::new(pc_diff::REFERENCE_YEAR_USED.into(), &ref_years));
    columns.push(Column::new(
        pc_diff::PERCENT_CHANGE_BAU.into(),
        &metric(|m| m.percent_change_bau),
    ));
    columns.push(Column::new(pc_diff::DIFF_BAU.into(), &metric(|m| m.diff_bau)));
    columns.push(Column::new(
        pc_diff::PERCENT_CHANGE_ELM.into(),
        &metric(|m| m.percent_change_elm),
    ));
    columns.push(Column::new(pc_diff::DIFF_ELM.into(), &metric(|m| m.diff_elm)));
    let interpolated: Vec<bool> = rows.iter().map(|r| r.interpolated).collect();
    columns.push(Column::new(pc_diff::INTERPOLATED.into(), &interpolated));

    Ok(DataFrame::new(columns)?)
}

/// Read back a frame produced by [`augmented_to_frame`].
///
/// Metric columns that are absent read as undefined.
pub fn augmented_from_frame(df: &DataFrame) -> Result<Vec<AugmentedRecord>, HarmonizeError> {
    let records = records_from_frame(df)?;

    let optional = |name: &str| -> Result<Option<StringChunked>, HarmonizeError> {
        if df.column(name).is_ok() {
            Ok(Some(string_column(df, name)?))
        } else {
            Ok(None)
        }
    };
    let pc_ref = optional(pc_diff::PERCENT_CHANGE_BAU_REF_YEAR)?;
    let diff_ref = optional(pc_diff::DIFF_BAU_REF_YEAR)?;
    let ref_year = optional(pc_diff::REFERENCE_YEAR_USED)?;
    let pc_bau = optional(pc_diff::PERCENT_CHANGE_BAU)?;
    let diff_bau = optional(pc_diff::DIFF_BAU)?;
    let pc_elm = optional(pc_diff::PERCENT_CHANGE_ELM)?;
    let diff_elm = optional(pc_diff::DIFF_ELM)?;
    let interpolated = optional(pc_diff::INTERPOLATED)?;

    let float_at = |ca: &Option<StringChunked>, i: usize| -> Option<f64> {
        let text = ca.as_ref()?.get(i)?.trim();
        if text.is_empty() {
            return None;
        }
        parse_value(text)
    };

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, record)| AugmentedRecord {
            record,
            metrics: Metrics {
                percent_change_bau_ref_year: float_at(&pc_ref, i),
                diff_bau_ref_year: float_at(&diff_ref, i),
                reference_year_used: ref_year
                    .as_ref()
                    .and_then(|ca| ca.get(i))
                    .and_then(parse_year),
                percent_change_bau: float_at(&pc_bau, i),
                diff_bau: float_at(&diff_bau, i),
                percent_change_elm: float_at(&pc_elm, i),
                diff_elm: float_at(&diff_elm, i),
            },
            interpolated: interpolated
                .as_ref()
                .and_then(|ca| ca.get(i))
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("true")),
        })
        .collect())
}

/// Unique group keys as a frame, for the override / exception list artifacts.
pub fn series_keys_to_frame(keys: &[SeriesKey]) -> Result<DataFrame, HarmonizeError> {
    let [model, scenario, region, variable, item, unit] = record::GROUP_KEY_COLUMNS;
    Ok(DataFrame::new(vec![
        Column::new(model.into(), &pick(keys, |k| k.model.as_str())),
        Column::new(scenario.into(), &pick(keys, |k| k.scenario.as_str())),
        Column::new(region.into(), &pick(keys, |k| k.region.as_str())),
        Column::new(variable.into(), &pick(keys, |k| k.variable.as_str())),
        Column::new(item.into(), &pick(keys, |k| k.item.as_str())),
        Column::new(unit.into(), &pick(keys, |k| k.unit.as_str())),
    ])?)
}

fn pick<'a>(keys: &'a [SeriesKey], f: fn(&SeriesKey) -> &str) -> Vec<&'a str> {
    keys.iter().map(f).collect()
}

/// Write a frame as CSV with a header, creating parent directories.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), HarmonizeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn write_records(records: &[Record], path: &Path) -> Result<(), HarmonizeError> {
    let mut df = records_to_frame(records)?;
    write_csv(&mut df, path)
}

pub fn write_augmented(rows: &[AugmentedRecord], path: &Path) -> Result<(), HarmonizeError> {
    let mut df = augmented_to_frame(rows)?;
    write_csv(&mut df, path)
}

/// Read a comma-separated file with a header holding at least the canonical columns.
pub fn read_canonical_csv(path: &Path) -> Result<Vec<Record>, HarmonizeError> {
    let df = read_csv_as_strings(path, true, b',')?;
    records_from_frame(&select_canonical(df)?)
}

/// File name without its extension, as used to name derived artifacts.
pub fn file_stem(path: &Path) -> Result<String, HarmonizeError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            HarmonizeError::MalformedInput(format!("{} has no usable file name", path.display()))
        })
}

fn string_column(df: &DataFrame, name: &str) -> Result<StringChunked, HarmonizeError> {
    let column = df
        .column(name)
        .map_err(|_| HarmonizeError::MissingColumn(name.to_string()))?
        .cast(&DataType::String)?;
    Ok(column.str()?.clone())
}

pub(crate) fn canonical_columns<'a>(records: impl Iterator<Item = &'a Record> + Clone) -> Vec<Column> {
    let text = |f: fn(&Record) -> &str| -> Vec<&'a str> { records.clone().map(f).collect() };
    let years: Vec<i64> = records.clone().map(|r| r.year).collect();
    let values: Vec<f64> = records.clone().map(|r| r.value).collect();
    vec![
        Column::new(record::MODEL.into(), &text(|r| r.model.as_str())),
        Column::new(record::SCENARIO.into(), &text(|r| r.scenario.as_str())),
        Column::new(record::REGION.into(), &text(|r| r.region.as_str())),
        Column::new(record::VARIABLE.into(), &text(|r| r.variable.as_str())),
        Column::new(record::ITEM.into(), &text(|r| r.item.as_str())),
        Column::new(record::UNIT.into(), &text(|r| r.unit.as_str())),
        Column::new(record::YEAR.into(), &years),
        Column::new(record::VALUE.into(), &values),
    ]
}
