//! Canonical record shape shared by every stage, plus the keys records are
//! grouped and compared by.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarmonizeError;
use crate::schema::record as cols;

/// One row of model output in the canonical 8-column layout.
///
/// The scenario label is always uppercase; every constructor normalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub model: String,
    pub scenario: String,
    pub region: String,
    pub variable: String,
    pub item: String,
    pub unit: String,
    pub year: i64,
    pub value: f64,
}

impl Record {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: impl Into<String>,
        scenario: impl AsRef<str>,
        region: impl Into<String>,
        variable: impl Into<String>,
        item: impl Into<String>,
        unit: impl Into<String>,
        year: i64,
        value: f64,
    ) -> Self {
        Self {
            model: model.into(),
            scenario: normalize_scenario(scenario.as_ref()),
            region: region.into(),
            variable: variable.into(),
            item: item.into(),
            unit: unit.into(),
            year,
            value,
        }
    }

    /// The (model, variable, item, region, unit) partition used for analysis.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            model: self.model.clone(),
            variable: self.variable.clone(),
            item: self.item.clone(),
            region: self.region.clone(),
            unit: self.unit.clone(),
        }
    }

    /// The (model, scenario, region, variable, item, unit) combination of a single series.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            model: self.model.clone(),
            scenario: self.scenario.clone(),
            region: self.region.clone(),
            variable: self.variable.clone(),
            item: self.item.clone(),
            unit: self.unit.clone(),
        }
    }

    /// Series key plus year: identifies one cell, ignoring the value.
    pub fn cell_key(&self) -> CellKey {
        CellKey {
            series: self.series_key(),
            year: self.year,
        }
    }

    /// Cell key plus the value bits; NaN values compare equal to each other.
    pub fn exact_key(&self) -> (CellKey, u64) {
        let bits = if self.value.is_nan() {
            f64::NAN.to_bits()
        } else {
            // -0.0 and 0.0 are the same reported value
            (self.value + 0.0).to_bits()
        };
        (self.cell_key(), bits)
    }

    /// Textual value of one column, as it would appear in a CSV cell.
    pub fn get(&self, field: Field) -> String {
        match field {
            Field::Model => self.model.clone(),
            Field::Scenario => self.scenario.clone(),
            Field::Region => self.region.clone(),
            Field::Variable => self.variable.clone(),
            Field::Item => self.item.clone(),
            Field::Unit => self.unit.clone(),
            Field::Year => self.year.to_string(),
            Field::Value => self.value.to_string(),
        }
    }

    /// Whether the record's `field` equals `label`.
    ///
    /// Scenario labels compare case-insensitively; year and value compare numerically.
    pub fn matches(&self, field: Field, label: &str) -> bool {
        let label = label.trim();
        match field {
            Field::Model => self.model == label,
            Field::Scenario => self.scenario == normalize_scenario(label),
            Field::Region => self.region == label,
            Field::Variable => self.variable == label,
            Field::Item => self.item == label,
            Field::Unit => self.unit == label,
            Field::Year => parse_year(label).is_some_and(|y| y == self.year),
            Field::Value => parse_value(label).is_some_and(|v| v == self.value),
        }
    }

    /// Rewrite one column from a literal.
    pub fn set(&mut self, field: Field, literal: &str) -> Result<(), HarmonizeError> {
        match field {
            Field::Model => self.model = literal.to_string(),
            Field::Scenario => self.scenario = normalize_scenario(literal),
            Field::Region => self.region = literal.to_string(),
            Field::Variable => self.variable = literal.to_string(),
            Field::Item => self.item = literal.to_string(),
            Field::Unit => self.unit = literal.to_string(),
            Field::Year => {
                self.year = parse_year(literal).ok_or_else(|| {
                    HarmonizeError::MalformedInput(format!("'{literal}' is not a year"))
                })?
            }
            Field::Value => {
                self.value = parse_value(literal).ok_or_else(|| {
                    HarmonizeError::MalformedInput(format!("'{literal}' is not a number"))
                })?
            }
        }
        Ok(())
    }
}

/// One of the eight canonical columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Model,
    Scenario,
    Region,
    Variable,
    Item,
    Unit,
    Year,
    Value,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => cols::MODEL,
            Self::Scenario => cols::SCENARIO,
            Self::Region => cols::REGION,
            Self::Variable => cols::VARIABLE,
            Self::Item => cols::ITEM,
            Self::Unit => cols::UNIT,
            Self::Year => cols::YEAR,
            Self::Value => cols::VALUE,
        }
    }
}

impl FromStr for Field {
    type Err = HarmonizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            cols::MODEL => Ok(Self::Model),
            cols::SCENARIO => Ok(Self::Scenario),
            cols::REGION => Ok(Self::Region),
            cols::VARIABLE => Ok(Self::Variable),
            cols::ITEM => Ok(Self::Item),
            cols::UNIT => Ok(Self::Unit),
            cols::YEAR => Ok(Self::Year),
            cols::VALUE => Ok(Self::Value),
            other => Err(HarmonizeError::MissingColumn(other.to_string())),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub model: String,
    pub variable: String,
    pub item: String,
    pub region: String,
    pub unit: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.model, self.variable, self.item, self.region, self.unit
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub model: String,
    pub scenario: String,
    pub region: String,
    pub variable: String,
    pub item: String,
    pub unit: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {})",
            self.model, self.scenario, self.region, self.variable, self.item, self.unit
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub series: SeriesKey,
    pub year: i64,
}

/// Unique (model, scenario, region, variable, item, unit) combinations, sorted.
pub fn group_keys(records: &[Record]) -> Vec<SeriesKey> {
    records
        .iter()
        .map(Record::series_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct model names in first-seen order.
pub fn models(records: &[Record]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.model.as_str()))
        .map(|r| r.model.clone())
        .collect()
}

pub fn normalize_scenario(label: &str) -> String {
    label.trim().to_uppercase()
}

/// Parse a year cell. Accepts integral floats such as "2020.0".
pub fn parse_year(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(year) = text.parse::<i64>() {
        return Some(year);
    }
    let as_float = text.parse::<f64>().ok()?;
    (as_float.is_finite() && as_float.fract() == 0.0).then_some(as_float as i64)
}

/// Parse a value cell. Empty and NA-like cells read as NaN.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    match text {
        "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "NULL" | "-" => Some(f64::NAN),
        _ => text.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(scenario: &str, year: i64, value: f64) -> Record {
        Record::new("X", scenario, "WLD", "PROD", "CRP", "1000 t", year, value)
    }

    #[test]
    fn scenario_is_uppercased_on_construction() {
        assert_eq!(rec("elm_diet", 2020, 1.0).scenario, "ELM_DIET");
        assert_eq!(rec(" ELM_Diet ", 2020, 1.0).scenario, "ELM_DIET");
    }

    #[test]
    fn exact_key_treats_nan_as_equal() {
        let a = rec("BAU", 2020, f64::NAN);
        let b = rec("BAU", 2020, f64::NAN);
        assert_eq!(a.exact_key(), b.exact_key());
        assert_ne!(a.exact_key(), rec("BAU", 2020, 1.0).exact_key());
    }

    #[test]
    fn matches_compares_numeric_columns_numerically() {
        let r = rec("BAU", 2020, 1.5);
        assert!(r.matches(Field::Year, "2020"));
        assert!(r.matches(Field::Year, "2020.0"));
        assert!(r.matches(Field::Value, "1.50"));
        assert!(r.matches(Field::Scenario, "bau"));
        assert!(!r.matches(Field::Region, "wld"));
    }

    #[test]
    fn set_rejects_non_numeric_year() {
        let mut r = rec("BAU", 2020, 1.0);
        assert!(r.set(Field::Year, "soon").is_err());
        r.set(Field::Unit, "t").unwrap();
        assert_eq!(r.unit, "t");
    }

    #[test]
    fn field_parses_case_insensitively() {
        assert_eq!("Variable".parse::<Field>().unwrap(), Field::Variable);
        assert!("colour".parse::<Field>().is_err());
    }

    #[test]
    fn group_keys_are_unique_and_sorted() {
        let records = vec![rec("ELM", 2020, 1.0), rec("BAU", 2020, 1.0), rec("BAU", 2030, 2.0)];
        let keys = group_keys(&records);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].scenario, "BAU");
    }

    #[test]
    fn parse_helpers_handle_real_world_cells() {
        assert_eq!(parse_year(" 2030 "), Some(2030));
        assert_eq!(parse_year("2030.5"), None);
        assert!(parse_value("NA").unwrap().is_nan());
        assert_eq!(parse_value("1e3"), Some(1000.0));
        assert_eq!(parse_value("abc"), None);
    }
}
