//! Canonical variable/unit reference table and conformance check.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::HarmonizeError;
use crate::frame::{read_csv_as_strings, require_columns};
use crate::record::Record;
use crate::run_log::{RunLog, Stage};
use crate::schema::template as cols;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateEntry {
    /// Every unit the variable may be reported in.
    pub units: BTreeSet<String>,
    /// Bypass template filtering entirely.
    pub keep: bool,
}

/// Variable -> acceptable units lookup, injected into the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    entries: BTreeMap<String, TemplateEntry>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one (variable, unit) row. A variable may appear on several rows;
    /// it is kept if any of its rows says so.
    pub fn insert(&mut self, variable: impl Into<String>, unit: impl Into<String>, keep: bool) {
        let entry = self.entries.entry(variable.into()).or_default();
        entry.units.insert(unit.into());
        entry.keep |= keep;
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str, bool)>) -> Self {
        let mut template = Self::new();
        for (variable, unit, keep) in rows {
            template.insert(variable, unit, keep);
        }
        template
    }

    /// Load a CSV export of the VariableUnitValueTable sheet.
    ///
    /// Required columns: Variable, Unit. Optional: Keep (1 / true to keep).
    pub fn load(path: &Path) -> Result<Self, HarmonizeError> {
        let df = read_csv_as_strings(path, true, b',')?;
        require_columns(&df, &[cols::VARIABLE, cols::UNIT])?;

        let variables = df.column(cols::VARIABLE)?.str()?;
        let units = df.column(cols::UNIT)?.str()?;
        let keeps = match df.column(cols::KEEP) {
            Ok(column) => Some(column.str()?),
            Err(_) => None,
        };

        let mut template = Self::new();
        for i in 0..df.height() {
            let Some(variable) = variables.get(i).map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let unit = units.get(i).unwrap_or("").trim();
            let keep = keeps
                .and_then(|k| k.get(i))
                .is_some_and(|k| parse_keep_flag(k.trim()));
            template.insert(variable, unit, keep);
        }
        tracing::debug!(path = %path.display(), variables = template.len(), "loaded template");
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, variable: &str) -> Option<&TemplateEntry> {
        self.entries.get(variable)
    }

    pub fn is_keep(&self, variable: &str) -> bool {
        self.get(variable).is_some_and(|e| e.keep)
    }

    pub fn conforms(&self, record: &Record) -> bool {
        self.get(&record.variable)
            .is_some_and(|e| e.units.contains(&record.unit))
    }
}

fn parse_keep_flag(text: &str) -> bool {
    text.eq_ignore_ascii_case("true") || text.parse::<f64>().is_ok_and(|v| v == 1.0)
}

#[derive(Debug, Clone, Default)]
pub struct TemplateOutcome {
    pub valid: Vec<Record>,
    pub exceptions: Vec<Record>,
}

/// Route records with an unknown variable or an unexpected unit to the exceptions.
pub fn check_template(records: &[Record], template: &Template, log: &mut RunLog) -> TemplateOutcome {
    let (valid, exceptions): (Vec<Record>, Vec<Record>) =
        records.iter().cloned().partition(|r| template.conforms(r));

    let unknown = exceptions
        .iter()
        .filter(|r| template.get(&r.variable).is_none())
        .count();
    log.info(
        Stage::Template,
        format!(
            "template exceptions removed: {} ({unknown} unknown variable, {} unexpected unit)",
            exceptions.len(),
            exceptions.len() - unknown
        ),
    );
    TemplateOutcome { valid, exceptions }
}

/// Split off records of variables flagged keep; returns (rest, kept).
pub fn split_keep_variables(records: Vec<Record>, template: &Template) -> (Vec<Record>, Vec<Record>) {
    let (kept, rest): (Vec<Record>, Vec<Record>) =
        records.into_iter().partition(|r| template.is_keep(&r.variable));
    (rest, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn template() -> Template {
        Template::from_rows([
            ("PROD", "1000 t", false),
            ("AREA", "1000 ha", false),
            ("AREA", "ha", false),
            ("XPRP", "USD/t", true),
        ])
    }

    fn rec(variable: &str, unit: &str) -> Record {
        Record::new("X", "BAU", "WLD", variable, "CRP", unit, 2020, 1.0)
    }

    #[test]
    fn unknown_variable_and_wrong_unit_are_exceptions() {
        let records = vec![
            rec("PROD", "1000 t"),
            rec("PROD", "t"),
            rec("YILD", "t/ha"),
            rec("AREA", "ha"),
        ];
        let outcome = check_template(&records, &template(), &mut RunLog::new("t"));
        assert_eq!(outcome.valid, vec![rec("PROD", "1000 t"), rec("AREA", "ha")]);
        assert_eq!(outcome.exceptions, vec![rec("PROD", "t"), rec("YILD", "t/ha")]);
    }

    #[test]
    fn check_is_idempotent_on_its_valid_output() {
        let records = vec![rec("PROD", "1000 t"), rec("PROD", "t"), rec("AREA", "1000 ha")];
        let first = check_template(&records, &template(), &mut RunLog::new("t"));
        let second = check_template(&first.valid, &template(), &mut RunLog::new("t"));
        assert_eq!(second.valid, first.valid);
        assert!(second.exceptions.is_empty());
    }

    #[test]
    fn keep_variables_are_split_off() {
        let (rest, kept) = split_keep_variables(
            vec![rec("PROD", "1000 t"), rec("XPRP", "anything")],
            &template(),
        );
        assert_eq!(rest, vec![rec("PROD", "1000 t")]);
        assert_eq!(kept, vec![rec("XPRP", "anything")]);
    }

    #[test]
    fn loads_table_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VariableUnitValueTable.csv");
        fs::write(
            &path,
            "Variable,Unit,Keep\nPROD,1000 t,0\nAREA,1000 ha,\nXPRP,USD/t,1\n",
        )
        .unwrap();

        let loaded = Template::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.is_keep("XPRP"));
        assert!(!loaded.is_keep("AREA"));
        assert!(loaded.conforms(&rec("AREA", "1000 ha")));
    }
}
