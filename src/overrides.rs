//! Analyst-maintained exception list: force-remove, force-keep, or correct records.

use std::path::Path;

use crate::error::HarmonizeError;
use crate::frame::read_csv_as_strings;
use crate::record::{Field, Record};
use crate::run_log::{RunLog, Stage};
use crate::schema::overrides as cols;

/// What a directive does to the records it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideAction {
    /// Drop from the clean set (status `FALSE`).
    Remove,
    /// Preserve and exempt from template filtering (status `TRUE`).
    Keep,
    /// Rewrite the matched column to this literal.
    ReplaceWith(String),
}

impl OverrideAction {
    /// Map the textual status column. Only `TRUE` / `FALSE` are flags; any other
    /// text is a replacement literal.
    pub fn from_status(status: &str) -> Self {
        let status = status.trim();
        if status.eq_ignore_ascii_case("false") {
            Self::Remove
        } else if status.eq_ignore_ascii_case("true") {
            Self::Keep
        } else {
            Self::ReplaceWith(status.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideDirective {
    pub label: String,
    /// Target column name, lower-cased.
    pub column: String,
    pub action: OverrideAction,
}

impl OverrideDirective {
    pub fn new(label: impl Into<String>, column: &str, action: OverrideAction) -> Self {
        Self {
            label: label.into(),
            column: column.trim().to_lowercase(),
            action,
        }
    }
}

/// Three disjoint partitions of the input.
#[derive(Debug, Clone, Default)]
pub struct OverrideOutcome {
    pub clean: Vec<Record>,
    pub removed: Vec<Record>,
    pub kept: Vec<Record>,
}

/// Read a headerless `(label, column, status)` override file.
pub fn load_overrides(path: &Path) -> Result<Vec<OverrideDirective>, HarmonizeError> {
    let mut df = read_csv_as_strings(path, false, b',')?;
    if df.width() != cols::ALL.len() {
        return Err(HarmonizeError::MalformedInput(format!(
            "{}: override files have {} columns (label, column, status), found {}",
            path.display(),
            cols::ALL.len(),
            df.width()
        )));
    }
    df.set_column_names(cols::ALL)?;

    let labels = df.column(cols::LABEL)?.str()?;
    let columns = df.column(cols::COLUMN)?.str()?;
    let statuses = df.column(cols::STATUS)?.str()?;

    let mut directives = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(label), Some(column), Some(status)) =
            (labels.get(i), columns.get(i), statuses.get(i))
        else {
            tracing::warn!(path = %path.display(), row = i, "skipping incomplete override row");
            continue;
        };
        directives.push(OverrideDirective::new(
            label.trim(),
            column,
            OverrideAction::from_status(status),
        ));
    }
    Ok(directives)
}

/// Apply directives strictly in listed order.
///
/// A replacement rewrites the working copy immediately, so later directives
/// match against the rewritten value. Remove and keep capture their matches at
/// the point they are processed. A record both removed and kept is removed.
pub fn apply_overrides(
    records: &[Record],
    directives: &[OverrideDirective],
    log: &mut RunLog,
) -> OverrideOutcome {
    let mut working = records.to_vec();
    let mut removed = vec![false; working.len()];
    let mut kept = vec![false; working.len()];

    for directive in directives {
        let field = match directive.column.parse::<Field>() {
            Ok(field) => field,
            Err(_) => {
                log.warn(
                    Stage::Overrides,
                    format!(
                        "skipping directive for '{}': unknown column '{}'",
                        directive.label, directive.column
                    ),
                );
                continue;
            }
        };
        let matching: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(field, &directive.label))
            .map(|(i, _)| i)
            .collect();

        match &directive.action {
            OverrideAction::Remove => matching.iter().for_each(|&i| removed[i] = true),
            OverrideAction::Keep => matching.iter().for_each(|&i| kept[i] = true),
            OverrideAction::ReplaceWith(literal) => {
                let mut replaced = 0;
                let mut failure = None;
                for &i in &matching {
                    match working[i].set(field, literal) {
                        Ok(()) => replaced += 1,
                        Err(err) => {
                            failure.get_or_insert(err);
                        }
                    }
                }
                if let Some(err) = failure {
                    log.warn(
                        Stage::Overrides,
                        format!(
                            "skipped replacement of {field}='{}' in {} records: {err}",
                            directive.label,
                            matching.len() - replaced
                        ),
                    );
                }
                if replaced > 0 {
                    log.info(
                        Stage::Overrides,
                        format!(
                            "replaced {field}='{}' with '{literal}' in {replaced} records",
                            directive.label
                        ),
                    );
                }
            }
        }
    }

    let mut outcome = OverrideOutcome::default();
    for (i, record) in working.into_iter().enumerate() {
        if removed[i] {
            outcome.removed.push(record);
        } else if kept[i] {
            outcome.kept.push(record);
        } else {
            outcome.clean.push(record);
        }
    }

    log.info(
        Stage::Overrides,
        format!("overrides removed: {}", outcome.removed.len()),
    );
    log.info(
        Stage::Overrides,
        format!("overrides kept: {}", outcome.kept.len()),
    );
    outcome
}

/// Apply the override file at `path`, or pass everything through when there is none.
pub fn check_overrides(
    records: &[Record],
    path: Option<&Path>,
    log: &mut RunLog,
) -> Result<OverrideOutcome, HarmonizeError> {
    match path {
        Some(path) if path.exists() => {
            let directives = load_overrides(path)?;
            log.info(
                Stage::Overrides,
                format!("loaded {} directives from {}", directives.len(), path.display()),
            );
            Ok(apply_overrides(records, &directives, log))
        }
        _ => {
            log.info(Stage::Overrides, "no overrides file found");
            Ok(OverrideOutcome {
                clean: records.to_vec(),
                ..OverrideOutcome::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn rec(region: &str, variable: &str, unit: &str) -> Record {
        Record::new("X", "BAU", region, variable, "CRP", unit, 2020, 1.0)
    }

    #[test]
    fn status_text_maps_to_actions() {
        assert_eq!(OverrideAction::from_status("FALSE"), OverrideAction::Remove);
        assert_eq!(OverrideAction::from_status("True"), OverrideAction::Keep);
        assert_eq!(
            OverrideAction::from_status("1000 ha"),
            OverrideAction::ReplaceWith("1000 ha".into())
        );
    }

    #[test]
    fn remove_wins_over_keep_in_either_order() {
        let records = vec![rec("WLD", "PROD", "t"), rec("EUR", "PROD", "t")];
        for order in [
            [OverrideAction::Remove, OverrideAction::Keep],
            [OverrideAction::Keep, OverrideAction::Remove],
        ] {
            let directives: Vec<_> = order
                .into_iter()
                .map(|a| OverrideDirective::new("WLD", "Region", a))
                .collect();
            let outcome = apply_overrides(&records, &directives, &mut RunLog::new("t"));
            assert_eq!(outcome.removed, vec![rec("WLD", "PROD", "t")]);
            assert!(outcome.kept.is_empty());
            assert_eq!(outcome.clean, vec![rec("EUR", "PROD", "t")]);
        }
    }

    #[test]
    fn replacement_is_visible_to_later_directives() {
        let records = vec![rec("WLD", "AREA", "ha"), rec("WLD", "PROD", "t")];
        let directives = vec![
            OverrideDirective::new("ha", "unit", OverrideAction::ReplaceWith("1000 ha".into())),
            OverrideDirective::new("1000 ha", "unit", OverrideAction::Keep),
        ];
        let outcome = apply_overrides(&records, &directives, &mut RunLog::new("t"));
        assert_eq!(outcome.kept, vec![rec("WLD", "AREA", "1000 ha")]);
        assert_eq!(outcome.clean, vec![rec("WLD", "PROD", "t")]);
    }

    #[test]
    fn matches_captured_before_a_later_replacement_stay_captured() {
        let records = vec![rec("WLD", "AREA", "ha")];
        let directives = vec![
            OverrideDirective::new("ha", "unit", OverrideAction::Remove),
            OverrideDirective::new("ha", "unit", OverrideAction::ReplaceWith("1000 ha".into())),
        ];
        let outcome = apply_overrides(&records, &directives, &mut RunLog::new("t"));
        assert_eq!(outcome.removed, vec![rec("WLD", "AREA", "1000 ha")]);
    }

    #[test]
    fn literal_true_in_data_is_not_a_flag_match() {
        let records = vec![rec("true", "PROD", "t")];
        let directives = vec![OverrideDirective::new("true", "region", OverrideAction::Remove)];
        let outcome = apply_overrides(&records, &directives, &mut RunLog::new("t"));
        assert_eq!(outcome.removed.len(), 1);
    }

    #[test]
    fn unknown_column_and_bad_literal_are_skipped() {
        let records = vec![rec("WLD", "PROD", "t")];
        let directives = vec![
            OverrideDirective::new("WLD", "country", OverrideAction::Remove),
            OverrideDirective::new("2020", "year", OverrideAction::ReplaceWith("soon".into())),
        ];
        let mut log = RunLog::new("t");
        let outcome = apply_overrides(&records, &directives, &mut log);
        assert_eq!(outcome.clean, records);
        assert_eq!(log.count(crate::run_log::Level::Warn), 2);
    }

    #[test]
    fn failed_replacement_warns_once_and_later_directives_still_run() {
        let records = vec![rec("WLD", "PROD", "t"), rec("EUR", "PROD", "t")];
        let directives = vec![
            OverrideDirective::new("2020", "year", OverrideAction::ReplaceWith("soon".into())),
            OverrideDirective::new("EUR", "region", OverrideAction::Remove),
        ];
        let mut log = RunLog::new("t");
        let outcome = apply_overrides(&records, &directives, &mut log);
        assert_eq!(log.count(crate::run_log::Level::Warn), 1);
        assert_eq!(outcome.clean, vec![rec("WLD", "PROD", "t")]);
        assert_eq!(outcome.removed, vec![rec("EUR", "PROD", "t")]);
    }

    #[test]
    fn absent_file_is_a_passthrough() {
        let records = vec![rec("WLD", "PROD", "t")];
        let outcome = check_overrides(
            &records,
            Some(Path::new("/nonexistent/X_OVERRIDES_fix.csv")),
            &mut RunLog::new("t"),
        )
        .unwrap();
        assert_eq!(outcome.clean, records);
        assert!(outcome.removed.is_empty());
        assert!(outcome.kept.is_empty());
    }

    #[test]
    fn loads_headerless_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X_OVERRIDES_fix.csv");
        fs::write(&path, "WLD,Region,FALSE\nPROD,variable,TRUE\nha,unit,1000 ha\n").unwrap();

        let directives = load_overrides(&path).unwrap();
        assert_eq!(directives.len(), 3);
        assert_eq!(directives[0].column, "region");
        assert_eq!(directives[0].action, OverrideAction::Remove);
        assert_eq!(directives[1].action, OverrideAction::Keep);
        assert_eq!(
            directives[2].action,
            OverrideAction::ReplaceWith("1000 ha".into())
        );
    }
}
