//! One file's path from raw submission to percent-change table.
//!
//! Stages, in order: duplicate check, setting aside keep variables, overrides,
//! template check, re-concatenation with a second duplicate check, and the
//! percent-change engine. Every stage writes its artifacts under the input
//! file's directory.

use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::duplicates::check_duplicates;
use crate::error::HarmonizeError;
use crate::frame::{file_stem, series_keys_to_frame, write_augmented, write_csv, write_records};
use crate::overrides::check_overrides;
use crate::percent_change::{pc_diff, pc_diff_file_name, PercentChangeOptions};
use crate::reader::RecordReader;
use crate::record::{group_keys, models, Record};
use crate::run_log::{Level, RunLog, Stage, TIMESTAMP_FORMAT};
use crate::template::{check_template, split_keep_variables, Template};

pub const DUPLICATES_DIR: &str = "duplicates";
pub const OVERRIDES_DIR: &str = "overrides";
pub const TEMPLATE_CHECKED_DIR: &str = "template-checked";
pub const PC_DIFF_DIR: &str = "pc-diff";

/// Files written by one run. Optional entries are only written when there is
/// something to write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineArtifacts {
    pub duplicates: Option<PathBuf>,
    pub duplicates_recheck: Option<PathBuf>,
    pub overrides_removed: Option<PathBuf>,
    pub overrides_list: Option<PathBuf>,
    pub template_checked: PathBuf,
    pub template_exceptions: PathBuf,
    pub pc_diff: PathBuf,
    pub log: PathBuf,
}

/// Row counts per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub model: String,
    pub input_records: usize,
    pub duplicates_removed: usize,
    pub duplicates_recheck_removed: usize,
    pub keep_variables: usize,
    pub overrides_removed: usize,
    pub overrides_kept: usize,
    pub template_exceptions: usize,
    pub checked_records: usize,
    pub pc_diff_rows: usize,
    pub interpolated_rows: usize,
    pub soft_failures: usize,
    pub artifacts: PipelineArtifacts,
}

/// `<dir>/<stem><suffix>` beside the input file.
pub fn overrides_path(input: &Path, suffix: &str) -> Result<PathBuf, HarmonizeError> {
    let stem = file_stem(input)?;
    Ok(input_dir(input).join(format!("{stem}{suffix}")))
}

fn input_dir(input: &Path) -> &Path {
    input.parent().unwrap_or_else(|| Path::new("."))
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).round()
}

/// Injected dependencies of a run; cheap to share across worker threads.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    pub template: &'a Template,
    pub config: &'a PipelineConfig,
    pub reader: &'a dyn RecordReader,
}

impl<'a> Pipeline<'a> {
    pub fn new(template: &'a Template, config: &'a PipelineConfig, reader: &'a dyn RecordReader) -> Self {
        Self {
            template,
            config,
            reader,
        }
    }

    /// Run every stage on `input`. The run log is written even when a stage fails.
    pub fn run(&self, input: &Path) -> Result<PipelineSummary, HarmonizeError> {
        let mut log = RunLog::new(input.display().to_string());
        let result = self.run_stages(input, &mut log);

        let label = match &result {
            Ok(summary) => summary.model.clone(),
            Err(err) => {
                log.error(Stage::Read, format!("aborted: {err}"));
                file_stem(input).unwrap_or_else(|_| "unknown".to_string())
            }
        };
        let log_path = input_dir(input).join(PC_DIFF_DIR).join("logs").join(format!(
            "{label}_pc-diff_{}.log",
            log.started().format(TIMESTAMP_FORMAT)
        ));
        log.write_to(&log_path)?;

        let mut summary = result?;
        summary.artifacts.log = log_path;
        Ok(summary)
    }

    fn run_stages(&self, input: &Path, log: &mut RunLog) -> Result<PipelineSummary, HarmonizeError> {
        let dir = input_dir(input);
        let records = self.reader.read(input)?;
        let model = primary_model(&records, input, log)?;
        let total = records.len();
        log.info(Stage::Read, format!("processing {model}: {total} records"));

        let mut summary = PipelineSummary {
            model: model.clone(),
            input_records: total,
            ..PipelineSummary::default()
        };

        let report = check_duplicates(&records, log)?;
        summary.duplicates_removed = report.removed();
        if !report.duplicates.is_empty() {
            let path = dir.join(DUPLICATES_DIR).join(format!("{model}_duplicates.csv"));
            write_records(&report.duplicates, &path)?;
            summary.artifacts.duplicates = Some(path);
        }

        let (clean, keep_variables) = split_keep_variables(report.clean, self.template);
        summary.keep_variables = keep_variables.len();
        log.info(
            Stage::Template,
            format!(
                "set aside {} records of keep variables, {} remain ({}% of the input)",
                keep_variables.len(),
                clean.len(),
                share(clean.len(), total)
            ),
        );

        let overrides_file = overrides_path(input, &self.config.overrides_suffix)?;
        let has_overrides = overrides_file.exists();
        let outcome = check_overrides(&clean, Some(overrides_file.as_path()), log)?;
        summary.overrides_removed = outcome.removed.len();
        summary.overrides_kept = outcome.kept.len();
        if has_overrides {
            let removed_path = dir.join(OVERRIDES_DIR).join(format!("{model}_overrides-removed.csv"));
            write_records(&outcome.removed, &removed_path)?;
            let list_path = dir.join(OVERRIDES_DIR).join(format!("{model}_overrides-list.csv"));
            write_csv(&mut series_keys_to_frame(&group_keys(&outcome.removed))?, &list_path)?;
            summary.artifacts.overrides_removed = Some(removed_path);
            summary.artifacts.overrides_list = Some(list_path);
            log.info(
                Stage::Overrides,
                format!(
                    "overrides checked, {} remain ({}% of the input)",
                    outcome.clean.len(),
                    share(outcome.clean.len(), total)
                ),
            );
        }

        let checked = check_template(&outcome.clean, self.template, log);
        summary.template_exceptions = checked.exceptions.len();

        let mut combined: Vec<Record> = checked.valid;
        combined.extend(outcome.kept);
        combined.extend(keep_variables);
        log.info(Stage::Duplicates, "checking duplicates again");
        let recheck = check_duplicates(&combined, log)?;
        summary.duplicates_recheck_removed = recheck.removed();
        if !recheck.duplicates.is_empty() {
            let path = dir.join(DUPLICATES_DIR).join(format!("{model}_duplicates-recheck.csv"));
            write_records(&recheck.duplicates, &path)?;
            log.warn(
                Stage::Duplicates,
                format!("{} records collide after overrides, saved {}", recheck.duplicates.len(), path.display()),
            );
            summary.artifacts.duplicates_recheck = Some(path);
        }
        let final_records = recheck.clean;
        summary.checked_records = final_records.len();
        log.info(
            Stage::Template,
            format!(
                "template-checked dataset holds {} records ({}% of the input)",
                final_records.len(),
                share(final_records.len(), total)
            ),
        );

        let checked_dir = dir.join(TEMPLATE_CHECKED_DIR);
        let checked_stem = format!("{model}_template-checked");
        summary.artifacts.template_checked = checked_dir.join(format!("{checked_stem}.csv"));
        write_records(&final_records, &summary.artifacts.template_checked)?;
        summary.artifacts.template_exceptions = checked_dir.join(format!("{model}_template-exceptions-list.csv"));
        write_csv(
            &mut series_keys_to_frame(&group_keys(&checked.exceptions))?,
            &summary.artifacts.template_exceptions,
        )?;

        let options = PercentChangeOptions::from(self.config);
        let errors_before = log.count(Level::Error);
        let rows = pc_diff(&final_records, &options, log);
        summary.pc_diff_rows = rows.len();
        summary.interpolated_rows = rows.iter().filter(|r| r.interpolated).count();
        summary.soft_failures = log.count(Level::Error) - errors_before;
        summary.artifacts.pc_diff = dir
            .join(PC_DIFF_DIR)
            .join(pc_diff_file_name(&checked_stem, options.base_year));
        write_augmented(&rows, &summary.artifacts.pc_diff)?;
        log.info(
            Stage::PercentChange,
            format!("done processing {model}, saved {}", summary.artifacts.pc_diff.display()),
        );

        Ok(summary)
    }
}

/// Name of the file's model; a file is expected to hold exactly one.
fn primary_model(records: &[Record], input: &Path, log: &mut RunLog) -> Result<String, HarmonizeError> {
    let names = models(records);
    let Some(first) = names.first() else {
        return Err(HarmonizeError::MalformedInput(format!(
            "{} holds no records",
            input.display()
        )));
    };
    if names.len() > 1 {
        log.warn(
            Stage::Read,
            format!("{} holds several models ({}); naming artifacts after {first}", input.display(), names.join(", ")),
        );
    }
    Ok(first.clone())
}

/// Run the whole pipeline on one raw file.
pub fn run_pipeline(
    input: &Path,
    template: &Template,
    config: &PipelineConfig,
    reader: &dyn RecordReader,
) -> Result<PipelineSummary, HarmonizeError> {
    Pipeline::new(template, config, reader).run(input)
}
