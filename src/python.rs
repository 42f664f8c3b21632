use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::config::PipelineConfig;
use crate::decomposition::{decompose_all, discover_drivers, effects_to_frame, DecompositionOptions};
use crate::duplicates;
use crate::error::HarmonizeError;
use crate::frame::{augmented_to_frame, read_csv_as_strings, records_from_frame, records_to_frame, series_keys_to_frame};
use crate::interpolation;
use crate::merge::update_dataset;
use crate::overrides;
use crate::percent_change::{pc_diff, PercentChangeOptions};
use crate::reader::{read_raw_csv, RawCsvReader};
use crate::record::group_keys;
use crate::run_log::RunLog;
use crate::template::{self, Template};

#[pyclass]
pub struct Harmonizer {
    base_path: PathBuf,
    config: PipelineConfig,
    template: Option<Template>,
    log: RunLog,
}

#[pymethods]
impl Harmonizer {
    #[new]
    #[pyo3(signature = (base_path, config_file=None))]
    fn new(base_path: String, config_file: Option<&str>) -> PyResult<Self> {
        let base_path = PathBuf::from(base_path);
        let config = match config_file {
            Some(name) => PipelineConfig::load(&base_path.join(name))?,
            None => PipelineConfig::default(),
        };
        Ok(Self {
            log: RunLog::new(base_path.display().to_string()),
            base_path,
            config,
            template: None,
        })
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load the VariableUnitValueTable export. Returns the number of variables.
    #[pyo3(signature = (filename="VariableUnitValueTable.csv"))]
    fn load_template(&mut self, filename: &str) -> PyResult<usize> {
        let template = Template::load(&self.base_path.join(filename))?;
        let count = template.len();
        self.template = Some(template);
        Ok(count)
    }

    /// Load any CSV with all columns as strings.
    fn load_csv(&self, filename: &str) -> PyResult<PyDataFrame> {
        let df = read_csv_as_strings(&self.base_path.join(filename), true, b',')?;
        Ok(PyDataFrame(df))
    }

    /// Read a raw submission in the layout of `model` (default: the configured format).
    #[pyo3(signature = (filename, model=None))]
    fn read_raw(&self, filename: &str, model: Option<&str>) -> PyResult<PyDataFrame> {
        let model = model.unwrap_or(self.config.raw_format.as_str());
        let records = read_raw_csv(&self.base_path.join(filename), model)?;
        Ok(PyDataFrame(records_to_frame(&records)?))
    }

    // ── Checks ──────────────────────────────────────────────────────────────

    /// Returns (clean, duplicates).
    fn check_duplicates(&mut self, df: PyDataFrame) -> PyResult<(PyDataFrame, PyDataFrame)> {
        let records = records_from_frame(&df.0)?;
        let report = duplicates::check_duplicates(&records, &mut self.log)?;
        Ok((
            PyDataFrame(records_to_frame(&report.clean)?),
            PyDataFrame(records_to_frame(&report.duplicates)?),
        ))
    }

    /// Returns (clean, removed, kept). Without a file, everything is clean.
    #[pyo3(signature = (df, filename=None))]
    fn check_overrides(
        &mut self,
        df: PyDataFrame,
        filename: Option<&str>,
    ) -> PyResult<(PyDataFrame, PyDataFrame, PyDataFrame)> {
        let records = records_from_frame(&df.0)?;
        let path = filename.map(|f| self.base_path.join(f));
        let outcome = overrides::check_overrides(&records, path.as_deref(), &mut self.log)?;
        Ok((
            PyDataFrame(records_to_frame(&outcome.clean)?),
            PyDataFrame(records_to_frame(&outcome.removed)?),
            PyDataFrame(records_to_frame(&outcome.kept)?),
        ))
    }

    /// Returns (valid, exceptions).
    fn check_template(&mut self, df: PyDataFrame) -> PyResult<(PyDataFrame, PyDataFrame)> {
        let records = records_from_frame(&df.0)?;
        let outcome = template::check_template(&records, loaded(&self.template)?, &mut self.log);
        Ok((
            PyDataFrame(records_to_frame(&outcome.valid)?),
            PyDataFrame(records_to_frame(&outcome.exceptions)?),
        ))
    }

    /// Returns (rest, kept).
    fn split_keep_variables(&self, df: PyDataFrame) -> PyResult<(PyDataFrame, PyDataFrame)> {
        let records = records_from_frame(&df.0)?;
        let (rest, kept) = template::split_keep_variables(records, loaded(&self.template)?);
        Ok((
            PyDataFrame(records_to_frame(&rest)?),
            PyDataFrame(records_to_frame(&kept)?),
        ))
    }

    // ── Calculations ────────────────────────────────────────────────────────

    fn pc_diff(&mut self, df: PyDataFrame) -> PyResult<PyDataFrame> {
        let records = records_from_frame(&df.0)?;
        let rows = pc_diff(&records, &PercentChangeOptions::from(&self.config), &mut self.log);
        Ok(PyDataFrame(augmented_to_frame(&rows)?))
    }

    /// Interpolate one series at `target_years`; returns the merged series.
    #[staticmethod]
    fn interpolate(df: PyDataFrame, target_years: Vec<i64>) -> PyResult<PyDataFrame> {
        let records = records_from_frame(&df.0)?;
        let merged = interpolation::interpolate(&records, &target_years)?;
        Ok(PyDataFrame(records_to_frame(&merged)?))
    }

    #[staticmethod]
    fn update(old: PyDataFrame, new: PyDataFrame) -> PyResult<PyDataFrame> {
        let merged = update_dataset(records_from_frame(&old.0)?, records_from_frame(&new.0)?)?;
        Ok(PyDataFrame(records_to_frame(&merged)?))
    }

    #[staticmethod]
    fn group_keys(df: PyDataFrame) -> PyResult<PyDataFrame> {
        let records = records_from_frame(&df.0)?;
        Ok(PyDataFrame(series_keys_to_frame(&group_keys(&records))?))
    }

    /// Driver decomposition of every cell; drivers are discovered from the
    /// scenario names when not given.
    #[pyo3(signature = (df, drivers=None, normalized=false))]
    fn decompose(
        &mut self,
        df: PyDataFrame,
        drivers: Option<Vec<String>>,
        normalized: bool,
    ) -> PyResult<PyDataFrame> {
        let records = records_from_frame(&df.0)?;
        let options = DecompositionOptions {
            baseline_scenario: self.config.baseline_scenario.clone(),
            alternate_scenario: self.config.alternate_scenario.clone(),
            normalized,
        };
        let drivers = drivers.unwrap_or_else(|| discover_drivers(&records, &options));
        let effects = decompose_all(&records, &drivers, &options, &mut self.log);
        Ok(PyDataFrame(effects_to_frame(&effects)?))
    }

    /// Full pipeline on one raw file; returns the percent-change file path.
    fn run(&self, filename: &str) -> PyResult<String> {
        let reader = RawCsvReader::new(self.config.raw_format.parse()?);
        let summary = crate::pipeline::run_pipeline(
            &self.base_path.join(filename),
            loaded(&self.template)?,
            &self.config,
            &reader,
        )?;
        Ok(summary.artifacts.pc_diff.display().to_string())
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn base_year(&self) -> i64 {
        self.config.base_year
    }

    #[getter]
    fn log_lines(&self) -> Vec<String> {
        self.log.entries().iter().map(|e| e.to_string()).collect()
    }
}

fn loaded(template: &Option<Template>) -> Result<&Template, HarmonizeError> {
    template
        .as_ref()
        .ok_or_else(|| HarmonizeError::Config("template not loaded; call load_template first".into()))
}
