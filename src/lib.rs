pub mod aggregation;
pub mod batch;
pub mod config;
pub mod decomposition;
pub mod duplicates;
pub mod emissions;
pub mod error;
pub mod frame;
pub mod interpolation;
pub mod land;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod overrides;
pub mod percent_change;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod run_log;
pub mod schema;
pub mod template;

#[cfg(feature = "python")]
mod python;

pub use config::{DomainConfig, PipelineConfig};
pub use error::{HarmonizeError, SoftError};
pub use percent_change::{pc_diff, AugmentedRecord, Metrics, PercentChangeOptions};
pub use pipeline::{run_pipeline, Pipeline, PipelineSummary};
pub use reader::{RawCsvReader, RawFormat, RecordReader};
pub use record::Record;
pub use run_log::RunLog;
pub use template::Template;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Record
    let record = PyModule::new(m.py(), "record")?;
    record.add("MODEL", schema::record::MODEL)?;
    record.add("SCENARIO", schema::record::SCENARIO)?;
    record.add("REGION", schema::record::REGION)?;
    record.add("VARIABLE", schema::record::VARIABLE)?;
    record.add("ITEM", schema::record::ITEM)?;
    record.add("UNIT", schema::record::UNIT)?;
    record.add("YEAR", schema::record::YEAR)?;
    record.add("VALUE", schema::record::VALUE)?;
    m.add_submodule(&record)?;

    // Percent change
    let pc_diff = PyModule::new(m.py(), "pc_diff")?;
    pc_diff.add(
        "PERCENT_CHANGE_BAU_REF_YEAR",
        schema::pc_diff::PERCENT_CHANGE_BAU_REF_YEAR,
    )?;
    pc_diff.add("DIFF_BAU_REF_YEAR", schema::pc_diff::DIFF_BAU_REF_YEAR)?;
    pc_diff.add("REFERENCE_YEAR_USED", schema::pc_diff::REFERENCE_YEAR_USED)?;
    pc_diff.add("PERCENT_CHANGE_BAU", schema::pc_diff::PERCENT_CHANGE_BAU)?;
    pc_diff.add("DIFF_BAU", schema::pc_diff::DIFF_BAU)?;
    pc_diff.add("PERCENT_CHANGE_ELM", schema::pc_diff::PERCENT_CHANGE_ELM)?;
    pc_diff.add("DIFF_ELM", schema::pc_diff::DIFF_ELM)?;
    pc_diff.add("INTERPOLATED", schema::pc_diff::INTERPOLATED)?;
    m.add_submodule(&pc_diff)?;

    // Template
    let template = PyModule::new(m.py(), "template")?;
    template.add("VARIABLE", schema::template::VARIABLE)?;
    template.add("UNIT", schema::template::UNIT)?;
    template.add("KEEP", schema::template::KEEP)?;
    m.add_submodule(&template)?;

    // Decomposition
    let decomposition = PyModule::new(m.py(), "decomposition")?;
    decomposition.add("DRIVER", schema::decomposition::DRIVER)?;
    decomposition.add("INDIVIDUAL", schema::decomposition::INDIVIDUAL)?;
    decomposition.add("TOTAL", schema::decomposition::TOTAL)?;
    decomposition.add("INTERACTION", schema::decomposition::INTERACTION)?;
    m.add_submodule(&decomposition)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::Harmonizer>()?;
    add_schema_exports(m)?;
    Ok(())
}
