use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HarmonizeError;

pub const DEFAULT_BASE_YEAR: i64 = 2020;
pub const DEFAULT_BASELINE_SCENARIO: &str = "BAU";
pub const DEFAULT_ALTERNATE_SCENARIO: &str = "ELM";
pub const DEFAULT_OVERRIDES_SUFFIX: &str = "_OVERRIDES_fix.csv";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_RAW_FORMAT: &str = "myGeoHub";

/// Settings for one pipeline run; every field has a default so a partial JSON
/// file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_base_year")]
    pub base_year: i64,
    #[serde(default = "default_baseline_scenario")]
    pub baseline_scenario: String,
    #[serde(default = "default_alternate_scenario")]
    pub alternate_scenario: String,
    #[serde(default = "default_overrides_suffix")]
    pub overrides_suffix: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Synthesize missing base-year values instead of only using the nearest BAU year.
    #[serde(default = "default_true")]
    pub interpolate_base_year: bool,
    #[serde(default = "default_raw_format")]
    pub raw_format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_year: default_base_year(),
            baseline_scenario: default_baseline_scenario(),
            alternate_scenario: default_alternate_scenario(),
            overrides_suffix: default_overrides_suffix(),
            workers: default_workers(),
            interpolate_base_year: true,
            raw_format: default_raw_format(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, HarmonizeError> {
        let text = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.normalize()?;
        Ok(config)
    }

    /// Uppercase scenario labels and reject settings no run could use.
    pub fn normalize(&mut self) -> Result<(), HarmonizeError> {
        self.baseline_scenario = crate::record::normalize_scenario(&self.baseline_scenario);
        self.alternate_scenario = crate::record::normalize_scenario(&self.alternate_scenario);
        if self.baseline_scenario.is_empty() || self.alternate_scenario.is_empty() {
            return Err(HarmonizeError::Config(
                "baseline_scenario and alternate_scenario must not be empty".into(),
            ));
        }
        if self.workers == 0 {
            return Err(HarmonizeError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_base_year() -> i64 {
    DEFAULT_BASE_YEAR
}

fn default_baseline_scenario() -> String {
    DEFAULT_BASELINE_SCENARIO.to_string()
}

fn default_alternate_scenario() -> String {
    DEFAULT_ALTERNATE_SCENARIO.to_string()
}

fn default_overrides_suffix() -> String {
    DEFAULT_OVERRIDES_SUFFIX.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_true() -> bool {
    true
}

fn default_raw_format() -> String {
    DEFAULT_RAW_FORMAT.to_string()
}

/// Items a model reports its domain totals under: one code or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemSelector {
    One(String),
    Many(Vec<String>),
}

impl ItemSelector {
    pub fn contains(&self, item: &str) -> bool {
        match self {
            Self::One(code) => code == item,
            Self::Many(codes) => codes.iter().any(|c| c == item),
        }
    }
}

/// Per-model settings for the emissions and land aggregations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainModelConfig {
    /// Filled from the percent-change output when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_year: Option<i64>,
    pub end_year: i64,
    pub item: ItemSelector,
}

/// Model name -> aggregation settings, as stored in `model_emissions.json` /
/// `model_land.json`.
pub type DomainConfig = BTreeMap<String, DomainModelConfig>;

pub fn load_domain_config(path: &Path) -> Result<DomainConfig, HarmonizeError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let mut config: PipelineConfig = serde_json::from_str(r#"{"base_year": 2015}"#).unwrap();
        config.normalize().unwrap();
        assert_eq!(config.base_year, 2015);
        assert_eq!(config.baseline_scenario, "BAU");
        assert_eq!(config.workers, 5);
        assert!(config.interpolate_base_year);
    }

    #[test]
    fn normalize_uppercases_and_rejects_zero_workers() {
        let mut config = PipelineConfig {
            alternate_scenario: "elm".into(),
            ..PipelineConfig::default()
        };
        config.normalize().unwrap();
        assert_eq!(config.alternate_scenario, "ELM");

        config.workers = 0;
        assert!(config.normalize().is_err());
    }

    #[test]
    fn domain_config_accepts_single_and_list_items() {
        let json = r#"{
            "GLOBIOM": {"ref_year": 2020, "end_year": 2050, "item": "AGR"},
            "MAgPIE": {"end_year": 2050, "item": ["CRP", "GRS", "FOR"]}
        }"#;
        let config: DomainConfig = serde_json::from_str(json).unwrap();
        assert!(config["GLOBIOM"].item.contains("AGR"));
        assert!(config["MAgPIE"].item.contains("GRS"));
        assert!(!config["MAgPIE"].item.contains("AGR"));
        assert_eq!(config["MAgPIE"].ref_year, None);
    }
}
