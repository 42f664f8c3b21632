//! Agricultural emissions: gas totals, non-CO2 share, and the gap between the
//! reported total and the sum of the gases.

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::col;

use crate::aggregation::{run_domain_calcs, DomainArtifacts, DomainCalc, Fill, MeltSpec, Panel, Summary};
use crate::config::DomainConfig;
use crate::error::HarmonizeError;
use crate::percent_change::PercentChangeOptions;
use crate::record::{Field, Record};
use crate::run_log::{RunLog, Stage};
use crate::schema::emissions as cols;

pub struct Emissions;

impl DomainCalc for Emissions {
    const DIR: &'static str = "emissions";
    const TAG: &'static str = "EMIS";
    const VARIABLES: &'static [&'static str] = &cols::VARIABLES;

    fn panel(&self, selected: &[&Record], log: &mut RunLog) -> Result<Panel, HarmonizeError> {
        let panel = emissions_panel(selected.iter().copied())?;
        for (model, s) in emis_diff_summary(&panel)? {
            log.info(
                Stage::Aggregation,
                format!(
                    "{model}: {} difference between reported and added emissions: count {}, mean {}, std {}, min {}, max {}",
                    cols::EMIS_DIFF,
                    s.count,
                    s.mean,
                    s.std,
                    s.min,
                    s.max
                ),
            );
        }
        Ok(panel)
    }

    fn melt(&self, panel: &Panel) -> Result<Vec<Record>, HarmonizeError> {
        emissions_long(panel)
    }
}

/// Gases pivoted wide (missing gases count as zero) plus derived totals and shares.
pub fn emissions_panel<'a>(records: impl IntoIterator<Item = &'a Record>) -> Result<Panel, HarmonizeError> {
    let mut panel = Panel::pivot(records, Field::Variable, &cols::VARIABLES, Fill::Zero)?;
    panel.derive(cols::EMIS_ADDED, col(cols::ECH4) + col(cols::ECO2) + col(cols::EN2O))?;
    panel.derive(cols::EMIS_NON_CO2, col(cols::ECH4) + col(cols::EN2O))?;
    panel.derive(cols::EMIS_DIFF, col(cols::EMIS) - col(cols::EMIS_ADDED))?;
    panel.derive(cols::ECH4_SHARE, col(cols::ECH4) / col(cols::EMIS_ADDED))?;
    panel.derive(cols::ECO2_SHARE, col(cols::ECO2) / col(cols::EMIS_ADDED))?;
    panel.derive(cols::EN2O_SHARE, col(cols::EN2O) / col(cols::EMIS_ADDED))?;
    panel.derive(cols::NON_CO2_SHARE, col(cols::EMIS_NON_CO2) / col(cols::EMIS_ADDED))?;
    Ok(panel)
}

/// Per-model statistics of the reported-minus-added difference.
pub fn emis_diff_summary(panel: &Panel) -> Result<BTreeMap<String, Summary>, HarmonizeError> {
    panel.summary_by_model(cols::EMIS_DIFF)
}

/// Totals in MtCO2e followed by the gas shares, all under item AGR.
pub fn emissions_long(panel: &Panel) -> Result<Vec<Record>, HarmonizeError> {
    let total = |column| MeltSpec {
        column,
        variable: column,
        item: cols::ITEM,
        unit: cols::TOTAL_UNIT,
    };
    let share = |column| MeltSpec {
        column,
        variable: column,
        item: cols::ITEM,
        unit: cols::SHARE_UNIT,
    };
    panel.melt(&[
        total(cols::EMIS_ADDED),
        total(cols::EMIS_NON_CO2),
        share(cols::ECH4_SHARE),
        share(cols::ECO2_SHARE),
        share(cols::EN2O_SHARE),
        share(cols::NON_CO2_SHARE),
    ])
}

/// Emissions aggregation over a percent-change file; artifacts go to `emissions/`.
pub fn run_emissions_calcs(
    input: &Path,
    config: &DomainConfig,
    options: &PercentChangeOptions,
    endpoints_only: bool,
) -> Result<Option<DomainArtifacts>, HarmonizeError> {
    run_domain_calcs(&Emissions, input, config, options, endpoints_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::PanelKey;

    fn rec(scenario: &str, variable: &str, value: f64) -> Record {
        Record::new("GLOBIOM", scenario, "WLD", variable, "AGR", "MtCO2e", 2020, value)
    }

    fn key(scenario: &str) -> PanelKey {
        PanelKey {
            model: "GLOBIOM".into(),
            scenario: scenario.into(),
            region: "WLD".into(),
            year: 2020,
        }
    }

    #[test]
    fn totals_and_shares() {
        let records = vec![
            rec("BAU", "ECO2", 50.0),
            rec("BAU", "ECH4", 30.0),
            rec("BAU", "EN2O", 20.0),
            rec("BAU", "EMIS", 110.0),
        ];
        let panel = emissions_panel(&records).unwrap();
        let k = key("BAU");
        assert_eq!(panel.get(&k, cols::EMIS_ADDED), 100.0);
        assert_eq!(panel.get(&k, cols::EMIS_NON_CO2), 50.0);
        assert_eq!(panel.get(&k, cols::EMIS_DIFF), 10.0);
        assert_eq!(panel.get(&k, cols::ECO2_SHARE), 0.5);
        assert_eq!(panel.get(&k, cols::NON_CO2_SHARE), 0.5);
    }

    #[test]
    fn missing_gas_counts_as_zero() {
        let records = vec![rec("ELM", "ECH4", 10.0), rec("ELM", "EN2O", 30.0)];
        let panel = emissions_panel(&records).unwrap();
        let k = key("ELM");
        assert_eq!(panel.get(&k, cols::ECO2), 0.0);
        assert_eq!(panel.get(&k, cols::EMIS_ADDED), 40.0);
        assert_eq!(panel.get(&k, cols::EMIS_DIFF), -40.0);
        assert_eq!(panel.get(&k, cols::ECH4_SHARE), 0.25);
    }

    #[test]
    fn long_form_has_totals_then_shares() {
        let records = vec![rec("BAU", "ECO2", 50.0), rec("BAU", "ECH4", 50.0)];
        let long = emissions_long(&emissions_panel(&records).unwrap()).unwrap();
        let layout: Vec<(&str, &str, &str)> = long
            .iter()
            .map(|r| (r.variable.as_str(), r.item.as_str(), r.unit.as_str()))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("EMIS_added", "AGR", "MtCO2e"),
                ("EMIS_nonCO2", "AGR", "MtCO2e"),
                ("ECH4_share", "AGR", "share"),
                ("ECO2_share", "AGR", "share"),
                ("EN2O_share", "AGR", "share"),
                ("nonCO2_share", "AGR", "share"),
            ]
        );
        assert_eq!(long[0].value, 100.0);
    }

    #[test]
    fn diff_summary_is_per_model() {
        let records = vec![rec("BAU", "EMIS", 12.0), rec("BAU", "ECO2", 10.0), rec("ELM", "EMIS", 4.0)];
        let summary = emis_diff_summary(&emissions_panel(&records).unwrap()).unwrap();
        let s = summary["GLOBIOM"];
        assert_eq!(s.count, 2);
        assert!((s.mean - 3.0).abs() < 1e-12);
        assert_eq!((s.min, s.max), (2.0, 4.0));
    }

    #[test]
    fn runs_over_a_percent_change_file() {
        use crate::config::{DomainModelConfig, ItemSelector};
        use crate::frame::{read_canonical_csv, write_augmented};
        use crate::percent_change::pc_diff;

        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            Record::new("GLOBIOM", "BAU", "WLD", "ECH4", "AGR", "MtCO2e", 2020, 30.0),
            Record::new("GLOBIOM", "BAU", "WLD", "ECO2", "AGR", "MtCO2e", 2020, 70.0),
            Record::new("GLOBIOM", "ELM", "WLD", "ECH4", "AGR", "MtCO2e", 2050, 15.0),
            Record::new("GLOBIOM", "ELM", "WLD", "ECO2", "AGR", "MtCO2e", 2050, 35.0),
            Record::new("GLOBIOM", "ELM", "WLD", "ECH4", "CRP", "MtCO2e", 2050, 99.0),
        ];
        let mut log = RunLog::new("t");
        let input = dir.path().join("GLOBIOM_pc-diff.csv");
        write_augmented(&pc_diff(&records, &PercentChangeOptions::default(), &mut log), &input).unwrap();

        let config = DomainConfig::from([(
            "GLOBIOM".to_string(),
            DomainModelConfig {
                ref_year: None,
                end_year: 2050,
                item: ItemSelector::One("AGR".into()),
            },
        )]);
        let artifacts = run_emissions_calcs(&input, &config, &PercentChangeOptions::default(), false)
            .unwrap()
            .unwrap();

        assert_eq!(artifacts.long, dir.path().join("emissions").join("GLOBIOM_pc-diff_EMIS-calcs.csv"));
        assert!(artifacts.wide.exists());
        assert!(artifacts.pc_diff.exists());
        assert!(artifacts.log.exists());

        let long = read_canonical_csv(&artifacts.long).unwrap();
        let added = long
            .iter()
            .find(|r| r.variable == cols::EMIS_ADDED && r.scenario == "ELM")
            .unwrap();
        assert_eq!(added.value, 50.0);
    }

    #[test]
    fn unknown_models_yield_nothing() {
        use crate::frame::write_records;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("AIM.csv");
        write_records(&[Record::new("AIM", "BAU", "WLD", "ECH4", "AGR", "MtCO2e", 2020, 1.0)], &input).unwrap();
        let outcome =
            run_emissions_calcs(&input, &DomainConfig::new(), &PercentChangeOptions::default(), false).unwrap();
        assert!(outcome.is_none());
    }
}
