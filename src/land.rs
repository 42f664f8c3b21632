//! Land cover: agricultural and other-natural totals and their shares of total land.

use std::path::Path;

use polars::prelude::{col, lit};

use crate::aggregation::{run_domain_calcs, DomainArtifacts, DomainCalc, Fill, MeltSpec, Panel};
use crate::config::DomainConfig;
use crate::error::HarmonizeError;
use crate::percent_change::PercentChangeOptions;
use crate::record::{Field, Record};
use crate::run_log::{RunLog, Stage};
use crate::schema::land as cols;

const AREA_COLUMNS: [&str; 5] = [cols::AGR_ADDED, cols::CRP, cols::GRS, cols::ONV_ADDED, cols::LAND_TOT];

const SHARE_COLUMNS: [&str; 6] = [
    cols::ONV_SHARE,
    cols::AGR_SHARE,
    cols::CRP_SHARE,
    cols::GRS_SHARE,
    cols::CRP_AGR_SHARE,
    cols::GRS_AGR_SHARE,
];

pub struct Land;

impl DomainCalc for Land {
    const DIR: &'static str = "land";
    const TAG: &'static str = "LAND";
    const VARIABLES: &'static [&'static str] = &[cols::VARIABLE];

    fn panel(&self, selected: &[&Record], log: &mut RunLog) -> Result<Panel, HarmonizeError> {
        let panel = land_panel(selected.iter().copied())?;
        let without_total = panel.count_nan(cols::LAND_TOT)?;
        if without_total > 0 {
            log.warn(
                Stage::Aggregation,
                format!("{without_total} rows lack CRP or GRS; their {} is undefined", cols::LAND_TOT),
            );
        }
        Ok(panel)
    }

    fn melt(&self, panel: &Panel) -> Result<Vec<Record>, HarmonizeError> {
        land_long(panel)
    }
}

/// Items pivoted wide (unreported items stay NaN) plus derived totals and shares.
pub fn land_panel<'a>(records: impl IntoIterator<Item = &'a Record>) -> Result<Panel, HarmonizeError> {
    let mut panel = Panel::pivot(records, Field::Item, &cols::ITEMS, Fill::Missing)?;
    panel.derive(cols::AGR_ADDED, col(cols::CRP) + col(cols::GRS))?;
    panel.derive(cols::AGR_DIFF, col(cols::AGR) - col(cols::AGR_ADDED))?;
    // Missing forest or other natural land counts as none
    panel.derive(
        cols::ONV_ADDED,
        col(cols::FOR).fill_nan(lit(0.0)) + col(cols::ONV).fill_nan(lit(0.0)),
    )?;
    panel.derive(cols::LAND_TOT, col(cols::AGR_ADDED) + col(cols::ONV_ADDED))?;
    panel.derive(cols::AGR_SHARE, col(cols::AGR_ADDED) / col(cols::LAND_TOT))?;
    panel.derive(cols::CRP_SHARE, col(cols::CRP) / col(cols::LAND_TOT))?;
    panel.derive(cols::GRS_SHARE, col(cols::GRS) / col(cols::LAND_TOT))?;
    panel.derive(cols::CRP_AGR_SHARE, col(cols::CRP) / col(cols::AGR_ADDED))?;
    panel.derive(cols::GRS_AGR_SHARE, col(cols::GRS) / col(cols::AGR_ADDED))?;
    panel.derive(cols::ONV_SHARE, col(cols::ONV_ADDED) / col(cols::LAND_TOT))?;
    Ok(panel)
}

/// Areas under `LAND_added` followed by shares under `LAND_share`; the
/// panel column becomes the item.
pub fn land_long(panel: &Panel) -> Result<Vec<Record>, HarmonizeError> {
    let specs: Vec<MeltSpec<'_>> = AREA_COLUMNS
        .iter()
        .map(|&column| MeltSpec {
            column,
            variable: cols::ADDED_VARIABLE,
            item: column,
            unit: cols::AREA_UNIT,
        })
        .chain(SHARE_COLUMNS.iter().map(|&column| MeltSpec {
            column,
            variable: cols::SHARE_VARIABLE,
            item: column,
            unit: cols::SHARE_UNIT,
        }))
        .collect();
    panel.melt(&specs)
}

/// Land aggregation over a percent-change file; artifacts go to `land/`.
pub fn run_land_calcs(
    input: &Path,
    config: &DomainConfig,
    options: &PercentChangeOptions,
    endpoints_only: bool,
) -> Result<Option<DomainArtifacts>, HarmonizeError> {
    run_domain_calcs(&Land, input, config, options, endpoints_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::PanelKey;

    fn rec(item: &str, value: f64) -> Record {
        Record::new("MAgPIE", "BAU", "WLD", "LAND", item, "1000 ha", 2020, value)
    }

    fn key() -> PanelKey {
        PanelKey {
            model: "MAgPIE".into(),
            scenario: "BAU".into(),
            region: "WLD".into(),
            year: 2020,
        }
    }

    #[test]
    fn totals_and_shares() {
        let records = vec![
            rec("AGR", 45.0),
            rec("CRP", 10.0),
            rec("GRS", 30.0),
            rec("FOR", 50.0),
            rec("ONV", 10.0),
        ];
        let panel = land_panel(&records).unwrap();
        let k = key();
        assert_eq!(panel.get(&k, cols::AGR_ADDED), 40.0);
        assert_eq!(panel.get(&k, cols::AGR_DIFF), 5.0);
        assert_eq!(panel.get(&k, cols::ONV_ADDED), 60.0);
        assert_eq!(panel.get(&k, cols::LAND_TOT), 100.0);
        assert_eq!(panel.get(&k, cols::AGR_SHARE), 0.4);
        assert_eq!(panel.get(&k, cols::GRS_AGR_SHARE), 0.75);
        assert_eq!(panel.get(&k, cols::ONV_SHARE), 0.6);
    }

    #[test]
    fn missing_forest_counts_as_zero_but_missing_crop_propagates() {
        let panel = land_panel(&[rec("CRP", 10.0), rec("GRS", 10.0), rec("ONV", 20.0)]).unwrap();
        assert_eq!(panel.get(&key(), cols::ONV_ADDED), 20.0);
        assert_eq!(panel.get(&key(), cols::LAND_TOT), 40.0);
        assert!(panel.get(&key(), cols::AGR_DIFF).is_nan());

        let panel = land_panel(&[rec("GRS", 10.0), rec("FOR", 20.0)]).unwrap();
        assert!(panel.get(&key(), cols::AGR_ADDED).is_nan());
        assert!(panel.get(&key(), cols::LAND_TOT).is_nan());
    }

    #[test]
    fn long_form_uses_the_column_as_item() {
        let long = land_long(&land_panel(&[rec("CRP", 10.0), rec("GRS", 30.0)]).unwrap()).unwrap();
        assert_eq!(long.len(), AREA_COLUMNS.len() + SHARE_COLUMNS.len());
        assert_eq!(long[0].variable, "LAND_added");
        assert_eq!(long[0].item, "AGR_added");
        assert_eq!(long[0].unit, "1000 ha");
        assert_eq!(long[0].value, 40.0);
        let last = long.last().unwrap();
        assert_eq!((last.variable.as_str(), last.item.as_str()), ("LAND_share", "GRS_AGR_share"));
        assert_eq!(last.value, 0.75);
    }
}
