//! Model-specific raw CSV layouts mapped onto the canonical record shape.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use polars::prelude::*;

use crate::error::HarmonizeError;
use crate::frame::{read_csv_as_strings, records_from_frame, select_canonical};
use crate::record::Record;
use crate::schema::{raw, record};

/// Source of canonical records for one input file.
pub trait RecordReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<Record>, HarmonizeError>;
}

/// Submission layouts used by the participating models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// Platform export: headerless, canonical column order.
    MyGeoHub,
    Magnet,
    Magpie,
    Aim,
    Farm,
    Globiom,
    /// `;`-delimited with a header and an extra `description` column.
    Impact,
    /// Header row with model-specific names, canonical column order.
    Image,
}

impl RawFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MyGeoHub => "myGeoHub",
            Self::Magnet => "MAGNET",
            Self::Magpie => "MAgPIE",
            Self::Aim => "AIM",
            Self::Farm => "FARM",
            Self::Globiom => "GLOBIOM",
            Self::Impact => "IMPACT",
            Self::Image => "IMAGE",
        }
    }
}

impl FromStr for RawFormat {
    type Err = HarmonizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mygeohub" => Ok(Self::MyGeoHub),
            "magnet" => Ok(Self::Magnet),
            "magpie" => Ok(Self::Magpie),
            "aim" => Ok(Self::Aim),
            "farm" => Ok(Self::Farm),
            "globiom" => Ok(Self::Globiom),
            "impact" => Ok(Self::Impact),
            "image" => Ok(Self::Image),
            other => Err(HarmonizeError::MalformedInput(format!(
                "unsupported model '{other}', expected one of: myGeoHub, MAGNET, MAgPIE, AIM, FARM, GLOBIOM, IMPACT, IMAGE"
            ))),
        }
    }
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawCsvReader {
    format: RawFormat,
}

impl RawCsvReader {
    pub fn new(format: RawFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> RawFormat {
        self.format
    }

    fn read_headerless(path: &Path) -> Result<DataFrame, HarmonizeError> {
        let mut df = read_csv_as_strings(path, false, b',')?;
        Self::name_positionally(&mut df, path)?;

        // Some exports carry a header row despite the layout
        let first_year = df.column(record::YEAR)?.str()?.get(0).map(str::trim);
        if first_year.is_some_and(|y| y.eq_ignore_ascii_case(record::YEAR)) {
            df = df.slice(1, df.height().saturating_sub(1));
        }
        Ok(df)
    }

    fn read_impact(path: &Path) -> Result<DataFrame, HarmonizeError> {
        let mut df = read_csv_as_strings(path, true, b';')?;
        let lowered: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.to_lowercase())
            .collect();
        df.set_column_names(lowered.as_slice())?;

        if df.column(raw::DESCRIPTION).is_ok() {
            df = df.drop(raw::DESCRIPTION)?;
        }
        Ok(df)
    }

    fn read_image(path: &Path) -> Result<DataFrame, HarmonizeError> {
        let mut df = read_csv_as_strings(path, true, b',')?;
        Self::name_positionally(&mut df, path)?;
        Ok(df)
    }

    fn name_positionally(df: &mut DataFrame, path: &Path) -> Result<(), HarmonizeError> {
        if df.width() != record::ALL.len() {
            return Err(HarmonizeError::MalformedInput(format!(
                "{}: expected {} columns, found {}",
                path.display(),
                record::ALL.len(),
                df.width()
            )));
        }
        df.set_column_names(record::ALL)?;
        Ok(())
    }
}

impl RecordReader for RawCsvReader {
    fn read(&self, path: &Path) -> Result<Vec<Record>, HarmonizeError> {
        let df = match self.format {
            RawFormat::MyGeoHub
            | RawFormat::Magnet
            | RawFormat::Magpie
            | RawFormat::Aim
            | RawFormat::Farm
            | RawFormat::Globiom => Self::read_headerless(path)?,
            RawFormat::Impact => Self::read_impact(path)?,
            RawFormat::Image => Self::read_image(path)?,
        };
        let records = records_from_frame(&select_canonical(df)?)?;
        tracing::debug!(
            path = %path.display(),
            format = %self.format,
            rows = records.len(),
            "read raw file"
        );
        Ok(records)
    }
}

/// Read a raw file given the model identifier of its layout.
pub fn read_raw_csv(path: &Path, model: &str) -> Result<Vec<Record>, HarmonizeError> {
    RawCsvReader::new(model.parse()?).read(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn headerless_file_reads_in_canonical_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GLOBIOM.csv");
        fs::write(
            &path,
            "GLOBIOM,bau,WLD,PROD,CRP,1000 t,2020,10\nGLOBIOM,elm,WLD,PROD,CRP,1000 t,2030, 12.5 \n",
        )
        .unwrap();

        let records = read_raw_csv(&path, "GLOBIOM").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scenario, "BAU");
        assert_eq!(records[1].year, 2030);
        assert_eq!(records[1].value, 12.5);
    }

    #[test]
    fn stray_header_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AIM.csv");
        fs::write(
            &path,
            "model,scenario,region,variable,item,unit,year,value\nAIM,BAU,WLD,PROD,CRP,t,2020,1\n",
        )
        .unwrap();

        let records = read_raw_csv(&path, "AIM").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "AIM");
    }

    #[test]
    fn impact_layout_drops_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMPACT.csv");
        fs::write(
            &path,
            "Model;Scenario;Region;Variable;Item;Unit;Year;Value;Description\n\
             IMPACT;BAU;WLD;PROD;CRP;1000 t;2020;5;crop production\n",
        )
        .unwrap();

        let records = read_raw_csv(&path, "IMPACT").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unit, "1000 t");
        assert_eq!(records[0].value, 5.0);
    }

    #[test]
    fn image_layout_renames_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMAGE.csv");
        fs::write(
            &path,
            "Model,Scen,Reg,Var,Itm,Unt,Yr,Val\nIMAGE,ELM,EUR,AREA,LND,1000 ha,2050,3\n",
        )
        .unwrap();

        let records = read_raw_csv(&path, "IMAGE").unwrap();
        assert_eq!(records[0].region, "EUR");
        assert_eq!(records[0].year, 2050);
    }

    #[test]
    fn unsupported_model_is_malformed_input() {
        let err = read_raw_csv(Path::new("whatever.csv"), "GCAM").unwrap_err();
        assert!(matches!(err, HarmonizeError::MalformedInput(_)));
    }

    #[test]
    fn wrong_column_count_is_malformed_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FARM.csv");
        fs::write(&path, "FARM,BAU,WLD,PROD,2020,1\n").unwrap();

        let err = read_raw_csv(&path, "FARM").unwrap_err();
        assert!(matches!(err, HarmonizeError::MalformedInput(_)));
    }
}
