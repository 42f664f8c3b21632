//! Wide (model, scenario, region, year) panels built from long records, derived
//! columns on them, and the way back to long records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::config::DomainConfig;
use crate::error::HarmonizeError;
use crate::frame::{augmented_from_frame, canonical_columns, file_stem, read_csv_as_strings, write_csv, write_records};
use crate::percent_change::{pc_diff_file, AugmentedRecord, PercentChangeOptions};
use crate::record::{Field, Record};
use crate::run_log::{RunLog, Stage, TIMESTAMP_FORMAT};
use crate::schema::{panel, record as rec_cols};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelKey {
    pub model: String,
    pub scenario: String,
    pub region: String,
    pub year: i64,
}

/// Value for a pivoted cell no record reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Zero,
    Missing,
}

impl Fill {
    fn value(self) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::Missing => f64::NAN,
        }
    }
}

fn index_exprs() -> Vec<Expr> {
    panel::INDEX.iter().map(|c| col(*c)).collect()
}

/// Wide table indexed by (model, scenario, region, year), sorted by the index.
#[derive(Debug, Clone)]
pub struct Panel {
    columns: Vec<String>,
    frame: DataFrame,
}

impl Panel {
    /// Spread `records` into one column per value of `pivot_on` listed in `columns`.
    ///
    /// Repeated cells average their non-NaN values; cells with none get `fill`.
    /// Records whose pivot value is not listed are ignored.
    pub fn pivot<'a>(
        records: impl IntoIterator<Item = &'a Record>,
        pivot_on: Field,
        columns: &[&str],
        fill: Fill,
    ) -> Result<Self, HarmonizeError> {
        let records: Vec<&Record> = records.into_iter().collect();
        let long = DataFrame::new(canonical_columns(records.iter().copied()))?;

        let field = pivot_on.as_str();
        let listed = columns
            .iter()
            .map(|&c| col(field).eq(lit(c)))
            .reduce(|a, b| a.or(b))
            .unwrap_or_else(|| lit(false));
        let cells: Vec<Expr> = columns
            .iter()
            .map(|&c| {
                col(rec_cols::VALUE)
                    .filter(col(field).eq(lit(c)).and(col(rec_cols::VALUE).is_not_nan()))
                    .mean()
                    .fill_null(lit(fill.value()))
                    .alias(c)
            })
            .collect();

        let frame = long
            .lazy()
            .filter(listed)
            .group_by(index_exprs())
            .agg(cells)
            .sort(panel::INDEX, SortMultipleOptions::default())
            .collect()?;

        Ok(Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            frame,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Row keys in panel order.
    pub fn keys(&self) -> Result<Vec<PanelKey>, HarmonizeError> {
        let [model, scenario, region, year] = panel::INDEX;
        let models = self.frame.column(model)?.str()?;
        let scenarios = self.frame.column(scenario)?.str()?;
        let regions = self.frame.column(region)?.str()?;
        let years = self.frame.column(year)?.i64()?;
        Ok((0..self.frame.height())
            .map(|i| PanelKey {
                model: models.get(i).unwrap_or_default().to_string(),
                scenario: scenarios.get(i).unwrap_or_default().to_string(),
                region: regions.get(i).unwrap_or_default().to_string(),
                year: years.get(i).unwrap_or_default(),
            })
            .collect())
    }

    /// Cell value; NaN for an unknown row or column.
    pub fn get(&self, key: &PanelKey, column: &str) -> f64 {
        let Ok(keys) = self.keys() else {
            return f64::NAN;
        };
        keys.iter()
            .position(|k| k == key)
            .and_then(|i| self.frame.column(column).ok()?.f64().ok()?.get(i))
            .unwrap_or(f64::NAN)
    }

    /// Add (or overwrite) a column computed from the existing ones.
    pub fn derive(&mut self, name: &str, expr: Expr) -> Result<(), HarmonizeError> {
        self.frame = self.frame.clone().lazy().with_column(expr.alias(name)).collect()?;
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
        Ok(())
    }

    /// Rows whose `column` is NaN.
    pub fn count_nan(&self, column: &str) -> Result<usize, HarmonizeError> {
        let counted = self
            .frame
            .clone()
            .lazy()
            .select([col(column).is_nan().sum().cast(DataType::Int64)])
            .collect()?;
        Ok(counted.column(column)?.i64()?.get(0).unwrap_or(0) as usize)
    }

    /// Descriptive statistics of `column` per model.
    pub fn summary_by_model(&self, column: &str) -> Result<BTreeMap<String, Summary>, HarmonizeError> {
        let stats = self
            .frame
            .clone()
            .lazy()
            .group_by([col(rec_cols::MODEL)])
            .agg(Summary::exprs(column))
            .collect()?;
        let models = stats.column(rec_cols::MODEL)?.str()?;
        let mut out = BTreeMap::new();
        for i in 0..stats.height() {
            if let Some(model) = models.get(i) {
                out.insert(model.to_string(), Summary::read(&stats, i)?);
            }
        }
        Ok(out)
    }

    /// Long records, one block per melt entry in order, rows in key order within a block.
    pub fn melt(&self, specs: &[MeltSpec<'_>]) -> Result<Vec<Record>, HarmonizeError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(specs.len() * self.len());
        for spec in specs {
            let block = self
                .frame
                .clone()
                .lazy()
                .select([
                    col(rec_cols::MODEL),
                    col(rec_cols::SCENARIO),
                    col(rec_cols::REGION),
                    col(rec_cols::YEAR),
                    col(spec.column).alias(rec_cols::VALUE),
                ])
                .collect()?;
            let models = block.column(rec_cols::MODEL)?.str()?;
            let scenarios = block.column(rec_cols::SCENARIO)?.str()?;
            let regions = block.column(rec_cols::REGION)?.str()?;
            let years = block.column(rec_cols::YEAR)?.i64()?;
            let values = block.column(rec_cols::VALUE)?.f64()?;
            for i in 0..block.height() {
                out.push(Record::new(
                    models.get(i).unwrap_or_default(),
                    scenarios.get(i).unwrap_or_default(),
                    regions.get(i).unwrap_or_default(),
                    spec.variable,
                    spec.item,
                    spec.unit,
                    years.get(i).unwrap_or_default(),
                    values.get(i).unwrap_or(f64::NAN),
                ));
            }
        }
        Ok(out)
    }

    /// Index columns followed by every value column in insertion order.
    pub fn to_frame(&self) -> Result<DataFrame, HarmonizeError> {
        let names = panel::INDEX
            .iter()
            .map(|c| c.to_string())
            .chain(self.columns.iter().cloned());
        Ok(self.frame.select(names)?)
    }
}

/// Where one panel column lands when melted back to long records.
#[derive(Debug, Clone, Copy)]
pub struct MeltSpec<'a> {
    pub column: &'a str,
    pub variable: &'a str,
    pub item: &'a str,
    pub unit: &'a str,
}

/// Descriptive statistics of one column, NaN values excluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN below two values.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    const COUNT: &'static str = "count";
    const MEAN: &'static str = "mean";
    const STD: &'static str = "std";
    const MIN: &'static str = "min";
    const MAX: &'static str = "max";

    pub fn of(values: impl IntoIterator<Item = f64>) -> Result<Self, HarmonizeError> {
        let values: Vec<f64> = values.into_iter().collect();
        let df = DataFrame::new(vec![Column::new(rec_cols::VALUE.into(), &values)])?;
        let stats = df.lazy().select(Self::exprs(rec_cols::VALUE)).collect()?;
        Self::read(&stats, 0)
    }

    fn exprs(column: &str) -> Vec<Expr> {
        let valid = col(column).filter(col(column).is_not_nan());
        vec![
            valid.clone().count().cast(DataType::Int64).alias(Self::COUNT),
            valid.clone().mean().alias(Self::MEAN),
            valid.clone().std(1).alias(Self::STD),
            valid.clone().min().alias(Self::MIN),
            valid.max().alias(Self::MAX),
        ]
    }

    fn read(stats: &DataFrame, row: usize) -> Result<Self, HarmonizeError> {
        let stat = |name: &str| -> Result<f64, HarmonizeError> {
            Ok(stats.column(name)?.f64()?.get(row).unwrap_or(f64::NAN))
        };
        let count = stats.column(Self::COUNT)?.i64()?.get(row).unwrap_or(0) as usize;
        Ok(Self {
            count,
            mean: stat(Self::MEAN)?,
            std: if count > 1 { stat(Self::STD)? } else { f64::NAN },
            min: stat(Self::MIN)?,
            max: stat(Self::MAX)?,
        })
    }
}

/// Models present in both the data and `config`, each with its reference year
/// taken from the data when the config leaves it out.
pub fn resolve_models(rows: &[AugmentedRecord], config: &DomainConfig) -> DomainConfig {
    let mut resolved = DomainConfig::new();
    for (model, settings) in config {
        let mut of_model = rows.iter().filter(|r| &r.record.model == model).peekable();
        if of_model.peek().is_none() {
            continue;
        }
        let mut settings = settings.clone();
        if settings.ref_year.is_none() {
            settings.ref_year = of_model.find_map(|r| r.metrics.reference_year_used);
        }
        resolved.insert(model.clone(), settings);
    }
    resolved
}

/// Records of the configured models reporting one of `variables` for the
/// configured items; with `endpoints_only`, just the reference and end years.
pub fn select_for_domain<'a>(
    rows: &'a [AugmentedRecord],
    models: &DomainConfig,
    variables: &[&str],
    endpoints_only: bool,
) -> Vec<&'a Record> {
    rows.iter()
        .map(|r| &r.record)
        .filter(|r| variables.contains(&r.variable.as_str()))
        .filter(|r| {
            models.get(&r.model).is_some_and(|m| {
                m.item.contains(&r.item)
                    && (!endpoints_only || r.year == m.end_year || Some(r.year) == m.ref_year)
            })
        })
        .collect()
}

/// A domain-level aggregation run on percent-change output.
pub trait DomainCalc {
    /// Output directory created beside the input file.
    const DIR: &'static str;
    /// Artifact tag, as in `<base>_<TAG>-calcs.csv`.
    const TAG: &'static str;
    /// Variables the aggregation reads.
    const VARIABLES: &'static [&'static str];

    fn panel(&self, selected: &[&Record], log: &mut RunLog) -> Result<Panel, HarmonizeError>;

    fn melt(&self, panel: &Panel) -> Result<Vec<Record>, HarmonizeError>;
}

/// Files written by one domain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainArtifacts {
    pub wide: PathBuf,
    pub long: PathBuf,
    pub pc_diff: PathBuf,
    pub log: PathBuf,
}

/// Read a percent-change file, aggregate it, and rerun the percent-change
/// engine on the aggregated records.
///
/// Returns `None` when no configured model occurs in the input.
pub fn run_domain_calcs<C: DomainCalc>(
    calc: &C,
    input: &Path,
    config: &DomainConfig,
    options: &PercentChangeOptions,
    endpoints_only: bool,
) -> Result<Option<DomainArtifacts>, HarmonizeError> {
    let base = file_stem(input)?;
    let output_dir = input.parent().unwrap_or_else(|| Path::new(".")).join(C::DIR);
    let mut log = RunLog::new(format!("{base}_{}", C::TAG));

    let rows = augmented_from_frame(&read_csv_as_strings(input, true, b',')?)?;
    let models = resolve_models(&rows, config);
    if models.is_empty() {
        log.warn(
            Stage::Aggregation,
            format!("{base} has no valid entries for {} calcs", C::TAG),
        );
        return Ok(None);
    }
    for (model, settings) in &models {
        log.info(
            Stage::Aggregation,
            format!(
                "{model}: reference year {:?}, end year {}",
                settings.ref_year, settings.end_year
            ),
        );
    }

    let selected = select_for_domain(&rows, &models, C::VARIABLES, endpoints_only);
    let panel = calc.panel(&selected, &mut log)?;

    let wide = output_dir.join(format!("{base}_{}-calcs-w.csv", C::TAG));
    write_csv(&mut panel.to_frame()?, &wide)?;
    log.info(Stage::Aggregation, format!("saved wide table to {}", wide.display()));

    let long = output_dir.join(format!("{base}_{}-calcs.csv", C::TAG));
    write_records(&calc.melt(&panel)?, &long)?;
    log.info(Stage::Aggregation, format!("saved long table to {}", long.display()));

    let pc_diff = pc_diff_file(&long, &output_dir, options, &mut log)?;
    let log_path = output_dir.join("logs").join(format!(
        "{}_pc-diff_{}.log",
        file_stem(&long)?,
        log.started().format(TIMESTAMP_FORMAT)
    ));
    log.write_to(&log_path)?;

    Ok(Some(DomainArtifacts {
        wide,
        long,
        pc_diff,
        log: log_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(scenario: &str, variable: &str, year: i64, value: f64) -> Record {
        Record::new("X", scenario, "WLD", variable, "AGR", "MtCO2e", year, value)
    }

    fn key(scenario: &str, year: i64) -> PanelKey {
        PanelKey {
            model: "X".into(),
            scenario: scenario.into(),
            region: "WLD".into(),
            year,
        }
    }

    #[test]
    fn pivot_averages_repeats_and_fills_gaps() {
        let records = vec![
            rec("BAU", "ECH4", 2020, 1.0),
            rec("BAU", "ECH4", 2020, 3.0),
            rec("BAU", "ECO2", 2020, f64::NAN),
            rec("BAU", "PROD", 2020, 99.0),
            rec("ELM", "PROD", 2020, 99.0),
        ];
        let zero = Panel::pivot(&records, Field::Variable, &["ECH4", "ECO2", "EN2O"], Fill::Zero).unwrap();
        assert_eq!(zero.len(), 1);
        assert_eq!(zero.get(&key("BAU", 2020), "ECH4"), 2.0);
        assert_eq!(zero.get(&key("BAU", 2020), "ECO2"), 0.0);
        assert_eq!(zero.get(&key("BAU", 2020), "EN2O"), 0.0);

        let missing = Panel::pivot(&records, Field::Variable, &["ECO2"], Fill::Missing).unwrap();
        assert!(missing.get(&key("BAU", 2020), "ECO2").is_nan());
    }

    #[test]
    fn rows_come_back_in_key_order() {
        let records = vec![
            rec("ELM", "ECH4", 2030, 1.0),
            rec("BAU", "ECH4", 2030, 2.0),
            rec("BAU", "ECH4", 2020, 3.0),
        ];
        let panel = Panel::pivot(&records, Field::Variable, &["ECH4"], Fill::Zero).unwrap();
        assert_eq!(
            panel.keys().unwrap(),
            vec![key("BAU", 2020), key("BAU", 2030), key("ELM", 2030)]
        );
    }

    #[test]
    fn derived_columns_melt_back_column_major() {
        let records = vec![
            rec("BAU", "ECH4", 2020, 1.0),
            rec("BAU", "ECO2", 2020, 2.0),
            rec("ELM", "ECH4", 2020, 4.0),
        ];
        let mut panel = Panel::pivot(&records, Field::Variable, &["ECH4", "ECO2"], Fill::Zero).unwrap();
        panel.derive("total", col("ECH4") + col("ECO2")).unwrap();
        assert_eq!(panel.columns(), ["ECH4", "ECO2", "total"]);

        let long = panel
            .melt(&[
                MeltSpec { column: "total", variable: "EMIS_added", item: "AGR", unit: "MtCO2e" },
                MeltSpec { column: "ECH4", variable: "ECH4", item: "AGR", unit: "MtCO2e" },
            ])
            .unwrap();
        let values: Vec<(String, String, f64)> = long
            .iter()
            .map(|r| (r.variable.clone(), r.scenario.clone(), r.value))
            .collect();
        assert_eq!(
            values,
            vec![
                ("EMIS_added".into(), "BAU".into(), 3.0),
                ("EMIS_added".into(), "ELM".into(), 4.0),
                ("ECH4".into(), "BAU".into(), 1.0),
                ("ECH4".into(), "ELM".into(), 4.0),
            ]
        );
    }

    #[test]
    fn frame_has_index_then_value_columns() {
        let records = vec![rec("BAU", "ECH4", 2020, 1.0)];
        let panel = Panel::pivot(&records, Field::Variable, &["ECH4"], Fill::Zero).unwrap();
        let df = panel.to_frame().unwrap();
        assert_eq!(
            df.get_column_names_str(),
            vec!["model", "scenario", "region", "year", "ECH4"]
        );
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn nan_cells_are_counted() {
        let records = vec![rec("BAU", "ECH4", 2020, 1.0), rec("ELM", "ECO2", 2020, 1.0)];
        let panel = Panel::pivot(&records, Field::Variable, &["ECH4", "ECO2"], Fill::Missing).unwrap();
        assert_eq!(panel.count_nan("ECH4").unwrap(), 1);
    }

    #[test]
    fn summary_matches_sample_statistics() {
        let s = Summary::of([1.0, 2.0, 3.0, f64::NAN]).unwrap();
        assert_eq!(s.count, 3);
        assert!((s.mean - 2.0).abs() < 1e-12);
        assert!((s.std - 1.0).abs() < 1e-12);
        assert_eq!((s.min, s.max), (1.0, 3.0));

        let single = Summary::of([5.0]).unwrap();
        assert_eq!(single.count, 1);
        assert!(single.std.is_nan());
        let empty = Summary::of([]).unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.mean.is_nan());
    }

    #[test]
    fn summaries_are_per_model() {
        let mut other = rec("BAU", "ECH4", 2020, 10.0);
        other.model = "Y".into();
        let records = vec![rec("BAU", "ECH4", 2020, 1.0), rec("ELM", "ECH4", 2020, 3.0), other];
        let panel = Panel::pivot(&records, Field::Variable, &["ECH4"], Fill::Zero).unwrap();
        let by_model = panel.summary_by_model("ECH4").unwrap();
        assert_eq!(by_model.len(), 2);
        assert_eq!(by_model["X"].count, 2);
        assert!((by_model["X"].mean - 2.0).abs() < 1e-12);
        assert_eq!(by_model["Y"].max, 10.0);
    }
}
