//! Linear interpolation of a single series to synthesize missing years.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::HarmonizeError;
use crate::record::{Record, SeriesKey};

/// Year -> value points of one (model, scenario, region, variable, item, unit) series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: SeriesKey,
    pub points: BTreeMap<i64, f64>,
}

impl Series {
    /// Build a series, failing when the records span more than one combination
    /// or report one year twice.
    pub fn from_records(records: &[Record]) -> Result<Self, HarmonizeError> {
        let first = records.first().ok_or_else(|| {
            HarmonizeError::OutOfRange("cannot interpolate an empty series".into())
        })?;
        let key = first.series_key();

        let mut points = BTreeMap::new();
        for r in records {
            let other = r.series_key();
            if other != key {
                return Err(HarmonizeError::InvalidGroup(format!(
                    "series mixes {key} and {other}"
                )));
            }
            if points.insert(r.year, r.value).is_some() {
                return Err(HarmonizeError::InvalidGroup(format!(
                    "{key} reports year {} more than once",
                    r.year
                )));
            }
        }
        Ok(Self { key, points })
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.points
            .iter()
            .map(|(&year, &value)| self.record_at(year, value))
            .collect()
    }

    fn record_at(&self, year: i64, value: f64) -> Record {
        let k = &self.key;
        Record::new(
            k.model.clone(),
            &k.scenario,
            k.region.clone(),
            k.variable.clone(),
            k.item.clone(),
            k.unit.clone(),
            year,
            value,
        )
    }

    /// Values at the requested years that the series does not already report.
    ///
    /// Every such year must lie strictly inside the observed year span.
    pub fn interpolate_missing(&self, target_years: &[i64]) -> Result<Vec<(i64, f64)>, HarmonizeError> {
        let missing: BTreeSet<i64> = target_years
            .iter()
            .copied()
            .filter(|y| !self.points.contains_key(y))
            .collect();
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let (Some((&min_year, _)), Some((&max_year, _))) =
            (self.points.first_key_value(), self.points.last_key_value())
        else {
            return Err(HarmonizeError::OutOfRange(format!(
                "{} has no years to interpolate from",
                self.key
            )));
        };

        missing
            .into_iter()
            .map(|year| {
                if year <= min_year || year >= max_year {
                    return Err(HarmonizeError::OutOfRange(format!(
                        "year {year} outside {min_year}..{max_year} of {}",
                        self.key
                    )));
                }
                let (&x0, &y0) = self.points.range(..year).next_back().ok_or_else(|| {
                    HarmonizeError::OutOfRange(format!("no point before {year}"))
                })?;
                let (&x1, &y1) = self.points.range(year..).next().ok_or_else(|| {
                    HarmonizeError::OutOfRange(format!("no point after {year}"))
                })?;
                Ok((year, linear(x0, y0, x1, y1, year)))
            })
            .collect()
    }
}

fn linear(x0: i64, y0: f64, x1: i64, y1: f64, x: i64) -> f64 {
    y0 + (x - x0) as f64 * (y1 - y0) / (x1 - x0) as f64
}

/// Synthesized records only, one per requested year the series is missing.
pub fn interpolate_years(records: &[Record], target_years: &[i64]) -> Result<Vec<Record>, HarmonizeError> {
    let series = Series::from_records(records)?;
    Ok(series
        .interpolate_missing(target_years)?
        .into_iter()
        .map(|(year, value)| series.record_at(year, value))
        .collect())
}

/// The series merged with its synthesized points, ordered by year.
pub fn interpolate(records: &[Record], target_years: &[i64]) -> Result<Vec<Record>, HarmonizeError> {
    let mut series = Series::from_records(records)?;
    let synthesized = series.interpolate_missing(target_years)?;
    series.points.extend(synthesized);
    Ok(series.to_records())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(scenario: &str, year: i64, value: f64) -> Record {
        Record::new("X", scenario, "WLD", "PROD", "CRP", "t", year, value)
    }

    #[test]
    fn midpoint_is_exact() {
        let out = interpolate_years(&[rec("BAU", 2000, 10.0), rec("BAU", 2010, 30.0)], &[2005]).unwrap();
        assert_eq!(out, vec![rec("BAU", 2005, 20.0)]);
    }

    #[test]
    fn uses_the_bracketing_points() {
        let series = [
            rec("BAU", 2000, 10.0),
            rec("BAU", 2005, 20.0),
            rec("BAU", 2010, 30.0),
            rec("BAU", 2015, 40.0),
        ];
        let out = interpolate_years(&series, &[2003, 2008, 2012]).unwrap();
        let values: Vec<f64> = out.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![16.0, 26.0, 34.0]);
    }

    #[test]
    fn merged_output_is_ordered_by_year() {
        let out = interpolate(&[rec("BAU", 2025, 200.0), rec("BAU", 2015, 100.0)], &[2020]).unwrap();
        let years: Vec<i64> = out.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2015, 2020, 2025]);
        assert_eq!(out[1].value, 150.0);
    }

    #[test]
    fn present_year_is_left_alone() {
        let series = [rec("BAU", 2015, 100.0), rec("BAU", 2020, 123.0), rec("BAU", 2025, 200.0)];
        assert!(interpolate_years(&series, &[2020]).unwrap().is_empty());
        assert_eq!(interpolate(&series, &[2020]).unwrap(), series.to_vec());
    }

    #[test]
    fn years_outside_the_span_fail() {
        let series = [rec("BAU", 2015, 100.0), rec("BAU", 2025, 200.0)];
        for year in [2010, 2030] {
            assert!(matches!(
                interpolate_years(&series, &[year]),
                Err(HarmonizeError::OutOfRange(_))
            ));
        }
        assert!(matches!(
            interpolate_years(&[rec("BAU", 2015, 1.0)], &[2020]),
            Err(HarmonizeError::OutOfRange(_))
        ));
    }

    #[test]
    fn mixed_series_is_an_invalid_group() {
        let series = [rec("BAU", 2015, 100.0), rec("ELM", 2025, 200.0)];
        assert!(matches!(
            interpolate(&series, &[2020]),
            Err(HarmonizeError::InvalidGroup(_))
        ));
    }
}
