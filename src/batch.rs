//! Running the pipeline over a directory of submissions on a bounded worker pool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::error::HarmonizeError;
use crate::pipeline::{Pipeline, PipelineSummary};

/// Input file names ending in one of these are override lists, not submissions.
const OVERRIDE_SUFFIXES: [&str; 2] = ["OVERRIDES.csv", "OVERRIDES_fix.csv"];

/// `*.csv` files directly inside `dir`, override lists excluded, sorted by path.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, HarmonizeError> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(".csv") && !OVERRIDE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Result of one file; a failure never cancels the other files.
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<PipelineSummary, HarmonizeError>,
}

/// Run `pipeline` on every path with at most `workers` files in flight.
///
/// Outcomes come back in input order.
pub fn run_batch(
    paths: &[PathBuf],
    pipeline: &Pipeline<'_>,
    workers: usize,
) -> Result<Vec<BatchOutcome>, HarmonizeError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| HarmonizeError::Config(format!("cannot start worker pool: {e}")))?;

    let total = paths.len();
    let done = AtomicUsize::new(0);
    tracing::info!(files = total, workers, "starting batch");

    let outcomes = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let result = pipeline.run(path);
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                match &result {
                    Ok(summary) => tracing::info!(
                        file = %path.display(),
                        model = %summary.model,
                        records = summary.checked_records,
                        "[{finished}/{total}] done"
                    ),
                    Err(err) => tracing::error!(
                        file = %path.display(),
                        error = %err,
                        "[{finished}/{total}] failed"
                    ),
                }
                BatchOutcome {
                    path: path.clone(),
                    result,
                }
            })
            .collect::<Vec<_>>()
    });

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    tracing::info!(files = total, failed, "batch finished");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::reader::{RawCsvReader, RawFormat};
    use crate::template::Template;

    #[test]
    fn discovers_submissions_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "MAGNET.csv",
            "AIM.csv",
            "AIM_OVERRIDES_fix.csv",
            "GLOBIOM_OVERRIDES.csv",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let names: Vec<String> = discover_inputs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["AIM.csv", "MAGNET.csv"]);
    }

    #[test]
    fn one_bad_file_does_not_cancel_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        for model in ["AIM", "GLOBIOM", "MAGNET"] {
            fs::write(
                dir.path().join(format!("{model}.csv")),
                format!("{model},BAU,WLD,PROD,CRP,t,2015,100\n{model},BAU,WLD,PROD,CRP,t,2025,200\n"),
            )
            .unwrap();
        }
        fs::write(dir.path().join("BROKEN.csv"), "a,b\n").unwrap();

        let template = Template::from_rows([("PROD", "t", false)]);
        let config = PipelineConfig::default();
        let reader = RawCsvReader::new(RawFormat::MyGeoHub);
        let pipeline = Pipeline::new(&template, &config, &reader);

        let inputs = discover_inputs(dir.path()).unwrap();
        let outcomes = run_batch(&inputs, &pipeline, 2).unwrap();

        let names: Vec<String> = outcomes
            .iter()
            .map(|o| o.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["AIM.csv", "BROKEN.csv", "GLOBIOM.csv", "MAGNET.csv"]);
        assert!(outcomes[1].result.is_err());
        for i in [0, 2, 3] {
            let summary = outcomes[i].result.as_ref().unwrap();
            assert!(summary.artifacts.pc_diff.exists());
        }
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        assert!(matches!(
            discover_inputs(Path::new("/nonexistent/batch")),
            Err(HarmonizeError::Io(_))
        ));
    }
}
