//! Per-run audit log.
//!
//! Every pipeline stage receives the run's `RunLog` explicitly. Entries are
//! timestamped and mirrored as `tracing` events; the pipeline persists the
//! collected entries next to its other artifacts.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::error::{HarmonizeError, SoftError};

/// Timestamp layout used in log lines and log file names.
pub const TIMESTAMP_FORMAT: &str = "%y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Pipeline stage an entry was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Duplicates,
    Overrides,
    Template,
    Interpolation,
    PercentChange,
    Merge,
    Aggregation,
    Decomposition,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Duplicates => "duplicates",
            Self::Overrides => "overrides",
            Self::Template => "template",
            Self::Interpolation => "interpolation",
            Self::PercentChange => "percent_change",
            Self::Merge => "merge",
            Self::Aggregation => "aggregation",
            Self::Decomposition => "decomposition",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: Level,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}, {}",
            self.level.as_str(),
            self.stage.as_str(),
            self.at.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: Uuid,
    label: String,
    started: DateTime<Local>,
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            label: label.into(),
            started: Local::now(),
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(run = %self.run_id, stage = stage.as_str(), "{message}");
        self.push(Level::Info, stage, message);
    }

    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run = %self.run_id, stage = stage.as_str(), "{message}");
        self.push(Level::Warn, stage, message);
    }

    pub fn error(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(run = %self.run_id, stage = stage.as_str(), "{message}");
        self.push(Level::Error, stage, message);
    }

    /// Record a per-cell failure that was absorbed instead of propagated.
    pub fn soft(&mut self, stage: Stage, context: impl fmt::Display, err: &SoftError) {
        self.error(stage, format!("{context}, {err}"));
    }

    /// Write all entries, one per line, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> Result<(), HarmonizeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            "# run {} ({}) started {}",
            self.run_id,
            self.label,
            self.started.format(TIMESTAMP_FORMAT)
        )?;
        for entry in &self.entries {
            writeln!(out, "{entry}")?;
        }
        out.flush()?;
        Ok(())
    }

    fn push(&mut self, level: Level, stage: Stage, message: String) {
        self.entries.push(LogEntry {
            at: Local::now(),
            level,
            stage,
            message,
        });
    }
}
