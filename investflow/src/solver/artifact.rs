//! Reading and classifying the optimizer's output artifacts.
//!
//! A stage's output directory holds a summary table (`Block,Key,<values>`,
//! the last column is authoritative) and a status table with a `status`
//! column whose last row is authoritative.

use super::SolveOutcome;
use crate::config::SolverConfig;
use crate::errors::{FailureKind, InvestflowResult, StageFailure};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// File names of the artifacts inside a stage output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFiles {
    /// Summary table file name.
    pub summary: String,
    /// Status table file name.
    pub status: String,
}

impl ArtifactFiles {
    /// Takes the file names from solver configuration.
    #[must_use]
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            summary: config.summary_file.clone(),
            status: config.status_file.clone(),
        }
    }
}

impl Default for ArtifactFiles {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

/// Raw summary values keyed by (block, key).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryTable {
    values: BTreeMap<(String, String), String>,
}

impl SummaryTable {
    /// Reads a summary CSV file.
    pub fn from_path(path: &Path) -> InvestflowResult<Self> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Reads a summary table. The first two columns are block and key; the
    /// value is taken from the last column.
    pub fn from_reader<R: Read>(reader: R) -> InvestflowResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let width = csv_reader.headers()?.len();

        let mut values = BTreeMap::new();
        for row in csv_reader.records() {
            let row = row?;
            if width < 3 || row.len() < 2 {
                continue;
            }
            let block = row.get(0).unwrap_or_default().to_string();
            let key = row.get(1).unwrap_or_default().to_string();
            let value = row.get(width - 1).unwrap_or_default().to_string();
            values.entry((block, key)).or_insert(value);
        }
        Ok(Self { values })
    }

    /// Raw value for (block, key).
    #[must_use]
    pub fn get(&self, block: &str, key: &str) -> Option<&str> {
        self.values
            .get(&(block.to_string(), key.to_string()))
            .map(String::as_str)
    }

    /// Number of (block, key) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Interpreted value of the status artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// `optimal`, `solved`, `feasible` or `success`.
    Solved,
    /// `infeasible`.
    Infeasible,
    /// Anything else.
    Unrecognized(String),
}

impl ArtifactStatus {
    /// Classifies a raw status value, ignoring case and surrounding space.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "optimal" | "solved" | "feasible" | "success" => Self::Solved,
            "infeasible" => Self::Infeasible,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Reads the last row's `status` value, or `None` if the table has no rows
/// or no `status` column.
pub fn read_status(path: &Path) -> InvestflowResult<Option<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let Some(column) = csv_reader
        .headers()?
        .iter()
        .position(|h| h.eq_ignore_ascii_case("status"))
    else {
        return Ok(None);
    };

    let mut last = None;
    for row in csv_reader.records() {
        last = row?.get(column).map(str::to_string);
    }
    Ok(last.filter(|s| !s.is_empty()))
}

/// A solved stage's output.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverArtifact {
    /// Directory the artifact was read from.
    pub output_dir: PathBuf,
    /// Raw status value.
    pub status: String,
    /// Summary values.
    pub summary: SummaryTable,
}

/// Classifies whatever the optimizer left in `output_dir`.
pub fn classify_artifact(output_dir: &Path, files: &ArtifactFiles) -> SolveOutcome {
    let status_path = output_dir.join(&files.status);
    if !status_path.is_file() {
        return SolveOutcome::Error(StageFailure::new(
            FailureKind::MalformedOutput,
            format!("missing status artifact {}", status_path.display()),
        ));
    }

    let raw = match read_status(&status_path) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            return SolveOutcome::Error(StageFailure::new(
                FailureKind::MalformedOutput,
                format!("status artifact {} reports no status", status_path.display()),
            ))
        }
        Err(e) => {
            return SolveOutcome::Error(StageFailure::new(
                FailureKind::MalformedOutput,
                format!("unreadable status artifact: {e}"),
            ))
        }
    };

    match ArtifactStatus::parse(&raw) {
        ArtifactStatus::Infeasible => SolveOutcome::Infeasible {
            message: format!("optimizer reported status '{raw}'"),
        },
        ArtifactStatus::Unrecognized(status) => SolveOutcome::Error(StageFailure::new(
            FailureKind::MalformedOutput,
            format!("unrecognized solver status '{status}'"),
        )),
        ArtifactStatus::Solved => {
            let summary_path = output_dir.join(&files.summary);
            match SummaryTable::from_path(&summary_path) {
                Ok(summary) => SolveOutcome::Solved(SolverArtifact {
                    output_dir: output_dir.to_path_buf(),
                    status: raw,
                    summary,
                }),
                Err(e) => SolveOutcome::Error(StageFailure::new(
                    FailureKind::MalformedOutput,
                    format!("unreadable summary artifact {}: {e}", summary_path.display()),
                )),
            }
        }
    }
}
