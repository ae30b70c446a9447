//! On-disk layout of one run.
//!
//! ```text
//! <run_root>/<run_name>/
//!     multi_stage_result.json
//!     investment_timeline.csv
//!     stages/stage_00_2025/specification.csv
//!     stages/stage_00_2025/specification.sha256
//!     stages/stage_00_2025/output/
//! ```

use crate::config::OutputConfig;
use crate::errors::InvestflowResult;
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const STAGES_DIR: &str = "stages";
const RESULT_FILE: &str = "multi_stage_result.json";
const TIMELINE_FILE: &str = "investment_timeline.csv";

/// Files of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    /// Stage directory.
    pub root: PathBuf,
    /// Written specification.
    pub specification: PathBuf,
    /// Hash of the last written specification.
    pub hash: PathBuf,
    /// Directory the optimizer writes into.
    pub output: PathBuf,
}

impl StagePaths {
    /// Paths of stage `index` in the run directory `run_dir`.
    #[must_use]
    pub fn under(run_dir: &Path, index: usize, year: i32) -> Self {
        let root = run_dir
            .join(STAGES_DIR)
            .join(format!("stage_{index:02}_{year}"));
        Self {
            specification: root.join("specification.csv"),
            hash: root.join("specification.sha256"),
            output: root.join("output"),
            root,
        }
    }
}

/// A run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    run_id: String,
    root: PathBuf,
}

impl RunLayout {
    /// Creates the run directory under the configured root.
    ///
    /// Without a configured name the run is named by UTC timestamp plus a
    /// short random suffix.
    pub fn create(config: &OutputConfig) -> InvestflowResult<Self> {
        let run_id = config.run_name.clone().unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{}_{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
        });
        Self::at(config.run_root.join(&run_id))
    }

    /// Uses `root` as the run directory, creating it if needed.
    pub fn at(root: impl Into<PathBuf>) -> InvestflowResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(STAGES_DIR))?;
        let run_id = root
            .file_name()
            .map_or_else(|| "run".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { run_id, root })
    }

    /// Run identifier (the directory name).
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files of stage `index`.
    #[must_use]
    pub fn stage_paths(&self, index: usize, year: i32) -> StagePaths {
        StagePaths::under(&self.root, index, year)
    }

    /// Aggregated result file.
    #[must_use]
    pub fn result_path(&self) -> PathBuf {
        self.root.join(RESULT_FILE)
    }

    /// Investment timeline file.
    #[must_use]
    pub fn timeline_path(&self) -> PathBuf {
        self.root.join(TIMELINE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_paths() {
        let paths = StagePaths::under(Path::new("/runs/base"), 3, 2040);
        assert_eq!(paths.root, PathBuf::from("/runs/base/stages/stage_03_2040"));
        assert_eq!(
            paths.specification,
            PathBuf::from("/runs/base/stages/stage_03_2040/specification.csv")
        );
        assert_eq!(paths.output, PathBuf::from("/runs/base/stages/stage_03_2040/output"));
    }

    #[test]
    fn test_named_run() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(&OutputConfig {
            run_root: dir.path().to_path_buf(),
            run_name: Some("co2_low".to_string()),
        })
        .unwrap();
        assert_eq!(layout.run_id(), "co2_low");
        assert!(dir.path().join("co2_low/stages").is_dir());
        assert_eq!(layout.result_path(), dir.path().join("co2_low/multi_stage_result.json"));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let config = OutputConfig {
            run_root: dir.path().to_path_buf(),
            run_name: None,
        };
        let a = RunLayout::create(&config).unwrap();
        let b = RunLayout::create(&config).unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert!(a.root().is_dir());
    }
}
